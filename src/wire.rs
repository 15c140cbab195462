use std::time::Instant;

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LinesCodec, LinesCodecError};

use crate::engine::EngineError;
use crate::limits::MAX_LINE_LEN;
use crate::observability::{self, command_label};
use crate::protocol::{self, Command};
use crate::service::Campsite;

/// JSON body for a rejected request: stable kind plus structured detail.
pub fn error_body(err: &EngineError) -> Value {
    let mut body = json!({
        "ok": false,
        "error": err.kind(),
        "message": err.to_string(),
    });
    match err {
        EngineError::InvalidRange(v) => body["rule"] = json!(v.rule()),
        EngineError::NotFound(id) => body["id"] = json!(id.to_string()),
        EngineError::Conflict(id) => body["conflicting_id"] = json!(id.to_string()),
        EngineError::StorageFailure { reference } => body["reference"] = json!(reference.to_string()),
        _ => {}
    }
    body
}

fn protocol_error(message: impl std::fmt::Display) -> Value {
    json!({ "ok": false, "error": "protocol", "message": message.to_string() })
}

pub async fn execute_command(campsite: &Campsite, cmd: Command) -> Result<Value, EngineError> {
    match cmd {
        Command::Ping => Ok(json!({ "ok": true, "pong": true })),
        Command::Availability { arrival, departure } => {
            let dates = campsite
                .check_availability(arrival.as_deref(), departure.as_deref())
                .await?;
            let dates: Vec<String> = dates.iter().map(|d| d.to_string()).collect();
            Ok(json!({ "ok": true, "dates": dates }))
        }
        Command::Reserve { owner_id, arrival, departure } => {
            let id = campsite
                .create_reservation(&owner_id, Some(&arrival), Some(&departure))
                .await?;
            Ok(json!({ "ok": true, "id": id.to_string() }))
        }
        Command::Reschedule { id, arrival, departure } => {
            campsite
                .update_reservation(id, Some(&arrival), Some(&departure))
                .await?;
            Ok(json!({ "ok": true }))
        }
        Command::Cancel { id } => {
            campsite.cancel_reservation(id).await?;
            Ok(json!({ "ok": true }))
        }
        Command::Get { id } => {
            let reservation = campsite.reservation(id).await?;
            Ok(json!({ "ok": true, "reservation": reservation }))
        }
        Command::List => {
            let reservations = campsite.reservations().await?;
            Ok(json!({ "ok": true, "reservations": reservations }))
        }
    }
}

async fn handle_line(campsite: &Campsite, line: &str) -> Value {
    let cmd = match protocol::parse_command(line) {
        Ok(cmd) => cmd,
        Err(e) => return protocol_error(e),
    };
    let label = command_label(&cmd);
    let started = Instant::now();
    let result = execute_command(campsite, cmd).await;
    metrics::histogram!(observability::COMMAND_DURATION_SECONDS, "command" => label)
        .record(started.elapsed().as_secs_f64());
    let status = match &result {
        Ok(_) => "ok",
        Err(e) => e.kind(),
    };
    metrics::counter!(observability::COMMANDS_TOTAL, "command" => label, "status" => status)
        .increment(1);
    result.unwrap_or_else(|e| error_body(&e))
}

/// Serve one client until it disconnects. One JSON response line per request line.
///
/// An oversized line gets one error reply, then the connection is closed.
pub async fn process_connection(socket: TcpStream, campsite: Campsite) -> Result<(), LinesCodecError> {
    let mut framed = Framed::new(socket, LinesCodec::new_with_max_length(MAX_LINE_LEN));
    while let Some(frame) = framed.next().await {
        let line = match frame {
            Ok(line) => line,
            Err(LinesCodecError::MaxLineLengthExceeded) => {
                tracing::warn!("closing connection: line exceeds {MAX_LINE_LEN} bytes");
                framed.send(protocol_error("line too long").to_string()).await?;
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        if line.trim().is_empty() {
            continue;
        }
        let response = handle_line(&campsite, &line).await;
        framed.send(response.to_string()).await?;
    }
    Ok(())
}
