use std::net::SocketAddr;

use crate::protocol::Command;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: protocol commands executed. Labels: command, status.
pub const COMMANDS_TOTAL: &str = "campsite_commands_total";

/// Histogram: command latency in seconds. Labels: command.
pub const COMMAND_DURATION_SECONDS: &str = "campsite_command_duration_seconds";

/// Counter: ledger mutations. Labels: op (create/update/cancel), outcome (ok or error kind).
pub const RESERVATIONS_TOTAL: &str = "campsite_reservations_total";

/// Counter: availability computations.
pub const AVAILABILITY_QUERIES_TOTAL: &str = "campsite_availability_queries_total";

// ── USE metrics (resource utilization) ──────────────────────────

pub const CONNECTIONS_ACTIVE: &str = "campsite_connections_active";

pub const CONNECTIONS_TOTAL: &str = "campsite_connections_total";

/// Counter: connections rejected due to limit.
pub const CONNECTIONS_REJECTED_TOTAL: &str = "campsite_connections_rejected_total";

/// Counter: ledger lock waits that hit the timeout.
pub const LOCK_TIMEOUTS_TOTAL: &str = "campsite_lock_timeouts_total";

/// Histogram: WAL append + fsync duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "campsite_wal_flush_duration_seconds";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), metrics_exporter_prometheus::BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Short label for a command, for metrics.
pub fn command_label(cmd: &Command) -> &'static str {
    match cmd {
        Command::Availability { .. } => "availability",
        Command::Reserve { .. } => "reserve",
        Command::Reschedule { .. } => "reschedule",
        Command::Cancel { .. } => "cancel",
        Command::Get { .. } => "get",
        Command::List => "list",
        Command::Ping => "ping",
    }
}
