//! Line protocol: one command per line, whitespace separated.
//!
//! ```text
//! PING
//! AVAILABILITY [arrival|-] [departure|-]
//! RESERVE <owner> <arrival> <departure>
//! RESCHEDULE <id> <arrival> <departure>
//! CANCEL <id>
//! GET <id>
//! LIST
//! ```
//!
//! Dates are passed through as raw strings; the service validates them.

use thiserror::Error;
use ulid::Ulid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Availability {
        arrival: Option<String>,
        departure: Option<String>,
    },
    Reserve {
        owner_id: String,
        arrival: String,
        departure: String,
    },
    Reschedule {
        id: Ulid,
        arrival: String,
        departure: String,
    },
    Cancel {
        id: Ulid,
    },
    Get {
        id: Ulid,
    },
    List,
    Ping,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("empty command")]
    Empty,
    #[error("unknown command: {0}")]
    UnknownCommand(String),
    #[error("{command}: expected {expected} arguments, got {got}")]
    Arity {
        command: &'static str,
        expected: &'static str,
        got: usize,
    },
    #[error("invalid reservation id: {0}")]
    InvalidId(String),
}

fn optional(arg: Option<&str>) -> Option<String> {
    arg.filter(|a| *a != "-").map(str::to_string)
}

fn parse_id(raw: &str) -> Result<Ulid, ParseError> {
    Ulid::from_string(raw).map_err(|_| ParseError::InvalidId(raw.to_string()))
}

fn expect_args(
    command: &'static str,
    expected: &'static str,
    args: &[&str],
    count: usize,
) -> Result<(), ParseError> {
    if args.len() == count {
        Ok(())
    } else {
        Err(ParseError::Arity { command, expected, got: args.len() })
    }
}

pub fn parse_command(line: &str) -> Result<Command, ParseError> {
    let mut words = line.split_whitespace();
    let keyword = words.next().ok_or(ParseError::Empty)?.to_ascii_uppercase();
    let args: Vec<&str> = words.collect();

    match keyword.as_str() {
        "PING" => {
            expect_args("PING", "0", &args, 0)?;
            Ok(Command::Ping)
        }
        "LIST" => {
            expect_args("LIST", "0", &args, 0)?;
            Ok(Command::List)
        }
        "AVAILABILITY" => {
            if args.len() > 2 {
                return Err(ParseError::Arity {
                    command: "AVAILABILITY",
                    expected: "0 to 2",
                    got: args.len(),
                });
            }
            Ok(Command::Availability {
                arrival: optional(args.first().copied()),
                departure: optional(args.get(1).copied()),
            })
        }
        "RESERVE" => {
            expect_args("RESERVE", "3", &args, 3)?;
            Ok(Command::Reserve {
                owner_id: args[0].to_string(),
                arrival: args[1].to_string(),
                departure: args[2].to_string(),
            })
        }
        "RESCHEDULE" => {
            expect_args("RESCHEDULE", "3", &args, 3)?;
            Ok(Command::Reschedule {
                id: parse_id(args[0])?,
                arrival: args[1].to_string(),
                departure: args[2].to_string(),
            })
        }
        "CANCEL" => {
            expect_args("CANCEL", "1", &args, 1)?;
            Ok(Command::Cancel { id: parse_id(args[0])? })
        }
        "GET" => {
            expect_args("GET", "1", &args, 1)?;
            Ok(Command::Get { id: parse_id(args[0])? })
        }
        _ => Err(ParseError::UnknownCommand(keyword)),
    }
}
