use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One of the eight filter slots on the wheel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub struct Position(u8);

impl Position {
    pub const MIN: i32 = 1;
    pub const MAX: i32 = 8;

    pub fn new(value: i32) -> Option<Self> {
        if (Self::MIN..=Self::MAX).contains(&value) {
            Some(Self(value as u8))
        } else {
            None
        }
    }

    pub fn get(self) -> i32 {
        i32::from(self.0)
    }

    /// Every slot, in wheel order.
    pub fn all() -> impl Iterator<Item = Position> {
        (Self::MIN..=Self::MAX).filter_map(Position::new)
    }
}

impl TryFrom<i32> for Position {
    type Error = String;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        Position::new(value).ok_or_else(|| {
            format!("position {} outside {}..={}", value, Position::MIN, Position::MAX)
        })
    }
}

impl From<Position> for i32 {
    fn from(position: Position) -> Self {
        position.get()
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Commands understood by the wheel controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Move(Position),
    QueryPosition,
}

impl Command {
    /// Wire frame, CR/LF terminated: `F3\r\n`, `F?\r\n`.
    pub fn encode(&self) -> String {
        match self {
            Command::Move(position) => format!("F{}\r\n", position),
            Command::QueryPosition => "F?\r\n".to_string(),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.encode().trim_end())
    }
}

pub const ACK_TOKEN: &str = "OK";
pub const POSITION_MARKER: char = 'F';

/// A reply line, already stripped of terminators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Acknowledgement,
    PositionReport(i32),
    Unrecognized(String),
}

impl Response {
    pub fn classify(line: &str) -> Self {
        if line.contains(ACK_TOKEN) {
            Response::Acknowledgement
        } else if let Some(position) = parse_position_report(line) {
            Response::PositionReport(position)
        } else {
            Response::Unrecognized(line.to_string())
        }
    }
}

/// Slot number from a query reply.
///
/// Everything before the first `F` is treated as line noise; whatever follows
/// it must be a base-10 integer.
pub fn parse_position_report(line: &str) -> Option<i32> {
    let marker = line.find(POSITION_MARKER)?;
    let digits = line[marker + POSITION_MARKER.len_utf8()..].trim();
    digits.parse::<i32>().ok()
}

/// Where the most recent command/response exchange ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExchangeState {
    Idle,
    Sending,
    AwaitingResponse,
    Parsed,
    TimedOut,
    Unrecognized,
    /// The channel reported an I/O error mid-exchange.
    Failed,
}

/// Time budgets for one exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverTiming {
    /// Must exceed the worst-case mechanical travel time.
    pub move_timeout: Duration,
    pub query_timeout: Duration,
    /// Wait after a move acknowledgement before the slot is trusted.
    pub settle_delay: Duration,
    pub poll_interval: Duration,
}

impl Default for DriverTiming {
    fn default() -> Self {
        Self {
            move_timeout: Duration::from_secs(5),
            query_timeout: Duration::from_secs(2),
            settle_delay: Duration::from_millis(500),
            poll_interval: crate::serial::interface::DEFAULT_POLL_INTERVAL,
        }
    }
}

/// Device connection state
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
    Error(String),
}

/// Snapshot of what the controller last knew about the wheel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WheelStatus {
    pub port_name: String,
    pub connection_state: ConnectionState,
    pub last_position: Option<Position>,
    pub last_error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl WheelStatus {
    pub fn new(port_name: String) -> Self {
        Self {
            port_name,
            connection_state: ConnectionState::Disconnected,
            last_position: None,
            last_error: None,
            updated_at: Utc::now(),
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.connection_state, ConnectionState::Connected)
    }

    pub fn update_connection_state(&mut self, state: ConnectionState) {
        self.connection_state = state;
        self.updated_at = Utc::now();
    }

    pub fn record_position(&mut self, position: Option<Position>) {
        self.last_position = position;
        self.last_error = None;
        self.updated_at = Utc::now();
    }

    pub fn record_error(&mut self, message: String) {
        self.last_error = Some(message);
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn position_bounds() {
        assert!(Position::new(0).is_none());
        assert!(Position::new(9).is_none());
        assert!(Position::new(-1).is_none());
        assert_eq!(Position::new(1).map(Position::get), Some(1));
        assert_eq!(Position::new(8).map(Position::get), Some(8));
        assert_eq!(Position::all().count(), 8);
    }

    #[test]
    fn position_serde_rejects_out_of_range() {
        let ok: Position = serde_json::from_str("4").unwrap();
        assert_eq!(ok.get(), 4);
        assert!(serde_json::from_str::<Position>("12").is_err());
    }

    #[test]
    fn command_frames() {
        let three = Position::new(3).unwrap();
        assert_eq!(Command::Move(three).encode(), "F3\r\n");
        assert_eq!(Command::QueryPosition.encode(), "F?\r\n");
        assert_eq!(Command::Move(three).to_string(), "F3");
    }

    #[test]
    fn position_report_parsing() {
        assert_eq!(parse_position_report("F5"), Some(5));
        assert_eq!(parse_position_report("GARBAGEF07"), Some(7));
        assert_eq!(parse_position_report("F 2"), Some(2));
        assert_eq!(parse_position_report("NOPE"), None);
        assert_eq!(parse_position_report("F"), None);
        assert_eq!(parse_position_report("F?"), None);
        // first marker wins, so a second F spoils the digits
        assert_eq!(parse_position_report("FF3"), None);
    }

    #[test]
    fn response_classification() {
        assert_eq!(Response::classify("OK"), Response::Acknowledgement);
        assert_eq!(Response::classify("F3 OK"), Response::Acknowledgement);
        assert_eq!(Response::classify("F6"), Response::PositionReport(6));
        assert_eq!(
            Response::classify("ERR"),
            Response::Unrecognized("ERR".to_string())
        );
    }
}
