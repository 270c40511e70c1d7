// Roboteq ASCII command vocabulary and response classification
//
// Commands:  !G <ch> <v> | !MS <ch> | !EX | !MG
// Queries:   ?FF | ?BS <ch> | ?BSR <ch> | ?V 2
// Replies:   "+" (ack) or "<KEY>=<int>", CR-terminated

use std::fmt;

use super::link::{LinkError, TERMINATOR};

/// Acknowledgement marker sent by the controller for accepted commands
pub const ACK: &str = "+";

/// Error types for controller communication
#[derive(Debug, thiserror::Error)]
pub enum RoboteqError {
    #[error(transparent)]
    Link(#[from] LinkError),

    #[error("Unexpected response to {command:?} on {port}: {response:?}")]
    UnexpectedResponse {
        port: String,
        command: String,
        response: String,
    },

    #[error("Invalid channel {0} (expected 1 or 2)")]
    InvalidChannel(u8),

    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),
}

pub type Result<T> = std::result::Result<T, RoboteqError>;

/// One motor output of a controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Channel(u8);

impl Channel {
    pub const ONE: Channel = Channel(1);
    pub const TWO: Channel = Channel(2);

    /// Both channels of a dual-channel controller
    pub const ALL: [Channel; 2] = [Channel::ONE, Channel::TWO];

    pub fn new(number: u8) -> Result<Self> {
        match number {
            1 | 2 => Ok(Channel(number)),
            n => Err(RoboteqError::InvalidChannel(n)),
        }
    }

    pub fn number(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for Channel {
    type Error = RoboteqError;

    fn try_from(number: u8) -> Result<Self> {
        Channel::new(number)
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A controller command, rendered to its wire payload by `Display`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    SetSpeed { channel: Channel, value: i32 },
    MotorStop(Channel),
    EmergencyStop,
    ReleaseEmergencyStop,
    QueryFaultFlags,
    QueryMotorRpm(Channel),
    QueryMotorRatioRpm(Channel),
    QueryBatteryVoltage,
}

impl Command {
    /// Key expected in the reply to a query, `None` for ack-style commands
    pub fn query_key(&self) -> Option<&'static str> {
        match self {
            Command::QueryFaultFlags => Some("FF"),
            Command::QueryMotorRpm(_) => Some("BS"),
            Command::QueryMotorRatioRpm(_) => Some("BSR"),
            Command::QueryBatteryVoltage => Some("V"),
            _ => None,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::SetSpeed { channel, value } => write!(f, "!G {} {}", channel, value),
            Command::MotorStop(channel) => write!(f, "!MS {}", channel),
            Command::EmergencyStop => f.write_str("!EX"),
            Command::ReleaseEmergencyStop => f.write_str("!MG"),
            Command::QueryFaultFlags => f.write_str("?FF"),
            Command::QueryMotorRpm(channel) => write!(f, "?BS {}", channel),
            Command::QueryMotorRatioRpm(channel) => write!(f, "?BSR {}", channel),
            // battery voltage lives on the second voltage channel
            Command::QueryBatteryVoltage => f.write_str("?V 2"),
        }
    }
}

/// Classified controller reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Ack,
    Query { key: String, value: i32 },
    Unrecognized(String),
}

impl Response {
    /// Strip the terminator from a raw line and classify the payload
    pub fn parse(raw: &[u8]) -> Self {
        let text = String::from_utf8_lossy(raw);
        let payload = text
            .trim_end_matches(|c: char| c == TERMINATOR as char || c == '\n')
            .trim();

        if payload == ACK {
            return Response::Ack;
        }

        if let Some((key, value)) = payload.split_once('=') {
            if let Ok(value) = value.trim().parse::<i32>() {
                return Response::Query {
                    key: key.trim().to_string(),
                    value,
                };
            }
        }

        Response::Unrecognized(payload.to_string())
    }

    pub fn is_ack(&self) -> bool {
        matches!(self, Response::Ack)
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Response::Ack => f.write_str(ACK),
            Response::Query { key, value } => write!(f, "{}={}", key, value),
            Response::Unrecognized(payload) => f.write_str(payload),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_payloads() {
        let cases = [
            (Command::SetSpeed { channel: Channel::ONE, value: 10 }, "!G 1 10"),
            (Command::SetSpeed { channel: Channel::TWO, value: -1000 }, "!G 2 -1000"),
            (Command::MotorStop(Channel::TWO), "!MS 2"),
            (Command::EmergencyStop, "!EX"),
            (Command::ReleaseEmergencyStop, "!MG"),
            (Command::QueryFaultFlags, "?FF"),
            (Command::QueryMotorRpm(Channel::ONE), "?BS 1"),
            (Command::QueryMotorRatioRpm(Channel::ONE), "?BSR 1"),
            (Command::QueryBatteryVoltage, "?V 2"),
        ];
        for (command, expected) in cases {
            assert_eq!(command.to_string(), expected);
        }
    }

    #[test]
    fn test_parse_ack() {
        assert_eq!(Response::parse(b"+\r"), Response::Ack);
        assert_eq!(Response::parse(b"+"), Response::Ack);
    }

    #[test]
    fn test_parse_query() {
        assert_eq!(
            Response::parse(b"BS=-160\r"),
            Response::Query { key: "BS".to_string(), value: -160 }
        );
        assert_eq!(
            Response::parse(b"FF=0\r"),
            Response::Query { key: "FF".to_string(), value: 0 }
        );
    }

    #[test]
    fn test_parse_unrecognized() {
        assert_eq!(
            Response::parse(b"failcase\r"),
            Response::Unrecognized("failcase".to_string())
        );
        assert_eq!(Response::parse(b"-\r"), Response::Unrecognized("-".to_string()));
        assert_eq!(
            Response::parse(b"V=abc\r"),
            Response::Unrecognized("V=abc".to_string())
        );
        assert!(!Response::parse(b"\r").is_ack());
    }

    #[test]
    fn test_channel_bounds() {
        assert_eq!(Channel::new(1).unwrap(), Channel::ONE);
        assert_eq!(Channel::try_from(2).unwrap(), Channel::TWO);
        assert!(matches!(Channel::new(0), Err(RoboteqError::InvalidChannel(0))));
        assert!(matches!(Channel::new(3), Err(RoboteqError::InvalidChannel(3))));
    }

    #[test]
    fn test_query_keys() {
        assert_eq!(Command::QueryMotorRatioRpm(Channel::TWO).query_key(), Some("BSR"));
        assert_eq!(Command::EmergencyStop.query_key(), None);
    }
}
