//! Vehicle command alphabet.
//!
//! Each command travels to the vehicle as a single ASCII byte with no
//! framing and no acknowledgement.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A motion directive for the vehicle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Command {
    Forward,
    Backward,
    Left,
    Right,
    #[default]
    Stop,
}

impl Command {
    /// Every command, in display order.
    pub const ALL: [Command; 5] = [
        Command::Forward,
        Command::Backward,
        Command::Left,
        Command::Right,
        Command::Stop,
    ];

    /// The single-character wire code.
    pub const fn code(self) -> char {
        match self {
            Self::Forward => 'F',
            Self::Backward => 'B',
            Self::Left => 'L',
            Self::Right => 'R',
            Self::Stop => 'S',
        }
    }

    /// The byte written to the serial stream.
    pub const fn wire_byte(self) -> u8 {
        self.code() as u8
    }

    /// Human-readable label for status displays.
    pub const fn label(self) -> &'static str {
        match self {
            Self::Forward => "↑ Forward",
            Self::Backward => "↓ Backward",
            Self::Left => "← Left",
            Self::Right => "→ Right",
            Self::Stop => "■ Stop",
        }
    }

    /// Decode a wire code. Unknown codes yield `None`.
    pub fn from_code(code: char) -> Option<Self> {
        Self::ALL.into_iter().find(|cmd| cmd.code() == code)
    }

    /// Decode a raw byte received from the stream.
    pub fn from_wire_byte(byte: u8) -> Option<Self> {
        Self::from_code(char::from(byte))
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Forward => write!(f, "Forward"),
            Self::Backward => write!(f, "Backward"),
            Self::Left => write!(f, "Left"),
            Self::Right => write!(f, "Right"),
            Self::Stop => write!(f, "Stop"),
        }
    }
}

/// Text that names no known command.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown command: {0:?}")]
pub struct ParseCommandError(pub String);

impl FromStr for Command {
    type Err = ParseCommandError;

    /// Accepts a wire code (`f`, `B`, ...) or a command name (`forward`, `STOP`, ...).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let mut chars = trimmed.chars();
        if let (Some(c), None) = (chars.next(), chars.next()) {
            if let Some(cmd) = Self::from_code(c.to_ascii_uppercase()) {
                return Ok(cmd);
            }
        }
        Self::ALL
            .into_iter()
            .find(|cmd| cmd.to_string().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| ParseCommandError(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn wire_codes_are_unique_and_decode_back() {
        let codes: HashSet<char> = Command::ALL.iter().map(|c| c.code()).collect();
        assert_eq!(codes.len(), Command::ALL.len());

        for cmd in Command::ALL {
            assert_eq!(Command::from_code(cmd.code()), Some(cmd));
            assert_eq!(Command::from_wire_byte(cmd.wire_byte()), Some(cmd));
        }
    }

    #[test]
    fn wire_bytes_are_ascii_letters() {
        let bytes: Vec<u8> = Command::ALL.iter().map(|c| c.wire_byte()).collect();
        assert_eq!(bytes, b"FBLRS");
    }

    #[test]
    fn unknown_code_has_no_match() {
        assert_eq!(Command::from_code('X'), None);
        assert_eq!(Command::from_code('f'), None);
        assert_eq!(Command::from_wire_byte(0), None);
    }

    #[test]
    fn default_is_stop() {
        assert_eq!(Command::default(), Command::Stop);
    }

    #[test]
    fn parse_accepts_codes_and_names() {
        assert_eq!("f".parse::<Command>(), Ok(Command::Forward));
        assert_eq!("R".parse::<Command>(), Ok(Command::Right));
        assert_eq!("backward".parse::<Command>(), Ok(Command::Backward));
        assert_eq!(" STOP ".parse::<Command>(), Ok(Command::Stop));
        assert_eq!(
            "jump".parse::<Command>(),
            Err(ParseCommandError("jump".to_string()))
        );
    }

    #[test]
    fn labels_carry_arrows() {
        assert_eq!(Command::Left.label(), "← Left");
        assert_eq!(Command::Stop.label(), "■ Stop");
    }
}
