use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

/// Lifecycle state reported by the server for a submitted payload.
///
/// Parsing never fails: anything outside the known vocabulary becomes
/// [`Status::Error`], so an unrecognized state can never keep a poll alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", from = "String")]
pub enum Status {
    Processing,
    Finished,
    Error,
}

impl Status {
    /// Normalize a raw server token
    pub fn parse(token: &str) -> Self {
        match token {
            "processing" | "running" => Self::Processing,
            // "successfull" is a spelling the server actually emits
            "finished" | "success" | "successfull" => Self::Finished,
            _ => Self::Error,
        }
    }

    /// Whether this status ends the poll
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Processing)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Processing => "processing",
            Self::Finished => "finished",
            Self::Error => "error",
        }
    }
}

impl FromStr for Status {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl From<&str> for Status {
    fn from(token: &str) -> Self {
        Self::parse(token)
    }
}

impl From<String> for Status {
    fn from(token: String) -> Self {
        Self::parse(&token)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
