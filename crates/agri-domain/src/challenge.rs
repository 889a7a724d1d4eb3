//! Challenge lifecycle and code alphabet types.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Lifecycle state of a challenge.
///
/// `Pending` is the only non-terminal state. Transitions:
/// `pending → verified | failed | expired`, or `pending → pending` on a wrong
/// code with attempts remaining.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeStatus {
    Pending,
    Verified,
    Expired,
    Failed,
    Blocked,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown challenge status: {0}")]
pub struct UnknownStatus(pub String);

impl ChallengeStatus {
    pub const ALL: [ChallengeStatus; 5] = [
        Self::Pending,
        Self::Verified,
        Self::Expired,
        Self::Failed,
        Self::Blocked,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Verified => "verified",
            Self::Expired => "expired",
            Self::Failed => "failed",
            Self::Blocked => "blocked",
        }
    }
}

impl fmt::Display for ChallengeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChallengeStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|st| st.as_str() == s)
            .ok_or_else(|| UnknownStatus(s.to_owned()))
    }
}

/// Character set used for generated codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodeAlphabet {
    /// `0-9`, first character never `0`.
    #[default]
    Numeric,
    /// `A-Z0-9`.
    Alphanumeric,
}

impl FromStr for CodeAlphabet {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "numeric" => Ok(Self::Numeric),
            "alphanumeric" => Ok(Self::Alphanumeric),
            other => Err(format!("unknown code alphabet: {other}")),
        }
    }
}
