//! Ballot positions and cast results.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Vote identifier, unique among live votes.
pub type VoteId = u64;

/// A position on a vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ballot {
    Yes,
    No,
}

impl Ballot {
    pub fn opposite(self) -> Self {
        match self {
            Ballot::Yes => Ballot::No,
            Ballot::No => Ballot::Yes,
        }
    }
}

impl fmt::Display for Ballot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ballot::Yes => write!(f, "yes"),
            Ballot::No => write!(f, "no"),
        }
    }
}

impl FromStr for Ballot {
    type Err = String;

    /// Accepts the forms users type after `!vote`: `y`, `yes`, `yea`, `n`,
    /// `no`, `nay`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "y" | "yes" | "yea" | "aye" => Ok(Ballot::Yes),
            "n" | "no" | "nay" => Ok(Ballot::No),
            other => Err(format!("Ballot type not accepted: {}", other)),
        }
    }
}

/// Result of an accepted cast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stat {
    /// First ballot from this account.
    Added,
    /// The account moved to the other side.
    Changed,
}
