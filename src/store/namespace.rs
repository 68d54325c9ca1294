//! The two replicated namespaces.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::StoreError;

/// Which key space a record lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Namespace {
    /// User accounts: `name -> {"password": ...}`.
    Users,
    /// Auction documents keyed by auction id.
    Bids,
}

impl Namespace {
    pub const ALL: [Namespace; 2] = [Namespace::Users, Namespace::Bids];

    pub fn as_str(&self) -> &'static str {
        match self {
            Namespace::Users => "users",
            Namespace::Bids => "bids",
        }
    }

    /// File name of the namespace inside the data directory.
    pub fn file_name(&self) -> &'static str {
        match self {
            Namespace::Users => "users.json",
            Namespace::Bids => "bids.json",
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Namespace {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "users" => Ok(Namespace::Users),
            "bids" => Ok(Namespace::Bids),
            other => Err(StoreError::InvalidNamespace(other.to_string())),
        }
    }
}
