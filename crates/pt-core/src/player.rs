//! Player identity.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Number of characters used when a player has no cached name.
const SHORT_ID_LEN: usize = 8;

/// A string that does not parse as a player UUID.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid player id: {value}")]
pub struct InvalidPlayerId {
    pub value: String,
}

/// A globally unique player identifier.
///
/// Display names are never part of identity; two players may share a name
/// and one player may change names between sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(Uuid);

impl PlayerId {
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Generates a random identifier.
    #[must_use]
    pub fn new_random() -> Self {
        Self(Uuid::new_v4())
    }

    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Returns a fixed-length prefix of the hyphenated form.
    ///
    /// Used as a stand-in name for players that were never seen with one.
    #[must_use]
    pub fn short(&self) -> String {
        let mut text = self.0.hyphenated().to_string();
        text.truncate(SHORT_ID_LEN);
        text
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for PlayerId {
    type Err = InvalidPlayerId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|_| InvalidPlayerId {
                value: s.to_string(),
            })
    }
}

impl From<Uuid> for PlayerId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// A player currently reported online by the host, with their live name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterEntry {
    pub player: PlayerId,
    pub name: String,
}

impl RosterEntry {
    pub fn new(player: PlayerId, name: impl Into<String>) -> Self {
        Self {
            player,
            name: name.into(),
        }
    }
}
