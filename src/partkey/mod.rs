/*!
Participation keys as tracked by the daemon.

A participation key ("partkey") is identified by the account it belongs to and
the validity window `[vote_first_valid, vote_last_valid]` it covers. The
daemon never holds the key material itself: the node generates the key and is
the sole source of truth about which keys exist. The records kept here are
only the bookkeeping needed to drive the node.

```text
  request_generation            refresh                 refresh
 ------------------> [pending] ---------> (generating) --------> [generated]
                                                                      |
                          prune_expired / delete_scheduled / delete_one
                                                                      v
                                                                   dropped
```

A record lives in exactly one [`PartkeyBuffer`] at a time and is moved, never
copied, from `pending` to `generated`.

[`PartkeyBuffer`]: ./buffer/struct.PartkeyBuffer.html
*/

pub mod buffer;
pub mod manager;

pub use self::buffer::PartkeyBuffer;
pub use self::manager::{
    AdmissionResult, GenerationResult, PartkeyManager, Progress, RefreshReport,
};

use serde::{Deserialize, Serialize};
use std::{
    convert::TryFrom,
    fmt::{self, Display},
    num::ParseIntError,
    str::FromStr,
};
use thiserror::Error;

/// length of a base32 encoded account address (32 bytes key + 4 bytes checksum)
pub const ADDRESS_LENGTH: usize = 58;

/// the consensus network's unit of time
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Round(u64);

impl Round {
    pub const fn new(round: u64) -> Self {
        Round(round)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }

    pub fn saturating_add(self, rounds: u64) -> Self {
        Round(self.0.saturating_add(rounds))
    }
}

impl From<u64> for Round {
    fn from(round: u64) -> Self {
        Round(round)
    }
}

impl From<Round> for u64 {
    fn from(round: Round) -> Self {
        round.0
    }
}

impl Display for Round {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for Round {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(Round)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("account address must be {expected} characters long, found {found}")]
    InvalidLength { expected: usize, found: usize },
    #[error("account address contains non base32 character '{0}'")]
    InvalidCharacter(char),
}

/// an account address, in its base32 text form
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(String);

impl Address {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Address {
    type Error = AddressError;

    fn try_from(address: String) -> Result<Self, Self::Error> {
        if address.len() != ADDRESS_LENGTH {
            return Err(AddressError::InvalidLength {
                expected: ADDRESS_LENGTH,
                found: address.chars().count(),
            });
        }
        if let Some(invalid) = address
            .chars()
            .find(|c| !matches!(c, 'A'..='Z' | '2'..='7'))
        {
            return Err(AddressError::InvalidCharacter(invalid));
        }
        Ok(Address(address))
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Address::try_from(s.trim().to_owned())
    }
}

impl From<Address> for String {
    fn from(address: Address) -> Self {
        address.0
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// identity of a partkey: the account and its validity window.
///
/// Two records with the same identity are the same key as far as the
/// daemon is concerned, whatever the node assigned as identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct PartkeyId {
    pub address: Address,
    pub first: Round,
    pub last: Round,
}

impl PartkeyId {
    pub fn new(address: Address, first: Round, last: Round) -> Self {
        PartkeyId {
            address,
            first,
            last,
        }
    }
}

impl Display for PartkeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}..={}]", self.address, self.first, self.last)
    }
}

/// public part of the key material, as reported by the node once generated
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct KeyMaterial {
    pub selection_participation_key: Option<String>,
    pub vote_participation_key: Option<String>,
    pub state_proof_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct PartkeyRecord {
    pub address: Address,
    pub vote_first_valid: Round,
    pub vote_last_valid: Round,
    pub vote_key_dilution: Option<u64>,
    pub scheduled_deletion: Option<Round>,
    /// identifier assigned by the node, only known once the key exists
    pub node_id: Option<String>,
    pub key_material: Option<KeyMaterial>,
}

impl PartkeyRecord {
    pub fn new(address: Address, vote_first_valid: Round, vote_last_valid: Round) -> Self {
        PartkeyRecord {
            address,
            vote_first_valid,
            vote_last_valid,
            vote_key_dilution: None,
            scheduled_deletion: None,
            node_id: None,
            key_material: None,
        }
    }

    pub fn with_dilution(mut self, dilution: Option<u64>) -> Self {
        self.vote_key_dilution = dilution;
        self
    }

    pub fn with_scheduled_deletion(mut self, round: Option<Round>) -> Self {
        self.scheduled_deletion = round;
        self
    }

    pub fn id(&self) -> PartkeyId {
        PartkeyId::new(
            self.address.clone(),
            self.vote_first_valid,
            self.vote_last_valid,
        )
    }

    pub fn matches(&self, address: &Address, first: Round, last: Round) -> bool {
        self.vote_first_valid == first && self.vote_last_valid == last && &self.address == address
    }

    /// the window has elapsed: the network no longer honors this key
    pub fn is_expired(&self, current_round: Round) -> bool {
        self.vote_last_valid <= current_round
    }

    pub fn is_deletion_due(&self, current_round: Round) -> bool {
        self.scheduled_deletion
            .map_or(false, |round| round <= current_round)
    }
}
