//! access to the consensus node's administrative API.
//!
//! Everything the daemon knows about existing keys comes from here: the node
//! generates the keys, assigns their identifiers and is authoritative about
//! round validity.

mod host_addr;
pub mod interfaces;
pub mod rest;

pub use self::host_addr::HostAddr;
pub use self::interfaces::{NodeStatusDto, ParticipationKeyDto};
pub use self::rest::RestNodeClient;

use crate::partkey::{Address, Round};
use reqwest::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to make a REST request")]
    Request(#[from] reqwest::Error),
    #[error("node answered with status {status}: {body}")]
    UnexpectedStatus { status: StatusCode, body: String },
    #[error("could not deserialize the node response")]
    Deserialization(#[from] serde_json::Error),
    #[error("node host address can't be used as a base url")]
    InvalidHost,
    #[error("node is unreachable: {reason}")]
    Unreachable { reason: String },
}

/// The participation key operations of a node.
///
/// Any call may fail transiently; callers are expected to retry on their
/// next tick rather than to abort.
pub trait NodeParticipationClient {
    /// latest round the node has seen
    fn current_round(&self) -> Result<Round, Error>;

    /// every participation key installed on the node
    fn participation_keys(&self) -> Result<Vec<ParticipationKeyDto>, Error>;

    /// ask the node to start generating a key. Generation runs in the
    /// background on the node, completion is observed through
    /// [`participation_keys`](#tymethod.participation_keys).
    fn generate_participation_key(
        &self,
        address: &Address,
        first: Round,
        last: Round,
        dilution: Option<u64>,
    ) -> Result<(), Error>;

    /// remove a key by its node identifier. Removing an unknown
    /// identifier is not an error.
    fn delete_participation_key(&self, id: &str) -> Result<(), Error>;
}

impl<'a, N: NodeParticipationClient + ?Sized> NodeParticipationClient for &'a N {
    fn current_round(&self) -> Result<Round, Error> {
        (**self).current_round()
    }

    fn participation_keys(&self) -> Result<Vec<ParticipationKeyDto>, Error> {
        (**self).participation_keys()
    }

    fn generate_participation_key(
        &self,
        address: &Address,
        first: Round,
        last: Round,
        dilution: Option<u64>,
    ) -> Result<(), Error> {
        (**self).generate_participation_key(address, first, last, dilution)
    }

    fn delete_participation_key(&self, id: &str) -> Result<(), Error> {
        (**self).delete_participation_key(id)
    }
}
