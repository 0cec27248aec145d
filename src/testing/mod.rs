//! in-memory node for tests.
//!
//! [`MockNode`] behaves like the node administrative API as seen through
//! [`NodeParticipationClient`]: generation is asynchronous and only shows up in
//! the key list once [`complete_generation`] is called (or immediately with
//! [`set_auto_complete`]).
//!
//! [`MockNode`]: ./struct.MockNode.html
//! [`NodeParticipationClient`]: ../node/trait.NodeParticipationClient.html
//! [`complete_generation`]: ./struct.MockNode.html#method.complete_generation
//! [`set_auto_complete`]: ./struct.MockNode.html#method.set_auto_complete

use crate::{
    node::{
        interfaces::AccountParticipationDto, Error, NodeParticipationClient, ParticipationKeyDto,
    },
    partkey::{Address, PartkeyId, Round, ADDRESS_LENGTH},
};
use reqwest::StatusCode;
use std::{
    convert::TryFrom,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

const BASE32_ALPHABET: &[u8; 32] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

/// a valid account address derived from `seed`, distinct for distinct seeds
pub fn address(seed: u32) -> Address {
    let mut text = vec![b'A'; ADDRESS_LENGTH];
    let mut value = seed;
    for slot in text.iter_mut().rev() {
        *slot = BASE32_ALPHABET[(value % 32) as usize];
        value /= 32;
        if value == 0 {
            break;
        }
    }
    // only ASCII from the base32 alphabet was written
    Address::try_from(String::from_utf8_lossy(&text).into_owned())
        .unwrap_or_else(|error| unreachable!("invalid test address: {}", error))
}

#[derive(Default)]
struct State {
    round: Round,
    keys: Vec<ParticipationKeyDto>,
    in_flight: Option<ParticipationKeyDto>,
    auto_complete: bool,
    unreachable: bool,
    rejection: Option<String>,
    next_id: u64,
    generate_calls: usize,
    deleted: Vec<String>,
}

impl State {
    fn new_key(
        &mut self,
        address: &Address,
        first: Round,
        last: Round,
        dilution: Option<u64>,
    ) -> ParticipationKeyDto {
        self.next_id += 1;
        ParticipationKeyDto {
            id: format!("PARTKEY{:045}", self.next_id),
            address: address.clone(),
            effective_first_valid: None,
            effective_last_valid: None,
            last_vote: None,
            last_block_proposal: None,
            key: AccountParticipationDto {
                vote_first_valid: first,
                vote_last_valid: last,
                vote_key_dilution: dilution,
                selection_participation_key: Some(format!("selection-{}", self.next_id)),
                vote_participation_key: Some(format!("vote-{}", self.next_id)),
                state_proof_key: Some(format!("state-proof-{}", self.next_id)),
            },
        }
    }

    fn check_reachable(&self) -> Result<(), Error> {
        if self.unreachable {
            Err(Error::Unreachable {
                reason: "mock node set unreachable".to_owned(),
            })
        } else {
            Ok(())
        }
    }
}

/// Cloning shares the same node: keep a clone in the test to drive the
/// node while the code under test owns the other one.
#[derive(Clone, Default)]
pub struct MockNode {
    state: Arc<Mutex<State>>,
}

impl MockNode {
    pub fn new(round: Round) -> Self {
        let node = MockNode::default();
        node.set_round(round);
        node
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn round(&self) -> Round {
        self.state().round
    }

    pub fn set_round(&self, round: Round) {
        self.state().round = round;
    }

    pub fn advance(&self, rounds: u64) {
        let mut state = self.state();
        state.round = state.round.saturating_add(rounds);
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.state().unreachable = unreachable;
    }

    /// complete every generation request right away
    pub fn set_auto_complete(&self, auto_complete: bool) {
        self.state().auto_complete = auto_complete;
    }

    /// make the next generation requests fail with a `400` and `reason`
    pub fn reject_generation(&self, reason: &str) {
        self.state().rejection = Some(reason.to_owned());
    }

    pub fn accept_generation(&self) {
        self.state().rejection = None;
    }

    /// install a key directly, as if generated earlier. Returns its id.
    pub fn insert_key(&self, address: &Address, first: Round, last: Round) -> String {
        let mut state = self.state();
        let key = state.new_key(address, first, last, None);
        let id = key.id.clone();
        state.keys.push(key);
        id
    }

    /// drop a key without going through the client, e.g. removed by an operator
    pub fn remove_key(&self, id: &str) -> bool {
        let mut state = self.state();
        let before = state.keys.len();
        state.keys.retain(|key| key.id != id);
        before != state.keys.len()
    }

    /// finish the generation in progress, returns false if there was none
    pub fn complete_generation(&self) -> bool {
        let mut state = self.state();
        match state.in_flight.take() {
            Some(key) => {
                state.keys.push(key);
                true
            }
            None => false,
        }
    }

    pub fn in_flight(&self) -> Option<PartkeyId> {
        self.state().in_flight.as_ref().map(|key| {
            PartkeyId::new(
                key.address.clone(),
                key.key.vote_first_valid,
                key.key.vote_last_valid,
            )
        })
    }

    pub fn keys(&self) -> Vec<ParticipationKeyDto> {
        self.state().keys.clone()
    }

    pub fn generate_calls(&self) -> usize {
        self.state().generate_calls
    }

    pub fn deleted_ids(&self) -> Vec<String> {
        self.state().deleted.clone()
    }
}

impl NodeParticipationClient for MockNode {
    fn current_round(&self) -> Result<Round, Error> {
        let state = self.state();
        state.check_reachable()?;
        Ok(state.round)
    }

    fn participation_keys(&self) -> Result<Vec<ParticipationKeyDto>, Error> {
        let state = self.state();
        state.check_reachable()?;
        Ok(state.keys.clone())
    }

    fn generate_participation_key(
        &self,
        address: &Address,
        first: Round,
        last: Round,
        dilution: Option<u64>,
    ) -> Result<(), Error> {
        let mut state = self.state();
        state.check_reachable()?;
        state.generate_calls += 1;
        if let Some(reason) = state.rejection.clone() {
            return Err(Error::UnexpectedStatus {
                status: StatusCode::BAD_REQUEST,
                body: reason,
            });
        }
        if first > last {
            return Err(Error::UnexpectedStatus {
                status: StatusCode::BAD_REQUEST,
                body: format!("first round {} is after last round {}", first, last),
            });
        }
        if state.in_flight.is_some() {
            return Err(Error::UnexpectedStatus {
                status: StatusCode::BAD_REQUEST,
                body: "participation key generation already in progress".to_owned(),
            });
        }
        let key = state.new_key(address, first, last, dilution);
        if state.auto_complete {
            state.keys.push(key);
        } else {
            state.in_flight = Some(key);
        }
        Ok(())
    }

    fn delete_participation_key(&self, id: &str) -> Result<(), Error> {
        let mut state = self.state();
        state.check_reachable()?;
        state.keys.retain(|key| key.id != id);
        state.deleted.push(id.to_owned());
        Ok(())
    }
}
