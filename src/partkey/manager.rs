use super::{
    buffer::{self, PartkeyBuffer},
    Address, PartkeyId, PartkeyRecord, Round,
};
use crate::node::{self, NodeParticipationClient, ParticipationKeyDto};
use std::fmt::{self, Display};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("participation key {id} is not tracked as generated")]
    NotTracked { id: PartkeyId },
    #[error("participation key {id} is tracked but the node does not report it (yet)")]
    NotYetGenerated { id: PartkeyId },
    #[error("head of the pending queue {id} does not exist on the node")]
    HeadNotOnNode { id: PartkeyId },
    #[error("no participation key is pending generation")]
    NothingPending,
    #[error("participation key {id} is not the head of the pending queue")]
    NotPendingHead { id: PartkeyId },
    #[error(transparent)]
    Buffer(#[from] buffer::Error),
    #[error("node request failed")]
    Node(#[from] node::Error),
}

/// outcome of a generation request. Only `Accepted` queues the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionResult {
    Accepted,
    AlreadyPending,
    AlreadyGenerated,
    PendingFull,
    GeneratedFull,
    NodeUnreachable,
    WindowInPast,
}

impl AdmissionResult {
    pub fn is_accepted(self) -> bool {
        self == AdmissionResult::Accepted
    }
}

impl Display for AdmissionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AdmissionResult::Accepted => "accepted",
            AdmissionResult::AlreadyPending => "already pending",
            AdmissionResult::AlreadyGenerated => "already generated",
            AdmissionResult::PendingFull => "pending queue full",
            AdmissionResult::GeneratedFull => "generated set full",
            AdmissionResult::NodeUnreachable => "node unreachable",
            AdmissionResult::WindowInPast => "window in the past",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationResult {
    Started,
    /// the node is already building a key
    Busy,
}

/// what the generation step of a [`refresh`] did
///
/// [`refresh`]: ./struct.PartkeyManager.html#method.refresh
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Progress {
    /// nothing pending, nothing generating
    Idle,
    /// the in-flight key is not on the node yet
    Waiting(PartkeyId),
    /// the in-flight key appeared on the node and is now tracked as generated
    Completed(PartkeyId),
    /// generation of the next pending key was requested
    Started(PartkeyId),
}

#[derive(Debug)]
pub struct RefreshReport {
    pub pruned: usize,
    pub deleted: usize,
    pub progress: Progress,
    /// sub-steps that failed this tick; they are retried on the next one
    pub failures: Vec<Error>,
}

impl RefreshReport {
    fn new() -> Self {
        RefreshReport {
            pruned: 0,
            deleted: 0,
            progress: Progress::Idle,
            failures: Vec::new(),
        }
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Keeps the node's participation keys in line with the requested windows.
///
/// Windows are admitted into `pending`, generated one at a time by the node
/// (generation is CPU bound and the node can only build one key at a time),
/// then tracked in `generated` until they expire or their scheduled
/// deletion round is reached.
///
/// Nothing is persisted: after a restart [`reconcile_from_node`] rebuilds
/// `generated` from what the node holds.
///
/// The manager is driven serially by the daemon loop and does no locking.
///
/// [`reconcile_from_node`]: #method.reconcile_from_node
pub struct PartkeyManager<N> {
    pending: PartkeyBuffer,
    generated: PartkeyBuffer,
    /// when set, the head of `pending` is being built by the node
    generating: bool,
    node: N,
}

impl<N: NodeParticipationClient> PartkeyManager<N> {
    pub fn new(node: N, pending_capacity: usize, generated_capacity: usize) -> Self {
        PartkeyManager {
            pending: PartkeyBuffer::new(pending_capacity),
            generated: PartkeyBuffer::new(generated_capacity),
            generating: false,
            node,
        }
    }

    pub fn node(&self) -> &N {
        &self.node
    }

    pub fn pending(&self) -> &PartkeyBuffer {
        &self.pending
    }

    pub fn generated(&self) -> &PartkeyBuffer {
        &self.generated
    }

    pub fn is_generating(&self) -> bool {
        self.generating
    }

    pub fn request_generation(
        &mut self,
        address: &Address,
        first: Round,
        last: Round,
        dilution: Option<u64>,
    ) -> AdmissionResult {
        self.request_generation_with_deletion(address, first, last, dilution, None)
    }

    /// Admit a window for generation, optionally scheduling the deletion of
    /// the key once `scheduled_deletion` is reached.
    ///
    /// Never fails: every rejection, node outages included, is reported as
    /// an [`AdmissionResult`]. A window whose scheduled deletion round has
    /// already been reached is treated as elapsed.
    ///
    /// [`AdmissionResult`]: ./enum.AdmissionResult.html
    pub fn request_generation_with_deletion(
        &mut self,
        address: &Address,
        first: Round,
        last: Round,
        dilution: Option<u64>,
        scheduled_deletion: Option<Round>,
    ) -> AdmissionResult {
        let current_round = match self.node.current_round() {
            Ok(round) => round,
            Err(error) => {
                tracing::debug!(%error, "cannot query the node current round");
                return AdmissionResult::NodeUnreachable;
            }
        };

        if last <= current_round || scheduled_deletion.map_or(false, |round| round <= current_round)
        {
            return AdmissionResult::WindowInPast;
        }
        if self.pending.contains(address, first, last) {
            return AdmissionResult::AlreadyPending;
        }
        if self.generated.contains(address, first, last) {
            return AdmissionResult::AlreadyGenerated;
        }
        if self.pending.is_full() {
            return AdmissionResult::PendingFull;
        }
        if self.generated.is_full() {
            return AdmissionResult::GeneratedFull;
        }

        match self
            .pending
            .add(address.clone(), first, last, dilution, scheduled_deletion)
        {
            Ok(()) => {
                tracing::info!(%address, %first, %last, "participation key queued for generation");
                AdmissionResult::Accepted
            }
            Err(buffer::Error::CapacityExceeded { .. }) => AdmissionResult::PendingFull,
        }
    }

    /// Ask the node to build `record`, unless it is already building one.
    ///
    /// `record` must be the head of the pending queue. Node side validation
    /// errors (e.g. a malformed window) are returned as is.
    pub fn generate_next(&mut self, record: &PartkeyRecord) -> Result<GenerationResult, Error> {
        if self.generating {
            return Ok(GenerationResult::Busy);
        }
        match self.pending.peek_next() {
            Some(head)
                if head.matches(
                    &record.address,
                    record.vote_first_valid,
                    record.vote_last_valid,
                ) => {}
            Some(_) => return Err(Error::NotPendingHead { id: record.id() }),
            None => return Err(Error::NothingPending),
        }

        self.node.generate_participation_key(
            &record.address,
            record.vote_first_valid,
            record.vote_last_valid,
            record.vote_key_dilution,
        )?;
        self.generating = true;
        tracing::info!(key = %record.id(), "participation key generation started");
        Ok(GenerationResult::Started)
    }

    pub fn is_generated(&self, address: &Address, first: Round, last: Round) -> Result<bool, Error> {
        Ok(self.find_on_node(address, first, last)?.is_some())
    }

    /// Move the head of `pending` into `generated` once the node built it.
    ///
    /// The head must exist on the node, this is checked against the node key
    /// list and reported as `HeadNotOnNode` otherwise. If `generated` is full
    /// nothing moves and the error is returned.
    pub fn move_head_to_generated(&mut self) -> Result<(), Error> {
        let head = self.pending.peek_next().ok_or(Error::NothingPending)?;
        let id = head.id();
        if self.generated.is_full() {
            return Err(buffer::Error::CapacityExceeded {
                capacity: self.generated.capacity(),
            }
            .into());
        }
        let on_node = self
            .find_on_node(&id.address, id.first, id.last)?
            .ok_or_else(|| Error::HeadNotOnNode { id: id.clone() })?;

        let mut record = self.pending.pop_oldest().ok_or(Error::NothingPending)?;
        record.enrich_from_node(&on_node);
        self.generated.push(record)?;
        self.generating = false;
        tracing::info!(key = %id, node_id = %on_node.id, "participation key generated");
        Ok(())
    }

    /// Track every live key present on the node and missing from `generated`.
    ///
    /// Keys already elapsed are left out, as are keys still at the head of
    /// `pending`: those are moved by [`refresh`] once their generation is
    /// observed. Additive and idempotent, returns how many records were added.
    ///
    /// [`refresh`]: #method.refresh
    pub fn reconcile_from_node(&mut self) -> Result<usize, Error> {
        let current_round = self.node.current_round()?;
        let keys = self.node.participation_keys()?;
        let mut added = 0;
        for key in keys.iter() {
            let (first, last) = (key.key.vote_first_valid, key.key.vote_last_valid);
            if last <= current_round || self.pending.contains(&key.address, first, last) {
                continue;
            }
            if let Some(tracked) = self.generated.find_mut(&key.address, first, last) {
                if tracked.node_id.is_none() {
                    tracked.enrich_from_node(key);
                }
                continue;
            }
            self.generated.push(PartkeyRecord::from(key))?;
            added += 1;
        }
        if added > 0 {
            tracing::info!(added, "participation keys recovered from the node");
        }
        Ok(added)
    }

    /// Forget the generated keys whose window has elapsed. The node is left
    /// untouched: the network no longer honors these keys anyway.
    pub fn prune_expired(&mut self) -> Result<usize, Error> {
        let current_round = self.node.current_round()?;
        let pruned = self
            .generated
            .remove_where(|record| record.is_expired(current_round));
        for record in pruned.iter() {
            tracing::info!(key = %record.id(), %current_round, "expired participation key pruned");
        }
        Ok(pruned.len())
    }

    /// Delete from the node the generated keys whose scheduled deletion round
    /// is reached. Stops at the first failing deletion, the remaining ones
    /// are left tracked for a later attempt.
    pub fn delete_scheduled(&mut self) -> Result<usize, Error> {
        let current_round = self.node.current_round()?;
        let due: Vec<PartkeyRecord> = self
            .generated
            .all()
            .filter(|record| record.is_deletion_due(current_round))
            .cloned()
            .collect();
        if due.is_empty() {
            return Ok(0);
        }

        let mut on_node = None;
        let mut deleted = 0;
        for record in due {
            let node_id = match &record.node_id {
                Some(node_id) => Some(node_id.clone()),
                None => {
                    if on_node.is_none() {
                        on_node = Some(self.node.participation_keys()?);
                    }
                    on_node
                        .iter()
                        .flatten()
                        .find(|key| {
                            key.matches(
                                &record.address,
                                record.vote_first_valid,
                                record.vote_last_valid,
                            )
                        })
                        .map(|key| key.id.clone())
                }
            };
            if let Some(node_id) = &node_id {
                self.node.delete_participation_key(node_id)?;
            }
            self.generated.remove(
                &record.address,
                record.vote_first_valid,
                record.vote_last_valid,
            );
            deleted += 1;
            tracing::info!(key = %record.id(), %current_round, "scheduled participation key deletion");
        }
        Ok(deleted)
    }

    /// Delete one generated key from the node and stop tracking it.
    pub fn delete_one(&mut self, address: &Address, first: Round, last: Round) -> Result<(), Error> {
        if !self.generated.contains(address, first, last) {
            return Err(Error::NotTracked {
                id: PartkeyId::new(address.clone(), first, last),
            });
        }
        let on_node = self
            .find_on_node(address, first, last)?
            .ok_or_else(|| Error::NotYetGenerated {
                id: PartkeyId::new(address.clone(), first, last),
            })?;
        self.node.delete_participation_key(&on_node.id)?;
        self.generated.remove(address, first, last);
        tracing::info!(%address, %first, %last, node_id = %on_node.id, "participation key deleted");
        Ok(())
    }

    /// Plan the deletion of a generated key ahead of its expiry.
    pub fn schedule_deletion(
        &mut self,
        address: &Address,
        first: Round,
        last: Round,
        round: Round,
    ) -> Result<(), Error> {
        let record = self
            .generated
            .find_mut(address, first, last)
            .ok_or_else(|| Error::NotTracked {
                id: PartkeyId::new(address.clone(), first, last),
            })?;
        record.scheduled_deletion = Some(round);
        Ok(())
    }

    /// Periodic maintenance, called on every daemon tick.
    ///
    /// Each step is guarded on its own: a failing node call is recorded in
    /// the report and does not prevent the remaining steps from running.
    /// Progress of the in-flight generation is always checked before a new
    /// one is started.
    pub fn refresh(&mut self) -> RefreshReport {
        let mut report = RefreshReport::new();

        match self.prune_expired() {
            Ok(pruned) => report.pruned = pruned,
            Err(error) => report.failures.push(error),
        }
        match self.delete_scheduled() {
            Ok(deleted) => report.deleted = deleted,
            Err(error) => report.failures.push(error),
        }

        if self.generating {
            report.progress = self.check_generation(&mut report.failures);
        } else if let Some(next) = self.pending.peek_next().cloned() {
            match self.generate_next(&next) {
                Ok(GenerationResult::Started) => report.progress = Progress::Started(next.id()),
                Ok(GenerationResult::Busy) => report.progress = Progress::Waiting(next.id()),
                Err(error) => report.failures.push(error),
            }
        }

        for failure in report.failures.iter() {
            tracing::warn!(error = %failure, "participation key maintenance step failed");
        }
        report
    }

    fn check_generation(&mut self, failures: &mut Vec<Error>) -> Progress {
        let head = match self.pending.peek_next() {
            Some(head) => head.id(),
            None => {
                self.generating = false;
                return Progress::Idle;
            }
        };
        match self.is_generated(&head.address, head.first, head.last) {
            Ok(true) => match self.move_head_to_generated() {
                Ok(()) => Progress::Completed(head),
                Err(error) => {
                    failures.push(error);
                    Progress::Waiting(head)
                }
            },
            Ok(false) => {
                tracing::debug!(key = %head, "waiting for the node to finish generation");
                Progress::Waiting(head)
            }
            Err(error) => {
                failures.push(error);
                Progress::Waiting(head)
            }
        }
    }

    fn find_on_node(
        &self,
        address: &Address,
        first: Round,
        last: Round,
    ) -> Result<Option<ParticipationKeyDto>, Error> {
        Ok(self
            .node
            .participation_keys()?
            .into_iter()
            .find(|key| key.matches(address, first, last)))
    }
}
