use super::{Address, PartkeyRecord, Round};
use std::collections::{vec_deque, VecDeque};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    #[error("partkey buffer is full (capacity of {capacity} records)")]
    CapacityExceeded { capacity: usize },
}

/// bounded FIFO of partkey records.
///
/// Insertion order is the generation order. The buffer does not reject
/// duplicates: it cannot see its sibling buffer, so deduplication is left to
/// the [`PartkeyManager`].
///
/// [`PartkeyManager`]: ../manager/struct.PartkeyManager.html
#[derive(Debug)]
pub struct PartkeyBuffer {
    capacity: usize,
    records: VecDeque<PartkeyRecord>,
}

impl PartkeyBuffer {
    pub fn new(capacity: usize) -> Self {
        PartkeyBuffer {
            capacity,
            records: VecDeque::with_capacity(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_full(&self) -> bool {
        self.records.len() >= self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, address: &Address, first: Round, last: Round) -> bool {
        self.records
            .iter()
            .any(|record| record.matches(address, first, last))
    }

    pub fn add(
        &mut self,
        address: Address,
        first: Round,
        last: Round,
        dilution: Option<u64>,
        scheduled_deletion: Option<Round>,
    ) -> Result<(), Error> {
        let record = PartkeyRecord::new(address, first, last)
            .with_dilution(dilution)
            .with_scheduled_deletion(scheduled_deletion);
        self.push(record)
    }

    /// append an already built record, taking ownership of it
    pub fn push(&mut self, record: PartkeyRecord) -> Result<(), Error> {
        if self.is_full() {
            return Err(Error::CapacityExceeded {
                capacity: self.capacity,
            });
        }
        self.records.push_back(record);
        Ok(())
    }

    pub fn peek_next(&self) -> Option<&PartkeyRecord> {
        self.records.front()
    }

    /// remove the oldest record. Popping an empty buffer is a no-op
    /// and returns `None`.
    pub fn pop_oldest(&mut self) -> Option<PartkeyRecord> {
        self.records.pop_front()
    }

    /// read view of the records, in insertion order
    pub fn all(&self) -> vec_deque::Iter<'_, PartkeyRecord> {
        self.records.iter()
    }

    pub fn find_mut(
        &mut self,
        address: &Address,
        first: Round,
        last: Round,
    ) -> Option<&mut PartkeyRecord> {
        self.records
            .iter_mut()
            .find(|record| record.matches(address, first, last))
    }

    pub fn remove(&mut self, address: &Address, first: Round, last: Round) -> Option<PartkeyRecord> {
        let position = self
            .records
            .iter()
            .position(|record| record.matches(address, first, last))?;
        self.records.remove(position)
    }

    /// remove every record matching `predicate`, returning them in
    /// insertion order. The remaining records keep their relative order.
    pub fn remove_where<F>(&mut self, mut predicate: F) -> Vec<PartkeyRecord>
    where
        F: FnMut(&PartkeyRecord) -> bool,
    {
        let mut removed = Vec::new();
        let mut kept = VecDeque::with_capacity(self.capacity);
        for record in self.records.drain(..) {
            if predicate(&record) {
                removed.push(record);
            } else {
                kept.push_back(record);
            }
        }
        self.records = kept;
        removed
    }
}
