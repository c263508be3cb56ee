/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! In-memory message store implementation.
//!
//! This module provides an in-memory message store suitable for tests and
//! applications that keep sequence state only for the life of the process,
//! plus a registry that shares stores between sessions.

use crate::traits::MessageStore;
use bytes::Bytes;
use fixwire_core::error::StoreError;
use fixwire_core::types::{Direction, SeqNum, SessionId};
use parking_lot::{RwLock, RwLockUpgradableReadGuard};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;
use tracing::{debug, warn};

/// Messages and counter for one direction.
#[derive(Debug)]
struct Journal {
    messages: RwLock<BTreeMap<u64, Bytes>>,
    next_seq: AtomicU64,
}

impl Journal {
    fn new(next_seq: u64) -> Self {
        Self {
            messages: RwLock::new(BTreeMap::new()),
            next_seq: AtomicU64::new(next_seq),
        }
    }
}

/// In-memory message store.
///
/// Stores messages in a `BTreeMap` per direction for efficient range queries.
/// Not persistent - all data is lost when the process exits.
#[derive(Debug)]
pub struct MemoryStore {
    inbound: Journal,
    outbound: Journal,
    /// Store creation time.
    creation_time: SystemTime,
}

impl MemoryStore {
    /// Creates a new empty memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::with_initial_seqs(1, 1)
    }

    /// Creates a new memory store with initial sequence numbers.
    ///
    /// # Arguments
    /// * `outbound` - Next sequence number to send
    /// * `inbound` - Next sequence number expected from the counterparty
    #[must_use]
    pub fn with_initial_seqs(outbound: u64, inbound: u64) -> Self {
        Self {
            inbound: Journal::new(inbound),
            outbound: Journal::new(outbound),
            creation_time: SystemTime::now(),
        }
    }

    /// Returns the number of stored messages in `direction`.
    #[must_use]
    pub fn message_count(&self, direction: Direction) -> usize {
        self.journal(direction).messages.read().len()
    }

    /// Checks if a message with the given sequence number exists.
    #[must_use]
    pub fn contains(&self, direction: Direction, seq_num: SeqNum) -> bool {
        self.journal(direction)
            .messages
            .read()
            .contains_key(&seq_num.value())
    }

    fn journal(&self, direction: Direction) -> &Journal {
        match direction {
            Direction::Inbound => &self.inbound,
            Direction::Outbound => &self.outbound,
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageStore for MemoryStore {
    fn append(
        &self,
        direction: Direction,
        seq_num: SeqNum,
        message: &[u8],
    ) -> Result<(), StoreError> {
        let journal = self.journal(direction);
        let mut messages = journal.messages.write();

        let last = messages.keys().next_back().copied().unwrap_or(0);
        if seq_num.value() <= last {
            warn!(?direction, seq = seq_num.value(), last, "store append out of order");
            return Err(StoreError::NotMonotonic {
                seq_num: seq_num.value(),
                last,
            });
        }

        messages.insert(seq_num.value(), Bytes::copy_from_slice(message));
        journal
            .next_seq
            .fetch_max(seq_num.next().value(), Ordering::SeqCst);
        Ok(())
    }

    fn range(
        &self,
        direction: Direction,
        begin: SeqNum,
        end: SeqNum,
    ) -> Result<Vec<(SeqNum, Bytes)>, StoreError> {
        if end < begin {
            return Ok(Vec::new());
        }

        let messages = self.journal(direction).messages.read();
        Ok(messages
            .range(begin.value()..=end.value())
            .map(|(seq, bytes)| (SeqNum::new(*seq), bytes.clone()))
            .collect())
    }

    fn next_seq(&self, direction: Direction) -> SeqNum {
        SeqNum::new(self.journal(direction).next_seq.load(Ordering::SeqCst))
    }

    fn set_next_seq(&self, direction: Direction, seq: SeqNum) {
        self.journal(direction)
            .next_seq
            .store(seq.value(), Ordering::SeqCst);
    }

    fn reset(&self) -> Result<(), StoreError> {
        for journal in [&self.inbound, &self.outbound] {
            let mut messages = journal.messages.write();
            messages.clear();
            journal.next_seq.store(1, Ordering::SeqCst);
        }
        debug!("store reset");
        Ok(())
    }

    fn creation_time(&self) -> SystemTime {
        self.creation_time
    }
}

/// Shared stores keyed by session.
///
/// Several sessions running on independent tasks can resolve their store
/// through one registry; each session still gets its own sequence space.
#[derive(Debug, Default)]
pub struct StoreRegistry {
    stores: RwLock<HashMap<SessionId, Arc<MemoryStore>>>,
}

impl StoreRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the store for `session`, creating it on first use.
    pub fn store_for(&self, session: &SessionId) -> Arc<MemoryStore> {
        let stores = self.stores.upgradable_read();
        if let Some(store) = stores.get(session) {
            return Arc::clone(store);
        }

        let mut stores = RwLockUpgradableReadGuard::upgrade(stores);
        debug!(session = %session, "creating store");
        Arc::clone(
            stores
                .entry(session.clone())
                .or_insert_with(|| Arc::new(MemoryStore::new())),
        )
    }

    /// Drops the store for `session`, returning it if present.
    pub fn remove(&self, session: &SessionId) -> Option<Arc<MemoryStore>> {
        self.stores.write().remove(session)
    }

    /// Returns the number of registered sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stores.read().len()
    }

    /// Returns true if no session has a store yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stores.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fixwire_core::types::CompId;
    use std::thread;

    fn seq(n: u64) -> SeqNum {
        SeqNum::new(n)
    }

    #[test]
    fn test_memory_store_new() {
        let store = MemoryStore::new();
        assert_eq!(store.next_seq(Direction::Outbound), seq(1));
        assert_eq!(store.next_seq(Direction::Inbound), seq(1));
        assert_eq!(store.message_count(Direction::Outbound), 0);
    }

    #[test]
    fn test_append_advances_next_seq() {
        let store = MemoryStore::new();

        store.append(Direction::Outbound, seq(1), b"msg1").unwrap();
        store.append(Direction::Outbound, seq(2), b"msg2").unwrap();

        assert_eq!(store.next_seq(Direction::Outbound), seq(3));
        assert_eq!(store.next_seq(Direction::Inbound), seq(1));
        assert!(store.contains(Direction::Outbound, seq(2)));
        assert!(!store.contains(Direction::Inbound, seq(2)));
    }

    #[test]
    fn test_append_rejects_non_increasing() {
        let store = MemoryStore::new();
        store.append(Direction::Inbound, seq(5), b"msg5").unwrap();

        assert_eq!(
            store.append(Direction::Inbound, seq(5), b"again"),
            Err(StoreError::NotMonotonic { seq_num: 5, last: 5 })
        );
        assert_eq!(
            store.append(Direction::Inbound, seq(3), b"old"),
            Err(StoreError::NotMonotonic { seq_num: 3, last: 5 })
        );
        assert!(store.append(Direction::Inbound, seq(0), b"zero").is_err());
    }

    #[test]
    fn test_append_at_top_of_range() {
        let store = MemoryStore::new();
        store.append(Direction::Inbound, SeqNum::MAX, b"last").unwrap();
        store
            .append(Direction::Inbound, seq(u64::MAX), b"past")
            .unwrap();

        assert_eq!(store.next_seq(Direction::Inbound), seq(u64::MAX));
        assert!(
            store
                .append(Direction::Inbound, seq(u64::MAX), b"again")
                .is_err()
        );
    }

    #[test]
    fn test_range_reports_holes() {
        let store = MemoryStore::new();
        store.append(Direction::Outbound, seq(1), b"msg1").unwrap();
        store.append(Direction::Outbound, seq(2), b"msg2").unwrap();
        store.append(Direction::Outbound, seq(5), b"msg5").unwrap();

        let range = store
            .range(Direction::Outbound, seq(2), seq(5))
            .unwrap();
        let seqs: Vec<u64> = range.iter().map(|(s, _)| s.value()).collect();
        assert_eq!(seqs, vec![2, 5]);
        assert_eq!(&range[1].1[..], b"msg5");

        assert!(
            store
                .range(Direction::Outbound, seq(4), seq(3))
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn test_set_next_seq() {
        let store = MemoryStore::with_initial_seqs(10, 20);
        assert_eq!(store.next_seq(Direction::Outbound), seq(10));
        assert_eq!(store.next_seq(Direction::Inbound), seq(20));

        store.set_next_seq(Direction::Inbound, seq(25));
        assert_eq!(store.next_seq(Direction::Inbound), seq(25));
    }

    #[test]
    fn test_reset() {
        let store = MemoryStore::new();
        store.append(Direction::Outbound, seq(1), b"msg1").unwrap();
        store.set_next_seq(Direction::Inbound, seq(20));

        store.reset().unwrap();

        assert_eq!(store.message_count(Direction::Outbound), 0);
        assert_eq!(store.next_seq(Direction::Outbound), seq(1));
        assert_eq!(store.next_seq(Direction::Inbound), seq(1));
    }

    #[test]
    fn test_concurrent_append_and_range() {
        let store = Arc::new(MemoryStore::new());

        let writers: Vec<_> = [Direction::Inbound, Direction::Outbound]
            .into_iter()
            .map(|direction| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for n in 1..=500 {
                        store.append(direction, seq(n), b"payload").unwrap();
                        let _ = store.range(direction, seq(1), seq(n)).unwrap();
                    }
                })
            })
            .collect();

        for writer in writers {
            writer.join().unwrap();
        }

        assert_eq!(store.message_count(Direction::Inbound), 500);
        assert_eq!(store.message_count(Direction::Outbound), 500);
        assert_eq!(store.next_seq(Direction::Outbound), seq(501));
    }

    #[test]
    fn test_registry_shares_store_per_session() {
        let registry = StoreRegistry::new();
        let a = SessionId::new(
            "FIX.4.2",
            CompId::new("A").unwrap(),
            CompId::new("B").unwrap(),
        );
        let b = SessionId::new(
            "FIX.4.2",
            CompId::new("A").unwrap(),
            CompId::new("C").unwrap(),
        );

        let first = registry.store_for(&a);
        first.append(Direction::Outbound, seq(1), b"x").unwrap();

        assert_eq!(registry.store_for(&a).next_seq(Direction::Outbound), seq(2));
        assert_eq!(registry.store_for(&b).next_seq(Direction::Outbound), seq(1));
        assert_eq!(registry.len(), 2);

        assert!(registry.remove(&a).is_some());
        assert_eq!(registry.len(), 1);
    }
}
