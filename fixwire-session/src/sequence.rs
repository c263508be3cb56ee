/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Sequence number tracking.
//!
//! This module provides atomic sequence number tracking for FIX sessions:
//! allocation of outgoing numbers and classification of incoming ones.

use fixwire_core::error::SequenceError;
use fixwire_core::types::{Direction, SeqNum};
use fixwire_store::MessageStore;
use std::sync::atomic::{AtomicU64, Ordering};

/// Tracks both sequence counters of one session.
///
/// Uses atomic operations so a shared reference is enough to allocate or
/// advance; both counters only ever move forward.
#[derive(Debug)]
pub struct SequenceTracker {
    /// Next outgoing sequence number.
    next_outgoing: AtomicU64,
    /// Next expected incoming sequence number.
    expected_incoming: AtomicU64,
}

impl SequenceTracker {
    /// Creates a new tracker with sequence numbers starting at 1.
    #[must_use]
    pub fn new() -> Self {
        Self::with_initial(1, 1)
    }

    /// Creates a new tracker with specified starting values.
    ///
    /// # Arguments
    /// * `outgoing` - Next sequence number to send
    /// * `incoming` - Next sequence number expected from the counterparty
    #[must_use]
    pub fn with_initial(outgoing: u64, incoming: u64) -> Self {
        Self {
            next_outgoing: AtomicU64::new(outgoing.max(1)),
            expected_incoming: AtomicU64::new(incoming.max(1)),
        }
    }

    /// Creates a tracker that continues where `store` left off.
    #[must_use]
    pub fn resume(store: &dyn MessageStore) -> Self {
        Self::with_initial(
            store.next_seq(Direction::Outbound).value(),
            store.next_seq(Direction::Inbound).value(),
        )
    }

    /// Returns the next outgoing sequence number without allocating it.
    #[inline]
    #[must_use]
    pub fn peek_outgoing(&self) -> SeqNum {
        SeqNum::new(self.next_outgoing.load(Ordering::SeqCst))
    }

    /// Returns the next expected incoming sequence number.
    #[inline]
    #[must_use]
    pub fn expected_incoming(&self) -> SeqNum {
        SeqNum::new(self.expected_incoming.load(Ordering::SeqCst))
    }

    /// Allocates and returns the next outgoing sequence number.
    ///
    /// This atomically increments the counter and returns the value before
    /// the increment, so no number is handed out twice.
    #[inline]
    pub fn next_outgoing(&self) -> SeqNum {
        SeqNum::new(self.next_outgoing.fetch_add(1, Ordering::SeqCst))
    }

    /// Classifies an incoming sequence number.
    ///
    /// Only [`SequenceOutcome::InOrder`] advances the expected counter.
    /// A number with no successor is never in order and reports as a gap.
    pub fn observe_incoming(&self, received: SeqNum) -> SequenceOutcome {
        let received = received.value();
        let Some(following) = received.checked_add(1) else {
            let expected = self.expected_incoming.load(Ordering::SeqCst);
            return SequenceOutcome::Gap { expected, received };
        };
        let result = self.expected_incoming.compare_exchange(
            received,
            following,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );

        match result {
            Ok(_) => SequenceOutcome::InOrder,
            Err(expected) if received < expected => {
                SequenceOutcome::Duplicate { expected, received }
            }
            Err(expected) => SequenceOutcome::Gap { expected, received },
        }
    }

    /// Moves the expected incoming number forward to `seq`.
    ///
    /// Returns false and leaves the counter unchanged if `seq` is lower than
    /// the current expectation.
    pub fn advance_incoming_to(&self, seq: SeqNum) -> bool {
        let previous = self
            .expected_incoming
            .fetch_max(seq.value(), Ordering::SeqCst);
        previous <= seq.value()
    }
}

impl Default for SequenceTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of classifying an incoming sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceOutcome {
    /// Sequence number is as expected; the counter advanced.
    InOrder,
    /// Sequence number is lower than expected (possible duplicate).
    Duplicate {
        /// Expected sequence number.
        expected: u64,
        /// Received sequence number.
        received: u64,
    },
    /// Sequence number is higher than expected (gap detected).
    Gap {
        /// Expected sequence number.
        expected: u64,
        /// Received sequence number.
        received: u64,
    },
}

impl SequenceOutcome {
    /// Returns true if the sequence is in order.
    #[must_use]
    pub const fn is_in_order(&self) -> bool {
        matches!(self, Self::InOrder)
    }

    /// Returns true if there's a gap.
    #[must_use]
    pub const fn is_gap(&self) -> bool {
        matches!(self, Self::Gap { .. })
    }

    /// Returns true if the sequence is too low.
    #[must_use]
    pub const fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate { .. })
    }

    /// Converts an out-of-order outcome into its error.
    #[must_use]
    pub const fn into_error(self) -> Option<SequenceError> {
        match self {
            Self::InOrder => None,
            Self::Duplicate { expected, received } => {
                Some(SequenceError::Duplicate { expected, received })
            }
            Self::Gap { expected, received } => Some(SequenceError::Gap { expected, received }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fixwire_store::MemoryStore;
    use proptest::prelude::*;

    #[test]
    fn test_sequence_tracker_new() {
        let tracker = SequenceTracker::new();
        assert_eq!(tracker.peek_outgoing().value(), 1);
        assert_eq!(tracker.expected_incoming().value(), 1);
    }

    #[test]
    fn test_next_outgoing_increments_by_one() {
        let tracker = SequenceTracker::new();

        let seq1 = tracker.next_outgoing();
        assert_eq!(seq1.value(), 1);
        assert_eq!(tracker.peek_outgoing().value(), 2);

        let seq2 = tracker.next_outgoing();
        assert_eq!(seq2.value(), 2);
        assert_eq!(tracker.peek_outgoing().value(), 3);
    }

    #[test]
    fn test_observe_incoming() {
        let tracker = SequenceTracker::with_initial(1, 5);

        assert_eq!(
            tracker.observe_incoming(SeqNum::new(4)),
            SequenceOutcome::Duplicate {
                expected: 5,
                received: 4
            }
        );
        assert!(tracker.observe_incoming(SeqNum::new(5)).is_in_order());
        assert_eq!(tracker.expected_incoming().value(), 6);
    }

    #[test]
    fn test_gap_does_not_advance() {
        let tracker = SequenceTracker::with_initial(1, 10);

        let outcome = tracker.observe_incoming(SeqNum::new(12));
        assert!(outcome.is_gap());
        assert_eq!(tracker.expected_incoming().value(), 10);
        assert_eq!(
            outcome.into_error(),
            Some(SequenceError::Gap {
                expected: 10,
                received: 12
            })
        );

        assert!(tracker.observe_incoming(SeqNum::new(10)).is_in_order());
        assert_eq!(tracker.expected_incoming().value(), 11);
    }

    #[test]
    fn test_observe_incoming_without_successor() {
        let tracker = SequenceTracker::with_initial(1, u64::MAX);

        assert_eq!(
            tracker.observe_incoming(SeqNum::new(u64::MAX)),
            SequenceOutcome::Gap {
                expected: u64::MAX,
                received: u64::MAX
            }
        );
        assert_eq!(tracker.expected_incoming().value(), u64::MAX);
    }

    #[test]
    fn test_advance_incoming_is_monotonic() {
        let tracker = SequenceTracker::with_initial(1, 10);

        assert!(tracker.advance_incoming_to(SeqNum::new(15)));
        assert_eq!(tracker.expected_incoming().value(), 15);

        assert!(!tracker.advance_incoming_to(SeqNum::new(12)));
        assert_eq!(tracker.expected_incoming().value(), 15);
    }

    #[test]
    fn test_resume_from_store() {
        let store = MemoryStore::new();
        for n in 1..=3 {
            store
                .append(Direction::Outbound, SeqNum::new(n), b"sent")
                .unwrap();
        }
        store
            .append(Direction::Inbound, SeqNum::new(1), b"received")
            .unwrap();

        let tracker = SequenceTracker::resume(&store);
        assert_eq!(tracker.next_outgoing().value(), 4);
        assert_eq!(tracker.expected_incoming().value(), 2);
    }

    proptest! {
        #[test]
        fn test_outgoing_numbers_continue_across_restart(total in 1u64..200, split in any::<u64>()) {
            let store = MemoryStore::new();
            let before = split % (total + 1);
            let mut allocated = Vec::new();

            let tracker = SequenceTracker::resume(&store);
            for _ in 0..before {
                let seq = tracker.next_outgoing();
                store.append(Direction::Outbound, seq, b"sent").unwrap();
                allocated.push(seq.value());
            }

            let tracker = SequenceTracker::resume(&store);
            for _ in before..total {
                let seq = tracker.next_outgoing();
                store.append(Direction::Outbound, seq, b"sent").unwrap();
                allocated.push(seq.value());
            }

            prop_assert_eq!(allocated, (1..=total).collect::<Vec<_>>());
        }
    }
}
