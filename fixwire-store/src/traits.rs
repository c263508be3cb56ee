/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Message store trait definition.
//!
//! This module defines the contract between a session and the storage the
//! surrounding application owns. The session only ever appends and reads
//! back ranges; retention and persistence are the implementation's concern.

use bytes::Bytes;
use fixwire_core::error::StoreError;
use fixwire_core::types::{Direction, SeqNum};
use std::time::SystemTime;

/// Abstract interface for FIX message storage.
///
/// Implementations must tolerate concurrent `append` and `range` calls from
/// several threads; sessions sharing a store run on independent tasks.
pub trait MessageStore: Send + Sync {
    /// Appends a raw message under its sequence number.
    ///
    /// Also advances `next_seq(direction)` past `seq_num`.
    ///
    /// # Errors
    /// Returns `StoreError::NotMonotonic` if `seq_num` is not above the last
    /// sequence number stored for `direction`.
    fn append(&self, direction: Direction, seq_num: SeqNum, message: &[u8])
    -> Result<(), StoreError>;

    /// Retrieves stored messages with `begin <= seq <= end`, in order.
    ///
    /// Sequence numbers without a stored message are simply absent from the
    /// result, so callers can detect holes.
    ///
    /// # Errors
    /// Returns `StoreError` if the range cannot be read.
    fn range(
        &self,
        direction: Direction,
        begin: SeqNum,
        end: SeqNum,
    ) -> Result<Vec<(SeqNum, Bytes)>, StoreError>;

    /// Returns the next sequence number for `direction`.
    ///
    /// For `Outbound` this is the number the next sent message must carry;
    /// for `Inbound` the number the counterparty is expected to send next.
    fn next_seq(&self, direction: Direction) -> SeqNum;

    /// Overrides the next sequence number for `direction`.
    fn set_next_seq(&self, direction: Direction, seq: SeqNum);

    /// Clears all messages and resets both counters to 1.
    ///
    /// # Errors
    /// Returns `StoreError` if the reset fails.
    fn reset(&self) -> Result<(), StoreError>;

    /// Returns the creation time of the store.
    fn creation_time(&self) -> SystemTime;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    struct NullStore;

    impl MessageStore for NullStore {
        fn append(&self, _: Direction, _: SeqNum, _: &[u8]) -> Result<(), StoreError> {
            Ok(())
        }

        fn range(
            &self,
            _: Direction,
            begin: SeqNum,
            end: SeqNum,
        ) -> Result<Vec<(SeqNum, Bytes)>, StoreError> {
            Err(StoreError::RangeNotAvailable {
                range: begin.value()..=end.value(),
            })
        }

        fn next_seq(&self, _: Direction) -> SeqNum {
            SeqNum::default()
        }

        fn set_next_seq(&self, _: Direction, _: SeqNum) {}

        fn reset(&self) -> Result<(), StoreError> {
            Ok(())
        }

        fn creation_time(&self) -> SystemTime {
            SystemTime::UNIX_EPOCH
        }
    }

    #[test]
    fn test_store_is_object_safe() {
        let store: Arc<dyn MessageStore> = Arc::new(NullStore);
        assert_eq!(store.next_seq(Direction::Outbound).value(), 1);
        assert!(store.append(Direction::Inbound, SeqNum::new(1), b"x").is_ok());
        assert!(matches!(
            store.range(Direction::Outbound, SeqNum::new(2), SeqNum::new(4)),
            Err(StoreError::RangeNotAvailable { .. })
        ));
    }
}
