/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Gap recovery.
//!
//! While a ResendRequest is outstanding, messages that arrived ahead of the
//! gap are parked here keyed by sequence number and handed back once the
//! expected number catches up with them.

use bytes::Bytes;
use fixwire_core::error::SessionError;
use fixwire_core::message::Message;
use fixwire_core::types::SeqNum;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// A message waiting for the gap below it to fill.
#[derive(Debug, Clone)]
pub struct Buffered {
    /// Decoded message.
    pub message: Message,
    /// Raw frame, kept for the inbound store.
    pub raw: Bytes,
}

/// The ResendRequest currently outstanding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResendRange {
    /// First missing sequence number.
    pub begin: SeqNum,
    /// Last missing sequence number.
    pub end: SeqNum,
    /// ResendRequests issued for this gap so far.
    pub attempts: u32,
    /// When the latest ResendRequest went out.
    pub requested_at: Instant,
}

/// What to do about an outstanding ResendRequest at a timer tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Ask again for `begin..=end`.
    Reissue {
        /// First still-missing sequence number.
        begin: SeqNum,
        /// Last missing sequence number.
        end: SeqNum,
    },
    /// Give up; the session cannot recover.
    Exhausted(SessionError),
}

/// Buffer of out-of-order messages plus the outstanding resend range.
#[derive(Debug)]
pub struct GapRecovery {
    buffer: BTreeMap<u64, Buffered>,
    pending: Option<ResendRange>,
    max_buffered: usize,
}

impl GapRecovery {
    /// Creates an empty recovery buffer holding at most `max_buffered`
    /// messages.
    #[must_use]
    pub fn new(max_buffered: usize) -> Self {
        Self {
            buffer: BTreeMap::new(),
            pending: None,
            max_buffered,
        }
    }

    /// Returns true while a ResendRequest is outstanding.
    #[must_use]
    pub fn is_requesting(&self) -> bool {
        self.pending.is_some()
    }

    /// Returns the outstanding resend range, if any.
    #[must_use]
    pub fn pending(&self) -> Option<&ResendRange> {
        self.pending.as_ref()
    }

    /// Returns the number of parked messages.
    #[must_use]
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Returns the lowest parked sequence number.
    #[must_use]
    pub fn first_buffered(&self) -> Option<SeqNum> {
        self.buffer.keys().next().copied().map(SeqNum::new)
    }

    /// Parks a message that arrived ahead of the expected sequence number.
    ///
    /// A second copy of an already parked number replaces the first.
    ///
    /// # Errors
    /// Returns `SessionError::ResendExhausted` when the buffer is full.
    pub fn park(&mut self, seq: SeqNum, entry: Buffered) -> Result<(), SessionError> {
        if self.buffer.len() >= self.max_buffered && !self.buffer.contains_key(&seq.value()) {
            let (begin, end, attempts) = match &self.pending {
                Some(range) => (range.begin.value(), range.end.value(), range.attempts),
                None => (seq.value(), seq.value(), 0),
            };
            return Err(SessionError::ResendExhausted {
                begin,
                end,
                attempts,
            });
        }
        self.buffer.insert(seq.value(), entry);
        Ok(())
    }

    /// Records a new ResendRequest for `begin..=end`.
    pub fn start(&mut self, begin: SeqNum, end: SeqNum, now: Instant) {
        self.pending = Some(ResendRange {
            begin,
            end,
            attempts: 1,
            requested_at: now,
        });
    }

    /// Takes the parked message carrying `expected`, if present.
    ///
    /// Parked numbers below `expected` are stale (a SequenceReset skipped
    /// them) and are dropped.
    pub fn take_ready(&mut self, expected: SeqNum) -> Option<Buffered> {
        let expected = expected.value();
        while let Some(entry) = self.buffer.first_entry() {
            match (*entry.key()).cmp(&expected) {
                std::cmp::Ordering::Less => {
                    entry.remove();
                }
                std::cmp::Ordering::Equal => return Some(entry.remove()),
                std::cmp::Ordering::Greater => return None,
            }
        }
        None
    }

    /// Notes that the expected number has reached `expected`.
    ///
    /// Returns true if this closed the outstanding request.
    pub fn on_advanced(&mut self, expected: SeqNum) -> bool {
        match self.pending {
            Some(range) if expected > range.end => {
                self.pending = None;
                true
            }
            _ => false,
        }
    }

    /// Decides whether the outstanding request should be reissued.
    ///
    /// # Arguments
    /// * `now` - Current time
    /// * `expected` - Next expected inbound sequence number
    /// * `timeout` - How long a request may stay unanswered
    /// * `limit` - Maximum number of requests per gap
    pub fn poll_retry(
        &mut self,
        now: Instant,
        expected: SeqNum,
        timeout: Duration,
        limit: u32,
    ) -> Option<RetryDecision> {
        let range = self.pending.as_mut()?;
        if now.saturating_duration_since(range.requested_at) < timeout {
            return None;
        }
        if range.attempts >= limit {
            return Some(RetryDecision::Exhausted(SessionError::ResendExhausted {
                begin: range.begin.value(),
                end: range.end.value(),
                attempts: range.attempts,
            }));
        }

        range.begin = range.begin.max(expected);
        range.attempts += 1;
        range.requested_at = now;
        Some(RetryDecision::Reissue {
            begin: range.begin,
            end: range.end,
        })
    }

    /// Drops every parked message and the outstanding request.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.pending = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fixwire_core::message::MsgType;

    fn entry(seq: u64) -> Buffered {
        let message = Message::builder("FIX.4.2", &MsgType::Heartbeat)
            .field_u64(34, seq)
            .build();
        Buffered {
            message,
            raw: Bytes::from(format!("raw{seq}")),
        }
    }

    #[test]
    fn test_take_ready_in_order() {
        let mut recovery = GapRecovery::new(10);
        recovery.park(SeqNum::new(12), entry(12)).unwrap();
        recovery.park(SeqNum::new(14), entry(14)).unwrap();

        assert!(recovery.take_ready(SeqNum::new(10)).is_none());
        let ready = recovery.take_ready(SeqNum::new(12)).unwrap();
        assert_eq!(ready.message.seq_num(), Some(SeqNum::new(12)));
        assert!(recovery.take_ready(SeqNum::new(13)).is_none());
        assert_eq!(recovery.first_buffered(), Some(SeqNum::new(14)));
    }

    #[test]
    fn test_take_ready_drops_stale() {
        let mut recovery = GapRecovery::new(10);
        recovery.park(SeqNum::new(5), entry(5)).unwrap();
        recovery.park(SeqNum::new(8), entry(8)).unwrap();

        let ready = recovery.take_ready(SeqNum::new(8)).unwrap();
        assert_eq!(&ready.raw[..], b"raw8");
        assert_eq!(recovery.buffered_len(), 0);
    }

    #[test]
    fn test_park_is_bounded() {
        let mut recovery = GapRecovery::new(2);
        let now = Instant::now();
        recovery.start(SeqNum::new(1), SeqNum::new(4), now);
        recovery.park(SeqNum::new(5), entry(5)).unwrap();
        recovery.park(SeqNum::new(6), entry(6)).unwrap();
        recovery.park(SeqNum::new(6), entry(6)).unwrap();

        assert_eq!(
            recovery.park(SeqNum::new(7), entry(7)),
            Err(SessionError::ResendExhausted {
                begin: 1,
                end: 4,
                attempts: 1
            })
        );
    }

    #[test]
    fn test_on_advanced_closes_request() {
        let mut recovery = GapRecovery::new(10);
        recovery.start(SeqNum::new(10), SeqNum::new(11), Instant::now());

        assert!(!recovery.on_advanced(SeqNum::new(11)));
        assert!(recovery.is_requesting());
        assert!(recovery.on_advanced(SeqNum::new(12)));
        assert!(!recovery.is_requesting());
    }

    #[test]
    fn test_poll_retry_then_exhaust() {
        let start = Instant::now();
        let timeout = Duration::from_secs(30);
        let mut recovery = GapRecovery::new(10);
        recovery.start(SeqNum::new(10), SeqNum::new(20), start);

        assert_eq!(
            recovery.poll_retry(start + Duration::from_secs(10), SeqNum::new(10), timeout, 2),
            None
        );
        assert_eq!(
            recovery.poll_retry(start + timeout, SeqNum::new(15), timeout, 2),
            Some(RetryDecision::Reissue {
                begin: SeqNum::new(15),
                end: SeqNum::new(20)
            })
        );
        assert_eq!(recovery.pending().unwrap().attempts, 2);

        assert!(matches!(
            recovery.poll_retry(start + timeout * 2, SeqNum::new(15), timeout, 2),
            Some(RetryDecision::Exhausted(SessionError::ResendExhausted {
                begin: 15,
                end: 20,
                attempts: 2
            }))
        ));
    }
}
