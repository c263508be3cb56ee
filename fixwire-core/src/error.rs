/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Error types for the fixwire session engine.
//!
//! The hierarchy mirrors the layers of the engine: codec errors
//! ([`EncodeError`], [`DecodeError`]), ordering errors ([`SequenceError`]),
//! session-level failures ([`SessionError`]) and store errors
//! ([`StoreError`]). [`FixError`] unifies them for callers that do not care
//! which layer failed.

use std::ops::RangeInclusive;
use thiserror::Error;

/// Result type alias using [`FixError`] as the error type.
pub type Result<T> = std::result::Result<T, FixError>;

/// Top-level error type for all fixwire operations.
#[derive(Debug, Error)]
pub enum FixError {
    /// Error during message decoding.
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Error during message encoding.
    #[error("encode error: {0}")]
    Encode(#[from] EncodeError),

    /// Inbound sequence number out of order.
    #[error("sequence error: {0}")]
    Sequence(#[from] SequenceError),

    /// Error in session layer operations.
    #[error("session error: {0}")]
    Session(#[from] SessionError),

    /// Error in message store operations.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// I/O error from underlying transport.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl FixError {
    /// Returns true if the error leaves the session usable.
    ///
    /// Only duplicates and gaps are recoverable; everything else requires a
    /// fresh session.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::Sequence(_))
    }
}

/// Errors that occur during FIX message decoding.
///
/// Decoding never repairs a message: any of these rejects the whole frame.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// A field is structurally invalid, missing, or out of place.
    #[error("malformed field (tag {tag}): {reason}")]
    MalformedField {
        /// Tag of the offending field, or 0 when the tag itself is unreadable.
        tag: u32,
        /// Description of the defect.
        reason: String,
    },

    /// Declared BodyLength (tag 9) does not match the actual body span.
    #[error("body length mismatch: declared {declared}, actual {actual}")]
    BodyLengthMismatch {
        /// Value carried in tag 9.
        declared: usize,
        /// Number of bytes between the BodyLength and CheckSum fields.
        actual: usize,
    },

    /// Checksum mismatch between calculated and declared values.
    #[error("checksum mismatch: calculated {calculated}, declared {declared}")]
    ChecksumMismatch {
        /// Calculated checksum value.
        calculated: u8,
        /// Declared checksum value in message.
        declared: u8,
    },
}

impl DecodeError {
    /// Shorthand for [`DecodeError::MalformedField`].
    #[must_use]
    pub fn malformed(tag: u32, reason: impl Into<String>) -> Self {
        Self::MalformedField {
            tag,
            reason: reason.into(),
        }
    }
}

/// Errors that occur during FIX message encoding.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EncodeError {
    /// Missing required field during encoding.
    #[error("missing required field: tag {tag}")]
    MissingRequiredField {
        /// The tag number of the missing field.
        tag: u32,
    },

    /// A value contains the SOH field delimiter.
    #[error("value for tag {tag} contains the field delimiter")]
    DelimiterInValue {
        /// The tag number of the field.
        tag: u32,
    },

    /// Invalid field value for encoding.
    #[error("invalid field value for tag {tag}: {reason}")]
    InvalidFieldValue {
        /// The tag number of the field.
        tag: u32,
        /// Description of why the value is invalid.
        reason: String,
    },

    /// The caller supplied a field the codec or session computes itself.
    #[error("tag {tag} is computed by the engine and cannot be supplied")]
    ReservedTag {
        /// BodyLength (9), CheckSum (10) or a session header tag.
        tag: u32,
    },
}

/// Inbound sequence number anomalies.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SequenceError {
    /// Sequence number lower than expected.
    #[error("duplicate sequence number: expected {expected}, received {received}")]
    Duplicate {
        /// Expected sequence number.
        expected: u64,
        /// Received sequence number.
        received: u64,
    },

    /// Sequence number higher than expected.
    #[error("sequence gap detected: expected {expected}, received {received}")]
    Gap {
        /// Expected sequence number.
        expected: u64,
        /// Received sequence number.
        received: u64,
    },
}

/// Errors in FIX session layer operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// A message type arrived that the current state cannot accept.
    #[error("unexpected message type {msg_type} in state {state}")]
    UnexpectedMessageType {
        /// MsgType (tag 35) of the offending message.
        msg_type: String,
        /// Session state when it arrived.
        state: String,
    },

    /// Logon was rejected by counterparty.
    #[error("logon rejected: {reason}")]
    LogonRejected {
        /// Reason for rejection.
        reason: String,
    },

    /// No Logon response within the configured timeout.
    #[error("no logon response after {elapsed_ms} milliseconds")]
    LogonTimeout {
        /// Elapsed time in milliseconds since the Logon was sent.
        elapsed_ms: u64,
    },

    /// Heartbeat timeout - no response to TestRequest.
    #[error("heartbeat timeout after {elapsed_ms} milliseconds")]
    HeartbeatTimeout {
        /// Elapsed time in milliseconds since the TestRequest was sent.
        elapsed_ms: u64,
    },

    /// A gap could not be filled within the retry limit.
    #[error("resend of {begin}..={end} not fulfilled after {attempts} attempts")]
    ResendExhausted {
        /// First missing sequence number.
        begin: u64,
        /// Last missing sequence number.
        end: u64,
        /// Number of ResendRequests issued.
        attempts: u32,
    },

    /// Session is not in the correct state for the operation.
    #[error("invalid session state: expected {expected}, current {current}")]
    InvalidState {
        /// Expected state for the operation.
        expected: String,
        /// Current session state.
        current: String,
    },

    /// SenderCompID/TargetCompID do not match the session.
    #[error("comp id mismatch: expected {expected}, received {received}")]
    CompIdMismatch {
        /// The CompID pair the session is configured for.
        expected: String,
        /// The CompID pair carried by the message.
        received: String,
    },

    /// SequenceReset attempted to move the expected number backwards.
    #[error("sequence reset to {new_seq} is below expected {expected}")]
    InvalidSequenceReset {
        /// Currently expected inbound sequence number.
        expected: u64,
        /// NewSeqNo (tag 36) carried by the reset.
        new_seq: u64,
    },

    /// Session configuration error.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Connection error.
    #[error("connection error: {0}")]
    Connection(String),
}

/// Errors in message store operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Append with a sequence number not above the last stored one.
    #[error("sequence {seq_num} is not above last stored {last}")]
    NotMonotonic {
        /// Sequence number of the rejected append.
        seq_num: u64,
        /// Last stored sequence number for that direction.
        last: u64,
    },

    /// Range of messages not available.
    #[error("messages not available for range: {range:?}")]
    RangeNotAvailable {
        /// The requested range of sequence numbers.
        range: RangeInclusive<u64>,
    },

    /// I/O error in persistent store.
    #[error("store i/o error: {0}")]
    Io(String),
}
