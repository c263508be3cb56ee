/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Field types for FIX protocol messages.
//!
//! This module provides:
//! - [`Field`]: An owned `(tag, value)` pair whose value is opaque bytes
//! - [`tags`]: Tag numbers the session layer interprets

use crate::error::DecodeError;
use crate::types::Timestamp;
use bytes::Bytes;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Tag numbers interpreted by the session layer.
pub mod tags {
    /// BeginSeqNo (ResendRequest).
    pub const BEGIN_SEQ_NO: u32 = 7;
    /// BeginString.
    pub const BEGIN_STRING: u32 = 8;
    /// BodyLength.
    pub const BODY_LENGTH: u32 = 9;
    /// CheckSum.
    pub const CHECKSUM: u32 = 10;
    /// ClOrdID.
    pub const CL_ORD_ID: u32 = 11;
    /// EndSeqNo (ResendRequest).
    pub const END_SEQ_NO: u32 = 16;
    /// MsgSeqNum.
    pub const MSG_SEQ_NUM: u32 = 34;
    /// MsgType.
    pub const MSG_TYPE: u32 = 35;
    /// NewSeqNo (SequenceReset).
    pub const NEW_SEQ_NO: u32 = 36;
    /// OrderQty.
    pub const ORDER_QTY: u32 = 38;
    /// OrdType.
    pub const ORD_TYPE: u32 = 40;
    /// PossDupFlag.
    pub const POSS_DUP_FLAG: u32 = 43;
    /// Price.
    pub const PRICE: u32 = 44;
    /// RefSeqNum (Reject).
    pub const REF_SEQ_NUM: u32 = 45;
    /// SenderCompID.
    pub const SENDER_COMP_ID: u32 = 49;
    /// SendingTime.
    pub const SENDING_TIME: u32 = 52;
    /// Side.
    pub const SIDE: u32 = 54;
    /// Symbol.
    pub const SYMBOL: u32 = 55;
    /// TargetCompID.
    pub const TARGET_COMP_ID: u32 = 56;
    /// Text.
    pub const TEXT: u32 = 58;
    /// EncryptMethod (Logon).
    pub const ENCRYPT_METHOD: u32 = 98;
    /// HeartBtInt (Logon).
    pub const HEART_BT_INT: u32 = 108;
    /// TestReqID.
    pub const TEST_REQ_ID: u32 = 112;
    /// OrigSendingTime.
    pub const ORIG_SENDING_TIME: u32 = 122;
    /// GapFillFlag (SequenceReset).
    pub const GAP_FILL_FLAG: u32 = 123;
}

/// A single `tag=value` pair.
///
/// The value is kept as raw bytes; only the fields the session layer
/// interprets are ever parsed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Field {
    /// The field tag number.
    pub tag: u32,
    /// The field value bytes (without delimiters).
    pub value: Bytes,
}

impl Field {
    /// Creates a new field.
    ///
    /// # Arguments
    /// * `tag` - The field tag number
    /// * `value` - The value bytes
    #[inline]
    #[must_use]
    pub fn new(tag: u32, value: impl Into<Bytes>) -> Self {
        Self {
            tag,
            value: value.into(),
        }
    }

    /// Creates a field from a string value.
    #[inline]
    #[must_use]
    pub fn string(tag: u32, value: &str) -> Self {
        Self::new(tag, Bytes::copy_from_slice(value.as_bytes()))
    }

    /// Creates a field from an unsigned integer value.
    #[must_use]
    pub fn uint(tag: u32, value: u64) -> Self {
        let mut buf = itoa::Buffer::new();
        Self::string(tag, buf.format(value))
    }

    /// Creates a field from a boolean value (Y/N).
    #[inline]
    #[must_use]
    pub fn bool(tag: u32, value: bool) -> Self {
        Self::new(tag, Bytes::from_static(if value { b"Y" } else { b"N" }))
    }

    /// Creates a field from a decimal value.
    #[must_use]
    pub fn decimal(tag: u32, value: Decimal) -> Self {
        Self::string(tag, &value.normalize().to_string())
    }

    /// Creates a UTCTimestamp field with millisecond precision.
    #[must_use]
    pub fn timestamp(tag: u32, value: Timestamp) -> Self {
        Self::string(tag, value.format_millis().as_str())
    }

    /// Returns the value as a string slice.
    ///
    /// # Errors
    /// Returns `DecodeError::MalformedField` if the value is not valid UTF-8.
    pub fn as_str(&self) -> Result<&str, DecodeError> {
        std::str::from_utf8(&self.value)
            .map_err(|_| DecodeError::malformed(self.tag, "value is not valid utf-8"))
    }

    /// Parses the value as the specified type.
    ///
    /// # Errors
    /// Returns `DecodeError::MalformedField` if parsing fails.
    pub fn parse<T: FromStr>(&self) -> Result<T, DecodeError> {
        let s = self.as_str()?;
        s.parse().map_err(|_| {
            DecodeError::malformed(
                self.tag,
                format!("failed to parse '{}' as {}", s, std::any::type_name::<T>()),
            )
        })
    }

    /// Returns the value as a u64.
    ///
    /// # Errors
    /// Returns `DecodeError::MalformedField` if the value is not a valid integer.
    pub fn as_u64(&self) -> Result<u64, DecodeError> {
        self.parse()
    }

    /// Returns the value as a Decimal.
    ///
    /// # Errors
    /// Returns `DecodeError::MalformedField` if the value is not a valid decimal.
    pub fn as_decimal(&self) -> Result<Decimal, DecodeError> {
        self.parse()
    }

    /// Returns the value as a bool (FIX uses 'Y'/'N').
    ///
    /// # Errors
    /// Returns `DecodeError::MalformedField` if the value is not 'Y' or 'N'.
    pub fn as_bool(&self) -> Result<bool, DecodeError> {
        match &self.value[..] {
            b"Y" => Ok(true),
            b"N" => Ok(false),
            _ => Err(DecodeError::malformed(self.tag, "expected 'Y' or 'N'")),
        }
    }

    /// Returns the length of the value in bytes.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.value.len()
    }

    /// Returns true if the value is empty.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.tag, String::from_utf8_lossy(&self.value))
    }
}
