/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Message types for FIX protocol.
//!
//! This module provides:
//! - [`MsgType`]: Enumeration of FIX message types
//! - [`Message`]: Ordered sequence of fields in canonical order
//! - [`MessageBuilder`]: Fluent construction of a [`Message`]
//!
//! A [`Message`] holds the fields a caller controls, in the order
//! `BeginString (8)`, `MsgType (35)`, then the body. BodyLength (9) and
//! CheckSum (10) are never stored; the codec derives them on the wire.

use crate::error::DecodeError;
use crate::field::{Field, tags};
use crate::types::SeqNum;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;

/// FIX message types.
///
/// The administrative types are the ones the session layer reacts to.
/// Application types the engine does not know by name are carried as
/// `Custom(String)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MsgType {
    /// Heartbeat (0) - Session level.
    Heartbeat,
    /// Test Request (1) - Session level.
    TestRequest,
    /// Resend Request (2) - Session level.
    ResendRequest,
    /// Reject (3) - Session level.
    Reject,
    /// Sequence Reset (4) - Session level.
    SequenceReset,
    /// Logout (5) - Session level.
    Logout,
    /// Execution Report (8).
    ExecutionReport,
    /// Order Cancel Reject (9).
    OrderCancelReject,
    /// Logon (A) - Session level.
    Logon,
    /// New Order Single (D).
    NewOrderSingle,
    /// Order Cancel Request (F).
    OrderCancelRequest,
    /// Order Cancel/Replace Request (G).
    OrderCancelReplaceRequest,
    /// Business Message Reject (j).
    BusinessMessageReject,
    /// Custom or unknown message type.
    Custom(String),
}

impl std::str::FromStr for MsgType {
    type Err = std::convert::Infallible;

    /// Creates a MsgType from a string value.
    ///
    /// # Arguments
    /// * `s` - The message type string (e.g., "D" for NewOrderSingle)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "0" => Self::Heartbeat,
            "1" => Self::TestRequest,
            "2" => Self::ResendRequest,
            "3" => Self::Reject,
            "4" => Self::SequenceReset,
            "5" => Self::Logout,
            "8" => Self::ExecutionReport,
            "9" => Self::OrderCancelReject,
            "A" => Self::Logon,
            "D" => Self::NewOrderSingle,
            "F" => Self::OrderCancelRequest,
            "G" => Self::OrderCancelReplaceRequest,
            "j" => Self::BusinessMessageReject,
            other => Self::Custom(other.to_string()),
        })
    }
}

impl MsgType {
    /// Returns the string representation of this message type.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Heartbeat => "0",
            Self::TestRequest => "1",
            Self::ResendRequest => "2",
            Self::Reject => "3",
            Self::SequenceReset => "4",
            Self::Logout => "5",
            Self::ExecutionReport => "8",
            Self::OrderCancelReject => "9",
            Self::Logon => "A",
            Self::NewOrderSingle => "D",
            Self::OrderCancelRequest => "F",
            Self::OrderCancelReplaceRequest => "G",
            Self::BusinessMessageReject => "j",
            Self::Custom(s) => s.as_str(),
        }
    }

    /// Returns true if this is an administrative message.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        matches!(
            self,
            Self::Heartbeat
                | Self::TestRequest
                | Self::ResendRequest
                | Self::Reject
                | Self::SequenceReset
                | Self::Logout
                | Self::Logon
        )
    }

    /// Returns true if this is an application message.
    #[must_use]
    pub fn is_app(&self) -> bool {
        !self.is_admin()
    }
}

impl fmt::Display for MsgType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An ordered sequence of FIX fields.
///
/// Decoding yields fields in wire order minus BodyLength and CheckSum, so
/// `decode(encode(m)) == m` holds for any message in canonical order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    fields: SmallVec<[Field; 16]>,
}

impl Message {
    /// Creates an empty message.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a builder with BeginString and MsgType already in place.
    #[must_use]
    pub fn builder(begin_string: &str, msg_type: &MsgType) -> MessageBuilder {
        MessageBuilder::new(begin_string, msg_type)
    }

    /// Creates a message from fields in the given order.
    #[must_use]
    pub fn from_fields(fields: impl IntoIterator<Item = Field>) -> Self {
        Self {
            fields: fields.into_iter().collect(),
        }
    }

    /// Returns all fields in order.
    #[inline]
    #[must_use]
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Returns the number of fields.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if the message has no fields.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Appends a field.
    #[inline]
    pub fn push(&mut self, field: Field) {
        self.fields.push(field);
    }

    /// Replaces the first field with the same tag, or appends it.
    pub fn set(&mut self, field: Field) {
        match self.fields.iter_mut().find(|f| f.tag == field.tag) {
            Some(existing) => *existing = field,
            None => self.fields.push(field),
        }
    }

    /// Inserts a field at `index`, shifting the rest to the right.
    pub fn insert(&mut self, index: usize, field: Field) {
        let index = index.min(self.fields.len());
        self.fields.insert(index, field);
    }

    /// Removes every field with the given tag.
    pub fn remove(&mut self, tag: u32) {
        self.fields.retain(|f| f.tag != tag);
    }

    /// Gets the first field with the given tag.
    #[must_use]
    pub fn get(&self, tag: u32) -> Option<&Field> {
        self.fields.iter().find(|f| f.tag == tag)
    }

    /// Gets the first field with the given tag or reports it missing.
    ///
    /// # Errors
    /// Returns `DecodeError::MalformedField` if the tag is absent.
    pub fn require(&self, tag: u32) -> Result<&Field, DecodeError> {
        self.get(tag)
            .ok_or_else(|| DecodeError::malformed(tag, "required field missing"))
    }

    /// Gets a field value as a string slice.
    #[must_use]
    pub fn get_str(&self, tag: u32) -> Option<&str> {
        self.get(tag).and_then(|f| f.as_str().ok())
    }

    /// Gets a field value as a u64.
    #[must_use]
    pub fn get_u64(&self, tag: u32) -> Option<u64> {
        self.get(tag).and_then(|f| f.as_u64().ok())
    }

    /// Gets a field value as a bool.
    #[must_use]
    pub fn get_bool(&self, tag: u32) -> Option<bool> {
        self.get(tag).and_then(|f| f.as_bool().ok())
    }

    /// Gets a field value as a Decimal.
    #[must_use]
    pub fn get_decimal(&self, tag: u32) -> Option<Decimal> {
        self.get(tag).and_then(|f| f.as_decimal().ok())
    }

    /// Returns the BeginString (tag 8).
    #[must_use]
    pub fn begin_string(&self) -> Option<&str> {
        self.get_str(tags::BEGIN_STRING)
    }

    /// Returns the MsgType (tag 35).
    ///
    /// A message without tag 35 reports an empty `Custom` type.
    #[must_use]
    pub fn msg_type(&self) -> MsgType {
        self.get_str(tags::MSG_TYPE)
            .and_then(|s| s.parse().ok())
            .unwrap_or_else(|| MsgType::Custom(String::new()))
    }

    /// Returns the MsgSeqNum (tag 34).
    #[must_use]
    pub fn seq_num(&self) -> Option<SeqNum> {
        self.get_u64(tags::MSG_SEQ_NUM).map(SeqNum::new)
    }

    /// Returns true if PossDupFlag (tag 43) is set.
    #[must_use]
    pub fn is_poss_dup(&self) -> bool {
        self.get_bool(tags::POSS_DUP_FLAG).unwrap_or(false)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, field) in self.fields.iter().enumerate() {
            if i > 0 {
                f.write_str("|")?;
            }
            write!(f, "{field}")?;
        }
        Ok(())
    }
}

/// Fluent builder for [`Message`].
#[derive(Debug, Clone)]
pub struct MessageBuilder {
    message: Message,
}

impl MessageBuilder {
    /// Creates a builder with BeginString and MsgType.
    #[must_use]
    pub fn new(begin_string: &str, msg_type: &MsgType) -> Self {
        let mut message = Message::new();
        message.push(Field::string(tags::BEGIN_STRING, begin_string));
        message.push(Field::string(tags::MSG_TYPE, msg_type.as_str()));
        Self { message }
    }

    /// Appends a string field.
    #[must_use]
    pub fn field(mut self, tag: u32, value: &str) -> Self {
        self.message.push(Field::string(tag, value));
        self
    }

    /// Appends an unsigned integer field.
    #[must_use]
    pub fn field_u64(mut self, tag: u32, value: u64) -> Self {
        self.message.push(Field::uint(tag, value));
        self
    }

    /// Appends a Y/N field.
    #[must_use]
    pub fn field_bool(mut self, tag: u32, value: bool) -> Self {
        self.message.push(Field::bool(tag, value));
        self
    }

    /// Appends a decimal field.
    #[must_use]
    pub fn field_decimal(mut self, tag: u32, value: Decimal) -> Self {
        self.message.push(Field::decimal(tag, value));
        self
    }

    /// Appends a prepared field.
    #[must_use]
    pub fn push(mut self, field: Field) -> Self {
        self.message.push(field);
        self
    }

    /// Finishes the message.
    #[must_use]
    pub fn build(self) -> Message {
        self.message
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_msg_type_from_str() {
        assert_eq!("0".parse::<MsgType>().unwrap(), MsgType::Heartbeat);
        assert_eq!("A".parse::<MsgType>().unwrap(), MsgType::Logon);
        assert_eq!("D".parse::<MsgType>().unwrap(), MsgType::NewOrderSingle);
        assert_eq!(
            "U1".parse::<MsgType>().unwrap(),
            MsgType::Custom("U1".to_string())
        );
    }

    #[test]
    fn test_msg_type_is_admin() {
        assert!(MsgType::Logon.is_admin());
        assert!(MsgType::SequenceReset.is_admin());
        assert!(MsgType::NewOrderSingle.is_app());
        assert!(MsgType::Custom("U1".to_string()).is_app());
    }

    #[test]
    fn test_builder_canonical_order() {
        let msg = Message::builder("FIX.4.2", &MsgType::NewOrderSingle)
            .field(tags::SYMBOL, "AAPL")
            .field(tags::SIDE, "1")
            .field_u64(tags::ORDER_QTY, 100)
            .build();

        let order: Vec<u32> = msg.fields().iter().map(|f| f.tag).collect();
        assert_eq!(order, vec![8, 35, 55, 54, 38]);
        assert_eq!(msg.begin_string(), Some("FIX.4.2"));
        assert_eq!(msg.msg_type(), MsgType::NewOrderSingle);
        assert_eq!(msg.get_u64(tags::ORDER_QTY), Some(100));
    }

    #[test]
    fn test_set_replaces_first_occurrence() {
        let mut msg = Message::builder("FIX.4.4", &MsgType::Heartbeat)
            .field_u64(tags::MSG_SEQ_NUM, 1)
            .build();
        msg.set(Field::uint(tags::MSG_SEQ_NUM, 7));
        assert_eq!(msg.seq_num(), Some(SeqNum::new(7)));
        assert_eq!(msg.len(), 3);

        msg.set(Field::bool(tags::POSS_DUP_FLAG, true));
        assert!(msg.is_poss_dup());
        assert_eq!(msg.len(), 4);
    }

    #[test]
    fn test_require_missing_field() {
        let msg = Message::builder("FIX.4.4", &MsgType::Logon).build();
        assert!(matches!(
            msg.require(tags::HEART_BT_INT),
            Err(DecodeError::MalformedField { tag: 108, .. })
        ));
    }

    #[test]
    fn test_missing_msg_type() {
        let msg = Message::new();
        assert_eq!(msg.msg_type(), MsgType::Custom(String::new()));
        assert!(msg.is_empty());
    }

    #[test]
    fn test_display() {
        let msg = Message::builder("FIX.4.2", &MsgType::Logon)
            .field_u64(tags::HEART_BT_INT, 30)
            .build();
        assert_eq!(msg.to_string(), "8=FIX.4.2|35=A|108=30");
    }
}
