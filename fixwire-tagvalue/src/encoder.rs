/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! FIX message encoder.
//!
//! [`encode`] turns an ordered field sequence into wire bytes. The caller
//! supplies BeginString (8), MsgType (35) and the body; BodyLength (9) and
//! CheckSum (10) are always computed here and may not be supplied.

use crate::checksum::{calculate_checksum, format_checksum};
use bytes::{BufMut, Bytes, BytesMut};
use fixwire_core::error::EncodeError;
use fixwire_core::field::{Field, tags};
use fixwire_core::message::Message;
use memchr::memchr;

/// SOH (Start of Header) delimiter used in FIX messages.
pub const SOH: u8 = 0x01;

/// Encodes an ordered field sequence into a complete FIX message.
///
/// The output is `8=..|9=..|35=..|<remaining fields in caller order>|10=..|`.
///
/// # Errors
/// - `MissingRequiredField` if BeginString or MsgType is absent
/// - `ReservedTag` if BodyLength or CheckSum is supplied
/// - `DelimiterInValue` if any value contains SOH
/// - `InvalidFieldValue` for tag 0, empty values, or a repeated 8/35
pub fn encode(fields: &[Field]) -> Result<Bytes, EncodeError> {
    let mut begin_string: Option<&Field> = None;
    let mut msg_type: Option<&Field> = None;

    for field in fields {
        validate_field(field)?;
        let slot = match field.tag {
            tags::BEGIN_STRING => &mut begin_string,
            tags::MSG_TYPE => &mut msg_type,
            _ => continue,
        };
        if slot.replace(field).is_some() {
            return Err(EncodeError::InvalidFieldValue {
                tag: field.tag,
                reason: "field supplied more than once".to_string(),
            });
        }
    }

    let begin_string = begin_string.ok_or(EncodeError::MissingRequiredField {
        tag: tags::BEGIN_STRING,
    })?;
    let msg_type = msg_type.ok_or(EncodeError::MissingRequiredField {
        tag: tags::MSG_TYPE,
    })?;

    let mut encoder = Encoder::new(&begin_string.value);
    encoder.put_raw(tags::MSG_TYPE, &msg_type.value);
    for field in fields
        .iter()
        .filter(|f| f.tag != tags::BEGIN_STRING && f.tag != tags::MSG_TYPE)
    {
        encoder.put_raw(field.tag, &field.value);
    }

    Ok(encoder.finish().freeze())
}

/// Encodes a [`Message`]. See [`encode`].
///
/// # Errors
/// Same as [`encode`].
#[inline]
pub fn encode_message(message: &Message) -> Result<Bytes, EncodeError> {
    encode(message.fields())
}

fn validate_field(field: &Field) -> Result<(), EncodeError> {
    match field.tag {
        0 => Err(EncodeError::InvalidFieldValue {
            tag: 0,
            reason: "tag numbers start at 1".to_string(),
        }),
        tags::BODY_LENGTH | tags::CHECKSUM => Err(EncodeError::ReservedTag { tag: field.tag }),
        tag if field.value.is_empty() => Err(EncodeError::InvalidFieldValue {
            tag,
            reason: "empty value".to_string(),
        }),
        tag if memchr(SOH, &field.value).is_some() => Err(EncodeError::DelimiterInValue { tag }),
        _ => Ok(()),
    }
}

/// Low-level body writer.
///
/// Appends already-validated fields and frames them with BeginString,
/// BodyLength and CheckSum on [`Encoder::finish`].
#[derive(Debug)]
struct Encoder<'a> {
    /// Buffer for the message body (between BodyLength and Checksum).
    body: BytesMut,
    /// The BeginString value (e.g., "FIX.4.2").
    begin_string: &'a [u8],
}

impl<'a> Encoder<'a> {
    fn new(begin_string: &'a [u8]) -> Self {
        Self {
            body: BytesMut::with_capacity(256),
            begin_string,
        }
    }

    #[inline]
    fn put_raw(&mut self, tag: u32, value: &[u8]) {
        let mut tag_buf = itoa::Buffer::new();
        let tag_str = tag_buf.format(tag);

        self.body.put_slice(tag_str.as_bytes());
        self.body.put_u8(b'=');
        self.body.put_slice(value);
        self.body.put_u8(SOH);
    }

    fn finish(self) -> BytesMut {
        let body_len = self.body.len();
        let mut len_buf = itoa::Buffer::new();
        let len_str = len_buf.format(body_len);

        let mut message =
            BytesMut::with_capacity(self.begin_string.len() + len_str.len() + body_len + 16);
        message.put_slice(b"8=");
        message.put_slice(self.begin_string);
        message.put_u8(SOH);
        message.put_slice(b"9=");
        message.put_slice(len_str.as_bytes());
        message.put_u8(SOH);
        message.put_slice(&self.body);

        let checksum = calculate_checksum(&message);
        message.put_slice(b"10=");
        message.put_slice(&format_checksum(checksum));
        message.put_u8(SOH);

        message
    }
}
