/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Validating FIX message decoder.
//!
//! The decoder parses exactly one complete message and checks, in order:
//! field syntax, header order (8, 9, 35), the configured BeginString, the
//! declared BodyLength and finally the CheckSum. Field values are slices of
//! the input [`Bytes`], so decoding a framed buffer does not copy values.

use crate::checksum::{calculate_checksum, parse_checksum};
use bytes::Bytes;
use fixwire_core::error::DecodeError;
use fixwire_core::field::{Field, tags};
use fixwire_core::message::Message;
use memchr::memchr;
use smallvec::SmallVec;

/// SOH (Start of Header) delimiter used in FIX messages.
pub const SOH: u8 = 0x01;

/// Equals sign delimiter between tag and value.
pub const EQUALS: u8 = b'=';

/// Decodes one complete message, requiring BeginString to equal
/// `begin_string`.
///
/// # Errors
/// Returns `DecodeError` on any structural, length or checksum violation.
pub fn decode(input: &[u8], begin_string: &str) -> Result<Message, DecodeError> {
    Decoder::new(Bytes::copy_from_slice(input))
        .with_begin_string(begin_string)
        .decode()
}

/// FIX message decoder.
#[derive(Debug)]
pub struct Decoder<'a> {
    /// Input buffer.
    input: Bytes,
    /// Current position in the buffer.
    offset: usize,
    /// Protocol version the BeginString must match, if any.
    begin_string: Option<&'a str>,
}

impl<'a> Decoder<'a> {
    /// Creates a new decoder for the given input buffer.
    ///
    /// # Arguments
    /// * `input` - The bytes of exactly one FIX message
    #[inline]
    #[must_use]
    pub const fn new(input: Bytes) -> Self {
        Self {
            input,
            offset: 0,
            begin_string: None,
        }
    }

    /// Requires BeginString (tag 8) to equal `version`.
    #[inline]
    #[must_use]
    pub const fn with_begin_string(mut self, version: &'a str) -> Self {
        self.begin_string = Some(version);
        self
    }

    /// Decodes the buffer into a [`Message`].
    ///
    /// The returned message holds BeginString, MsgType and the body fields
    /// in wire order. BodyLength and CheckSum are validated and dropped.
    ///
    /// # Errors
    /// - `MalformedField` for syntax errors, misplaced header fields, a
    ///   BeginString mismatch, a missing CheckSum or trailing bytes
    /// - `BodyLengthMismatch` if tag 9 disagrees with the body span
    /// - `ChecksumMismatch` if tag 10 disagrees with the computed sum
    pub fn decode(mut self) -> Result<Message, DecodeError> {
        let begin_string = self.expect_field(tags::BEGIN_STRING, "BeginString must be first")?;
        if let Some(expected) = self.begin_string
            && begin_string.value != expected.as_bytes()
        {
            return Err(DecodeError::malformed(
                tags::BEGIN_STRING,
                format!(
                    "expected {}, found {}",
                    expected,
                    String::from_utf8_lossy(&begin_string.value)
                ),
            ));
        }

        let body_length = self.expect_field(tags::BODY_LENGTH, "BodyLength must be second")?;
        let declared = parse_length(&body_length.value).ok_or_else(|| {
            DecodeError::malformed(tags::BODY_LENGTH, "BodyLength must be a decimal number")
        })?;
        let body_start = self.offset;

        let msg_type = self.expect_field(tags::MSG_TYPE, "MsgType must be third")?;

        let mut fields: SmallVec<[Field; 16]> = SmallVec::new();
        fields.push(begin_string);
        fields.push(msg_type);

        let (checksum_start, checksum) = loop {
            let field_start = self.offset;
            let field = self
                .next_field()?
                .ok_or_else(|| DecodeError::malformed(tags::CHECKSUM, "CheckSum missing"))?;
            match field.tag {
                tags::CHECKSUM => break (field_start, field),
                tags::BEGIN_STRING | tags::BODY_LENGTH | tags::MSG_TYPE => {
                    return Err(DecodeError::malformed(field.tag, "header field repeated"));
                }
                _ => fields.push(field),
            }
        };

        if self.offset != self.input.len() {
            return Err(DecodeError::malformed(
                tags::CHECKSUM,
                "trailing bytes after CheckSum",
            ));
        }

        let actual = checksum_start - body_start;
        if actual != declared {
            return Err(DecodeError::BodyLengthMismatch { declared, actual });
        }

        let declared = parse_checksum(&checksum.value).ok_or_else(|| {
            DecodeError::malformed(tags::CHECKSUM, "CheckSum must be three digits")
        })?;
        let calculated = calculate_checksum(&self.input[..checksum_start]);
        if calculated != declared {
            return Err(DecodeError::ChecksumMismatch {
                calculated,
                declared,
            });
        }

        Ok(Message::from_fields(fields))
    }

    /// Parses the next field from the buffer.
    ///
    /// # Returns
    /// The next field, or `None` if the buffer is exhausted.
    ///
    /// # Errors
    /// Returns `MalformedField` for a missing `=`, a non-numeric tag, an
    /// empty value or a value without a terminating SOH.
    pub fn next_field(&mut self) -> Result<Option<Field>, DecodeError> {
        if self.offset >= self.input.len() {
            return Ok(None);
        }

        let remaining = &self.input[self.offset..];

        let eq_pos = memchr(EQUALS, remaining)
            .ok_or_else(|| DecodeError::malformed(0, "field without '=' separator"))?;
        let tag = parse_tag(&remaining[..eq_pos])
            .ok_or_else(|| DecodeError::malformed(0, "tag is not a positive integer"))?;

        let value_start = eq_pos + 1;
        let soh_pos = memchr(SOH, &remaining[value_start..])
            .ok_or_else(|| DecodeError::malformed(tag, "value not terminated by SOH"))?;
        if soh_pos == 0 {
            return Err(DecodeError::malformed(tag, "empty value"));
        }

        let start = self.offset + value_start;
        let value = self.input.slice(start..start + soh_pos);
        self.offset = start + soh_pos + 1;

        Ok(Some(Field::new(tag, value)))
    }

    /// Returns the current offset in the buffer.
    #[inline]
    #[must_use]
    pub const fn offset(&self) -> usize {
        self.offset
    }

    fn expect_field(&mut self, tag: u32, reason: &str) -> Result<Field, DecodeError> {
        match self.next_field()? {
            Some(field) if field.tag == tag => Ok(field),
            _ => Err(DecodeError::malformed(tag, reason)),
        }
    }
}

/// Parses a tag number from ASCII bytes.
///
/// # Returns
/// The parsed tag number, or `None` if empty, non-numeric, zero or too large.
#[inline]
fn parse_tag(bytes: &[u8]) -> Option<u32> {
    if bytes.is_empty() || bytes.len() > 10 {
        return None;
    }

    let mut result: u32 = 0;
    for &b in bytes {
        if !b.is_ascii_digit() {
            return None;
        }
        result = result.checked_mul(10)?.checked_add((b - b'0') as u32)?;
    }

    (result > 0).then_some(result)
}

/// Parses a BodyLength value; digits only.
#[inline]
fn parse_length(bytes: &[u8]) -> Option<usize> {
    if bytes.is_empty() || !bytes.iter().all(u8::is_ascii_digit) {
        return None;
    }
    std::str::from_utf8(bytes).ok()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::format_checksum;
    use crate::encoder::{encode, encode_message};
    use fixwire_core::message::MsgType;
    use proptest::prelude::*;

    const HEARTBEAT: &[u8] = b"8=FIX.4.2\x019=5\x0135=0\x0110=161\x01";

    fn order() -> Message {
        Message::builder("FIX.4.2", &MsgType::NewOrderSingle)
            .field(tags::SENDER_COMP_ID, "CLIENT")
            .field(tags::TARGET_COMP_ID, "GATEWAY")
            .field_u64(tags::MSG_SEQ_NUM, 2)
            .field(tags::SYMBOL, "AAPL")
            .field(tags::SIDE, "1")
            .field(tags::PRICE, "150.50")
            .field_u64(tags::ORDER_QTY, 100)
            .build()
    }

    #[test]
    fn test_parse_tag() {
        assert_eq!(parse_tag(b"8"), Some(8));
        assert_eq!(parse_tag(b"35"), Some(35));
        assert_eq!(parse_tag(b"12345"), Some(12345));
        assert_eq!(parse_tag(b""), None);
        assert_eq!(parse_tag(b"0"), None);
        assert_eq!(parse_tag(b"abc"), None);
        assert_eq!(parse_tag(b"12a"), None);
    }

    #[test]
    fn test_parse_length() {
        assert_eq!(parse_length(b"176"), Some(176));
        assert_eq!(parse_length(b"+5"), None);
        assert_eq!(parse_length(b""), None);
    }

    #[test]
    fn test_decode_heartbeat() {
        let msg = decode(HEARTBEAT, "FIX.4.2").unwrap();
        assert_eq!(msg.msg_type(), MsgType::Heartbeat);
        assert_eq!(msg.begin_string(), Some("FIX.4.2"));
        assert_eq!(msg.len(), 2);
    }

    #[test]
    fn test_round_trip() {
        let original = order();
        let bytes = encode_message(&original).unwrap();
        let decoded = decode(&bytes, "FIX.4.2").unwrap();
        assert_eq!(decoded, original);
        assert_eq!(decoded.get_str(tags::PRICE), Some("150.50"));
    }

    #[test]
    fn test_decode_rejects_altered_body_byte() {
        let bytes = encode_message(&order()).unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        let pos = text.find("AAPL").unwrap();

        let mut altered = bytes.to_vec();
        altered[pos] = b'B';
        assert!(matches!(
            decode(&altered, "FIX.4.2"),
            Err(DecodeError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_decode_rejects_hardcoded_zero_checksum() {
        let raw = b"8=FIX.4.2\x019=5\x0135=A\x0110=000\x01";
        assert!(matches!(
            decode(raw, "FIX.4.2"),
            Err(DecodeError::ChecksumMismatch { declared: 0, .. })
        ));
    }

    #[test]
    fn test_decode_body_length_mismatch() {
        let raw = b"8=FIX.4.2\x019=6\x0135=0\x0110=161\x01";
        assert_eq!(
            decode(raw, "FIX.4.2"),
            Err(DecodeError::BodyLengthMismatch {
                declared: 6,
                actual: 5
            })
        );
    }

    #[test]
    fn test_decode_begin_string_mismatch() {
        assert!(matches!(
            decode(HEARTBEAT, "FIX.4.4"),
            Err(DecodeError::MalformedField { tag: 8, .. })
        ));
    }

    #[test]
    fn test_decode_header_order() {
        let raw = b"9=5\x018=FIX.4.2\x0135=0\x0110=161\x01";
        assert!(matches!(
            decode(raw, "FIX.4.2"),
            Err(DecodeError::MalformedField { tag: 8, .. })
        ));

        let raw = b"8=FIX.4.2\x019=5\x0149=X\x0110=161\x01";
        assert!(matches!(
            decode(raw, "FIX.4.2"),
            Err(DecodeError::MalformedField { tag: 35, .. })
        ));
    }

    #[test]
    fn test_decode_missing_checksum() {
        let raw = b"8=FIX.4.2\x019=5\x0135=0\x01";
        assert!(matches!(
            decode(raw, "FIX.4.2"),
            Err(DecodeError::MalformedField { tag: 10, .. })
        ));
    }

    #[test]
    fn test_decode_trailing_bytes() {
        let mut raw = HEARTBEAT.to_vec();
        raw.extend_from_slice(b"8=");
        assert!(matches!(
            decode(&raw, "FIX.4.2"),
            Err(DecodeError::MalformedField { tag: 10, .. })
        ));
    }

    #[test]
    fn test_decode_unterminated_and_garbled_fields() {
        let raw = b"8=FIX.4.2\x019=5\x0135=0";
        assert!(matches!(
            decode(raw, "FIX.4.2"),
            Err(DecodeError::MalformedField { tag: 35, .. })
        ));

        let raw = b"8=FIX.4.2\x019=9\x0135=0\x01xx\x0110=000\x01";
        assert!(matches!(
            decode(raw, "FIX.4.2"),
            Err(DecodeError::MalformedField { tag: 0, .. })
        ));
    }

    #[test]
    fn test_decode_bad_checksum_format() {
        let raw = b"8=FIX.4.2\x019=5\x0135=0\x0110=1a1\x01";
        assert!(matches!(
            decode(raw, "FIX.4.2"),
            Err(DecodeError::MalformedField { tag: 10, .. })
        ));
    }

    #[test]
    fn test_next_field_zero_copy() {
        let input = Bytes::from_static(HEARTBEAT);
        let mut decoder = Decoder::new(input.clone());

        let first = decoder.next_field().unwrap().unwrap();
        assert_eq!(first.tag, 8);
        assert_eq!(&first.value[..], b"FIX.4.2");
        assert_eq!(first.value.as_ptr(), input[2..].as_ptr());
        assert_eq!(decoder.offset(), 10);
    }

    fn body_field() -> impl Strategy<Value = Field> {
        let tag = (1u32..100_000).prop_filter("framing tags are derived", |tag| {
            !matches!(
                *tag,
                tags::BEGIN_STRING | tags::BODY_LENGTH | tags::CHECKSUM | tags::MSG_TYPE
            )
        });
        let value = proptest::collection::vec(any::<u8>().prop_filter("SOH", |b| *b != SOH), 1..24);
        (tag, value).prop_map(|(tag, value)| Field::new(tag, value))
    }

    fn message_fields() -> impl Strategy<Value = Vec<Field>> {
        ("[0-9A-Za-z]{1,2}", proptest::collection::vec(body_field(), 0..12)).prop_map(
            |(msg_type, body)| {
                let mut fields = vec![
                    Field::string(tags::BEGIN_STRING, "FIX.4.4"),
                    Field::string(tags::MSG_TYPE, &msg_type),
                ];
                fields.extend(body);
                fields
            },
        )
    }

    /// Start of the span covered by BodyLength.
    fn body_start(frame: &[u8]) -> usize {
        let first = memchr(SOH, frame).unwrap_or(0);
        first + 1 + memchr(SOH, &frame[first + 1..]).unwrap_or(0) + 1
    }

    proptest! {
        #[test]
        fn test_any_valid_field_sequence_round_trips(fields in message_fields()) {
            let frame = encode(&fields).unwrap();
            let decoded = decode(&frame, "FIX.4.4").unwrap();
            prop_assert_eq!(decoded.fields(), fields.as_slice());

            let trailer = frame.len() - 7;
            prop_assert_eq!(&frame[trailer..trailer + 3], b"10=");
            prop_assert_eq!(
                &frame[trailer + 3..trailer + 6],
                &format_checksum(calculate_checksum(&frame[..trailer]))[..]
            );
        }

        #[test]
        fn test_any_single_byte_change_in_body_is_rejected(
            fields in message_fields(),
            at in any::<usize>(),
            mask in 1u8..=255,
        ) {
            let mut frame = encode(&fields).unwrap().to_vec();
            let start = body_start(&frame);
            let end = frame.len() - 7;
            let index = start + at % (end - start);
            frame[index] ^= mask;

            prop_assert!(decode(&frame, "FIX.4.4").is_err());
        }
    }
}
