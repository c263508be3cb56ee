/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Tokio codec for FIX message framing.
//!
//! This module splits a byte stream into complete FIX frames using the
//! BodyLength field. It checks only what it needs to find frame boundaries;
//! checksum and field validation belong to the tag=value decoder.

use bytes::{BufMut, Bytes, BytesMut};
use fixwire_core::error::{DecodeError, FixError};
use fixwire_core::field::tags;
use memchr::memchr;
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};
use tracing::trace;

/// Errors that can occur during codec operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Invalid BeginString field.
    #[error("invalid begin string: message must start with 8=")]
    InvalidBeginString,

    /// Missing BodyLength field.
    #[error("missing body length field (tag 9)")]
    MissingBodyLength,

    /// Invalid BodyLength value.
    #[error("invalid body length value")]
    InvalidBodyLength,

    /// The bytes BodyLength points at are not a CheckSum field.
    #[error("frame does not end with a checksum field (tag 10)")]
    MissingChecksum,

    /// Message exceeds maximum size.
    #[error("message too large: {size} bytes exceeds maximum {max_size}")]
    MessageTooLarge {
        /// Actual message size.
        size: usize,
        /// Maximum allowed size.
        max_size: usize,
    },

    /// I/O error.
    #[error("io error: {0}")]
    Io(String),
}

impl From<std::io::Error> for CodecError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<CodecError> for FixError {
    fn from(err: CodecError) -> Self {
        let tag = match &err {
            CodecError::Io(reason) => return Self::Io(std::io::Error::other(reason.clone())),
            CodecError::InvalidBeginString => tags::BEGIN_STRING,
            CodecError::MissingBodyLength
            | CodecError::InvalidBodyLength
            | CodecError::MessageTooLarge { .. } => tags::BODY_LENGTH,
            CodecError::MissingChecksum => tags::CHECKSUM,
        };
        Self::Decode(DecodeError::malformed(tag, err.to_string()))
    }
}

/// SOH delimiter.
const SOH: u8 = 0x01;

/// Length of the `10=NNN<SOH>` trailer.
const TRAILER_LEN: usize = 7;

/// Longest BodyLength digit run accepted.
const MAX_BODY_LENGTH_DIGITS: usize = 9;

/// Tokio codec for FIX message framing.
///
/// Yields one complete frame per call, from `8=` through the SOH that ends
/// the CheckSum field. Frames are passed on untouched.
#[derive(Debug, Clone)]
pub struct FixCodec {
    /// Maximum message size in bytes.
    max_message_size: usize,
}

impl FixCodec {
    /// Creates a new codec with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_message_size: 1024 * 1024, // 1MB
        }
    }

    /// Sets the maximum message size.
    #[must_use]
    pub const fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    /// Returns the maximum message size.
    #[must_use]
    pub const fn max_message_size(&self) -> usize {
        self.max_message_size
    }

    fn too_large(&self, size: usize) -> CodecError {
        CodecError::MessageTooLarge {
            size,
            max_size: self.max_message_size,
        }
    }
}

impl Default for FixCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for FixCodec {
    type Item = Bytes;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < 2 {
            return Ok(None);
        }

        // Validate BeginString starts with "8="
        if &src[0..2] != b"8=" {
            return Err(CodecError::InvalidBeginString);
        }

        // Find first SOH to get BeginString value
        let Some(first_soh) = memchr(SOH, src) else {
            if src.len() > self.max_message_size {
                return Err(self.too_large(src.len()));
            }
            return Ok(None);
        };

        // Find BodyLength field (9=XXX|)
        let body_len_start = first_soh + 1;
        if src.len() < body_len_start + 2 {
            return Ok(None);
        }
        if &src[body_len_start..body_len_start + 2] != b"9=" {
            return Err(CodecError::MissingBodyLength);
        }

        // Find SOH after BodyLength
        let digits_start = body_len_start + 2;
        let Some(body_len_soh) = memchr(SOH, &src[digits_start..]).map(|pos| digits_start + pos)
        else {
            if src.len() - digits_start > MAX_BODY_LENGTH_DIGITS {
                return Err(CodecError::InvalidBodyLength);
            }
            return Ok(None);
        };

        // Parse BodyLength value
        let digits = &src[digits_start..body_len_soh];
        if digits.is_empty()
            || digits.len() > MAX_BODY_LENGTH_DIGITS
            || !digits.iter().all(u8::is_ascii_digit)
        {
            return Err(CodecError::InvalidBodyLength);
        }
        let body_length = digits
            .iter()
            .fold(0usize, |acc, d| acc * 10 + usize::from(d - b'0'));

        // BodyLength counts from after 9=XXX| to before 10=
        let checksum_start = body_len_soh + 1 + body_length;
        let total_length = checksum_start + TRAILER_LEN;

        // Check maximum size
        if total_length > self.max_message_size {
            return Err(self.too_large(total_length));
        }

        // Check if we have the complete message
        if src.len() < total_length {
            src.reserve(total_length - src.len());
            return Ok(None);
        }

        let trailer = &src[checksum_start..total_length];
        if &trailer[..3] != b"10=" || trailer[TRAILER_LEN - 1] != SOH {
            return Err(CodecError::MissingChecksum);
        }

        trace!(len = total_length, "frame complete");
        Ok(Some(src.split_to(total_length).freeze()))
    }
}

impl Encoder<Bytes> for FixCodec {
    type Error = CodecError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if item.len() > self.max_message_size {
            return Err(self.too_large(item.len()));
        }
        dst.reserve(item.len());
        dst.put_slice(&item);
        Ok(())
    }
}

impl Encoder<&[u8]> for FixCodec {
    type Error = CodecError;

    fn encode(&mut self, item: &[u8], dst: &mut BytesMut) -> Result<(), Self::Error> {
        self.encode(Bytes::copy_from_slice(item), dst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fixwire_tagvalue::calculate_checksum;

    fn make_fix_message(body: &str) -> Vec<u8> {
        let header = format!("8=FIX.4.2\x019={}\x01", body.len());
        let without_checksum = format!("{}{}", header, body);
        let checksum = calculate_checksum(without_checksum.as_bytes());
        format!("{}10={:03}\x01", without_checksum, checksum).into_bytes()
    }

    #[test]
    fn test_codec_decode_complete_message() {
        let mut codec = FixCodec::new();
        let msg = make_fix_message("35=0\x01");
        let mut buf = BytesMut::from(&msg[..]);

        let frame = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(&frame[..], &msg[..]);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_codec_decode_incomplete() {
        let mut codec = FixCodec::new();
        let msg = make_fix_message("35=0\x01");

        for cut in [1, 5, 12, msg.len() - 1] {
            let mut buf = BytesMut::from(&msg[..cut]);
            assert!(codec.decode(&mut buf).unwrap().is_none(), "cut at {cut}");
            assert_eq!(buf.len(), cut);
        }
    }

    #[test]
    fn test_codec_decode_back_to_back_frames() {
        let mut codec = FixCodec::new();
        let first = make_fix_message("35=A\x0134=1\x01");
        let second = make_fix_message("35=D\x0134=2\x0155=AAPL\x01");
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&first);
        buf.extend_from_slice(&second[..10]);

        assert_eq!(&codec.decode(&mut buf).unwrap().unwrap()[..], &first[..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(&second[10..]);
        assert_eq!(&codec.decode(&mut buf).unwrap().unwrap()[..], &second[..]);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_codec_decode_invalid_begin_string() {
        let mut codec = FixCodec::new();
        let mut buf = BytesMut::from(&b"9=FIX.4.2\x019=5\x0135=0\x0110=000\x01"[..]);

        let result = codec.decode(&mut buf);
        assert!(matches!(result, Err(CodecError::InvalidBeginString)));
    }

    #[test]
    fn test_codec_decode_invalid_body_length() {
        let mut codec = FixCodec::new();
        let mut buf = BytesMut::from(&b"8=FIX.4.2\x019=5x\x0135=0\x0110=000\x01"[..]);
        assert_eq!(codec.decode(&mut buf), Err(CodecError::InvalidBodyLength));

        let mut buf = BytesMut::from(&b"8=FIX.4.2\x0135=0\x01"[..]);
        assert_eq!(codec.decode(&mut buf), Err(CodecError::MissingBodyLength));
    }

    #[test]
    fn test_codec_decode_body_length_too_short() {
        let mut codec = FixCodec::new();
        // declared 3, actual body 5: the trailer lands inside the body
        let mut buf = BytesMut::from(&b"8=FIX.4.2\x019=3\x0135=0\x0110=161\x01"[..]);
        assert_eq!(codec.decode(&mut buf), Err(CodecError::MissingChecksum));
    }

    #[test]
    fn test_codec_passes_bad_checksum_through() {
        let mut codec = FixCodec::new();
        let mut buf = BytesMut::from(&b"8=FIX.4.2\x019=5\x0135=0\x0110=000\x01"[..]);

        assert!(codec.decode(&mut buf).unwrap().is_some());
    }

    #[test]
    fn test_codec_max_message_size() {
        let mut codec = FixCodec::new().with_max_message_size(64);
        let msg = make_fix_message(&format!("35=0\x0158={}\x01", "x".repeat(100)));
        let mut buf = BytesMut::from(&msg[..]);

        assert!(matches!(
            codec.decode(&mut buf),
            Err(CodecError::MessageTooLarge { max_size: 64, .. })
        ));
    }

    #[test]
    fn test_codec_encode() {
        let mut codec = FixCodec::new();
        let msg = b"8=FIX.4.2\x019=5\x0135=0\x0110=161\x01";
        let mut dst = BytesMut::new();

        codec.encode(&msg[..], &mut dst).unwrap();
        assert_eq!(&dst[..], msg);
    }

    #[test]
    fn test_codec_error_into_fix_error() {
        let err: FixError = CodecError::MissingChecksum.into();
        assert!(matches!(
            err,
            FixError::Decode(DecodeError::MalformedField { tag: 10, .. })
        ));

        let err: FixError = CodecError::Io("reset".to_string()).into();
        assert!(matches!(err, FixError::Io(_)));
    }
}
