/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! # fixwire Tag-Value
//!
//! FIX tag=value encoding and decoding for the fixwire engine.
//!
//! The codec is stateless: [`encode`] and [`decode`] are pure functions over
//! byte buffers. Integrity fields are always computed, never trusted:
//!
//! - **BodyLength** counts the bytes between the BodyLength and CheckSum fields
//! - **CheckSum** is the byte sum of everything before `10=`, modulo 256
//! - A message that fails either check is rejected, never corrected

pub mod checksum;
pub mod decoder;
pub mod encoder;

pub use checksum::{calculate_checksum, format_checksum, parse_checksum};
pub use decoder::{Decoder, decode};
pub use encoder::{SOH, encode, encode_message};
