/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! # fixwire Transport
//!
//! Stream framing for fixwire sessions.
//!
//! [`FixCodec`] cuts a byte stream into whole FIX frames by reading the
//! BodyLength field. It plugs into `tokio_util::codec` and leaves checksum
//! and field validation to the tag=value decoder.

pub mod codec;

pub use codec::{CodecError, FixCodec};
