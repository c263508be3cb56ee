/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! # fixwire Core
//!
//! Core types and error definitions for the fixwire FIX session engine.
//!
//! This crate provides the building blocks shared by every other fixwire crate:
//! - **Error types**: The engine's error taxonomy, built with `thiserror`
//! - **Field types**: [`Field`] and the [`tags`] the session layer interprets
//! - **Message types**: [`Message`], [`MessageBuilder`] and [`MsgType`]
//! - **Core types**: [`SeqNum`], [`Timestamp`], [`CompId`], [`SessionId`], [`Direction`]

pub mod error;
pub mod field;
pub mod message;
pub mod types;

pub use error::{
    DecodeError, EncodeError, FixError, Result, SequenceError, SessionError, StoreError,
};
pub use field::{Field, tags};
pub use message::{Message, MessageBuilder, MsgType};
pub use types::{CompId, Direction, SeqNum, SessionId, Timestamp};
