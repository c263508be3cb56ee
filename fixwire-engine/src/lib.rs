/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! # fixwire Engine
//!
//! Runs a [`fixwire_session::Session`] over an async byte stream.
//!
//! This crate provides:
//! - **Builder API**: [`EngineBuilder`] starts an initiator or acceptor task
//!   over any `AsyncRead + AsyncWrite` stream
//! - **Application trait**: callbacks for logon, logout, application
//!   messages and failures
//! - **Session handles**: cloneable [`SessionHandle`]s for sending messages
//!   and shutting down

pub mod application;
pub mod builder;
mod driver;
pub mod error;
pub mod handle;

pub use application::{Application, NoOpApplication};
pub use builder::{EngineBuilder, SessionTask};
pub use error::EngineError;
pub use handle::SessionHandle;
