/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! # fixwire
//!
//! A FIX session engine for Rust.
//!
//! fixwire turns the FIX tag=value wire format into an ordered, gap-free
//! stream of application messages. It covers framing, checksums, sequence
//! numbers, the Logon/Logout handshake, heartbeats and TestRequests, and
//! gap recovery through ResendRequest and SequenceReset.
//!
//! ## Features
//!
//! - **Strict codec**: BodyLength and CheckSum are verified, never repaired
//! - **Deterministic session**: every entry point takes the current time
//! - **Gap recovery**: out-of-order messages are held until the gap fills
//! - **Async support**: Built on Tokio, one task per session
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use fixwire::prelude::*;
//!
//! let config = SessionConfig::new(
//!     CompId::new("CLIENT").unwrap(),
//!     CompId::new("SERVER").unwrap(),
//!     "FIX.4.2",
//! );
//! let stream = tokio::net::TcpStream::connect("127.0.0.1:9876").await?;
//! let (handle, task) = EngineBuilder::new(config)
//!     .with_application(MyApplication)
//!     .initiate(stream)?;
//! handle.wait_logged_on().await?;
//! ```
//!
//! ## Crate Organization
//!
//! - [`core`]: Fundamental types and error definitions
//! - [`tagvalue`]: Tag=value encoding and decoding
//! - [`session`]: Session layer state machine
//! - [`store`]: Message storage for resends and restarts
//! - [`transport`]: Stream framing
//! - [`engine`]: Async per-session event loop

pub mod core {
    //! Core types and error definitions.
    pub use fixwire_core::*;
}

pub mod tagvalue {
    //! Tag=value encoding and decoding.
    pub use fixwire_tagvalue::*;
}

pub mod session {
    //! Session layer state machine.
    pub use fixwire_session::*;
}

pub mod store {
    //! Message storage for resends and restarts.
    pub use fixwire_store::*;
}

pub mod transport {
    //! Stream framing.
    pub use fixwire_transport::*;
}

pub mod engine {
    //! Async per-session event loop.
    pub use fixwire_engine::*;
}

/// Prelude module for convenient imports.
pub mod prelude {
    // Core types
    pub use fixwire_core::{
        CompId, DecodeError, EncodeError, Field, FixError, Message, MsgType, Result, SeqNum,
        SequenceError, SessionError, SessionId, StoreError, Timestamp, tags,
    };

    // Tag-value encoding
    pub use fixwire_tagvalue::{calculate_checksum, decode, encode};

    // Session
    pub use fixwire_session::{
        Reaction, RecommendedAction, Role, Session, SessionConfig, SessionConfigBuilder,
        SessionFailure, SessionState,
    };

    // Store
    pub use fixwire_store::{MemoryStore, MessageStore, StoreRegistry};

    // Transport
    pub use fixwire_transport::{CodecError, FixCodec};

    // Engine
    pub use fixwire_engine::{
        Application, EngineBuilder, EngineError, NoOpApplication, SessionHandle, SessionTask,
    };
}
