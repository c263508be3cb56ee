/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! # fixwire Session
//!
//! FIX session layer protocol implementation for the fixwire engine.
//!
//! This crate provides:
//! - **State machine**: Logon, Logout, Heartbeat and TestRequest handling
//!   driven by inbound frames and timer ticks with injected time
//! - **Sequence tracking**: Outgoing allocation and incoming gap/duplicate detection
//! - **Heartbeat handling**: Liveness decisions without reading a clock
//! - **Recovery**: Gap buffering, ResendRequest retries and resend serving
//! - **Configuration**: Session configuration options and validation

pub mod config;
pub mod heartbeat;
pub mod recovery;
pub mod sequence;
pub mod session;
pub mod state;

pub use config::{Role, SessionConfig, SessionConfigBuilder};
pub use heartbeat::{HeartbeatMonitor, Liveness};
pub use recovery::GapRecovery;
pub use sequence::{SequenceOutcome, SequenceTracker};
pub use session::{Reaction, RecommendedAction, Session, SessionFailure};
pub use state::SessionState;
