/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Application callback interface.
//!
//! The engine calls these hooks from the session task, in the order the
//! session produced the events. A slow callback delays the session, so hand
//! heavy work off to another task.

use async_trait::async_trait;
use fixwire_core::message::Message;
use fixwire_core::types::SessionId;
use fixwire_session::SessionFailure;

/// Application callback interface for a FIX session.
#[async_trait]
pub trait Application: Send + Sync {
    /// Called once the Logon exchange completes.
    ///
    /// # Arguments
    /// * `session_id` - The session identifier
    async fn on_logon(&self, session_id: &SessionId);

    /// Called once when a logged-on session ends, whatever the cause.
    ///
    /// # Arguments
    /// * `session_id` - The session identifier
    async fn on_logout(&self, session_id: &SessionId);

    /// Called for every application message, in sequence order.
    ///
    /// Messages replayed after a gap arrive here exactly once.
    ///
    /// # Arguments
    /// * `message` - The received message
    /// * `session_id` - The session identifier
    #[allow(clippy::wrong_self_convention)]
    async fn from_app(&self, message: &Message, session_id: &SessionId);

    /// Called for every session failure, recoverable or not.
    ///
    /// # Arguments
    /// * `failure` - The failure and its recommended action
    /// * `session_id` - The session identifier
    async fn on_failure(&self, failure: &SessionFailure, session_id: &SessionId);
}

/// Default no-op application implementation.
#[derive(Debug, Default)]
pub struct NoOpApplication;

#[async_trait]
impl Application for NoOpApplication {
    async fn on_logon(&self, _session_id: &SessionId) {}

    async fn on_logout(&self, _session_id: &SessionId) {}

    async fn from_app(&self, _message: &Message, _session_id: &SessionId) {}

    async fn on_failure(&self, _failure: &SessionFailure, _session_id: &SessionId) {}
}
