/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Engine builder for fluent configuration.
//!
//! This module provides a builder API for starting a session task over any
//! connected byte stream.

use crate::application::{Application, NoOpApplication};
use crate::driver::Driver;
use crate::error::EngineError;
use crate::handle::SessionHandle;
use fixwire_session::{Role, Session, SessionConfig, SessionState};
use fixwire_store::{MemoryStore, MessageStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::info;

/// Join handle of a spawned session task.
pub type SessionTask = JoinHandle<Result<(), EngineError>>;

/// Builder for starting a FIX session.
pub struct EngineBuilder<A: Application = NoOpApplication> {
    /// Session configuration.
    config: SessionConfig,
    /// Application callback handler.
    application: Arc<A>,
    /// Message store; a fresh `MemoryStore` when unset.
    store: Option<Arc<dyn MessageStore>>,
    /// Timer tick period.
    tick_interval: Duration,
    /// Command channel capacity.
    command_capacity: usize,
}

impl<A: Application> std::fmt::Debug for EngineBuilder<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineBuilder")
            .field("session", &self.config.session_id())
            .field("has_store", &self.store.is_some())
            .field("tick_interval", &self.tick_interval)
            .field("command_capacity", &self.command_capacity)
            .finish_non_exhaustive()
    }
}

impl EngineBuilder<NoOpApplication> {
    /// Creates a new engine builder with default settings.
    #[must_use]
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            application: Arc::new(NoOpApplication),
            store: None,
            tick_interval: Duration::from_secs(1),
            command_capacity: 64,
        }
    }
}

impl<A: Application + 'static> EngineBuilder<A> {
    /// Sets the application callback handler.
    #[must_use]
    pub fn with_application<B: Application>(self, application: B) -> EngineBuilder<B> {
        self.with_shared_application(Arc::new(application))
    }

    /// Sets an application callback handler shared with other sessions.
    #[must_use]
    pub fn with_shared_application<B: Application>(self, application: Arc<B>) -> EngineBuilder<B> {
        EngineBuilder {
            config: self.config,
            application,
            store: self.store,
            tick_interval: self.tick_interval,
            command_capacity: self.command_capacity,
        }
    }

    /// Sets the message store.
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn MessageStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Sets how often the session timers are checked.
    ///
    /// Timeouts fire at most one tick late.
    #[must_use]
    pub fn with_tick_interval(mut self, tick: Duration) -> Self {
        self.tick_interval = tick;
        self
    }

    /// Sets the command channel capacity.
    #[must_use]
    pub const fn with_command_capacity(mut self, capacity: usize) -> Self {
        self.command_capacity = capacity;
        self
    }

    /// Returns the session configuration.
    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Returns the timer tick period.
    #[must_use]
    pub const fn tick_interval(&self) -> Duration {
        self.tick_interval
    }

    /// Starts an initiator session over `stream`; the Logon goes out first.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    /// Returns `EngineError::Fix` if the configuration does not validate.
    pub fn initiate<S>(self, stream: S) -> Result<(SessionHandle, SessionTask), EngineError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        self.spawn(Role::Initiator, stream)
    }

    /// Starts an acceptor session over `stream`; it waits for the Logon.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    /// Returns `EngineError::Fix` if the configuration does not validate.
    pub fn accept<S>(self, stream: S) -> Result<(SessionHandle, SessionTask), EngineError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        self.spawn(Role::Acceptor, stream)
    }

    fn spawn<S>(self, role: Role, stream: S) -> Result<(SessionHandle, SessionTask), EngineError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        if self.tick_interval.is_zero() || self.command_capacity == 0 {
            return Err(fixwire_core::error::SessionError::Configuration(
                "tick interval and command capacity must be positive".to_string(),
            )
            .into());
        }

        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryStore::new()) as Arc<dyn MessageStore>);
        let session = Session::new(self.config.with_role(role), store)?;
        let id = session.id().clone();

        let (command_tx, command_rx) = mpsc::channel(self.command_capacity);
        let (state_tx, state_rx) = watch::channel(SessionState::Disconnected);
        let driver = Driver::new(
            session,
            stream,
            self.application,
            command_rx,
            state_tx,
            self.tick_interval,
        );

        info!(session = %id, ?role, "starting session task");
        let task = tokio::spawn(driver.run());
        Ok((SessionHandle::new(id, command_tx, state_rx), task))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fixwire_core::types::CompId;

    fn config() -> SessionConfig {
        SessionConfig::new(
            CompId::new("SENDER").unwrap(),
            CompId::new("TARGET").unwrap(),
            "FIX.4.4",
        )
    }

    #[test]
    fn test_engine_builder_default() {
        let builder = EngineBuilder::new(config());
        assert_eq!(builder.tick_interval(), Duration::from_secs(1));
        assert_eq!(builder.config().begin_string, "FIX.4.4");
        assert!(builder.store.is_none());
    }

    #[test]
    fn test_engine_builder_with_options() {
        let builder = EngineBuilder::new(config())
            .with_store(Arc::new(MemoryStore::new()))
            .with_tick_interval(Duration::from_millis(100))
            .with_command_capacity(8);

        assert_eq!(builder.tick_interval(), Duration::from_millis(100));
        assert_eq!(builder.command_capacity, 8);
        assert!(builder.store.is_some());
    }

    #[tokio::test]
    async fn test_engine_builder_rejects_invalid_config() {
        let (stream, _peer) = tokio::io::duplex(1024);
        let bad = config().with_heartbeat_interval(Duration::ZERO);

        let result = EngineBuilder::new(bad).initiate(stream);
        assert!(matches!(result, Err(EngineError::Fix(_))));
    }

    #[tokio::test]
    async fn test_engine_builder_rejects_zero_tick() {
        let (stream, _peer) = tokio::io::duplex(1024);

        let result = EngineBuilder::new(config())
            .with_tick_interval(Duration::ZERO)
            .accept(stream);
        assert!(matches!(result, Err(EngineError::Fix(_))));
    }
}
