/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Session configuration.
//!
//! This module provides configuration options for FIX sessions.

use fixwire_core::error::SessionError;
use fixwire_core::types::{CompId, SessionId};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Largest HeartBtInt an acceptor agrees to, in seconds.
pub const MAX_HEARTBEAT_SECS: u64 = 3600;

/// Which side opens the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Sends the first Logon.
    #[default]
    Initiator,
    /// Waits for the counterparty's Logon and answers it.
    Acceptor,
}

/// Configuration for a FIX session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Sender CompID (tag 49).
    pub sender_comp_id: CompId,
    /// Target CompID (tag 56).
    pub target_comp_id: CompId,
    /// FIX version BeginString (e.g., "FIX.4.2").
    pub begin_string: String,
    /// Initiator or acceptor.
    pub role: Role,
    /// Heartbeat interval advertised in Logon (tag 108).
    pub heartbeat_interval: Duration,
    /// How long to wait for the Logon response.
    pub logon_timeout: Duration,
    /// How long to wait for the counterparty's Logout.
    pub logout_timeout: Duration,
    /// How long a TestRequest may stay unanswered.
    pub test_request_grace: Duration,
    /// How long a ResendRequest may stay unfulfilled before it is re-issued.
    pub resend_timeout: Duration,
    /// ResendRequests issued for one gap before giving up.
    pub resend_retry_limit: u32,
    /// Maximum message size in bytes.
    pub max_message_size: usize,
    /// Out-of-order messages held while a gap is open.
    pub max_buffered_messages: usize,
}

impl SessionConfig {
    /// Creates a new session configuration with required fields.
    ///
    /// # Arguments
    /// * `sender_comp_id` - The sender CompID
    /// * `target_comp_id` - The target CompID
    /// * `begin_string` - The FIX version string
    #[must_use]
    pub fn new(
        sender_comp_id: CompId,
        target_comp_id: CompId,
        begin_string: impl Into<String>,
    ) -> Self {
        let heartbeat_interval = Duration::from_secs(30);
        Self {
            sender_comp_id,
            target_comp_id,
            begin_string: begin_string.into(),
            role: Role::Initiator,
            heartbeat_interval,
            logon_timeout: heartbeat_interval,
            logout_timeout: Duration::from_secs(10),
            test_request_grace: heartbeat_interval,
            resend_timeout: heartbeat_interval,
            resend_retry_limit: 3,
            max_message_size: 1024 * 1024, // 1MB
            max_buffered_messages: 10_000,
        }
    }

    /// Sets the role.
    #[must_use]
    pub const fn with_role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }

    /// Sets the heartbeat interval.
    ///
    /// The logon timeout, TestRequest grace period and resend timeout follow
    /// the interval unless they were set explicitly to something else.
    #[must_use]
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        if self.logon_timeout == self.heartbeat_interval {
            self.logon_timeout = interval;
        }
        if self.test_request_grace == self.heartbeat_interval {
            self.test_request_grace = interval;
        }
        if self.resend_timeout == self.heartbeat_interval {
            self.resend_timeout = interval;
        }
        self.heartbeat_interval = interval;
        self
    }

    /// Sets the logon timeout.
    #[must_use]
    pub fn with_logon_timeout(mut self, timeout: Duration) -> Self {
        self.logon_timeout = timeout;
        self
    }

    /// Sets the logout timeout.
    #[must_use]
    pub fn with_logout_timeout(mut self, timeout: Duration) -> Self {
        self.logout_timeout = timeout;
        self
    }

    /// Sets the TestRequest grace period.
    #[must_use]
    pub fn with_test_request_grace(mut self, grace: Duration) -> Self {
        self.test_request_grace = grace;
        self
    }

    /// Sets the resend timeout.
    #[must_use]
    pub fn with_resend_timeout(mut self, timeout: Duration) -> Self {
        self.resend_timeout = timeout;
        self
    }

    /// Sets the resend retry limit.
    #[must_use]
    pub const fn with_resend_retry_limit(mut self, limit: u32) -> Self {
        self.resend_retry_limit = limit;
        self
    }

    /// Sets the maximum message size.
    #[must_use]
    pub const fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    /// Sets the out-of-order buffer bound.
    #[must_use]
    pub const fn with_max_buffered_messages(mut self, max: usize) -> Self {
        self.max_buffered_messages = max;
        self
    }

    /// Returns the heartbeat interval in seconds.
    #[must_use]
    pub fn heartbeat_interval_secs(&self) -> u64 {
        self.heartbeat_interval.as_secs()
    }

    /// Returns the identity of the session this config describes.
    #[must_use]
    pub fn session_id(&self) -> SessionId {
        SessionId::new(
            self.begin_string.clone(),
            self.sender_comp_id,
            self.target_comp_id,
        )
    }

    /// Checks the configuration for values no session can run with.
    ///
    /// # Errors
    /// Returns `SessionError::Configuration` naming the first bad value.
    pub fn validate(&self) -> Result<(), SessionError> {
        if self.begin_string.is_empty() {
            return Err(config_error("begin_string must not be empty"));
        }
        if self.begin_string.as_bytes().contains(&0x01) {
            return Err(config_error("begin_string must not contain SOH"));
        }
        let heartbeat = self.heartbeat_interval_secs();
        if heartbeat == 0 || heartbeat > MAX_HEARTBEAT_SECS {
            return Err(config_error(format!(
                "heartbeat_interval must be 1..={MAX_HEARTBEAT_SECS} whole seconds"
            )));
        }
        for (name, value) in [
            ("logon_timeout", self.logon_timeout),
            ("logout_timeout", self.logout_timeout),
            ("test_request_grace", self.test_request_grace),
            ("resend_timeout", self.resend_timeout),
        ] {
            if value.is_zero() {
                return Err(config_error(format!("{name} must be non-zero")));
            }
        }
        if self.resend_retry_limit == 0 {
            return Err(config_error("resend_retry_limit must be at least 1"));
        }
        if self.max_message_size == 0 {
            return Err(config_error("max_message_size must be non-zero"));
        }
        if self.max_buffered_messages == 0 {
            return Err(config_error("max_buffered_messages must be non-zero"));
        }
        Ok(())
    }
}

fn config_error(reason: impl Into<String>) -> SessionError {
    SessionError::Configuration(reason.into())
}

/// Builder for session configuration.
#[derive(Debug, Default)]
pub struct SessionConfigBuilder {
    sender_comp_id: Option<String>,
    target_comp_id: Option<String>,
    begin_string: Option<String>,
    role: Role,
    heartbeat_interval: Option<Duration>,
    logon_timeout: Option<Duration>,
    logout_timeout: Option<Duration>,
    test_request_grace: Option<Duration>,
    resend_timeout: Option<Duration>,
    resend_retry_limit: Option<u32>,
    max_message_size: Option<usize>,
    max_buffered_messages: Option<usize>,
}

impl SessionConfigBuilder {
    /// Creates a new builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the sender CompID.
    #[must_use]
    pub fn sender_comp_id(mut self, id: impl Into<String>) -> Self {
        self.sender_comp_id = Some(id.into());
        self
    }

    /// Sets the target CompID.
    #[must_use]
    pub fn target_comp_id(mut self, id: impl Into<String>) -> Self {
        self.target_comp_id = Some(id.into());
        self
    }

    /// Sets the FIX version.
    #[must_use]
    pub fn begin_string(mut self, version: impl Into<String>) -> Self {
        self.begin_string = Some(version.into());
        self
    }

    /// Sets the role.
    #[must_use]
    pub const fn role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }

    /// Sets the heartbeat interval.
    #[must_use]
    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = Some(interval);
        self
    }

    /// Sets the logon timeout.
    #[must_use]
    pub fn logon_timeout(mut self, timeout: Duration) -> Self {
        self.logon_timeout = Some(timeout);
        self
    }

    /// Sets the logout timeout.
    #[must_use]
    pub fn logout_timeout(mut self, timeout: Duration) -> Self {
        self.logout_timeout = Some(timeout);
        self
    }

    /// Sets the TestRequest grace period.
    #[must_use]
    pub fn test_request_grace(mut self, grace: Duration) -> Self {
        self.test_request_grace = Some(grace);
        self
    }

    /// Sets the resend timeout.
    #[must_use]
    pub fn resend_timeout(mut self, timeout: Duration) -> Self {
        self.resend_timeout = Some(timeout);
        self
    }

    /// Sets the resend retry limit.
    #[must_use]
    pub const fn resend_retry_limit(mut self, limit: u32) -> Self {
        self.resend_retry_limit = Some(limit);
        self
    }

    /// Sets the maximum message size.
    #[must_use]
    pub const fn max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = Some(size);
        self
    }

    /// Sets the out-of-order buffer bound.
    #[must_use]
    pub const fn max_buffered_messages(mut self, max: usize) -> Self {
        self.max_buffered_messages = Some(max);
        self
    }

    /// Builds and validates the configuration.
    ///
    /// # Errors
    /// Returns `SessionError::Configuration` if a CompID or the BeginString
    /// is missing or invalid, or if [`SessionConfig::validate`] fails.
    pub fn build(self) -> Result<SessionConfig, SessionError> {
        let sender = parse_comp_id("sender_comp_id", self.sender_comp_id)?;
        let target = parse_comp_id("target_comp_id", self.target_comp_id)?;
        let begin_string = self
            .begin_string
            .ok_or_else(|| config_error("begin_string is required"))?;

        let mut config = SessionConfig::new(sender, target, begin_string).with_role(self.role);

        if let Some(interval) = self.heartbeat_interval {
            config = config.with_heartbeat_interval(interval);
        }
        if let Some(timeout) = self.logon_timeout {
            config.logon_timeout = timeout;
        }
        if let Some(timeout) = self.logout_timeout {
            config.logout_timeout = timeout;
        }
        if let Some(grace) = self.test_request_grace {
            config.test_request_grace = grace;
        }
        if let Some(timeout) = self.resend_timeout {
            config.resend_timeout = timeout;
        }
        if let Some(limit) = self.resend_retry_limit {
            config.resend_retry_limit = limit;
        }
        if let Some(size) = self.max_message_size {
            config.max_message_size = size;
        }
        if let Some(max) = self.max_buffered_messages {
            config.max_buffered_messages = max;
        }

        config.validate()?;
        Ok(config)
    }
}

fn parse_comp_id(name: &str, value: Option<String>) -> Result<CompId, SessionError> {
    let value = value.ok_or_else(|| config_error(format!("{name} is required")))?;
    CompId::new(&value).ok_or_else(|| config_error(format!("{name} {value:?} is not a valid CompID")))
}
