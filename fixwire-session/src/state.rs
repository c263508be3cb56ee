/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Session states.
//!
//! The state is a runtime value rather than a type parameter: which
//! transition happens depends on bytes that arrive at runtime, and the
//! engine keeps one session value across all of them.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;

/// Observable state of a FIX session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// No session established.
    #[default]
    Disconnected,
    /// Logon sent, awaiting the counterparty's Logon.
    LogonSent,
    /// Logon exchange complete.
    LoggedOn,
    /// Logout sent, awaiting the counterparty's Logout.
    LogoutSent,
}

impl SessionState {
    /// Returns the state name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "Disconnected",
            Self::LogonSent => "LogonSent",
            Self::LoggedOn => "LoggedOn",
            Self::LogoutSent => "LogoutSent",
        }
    }

    /// Returns true if application messages may be exchanged.
    #[must_use]
    pub const fn is_logged_on(&self) -> bool {
        matches!(self, Self::LoggedOn)
    }

    /// Returns true if the Logon/Logout handshake left the session idle.
    #[must_use]
    pub const fn is_disconnected(&self) -> bool {
        matches!(self, Self::Disconnected)
    }

    /// Returns true if moving to `next` is a legal transition.
    #[must_use]
    pub const fn can_transition_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Disconnected, Self::LogonSent)
                | (Self::Disconnected, Self::LoggedOn)
                | (Self::LogonSent, Self::LoggedOn)
                | (Self::LoggedOn, Self::LogoutSent)
                | (_, Self::Disconnected)
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A state together with the moment it was entered.
///
/// The entry time drives the logon and logout timeouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct StateCell {
    pub(crate) state: SessionState,
    pub(crate) since: Instant,
}

impl StateCell {
    pub(crate) fn new(now: Instant) -> Self {
        Self {
            state: SessionState::Disconnected,
            since: now,
        }
    }

    pub(crate) fn enter(&mut self, next: SessionState, now: Instant) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal transition {} -> {}",
            self.state,
            next
        );
        self.state = next;
        self.since = now;
    }
}
