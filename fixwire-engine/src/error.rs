/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Engine error type.

use fixwire_core::error::{FixError, SessionError};
use fixwire_session::SessionFailure;
use thiserror::Error;

/// Errors surfaced by the engine and its session handles.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The session refused an operation.
    #[error(transparent)]
    Fix(#[from] FixError),

    /// The session ended with a fatal failure.
    #[error(transparent)]
    Failure(#[from] SessionFailure),

    /// The session task is gone.
    #[error("session task has stopped")]
    Closed,
}

impl From<SessionError> for EngineError {
    fn from(err: SessionError) -> Self {
        Self::Fix(err.into())
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        Self::Fix(err.into())
    }
}
