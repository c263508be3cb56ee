/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Session handles.
//!
//! A [`SessionHandle`] talks to the session task over a bounded command
//! channel. Handles are cheap to clone; the task keeps running after the
//! last one is dropped and stops when the session ends.

use crate::error::EngineError;
use fixwire_core::field::Field;
use fixwire_core::message::MsgType;
use fixwire_core::types::SessionId;
use fixwire_session::SessionState;
use tokio::sync::{mpsc, oneshot, watch};

/// Requests from handles to the session task.
#[derive(Debug)]
pub(crate) enum Command {
    /// Send an application message.
    Send {
        msg_type: MsgType,
        fields: Vec<Field>,
        reply: oneshot::Sender<Result<(), EngineError>>,
    },
    /// Log out and close the transport.
    Shutdown {
        text: Option<String>,
        reply: oneshot::Sender<()>,
    },
}

/// Cloneable handle to a running session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: SessionId,
    commands: mpsc::Sender<Command>,
    state: watch::Receiver<SessionState>,
}

impl SessionHandle {
    pub(crate) fn new(
        id: SessionId,
        commands: mpsc::Sender<Command>,
        state: watch::Receiver<SessionState>,
    ) -> Self {
        Self {
            id,
            commands,
            state,
        }
    }

    /// Returns the session identity.
    #[must_use]
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Returns the latest state published by the session task.
    #[must_use]
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Returns true while the session task is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.commands.is_closed()
    }

    /// Sends an application message.
    ///
    /// `fields` is the body only; the session adds the standard header and
    /// trailer. Returns once the frame has been written.
    ///
    /// # Errors
    /// - `EngineError::Fix` if the session refuses the message
    /// - `EngineError::Closed` if the session task has stopped
    pub async fn send(&self, msg_type: MsgType, fields: Vec<Field>) -> Result<(), EngineError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Send {
                msg_type,
                fields,
                reply,
            })
            .await
            .map_err(|_| EngineError::Closed)?;
        response.await.map_err(|_| EngineError::Closed)?
    }

    /// Logs out and closes the transport.
    ///
    /// If the session is logged on a Logout goes out first and the task waits
    /// at most the configured logout timeout for the counterparty's reply.
    /// Returns once the Logout has been written, or at once if the task is
    /// already gone.
    pub async fn shutdown(&self, text: Option<&str>) {
        let (reply, done) = oneshot::channel();
        let command = Command::Shutdown {
            text: text.map(str::to_string),
            reply,
        };
        if self.commands.send(command).await.is_ok() {
            let _ = done.await;
        }
    }

    /// Waits until the session is logged on.
    ///
    /// # Errors
    /// Returns `EngineError::Closed` if the task ends first.
    pub async fn wait_logged_on(&self) -> Result<(), EngineError> {
        let mut state = self.state.clone();
        state
            .wait_for(SessionState::is_logged_on)
            .await
            .map(|_| ())
            .map_err(|_| EngineError::Closed)
    }
}
