/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! The per-session event loop.
//!
//! One task owns the [`Session`] and the transport. Reads, timer ticks and
//! handle commands are multiplexed with `tokio::select!`, so every input
//! reaches the session in turn and timer work never races message
//! processing.

use crate::application::Application;
use crate::error::EngineError;
use crate::handle::Command;
use bytes::{Bytes, BytesMut};
use fixwire_core::error::{FixError, SessionError};
use fixwire_session::{Reaction, RecommendedAction, Role, Session, SessionFailure, SessionState};
use fixwire_transport::FixCodec;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior, interval};
use tokio_util::codec::Decoder;
use tracing::{debug, error, info, warn};

/// Read buffer starting capacity.
const READ_CAPACITY: usize = 4096;

/// Current time on the runtime clock, which honors paused test time.
fn now() -> std::time::Instant {
    Instant::now().into_std()
}

enum Event {
    Read(std::io::Result<usize>),
    Tick,
    Command(Option<Command>),
}

/// Owns one session and its transport until the session ends.
pub(crate) struct Driver<S, A> {
    session: Session,
    stream: S,
    codec: FixCodec,
    buffer: BytesMut,
    application: Arc<A>,
    commands: mpsc::Receiver<Command>,
    handles_open: bool,
    state: watch::Sender<SessionState>,
    tick: Duration,
    logged_on: bool,
}

impl<S, A> Driver<S, A>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
    A: Application,
{
    pub(crate) fn new(
        session: Session,
        stream: S,
        application: Arc<A>,
        commands: mpsc::Receiver<Command>,
        state: watch::Sender<SessionState>,
        tick: Duration,
    ) -> Self {
        let codec = FixCodec::new().with_max_message_size(session.config().max_message_size);
        Self {
            session,
            stream,
            codec,
            buffer: BytesMut::with_capacity(READ_CAPACITY),
            application,
            commands,
            handles_open: true,
            state,
            tick,
            logged_on: false,
        }
    }

    /// Runs the session to completion.
    ///
    /// Returns `Ok` when the session ends through a Logout exchange, a
    /// logout timeout, or a shutdown before logon.
    pub(crate) async fn run(mut self) -> Result<(), EngineError> {
        let result = self.drive().await;
        if let Err(err) = &result {
            error!(session = %self.session.id(), error = %err, "session ended");
        }
        if let Err(err) = self.stream.shutdown().await {
            debug!(session = %self.session.id(), error = %err, "transport shutdown");
        }
        self.publish();
        result
    }

    async fn drive(&mut self) -> Result<(), EngineError> {
        if self.session.config().role == Role::Initiator {
            let logon = self.session.logon(now())?;
            self.write(&logon).await?;
            self.publish();
        }

        let mut ticker = interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while !self.session.is_terminated() {
            let event = tokio::select! {
                read = self.stream.read_buf(&mut self.buffer) => Event::Read(read),
                _ = ticker.tick() => Event::Tick,
                command = self.commands.recv(), if self.handles_open => Event::Command(command),
            };

            match event {
                Event::Read(Ok(0)) => return self.on_closed().await,
                Event::Read(Ok(_)) => self.on_readable().await?,
                Event::Read(Err(err)) => return Err(self.transport_failure(err.into()).await),
                Event::Tick => {
                    let outcome = self.session.on_timer(now());
                    self.settle(outcome).await?;
                }
                Event::Command(Some(command)) => self.on_command(command).await?,
                Event::Command(None) => {
                    debug!(session = %self.session.id(), "all handles dropped");
                    self.handles_open = false;
                }
            }
        }

        if self.logged_on {
            self.logged_on = false;
            self.application.on_logout(self.session.id()).await;
        }
        info!(session = %self.session.id(), "session finished");
        Ok(())
    }

    async fn on_readable(&mut self) -> Result<(), EngineError> {
        while !self.session.is_terminated() {
            let frame = match self.codec.decode(&mut self.buffer) {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(err) => return Err(self.transport_failure(err.into()).await),
            };
            let outcome = self.session.on_message(frame, now());
            self.settle(outcome).await?;
        }
        Ok(())
    }

    async fn on_closed(&mut self) -> Result<(), EngineError> {
        let state = self.session.state();
        let error = SessionError::Connection(format!("peer closed the connection in {state}"));
        Err(self.transport_failure(error.into()).await)
    }

    async fn on_command(&mut self, command: Command) -> Result<(), EngineError> {
        match command {
            Command::Send {
                msg_type,
                fields,
                reply,
            } => match self.session.send(&msg_type, &fields, now()) {
                Ok(frame) => match self.write(&frame).await {
                    Ok(()) => {
                        let _ = reply.send(Ok(()));
                        Ok(())
                    }
                    Err(err) => {
                        let _ = reply.send(Err(EngineError::Closed));
                        Err(err)
                    }
                },
                Err(err) => {
                    debug!(session = %self.session.id(), error = %err, "send refused");
                    let _ = reply.send(Err(err.into()));
                    Ok(())
                }
            },
            Command::Shutdown { text, reply } => {
                if self.session.state().is_logged_on() {
                    let logout = self.session.logout(text.as_deref(), now())?;
                    self.write(&logout).await?;
                } else {
                    info!(session = %self.session.id(), state = %self.session.state(), "shutdown before logon");
                    self.session.disconnect(now());
                }
                self.publish();
                let _ = reply.send(());
                Ok(())
            }
        }
    }

    /// Writes a reaction out and runs the application hooks it calls for.
    async fn settle(
        &mut self,
        outcome: Result<Reaction, SessionFailure>,
    ) -> Result<(), EngineError> {
        let reaction = match outcome {
            Ok(reaction) => reaction,
            Err(failure) => return Err(self.report_fatal(failure).await),
        };

        for frame in &reaction.outbound {
            self.write(frame).await?;
        }
        self.publish();

        let id = self.session.id().clone();
        if !self.logged_on && self.session.state().is_logged_on() {
            self.logged_on = true;
            self.application.on_logon(&id).await;
        }
        for failure in &reaction.reported {
            warn!(session = %id, error = %failure, "session failure");
            self.application.on_failure(failure, &id).await;
        }
        for message in &reaction.delivered {
            self.application.from_app(message, &id).await;
        }
        Ok(())
    }

    async fn report_fatal(&mut self, failure: SessionFailure) -> EngineError {
        let id = self.session.id().clone();
        self.publish();
        self.application.on_failure(&failure, &id).await;
        if self.logged_on {
            self.logged_on = false;
            self.application.on_logout(&id).await;
        }
        failure.into()
    }

    /// Ends the session after the transport broke or sent unframeable bytes.
    async fn transport_failure(&mut self, error: FixError) -> EngineError {
        self.session.disconnect(now());
        let failure = SessionFailure {
            error,
            action: RecommendedAction::Disconnect,
        };
        self.report_fatal(failure).await
    }

    async fn write(&mut self, frame: &Bytes) -> Result<(), EngineError> {
        let written = match self.stream.write_all(frame).await {
            Ok(()) => self.stream.flush().await,
            Err(err) => Err(err),
        };
        match written {
            Ok(()) => Ok(()),
            Err(err) => Err(self.transport_failure(err.into()).await),
        }
    }

    fn publish(&self) {
        self.state.send_replace(self.session.state());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::EngineBuilder;
    use async_trait::async_trait;
    use fixwire_core::field::{Field, tags};
    use fixwire_core::message::{Message, MsgType};
    use fixwire_core::types::{CompId, SessionId};
    use fixwire_session::SessionConfig;
    use fixwire_store::{MemoryStore, MessageStore};
    use parking_lot::Mutex;
    use tokio::io::{DuplexStream, duplex};

    #[derive(Debug, Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl Recorder {
        fn events(&self) -> Vec<String> {
            self.events.lock().clone()
        }
    }

    #[async_trait]
    impl Application for Recorder {
        async fn on_logon(&self, _session_id: &SessionId) {
            self.events.lock().push("logon".to_string());
        }

        async fn on_logout(&self, _session_id: &SessionId) {
            self.events.lock().push("logout".to_string());
        }

        async fn from_app(&self, message: &Message, _session_id: &SessionId) {
            let symbol = message.get_str(tags::SYMBOL).unwrap_or_default();
            self.events.lock().push(format!("app:{symbol}"));
        }

        async fn on_failure(&self, failure: &SessionFailure, _session_id: &SessionId) {
            self.events.lock().push(format!("failure:{}", failure.action));
        }
    }

    fn config(sender: &str, target: &str) -> SessionConfig {
        SessionConfig::new(
            CompId::new(sender).unwrap(),
            CompId::new(target).unwrap(),
            "FIX.4.2",
        )
    }

    fn order() -> Vec<Field> {
        vec![
            Field::string(tags::CL_ORD_ID, "ORD1"),
            Field::string(tags::SYMBOL, "AAPL"),
            Field::string(tags::SIDE, "1"),
            Field::uint(tags::ORDER_QTY, 100),
            Field::string(tags::PRICE, "150.50"),
            Field::string(tags::ORD_TYPE, "2"),
        ]
    }

    /// Plays the acceptor side by hand until the Logon reply is written.
    async fn answer_logon(mut io: DuplexStream) -> DuplexStream {
        let store: Arc<dyn MessageStore> = Arc::new(MemoryStore::new());
        let mut peer = Session::new(config("SERVER", "CLIENT").with_role(Role::Acceptor), store)
            .unwrap();
        let mut codec = FixCodec::new();
        let mut buf = BytesMut::new();
        loop {
            assert!(io.read_buf(&mut buf).await.unwrap() > 0);
            if let Some(frame) = codec.decode(&mut buf).unwrap() {
                let reaction = peer.on_message(frame, now()).unwrap();
                for out in reaction.outbound {
                    io.write_all(&out).await.unwrap();
                }
                return io;
            }
        }
    }

    #[tokio::test]
    async fn test_logon_order_logout() {
        let (client_io, server_io) = duplex(64 * 1024);
        let server_app = Arc::new(Recorder::default());
        let client_app = Arc::new(Recorder::default());

        let (server, server_task) = EngineBuilder::new(config("SERVER", "CLIENT"))
            .with_shared_application(Arc::clone(&server_app))
            .accept(server_io)
            .unwrap();
        let (client, client_task) = EngineBuilder::new(config("CLIENT", "SERVER"))
            .with_shared_application(Arc::clone(&client_app))
            .initiate(client_io)
            .unwrap();

        client.wait_logged_on().await.unwrap();
        server.wait_logged_on().await.unwrap();

        client.send(MsgType::NewOrderSingle, order()).await.unwrap();
        client.shutdown(Some("done")).await;

        client_task.await.unwrap().unwrap();
        server_task.await.unwrap().unwrap();

        assert_eq!(server_app.events(), vec!["logon", "app:AAPL", "logout"]);
        assert_eq!(client_app.events(), vec!["logon", "logout"]);
        assert_eq!(client.state(), SessionState::Disconnected);
        assert!(!client.is_running());
        assert!(matches!(
            client.send(MsgType::NewOrderSingle, order()).await,
            Err(EngineError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_send_before_logon_is_refused() {
        let (server_io, _client_io) = duplex(1024);
        let (server, task) = EngineBuilder::new(config("SERVER", "CLIENT"))
            .accept(server_io)
            .unwrap();

        let result = server.send(MsgType::NewOrderSingle, order()).await;
        assert!(matches!(
            result,
            Err(EngineError::Fix(FixError::Session(SessionError::InvalidState { .. })))
        ));

        server.shutdown(None).await;
        task.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_logon_timeout() {
        let (client_io, _silent) = duplex(1024);
        let app = Arc::new(Recorder::default());
        let (_client, task) = EngineBuilder::new(config("CLIENT", "SERVER"))
            .with_shared_application(Arc::clone(&app))
            .initiate(client_io)
            .unwrap();

        let result = task.await.unwrap();
        let Err(EngineError::Failure(failure)) = result else {
            panic!("expected a session failure");
        };
        assert!(matches!(
            failure.error,
            FixError::Session(SessionError::LogonTimeout { .. })
        ));
        assert_eq!(app.events(), vec!["failure:disconnect"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_timeout_after_silence() {
        let (client_io, server_io) = duplex(64 * 1024);
        let app = Arc::new(Recorder::default());
        let (client, task) = EngineBuilder::new(config("CLIENT", "SERVER"))
            .with_shared_application(Arc::clone(&app))
            .initiate(client_io)
            .unwrap();

        let _peer = answer_logon(server_io).await;
        client.wait_logged_on().await.unwrap();

        let result = task.await.unwrap();
        let Err(EngineError::Failure(failure)) = result else {
            panic!("expected a session failure");
        };
        assert!(matches!(
            failure.error,
            FixError::Session(SessionError::HeartbeatTimeout { .. })
        ));
        assert_eq!(app.events(), vec!["logon", "failure:disconnect", "logout"]);
    }

    #[tokio::test]
    async fn test_unframeable_bytes_end_session() {
        let (server_io, mut client_io) = duplex(1024);
        let app = Arc::new(Recorder::default());
        let (_server, task) = EngineBuilder::new(config("SERVER", "CLIENT"))
            .with_shared_application(Arc::clone(&app))
            .accept(server_io)
            .unwrap();

        client_io.write_all(b"garbage\x01").await.unwrap();

        let result = task.await.unwrap();
        let Err(EngineError::Failure(failure)) = result else {
            panic!("expected a session failure");
        };
        assert!(failure.is_fatal());
        assert!(matches!(failure.error, FixError::Decode(_)));
        assert_eq!(app.events(), vec!["failure:disconnect"]);
    }

    #[tokio::test]
    async fn test_peer_hangup_reports_connection_error() {
        let (server_io, client_io) = duplex(1024);
        let (_server, task) = EngineBuilder::new(config("SERVER", "CLIENT"))
            .accept(server_io)
            .unwrap();

        drop(client_io);

        let result = task.await.unwrap();
        let Err(EngineError::Failure(failure)) = result else {
            panic!("expected a session failure");
        };
        assert!(matches!(
            failure.error,
            FixError::Session(SessionError::Connection(_))
        ));
    }
}
