/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! The session state machine.
//!
//! A [`Session`] consumes complete inbound frames and timer ticks and answers
//! with a [`Reaction`]: the frames to write, the application messages to
//! deliver, and any non-fatal failures worth reporting. Fatal failures come
//! back as `Err(SessionFailure)` and leave the session terminated.
//!
//! The session never reads a clock for its timeouts; every entry point takes
//! the current `Instant`, so the caller decides how time advances.

use crate::config::{MAX_HEARTBEAT_SECS, Role, SessionConfig};
use crate::heartbeat::{HeartbeatMonitor, Liveness};
use crate::recovery::{Buffered, GapRecovery, RetryDecision};
use crate::sequence::{SequenceOutcome, SequenceTracker};
use crate::state::{SessionState, StateCell};
use bytes::Bytes;
use fixwire_core::error::{DecodeError, EncodeError, FixError, SequenceError, SessionError};
use fixwire_core::field::{Field, tags};
use fixwire_core::message::{Message, MessageBuilder, MsgType};
use fixwire_core::types::{Direction, SeqNum, SessionId, Timestamp};
use fixwire_store::MessageStore;
use fixwire_tagvalue::{Decoder, decode, encode_message};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Header and trailer tags the session fills in itself.
const SESSION_TAGS: [u32; 10] = [
    tags::BEGIN_STRING,
    tags::BODY_LENGTH,
    tags::CHECKSUM,
    tags::MSG_SEQ_NUM,
    tags::MSG_TYPE,
    tags::POSS_DUP_FLAG,
    tags::SENDER_COMP_ID,
    tags::SENDING_TIME,
    tags::TARGET_COMP_ID,
    tags::ORIG_SENDING_TIME,
];

/// What the caller should do about a reported failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecommendedAction {
    /// Nothing; the offending message was discarded.
    Ignore,
    /// A ResendRequest for this range was issued.
    ResendRequest {
        /// First missing sequence number.
        begin: SeqNum,
        /// Last missing sequence number.
        end: SeqNum,
    },
    /// Tear the transport down; the session is terminated.
    Disconnect,
}

impl fmt::Display for RecommendedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ignore => f.write_str("ignore"),
            Self::ResendRequest { begin, end } => write!(f, "resend request {begin}..={end}"),
            Self::Disconnect => f.write_str("disconnect"),
        }
    }
}

/// A session-level failure and the action that goes with it.
#[derive(Debug, Error)]
#[error("{error} (recommended action: {action})")]
pub struct SessionFailure {
    /// What went wrong.
    #[source]
    pub error: FixError,
    /// What the caller should do about it.
    pub action: RecommendedAction,
}

impl SessionFailure {
    fn ignore(error: impl Into<FixError>) -> Self {
        Self {
            error: error.into(),
            action: RecommendedAction::Ignore,
        }
    }

    /// Returns true if the session did not survive this failure.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self.action, RecommendedAction::Disconnect)
    }
}

/// Everything a single input made the session do.
#[derive(Debug, Default)]
pub struct Reaction {
    /// Encoded frames to write to the transport, in order.
    pub outbound: Vec<Bytes>,
    /// Application messages to hand to the application, in sequence order.
    pub delivered: Vec<Message>,
    /// Non-fatal failures, already handled.
    pub reported: Vec<SessionFailure>,
}

impl Reaction {
    /// Returns true if the input had no visible effect.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.outbound.is_empty() && self.delivered.is_empty() && self.reported.is_empty()
    }
}

/// One FIX session between a local and a remote CompID.
///
/// A session is single-use: once it leaves the handshake for `Disconnected`
/// it is terminated, and a new `Session` over the same store is needed to
/// log on again.
pub struct Session {
    config: SessionConfig,
    id: SessionId,
    store: Arc<dyn MessageStore>,
    sequences: SequenceTracker,
    heartbeat: HeartbeatMonitor,
    recovery: GapRecovery,
    cell: StateCell,
    terminated: bool,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("state", &self.cell.state)
            .field("sequences", &self.sequences)
            .field("terminated", &self.terminated)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Creates a session that continues the sequence numbers in `store`.
    ///
    /// # Errors
    /// Returns `SessionError::Configuration` if the config does not validate.
    pub fn new(config: SessionConfig, store: Arc<dyn MessageStore>) -> Result<Self, SessionError> {
        config.validate()?;

        let now = Instant::now();
        let id = config.session_id();
        let sequences = SequenceTracker::resume(store.as_ref());
        info!(
            session = %id,
            next_outgoing = %sequences.peek_outgoing(),
            expected_incoming = %sequences.expected_incoming(),
            "session created"
        );

        Ok(Self {
            heartbeat: HeartbeatMonitor::new(
                config.heartbeat_interval,
                config.test_request_grace,
                now,
            ),
            recovery: GapRecovery::new(config.max_buffered_messages),
            cell: StateCell::new(now),
            terminated: false,
            config,
            id,
            store,
            sequences,
        })
    }

    /// Returns the session identity.
    #[must_use]
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.cell.state
    }

    /// Returns true once the session has ended and cannot be reused.
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// Returns the sequence number the next outbound message will carry.
    #[must_use]
    pub fn next_outgoing(&self) -> SeqNum {
        self.sequences.peek_outgoing()
    }

    /// Returns the sequence number expected from the counterparty next.
    #[must_use]
    pub fn expected_incoming(&self) -> SeqNum {
        self.sequences.expected_incoming()
    }

    /// Returns the heartbeat interval in force.
    ///
    /// For an acceptor this is the counterparty's HeartBtInt once logged on.
    #[must_use]
    pub fn heartbeat_interval(&self) -> Duration {
        self.heartbeat.interval()
    }

    /// Sends the opening Logon and enters `LogonSent`.
    ///
    /// # Errors
    /// Returns `SessionError::InvalidState` unless this is an initiator in
    /// `Disconnected` that has not been terminated.
    pub fn logon(&mut self, now: Instant) -> Result<Bytes, FixError> {
        self.ensure_open()?;
        if self.config.role != Role::Initiator {
            return Err(SessionError::InvalidState {
                expected: "initiator".to_string(),
                current: "acceptor".to_string(),
            }
            .into());
        }
        self.ensure_state(SessionState::Disconnected)?;

        let heartbeat = self.config.heartbeat_interval_secs();
        let bytes = self.emit(
            &MsgType::Logon,
            &[
                Field::uint(tags::ENCRYPT_METHOD, 0),
                Field::uint(tags::HEART_BT_INT, heartbeat),
            ],
            now,
        )?;
        self.cell.enter(SessionState::LogonSent, now);
        info!(session = %self.id, heartbeat_secs = heartbeat, "logon sent");
        Ok(bytes)
    }

    /// Sends an application message.
    ///
    /// `fields` is the body only; the session adds the standard header.
    ///
    /// # Errors
    /// - `SessionError::InvalidState` unless logged on
    /// - `EncodeError` for administrative types, header tags in `fields`,
    ///   or values the codec rejects
    pub fn send(
        &mut self,
        msg_type: &MsgType,
        fields: &[Field],
        now: Instant,
    ) -> Result<Bytes, FixError> {
        self.ensure_open()?;
        self.ensure_state(SessionState::LoggedOn)?;
        if msg_type.is_admin() {
            return Err(EncodeError::InvalidFieldValue {
                tag: tags::MSG_TYPE,
                reason: format!("administrative type {msg_type} is sent by the session"),
            }
            .into());
        }
        if let Some(field) = fields.iter().find(|f| SESSION_TAGS.contains(&f.tag)) {
            return Err(EncodeError::ReservedTag { tag: field.tag }.into());
        }
        self.emit(msg_type, fields, now)
    }

    /// Sends Logout and enters `LogoutSent`.
    ///
    /// # Errors
    /// Returns `SessionError::InvalidState` unless logged on.
    pub fn logout(&mut self, text: Option<&str>, now: Instant) -> Result<Bytes, FixError> {
        self.ensure_open()?;
        self.ensure_state(SessionState::LoggedOn)?;

        let body: Vec<Field> = text
            .map(|text| Field::string(tags::TEXT, text))
            .into_iter()
            .collect();
        let bytes = self.emit(&MsgType::Logout, &body, now)?;
        self.cell.enter(SessionState::LogoutSent, now);
        info!(session = %self.id, "logout sent");
        Ok(bytes)
    }

    /// Marks the transport as gone. The session is terminated.
    pub fn disconnect(&mut self, now: Instant) {
        if !self.terminated {
            warn!(session = %self.id, state = %self.cell.state, "transport closed");
            self.terminate(now);
        }
    }

    /// Processes one complete inbound frame.
    ///
    /// # Errors
    /// Returns a fatal [`SessionFailure`] (action `Disconnect`) on decode
    /// errors, CompID mismatches, rejected logons, unexpected message types
    /// and invalid sequence resets. The session is terminated afterwards.
    pub fn on_message(&mut self, frame: Bytes, now: Instant) -> Result<Reaction, SessionFailure> {
        let mut reaction = Reaction::default();
        match self.process(frame, now, &mut reaction) {
            Ok(()) => Ok(reaction),
            Err(error) => Err(self.fail(error, now)),
        }
    }

    /// Drives timeouts, heartbeats, TestRequests and resend retries.
    ///
    /// # Errors
    /// Returns a fatal [`SessionFailure`] on logon timeout, heartbeat
    /// timeout, or when a gap stays open past the retry limit.
    pub fn on_timer(&mut self, now: Instant) -> Result<Reaction, SessionFailure> {
        let mut reaction = Reaction::default();
        match self.tick(now, &mut reaction) {
            Ok(()) => Ok(reaction),
            Err(error) => Err(self.fail(error, now)),
        }
    }

    fn process(&mut self, frame: Bytes, now: Instant, reaction: &mut Reaction) -> Result<(), FixError> {
        self.ensure_open()?;

        let message = Decoder::new(frame.clone())
            .with_begin_string(&self.config.begin_string)
            .decode()?;
        self.heartbeat.on_received(now);
        self.check_comp_ids(&message)?;

        let seq = message
            .seq_num()
            .filter(|seq| seq.is_valid())
            .ok_or_else(|| DecodeError::malformed(tags::MSG_SEQ_NUM, "missing or out of range"))?;
        let msg_type = message.msg_type();
        debug!(session = %self.id, seq = %seq, msg_type = %msg_type, "received");

        if matches!(
            self.cell.state,
            SessionState::Disconnected | SessionState::LogonSent
        ) {
            return self.on_logon_phase(seq, Buffered { message, raw: frame }, now, reaction);
        }

        if msg_type == MsgType::SequenceReset && !message.get_bool(tags::GAP_FILL_FLAG).unwrap_or(false) {
            self.apply_sequence_reset(&message)?;
            return self.drain(now, reaction);
        }

        match self.sequences.observe_incoming(seq) {
            SequenceOutcome::InOrder => {
                self.accept(seq, Buffered { message, raw: frame }, false, now, reaction)?;
                self.drain(now, reaction)
            }
            SequenceOutcome::Duplicate { expected, received } => {
                warn!(
                    session = %self.id,
                    expected,
                    received,
                    poss_dup = message.is_poss_dup(),
                    "duplicate sequence number discarded"
                );
                reaction
                    .reported
                    .push(SessionFailure::ignore(SequenceError::Duplicate { expected, received }));
                Ok(())
            }
            SequenceOutcome::Gap { expected, received } => {
                self.recovery.park(seq, Buffered { message, raw: frame })?;
                if self.recovery.is_requesting() {
                    debug!(
                        session = %self.id,
                        seq = %seq,
                        buffered = self.recovery.buffered_len(),
                        "parked behind outstanding resend"
                    );
                    Ok(())
                } else {
                    self.request_resend(
                        SeqNum::new(expected),
                        SeqNum::new(received - 1),
                        now,
                        reaction,
                    )
                }
            }
        }
    }

    fn on_logon_phase(
        &mut self,
        seq: SeqNum,
        entry: Buffered,
        now: Instant,
        reaction: &mut Reaction,
    ) -> Result<(), FixError> {
        let msg_type = entry.message.msg_type();
        match (self.cell.state, &msg_type) {
            (SessionState::LogonSent, MsgType::Logout) => {
                let reason = entry
                    .message
                    .get_str(tags::TEXT)
                    .unwrap_or("logout in reply to logon")
                    .to_string();
                return Err(SessionError::LogonRejected { reason }.into());
            }
            (SessionState::LogonSent, MsgType::Logon) => {}
            (SessionState::Disconnected, MsgType::Logon) if self.config.role == Role::Acceptor => {}
            (state, _) => return Err(unexpected(&msg_type, state)),
        }

        let interval = self.agree_heartbeat(&entry.message)?;
        let outcome = self.sequences.observe_incoming(seq);
        if let SequenceOutcome::Duplicate { expected, received } = outcome {
            return Err(SessionError::LogonRejected {
                reason: format!("MsgSeqNum {received} below expected {expected}"),
            }
            .into());
        }

        self.establish(interval, now, reaction)?;
        match outcome {
            SequenceOutcome::Gap { expected, received } => {
                self.recovery.park(seq, entry)?;
                self.request_resend(SeqNum::new(expected), SeqNum::new(received - 1), now, reaction)
            }
            _ => {
                self.store.append(Direction::Inbound, seq, &entry.raw)?;
                Ok(())
            }
        }
    }

    fn agree_heartbeat(&self, logon: &Message) -> Result<Duration, FixError> {
        let declared = logon
            .get_u64(tags::HEART_BT_INT)
            .ok_or_else(|| SessionError::LogonRejected {
                reason: "HeartBtInt (108) missing".to_string(),
            })?;

        let ours = self.config.heartbeat_interval_secs();
        let reason = match self.config.role {
            Role::Initiator if declared != ours => {
                format!("HeartBtInt {declared} does not match configured {ours}")
            }
            Role::Acceptor if declared == 0 || declared > MAX_HEARTBEAT_SECS => {
                format!("HeartBtInt {declared} outside 1..={MAX_HEARTBEAT_SECS}")
            }
            _ => return Ok(Duration::from_secs(declared)),
        };
        Err(SessionError::LogonRejected { reason }.into())
    }

    fn establish(
        &mut self,
        interval: Duration,
        now: Instant,
        reaction: &mut Reaction,
    ) -> Result<(), FixError> {
        if self.config.role == Role::Acceptor {
            let reply = self.emit(
                &MsgType::Logon,
                &[
                    Field::uint(tags::ENCRYPT_METHOD, 0),
                    Field::uint(tags::HEART_BT_INT, interval.as_secs()),
                ],
                now,
            )?;
            reaction.outbound.push(reply);
        }

        self.heartbeat.reset(interval, now);
        self.cell.enter(SessionState::LoggedOn, now);
        info!(
            session = %self.id,
            heartbeat_secs = interval.as_secs(),
            expected_incoming = %self.sequences.expected_incoming(),
            "logged on"
        );
        Ok(())
    }

    fn accept(
        &mut self,
        seq: SeqNum,
        entry: Buffered,
        replaying: bool,
        now: Instant,
        reaction: &mut Reaction,
    ) -> Result<(), FixError> {
        self.store.append(Direction::Inbound, seq, &entry.raw)?;
        self.dispatch(entry.message, replaying, now, reaction)
    }

    /// Replays parked messages that are now in order and opens a new
    /// resend for any hole left behind them.
    fn drain(&mut self, now: Instant, reaction: &mut Reaction) -> Result<(), FixError> {
        while !self.terminated {
            let expected = self.sequences.expected_incoming();
            let Some(entry) = self.recovery.take_ready(expected) else {
                break;
            };
            let outcome = self.sequences.observe_incoming(expected);
            debug_assert!(outcome.is_in_order());
            debug!(session = %self.id, seq = %expected, "replaying parked message");
            self.accept(expected, entry, true, now, reaction)?;
        }
        if self.terminated {
            return Ok(());
        }

        let expected = self.sequences.expected_incoming();
        if self.recovery.on_advanced(expected) {
            info!(session = %self.id, expected = %expected, "sequence gap filled");
        }
        if !self.recovery.is_requesting()
            && let Some(first) = self.recovery.first_buffered()
            && first > expected
        {
            self.request_resend(expected, SeqNum::new(first.value() - 1), now, reaction)?;
        }
        Ok(())
    }

    fn dispatch(
        &mut self,
        message: Message,
        replaying: bool,
        now: Instant,
        reaction: &mut Reaction,
    ) -> Result<(), FixError> {
        let msg_type = message.msg_type();
        match msg_type {
            MsgType::Heartbeat => {
                if self.heartbeat.on_heartbeat(message.get_str(tags::TEST_REQ_ID)) {
                    debug!(session = %self.id, "test request answered");
                }
            }
            MsgType::TestRequest => {
                let echo: Vec<Field> = message.get(tags::TEST_REQ_ID).cloned().into_iter().collect();
                if echo.is_empty() {
                    warn!(session = %self.id, "test request without TestReqID");
                }
                let reply = self.emit(&MsgType::Heartbeat, &echo, now)?;
                reaction.outbound.push(reply);
            }
            MsgType::ResendRequest => self.serve_resend(&message, now, reaction)?,
            MsgType::SequenceReset => self.apply_sequence_reset(&message)?,
            MsgType::Logout => self.on_logout(&message, now, reaction)?,
            MsgType::Logon if replaying => {
                debug!(session = %self.id, "parked logon replayed");
            }
            MsgType::Logon => return Err(unexpected(&msg_type, self.cell.state)),
            MsgType::Reject => {
                warn!(
                    session = %self.id,
                    ref_seq = ?message.get_u64(tags::REF_SEQ_NUM),
                    text = ?message.get_str(tags::TEXT),
                    "session-level reject received"
                );
                reaction.delivered.push(message);
            }
            _ => reaction.delivered.push(message),
        }
        Ok(())
    }

    fn apply_sequence_reset(&mut self, message: &Message) -> Result<(), FixError> {
        let new_seq = message
            .get_u64(tags::NEW_SEQ_NO)
            .ok_or_else(|| DecodeError::malformed(tags::NEW_SEQ_NO, "SequenceReset without NewSeqNo"))?;
        let expected = self.sequences.expected_incoming();
        if !self.sequences.advance_incoming_to(SeqNum::new(new_seq)) {
            return Err(SessionError::InvalidSequenceReset {
                expected: expected.value(),
                new_seq,
            }
            .into());
        }

        self.store.set_next_seq(Direction::Inbound, SeqNum::new(new_seq));
        info!(
            session = %self.id,
            from = %expected,
            to = new_seq,
            gap_fill = message.get_bool(tags::GAP_FILL_FLAG).unwrap_or(false),
            "sequence reset applied"
        );
        Ok(())
    }

    fn on_logout(
        &mut self,
        message: &Message,
        now: Instant,
        reaction: &mut Reaction,
    ) -> Result<(), FixError> {
        if self.cell.state == SessionState::LogoutSent {
            info!(session = %self.id, "logout confirmed");
        } else {
            info!(
                session = %self.id,
                text = ?message.get_str(tags::TEXT),
                "logout received, confirming"
            );
            let reply = self.emit(&MsgType::Logout, &[], now)?;
            reaction.outbound.push(reply);
        }
        self.terminate(now);
        Ok(())
    }

    /// Answers a ResendRequest from the outbound store.
    ///
    /// Application messages go out again under their original numbers with
    /// PossDupFlag set; administrative messages and store holes collapse into
    /// SequenceReset-GapFill messages.
    fn serve_resend(
        &mut self,
        request: &Message,
        now: Instant,
        reaction: &mut Reaction,
    ) -> Result<(), FixError> {
        let begin = request
            .get_u64(tags::BEGIN_SEQ_NO)
            .ok_or_else(|| DecodeError::malformed(tags::BEGIN_SEQ_NO, "ResendRequest without BeginSeqNo"))?
            .max(1);
        let requested_end = request
            .get_u64(tags::END_SEQ_NO)
            .ok_or_else(|| DecodeError::malformed(tags::END_SEQ_NO, "ResendRequest without EndSeqNo"))?;

        let last_sent = self.sequences.peek_outgoing().value().saturating_sub(1);
        let end = if requested_end == 0 {
            last_sent
        } else {
            requested_end.min(last_sent)
        };
        if begin > end {
            warn!(session = %self.id, begin, requested_end, last_sent, "resend request for nothing");
            return Ok(());
        }
        info!(session = %self.id, begin, end, "serving resend request");

        let stored = self
            .store
            .range(Direction::Outbound, SeqNum::new(begin), SeqNum::new(end))?;

        let mut fill_from: Option<u64> = None;
        let mut cursor = begin;
        for (seq, raw) in stored {
            if seq.value() > cursor {
                fill_from.get_or_insert(cursor);
            }
            match self.resendable(seq, &raw) {
                Some(original) => {
                    if let Some(from) = fill_from.take() {
                        reaction.outbound.push(self.gap_fill(from, seq.value())?);
                    }
                    reaction.outbound.push(possible_duplicate(original)?);
                }
                None => {
                    fill_from.get_or_insert(seq.value());
                }
            }
            cursor = seq.value() + 1;
        }
        if cursor <= end {
            fill_from.get_or_insert(cursor);
        }
        if let Some(from) = fill_from {
            reaction.outbound.push(self.gap_fill(from, end + 1)?);
        }

        self.heartbeat.on_sent(now);
        Ok(())
    }

    fn resendable(&self, seq: SeqNum, raw: &[u8]) -> Option<Message> {
        match decode(raw, &self.config.begin_string) {
            Ok(original) if original.msg_type().is_app() => Some(original),
            Ok(_) => None,
            Err(err) => {
                warn!(session = %self.id, seq = %seq, error = %err, "stored message unreadable, gap filling");
                None
            }
        }
    }

    fn gap_fill(&self, from: u64, new_seq: u64) -> Result<Bytes, FixError> {
        let sending_time = Timestamp::now();
        let message = self
            .header(&MsgType::SequenceReset, SeqNum::new(from), sending_time)
            .field_bool(tags::POSS_DUP_FLAG, true)
            .push(Field::timestamp(tags::ORIG_SENDING_TIME, sending_time))
            .field_bool(tags::GAP_FILL_FLAG, true)
            .field_u64(tags::NEW_SEQ_NO, new_seq)
            .build();
        debug!(session = %self.id, from, new_seq, "gap fill");
        Ok(encode_message(&message)?)
    }

    fn request_resend(
        &mut self,
        begin: SeqNum,
        end: SeqNum,
        now: Instant,
        reaction: &mut Reaction,
    ) -> Result<(), FixError> {
        let request = self.emit(
            &MsgType::ResendRequest,
            &[
                Field::uint(tags::BEGIN_SEQ_NO, begin.value()),
                Field::uint(tags::END_SEQ_NO, end.value()),
            ],
            now,
        )?;
        reaction.outbound.push(request);
        self.recovery.start(begin, end, now);

        warn!(session = %self.id, begin = %begin, end = %end, "sequence gap, resend requested");
        reaction.reported.push(SessionFailure {
            error: SequenceError::Gap {
                expected: begin.value(),
                received: end.value() + 1,
            }
            .into(),
            action: RecommendedAction::ResendRequest { begin, end },
        });
        Ok(())
    }

    fn tick(&mut self, now: Instant, reaction: &mut Reaction) -> Result<(), FixError> {
        if self.terminated {
            return Ok(());
        }

        let in_state = now.saturating_duration_since(self.cell.since);
        match self.cell.state {
            SessionState::Disconnected => Ok(()),
            SessionState::LogonSent if in_state >= self.config.logon_timeout => {
                Err(SessionError::LogonTimeout {
                    elapsed_ms: millis(in_state),
                }
                .into())
            }
            SessionState::LogonSent => Ok(()),
            SessionState::LogoutSent => {
                if in_state >= self.config.logout_timeout {
                    warn!(session = %self.id, "no logout confirmation, closing");
                    self.terminate(now);
                }
                Ok(())
            }
            SessionState::LoggedOn => {
                self.keep_alive(now, reaction)?;
                self.retry_resend(now, reaction)
            }
        }
    }

    fn keep_alive(&mut self, now: Instant, reaction: &mut Reaction) -> Result<(), FixError> {
        match self.heartbeat.poll(now) {
            Some(Liveness::TimedOut(waited)) => {
                warn!(
                    session = %self.id,
                    test_req_id = self.heartbeat.pending_test_request().unwrap_or_default(),
                    "test request unanswered"
                );
                return Err(SessionError::HeartbeatTimeout {
                    elapsed_ms: millis(waited),
                }
                .into());
            }
            Some(Liveness::SendTestRequest(id)) => {
                info!(
                    session = %self.id,
                    test_req_id = %id,
                    silent_ms = millis(self.heartbeat.time_since_last_received(now)),
                    "inbound traffic stopped, sending test request"
                );
                let request = self.emit(
                    &MsgType::TestRequest,
                    &[Field::string(tags::TEST_REQ_ID, &id)],
                    now,
                )?;
                reaction.outbound.push(request);
            }
            Some(Liveness::SendHeartbeat) => {
                let heartbeat = self.emit(&MsgType::Heartbeat, &[], now)?;
                reaction.outbound.push(heartbeat);
            }
            None => {}
        }
        Ok(())
    }

    fn retry_resend(&mut self, now: Instant, reaction: &mut Reaction) -> Result<(), FixError> {
        let decision = self.recovery.poll_retry(
            now,
            self.sequences.expected_incoming(),
            self.config.resend_timeout,
            self.config.resend_retry_limit,
        );
        match decision {
            Some(RetryDecision::Reissue { begin, end }) => {
                let attempt = self.recovery.pending().map_or(0, |range| range.attempts);
                warn!(
                    session = %self.id,
                    begin = %begin,
                    end = %end,
                    attempt,
                    "resend unanswered, asking again"
                );
                let request = self.emit(
                    &MsgType::ResendRequest,
                    &[
                        Field::uint(tags::BEGIN_SEQ_NO, begin.value()),
                        Field::uint(tags::END_SEQ_NO, end.value()),
                    ],
                    now,
                )?;
                reaction.outbound.push(request);
                Ok(())
            }
            Some(RetryDecision::Exhausted(err)) => Err(err.into()),
            None => Ok(()),
        }
    }

    /// Encodes, stores and counts one outbound message.
    ///
    /// The sequence number is only consumed once the message is encoded and
    /// stored, so a rejected message leaves no hole.
    fn emit(&mut self, msg_type: &MsgType, body: &[Field], now: Instant) -> Result<Bytes, FixError> {
        let seq = self.sequences.peek_outgoing();
        let mut builder = self.header(msg_type, seq, Timestamp::now());
        for field in body {
            builder = builder.push(field.clone());
        }
        let bytes = encode_message(&builder.build())?;

        self.store.append(Direction::Outbound, seq, &bytes)?;
        let allocated = self.sequences.next_outgoing();
        debug_assert_eq!(allocated, seq);
        self.heartbeat.on_sent(now);

        debug!(session = %self.id, seq = %seq, msg_type = %msg_type, "sent");
        Ok(bytes)
    }

    fn header(&self, msg_type: &MsgType, seq: SeqNum, sending_time: Timestamp) -> MessageBuilder {
        Message::builder(&self.config.begin_string, msg_type)
            .field(tags::SENDER_COMP_ID, self.config.sender_comp_id.as_str())
            .field(tags::TARGET_COMP_ID, self.config.target_comp_id.as_str())
            .field_u64(tags::MSG_SEQ_NUM, seq.value())
            .push(Field::timestamp(tags::SENDING_TIME, sending_time))
    }

    fn check_comp_ids(&self, message: &Message) -> Result<(), FixError> {
        let sender = message.get_str(tags::SENDER_COMP_ID).unwrap_or_default();
        let target = message.get_str(tags::TARGET_COMP_ID).unwrap_or_default();
        if sender == self.config.target_comp_id.as_str()
            && target == self.config.sender_comp_id.as_str()
        {
            return Ok(());
        }
        Err(SessionError::CompIdMismatch {
            expected: format!(
                "{}->{}",
                self.config.target_comp_id, self.config.sender_comp_id
            ),
            received: format!("{sender}->{target}"),
        }
        .into())
    }

    fn ensure_open(&self) -> Result<(), SessionError> {
        if self.terminated {
            return Err(SessionError::InvalidState {
                expected: "open session".to_string(),
                current: "terminated".to_string(),
            });
        }
        Ok(())
    }

    fn ensure_state(&self, expected: SessionState) -> Result<(), SessionError> {
        if self.cell.state != expected {
            return Err(SessionError::InvalidState {
                expected: expected.to_string(),
                current: self.cell.state.to_string(),
            });
        }
        Ok(())
    }

    fn fail(&mut self, error: FixError, now: Instant) -> SessionFailure {
        error!(session = %self.id, state = %self.cell.state, error = %error, "session failed");
        self.terminate(now);
        SessionFailure {
            error,
            action: RecommendedAction::Disconnect,
        }
    }

    fn terminate(&mut self, now: Instant) {
        self.terminated = true;
        self.recovery.clear();
        self.cell.enter(SessionState::Disconnected, now);
    }
}

fn possible_duplicate(mut original: Message) -> Result<Bytes, FixError> {
    let orig_sending_time = original.get(tags::SENDING_TIME).map(|f| f.value.clone());
    original.set(Field::timestamp(tags::SENDING_TIME, Timestamp::now()));
    original.set(Field::bool(tags::POSS_DUP_FLAG, true));
    if let Some(value) = orig_sending_time {
        original.set(Field::new(tags::ORIG_SENDING_TIME, value));
    }
    Ok(encode_message(&original)?)
}

fn unexpected(msg_type: &MsgType, state: SessionState) -> FixError {
    SessionError::UnexpectedMessageType {
        msg_type: msg_type.as_str().to_string(),
        state: state.to_string(),
    }
    .into()
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
