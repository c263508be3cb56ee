/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Heartbeat and TestRequest management.
//!
//! This module handles FIX session liveness including:
//! - Sending heartbeats when nothing was sent for an interval
//! - Sending TestRequest when nothing was received for an interval
//! - Detecting TestRequests that were never echoed
//!
//! The current time is always passed in, so the monitor never reads a clock.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// What the session should do to keep the connection alive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Liveness {
    /// Send a Heartbeat; the counterparty has heard nothing for an interval.
    SendHeartbeat,
    /// Send a TestRequest carrying this TestReqID.
    SendTestRequest(String),
    /// The pending TestRequest went unanswered for this long.
    TimedOut(Duration),
}

/// Tracks heartbeat timing for a FIX session.
#[derive(Debug)]
pub struct HeartbeatMonitor {
    /// Heartbeat interval.
    interval: Duration,
    /// How long a TestRequest may stay unanswered.
    grace: Duration,
    /// Time of last message sent.
    last_sent: Instant,
    /// Time of last message received.
    last_received: Instant,
    /// Pending TestRequest ID and the time it was sent, if any.
    pending: Option<(String, Instant)>,
}

impl HeartbeatMonitor {
    /// Creates a new monitor with both clocks starting at `now`.
    ///
    /// # Arguments
    /// * `interval` - The heartbeat interval
    /// * `grace` - How long to wait for a TestRequest echo
    /// * `now` - Current time
    #[must_use]
    pub fn new(interval: Duration, grace: Duration, now: Instant) -> Self {
        Self {
            interval,
            grace,
            last_sent: now,
            last_received: now,
            pending: None,
        }
    }

    /// Records that a message was sent.
    #[inline]
    pub fn on_sent(&mut self, now: Instant) {
        self.last_sent = now;
    }

    /// Records that a message was received.
    #[inline]
    pub fn on_received(&mut self, now: Instant) {
        self.last_received = now;
    }

    /// Records an inbound Heartbeat.
    ///
    /// Clears the pending TestRequest if the Heartbeat echoes its ID.
    /// Returns true if it did.
    pub fn on_heartbeat(&mut self, test_req_id: Option<&str>) -> bool {
        let echoed = matches!(
            (&self.pending, test_req_id),
            (Some((pending, _)), Some(received)) if pending == received
        );
        if echoed {
            self.pending = None;
        }
        echoed
    }

    /// Decides the next liveness action at `now`, if any.
    ///
    /// A returned TestRequest is recorded as pending and as sent; a
    /// Heartbeat is not recorded until the caller reports it through
    /// [`HeartbeatMonitor::on_sent`].
    pub fn poll(&mut self, now: Instant) -> Option<Liveness> {
        if let Some((_, sent_at)) = &self.pending {
            let waited = now.saturating_duration_since(*sent_at);
            if waited >= self.grace {
                return Some(Liveness::TimedOut(waited));
            }
        } else if self.time_since_last_received(now) >= self.interval {
            let id = generate_test_req_id();
            self.pending = Some((id.clone(), now));
            self.last_sent = now;
            return Some(Liveness::SendTestRequest(id));
        }

        if now.saturating_duration_since(self.last_sent) >= self.interval {
            return Some(Liveness::SendHeartbeat);
        }
        None
    }

    /// Returns the pending TestRequest ID, if any.
    #[must_use]
    pub fn pending_test_request(&self) -> Option<&str> {
        self.pending.as_ref().map(|(id, _)| id.as_str())
    }

    /// Returns the time since the last message was received.
    #[must_use]
    pub fn time_since_last_received(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_received)
    }

    /// Returns the heartbeat interval.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Restarts both clocks at `now` with a new interval and drops any
    /// pending TestRequest.
    pub fn reset(&mut self, interval: Duration, now: Instant) {
        self.interval = interval;
        self.last_sent = now;
        self.last_received = now;
        self.pending = None;
    }
}

/// Generates a unique TestReqID.
///
/// Uses the current timestamp in nanoseconds plus a process-wide counter.
#[must_use]
pub fn generate_test_req_id() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};

    static COUNTER: AtomicU64 = AtomicU64::new(0);

    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);

    format!("TEST{nanos}-{n}")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECS_30: Duration = Duration::from_secs(30);

    #[test]
    fn test_heartbeat_monitor_new() {
        let now = Instant::now();
        let mut mon = HeartbeatMonitor::new(SECS_30, SECS_30, now);
        assert_eq!(mon.interval(), SECS_30);
        assert!(mon.pending_test_request().is_none());
        assert_eq!(mon.poll(now + Duration::from_secs(29)), None);
    }

    #[test]
    fn test_heartbeat_when_nothing_sent() {
        let start = Instant::now();
        let mut mon = HeartbeatMonitor::new(SECS_30, SECS_30, start);

        let now = start + Duration::from_secs(20);
        mon.on_received(now);
        assert_eq!(mon.poll(start + SECS_30), Some(Liveness::SendHeartbeat));

        mon.on_sent(start + SECS_30);
        assert_eq!(mon.poll(start + SECS_30), None);
    }

    #[test]
    fn test_test_request_then_timeout() {
        let start = Instant::now();
        let mut mon = HeartbeatMonitor::new(SECS_30, SECS_30, start);

        let Some(Liveness::SendTestRequest(id)) = mon.poll(start + SECS_30) else {
            panic!("expected a TestRequest");
        };
        assert_eq!(mon.pending_test_request(), Some(id.as_str()));

        // a second poll inside the grace period does nothing
        assert_eq!(mon.poll(start + Duration::from_secs(45)), None);

        assert_eq!(
            mon.poll(start + Duration::from_secs(60)),
            Some(Liveness::TimedOut(SECS_30))
        );
    }

    #[test]
    fn test_echo_clears_pending() {
        let start = Instant::now();
        let mut mon = HeartbeatMonitor::new(SECS_30, SECS_30, start);

        let Some(Liveness::SendTestRequest(id)) = mon.poll(start + SECS_30) else {
            panic!("expected a TestRequest");
        };

        assert!(!mon.on_heartbeat(Some("other")));
        assert!(!mon.on_heartbeat(None));
        assert!(mon.pending_test_request().is_some());

        mon.on_received(start + Duration::from_secs(40));
        assert!(mon.on_heartbeat(Some(&id)));
        assert!(mon.pending_test_request().is_none());
        assert_eq!(mon.poll(start + Duration::from_secs(55)), None);
    }

    #[test]
    fn test_reset() {
        let start = Instant::now();
        let mut mon = HeartbeatMonitor::new(SECS_30, SECS_30, start);
        let _ = mon.poll(start + SECS_30);

        let later = start + Duration::from_secs(100);
        mon.reset(Duration::from_secs(10), later);
        assert!(mon.pending_test_request().is_none());
        assert_eq!(mon.time_since_last_received(later), Duration::ZERO);
        assert_eq!(mon.interval(), Duration::from_secs(10));

        let Some(Liveness::SendTestRequest(id)) = mon.poll(later + Duration::from_secs(10)) else {
            panic!("expected a TestRequest at the new interval");
        };
        assert_eq!(mon.pending_test_request(), Some(id.as_str()));
    }

    #[test]
    fn test_generate_test_req_id() {
        let id1 = generate_test_req_id();
        let id2 = generate_test_req_id();

        assert!(id1.starts_with("TEST"));
        assert!(id2.starts_with("TEST"));
        assert_ne!(id1, id2);
    }
}
