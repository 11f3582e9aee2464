//! In-memory transport that replays a fixed event script.
//!
//! Used by the test suites and for offline demos. Each session answers the
//! open-service handshake on its own, then, once a request has been sent,
//! yields the scripted events in order followed by an endless run of
//! `TIMEOUT` events (or a hang-up, if configured).

use super::event::{Event, EventType, Message, SERVICE_OPENED, SERVICE_OPEN_FAILURE};
use super::session::{Session, SessionError, Transport};
use super::wire::ClientFrame;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Counters and sent frames, shared by every session of one transport.
#[derive(Debug, Clone, Default)]
pub struct ScriptStats {
    pub connect_attempts: usize,
    pub connects: usize,
    pub closes: usize,
    pub sent: Vec<ClientFrame>,
}

impl ScriptStats {
    /// Number of `Request` frames sent so far.
    pub fn requests(&self) -> usize {
        self.sent
            .iter()
            .filter(|f| matches!(f, ClientFrame::Request { .. }))
            .count()
    }
}

#[derive(Debug, Clone)]
enum ServiceBehaviour {
    Open,
    Refuse(String),
    Silent,
}

/// Transport whose sessions replay a script.
#[derive(Debug, Clone)]
pub struct ScriptedTransport {
    script: Vec<Event>,
    greeting: Vec<Event>,
    service: ServiceBehaviour,
    refused_connections: usize,
    hang_up: bool,
    stats: Arc<Mutex<ScriptStats>>,
}

impl ScriptedTransport {
    /// Sessions yield `script` after the request is sent.
    pub fn new(script: Vec<Event>) -> Self {
        Self {
            script,
            greeting: Vec::new(),
            service: ServiceBehaviour::Open,
            refused_connections: 0,
            hang_up: false,
            stats: Arc::new(Mutex::new(ScriptStats::default())),
        }
    }

    /// Events delivered before the service status (e.g. `SessionStarted`).
    pub fn with_greeting(mut self, greeting: Vec<Event>) -> Self {
        self.greeting = greeting;
        self
    }

    /// Answer the open-service handshake with a refusal.
    pub fn refuse_service(mut self, reason: &str) -> Self {
        self.service = ServiceBehaviour::Refuse(reason.to_string());
        self
    }

    /// Never answer the open-service handshake.
    pub fn silent_service(mut self) -> Self {
        self.service = ServiceBehaviour::Silent;
        self
    }

    /// Refuse the first `n` connection attempts.
    pub fn refuse_connections(mut self, n: usize) -> Self {
        self.refused_connections = n;
        self
    }

    /// Close the stream once the script is exhausted instead of timing out.
    pub fn hang_up_after_script(mut self) -> Self {
        self.hang_up = true;
        self
    }

    pub fn stats(&self) -> ScriptStats {
        self.lock_stats().clone()
    }

    fn lock_stats(&self) -> std::sync::MutexGuard<'_, ScriptStats> {
        // A poisoned lock only means a test panicked mid-update; the counters are still usable.
        self.stats.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Transport for ScriptedTransport {
    fn endpoint(&self) -> String {
        "scripted".to_string()
    }

    fn connect(&self) -> Result<Box<dyn Session>, SessionError> {
        let mut stats = self.lock_stats();
        stats.connect_attempts += 1;
        if stats.connect_attempts <= self.refused_connections {
            return Err(SessionError::Connect {
                endpoint: self.endpoint(),
                reason: "connection refused".to_string(),
            });
        }
        stats.connects += 1;
        drop(stats);

        Ok(Box::new(ScriptedSession {
            pending: self.greeting.iter().cloned().collect(),
            script: self.script.clone(),
            service: self.service.clone(),
            hang_up: self.hang_up,
            request_sent: false,
            closed: false,
            stats: Arc::clone(&self.stats),
        }))
    }
}

struct ScriptedSession {
    pending: VecDeque<Event>,
    script: Vec<Event>,
    service: ServiceBehaviour,
    hang_up: bool,
    request_sent: bool,
    closed: bool,
    stats: Arc<Mutex<ScriptStats>>,
}

impl Session for ScriptedSession {
    fn send(&mut self, frame: &ClientFrame) -> Result<(), SessionError> {
        if self.closed {
            return Err(SessionError::Closed);
        }
        self.stats
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .sent
            .push(frame.clone());

        match frame {
            ClientFrame::OpenService { .. } => match &self.service {
                ServiceBehaviour::Open => self.pending.push_back(Event::new(
                    EventType::ServiceStatus,
                    vec![Message::status(SERVICE_OPENED, None)],
                )),
                ServiceBehaviour::Refuse(reason) => self.pending.push_back(Event::new(
                    EventType::ServiceStatus,
                    vec![Message::status(SERVICE_OPEN_FAILURE, Some(reason.as_str()))],
                )),
                ServiceBehaviour::Silent => {}
            },
            ClientFrame::Request { .. } => {
                self.request_sent = true;
                self.pending.extend(self.script.drain(..));
            }
            ClientFrame::Close => {}
        }
        Ok(())
    }

    fn next_event(&mut self, timeout: Duration) -> Result<Event, SessionError> {
        if self.closed {
            return Err(SessionError::Closed);
        }
        if let Some(event) = self.pending.pop_front() {
            return Ok(event);
        }
        if self.request_sent && self.hang_up {
            return Err(SessionError::Closed);
        }
        // Keep timeouts cheap but not free so deadline checks see time pass.
        std::thread::sleep(timeout.min(Duration::from_millis(1)));
        Ok(Event::timeout())
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.stats.lock().unwrap_or_else(|e| e.into_inner()).closes += 1;
        }
    }
}

#[cfg(test)]
pub(crate) fn sample_params() -> super::request::HistoricalDataParams {
    use crate::domain::DateRange;
    use chrono::NaiveDate;

    let range = DateRange::new(
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
    )
    .unwrap();
    let request =
        super::request::HistoricalRequest::from_strs(["SPY US Equity"], ["PX_LAST"], range)
            .unwrap();
    super::request::HistoricalDataParams::from(&request)
}
