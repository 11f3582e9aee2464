//! Transport and session abstractions, and the scoped session guard.
//!
//! A [`Transport`] knows how to reach the data service; every successful
//! `connect` yields a fresh [`Session`]. Sessions are only ever handed out
//! wrapped in a [`ScopedSession`], which closes them when dropped.

use super::event::{Event, EventType, SERVICE_OPENED, SERVICE_OPEN_FAILURE};
use super::request::{HistoricalDataParams, HISTORICAL_DATA_REQUEST};
use super::wire::{ClientFrame, WireError};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("connection to {endpoint} failed: {reason}")]
    Connect { endpoint: String, reason: String },

    #[error("service '{service}' could not be opened: {reason}")]
    ServiceOpen { service: String, reason: String },

    #[error("session I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] WireError),

    #[error("session closed by the service")]
    Closed,

    /// The service reported the session itself as gone (logged out, connection down).
    #[error("session lost: {0}")]
    Lost(String),
}

/// A live, framed duplex channel to the data service.
pub trait Session: Send {
    /// Send one frame.
    fn send(&mut self, frame: &ClientFrame) -> Result<(), SessionError>;

    /// Wait up to `timeout` for the next event. Returns a `TIMEOUT` event when
    /// nothing arrived in time.
    fn next_event(&mut self, timeout: Duration) -> Result<Event, SessionError>;

    /// Release the underlying connection. Must be idempotent.
    fn close(&mut self);
}

/// Factory for sessions.
pub trait Transport: Send + Sync {
    /// Where this transport connects to, for error messages and logs.
    fn endpoint(&self) -> String;

    fn connect(&self) -> Result<Box<dyn Session>, SessionError>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn endpoint(&self) -> String {
        (**self).endpoint()
    }

    fn connect(&self) -> Result<Box<dyn Session>, SessionError> {
        (**self).connect()
    }
}

/// Owns a session for the duration of one call and closes it on drop.
pub struct ScopedSession {
    inner: Box<dyn Session>,
    endpoint: String,
    next_correlation_id: u64,
    released: bool,
}

impl ScopedSession {
    /// Connect through `transport`.
    pub fn acquire<T: Transport + ?Sized>(transport: &T) -> Result<Self, SessionError> {
        let endpoint = transport.endpoint();
        let inner = transport.connect()?;
        debug!(%endpoint, "session acquired");
        Ok(Self {
            inner,
            endpoint,
            next_correlation_id: 1,
            released: false,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Ask the service to open `service` and wait for its status.
    ///
    /// Events other than `SERVICE_STATUS` that arrive first (session-started
    /// notices and the like) are skipped. If no status arrives within
    /// `wait`, the service counts as unavailable.
    pub fn open_service(
        &mut self,
        service: &str,
        wait: Duration,
        poll: Duration,
    ) -> Result<(), SessionError> {
        self.inner.send(&ClientFrame::OpenService {
            service: service.to_string(),
        })?;

        let started = Instant::now();
        while started.elapsed() < wait {
            let event = self.inner.next_event(poll.min(wait))?;
            if let Some(reason) = event.session_loss() {
                return Err(SessionError::Lost(reason));
            }
            if event.event_type != EventType::ServiceStatus {
                continue;
            }
            for msg in &event.messages {
                if msg.message_type == SERVICE_OPENED {
                    info!(service, endpoint = %self.endpoint, "service opened");
                    return Ok(());
                }
                if msg.message_type == SERVICE_OPEN_FAILURE {
                    return Err(SessionError::ServiceOpen {
                        service: service.to_string(),
                        reason: msg
                            .reason
                            .clone()
                            .unwrap_or_else(|| "refused by service".to_string()),
                    });
                }
            }
        }

        Err(SessionError::ServiceOpen {
            service: service.to_string(),
            reason: format!("no service status within {wait:?}"),
        })
    }

    /// Submit a historical request. Returns its correlation id.
    pub fn submit(&mut self, params: HistoricalDataParams) -> Result<u64, SessionError> {
        let correlation_id = self.next_correlation_id;
        self.next_correlation_id += 1;
        debug!(
            correlation_id,
            securities = params.securities.len(),
            fields = params.fields.len(),
            "submitting historical request"
        );
        self.inner.send(&ClientFrame::Request {
            correlation_id,
            operation: HISTORICAL_DATA_REQUEST.to_string(),
            params,
        })?;
        Ok(correlation_id)
    }

    pub fn next_event(&mut self, timeout: Duration) -> Result<Event, SessionError> {
        self.inner.next_event(timeout)
    }

    /// Close now instead of at end of scope.
    pub fn release(mut self) {
        self.close_inner();
    }

    fn close_inner(&mut self) {
        if !self.released {
            self.released = true;
            self.inner.close();
            debug!(endpoint = %self.endpoint, "session released");
        }
    }
}

impl Drop for ScopedSession {
    fn drop(&mut self) {
        self.close_inner();
    }
}

impl std::fmt::Debug for ScopedSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopedSession")
            .field("endpoint", &self.endpoint)
            .field("released", &self.released)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::event::Message;
    use crate::service::scripted::ScriptedTransport;

    const POLL: Duration = Duration::from_millis(5);

    #[test]
    fn drop_closes_session() {
        let transport = ScriptedTransport::new(Vec::new());
        {
            let _session = ScopedSession::acquire(&transport).unwrap();
            assert_eq!(transport.stats().closes, 0);
        }
        assert_eq!(transport.stats().closes, 1);
    }

    #[test]
    fn explicit_release_closes_once() {
        let transport = ScriptedTransport::new(Vec::new());
        let session = ScopedSession::acquire(&transport).unwrap();
        session.release();
        assert_eq!(transport.stats().closes, 1);
    }

    #[test]
    fn open_service_skips_unrelated_events() {
        let transport = ScriptedTransport::new(Vec::new()).with_greeting(vec![Event::new(
            EventType::SessionStatus,
            vec![Message::status("SessionStarted", None)],
        )]);
        let mut session = ScopedSession::acquire(&transport).unwrap();
        session
            .open_service("//blp/refdata", Duration::from_secs(1), POLL)
            .unwrap();
    }

    #[test]
    fn open_service_reports_refusal_reason() {
        let transport = ScriptedTransport::new(Vec::new()).refuse_service("not entitled");
        let mut session = ScopedSession::acquire(&transport).unwrap();
        let err = session
            .open_service("//blp/refdata", Duration::from_secs(1), POLL)
            .unwrap_err();
        match err {
            SessionError::ServiceOpen { reason, .. } => assert_eq!(reason, "not entitled"),
            other => panic!("expected ServiceOpen, got {other:?}"),
        }
    }

    #[test]
    fn session_loss_while_opening_is_not_a_refusal() {
        let transport = ScriptedTransport::new(Vec::new())
            .with_greeting(vec![Event::new(
                EventType::SessionStatus,
                vec![Message::status(
                    crate::service::event::SESSION_TERMINATED,
                    Some("terminal logged out"),
                )],
            )])
            .silent_service();
        let mut session = ScopedSession::acquire(&transport).unwrap();
        let err = session
            .open_service("//blp/refdata", Duration::from_secs(1), POLL)
            .unwrap_err();
        match err {
            SessionError::Lost(reason) => assert_eq!(reason, "terminal logged out"),
            other => panic!("expected Lost, got {other:?}"),
        }
    }

    #[test]
    fn open_service_gives_up_when_status_never_arrives() {
        let transport = ScriptedTransport::new(Vec::new()).silent_service();
        let mut session = ScopedSession::acquire(&transport).unwrap();
        let err = session
            .open_service("//blp/refdata", Duration::from_millis(20), POLL)
            .unwrap_err();
        assert!(matches!(err, SessionError::ServiceOpen { .. }));
    }

    #[test]
    fn correlation_ids_increase() {
        let transport = ScriptedTransport::new(Vec::new());
        let mut session = ScopedSession::acquire(&transport).unwrap();
        let params = crate::service::scripted::sample_params();
        let first = session.submit(params.clone()).unwrap();
        let second = session.submit(params).unwrap();
        assert_eq!(first, 1);
        assert_eq!(second, 2);
    }
}
