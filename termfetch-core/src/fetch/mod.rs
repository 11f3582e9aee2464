//! The historical fetch: connect, open the service, submit one batched
//! request, drain the response stream, pivot.
//!
//! The session is acquired at the start of every call and released on every
//! exit path by [`ScopedSession`]'s `Drop`. Nothing is shared between calls.

pub mod error;
pub mod extract;
pub mod retry;
pub mod state;

pub use error::{FetchError, FieldException, Location, MalformedResponse, SecurityError};
pub use extract::RecordCollector;
pub use retry::RetryPolicy;
pub use state::{ReceiveState, Transition};

use crate::config::FetcherConfig;
use crate::service::{
    HistoricalDataParams, HistoricalRequest, ScopedSession, SessionError, TcpTransport, Transport,
};
use crate::table::ResultTable;
use std::time::{Duration, Instant};
use tracing::{debug, info, info_span, warn};

/// Per-call knobs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchOptions {
    /// Abort with [`FetchError::DeadlineExceeded`] if the response has not
    /// completed within this long of the call starting.
    pub deadline: Option<Duration>,
    /// Treat a well-formed response with zero records as [`FetchError::EmptyResult`].
    pub empty_is_error: bool,
}

/// Table plus everything that was skipped on the way.
#[derive(Debug, Clone)]
pub struct FetchReport {
    pub table: ResultTable,
    pub records: usize,
    pub data_events: usize,
    pub malformed: Vec<MalformedResponse>,
    pub security_errors: Vec<SecurityError>,
    pub field_exceptions: Vec<FieldException>,
    pub elapsed: Duration,
}

impl FetchReport {
    /// True when nothing was skipped or rejected.
    pub fn is_clean(&self) -> bool {
        self.malformed.is_empty() && self.security_errors.is_empty() && self.field_exceptions.is_empty()
    }
}

/// Runs historical requests against the service reachable through `T`.
#[derive(Debug)]
pub struct HistoricalFetcher<T: Transport = TcpTransport> {
    transport: T,
    config: FetcherConfig,
}

impl HistoricalFetcher<TcpTransport> {
    /// Fetcher talking TCP to the endpoint named in `config`.
    pub fn tcp(config: FetcherConfig) -> Self {
        let transport = TcpTransport::from_config(&config);
        Self { transport, config }
    }
}

impl<T: Transport> HistoricalFetcher<T> {
    pub fn new(transport: T, config: FetcherConfig) -> Self {
        Self { transport, config }
    }

    pub fn config(&self) -> &FetcherConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Fetch with default options.
    pub fn fetch(&self, request: &HistoricalRequest) -> Result<ResultTable, FetchError> {
        self.fetch_with(request, &FetchOptions::default())
            .map(|report| report.table)
    }

    /// Fetch and return the full report.
    pub fn fetch_with(
        &self,
        request: &HistoricalRequest,
        options: &FetchOptions,
    ) -> Result<FetchReport, FetchError> {
        let span = info_span!(
            "fetch",
            securities = request.identifiers().len(),
            fields = request.fields().len(),
            range = %request.range(),
            periodicity = %request.periodicity(),
        );
        let _enter = span.enter();
        let started = Instant::now();

        let mut session = self.connect_with_retry()?;
        let endpoint = session.endpoint().to_string();
        session
            .open_service(
                &self.config.service,
                self.config.service_open_timeout(),
                self.config.poll_timeout(),
            )
            .map_err(|e| match e {
                SessionError::ServiceOpen { service, reason } => {
                    FetchError::ServiceUnavailable { service, reason }
                }
                // Still in setup: a lost session means the service itself is down.
                SessionError::Lost(reason) => FetchError::Connection { endpoint, reason },
                other => FetchError::from_stream(other),
            })?;

        let correlation_id = session
            .submit(HistoricalDataParams::from(request))
            .map_err(FetchError::from_stream)?;

        let mut collector = RecordCollector::new(request.fields(), Some(correlation_id));
        self.drain(&mut session, &mut collector, correlation_id, started, options)?;
        session.release();

        let records = collector.records.len();
        let table = ResultTable::from_records(
            collector.records,
            request.identifiers(),
            request.fields(),
        );

        if table.is_empty() && options.empty_is_error {
            return Err(FetchError::EmptyResult);
        }

        let elapsed = started.elapsed();
        info!(
            rows = table.len(),
            columns = table.column_count(),
            records,
            malformed = collector.malformed.len(),
            ?elapsed,
            "fetch complete"
        );

        Ok(FetchReport {
            table,
            records,
            data_events: collector.data_events,
            malformed: collector.malformed,
            security_errors: collector.security_errors,
            field_exceptions: collector.field_exceptions,
            elapsed,
        })
    }

    /// Receive until the terminal event. The bounded poll is the only blocking call.
    fn drain(
        &self,
        session: &mut ScopedSession,
        collector: &mut RecordCollector<'_>,
        correlation_id: u64,
        started: Instant,
        options: &FetchOptions,
    ) -> Result<(), FetchError> {
        let poll = self.config.poll_timeout();
        let mut state = ReceiveState::Receiving;

        while !state.is_done() {
            let event = session.next_event(poll).map_err(FetchError::from_stream)?;
            collector.absorb(&event);

            state = match state.on_event(&event, Some(correlation_id)) {
                Transition::Continue(next) => next,
                Transition::Abort(reason) => return Err(FetchError::SessionTerminated(reason)),
            };

            if !state.is_done() {
                if let Some(deadline) = options.deadline {
                    if started.elapsed() >= deadline {
                        warn!(?deadline, "response did not complete in time");
                        return Err(FetchError::DeadlineExceeded(deadline));
                    }
                }
            }
        }
        debug!(events = collector.data_events, "response complete");
        Ok(())
    }

    /// Connect, retrying transport failures per the configured policy.
    fn connect_with_retry(&self) -> Result<ScopedSession, FetchError> {
        let policy = &self.config.retry;
        let mut last_error = None;

        for attempt in 0..=policy.max_retries {
            if attempt > 0 {
                let delay = policy.delay(attempt);
                debug!(attempt, ?delay, "retrying connection");
                std::thread::sleep(delay);
            }
            match ScopedSession::acquire(&self.transport) {
                Ok(session) => return Ok(session),
                Err(e) => {
                    warn!(attempt, error = %e, "connection attempt failed");
                    last_error = Some(e);
                }
            }
        }

        let reason = match last_error {
            Some(SessionError::Connect { reason, .. }) => reason,
            Some(other) => other.to_string(),
            None => "no connection attempt made".to_string(),
        };
        Err(FetchError::Connection {
            endpoint: self.transport.endpoint(),
            reason,
        })
    }
}
