//! TCP transport to the local data-service bridge.
//!
//! The bridge listens on a fixed local port (8194 by convention) and speaks
//! the line framing in [`super::wire`]. Poll timeouts map onto socket read
//! timeouts, so `next_event` never blocks longer than asked.

use super::event::Event;
use super::session::{Session, SessionError, Transport};
use super::wire::{decode_event, encode_frame, ClientFrame};
use crate::config::FetcherConfig;
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::Duration;
use tracing::{debug, trace};

/// Socket read timeouts of zero mean "block forever"; never hand that to the OS.
const MIN_READ_TIMEOUT: Duration = Duration::from_millis(1);

/// Transport that opens a TCP connection per session.
#[derive(Debug, Clone)]
pub struct TcpTransport {
    host: String,
    port: u16,
    connect_timeout: Duration,
}

impl TcpTransport {
    pub fn new(host: impl Into<String>, port: u16, connect_timeout: Duration) -> Self {
        Self {
            host: host.into(),
            port,
            connect_timeout,
        }
    }

    pub fn from_config(config: &FetcherConfig) -> Self {
        Self::new(config.host.clone(), config.port, config.connect_timeout())
    }

    fn connect_error(&self, reason: impl Into<String>) -> SessionError {
        SessionError::Connect {
            endpoint: self.endpoint(),
            reason: reason.into(),
        }
    }
}

impl Transport for TcpTransport {
    fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    fn connect(&self) -> Result<Box<dyn Session>, SessionError> {
        let addrs = (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|e| self.connect_error(format!("cannot resolve host: {e}")))?;

        let mut last_error = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, self.connect_timeout) {
                Ok(stream) => {
                    debug!(%addr, "connected to data service");
                    return Ok(Box::new(TcpSession::new(stream)?));
                }
                Err(e) => {
                    trace!(%addr, error = %e, "connect attempt failed");
                    last_error = Some(e);
                }
            }
        }

        Err(self.connect_error(
            last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "host resolved to no addresses".to_string()),
        ))
    }
}

/// One connection to the bridge.
pub struct TcpSession {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
    /// Bytes of a line whose end has not arrived yet. Survives poll timeouts.
    partial: Vec<u8>,
    closed: bool,
}

impl TcpSession {
    fn new(stream: TcpStream) -> Result<Self, SessionError> {
        stream.set_nodelay(true)?;
        let writer = stream.try_clone()?;
        Ok(Self {
            reader: BufReader::new(stream),
            writer,
            partial: Vec::new(),
            closed: false,
        })
    }
}

impl Session for TcpSession {
    fn send(&mut self, frame: &ClientFrame) -> Result<(), SessionError> {
        if self.closed {
            return Err(SessionError::Closed);
        }
        let bytes = encode_frame(frame)?;
        self.writer.write_all(&bytes)?;
        self.writer.flush()?;
        Ok(())
    }

    fn next_event(&mut self, timeout: Duration) -> Result<Event, SessionError> {
        if self.closed {
            return Err(SessionError::Closed);
        }
        self.reader
            .get_ref()
            .set_read_timeout(Some(timeout.max(MIN_READ_TIMEOUT)))?;

        loop {
            match self.reader.read_until(b'\n', &mut self.partial) {
                Ok(0) => return Err(SessionError::Closed),
                Ok(_) => {
                    if self.partial.last() != Some(&b'\n') {
                        // EOF in the middle of a line.
                        return Err(SessionError::Closed);
                    }
                    let line = std::mem::take(&mut self.partial);
                    if line.iter().all(u8::is_ascii_whitespace) {
                        continue;
                    }
                    return Ok(decode_event(&line)?);
                }
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    return Ok(Event::timeout());
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(SessionError::Io(e)),
            }
        }
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Ok(bytes) = encode_frame(&ClientFrame::Close) {
            let _ = self.writer.write_all(&bytes);
            let _ = self.writer.flush();
        }
        let _ = self.writer.shutdown(Shutdown::Both);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    #[test]
    fn refused_connection_is_a_connect_error() {
        // Grab a free port, then release it so nothing listens there.
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let transport = TcpTransport::new("127.0.0.1", port, Duration::from_millis(200));
        match transport.connect() {
            Err(SessionError::Connect { endpoint, .. }) => {
                assert_eq!(endpoint, format!("127.0.0.1:{port}"));
            }
            Err(other) => panic!("expected Connect error, got {other:?}"),
            Ok(_) => panic!("expected Connect error, got a session"),
        }
    }

    #[test]
    fn read_timeout_yields_timeout_event() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let transport = TcpTransport::new("127.0.0.1", port, Duration::from_secs(1));
        let mut session = transport.connect().unwrap();
        let (_server_side, _) = listener.accept().unwrap();

        let event = session.next_event(Duration::from_millis(20)).unwrap();
        assert_eq!(event, Event::timeout());
        session.close();
    }
}
