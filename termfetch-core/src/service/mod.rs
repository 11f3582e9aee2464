//! Talking to the data service: requests, events, framing, transports.

pub mod event;
pub mod request;
pub mod scripted;
pub mod session;
pub mod tcp;
pub mod wire;

pub use event::{Event, EventType, Message};
pub use request::{
    FillMethod, HistoricalDataParams, HistoricalRequest, NonTradingDayFill, RequestOptions,
};
pub use scripted::{ScriptStats, ScriptedTransport};
pub use session::{ScopedSession, Session, SessionError, Transport};
pub use tcp::{TcpSession, TcpTransport};
pub use wire::{ClientFrame, WireError};

/// Name of the reference-data service that answers historical requests.
pub const REFDATA_SERVICE: &str = "//blp/refdata";

/// Conventional local port of the data-service bridge.
pub const DEFAULT_PORT: u16 = 8194;
