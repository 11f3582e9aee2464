//! termfetch core: historical market data from a locally running data service.
//!
//! The pieces:
//! - Domain types (identifiers, fields, date ranges, periodicity, records)
//! - Wire protocol, transports and the scoped session guard
//! - The historical fetcher with its two-state receive loop
//! - Long-to-wide pivot into a [`ResultTable`], with CSV export
//! - Loader for the shared CSV data library
//!
//! ```no_run
//! use chrono::NaiveDate;
//! use termfetch_core::{DateRange, FetcherConfig, HistoricalFetcher, HistoricalRequest};
//!
//! let range = DateRange::new(
//!     NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
//!     NaiveDate::from_ymd_opt(2024, 12, 31).unwrap(),
//! )?;
//! let request = HistoricalRequest::from_strs(
//!     ["AAPL US Equity", "MSFT US Equity"],
//!     ["PX_LAST", "PX_VOLUME"],
//!     range,
//! )?;
//! let table = HistoricalFetcher::tcp(FetcherConfig::default()).fetch(&request)?;
//! println!("{} rows x {} columns", table.len(), table.column_count());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod config;
pub mod domain;
pub mod fetch;
pub mod library;
pub mod service;
pub mod table;

pub use config::{ConfigError, FetcherConfig};
pub use domain::{DateRange, DomainError, Field, Identifier, Periodicity, Record};
pub use fetch::{FetchError, FetchOptions, FetchReport, HistoricalFetcher, RetryPolicy};
pub use library::{DataLibrary, LibraryError, LibraryFrame};
pub use service::{HistoricalRequest, RequestOptions, ScriptedTransport, TcpTransport, Transport};
pub use table::{Column, ResultTable, TableCsvError};
