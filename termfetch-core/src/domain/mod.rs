//! Domain types: identifiers, fields, date ranges, periodicity, records.
//!
//! Identifiers and field mnemonics are opaque to this crate. The only local
//! validation is that they are non-empty; whether "AAPL US Equity" or
//! "PX_LAST" mean anything is decided by the remote service.

pub mod ids;
pub mod range;

pub use ids::{Field, Identifier};
pub use range::{DateRange, Periodicity};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Validation errors raised while building domain values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    #[error("security identifier must not be empty")]
    EmptyIdentifier,

    #[error("field mnemonic must not be empty")]
    EmptyField,

    #[error("at least one security identifier is required")]
    NoIdentifiers,

    #[error("at least one field is required")]
    NoFields,

    #[error("start date {start} is after end date {end}")]
    InvertedRange { start: NaiveDate, end: NaiveDate },

    #[error("unknown periodicity '{0}'")]
    UnknownPeriodicity(String),
}

/// A single observation: one value of one field for one security on one date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub date: NaiveDate,
    pub identifier: Identifier,
    pub field: Field,
    pub value: f64,
}

impl Record {
    pub fn new(date: NaiveDate, identifier: Identifier, field: Field, value: f64) -> Self {
        Self {
            date,
            identifier,
            field,
            value,
        }
    }
}
