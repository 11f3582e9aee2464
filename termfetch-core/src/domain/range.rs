use super::DomainError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Compact date format used on the wire (`YYYYMMDD`).
pub const WIRE_DATE_FORMAT: &str = "%Y%m%d";

/// Inclusive calendar date range. `start <= end` is enforced at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, DomainError> {
        if start > end {
            return Err(DomainError::InvertedRange { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// Start date as `YYYYMMDD`.
    pub fn wire_start(&self) -> String {
        self.start.format(WIRE_DATE_FORMAT).to_string()
    }

    /// End date as `YYYYMMDD`.
    pub fn wire_end(&self) -> String {
        self.end.format(WIRE_DATE_FORMAT).to_string()
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// Sampling frequency of a historical request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Periodicity {
    #[default]
    Daily,
    Weekly,
    Monthly,
    Quarterly,
    SemiAnnually,
    Yearly,
}

impl Periodicity {
    pub const ALL: [Periodicity; 6] = [
        Periodicity::Daily,
        Periodicity::Weekly,
        Periodicity::Monthly,
        Periodicity::Quarterly,
        Periodicity::SemiAnnually,
        Periodicity::Yearly,
    ];

    /// Name used in the `periodicitySelection` request parameter.
    pub fn as_wire(&self) -> &'static str {
        match self {
            Periodicity::Daily => "DAILY",
            Periodicity::Weekly => "WEEKLY",
            Periodicity::Monthly => "MONTHLY",
            Periodicity::Quarterly => "QUARTERLY",
            Periodicity::SemiAnnually => "SEMI_ANNUALLY",
            Periodicity::Yearly => "YEARLY",
        }
    }
}

impl fmt::Display for Periodicity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire())
    }
}

impl FromStr for Periodicity {
    type Err = DomainError;

    /// Case-insensitive; accepts the wire name or its lowercase/dashed form
    /// (`semi-annually`, `semi_annually`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase().replace('-', "_");
        Periodicity::ALL
            .into_iter()
            .find(|p| p.as_wire() == normalized)
            .ok_or_else(|| DomainError::UnknownPeriodicity(s.to_string()))
    }
}
