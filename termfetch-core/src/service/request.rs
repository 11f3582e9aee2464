//! The batched historical request.
//!
//! One request carries every identifier and every field. The service fans it
//! out on its side; sending one request per security defeats the purpose of
//! the programmatic path.

use crate::domain::{DateRange, DomainError, Field, Identifier, Periodicity};
use serde::{Deserialize, Serialize};

/// Operation name of the historical request.
pub const HISTORICAL_DATA_REQUEST: &str = "HistoricalDataRequest";

/// How the service fills dates on which the security did not trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NonTradingDayFill {
    NonTradingWeekdays,
    AllCalendarDays,
    ActiveDaysOnly,
}

/// Value used for filled non-trading days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FillMethod {
    PreviousValue,
    NilValue,
}

/// Optional request parameters. Unset options are not sent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestOptions {
    pub non_trading_day_fill: Option<NonTradingDayFill>,
    pub fill_method: Option<FillMethod>,
    pub adjustment_split: Option<bool>,
    pub adjustment_normal: Option<bool>,
    pub adjustment_abnormal: Option<bool>,
    /// Three-letter currency code for price fields.
    pub currency: Option<String>,
    /// Cap on returned rows per security (most recent first on the service side).
    pub max_data_points: Option<u32>,
}

/// A validated historical request, independent of the wire encoding.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoricalRequest {
    identifiers: Vec<Identifier>,
    fields: Vec<Field>,
    range: DateRange,
    periodicity: Periodicity,
    options: RequestOptions,
}

impl HistoricalRequest {
    /// Build a request. Both lists must be non-empty; duplicates are dropped,
    /// keeping the position of the first occurrence.
    pub fn new(
        identifiers: Vec<Identifier>,
        fields: Vec<Field>,
        range: DateRange,
    ) -> Result<Self, DomainError> {
        let identifiers = dedup_in_order(identifiers);
        let fields = dedup_in_order(fields);
        if identifiers.is_empty() {
            return Err(DomainError::NoIdentifiers);
        }
        if fields.is_empty() {
            return Err(DomainError::NoFields);
        }
        Ok(Self {
            identifiers,
            fields,
            range,
            periodicity: Periodicity::default(),
            options: RequestOptions::default(),
        })
    }

    /// Convenience constructor from raw strings.
    pub fn from_strs<I, F>(identifiers: I, fields: F, range: DateRange) -> Result<Self, DomainError>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
        F: IntoIterator,
        F::Item: AsRef<str>,
    {
        let identifiers = identifiers
            .into_iter()
            .map(Identifier::new)
            .collect::<Result<Vec<_>, _>>()?;
        let fields = fields
            .into_iter()
            .map(Field::new)
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(identifiers, fields, range)
    }

    pub fn with_periodicity(mut self, periodicity: Periodicity) -> Self {
        self.periodicity = periodicity;
        self
    }

    pub fn with_options(mut self, options: RequestOptions) -> Self {
        self.options = options;
        self
    }

    pub fn identifiers(&self) -> &[Identifier] {
        &self.identifiers
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn range(&self) -> DateRange {
        self.range
    }

    pub fn periodicity(&self) -> Periodicity {
        self.periodicity
    }

    pub fn options(&self) -> &RequestOptions {
        &self.options
    }
}

fn dedup_in_order<T: Clone + Eq + std::hash::Hash>(items: Vec<T>) -> Vec<T> {
    let mut seen = std::collections::HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.clone()))
        .collect()
}

/// Wire parameters of a `HistoricalDataRequest`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoricalDataParams {
    pub securities: Vec<Identifier>,
    pub fields: Vec<Field>,
    pub periodicity_selection: Periodicity,
    pub start_date: String,
    pub end_date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub non_trading_day_fill_option: Option<NonTradingDayFill>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub non_trading_day_fill_method: Option<FillMethod>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adjustment_split: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adjustment_normal: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adjustment_abnormal: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_data_points: Option<u32>,
}

impl From<&HistoricalRequest> for HistoricalDataParams {
    fn from(request: &HistoricalRequest) -> Self {
        let opts = &request.options;
        Self {
            securities: request.identifiers.clone(),
            fields: request.fields.clone(),
            periodicity_selection: request.periodicity,
            start_date: request.range.wire_start(),
            end_date: request.range.wire_end(),
            non_trading_day_fill_option: opts.non_trading_day_fill,
            non_trading_day_fill_method: opts.fill_method,
            adjustment_split: opts.adjustment_split,
            adjustment_normal: opts.adjustment_normal,
            adjustment_abnormal: opts.adjustment_abnormal,
            currency: opts.currency.clone(),
            max_data_points: opts.max_data_points,
        }
    }
}
