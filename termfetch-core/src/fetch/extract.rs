//! Turning delivered messages into flat records.
//!
//! Expected payload per message (`securityData`, an object or an array of them):
//!
//! ```json
//! { "security": "AAPL US Equity",
//!   "fieldExceptions": [{ "fieldId": "PX_BOGUS", "errorInfo": { "message": "Invalid field" } }],
//!   "fieldData": [{ "date": "2024-01-02", "PX_LAST": 185.64, "PX_VOLUME": 82488700 }] }
//! ```
//!
//! Anything that does not fit is recorded as a [`MalformedResponse`] and
//! skipped at the smallest granularity possible (cell, row, then message).

use super::error::{FieldException, Location, MalformedResponse, SecurityError};
use crate::domain::{Field, Identifier, Record};
use crate::service::{Event, Message};
use chrono::NaiveDate;
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// Accumulates records and per-item problems across events.
#[derive(Debug)]
pub struct RecordCollector<'a> {
    fields: &'a [Field],
    correlation_id: Option<u64>,
    pub records: Vec<Record>,
    pub malformed: Vec<MalformedResponse>,
    pub security_errors: Vec<SecurityError>,
    pub field_exceptions: Vec<FieldException>,
    pub data_events: usize,
}

impl<'a> RecordCollector<'a> {
    /// Collect values of `fields` only. Messages tagged with a correlation id
    /// other than `correlation_id` are ignored.
    pub fn new(fields: &'a [Field], correlation_id: Option<u64>) -> Self {
        Self {
            fields,
            correlation_id,
            records: Vec::new(),
            malformed: Vec::new(),
            security_errors: Vec::new(),
            field_exceptions: Vec::new(),
            data_events: 0,
        }
    }

    pub fn absorb(&mut self, event: &Event) {
        for reason in &event.unreadable {
            self.malformed(None, None, &format!("unreadable message: {reason}"));
        }
        if !event.event_type.carries_data() {
            return;
        }
        self.data_events += 1;
        for msg in &event.messages {
            self.absorb_message(msg);
        }
    }

    fn absorb_message(&mut self, msg: &Message) {
        if let (Some(ours), Some(theirs)) = (self.correlation_id, msg.correlation_id) {
            if ours != theirs {
                debug!(ours, theirs, "ignoring message for another request");
                return;
            }
        }
        match &msg.security_data {
            None => {}
            Some(Value::Array(items)) => {
                for item in items {
                    self.absorb_security(item);
                }
            }
            Some(item) => self.absorb_security(item),
        }
    }

    fn absorb_security(&mut self, payload: &Value) {
        let Some(obj) = payload.as_object() else {
            self.malformed(None, None, "securityData is not an object");
            return;
        };

        let security = match obj.get("security").and_then(Value::as_str) {
            Some(s) => s,
            None => {
                self.malformed(None, None, "securityData lacks a 'security' name");
                return;
            }
        };
        let identifier = match Identifier::new(security) {
            Ok(id) => id,
            Err(e) => {
                self.malformed(None, None, &e.to_string());
                return;
            }
        };

        if let Some(err) = obj.get("securityError") {
            let (category, message) = error_info(err);
            warn!(security, %category, %message, "security rejected by service");
            self.security_errors.push(SecurityError {
                security: security.to_string(),
                category,
                message,
            });
            return;
        }

        let had_exceptions = self.absorb_field_exceptions(security, obj);

        match obj.get("fieldData") {
            Some(Value::Array(rows)) => {
                for (i, row) in rows.iter().enumerate() {
                    self.absorb_row(&identifier, i, row);
                }
            }
            None if had_exceptions => {}
            None => self.malformed(Some(security), None, "missing fieldData"),
            Some(_) => self.malformed(Some(security), None, "fieldData is not an array"),
        }
    }

    fn absorb_field_exceptions(&mut self, security: &str, obj: &Map<String, Value>) -> bool {
        let Some(exceptions) = obj.get("fieldExceptions").and_then(Value::as_array) else {
            return false;
        };
        for ex in exceptions {
            let field = ex
                .get("fieldId")
                .and_then(Value::as_str)
                .unwrap_or("?")
                .to_string();
            let (_, message) = error_info(ex.get("errorInfo").unwrap_or(&Value::Null));
            warn!(security, %field, %message, "field rejected by service");
            self.field_exceptions.push(FieldException {
                security: security.to_string(),
                field,
                message,
            });
        }
        !exceptions.is_empty()
    }

    fn absorb_row(&mut self, identifier: &Identifier, index: usize, row: &Value) {
        let security = identifier.as_str();
        let Some(row) = row.as_object() else {
            self.malformed(Some(security), Some(index), "row is not an object");
            return;
        };
        let date = match row.get("date").and_then(Value::as_str).map(parse_date) {
            Some(Some(date)) => date,
            Some(None) => {
                self.malformed(Some(security), Some(index), "unparseable date");
                return;
            }
            None => {
                self.malformed(Some(security), Some(index), "row lacks a date");
                return;
            }
        };

        for field in self.fields {
            match row.get(field.as_str()) {
                None | Some(Value::Null) => {}
                Some(Value::Number(n)) => match n.as_f64() {
                    Some(value) => self.records.push(Record::new(
                        date,
                        identifier.clone(),
                        field.clone(),
                        value,
                    )),
                    None => self.malformed(
                        Some(security),
                        Some(index),
                        &format!("{field} is not representable as f64"),
                    ),
                },
                Some(_) => self.malformed(
                    Some(security),
                    Some(index),
                    &format!("{field} is not numeric"),
                ),
            }
        }
    }

    fn malformed(&mut self, security: Option<&str>, row: Option<usize>, reason: &str) {
        let item = MalformedResponse {
            location: Location {
                security: security.map(str::to_string),
                row,
            },
            reason: reason.to_string(),
        };
        warn!(%item, "skipping malformed response item");
        self.malformed.push(item);
    }
}

/// Accepts `YYYY-MM-DD`, `YYYYMMDD`, and either with a trailing time part.
fn parse_date(raw: &str) -> Option<NaiveDate> {
    let day = raw.split('T').next().unwrap_or(raw).trim();
    NaiveDate::parse_from_str(day, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(day, "%Y%m%d"))
        .ok()
}

/// `(category, message)` from an error object, or from a bare string.
fn error_info(value: &Value) -> (String, String) {
    match value {
        Value::String(s) => (String::new(), s.clone()),
        Value::Object(obj) => {
            let get = |key: &str| {
                obj.get(key)
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string()
            };
            (get("category"), get("message"))
        }
        _ => (String::new(), String::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::EventType;
    use serde_json::json;

    fn fields(names: &[&str]) -> Vec<Field> {
        names.iter().map(|n| Field::new(n).unwrap()).collect()
    }

    fn data_event(payload: Value) -> Event {
        Event::new(
            EventType::PartialResponse,
            vec![Message::security_data(None, payload)],
        )
    }

    #[test]
    fn one_record_per_present_field() {
        let f = fields(&["PX_LAST", "PX_VOLUME"]);
        let mut c = RecordCollector::new(&f, None);
        c.absorb(&data_event(json!({
            "security": "AAPL US Equity",
            "fieldData": [
                { "date": "2024-01-02", "PX_LAST": 185.64, "PX_VOLUME": 82488700 },
                { "date": "2024-01-03", "PX_LAST": 184.25 }
            ]
        })));
        assert_eq!(c.records.len(), 3);
        assert!(c.malformed.is_empty());
        assert_eq!(c.records[2].field.as_str(), "PX_LAST");
        assert_eq!(c.records[2].value, 184.25);
    }

    #[test]
    fn unrequested_fields_are_ignored() {
        let f = fields(&["PX_LAST"]);
        let mut c = RecordCollector::new(&f, None);
        c.absorb(&data_event(json!({
            "security": "SPY US Equity",
            "fieldData": [{ "date": "20240102", "PX_LAST": 472.65, "PX_OPEN": 472.16 }]
        })));
        assert_eq!(c.records.len(), 1);
        assert_eq!(
            c.records[0].date,
            NaiveDate::from_ymd_opt(2024, 1, 2).unwrap()
        );
    }

    #[test]
    fn bad_rows_are_skipped_not_fatal() {
        let f = fields(&["PX_LAST"]);
        let mut c = RecordCollector::new(&f, None);
        c.absorb(&data_event(json!({
            "security": "SPY US Equity",
            "fieldData": [
                { "PX_LAST": 1.0 },
                { "date": "not-a-date", "PX_LAST": 2.0 },
                "garbage",
                { "date": "2024-01-05", "PX_LAST": "n/a" },
                { "date": "2024-01-08", "PX_LAST": 5.0 }
            ]
        })));
        assert_eq!(c.records.len(), 1);
        assert_eq!(c.records[0].value, 5.0);
        assert_eq!(c.malformed.len(), 4);
        assert_eq!(c.malformed[0].location.row, Some(0));
        assert_eq!(c.malformed[3].location.row, Some(3));
    }

    #[test]
    fn security_error_skips_the_security() {
        let f = fields(&["PX_LAST"]);
        let mut c = RecordCollector::new(&f, None);
        c.absorb(&data_event(json!({
            "security": "NOPE US Equity",
            "securityError": { "category": "BAD_SEC", "message": "Unknown/Invalid security" }
        })));
        assert!(c.records.is_empty());
        assert!(c.malformed.is_empty());
        assert_eq!(c.security_errors.len(), 1);
        assert_eq!(c.security_errors[0].category, "BAD_SEC");
    }

    #[test]
    fn field_exceptions_are_collected() {
        let f = fields(&["PX_LAST", "PX_BOGUS"]);
        let mut c = RecordCollector::new(&f, None);
        c.absorb(&data_event(json!({
            "security": "SPY US Equity",
            "fieldExceptions": [
                { "fieldId": "PX_BOGUS", "errorInfo": { "message": "Invalid field" } }
            ],
            "fieldData": [{ "date": "2024-01-02", "PX_LAST": 472.65 }]
        })));
        assert_eq!(c.records.len(), 1);
        assert_eq!(c.field_exceptions[0].field, "PX_BOGUS");
        assert_eq!(c.field_exceptions[0].message, "Invalid field");
    }

    #[test]
    fn other_correlation_ids_are_ignored() {
        let f = fields(&["PX_LAST"]);
        let mut c = RecordCollector::new(&f, Some(7));
        let payload = json!({
            "security": "SPY US Equity",
            "fieldData": [{ "date": "2024-01-02", "PX_LAST": 1.0 }]
        });
        c.absorb(&Event::new(
            EventType::PartialResponse,
            vec![
                Message::security_data(Some(8), payload.clone()),
                Message::security_data(Some(7), payload),
            ],
        ));
        assert_eq!(c.records.len(), 1);
    }

    #[test]
    fn status_events_are_not_data() {
        let f = fields(&["PX_LAST"]);
        let mut c = RecordCollector::new(&f, None);
        c.absorb(&Event::timeout());
        assert_eq!(c.data_events, 0);
    }

    #[test]
    fn unreadable_messages_are_malformed_and_siblings_kept() {
        let f = fields(&["PX_LAST"]);
        let mut c = RecordCollector::new(&f, None);
        let mut event = data_event(json!({
            "security": "SPY US Equity",
            "fieldData": [{ "date": "2024-01-02", "PX_LAST": 472.65 }]
        }));
        event
            .unreadable
            .push("invalid type: null, expected a string".to_string());
        c.absorb(&event);
        assert_eq!(c.records.len(), 1);
        assert_eq!(c.malformed.len(), 1);
        assert!(c.malformed[0].reason.starts_with("unreadable message"));
    }

    #[test]
    fn missing_security_name_is_malformed() {
        let f = fields(&["PX_LAST"]);
        let mut c = RecordCollector::new(&f, None);
        c.absorb(&data_event(json!({ "fieldData": [] })));
        assert_eq!(c.malformed.len(), 1);
        assert_eq!(c.malformed[0].location.security, None);
    }
}
