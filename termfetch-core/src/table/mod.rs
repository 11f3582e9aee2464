//! Long-to-wide pivot of records into a date × (identifier, field) table.
//!
//! Rows are the distinct dates present in the records, ascending. Columns are
//! the requested (identifier, field) pairs in request order, identifier-major;
//! a pair with no data stays as an all-absent column. Pairs delivered without
//! having been requested are appended after the requested ones.
//!
//! Duplicate (date, identifier, field) records: the last one processed wins.
//! The service is not known to guarantee uniqueness, so this is a policy, not
//! an assumption.

mod export;

pub use export::TableCsvError;

use crate::domain::{Field, Identifier, Record};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// One column key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Column {
    pub identifier: Identifier,
    pub field: Field,
}

impl Column {
    pub fn new(identifier: Identifier, field: Field) -> Self {
        Self { identifier, field }
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.identifier, self.field)
    }
}

/// Wide result table. Cells are `None` where no observation exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "TableParts")]
pub struct ResultTable {
    dates: Vec<NaiveDate>,
    columns: Vec<Column>,
    /// Row-major; `values[row].len() == columns.len()`.
    values: Vec<Vec<Option<f64>>>,
}

/// Unchecked serialized form; goes through [`ResultTable::from_parts`].
#[derive(Deserialize)]
struct TableParts {
    dates: Vec<NaiveDate>,
    columns: Vec<Column>,
    values: Vec<Vec<Option<f64>>>,
}

impl TryFrom<TableParts> for ResultTable {
    type Error = String;

    fn try_from(parts: TableParts) -> Result<Self, Self::Error> {
        ResultTable::from_parts(parts.dates, parts.columns, parts.values).ok_or_else(|| {
            "table dates must be strictly ascending and rows as wide as the columns".to_string()
        })
    }
}

impl ResultTable {
    /// Table with the given columns and no rows.
    pub fn empty(columns: Vec<Column>) -> Self {
        Self {
            dates: Vec::new(),
            columns,
            values: Vec::new(),
        }
    }

    /// Pivot `records` into a table whose columns follow the request order.
    pub fn from_records<I>(records: I, identifiers: &[Identifier], fields: &[Field]) -> Self
    where
        I: IntoIterator<Item = Record>,
    {
        let mut columns: Vec<Column> = identifiers
            .iter()
            .flat_map(|id| fields.iter().map(move |f| Column::new(id.clone(), f.clone())))
            .collect();
        let mut index: HashMap<Column, usize> = columns
            .iter()
            .cloned()
            .enumerate()
            .map(|(i, c)| (c, i))
            .collect();

        let mut by_date: BTreeMap<NaiveDate, HashMap<usize, f64>> = BTreeMap::new();
        for record in records {
            let key = Column::new(record.identifier, record.field);
            let col = match index.get(&key) {
                Some(&i) => i,
                None => {
                    let i = columns.len();
                    columns.push(key.clone());
                    index.insert(key, i);
                    i
                }
            };
            by_date.entry(record.date).or_default().insert(col, record.value);
        }

        let width = columns.len();
        let mut dates = Vec::with_capacity(by_date.len());
        let mut values = Vec::with_capacity(by_date.len());
        for (date, cells) in by_date {
            let mut row = vec![None; width];
            for (col, value) in cells {
                row[col] = Some(value);
            }
            dates.push(date);
            values.push(row);
        }

        Self {
            dates,
            columns,
            values,
        }
    }

    /// Assemble a table from parts. Dates must be strictly ascending and every
    /// row as wide as `columns`.
    pub(crate) fn from_parts(
        dates: Vec<NaiveDate>,
        columns: Vec<Column>,
        values: Vec<Vec<Option<f64>>>,
    ) -> Option<Self> {
        let ascending = dates.windows(2).all(|w| w[0] < w[1]);
        let rectangular =
            dates.len() == values.len() && values.iter().all(|r| r.len() == columns.len());
        (ascending && rectangular).then_some(Self {
            dates,
            columns,
            values,
        })
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Number of rows (dates).
    pub fn len(&self) -> usize {
        self.dates.len()
    }

    /// True when there are no rows. Columns may still be present.
    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn column_index(&self, identifier: &str, field: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.identifier.as_str() == identifier && c.field.as_str() == field)
    }

    /// Cell at (`date`, `identifier`, `field`). `None` if absent or not in the table.
    pub fn cell(&self, date: NaiveDate, identifier: &str, field: &str) -> Option<f64> {
        let row = self.dates.binary_search(&date).ok()?;
        let col = self.column_index(identifier, field)?;
        self.values[row][col]
    }

    pub fn row(&self, index: usize) -> Option<(NaiveDate, &[Option<f64>])> {
        Some((*self.dates.get(index)?, self.values.get(index)?.as_slice()))
    }

    pub fn rows(&self) -> impl Iterator<Item = (NaiveDate, &[Option<f64>])> + '_ {
        self.dates
            .iter()
            .copied()
            .zip(self.values.iter().map(Vec::as_slice))
    }

    /// All values of one column, aligned with [`dates`](Self::dates).
    pub fn column_values(&self, identifier: &str, field: &str) -> Option<Vec<Option<f64>>> {
        let col = self.column_index(identifier, field)?;
        Some(self.values.iter().map(|row| row[col]).collect())
    }

    /// Number of absent cells.
    pub fn missing_count(&self) -> usize {
        self.values
            .iter()
            .map(|row| row.iter().filter(|v| v.is_none()).count())
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn rec(date: &str, id: &str, field: &str, value: f64) -> Record {
        Record::new(
            d(date),
            Identifier::new(id).unwrap(),
            Field::new(field).unwrap(),
            value,
        )
    }

    fn ids(names: &[&str]) -> Vec<Identifier> {
        names.iter().map(|n| Identifier::new(n).unwrap()).collect()
    }

    fn fields(names: &[&str]) -> Vec<Field> {
        names.iter().map(|n| Field::new(n).unwrap()).collect()
    }

    #[test]
    fn pivot_sorts_dates_and_fills_gaps() {
        let table = ResultTable::from_records(
            vec![
                rec("2024-01-04", "SPY", "PX_LAST", 102.0),
                rec("2024-01-02", "SPY", "PX_LAST", 100.0),
                rec("2024-01-02", "QQQ", "PX_LAST", 200.0),
                rec("2024-01-03", "SPY", "PX_LAST", 101.0),
                rec("2024-01-04", "QQQ", "PX_LAST", 202.0),
            ],
            &ids(&["SPY", "QQQ"]),
            &fields(&["PX_LAST"]),
        );

        assert_eq!(table.dates(), &[d("2024-01-02"), d("2024-01-03"), d("2024-01-04")]);
        assert_eq!(table.column_count(), 2);
        assert_eq!(table.cell(d("2024-01-03"), "SPY", "PX_LAST"), Some(101.0));
        // QQQ has no bar on 2024-01-03
        assert_eq!(table.cell(d("2024-01-03"), "QQQ", "PX_LAST"), None);
        assert_eq!(table.missing_count(), 1);
    }

    #[test]
    fn columns_follow_request_order() {
        let table = ResultTable::from_records(
            vec![rec("2024-01-02", "B", "F2", 1.0)],
            &ids(&["B", "A"]),
            &fields(&["F2", "F1"]),
        );
        let names: Vec<String> = table.columns().iter().map(|c| c.to_string()).collect();
        assert_eq!(names, vec!["B|F2", "B|F1", "A|F2", "A|F1"]);
    }

    #[test]
    fn last_write_wins() {
        let table = ResultTable::from_records(
            vec![
                rec("2024-01-02", "SPY", "PX_LAST", 1.0),
                rec("2024-01-02", "SPY", "PX_LAST", 2.0),
            ],
            &ids(&["SPY"]),
            &fields(&["PX_LAST"]),
        );
        assert_eq!(table.len(), 1);
        assert_eq!(table.cell(d("2024-01-02"), "SPY", "PX_LAST"), Some(2.0));
    }

    #[test]
    fn no_records_gives_empty_table_with_columns() {
        let table =
            ResultTable::from_records(Vec::new(), &ids(&["SPY"]), &fields(&["PX_LAST", "PX_VOLUME"]));
        assert!(table.is_empty());
        assert_eq!(table.column_count(), 2);
        assert_eq!(table.column_values("SPY", "PX_LAST"), Some(Vec::new()));
    }

    #[test]
    fn unrequested_pairs_are_appended() {
        let table = ResultTable::from_records(
            vec![rec("2024-01-02", "SPX Index", "PX_LAST", 4742.83)],
            &ids(&["SPY"]),
            &fields(&["PX_LAST"]),
        );
        assert_eq!(table.column_count(), 2);
        assert_eq!(table.columns()[1].identifier.as_str(), "SPX Index");
    }

    #[test]
    fn deserialize_checks_shape() {
        let table = ResultTable::from_records(
            vec![rec("2024-01-02", "SPY", "PX_LAST", 1.0)],
            &ids(&["SPY"]),
            &fields(&["PX_LAST"]),
        );
        let json = serde_json::to_string(&table).unwrap();
        let back: ResultTable = serde_json::from_str(&json).unwrap();
        assert_eq!(back, table);

        let ragged = r#"{
            "dates": ["2024-01-02"],
            "columns": [{ "identifier": "SPY", "field": "PX_LAST" }],
            "values": [[1.0, 2.0]]
        }"#;
        assert!(serde_json::from_str::<ResultTable>(ragged).is_err());
    }

    #[test]
    fn from_parts_rejects_unsorted_dates() {
        let cols = vec![Column::new(
            Identifier::new("SPY").unwrap(),
            Field::new("PX_LAST").unwrap(),
        )];
        let bad = ResultTable::from_parts(
            vec![d("2024-01-03"), d("2024-01-02")],
            cols.clone(),
            vec![vec![None], vec![None]],
        );
        assert!(bad.is_none());
        let ragged = ResultTable::from_parts(vec![d("2024-01-02")], cols, vec![vec![]]);
        assert!(ragged.is_none());
    }
}
