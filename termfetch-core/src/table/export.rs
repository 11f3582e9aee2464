//! CSV rendering of a [`ResultTable`].
//!
//! Header: `date,<identifier>|<field>,...`. Absent cells are empty strings.
//! Reading splits each header at the last `|`, so identifiers may contain one.

use super::{Column, ResultTable};
use crate::domain::{Field, Identifier};
use chrono::NaiveDate;
use std::io::{Read, Write};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TableCsvError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("first header must be 'date', found '{0}'")]
    MissingDateHeader(String),

    #[error("header '{0}' is not of the form identifier|field")]
    BadColumnHeader(String),

    #[error("line {line}: {reason}")]
    BadRow { line: u64, reason: String },
}

impl ResultTable {
    /// Write the table as CSV to any writer.
    pub fn write_csv_to<W: Write>(&self, writer: W) -> Result<(), TableCsvError> {
        let mut wtr = csv::Writer::from_writer(writer);

        let mut header = Vec::with_capacity(self.columns.len() + 1);
        header.push("date".to_string());
        header.extend(self.columns.iter().map(Column::to_string));
        wtr.write_record(&header)?;

        for (date, row) in self.rows() {
            let mut record = Vec::with_capacity(row.len() + 1);
            record.push(date.format("%Y-%m-%d").to_string());
            record.extend(row.iter().map(|v| v.map(|x| x.to_string()).unwrap_or_default()));
            wtr.write_record(&record)?;
        }
        wtr.flush()?;
        Ok(())
    }

    pub fn to_csv_string(&self) -> Result<String, TableCsvError> {
        let mut buf = Vec::new();
        self.write_csv_to(&mut buf)?;
        // csv only ever writes what we gave it, all of which is UTF-8.
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    pub fn write_csv(&self, path: &Path) -> Result<(), TableCsvError> {
        let file = std::fs::File::create(path)?;
        self.write_csv_to(std::io::BufWriter::new(file))
    }

    /// Read back a table written by [`write_csv_to`](Self::write_csv_to).
    pub fn read_csv_from<R: Read>(reader: R) -> Result<Self, TableCsvError> {
        let mut rdr = csv::Reader::from_reader(reader);

        let headers = rdr.headers()?.clone();
        let mut iter = headers.iter();
        match iter.next() {
            Some("date") => {}
            other => {
                return Err(TableCsvError::MissingDateHeader(
                    other.unwrap_or_default().to_string(),
                ))
            }
        }
        let columns = iter.map(parse_column).collect::<Result<Vec<_>, _>>()?;

        let mut dates = Vec::new();
        let mut values = Vec::new();
        for result in rdr.records() {
            let record = result?;
            let line = record.position().map(|p| p.line()).unwrap_or_default();
            let bad = |reason: String| TableCsvError::BadRow { line, reason };

            let raw_date = record.get(0).unwrap_or_default();
            let date = NaiveDate::parse_from_str(raw_date, "%Y-%m-%d")
                .map_err(|e| bad(format!("bad date '{raw_date}': {e}")))?;

            let mut row = Vec::with_capacity(columns.len());
            for cell in record.iter().skip(1) {
                if cell.trim().is_empty() {
                    row.push(None);
                } else {
                    let v: f64 = cell
                        .trim()
                        .parse()
                        .map_err(|e| bad(format!("bad value '{cell}': {e}")))?;
                    row.push(Some(v));
                }
            }
            dates.push(date);
            values.push(row);
        }

        ResultTable::from_parts(dates, columns, values).ok_or_else(|| TableCsvError::BadRow {
            line: 0,
            reason: "dates are not strictly ascending".to_string(),
        })
    }
}

fn parse_column(header: &str) -> Result<Column, TableCsvError> {
    let bad = || TableCsvError::BadColumnHeader(header.to_string());
    let (id, field) = header.rsplit_once('|').ok_or_else(bad)?;
    Ok(Column::new(
        Identifier::new(id).map_err(|_| bad())?,
        Field::new(field).map_err(|_| bad())?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Record;

    fn sample() -> ResultTable {
        let d = |s: &str| NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap();
        let id = |s: &str| Identifier::new(s).unwrap();
        let f = |s: &str| Field::new(s).unwrap();
        ResultTable::from_records(
            vec![
                Record::new(d("2024-01-02"), id("AAPL US Equity"), f("PX_LAST"), 185.64),
                Record::new(d("2024-01-03"), id("AAPL US Equity"), f("PX_LAST"), 184.25),
                Record::new(d("2024-01-02"), id("AAPL US Equity"), f("PX_VOLUME"), 82488700.0),
            ],
            &[id("AAPL US Equity")],
            &[f("PX_LAST"), f("PX_VOLUME")],
        )
    }

    #[test]
    fn csv_has_date_then_pair_headers() {
        let text = sample().to_csv_string().unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "date,AAPL US Equity|PX_LAST,AAPL US Equity|PX_VOLUME");
        assert_eq!(lines[1], "2024-01-02,185.64,82488700");
        assert_eq!(lines[2], "2024-01-03,184.25,");
    }

    #[test]
    fn csv_reads_back_identically() {
        let table = sample();
        let text = table.to_csv_string().unwrap();
        let back = ResultTable::read_csv_from(text.as_bytes()).unwrap();
        assert_eq!(back, table);
    }

    #[test]
    fn header_without_pipe_is_rejected() {
        let err = ResultTable::read_csv_from("date,PX_LAST\n2024-01-02,1\n".as_bytes()).unwrap_err();
        assert!(matches!(err, TableCsvError::BadColumnHeader(_)));
    }

    #[test]
    fn write_csv_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        sample().write_csv(&path).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("date,"));
    }
}
