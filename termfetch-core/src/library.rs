//! Shared data library: locating and loading CSV files that teams drop into a
//! common folder.
//!
//! Layout under the root:
//!
//! ```text
//! <root>/01_shared_data_library/<team>/raw_data/daily/<file>
//! <root>/01_shared_data_library/<team>/raw_data/quarterly/<file>
//! <root>/01_shared_data_library/<team>/processed_data/<file>
//! ```
//!
//! Lookup tries those directories in that order and takes the first hit.

use chrono::NaiveDate;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Folder under the root that holds team folders.
pub const LIBRARY_DIR: &str = "01_shared_data_library";

/// Sub-directories of a team folder, in search order.
pub const SEARCH_DIRS: [&str; 3] = ["raw_data/daily", "raw_data/quarterly", "processed_data"];

#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("file '{file}' not found in standard directories for team '{team}'")]
    NotFound { team: String, file: String },

    #[error("{path}: no '{column}' column")]
    MissingDateColumn { path: PathBuf, column: String },

    #[error("{path}, line {line}: bad date '{value}'")]
    BadDate {
        path: PathBuf,
        line: u64,
        value: String,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// A loaded library file: a date index and named numeric columns.
#[derive(Debug, Clone, PartialEq)]
pub struct LibraryFrame {
    pub path: PathBuf,
    /// Ascending. Rows sharing a date are all kept, in file order.
    pub dates: Vec<NaiveDate>,
    pub columns: Vec<String>,
    /// Row-major, aligned with `dates` and `columns`. Non-numeric cells are `None`.
    pub values: Vec<Vec<Option<f64>>>,
}

impl LibraryFrame {
    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn column(&self, name: &str) -> Option<Vec<Option<f64>>> {
        let idx = self.columns.iter().position(|c| c == name)?;
        Some(self.values.iter().map(|row| row[idx]).collect())
    }
}

#[derive(Debug, Clone)]
pub struct DataLibrary {
    root: PathBuf,
}

impl DataLibrary {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn team_dir(&self, team: &str) -> PathBuf {
        self.root.join(LIBRARY_DIR).join(team)
    }

    /// Candidate paths for `file`, in search order.
    pub fn candidates(&self, team: &str, file: &str) -> Vec<PathBuf> {
        let team_dir = self.team_dir(team);
        SEARCH_DIRS
            .iter()
            .map(|dir| team_dir.join(dir).join(file))
            .collect()
    }

    /// First existing candidate path.
    pub fn locate(&self, team: &str, file: &str) -> Result<PathBuf, LibraryError> {
        self.candidates(team, file)
            .into_iter()
            .find(|p| p.is_file())
            .ok_or_else(|| LibraryError::NotFound {
                team: team.to_string(),
                file: file.to_string(),
            })
    }

    /// Locate and parse `file`, using `date_col` as the index.
    pub fn load(&self, team: &str, file: &str, date_col: &str) -> Result<LibraryFrame, LibraryError> {
        let path = self.locate(team, file)?;
        info!(path = %path.display(), "loading data from library");
        let frame = load_csv(&path, date_col)?;
        debug!(rows = frame.len(), columns = frame.columns.len(), "library file loaded");
        Ok(frame)
    }
}

/// Parse a CSV with a date index column. Dates may be `YYYY-MM-DD`, with an
/// optional time part, or `YYYYMMDD`.
pub fn load_csv(path: &Path, date_col: &str) -> Result<LibraryFrame, LibraryError> {
    let mut rdr = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
    let headers = rdr.headers()?.clone();

    let date_idx = headers
        .iter()
        .position(|h| h.trim() == date_col)
        .ok_or_else(|| LibraryError::MissingDateColumn {
            path: path.to_path_buf(),
            column: date_col.to_string(),
        })?;
    let value_idx: Vec<usize> = (0..headers.len()).filter(|&i| i != date_idx).collect();
    let columns: Vec<String> = value_idx
        .iter()
        .map(|&i| headers[i].trim().to_string())
        .collect();

    let mut rows: Vec<(NaiveDate, Vec<Option<f64>>)> = Vec::new();
    for result in rdr.records() {
        let record = result?;
        let raw = record.get(date_idx).unwrap_or_default().trim();
        let date = parse_library_date(raw).ok_or_else(|| LibraryError::BadDate {
            path: path.to_path_buf(),
            line: record.position().map(|p| p.line()).unwrap_or_default(),
            value: raw.to_string(),
        })?;
        let row = value_idx
            .iter()
            .map(|&i| record.get(i).and_then(|cell| cell.trim().parse::<f64>().ok()))
            .collect();
        rows.push((date, row));
    }
    // Stable, so same-date rows stay in file order.
    rows.sort_by_key(|(date, _)| *date);

    let (dates, values) = rows.into_iter().unzip();
    Ok(LibraryFrame {
        path: path.to_path_buf(),
        dates,
        columns,
        values,
    })
}

fn parse_library_date(raw: &str) -> Option<NaiveDate> {
    let day = raw.split(['T', ' ']).next().unwrap_or(raw);
    NaiveDate::parse_from_str(day, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(day, "%Y%m%d"))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(root: &Path, rel: &str, content: &str) -> PathBuf {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn daily_is_preferred_over_processed() {
        let dir = tempfile::tempdir().unwrap();
        let lib = DataLibrary::new(dir.path());
        write(
            dir.path(),
            "01_shared_data_library/factors/processed_data/px.csv",
            "Date,A\n2024-01-02,1\n",
        );
        let daily = write(
            dir.path(),
            "01_shared_data_library/factors/raw_data/daily/px.csv",
            "Date,A\n2024-01-02,2\n",
        );
        assert_eq!(lib.locate("factors", "px.csv").unwrap(), daily);
    }

    #[test]
    fn quarterly_is_found_when_daily_missing() {
        let dir = tempfile::tempdir().unwrap();
        let lib = DataLibrary::new(dir.path());
        let quarterly = write(
            dir.path(),
            "01_shared_data_library/macro/raw_data/quarterly/gdp.csv",
            "date,GDP\n2024-03-31,1.0\n",
        );
        assert_eq!(lib.locate("macro", "gdp.csv").unwrap(), quarterly);
    }

    #[test]
    fn missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let lib = DataLibrary::new(dir.path());
        let err = lib.locate("factors", "nope.csv").unwrap_err();
        assert!(matches!(err, LibraryError::NotFound { .. }));
    }

    #[test]
    fn load_indexes_by_date_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        let lib = DataLibrary::new(dir.path());
        write(
            dir.path(),
            "01_shared_data_library/eq/raw_data/daily/px.csv",
            "ticker_px,date,volume\n101.5,2024-01-03,10\n100.0,2024-01-02,\n",
        );
        let frame = lib.load("eq", "px.csv", "date").unwrap();
        assert_eq!(frame.columns, vec!["ticker_px", "volume"]);
        assert_eq!(
            frame.dates,
            vec![
                NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
                NaiveDate::from_ymd_opt(2024, 1, 3).unwrap()
            ]
        );
        assert_eq!(frame.column("ticker_px").unwrap(), vec![Some(100.0), Some(101.5)]);
        assert_eq!(frame.column("volume").unwrap(), vec![None, Some(10.0)]);
    }

    #[test]
    fn duplicate_dates_are_all_kept_in_file_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "dups.csv",
            "Date,px\n2024-01-03,3\n2024-01-02,1\n2024-01-03,4\n2024-01-02,2\n",
        );
        let frame = load_csv(&path, "Date").unwrap();
        assert_eq!(frame.len(), 4);
        assert_eq!(
            frame.column("px").unwrap(),
            vec![Some(1.0), Some(2.0), Some(3.0), Some(4.0)]
        );
        assert_eq!(frame.dates[0], frame.dates[1]);
    }

    #[test]
    fn missing_date_column_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let lib = DataLibrary::new(dir.path());
        write(
            dir.path(),
            "01_shared_data_library/eq/processed_data/px.csv",
            "when,px\n2024-01-02,1\n",
        );
        let err = lib.load("eq", "px.csv", "Date").unwrap_err();
        assert!(matches!(err, LibraryError::MissingDateColumn { .. }));
    }

    #[test]
    fn bad_date_is_reported_with_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "x.csv", "Date,px\n2024-01-02,1\nyesterday,2\n");
        match load_csv(&path, "Date").unwrap_err() {
            LibraryError::BadDate { line, value, .. } => {
                assert_eq!(line, 3);
                assert_eq!(value, "yesterday");
            }
            other => panic!("expected BadDate, got {other:?}"),
        }
    }
}
