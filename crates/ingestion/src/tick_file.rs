//! Tick file parsing.
//!
//! A tick file holds one trading day. Each line is a whitespace-delimited
//! record: the intra-day millisecond timestamp followed by numeric feature
//! columns. The trading date is the first run of digits in the file name.

use chrono::NaiveDate;
use csv::{ReaderBuilder, StringRecord, Trim};
use ndarray::Array2;
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;
use tracing::debug;
use ufcnn_core::{ColumnId, Error, FeatureTable, Millis, Result, RowKey};

fn date_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\D*(\d+)").expect("static date pattern"))
}

/// Extract the trading date embedded in a tick (or signal) file name.
///
/// `prod_data_20130729v.txt` yields 2013-07-29.
pub fn trading_date(path: &Path) -> Result<NaiveDate> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy())
        .ok_or_else(|| Error::data(format!("no file name in {}", path.display())))?;

    let digits = date_pattern()
        .captures(&name)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .ok_or_else(|| Error::data(format!("no date digits in file name {name}")))?;

    NaiveDate::parse_from_str(digits, "%Y%m%d")
        .map_err(|e| Error::data(format!("bad date {digits} in {name}: {e}")))
}

/// Non-empty fields of a space-delimited record. Runs of spaces collapse.
pub(crate) fn fields(record: &StringRecord) -> impl Iterator<Item = &str> {
    record.iter().filter(|field| !field.is_empty())
}

pub(crate) fn parse_number(field: &str, path: &Path, line: usize) -> Result<f64> {
    field.parse::<f64>().map_err(|_| {
        Error::data(format!(
            "{}:{}: not a number: {field:?}",
            path.display(),
            line
        ))
    })
}

pub(crate) fn parse_millis(field: &str, path: &Path, line: usize) -> Result<Millis> {
    let value = parse_number(field, path, line)?;
    if !value.is_finite() || value.fract() != 0.0 {
        return Err(Error::data(format!(
            "{}:{}: timestamp {field:?} is not a whole number of milliseconds",
            path.display(),
            line
        )));
    }
    Ok(value as Millis)
}

/// Read one day of ticks into a table indexed by (`date`, millisecond).
///
/// Feature columns are numbered from 1 in file order.
pub fn read_tick_file(path: &Path, date: NaiveDate) -> Result<FeatureTable> {
    let mut reader = ReaderBuilder::new()
        .delimiter(b' ')
        .has_headers(false)
        .flexible(true)
        .trim(Trim::All)
        .from_path(path)?;

    let mut keys = Vec::new();
    let mut cells = Vec::new();
    let mut width: Option<usize> = None;

    for (i, record) in reader.records().enumerate() {
        let record = record?;
        let line = i + 1;
        let mut it = fields(&record);
        let Some(ts) = it.next() else { continue };
        keys.push(RowKey::new(date, parse_millis(ts, path, line)?));

        let before = cells.len();
        for field in it {
            cells.push(parse_number(field, path, line)?);
        }
        let row_width = cells.len() - before;
        match width {
            None => width = Some(row_width),
            Some(w) if w != row_width => {
                return Err(Error::data(format!(
                    "{}:{}: expected {w} feature columns, found {row_width}",
                    path.display(),
                    line
                )));
            }
            _ => {}
        }
    }

    let width = width.unwrap_or(0);
    let columns: Vec<ColumnId> = (1..=width).collect();
    let values = Array2::from_shape_vec((keys.len(), width), cells)
        .map_err(|e| Error::shape(e.to_string()))?;
    debug!(path = %path.display(), rows = keys.len(), columns = width, "read tick file");

    FeatureTable::new(keys, columns, values)
}

/// Read a tick file, taking the date from its name.
///
/// A name without any digits is still read, with every row keyed on
/// [`NaiveDate::MIN`]. Digits that do not form a date are an error.
pub fn read_tick_table(path: &Path) -> Result<FeatureTable> {
    let dated = path
        .file_name()
        .is_some_and(|name| date_pattern().is_match(&name.to_string_lossy()));
    let date = if dated { trading_date(path)? } else { NaiveDate::MIN };
    read_tick_file(path, date)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(dir: &Path, name: &str, body: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(body.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_trading_date_from_name() {
        let date = trading_date(Path::new("./training_data_large/prod_data_20130729v.txt")).unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2013, 7, 29).unwrap());
    }

    #[test]
    fn test_trading_date_ignores_digits_in_directories() {
        let date = trading_date(Path::new("/data/2019/prod_data_20130801v.txt")).unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2013, 8, 1).unwrap());
    }

    #[test]
    fn test_trading_date_requires_digits() {
        assert!(trading_date(Path::new("prod_data_v.txt")).is_err());
        assert!(trading_date(Path::new("prod_data_2013v.txt")).is_err());
    }

    #[test]
    fn test_read_tick_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            dir.path(),
            "prod_data_20130729v.txt",
            "1000 10.5 10.0 3 11.0 4\n2000  10.6 10.1 5 11.1 2 \n\n3000 10.7 10.2 1 11.2 7\n",
        );
        let table = read_tick_table(&path).unwrap();
        assert_eq!(table.n_rows(), 3);
        assert_eq!(table.columns(), &[1, 2, 3, 4, 5]);
        assert_eq!(table.keys()[1].millis, 2000);
        assert_eq!(table.column(3).unwrap().to_vec(), vec![3.0, 5.0, 1.0]);
    }

    #[test]
    fn test_read_undated_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "features.txt", "0 1 10\n1000 2 20\n");
        let table = read_tick_table(&path).unwrap();
        assert_eq!(table.n_rows(), 2);
        assert!(table.keys().iter().all(|key| key.date == NaiveDate::MIN));

        let bad = write_file(dir.path(), "features_2013.txt", "0 1 10\n");
        assert!(matches!(read_tick_table(&bad), Err(Error::Data(_))));
    }

    #[test]
    fn test_read_tick_file_rejects_ragged_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "prod_data_20130729v.txt", "1000 1 2\n2000 1\n");
        assert!(matches!(read_tick_table(&path), Err(Error::Data(_))));
    }

    #[test]
    fn test_read_tick_file_rejects_unsorted_timestamps() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "prod_data_20130729v.txt", "2000 1\n1000 1\n");
        assert!(read_tick_table(&path).is_err());
    }
}
