//! Signal file parsing.
//!
//! A signal file accompanies each tick file and holds one scalar trading
//! signal per timestamp as comma-delimited `Milliseconds,signal` rows.

use chrono::NaiveDate;
use csv::{ReaderBuilder, Trim};
use std::path::{Path, PathBuf};
use tracing::debug;
use ufcnn_core::config::SignalNaming;
use ufcnn_core::{Error, Result, RowKey};

use crate::tick_file::{parse_millis, parse_number};

/// Per-timestamp signal values sharing the feature table's index.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SignalTable {
    keys: Vec<RowKey>,
    signals: Vec<f64>,
}

impl SignalTable {
    /// Create a signal table; keys must be strictly increasing.
    pub fn new(keys: Vec<RowKey>, signals: Vec<f64>) -> Result<Self> {
        if keys.len() != signals.len() {
            return Err(Error::shape(format!(
                "{} keys for {} signals",
                keys.len(),
                signals.len()
            )));
        }
        if let Some(pair) = keys.windows(2).find(|pair| pair[0] >= pair[1]) {
            return Err(Error::data(format!(
                "signal index not strictly increasing at {:?}",
                pair[1]
            )));
        }
        Ok(Self { keys, signals })
    }

    pub fn keys(&self) -> &[RowKey] {
        &self.keys
    }

    pub fn signals(&self) -> &[f64] {
        &self.signals
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Append the rows of `other`, which must continue the index.
    pub fn append(&mut self, other: SignalTable) -> Result<()> {
        if let (Some(last), Some(first)) = (self.keys.last(), other.keys.first()) {
            if first <= last {
                return Err(Error::data(format!(
                    "appended signals start at {first:?}, not after {last:?}"
                )));
            }
        }
        self.keys.extend(other.keys);
        self.signals.extend(other.signals);
        Ok(())
    }
}

/// Signal file path for a tick file.
///
/// Substitutes the markers in the file name only, so directory names are
/// never rewritten: `prod_data_20130729v.txt` becomes `signal_20130729v.csv`.
pub fn signal_path(tick_path: &Path, naming: &SignalNaming) -> PathBuf {
    let name = tick_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = name
        .replace(&naming.tick_marker, &naming.signal_marker)
        .replace(&naming.tick_ext, &naming.signal_ext);
    tick_path.with_file_name(name)
}

/// Read one day of signals indexed by (`date`, millisecond).
///
/// A leading `Milliseconds,signal` header row is skipped if present.
pub fn read_signal_file(path: &Path, date: NaiveDate) -> Result<SignalTable> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .trim(Trim::All)
        .from_path(path)?;

    let mut keys = Vec::new();
    let mut signals = Vec::new();

    for (i, record) in reader.records().enumerate() {
        let record = record?;
        let line = i + 1;
        if record.len() != 2 {
            return Err(Error::data(format!(
                "{}:{}: expected 2 fields, found {}",
                path.display(),
                line,
                record.len()
            )));
        }
        if i == 0 && record[0].eq_ignore_ascii_case("milliseconds") {
            continue;
        }
        keys.push(RowKey::new(date, parse_millis(&record[0], path, line)?));
        signals.push(parse_number(&record[1], path, line)?);
    }
    debug!(path = %path.display(), rows = keys.len(), "read signal file");

    SignalTable::new(keys, signals)
}
