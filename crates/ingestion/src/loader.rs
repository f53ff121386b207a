//! Multi-day loading of tick and signal files.

use chrono::NaiveDate;
use std::path::{Path, PathBuf};
use tracing::info;
use ufcnn_core::config::SignalNaming;
use ufcnn_core::{Error, FeatureTable, Result};

use crate::signal_file::{read_signal_file, signal_path, SignalTable};
use crate::tick_file::{read_tick_file, trading_date};

/// The pair of files making up one trading day.
#[derive(Debug, Clone, PartialEq)]
pub struct DayFiles {
    pub date: NaiveDate,
    pub tick: PathBuf,
    pub signal: PathBuf,
}

impl DayFiles {
    /// Resolve the signal file and date for a tick file.
    ///
    /// Fails with [`Error::MissingFile`] if the signal file does not exist.
    pub fn resolve(tick: &Path, naming: &SignalNaming) -> Result<Self> {
        let signal = signal_path(tick, naming);
        if !signal.is_file() {
            return Err(Error::missing_file(signal));
        }
        Ok(Self {
            date: trading_date(tick)?,
            tick: tick.to_path_buf(),
            signal,
        })
    }
}

/// Features and signals for a run of trading days, sharing one index.
#[derive(Debug, Clone)]
pub struct LoadedDays {
    pub features: FeatureTable,
    pub signals: SignalTable,
}

/// Load and concatenate the given tick files with their signal files.
///
/// Every day is resolved before any file is read, so a single missing signal
/// file aborts the whole run. Files must be in increasing date order.
pub fn load_days(tick_files: &[PathBuf], naming: &SignalNaming) -> Result<LoadedDays> {
    if tick_files.is_empty() {
        return Err(Error::config("no tick files given"));
    }
    let days = tick_files
        .iter()
        .map(|path| DayFiles::resolve(path, naming))
        .collect::<Result<Vec<_>>>()?;

    let mut features = Vec::with_capacity(days.len());
    let mut signals = SignalTable::default();

    for day in days {
        info!(
            tick = %day.tick.display(),
            signal = %day.signal.display(),
            date = %day.date,
            "loading trading day"
        );
        features.push(read_tick_file(&day.tick, day.date)?);
        signals.append(read_signal_file(&day.signal, day.date)?)?;
    }

    let features = FeatureTable::concat(features)?;
    Ok(LoadedDays { features, signals })
}

/// Sorted tick files in `dir` whose names start with `prefix` and end with `suffix`.
pub fn discover_tick_files(dir: &Path, prefix: &str, suffix: &str) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let matches = path
            .file_name()
            .map(|n| n.to_string_lossy())
            .map(|n| n.starts_with(prefix) && n.ends_with(suffix))
            .unwrap_or(false);
        if matches && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}
