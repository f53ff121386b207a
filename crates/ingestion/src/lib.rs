//! Data ingestion for the UFCNN pipeline.
//!
//! This crate handles:
//! - Tick file parsing (whitespace-delimited, millisecond index)
//! - Signal file parsing and the tick-to-signal naming convention
//! - Trading date extraction from file names
//! - Loading runs of trading days into one indexed table

pub mod tick_file;
pub mod signal_file;
pub mod loader;

pub use tick_file::{read_tick_file, read_tick_table, trading_date};
pub use signal_file::{read_signal_file, signal_path, SignalTable};
pub use loader::{discover_tick_files, load_days, DayFiles, LoadedDays};
