//! Core data types for the UFCNN pipeline.

use chrono::NaiveDate;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{Error, Result};

/// Intra-day timestamp in milliseconds.
pub type Millis = i64;

/// Raw feature column identifier (column position in the tick file).
///
/// Column 0 of a tick file is the timestamp, so feature columns start at 1.
pub type ColumnId = usize;

/// One row of per-column summary values (a mean row or a std row).
pub type ColumnSummary = BTreeMap<ColumnId, f64>;

/// Default signal threshold below which a row is labelled `Sell`.
pub const SELL_THRESHOLD: f64 = -0.9;

/// Default signal threshold above which a row is labelled `Buy`.
pub const BUY_THRESHOLD: f64 = 0.9;

/// Composite row index: trading day plus intra-day millisecond timestamp.
///
/// Ordering is by day first, then timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RowKey {
    /// Trading day.
    pub date: NaiveDate,
    /// Milliseconds into the trading day.
    pub millis: Millis,
}

impl RowKey {
    /// Create a new row key.
    pub fn new(date: NaiveDate, millis: Millis) -> Self {
        Self { date, millis }
    }
}

/// Three-way trade label derived from a scalar signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Label {
    Sell,
    Hold,
    Buy,
}

impl Label {
    /// All labels in one-hot column order.
    pub const ALL: [Label; 3] = [Label::Sell, Label::Hold, Label::Buy];

    /// Number of label classes.
    pub const COUNT: usize = 3;

    /// Classify a signal with strict thresholds: `signal < sell_below` sells,
    /// `signal > buy_above` buys, anything else holds.
    pub fn from_signal(signal: f64, sell_below: f64, buy_above: f64) -> Self {
        if signal < sell_below {
            Label::Sell
        } else if signal > buy_above {
            Label::Buy
        } else {
            Label::Hold
        }
    }

    /// Column position of this label in a one-hot row.
    #[inline]
    pub fn index(self) -> usize {
        match self {
            Label::Sell => 0,
            Label::Hold => 1,
            Label::Buy => 2,
        }
    }

    /// Label for a one-hot column position.
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// One-hot encoding.
    pub fn one_hot(self) -> [f64; 3] {
        let mut row = [0.0; 3];
        row[self.index()] = 1.0;
        row
    }

    /// Column name used in tabular output.
    pub fn name(self) -> &'static str {
        match self {
            Label::Sell => "sell",
            Label::Hold => "hold",
            Label::Buy => "buy",
        }
    }
}

/// Mean and standard deviation applied to one column.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColumnStats {
    pub mean: f64,
    pub std: f64,
}

impl ColumnStats {
    pub fn new(mean: f64, std: f64) -> Self {
        Self { mean, std }
    }

    /// Standardize a single value.
    #[inline]
    pub fn apply(&self, value: f64) -> f64 {
        (value - self.mean) / self.std
    }
}

/// Per-column normalization statistics.
///
/// Computed once from training data and threaded explicitly into every
/// test-time transformation. Members of a column group carry identical
/// values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizationStats {
    columns: BTreeMap<ColumnId, ColumnStats>,
}

impl NormalizationStats {
    /// Create empty statistics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild statistics from separate mean and std rows.
    ///
    /// Both rows must cover exactly the same columns.
    pub fn from_parts(means: &ColumnSummary, stds: &ColumnSummary) -> Result<Self> {
        if means.len() != stds.len() || means.keys().any(|col| !stds.contains_key(col)) {
            return Err(Error::data("mean and std rows cover different columns"));
        }
        let columns = means
            .iter()
            .map(|(&col, &mean)| (col, ColumnStats::new(mean, stds[&col])))
            .collect();
        Ok(Self { columns })
    }

    /// Set the statistics for a column.
    pub fn insert(&mut self, column: ColumnId, stats: ColumnStats) {
        self.columns.insert(column, stats);
    }

    /// Statistics for a column.
    pub fn get(&self, column: ColumnId) -> Option<ColumnStats> {
        self.columns.get(&column).copied()
    }

    /// Statistics for a column, failing with a configuration error if absent.
    pub fn require(&self, column: ColumnId) -> Result<ColumnStats> {
        self.get(column)
            .ok_or_else(|| Error::config(format!("no normalization statistics for column {column}")))
    }

    /// Iterate over (column, stats) in column order.
    pub fn iter(&self) -> impl Iterator<Item = (ColumnId, ColumnStats)> + '_ {
        self.columns.iter().map(|(&col, &stats)| (col, stats))
    }

    /// Columns covered.
    pub fn columns(&self) -> Vec<ColumnId> {
        self.columns.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// The mean row.
    pub fn means(&self) -> ColumnSummary {
        self.columns.iter().map(|(&col, s)| (col, s.mean)).collect()
    }

    /// The std row.
    pub fn stds(&self) -> ColumnSummary {
        self.columns.iter().map(|(&col, s)| (col, s.std)).collect()
    }

    /// Elementwise maximum of two sets of statistics.
    ///
    /// Means and stds are maximized independently. Columns present in only
    /// one side are carried over. The operation is commutative and
    /// associative; NaN orders above every number so degenerate statistics
    /// stay visible instead of being silently dropped.
    pub fn combine_max(&self, other: &NormalizationStats) -> NormalizationStats {
        let mut columns = self.columns.clone();
        for (&col, theirs) in &other.columns {
            columns
                .entry(col)
                .and_modify(|ours| {
                    ours.mean = max_f64(ours.mean, theirs.mean);
                    ours.std = max_f64(ours.std, theirs.std);
                })
                .or_insert(*theirs);
        }
        NormalizationStats { columns }
    }
}

impl FromIterator<(ColumnId, ColumnStats)> for NormalizationStats {
    fn from_iter<I: IntoIterator<Item = (ColumnId, ColumnStats)>>(iter: I) -> Self {
        Self {
            columns: iter.into_iter().collect(),
        }
    }
}

#[inline]
fn max_f64(a: f64, b: f64) -> f64 {
    OrderedFloat(a).max(OrderedFloat(b)).into_inner()
}
