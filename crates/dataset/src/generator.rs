//! Endless per-day batches for streaming training.

use chrono::NaiveDate;
use ndarray::{Array3, Axis};
use std::ops::Range;
use tracing::debug;
use ufcnn_core::{Error, FeatureTable, Result};

/// One trading day as a single `(1, rows, channels)` sample.
#[derive(Debug, Clone, PartialEq)]
pub struct DayBatch {
    pub date: NaiveDate,
    pub input: Array3<f64>,
    pub output: Array3<f64>,
}

/// Cycles through the trading days of an (X, y) pair in date order, forever.
///
/// `next` always returns `Some`; the consumer decides when to stop pulling.
/// Each call to `next` is a cancellation point between days.
#[derive(Debug, Clone)]
pub struct DayCycle<'a> {
    x: &'a FeatureTable,
    y: &'a FeatureTable,
    days: Vec<(NaiveDate, Range<usize>)>,
    position: usize,
}

impl<'a> DayCycle<'a> {
    /// Number of distinct days in one cycle.
    pub fn days_per_cycle(&self) -> usize {
        self.days.len()
    }

    /// Start again from the first day.
    pub fn restart(&mut self) {
        self.position = 0;
    }
}

impl Iterator for DayCycle<'_> {
    type Item = DayBatch;

    fn next(&mut self) -> Option<DayBatch> {
        let (date, rows) = self.days[self.position].clone();
        self.position = (self.position + 1) % self.days.len();

        let input = self.x.values().slice_axis(Axis(0), rows.clone().into()).to_owned();
        let output = self.y.values().slice_axis(Axis(0), rows.into()).to_owned();
        Some(DayBatch {
            date,
            input: input.insert_axis(Axis(0)),
            output: output.insert_axis(Axis(0)),
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (usize::MAX, None)
    }
}

/// Build the day cycle for a feature table and its label table.
///
/// The two tables must share the same index; a mismatch or an empty table is
/// rejected here rather than surfacing as misaligned batches later.
pub fn generator<'a>(x: &'a FeatureTable, y: &'a FeatureTable) -> Result<DayCycle<'a>> {
    if x.keys() != y.keys() {
        return Err(Error::data(format!(
            "X and y indices differ ({} vs {} rows)",
            x.n_rows(),
            y.n_rows()
        )));
    }
    let days = x.day_ranges();
    if days.is_empty() {
        return Err(Error::data("cannot cycle over an empty table"));
    }
    debug!(days = days.len(), rows = x.n_rows(), "day generator ready");
    Ok(DayCycle { x, y, days, position: 0 })
}
