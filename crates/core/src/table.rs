//! Feature table indexed by (trading day, millisecond) keys.

use chrono::NaiveDate;
use ndarray::{concatenate, s, Array2, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use std::ops::Range;

use crate::error::{Error, Result};
use crate::types::{ColumnId, RowKey};

/// Two-dimensional numeric table with a strictly increasing composite index.
///
/// Rows are indexed by [`RowKey`]; columns by raw [`ColumnId`]. The index is
/// validated on construction and on every append.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureTable {
    keys: Vec<RowKey>,
    columns: Vec<ColumnId>,
    values: Array2<f64>,
}

impl FeatureTable {
    /// Create a table, validating shape, index order and column uniqueness.
    pub fn new(keys: Vec<RowKey>, columns: Vec<ColumnId>, values: Array2<f64>) -> Result<Self> {
        if values.nrows() != keys.len() {
            return Err(Error::shape(format!(
                "{} keys for {} rows",
                keys.len(),
                values.nrows()
            )));
        }
        if values.ncols() != columns.len() {
            return Err(Error::shape(format!(
                "{} column ids for {} columns",
                columns.len(),
                values.ncols()
            )));
        }
        check_unique_columns(&columns)?;
        check_increasing(&keys)?;
        Ok(Self { keys, columns, values })
    }

    /// An empty table with the given columns.
    pub fn empty(columns: Vec<ColumnId>) -> Self {
        let width = columns.len();
        Self {
            keys: Vec::new(),
            columns,
            values: Array2::zeros((0, width)),
        }
    }

    /// Row index.
    pub fn keys(&self) -> &[RowKey] {
        &self.keys
    }

    /// Column identifiers in storage order.
    pub fn columns(&self) -> &[ColumnId] {
        &self.columns
    }

    /// Cell values, rows by columns.
    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    pub fn n_rows(&self) -> usize {
        self.keys.len()
    }

    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Storage position of a column.
    pub fn column_position(&self, column: ColumnId) -> Option<usize> {
        self.columns.iter().position(|&c| c == column)
    }

    /// View of one column.
    pub fn column(&self, column: ColumnId) -> Result<ArrayView1<'_, f64>> {
        let pos = self
            .column_position(column)
            .ok_or_else(|| Error::data(format!("unknown column {column}")))?;
        Ok(self.values.column(pos))
    }

    /// View of one row.
    pub fn row(&self, index: usize) -> ArrayView1<'_, f64> {
        self.values.row(index)
    }

    /// New table restricted to `columns`, in the requested order.
    pub fn select(&self, columns: &[ColumnId]) -> Result<FeatureTable> {
        check_unique_columns(columns)?;
        let positions = columns
            .iter()
            .map(|&col| {
                self.column_position(col)
                    .ok_or_else(|| Error::data(format!("unknown column {col}")))
            })
            .collect::<Result<Vec<_>>>()?;
        let values = self.values.select(Axis(1), &positions);
        Ok(Self {
            keys: self.keys.clone(),
            columns: columns.to_vec(),
            values,
        })
    }

    /// Same index and columns with replacement values.
    pub fn with_values(&self, values: Array2<f64>) -> Result<FeatureTable> {
        if values.dim() != self.values.dim() {
            return Err(Error::shape(format!(
                "expected {:?} values, got {:?}",
                self.values.dim(),
                values.dim()
            )));
        }
        Ok(Self {
            keys: self.keys.clone(),
            columns: self.columns.clone(),
            values,
        })
    }

    /// Append the rows of `other`, which must continue the index.
    pub fn append(&mut self, other: FeatureTable) -> Result<()> {
        if other.columns != self.columns {
            return Err(Error::data(format!(
                "column mismatch on append: {:?} vs {:?}",
                self.columns, other.columns
            )));
        }
        if let (Some(last), Some(first)) = (self.keys.last(), other.keys.first()) {
            if first <= last {
                return Err(Error::data(format!(
                    "appended rows start at {first:?}, not after {last:?}"
                )));
            }
        }
        self.values = concatenate(Axis(0), &[self.values.view(), other.values.view()])
            .map_err(|e| Error::shape(e.to_string()))?;
        self.keys.extend(other.keys);
        Ok(())
    }

    /// Concatenate tables in order.
    pub fn concat(tables: impl IntoIterator<Item = FeatureTable>) -> Result<FeatureTable> {
        let mut tables = tables.into_iter();
        let mut result = tables
            .next()
            .ok_or_else(|| Error::data("nothing to concatenate"))?;
        for table in tables {
            result.append(table)?;
        }
        Ok(result)
    }

    /// Distinct trading days with their row ranges, in day order.
    pub fn day_ranges(&self) -> Vec<(NaiveDate, Range<usize>)> {
        let mut ranges: Vec<(NaiveDate, Range<usize>)> = Vec::new();
        for (i, key) in self.keys.iter().enumerate() {
            match ranges.last_mut() {
                Some((date, range)) if *date == key.date => range.end = i + 1,
                _ => ranges.push((key.date, i..i + 1)),
            }
        }
        ranges
    }

    /// Distinct trading days, in order.
    pub fn days(&self) -> Vec<NaiveDate> {
        self.day_ranges().into_iter().map(|(date, _)| date).collect()
    }

    /// Rows belonging to one trading day.
    pub fn day_values(&self, date: NaiveDate) -> Option<ArrayView2<'_, f64>> {
        self.day_ranges()
            .into_iter()
            .find(|(d, _)| *d == date)
            .map(|(_, range)| self.values.slice(s![range, ..]))
    }
}

fn check_increasing(keys: &[RowKey]) -> Result<()> {
    if let Some(pair) = keys.windows(2).find(|pair| pair[0] >= pair[1]) {
        return Err(Error::data(format!(
            "index not strictly increasing: {:?} followed by {:?}",
            pair[0], pair[1]
        )));
    }
    Ok(())
}

fn check_unique_columns(columns: &[ColumnId]) -> Result<()> {
    for (i, col) in columns.iter().enumerate() {
        if columns[..i].contains(col) {
            return Err(Error::data(format!("duplicate column {col}")));
        }
    }
    Ok(())
}
