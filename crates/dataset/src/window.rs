//! Output shapes: indexed table, stacked sliding windows, or one flat sequence.

use ndarray::{s, Array3, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ufcnn_core::{Error, FeatureTable, Result};

/// Requested output representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RetType {
    /// The standardized table, same index, no windowing.
    Df,
    /// `(rows - L + 1, L, features)` stride-1 sliding windows.
    Stack,
    /// `(1, rows, features)`: the whole input as one sequence.
    Flat,
}

impl RetType {
    pub fn as_str(self) -> &'static str {
        match self {
            RetType::Df => "df",
            RetType::Stack => "stack",
            RetType::Flat => "flat",
        }
    }

    /// Cache file extension: JSON table snapshots or binary arrays.
    pub fn file_extension(self) -> &'static str {
        match self {
            RetType::Df => "json",
            RetType::Stack | RetType::Flat => "bin",
        }
    }
}

impl FromStr for RetType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "df" => Ok(RetType::Df),
            "stack" => Ok(RetType::Stack),
            "flat" => Ok(RetType::Flat),
            other => Err(Error::config(format!(
                "unsupported ret_type {other:?}, expected df, stack or flat"
            ))),
        }
    }
}

impl fmt::Display for RetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A prepared X or y: either an indexed table or a dense tensor.
#[derive(Debug, Clone, PartialEq)]
pub enum Shaped {
    Table(FeatureTable),
    Tensor(Array3<f64>),
}

impl Shaped {
    pub fn as_table(&self) -> Option<&FeatureTable> {
        match self {
            Shaped::Table(table) => Some(table),
            Shaped::Tensor(_) => None,
        }
    }

    pub fn as_tensor(&self) -> Option<&Array3<f64>> {
        match self {
            Shaped::Tensor(tensor) => Some(tensor),
            Shaped::Table(_) => None,
        }
    }

    /// Shape as `(samples, time, channels)`; a table counts as one sample.
    pub fn dim(&self) -> (usize, usize, usize) {
        match self {
            Shaped::Table(table) => (1, table.n_rows(), table.n_cols()),
            Shaped::Tensor(tensor) => tensor.dim(),
        }
    }
}

/// Stride-1 windows of `sequence_length` rows.
///
/// Window `i` covers rows `i..i + sequence_length`, so its last row is row
/// `i + sequence_length - 1` of the source.
pub fn stack_windows(values: ArrayView2<'_, f64>, sequence_length: usize) -> Result<Array3<f64>> {
    if sequence_length == 0 {
        return Err(Error::config("sequence_length must be positive"));
    }
    let (rows, features) = values.dim();
    if rows < sequence_length {
        return Err(Error::data(format!(
            "{rows} rows cannot fill a window of {sequence_length}"
        )));
    }

    let count = rows - sequence_length + 1;
    let mut windows = Array3::zeros((count, sequence_length, features));
    for (i, mut window) in windows.outer_iter_mut().enumerate() {
        window.assign(&values.slice(s![i..i + sequence_length, ..]));
    }
    Ok(windows)
}

/// The whole input as a single `(1, rows, features)` sequence.
pub fn flat_sequence(values: ArrayView2<'_, f64>) -> Array3<f64> {
    values.to_owned().insert_axis(Axis(0))
}

/// Convert a table into the requested representation.
pub fn shape_table(table: FeatureTable, ret_type: RetType, sequence_length: usize) -> Result<Shaped> {
    Ok(match ret_type {
        RetType::Df => Shaped::Table(table),
        RetType::Stack => Shaped::Tensor(stack_windows(table.values().view(), sequence_length)?),
        RetType::Flat => Shaped::Tensor(flat_sequence(table.values().view())),
    })
}
