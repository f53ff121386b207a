//! Grouped standardization.
//!
//! Columns listed together in a group share one pooled mean and one pooled
//! standard deviation, computed over every value of every member column, so
//! relative levels inside the group (bid vs ask price, bid vs ask size) are
//! preserved. Columns outside any group are standardized independently.
//!
//! A zero pooled (or per-column) standard deviation is not guarded against:
//! the division yields NaN or infinity.

use ndarray::Array2;
use statrs::statistics::Statistics;
use std::path::PathBuf;
use tracing::debug;
use ufcnn_core::{ColumnId, ColumnStats, Error, FeatureTable, NormalizationStats, Result};
use ufcnn_ingestion::read_tick_table;

/// Columns normalized jointly.
pub type ColumnGroup = Vec<ColumnId>;

/// Input to [`standardize_inputs`].
#[derive(Debug, Clone)]
pub enum Source {
    /// An in-memory table.
    Table(FeatureTable),
    /// A space-delimited file. Its trading date comes from the file name
    /// when the name carries one.
    Path(PathBuf),
}

impl Source {
    /// Materialize the source as a table.
    pub fn into_table(self) -> Result<FeatureTable> {
        match self {
            Source::Table(table) => Ok(table),
            Source::Path(path) if path.is_file() => read_tick_table(&path),
            Source::Path(path) => Err(Error::input_type(format!(
                "{} is neither a table nor a readable file",
                path.display()
            ))),
        }
    }
}

impl From<FeatureTable> for Source {
    fn from(table: FeatureTable) -> Self {
        Source::Table(table)
    }
}

impl From<PathBuf> for Source {
    fn from(path: PathBuf) -> Self {
        Source::Path(path)
    }
}

impl From<&std::path::Path> for Source {
    fn from(path: &std::path::Path) -> Self {
        Source::Path(path.to_path_buf())
    }
}

/// Standardize one column group with a pooled mean and population std.
///
/// Returns the group's columns standardized, plus the pooled statistics
/// assigned to every member column.
pub fn standardize_columns(
    table: &FeatureTable,
    group: &[ColumnId],
) -> Result<(FeatureTable, NormalizationStats)> {
    if group.is_empty() {
        return Err(Error::config("empty column group"));
    }
    let sub = table.select(group)?;
    let mean = sub.values().iter().mean();
    let std = sub.values().iter().population_std_dev();
    let pooled = ColumnStats::new(mean, std);

    let standardized = sub.values().mapv(|v| pooled.apply(v));
    let stats = group.iter().map(|&col| (col, pooled)).collect();
    Ok((sub.with_values(standardized)?, stats))
}

/// Check that groups name known columns and do not overlap.
fn validate_groups(table: &FeatureTable, colgroups: &[ColumnGroup]) -> Result<()> {
    let mut seen: Vec<ColumnId> = Vec::new();
    for group in colgroups {
        for &col in group {
            if table.column_position(col).is_none() {
                return Err(Error::config(format!(
                    "column group {group:?} names column {col}, which is not among {:?}",
                    table.columns()
                )));
            }
            if seen.contains(&col) {
                return Err(Error::config(format!("column {col} appears in more than one group")));
            }
            seen.push(col);
        }
    }
    Ok(())
}

/// Standardize a table by column groups.
///
/// Without `stats` (the training path) statistics are computed fresh: pooled
/// per group, and per column (sample std) for ungrouped columns. With `stats`
/// (the test path) the supplied statistics are applied verbatim and nothing
/// is recomputed, so test data never contributes to its own scaling.
///
/// Output columns keep the source order. The returned statistics are the
/// ones actually applied, one entry per column.
pub fn standardize_inputs(
    source: impl Into<Source>,
    colgroups: &[ColumnGroup],
    stats: Option<&NormalizationStats>,
) -> Result<(FeatureTable, NormalizationStats)> {
    let table = source.into().into_table()?;
    validate_groups(&table, colgroups)?;

    let effective = match stats {
        Some(supplied) => table
            .columns()
            .iter()
            .map(|&col| supplied.require(col).map(|s| (col, s)))
            .collect::<Result<NormalizationStats>>()?,
        None => fit(&table, colgroups)?,
    };

    let mut values = Array2::zeros(table.values().dim());
    for (pos, &col) in table.columns().iter().enumerate() {
        let column_stats = effective.require(col)?;
        values
            .column_mut(pos)
            .assign(&table.values().column(pos).mapv(|v| column_stats.apply(v)));
    }
    let standardized = table.with_values(values)?;

    for (pos, &col) in standardized.columns().iter().enumerate() {
        let column = standardized.values().column(pos);
        debug!(
            column = col,
            mean = column.iter().mean(),
            std = column.iter().std_dev(),
            "standardized column"
        );
    }

    Ok((standardized, effective))
}

/// Fresh statistics for every column of `table`.
fn fit(table: &FeatureTable, colgroups: &[ColumnGroup]) -> Result<NormalizationStats> {
    let mut stats = NormalizationStats::new();
    for group in colgroups {
        let (_, group_stats) = standardize_columns(table, group)?;
        for (col, s) in group_stats.iter() {
            stats.insert(col, s);
        }
    }

    let grouped: Vec<ColumnId> = colgroups.iter().flatten().copied().collect();
    for &col in table.columns().iter().filter(|col| !grouped.contains(col)) {
        let column = table.column(col)?;
        stats.insert(
            col,
            ColumnStats::new(column.iter().mean(), column.iter().std_dev()),
        );
    }
    Ok(stats)
}
