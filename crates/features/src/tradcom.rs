//! Conservative normalization statistics accumulated across tick files.
//!
//! Per-file column means and stds are first unified across related columns
//! (market/bid/ask price share the largest estimate, as do bid/ask size),
//! then folded into the running statistics by elementwise maximum. The
//! running statistics therefore only ever grow to cover the most extreme
//! scale seen so far.

use ordered_float::OrderedFloat;
use statrs::statistics::Statistics;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use ufcnn_core::config::TradcomLayout;
use ufcnn_core::{ColumnSummary, Error, FeatureTable, NormalizationStats, Result};
use ufcnn_ingestion::read_tick_table;

/// Replace every member of each related column set by the set's maximum.
///
/// Idempotent: applying it twice gives the same row as applying it once.
pub fn treat_tradcom(row: &ColumnSummary, layout: &TradcomLayout) -> Result<ColumnSummary> {
    let mut result = row.clone();
    for related in [&layout.price_columns, &layout.size_columns] {
        let max = related
            .iter()
            .map(|col| {
                row.get(col)
                    .map(|&v| OrderedFloat(v))
                    .ok_or_else(|| Error::data(format!("summary row has no column {col}")))
            })
            .collect::<Result<Vec<_>>>()?
            .into_iter()
            .max();
        if let Some(max) = max {
            for col in related.iter() {
                result.insert(*col, max.into_inner());
            }
        }
    }
    Ok(result)
}

/// Per-column mean and sample std rows of a table.
pub fn column_summary(table: &FeatureTable) -> (ColumnSummary, ColumnSummary) {
    let mut means = ColumnSummary::new();
    let mut stds = ColumnSummary::new();
    for (pos, &col) in table.columns().iter().enumerate() {
        let column = table.values().column(pos);
        means.insert(col, column.iter().mean());
        stds.insert(col, column.iter().std_dev());
    }
    (means, stds)
}

/// Treated statistics of a single table.
pub fn tradcom_statistics(table: &FeatureTable, layout: &TradcomLayout) -> Result<NormalizationStats> {
    let (means, stds) = column_summary(table);
    let means = treat_tradcom(&means, layout)?;
    let stds = treat_tradcom(&stds, layout)?;
    NormalizationStats::from_parts(&means, &stds)
}

/// Fold one tick file into the running statistics.
///
/// With no `prior` the file's own treated statistics are returned.
pub fn tradcom_normalization(
    path: &Path,
    prior: Option<&NormalizationStats>,
    layout: &TradcomLayout,
) -> Result<NormalizationStats> {
    let table = read_tick_table(path)?;
    let local = tradcom_statistics(&table, layout)?;
    debug!(path = %path.display(), means = ?local.means(), stds = ?local.stds(), "file statistics");

    Ok(match prior {
        Some(prior) => prior.combine_max(&local),
        None => local,
    })
}

/// Accumulate statistics over several tick files in order.
///
/// Any unreadable file aborts the whole aggregation.
pub fn accumulate_tradcom_normalization(
    paths: &[PathBuf],
    layout: &TradcomLayout,
) -> Result<NormalizationStats> {
    let mut stats: Option<NormalizationStats> = None;
    for path in paths {
        info!(path = %path.display(), "normalizing");
        stats = Some(tradcom_normalization(path, stats.as_ref(), layout)?);
    }
    stats.ok_or_else(|| Error::config("no files to normalize"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn layout() -> TradcomLayout {
        TradcomLayout::default()
    }

    fn row() -> ColumnSummary {
        [(1, 100.5), (2, 100.0), (3, 12.0), (4, 101.0), (5, 9.0), (6, 0.3)]
            .into_iter()
            .collect()
    }

    fn write_ticks(dir: &Path, date: &str, rows: &[[f64; 6]]) -> PathBuf {
        let path = dir.join(format!("prod_data_{date}v.txt"));
        let body: String = rows
            .iter()
            .enumerate()
            .map(|(i, r)| {
                let cells: Vec<String> = r.iter().map(|v| v.to_string()).collect();
                format!("{} {}\n", i * 1000, cells.join(" "))
            })
            .collect();
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_treat_unifies_related_columns() {
        let treated = treat_tradcom(&row(), &layout()).unwrap();
        assert_eq!(treated[&1], 101.0);
        assert_eq!(treated[&2], 101.0);
        assert_eq!(treated[&4], 101.0);
        assert_eq!(treated[&3], 12.0);
        assert_eq!(treated[&5], 12.0);
        assert_eq!(treated[&6], 0.3);
    }

    #[test]
    fn test_treat_is_idempotent() {
        let once = treat_tradcom(&row(), &layout()).unwrap();
        let twice = treat_tradcom(&once, &layout()).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_treat_requires_related_columns() {
        let mut partial = row();
        partial.remove(&5);
        assert!(treat_tradcom(&partial, &layout()).is_err());
    }

    #[test]
    fn test_normalization_grows_monotonically_and_commutes() {
        let dir = tempfile::tempdir().unwrap();
        let full = [
            [100.0, 99.0, 10.0, 101.0, 12.0, 1.0],
            [102.0, 100.0, 20.0, 102.0, 8.0, 2.0],
            [90.0, 89.0, 15.0, 91.0, 11.0, 3.0],
            [104.0, 101.0, 30.0, 103.0, 5.0, 4.0],
        ];
        let a = write_ticks(dir.path(), "20130729", &full);
        let b = write_ticks(dir.path(), "20130730", &full[..2]);

        let half = tradcom_normalization(&b, None, &layout()).unwrap();
        let both = tradcom_normalization(&a, Some(&half), &layout()).unwrap();
        for (col, stats) in both.iter() {
            let h = half.get(col).unwrap();
            assert!(stats.mean >= h.mean);
            assert!(stats.std >= h.std);
        }

        let ab = tradcom_normalization(&b, Some(&tradcom_normalization(&a, None, &layout()).unwrap()), &layout())
            .unwrap();
        assert_eq!(ab, both);

        let folded = accumulate_tradcom_normalization(&[a.clone(), b.clone()], &layout()).unwrap();
        assert_eq!(folded, both);
    }

    #[test]
    fn test_same_file_twice_is_stable() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_ticks(dir.path(), "20130729", &[[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], [2.0, 3.0, 4.0, 5.0, 6.0, 8.0]]);
        let once = tradcom_normalization(&a, None, &layout()).unwrap();
        let twice = tradcom_normalization(&a, Some(&once), &layout()).unwrap();
        assert_eq!(once, twice);
        assert_relative_eq!(once.get(6).unwrap().mean, 7.0);
        assert_eq!(once.get(1), once.get(4));
    }

    #[test]
    fn test_missing_file_aborts_aggregation() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("prod_data_20130731v.txt");
        assert!(accumulate_tradcom_normalization(&[missing], &layout()).is_err());
    }
}
