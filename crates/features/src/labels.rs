//! One-hot trade labels from scalar signals.

use ndarray::{Array2, ArrayView1};
use tracing::debug;
use ufcnn_core::config::LabelConfig;
use ufcnn_core::{ColumnId, FeatureTable, Label, Result};
use ufcnn_ingestion::SignalTable;

/// Column ids of a label table, in one-hot order (sell, hold, buy).
pub const LABEL_COLUMNS: [ColumnId; Label::COUNT] = [0, 1, 2];

/// Label every signal.
pub fn labels(signals: &[f64], config: &LabelConfig) -> Vec<Label> {
    signals
        .iter()
        .map(|&s| Label::from_signal(s, config.sell_below, config.buy_above))
        .collect()
}

/// One-hot label table sharing the signal table's index.
pub fn label_table(signals: &SignalTable, config: &LabelConfig) -> Result<FeatureTable> {
    let mut values = Array2::zeros((signals.len(), Label::COUNT));
    let mut counts = [0usize; Label::COUNT];
    for (i, label) in labels(signals.signals(), config).into_iter().enumerate() {
        values.row_mut(i).assign(&ArrayView1::from(&label.one_hot()[..]));
        counts[label.index()] += 1;
    }
    for label in Label::ALL {
        debug!(label = label.name(), count = counts[label.index()], "labelled rows");
    }
    FeatureTable::new(signals.keys().to_vec(), LABEL_COLUMNS.to_vec(), values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use ndarray::array;
    use ufcnn_core::RowKey;

    #[test]
    fn test_label_table_boundaries() {
        let date = NaiveDate::from_ymd_opt(2013, 7, 29).unwrap();
        let keys = (0..5).map(|i| RowKey::new(date, i)).collect();
        let signals = SignalTable::new(keys, vec![0.95, -0.95, 0.0, 0.9, -0.9]).unwrap();

        let table = label_table(&signals, &LabelConfig::default()).unwrap();
        assert_eq!(table.columns(), &LABEL_COLUMNS);
        assert_eq!(
            table.values(),
            &array![
                [0.0, 0.0, 1.0],
                [1.0, 0.0, 0.0],
                [0.0, 1.0, 0.0],
                [0.0, 1.0, 0.0],
                [0.0, 1.0, 0.0],
            ]
        );
        assert_eq!(table.keys(), signals.keys());
    }

    #[test]
    fn test_custom_thresholds() {
        let config = LabelConfig { sell_below: -0.5, buy_above: 0.5 };
        assert_eq!(labels(&[0.6, -0.6, 0.5], &config), vec![Label::Buy, Label::Sell, Label::Hold]);
    }
}
