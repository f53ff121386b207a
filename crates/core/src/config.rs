//! Configuration structures for the UFCNN pipeline.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::types::{ColumnId, BUY_THRESHOLD, SELL_THRESHOLD};

/// Main configuration for the pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Input data and cache locations.
    pub data: DataConfig,
    /// Signal-to-label thresholds.
    pub labels: LabelConfig,
    /// Related tick-file columns unified before combining statistics.
    pub tradcom: TradcomLayout,
    /// Network hyperparameters.
    pub model: ModelConfig,
    /// Train/test split.
    pub training: TrainingConfig,
}

impl Config {
    /// Load a configuration from a JSON file. Missing sections take defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }
}

/// Input data configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Directory holding tick and signal files.
    pub store_path: PathBuf,
    /// Tick file name prefix.
    pub tick_prefix: String,
    /// Tick file name suffix.
    pub tick_suffix: String,
    /// Directory for cached tensors.
    pub cache_dir: PathBuf,
    /// Raw columns to keep as model features.
    pub features_list: Vec<ColumnId>,
    /// Columns normalized jointly, one pooled mean/std per group.
    pub colgroups: Vec<Vec<ColumnId>>,
    /// How signal file names derive from tick file names.
    pub signal_naming: SignalNaming,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            store_path: PathBuf::from("./training_data_large"),
            tick_prefix: "prod_data_".to_string(),
            tick_suffix: "v.txt".to_string(),
            cache_dir: PathBuf::from("./training_data_large"),
            features_list: vec![1, 2, 3, 4, 5],
            colgroups: vec![vec![2, 4], vec![3, 5]],
            signal_naming: SignalNaming::default(),
        }
    }
}

/// Substitutions turning a tick file name into its signal file name.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalNaming {
    /// Marker in tick file names (e.g. "prod_data").
    pub tick_marker: String,
    /// Replacement marker for signal files (e.g. "signal").
    pub signal_marker: String,
    /// Tick file extension.
    pub tick_ext: String,
    /// Signal file extension.
    pub signal_ext: String,
}

impl Default for SignalNaming {
    fn default() -> Self {
        Self {
            tick_marker: "prod_data".to_string(),
            signal_marker: "signal".to_string(),
            tick_ext: "txt".to_string(),
            signal_ext: "csv".to_string(),
        }
    }
}

/// Signal thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelConfig {
    /// Signals strictly below this are sells.
    pub sell_below: f64,
    /// Signals strictly above this are buys.
    pub buy_above: f64,
}

impl Default for LabelConfig {
    fn default() -> Self {
        Self {
            sell_below: SELL_THRESHOLD,
            buy_above: BUY_THRESHOLD,
        }
    }
}

/// Tick-file columns that share a scale estimate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TradcomLayout {
    /// Market, bid and ask price columns.
    pub price_columns: Vec<ColumnId>,
    /// Bid and ask size columns.
    pub size_columns: Vec<ColumnId>,
}

impl Default for TradcomLayout {
    fn default() -> Self {
        Self {
            price_columns: vec![1, 2, 4],
            size_columns: vec![3, 5],
        }
    }
}

/// Network hyperparameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Window length, also the receptive field of the final convolution.
    pub sequence_length: usize,
    /// Filters per hidden convolution.
    pub nb_filter: usize,
    /// Hidden convolution width.
    pub filter_length: usize,
    /// Output channels.
    pub output_dim: usize,
    /// Merge mode: "concat" or "sum".
    pub mode: String,
    /// Hidden activation name.
    pub activation: String,
    /// Loss name: "mse" or "categorical_crossentropy".
    pub loss: String,
    /// Regression (raw output) instead of classification.
    pub regression: bool,
    /// Optimizer settings.
    pub optimizer: OptimizerConfig,
    /// Weight initialisation seed.
    pub seed: Option<u64>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            sequence_length: 500,
            nb_filter: 150,
            filter_length: 5,
            output_dim: 3,
            mode: "concat".to_string(),
            activation: "softplus".to_string(),
            loss: "categorical_crossentropy".to_string(),
            regression: false,
            optimizer: OptimizerConfig::default(),
            seed: None,
        }
    }
}

/// Optimizer settings handed to the training loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// "sgd", "rmsprop" or "adagrad".
    pub kind: String,
    pub learning_rate: f64,
    pub decay: f64,
    pub momentum: f64,
    pub nesterov: bool,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            kind: "sgd".to_string(),
            learning_rate: 0.01,
            decay: 1e-6,
            momentum: 0.9,
            nesterov: true,
        }
    }
}

/// Where the statistics applied to testing days come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatsSource {
    /// The statistics of the training preparation.
    #[default]
    Training,
    /// Tradcom statistics accumulated over the training files.
    Tradcom,
}

/// Train/test split over the sorted tick files.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Leading files used for training.
    pub training_count: usize,
    /// Files after the training files used for testing.
    pub testing_count: usize,
    pub test_stats: TestStatsSource,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            training_count: 2,
            testing_count: 2,
            test_stats: TestStatsSource::Training,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.data.features_list, vec![1, 2, 3, 4, 5]);
        assert_eq!(config.data.colgroups, vec![vec![2, 4], vec![3, 5]]);
        assert_eq!(config.labels.buy_above, 0.9);
        assert_eq!(config.tradcom.price_columns, vec![1, 2, 4]);
        assert_eq!(config.model.mode, "concat");
    }

    #[test]
    fn test_partial_json_takes_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"model": {{"sequence_length": 64, "mode": "sum"}}}}"#).unwrap();

        let config = Config::from_json_file(file.path()).unwrap();
        assert_eq!(config.model.sequence_length, 64);
        assert_eq!(config.model.mode, "sum");
        assert_eq!(config.model.nb_filter, 150);
        assert_eq!(config.training.training_count, 2);
        assert_eq!(config.training.test_stats, TestStatsSource::Training);
    }

    #[test]
    fn test_tradcom_test_stats_from_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"training": {{"test_stats": "tradcom"}}}}"#).unwrap();
        let config = Config::from_json_file(file.path()).unwrap();
        assert_eq!(config.training.test_stats, TestStatsSource::Tradcom);
        assert_eq!(config.training.testing_count, 2);
    }
}
