//! Training-ready tensors from raw tick and signal files.

use std::path::PathBuf;
use tracing::{debug, info};
use ufcnn_core::config::{Config, LabelConfig, SignalNaming};
use ufcnn_core::{ColumnId, Error, Label, NormalizationStats, Result};
use ufcnn_features::{label_table, standardize_inputs, ColumnGroup};
use ufcnn_ingestion::load_days;

use crate::cache::{CacheKey, CacheRole, DiskCache};
use crate::window::{shape_table, RetType, Shaped};

/// Arguments of [`Windower::prepare_classification`].
#[derive(Debug, Clone)]
pub struct ClassificationRequest {
    /// Training computes fresh statistics; testing applies `stats`.
    pub training: bool,
    pub ret_type: RetType,
    pub sequence_length: usize,
    /// Raw tick columns kept as features, in output order.
    pub features_list: Vec<ColumnId>,
    pub output_dim: usize,
    /// Tick files, one per trading day, in date order.
    pub file_list: Vec<PathBuf>,
    /// Training statistics; required when testing, forbidden when training.
    pub stats: Option<NormalizationStats>,
    /// Number of training files; required when testing, part of the cache key.
    pub training_count: Option<usize>,
}

impl ClassificationRequest {
    /// A training request with fresh statistics.
    pub fn training(
        ret_type: RetType,
        sequence_length: usize,
        features_list: Vec<ColumnId>,
        file_list: Vec<PathBuf>,
    ) -> Self {
        Self {
            training: true,
            ret_type,
            sequence_length,
            features_list,
            output_dim: Label::COUNT,
            file_list,
            stats: None,
            training_count: None,
        }
    }

    /// A testing request reusing the training statistics.
    pub fn testing(
        ret_type: RetType,
        sequence_length: usize,
        features_list: Vec<ColumnId>,
        file_list: Vec<PathBuf>,
        stats: NormalizationStats,
        training_count: usize,
    ) -> Self {
        Self {
            training: false,
            ret_type,
            sequence_length,
            features_list,
            output_dim: Label::COUNT,
            file_list,
            stats: Some(stats),
            training_count: Some(training_count),
        }
    }

    /// Reject inconsistent arguments before any file is touched.
    pub fn validate(&self) -> Result<()> {
        if self.training && self.stats.is_some() {
            return Err(Error::config("statistics must not be supplied when training"));
        }
        if !self.training {
            if self.stats.is_none() {
                return Err(Error::config("training statistics are required for testing"));
            }
            if self.training_count.is_none() {
                return Err(Error::config("training_count is required for testing"));
            }
        }
        if self.output_dim != Label::COUNT {
            return Err(Error::config(format!(
                "output_dim {} does not match the {} trade labels",
                self.output_dim,
                Label::COUNT
            )));
        }
        if self.ret_type == RetType::Stack && self.sequence_length == 0 {
            return Err(Error::config("sequence_length must be positive for stacked windows"));
        }
        if self.file_list.is_empty() {
            return Err(Error::config("file_list is empty"));
        }
        if self.features_list.is_empty() {
            return Err(Error::config("features_list is empty"));
        }
        Ok(())
    }

    fn cache_key(&self) -> CacheKey {
        let role = match (self.training, self.training_count) {
            (false, Some(training_count)) => CacheRole::Testing { training_count },
            _ => CacheRole::Training,
        };
        CacheKey {
            file_count: self.file_list.len(),
            role,
            ret_type: self.ret_type,
        }
    }
}

/// Prepared X and y with the statistics that produced X.
#[derive(Debug, Clone, PartialEq)]
pub struct Prepared {
    pub x: Shaped,
    pub y: Shaped,
    pub stats: NormalizationStats,
}

/// Loads, normalizes, labels and windows trading days, memoized on disk.
#[derive(Debug, Clone)]
pub struct Windower {
    cache: DiskCache,
    colgroups: Vec<ColumnGroup>,
    labels: LabelConfig,
    naming: SignalNaming,
}

impl Windower {
    pub fn new(
        cache: DiskCache,
        colgroups: Vec<ColumnGroup>,
        labels: LabelConfig,
        naming: SignalNaming,
    ) -> Self {
        Self { cache, colgroups, labels, naming }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            DiskCache::new(&config.data.cache_dir),
            config.data.colgroups.clone(),
            config.labels.clone(),
            config.data.signal_naming.clone(),
        )
    }

    pub fn cache(&self) -> &DiskCache {
        &self.cache
    }

    /// Build (X, y) for the given trading days.
    ///
    /// An existing cache entry for the request's key is returned as is; on a
    /// testing hit the supplied statistics are passed through.
    pub fn prepare_classification(&self, request: &ClassificationRequest) -> Result<Prepared> {
        request.validate()?;
        let key = request.cache_key();

        if let Some(entry) = self.cache.load(&key)? {
            let stats = match (entry.stats, &request.stats) {
                (_, Some(supplied)) => supplied.clone(),
                (Some(cached), None) => cached,
                (None, None) => return Err(Error::data("cached training entry has no statistics")),
            };
            return Ok(Prepared { x: entry.x, y: entry.y, stats });
        }

        info!(
            files = request.file_list.len(),
            training = request.training,
            ret_type = %request.ret_type,
            features = ?request.features_list,
            "preparing classification data"
        );

        let days = load_days(&request.file_list, &self.naming)?;
        let features = days.features.select(&request.features_list)?;
        let (features, stats) =
            standardize_inputs(features, &self.colgroups, request.stats.as_ref())?;

        if features.keys() != days.signals.keys() {
            return Err(Error::data(format!(
                "tick and signal indices differ ({} vs {} rows)",
                features.n_rows(),
                days.signals.len()
            )));
        }
        let labels = label_table(&days.signals, &self.labels)?;

        let x = shape_table(features, request.ret_type, request.sequence_length)?;
        let y = shape_table(labels, request.ret_type, request.sequence_length)?;
        debug!(x = ?x.dim(), y = ?y.dim(), "shaped tensors");

        self.cache.store(&key, &x, &y, &stats)?;
        Ok(Prepared { x, y, stats })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::path::Path;
    use ufcnn_core::ColumnStats;

    fn write_day(dir: &Path, date: &str, rows: &[(i64, [f64; 5], f64)]) -> PathBuf {
        let tick = dir.join(format!("prod_data_{date}v.txt"));
        let signal = dir.join(format!("signal_{date}v.csv"));
        let mut tick_body = String::new();
        let mut signal_body = String::from("Milliseconds,signal\n");
        for (ms, values, s) in rows {
            let cells: Vec<String> = values.iter().map(|v| v.to_string()).collect();
            tick_body.push_str(&format!("{ms} {}\n", cells.join(" ")));
            signal_body.push_str(&format!("{ms},{s}\n"));
        }
        std::fs::write(&tick, tick_body).unwrap();
        std::fs::write(&signal, signal_body).unwrap();
        tick
    }

    fn fixture(dir: &Path) -> Vec<PathBuf> {
        vec![
            write_day(
                dir,
                "20130729",
                &[
                    (0, [100.0, 99.0, 10.0, 101.0, 12.0], 0.95),
                    (1000, [102.0, 100.0, 20.0, 102.0, 8.0], 0.0),
                    (2000, [101.0, 98.0, 15.0, 100.0, 11.0], -0.95),
                ],
            ),
            write_day(
                dir,
                "20130730",
                &[
                    (0, [104.0, 101.0, 30.0, 103.0, 5.0], 0.9),
                    (500, [103.0, 102.0, 25.0, 104.0, 7.0], 0.1),
                ],
            ),
        ]
    }

    fn windower(dir: &Path) -> Windower {
        Windower::new(
            DiskCache::new(dir.join("cache")),
            vec![vec![2, 4], vec![3, 5]],
            LabelConfig::default(),
            SignalNaming::default(),
        )
    }

    #[test]
    fn test_validation() {
        let files = vec![PathBuf::from("prod_data_20130729v.txt")];
        let mut train = ClassificationRequest::training(RetType::Df, 3, vec![1, 2], files.clone());
        assert!(train.validate().is_ok());

        train.stats = Some(NormalizationStats::new());
        assert!(train.validate().unwrap_err().is_config());

        let mut test = ClassificationRequest::testing(RetType::Df, 3, vec![1, 2], files, NormalizationStats::new(), 2);
        assert!(test.validate().is_ok());
        test.training_count = None;
        assert!(test.validate().unwrap_err().is_config());
        test.training_count = Some(2);
        test.stats = None;
        assert!(test.validate().unwrap_err().is_config());

        let mut wide = ClassificationRequest::training(RetType::Stack, 0, vec![1], vec![PathBuf::from("a")]);
        assert!(wide.validate().unwrap_err().is_config());
        wide.sequence_length = 2;
        wide.output_dim = 4;
        assert!(wide.validate().unwrap_err().is_config());
    }

    #[test]
    fn test_training_df_then_cache_hit() {
        let dir = tempfile::tempdir().unwrap();
        let files = fixture(dir.path());
        let windower = windower(dir.path());
        let request = ClassificationRequest::training(RetType::Df, 2, vec![1, 2, 3, 4, 5], files.clone());

        let prepared = windower.prepare_classification(&request).unwrap();
        let x = prepared.x.as_table().unwrap();
        let y = prepared.y.as_table().unwrap();
        assert_eq!(x.n_rows(), 5);
        assert_eq!(x.keys(), y.keys());
        assert_eq!(y.row(0).to_vec(), vec![0.0, 0.0, 1.0]);
        assert_eq!(y.row(2).to_vec(), vec![1.0, 0.0, 0.0]);
        assert_eq!(y.row(3).to_vec(), vec![0.0, 1.0, 0.0]);
        assert_eq!(prepared.stats.get(2), prepared.stats.get(4));
        assert_abs_diff_eq!(x.column(1).unwrap().sum(), 0.0, epsilon = 1e-9);

        // A second call is served from disk, even though the inputs are gone.
        for file in &files {
            std::fs::remove_file(file).unwrap();
        }
        let cached = windower.prepare_classification(&request).unwrap();
        assert_eq!(cached, prepared);
    }

    #[test]
    fn test_constant_column_is_served_from_cache() {
        let dir = tempfile::tempdir().unwrap();
        let files = vec![write_day(
            dir.path(),
            "20130729",
            &[
                (0, [5.0, 99.0, 10.0, 101.0, 12.0], 0.95),
                (1000, [5.0, 100.0, 20.0, 102.0, 8.0], 0.0),
                (2000, [5.0, 98.0, 15.0, 100.0, 11.0], -0.95),
            ],
        )];
        let windower = windower(dir.path());
        let request = ClassificationRequest::training(RetType::Df, 2, vec![1, 2, 3, 4, 5], files);

        let first = windower.prepare_classification(&request).unwrap();
        assert!(first.x.as_table().unwrap().column(1).unwrap().iter().all(|v| v.is_nan()));

        for _ in 0..2 {
            let again = windower.prepare_classification(&request).unwrap();
            let x = again.x.as_table().unwrap();
            assert!(x.column(1).unwrap().iter().all(|v| v.is_nan()));
            assert_eq!(x.column(2).unwrap(), first.x.as_table().unwrap().column(2).unwrap());
            assert_eq!(again.y, first.y);
            assert_eq!(again.stats.get(2), first.stats.get(2));
        }
    }

    #[test]
    fn test_stack_shapes() {
        let dir = tempfile::tempdir().unwrap();
        let files = fixture(dir.path());
        let request = ClassificationRequest::training(RetType::Stack, 2, vec![1, 2, 3, 4, 5], files);
        let prepared = windower(dir.path()).prepare_classification(&request).unwrap();
        assert_eq!(prepared.x.dim(), (4, 2, 5));
        assert_eq!(prepared.y.dim(), (4, 2, 3));
    }

    #[test]
    fn test_testing_applies_training_stats() {
        let dir = tempfile::tempdir().unwrap();
        let files = fixture(dir.path());
        let stats: NormalizationStats = [1, 2, 3, 4, 5]
            .into_iter()
            .map(|c| (c, ColumnStats::new(100.0, 1.0)))
            .collect();
        let request = ClassificationRequest::testing(RetType::Flat, 2, vec![1, 2, 3, 4, 5], files[1..].to_vec(), stats.clone(), 1);

        let prepared = windower(dir.path()).prepare_classification(&request).unwrap();
        assert_eq!(prepared.stats, stats);
        let x = prepared.x.as_tensor().unwrap();
        assert_eq!(x.dim(), (1, 2, 5));
        assert_abs_diff_eq!(x[[0, 0, 0]], 4.0, epsilon = 1e-12);
        assert!(windower(dir.path())
            .cache()
            .contains(&request.cache_key()));
    }

    #[test]
    fn test_missing_signal_file_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let files = fixture(dir.path());
        std::fs::remove_file(dir.path().join("signal_20130730v.csv")).unwrap();
        let request = ClassificationRequest::training(RetType::Df, 2, vec![1, 2, 3, 4, 5], files);
        let err = windower(dir.path()).prepare_classification(&request).unwrap_err();
        assert!(matches!(err, Error::MissingFile(_)));
    }

    #[test]
    fn test_misaligned_signals_fail() {
        let dir = tempfile::tempdir().unwrap();
        let files = fixture(dir.path());
        std::fs::write(dir.path().join("signal_20130730v.csv"), "0,0.9\n700,0.1\n").unwrap();
        let request = ClassificationRequest::training(RetType::Df, 2, vec![1, 2, 3, 4, 5], files);
        let err = windower(dir.path()).prepare_classification(&request).unwrap_err();
        assert!(matches!(err, Error::Data(_)));
    }
}
