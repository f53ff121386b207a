//! On-disk memoization of prepared tensors.
//!
//! Entries are keyed by the number of input files, the training/testing role
//! and, for testing, the training count. A key with existing files is never
//! recomputed. Each file is written to a temporary sibling and renamed into
//! place, but no lock is taken: concurrent writers to the same key must be
//! serialized by the caller.
//!
//! `df` entries are JSON. Finite cells are plain numbers; NaN and the
//! infinities are written as the strings `"NaN"`, `"inf"` and `"-inf"`.

use ndarray::Array2;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};
use ufcnn_core::{ColumnId, ColumnSummary, FeatureTable, NormalizationStats, Result, RowKey};

use crate::window::{RetType, Shaped};

/// Whether an entry holds training or testing data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheRole {
    Training,
    Testing { training_count: usize },
}

/// The four files of a cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachePart {
    X,
    Y,
    Mean,
    Std,
}

impl CachePart {
    fn suffix(self) -> &'static str {
        match self {
            CachePart::X => "X",
            CachePart::Y => "y",
            CachePart::Mean => "m",
            CachePart::Std => "s",
        }
    }
}

/// Deterministic cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub file_count: usize,
    pub role: CacheRole,
    pub ret_type: RetType,
}

impl CacheKey {
    /// File name prefix: `save_{n}_train` or `save_{n}_{training_count}_test`.
    pub fn prefix(&self) -> String {
        match self.role {
            CacheRole::Training => format!("save_{}_train", self.file_count),
            CacheRole::Testing { training_count } => {
                format!("save_{}_{}_test", self.file_count, training_count)
            }
        }
    }

    /// `{prefix}_{X|y|m|s}.{ext}`
    pub fn file_name(&self, part: CachePart) -> String {
        format!(
            "{}_{}.{}",
            self.prefix(),
            part.suffix(),
            self.ret_type.file_extension()
        )
    }
}

/// A cached (X, y) pair and, for training entries, the statistics.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub x: Shaped,
    pub y: Shaped,
    pub stats: Option<NormalizationStats>,
}

/// JSON cell value that survives NaN and the infinities.
#[derive(Debug, Clone, Copy)]
struct JsonF64(f64);

impl Serialize for JsonF64 {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if self.0.is_finite() {
            serializer.serialize_f64(self.0)
        } else {
            serializer.serialize_str(&self.0.to_string())
        }
    }
}

impl<'de> Deserialize<'de> for JsonF64 {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Cell {
            Number(f64),
            Text(String),
        }

        match Cell::deserialize(deserializer)? {
            Cell::Number(v) => Ok(JsonF64(v)),
            Cell::Text(text) => text
                .parse::<f64>()
                .map(JsonF64)
                .map_err(serde::de::Error::custom),
        }
    }
}

type JsonSummary = BTreeMap<ColumnId, JsonF64>;

/// On-disk layout of a `df` table.
#[derive(Serialize, Deserialize)]
struct JsonTable {
    keys: Vec<RowKey>,
    columns: Vec<ColumnId>,
    values: Array2<JsonF64>,
}

impl JsonTable {
    fn from_table(table: &FeatureTable) -> Self {
        Self {
            keys: table.keys().to_vec(),
            columns: table.columns().to_vec(),
            values: table.values().mapv(JsonF64),
        }
    }

    fn into_table(self) -> Result<FeatureTable> {
        FeatureTable::new(self.keys, self.columns, self.values.mapv(|cell| cell.0))
    }
}

/// Cache rooted in one directory.
#[derive(Debug, Clone)]
pub struct DiskCache {
    dir: PathBuf,
}

impl DiskCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Full path of one part of an entry.
    pub fn path(&self, key: &CacheKey, part: CachePart) -> PathBuf {
        self.dir.join(key.file_name(part))
    }

    /// Whether every file needed to serve `key` exists.
    pub fn contains(&self, key: &CacheKey) -> bool {
        let parts: &[CachePart] = match key.role {
            CacheRole::Training => &[CachePart::X, CachePart::Y, CachePart::Mean, CachePart::Std],
            CacheRole::Testing { .. } => &[CachePart::X, CachePart::Y],
        };
        parts.iter().all(|&part| self.path(key, part).is_file())
    }

    /// Load an entry, or `None` if it is not cached.
    pub fn load(&self, key: &CacheKey) -> Result<Option<CacheEntry>> {
        if !self.contains(key) {
            debug!(prefix = %key.prefix(), "cache miss");
            return Ok(None);
        }

        let x = self.read_shaped(key, CachePart::X)?;
        let y = self.read_shaped(key, CachePart::Y)?;
        let stats = match key.role {
            CacheRole::Training => {
                let means = self.read_summary(key, CachePart::Mean)?;
                let stds = self.read_summary(key, CachePart::Std)?;
                Some(NormalizationStats::from_parts(&means, &stds)?)
            }
            CacheRole::Testing { .. } => None,
        };

        info!(
            x = %self.path(key, CachePart::X).display(),
            y = %self.path(key, CachePart::Y).display(),
            "found cached tensors"
        );
        Ok(Some(CacheEntry { x, y, stats }))
    }

    /// Store an entry. Statistics are written for every role.
    pub fn store(&self, key: &CacheKey, x: &Shaped, y: &Shaped, stats: &NormalizationStats) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        self.write_shaped(key, CachePart::X, x)?;
        self.write_shaped(key, CachePart::Y, y)?;
        self.write_summary(key, CachePart::Mean, &stats.means())?;
        self.write_summary(key, CachePart::Std, &stats.stds())?;
        debug!(prefix = %key.prefix(), dir = %self.dir.display(), "cached tensors");
        Ok(())
    }

    fn read_shaped(&self, key: &CacheKey, part: CachePart) -> Result<Shaped> {
        Ok(match key.ret_type {
            RetType::Df => Shaped::Table(self.read::<JsonTable>(key, part)?.into_table()?),
            RetType::Stack | RetType::Flat => Shaped::Tensor(self.read(key, part)?),
        })
    }

    fn write_shaped(&self, key: &CacheKey, part: CachePart, value: &Shaped) -> Result<()> {
        match value {
            Shaped::Table(table) => self.write(key, part, &JsonTable::from_table(table)),
            Shaped::Tensor(tensor) => self.write(key, part, tensor),
        }
    }

    fn read_summary(&self, key: &CacheKey, part: CachePart) -> Result<ColumnSummary> {
        Ok(match key.ret_type {
            RetType::Df => self
                .read::<JsonSummary>(key, part)?
                .into_iter()
                .map(|(col, cell)| (col, cell.0))
                .collect(),
            RetType::Stack | RetType::Flat => self.read(key, part)?,
        })
    }

    fn write_summary(&self, key: &CacheKey, part: CachePart, summary: &ColumnSummary) -> Result<()> {
        match key.ret_type {
            RetType::Df => {
                let cells: JsonSummary = summary.iter().map(|(&col, &v)| (col, JsonF64(v))).collect();
                self.write(key, part, &cells)
            }
            RetType::Stack | RetType::Flat => self.write(key, part, summary),
        }
    }

    fn read<T: DeserializeOwned>(&self, key: &CacheKey, part: CachePart) -> Result<T> {
        let reader = BufReader::new(File::open(self.path(key, part))?);
        Ok(match key.ret_type {
            RetType::Df => serde_json::from_reader(reader)?,
            RetType::Stack | RetType::Flat => bincode::deserialize_from(reader)?,
        })
    }

    fn write<T: Serialize>(&self, key: &CacheKey, part: CachePart, value: &T) -> Result<()> {
        let tmp = NamedTempFile::new_in(&self.dir)?;
        {
            let mut writer = BufWriter::new(tmp.as_file());
            match key.ret_type {
                RetType::Df => serde_json::to_writer(&mut writer, value)?,
                RetType::Stack | RetType::Flat => bincode::serialize_into(&mut writer, value)?,
            }
            writer.flush()?;
        }
        tmp.persist(self.path(key, part)).map_err(|e| e.error)?;
        Ok(())
    }
}
