//! Training data preparation for the UFCNN pipeline.
//!
//! This crate handles:
//! - Turning raw trading days into normalized, labelled tables or tensors
//! - Sliding-window and whole-sequence output shapes
//! - On-disk memoization of prepared data
//! - The endless per-day batch generator
//! - Synthetic regression series

pub mod cache;
pub mod generator;
pub mod prepare;
pub mod synthetic;
pub mod window;

pub use cache::{CacheEntry, CacheKey, CachePart, CacheRole, DiskCache};
pub use generator::{generator, DayBatch, DayCycle};
pub use prepare::{ClassificationRequest, Prepared, Windower};
pub use synthetic::{gen_cosine_amp, lookahead_mean, CosineSeries};
pub use window::{flat_sequence, shape_table, stack_windows, RetType, Shaped};
