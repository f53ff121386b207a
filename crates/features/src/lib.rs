//! Feature normalization for the UFCNN pipeline.
//!
//! This crate handles:
//! - Pooled standardization of column groups
//! - Applying stored training statistics to test data
//! - Conservative statistics accumulated across tick files
//! - Signal-to-label conversion

pub mod normalize;
pub mod tradcom;
pub mod labels;

pub use normalize::{standardize_columns, standardize_inputs, ColumnGroup, Source};
pub use tradcom::{accumulate_tradcom_normalization, tradcom_normalization, treat_tradcom};
pub use labels::{label_table, labels, LABEL_COLUMNS};
