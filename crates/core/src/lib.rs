//! Core types and configuration for the UFCNN pipeline.
//!
//! This crate provides shared types used across all other crates:
//! - The (day, millisecond) indexed feature table
//! - Labels and normalization statistics
//! - Configuration structures
//! - Common error types

pub mod config;
pub mod error;
pub mod table;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
pub use table::FeatureTable;
pub use types::*;
