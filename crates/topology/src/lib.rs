//! UFCNN network topologies.
//!
//! This crate handles:
//! - Parsing model hyperparameters into a typed spec
//! - Building the encoder-decoder layer graph with its skip merges
//! - Weight initialization, forward pass and loss evaluation
//! - Prediction reports

pub mod builder;
pub mod graph;
pub mod metrics;
pub mod model;
pub mod spec;

pub use builder::{build_concat, build_sequential, build_sum, build_topology, INPUT, OUTPUT};
pub use graph::{Border, Graph, Node, NodeKind, Shape};
pub use metrics::{check_prediction, PredictionReport};
pub use model::{compute_loss, CompiledModel, ConvWeights};
pub use spec::{Activation, Loss, MergeMode, Optimizer, TopologySpec};
