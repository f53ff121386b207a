//! Typed network description parsed from configuration.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use ufcnn_core::config::{ModelConfig, OptimizerConfig};
use ufcnn_core::{Error, Result};

/// How two branches are combined at a merge node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MergeMode {
    /// Elementwise sum; both inputs must have the same channel count.
    Sum,
    /// Channel concatenation.
    Concat,
}

impl FromStr for MergeMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "sum" => Ok(MergeMode::Sum),
            "concat" => Ok(MergeMode::Concat),
            other => Err(Error::config(format!("unsupported merge mode {other:?}"))),
        }
    }
}

/// Elementwise (or, for softmax, per-row) nonlinearity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Activation {
    Softplus,
    /// `alpha * softplus(beta * x)`.
    ParametricSoftplus { alpha: f64, beta: f64 },
    Relu,
    Tanh,
    Sigmoid,
    /// Normalizes across channels at every time step.
    Softmax,
    Linear,
}

impl Activation {
    pub const PARAMETRIC_SOFTPLUS: Activation = Activation::ParametricSoftplus { alpha: 0.2, beta: 5.0 };

    pub fn name(&self) -> &'static str {
        match self {
            Activation::Softplus => "softplus",
            Activation::ParametricSoftplus { .. } => "parametric_softplus",
            Activation::Relu => "relu",
            Activation::Tanh => "tanh",
            Activation::Sigmoid => "sigmoid",
            Activation::Softmax => "softmax",
            Activation::Linear => "linear",
        }
    }
}

impl FromStr for Activation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "softplus" => Ok(Activation::Softplus),
            "parametric_softplus" => Ok(Activation::PARAMETRIC_SOFTPLUS),
            "relu" => Ok(Activation::Relu),
            "tanh" => Ok(Activation::Tanh),
            "sigmoid" => Ok(Activation::Sigmoid),
            "softmax" => Ok(Activation::Softmax),
            "linear" => Ok(Activation::Linear),
            other => Err(Error::config(format!("unsupported activation {other:?}"))),
        }
    }
}

/// Training objective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Loss {
    Mse,
    CategoricalCrossentropy,
}

impl FromStr for Loss {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "mse" | "mean_squared_error" => Ok(Loss::Mse),
            "categorical_crossentropy" => Ok(Loss::CategoricalCrossentropy),
            other => Err(Error::config(format!("unsupported loss {other:?}"))),
        }
    }
}

/// Optimizer handed to the training loop. Carried, not executed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Optimizer {
    Sgd {
        learning_rate: f64,
        decay: f64,
        momentum: f64,
        nesterov: bool,
    },
    RmsProp { learning_rate: f64 },
    Adagrad { learning_rate: f64 },
}

impl TryFrom<&OptimizerConfig> for Optimizer {
    type Error = Error;

    fn try_from(config: &OptimizerConfig) -> Result<Self> {
        match config.kind.as_str() {
            "sgd" => Ok(Optimizer::Sgd {
                learning_rate: config.learning_rate,
                decay: config.decay,
                momentum: config.momentum,
                nesterov: config.nesterov,
            }),
            "rmsprop" => Ok(Optimizer::RmsProp { learning_rate: config.learning_rate }),
            "adagrad" => Ok(Optimizer::Adagrad { learning_rate: config.learning_rate }),
            other => Err(Error::config(format!("unsupported optimizer {other:?}"))),
        }
    }
}

/// Everything needed to build and compile a network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopologySpec {
    /// Training window length; width of the final convolution.
    pub sequence_length: usize,
    /// Input channels.
    pub features: usize,
    pub nb_filter: usize,
    pub filter_length: usize,
    pub output_dim: usize,
    pub mode: MergeMode,
    /// Hidden activation of the concat and sequential variants.
    pub activation: Activation,
    pub loss: Loss,
    pub regression: bool,
    pub optimizer: Optimizer,
    pub seed: Option<u64>,
}

impl TopologySpec {
    /// Parse the model section of the configuration for `features` inputs.
    pub fn from_config(config: &ModelConfig, features: usize) -> Result<Self> {
        let spec = Self {
            sequence_length: config.sequence_length,
            features,
            nb_filter: config.nb_filter,
            filter_length: config.filter_length,
            output_dim: config.output_dim,
            mode: config.mode.parse()?,
            activation: config.activation.parse()?,
            loss: config.loss.parse()?,
            regression: config.regression,
            optimizer: Optimizer::try_from(&config.optimizer)?,
            seed: config.seed,
        };
        spec.validate()?;
        Ok(spec)
    }

    /// Reject zero sizes before any graph is built.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("sequence_length", self.sequence_length),
            ("features", self.features),
            ("nb_filter", self.nb_filter),
            ("filter_length", self.filter_length),
            ("output_dim", self.output_dim),
        ] {
            if value == 0 {
                return Err(Error::config(format!("{name} must be positive")));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_default_config() {
        let spec = TopologySpec::from_config(&ModelConfig::default(), 4).unwrap();
        assert_eq!(spec.mode, MergeMode::Concat);
        assert_eq!(spec.activation, Activation::Softplus);
        assert_eq!(spec.loss, Loss::CategoricalCrossentropy);
        assert!(matches!(spec.optimizer, Optimizer::Sgd { nesterov: true, .. }));
        assert_eq!(spec.features, 4);
    }

    #[test]
    fn test_unknown_names_are_config_errors() {
        let mut config = ModelConfig::default();
        config.mode = "product".to_string();
        assert!(TopologySpec::from_config(&config, 4).unwrap_err().is_config());

        let mut config = ModelConfig::default();
        config.activation = "gelu".to_string();
        assert!(TopologySpec::from_config(&config, 4).unwrap_err().is_config());

        let mut config = ModelConfig::default();
        config.optimizer.kind = "adam".to_string();
        assert!(TopologySpec::from_config(&config, 4).unwrap_err().is_config());
    }

    #[test]
    fn test_zero_sizes_rejected() {
        assert!(TopologySpec::from_config(&ModelConfig::default(), 0).unwrap_err().is_config());
        let mut config = ModelConfig::default();
        config.nb_filter = 0;
        assert!(TopologySpec::from_config(&config, 4).unwrap_err().is_config());
    }
}
