//! Compiled network: initialized weights, forward pass and loss.

use ndarray::{s, stack, Array1, Array2, Array3, ArrayView2, ArrayView3, Axis};
use rand::distributions::{Distribution, Uniform};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::debug;
use ufcnn_core::{Error, Result};

use crate::graph::{Border, Graph, Node, NodeKind};
use crate::spec::{Activation, Loss, MergeMode, Optimizer, TopologySpec};

/// Probabilities are clipped to `[EPSILON, 1 - EPSILON]` before taking logs.
const EPSILON: f64 = 1e-7;

/// Kernel `(width, in_channels, filters)` and per-filter bias.
#[derive(Debug, Clone, PartialEq)]
pub struct ConvWeights {
    pub kernel: Array3<f64>,
    pub bias: Array1<f64>,
}

impl ConvWeights {
    /// LeCun uniform: `U(-sqrt(3 / fan_in), sqrt(3 / fan_in))`, zero bias.
    fn lecun_uniform(width: usize, in_channels: usize, filters: usize, rng: &mut StdRng) -> Self {
        let fan_in = (width * in_channels) as f64;
        let limit = (3.0 / fan_in).sqrt();
        let dist = Uniform::new_inclusive(-limit, limit);
        Self {
            kernel: Array3::from_shape_simple_fn((width, in_channels, filters), || dist.sample(rng)),
            bias: Array1::zeros(filters),
        }
    }

    fn len(&self) -> usize {
        self.kernel.len() + self.bias.len()
    }
}

/// A graph with weights, ready for predict and evaluate calls.
#[derive(Debug, Clone)]
pub struct CompiledModel {
    graph: Graph,
    weights: Vec<Option<ConvWeights>>,
    input: usize,
    output: usize,
    loss: Loss,
    optimizer: Optimizer,
    regression: bool,
}

impl CompiledModel {
    /// Initialize weights for every convolution of `graph`.
    pub fn compile(graph: Graph, spec: &TopologySpec) -> Result<Self> {
        let input = graph.input()?;
        let output = graph.output()?;
        let mut rng = match spec.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let weights = graph
            .nodes()
            .iter()
            .map(|node| match node.kind {
                NodeKind::Conv { filters, width, .. } => {
                    let in_channels = graph.nodes()[node.inputs[0]].shape.channels;
                    Some(ConvWeights::lecun_uniform(width, in_channels, filters, &mut rng))
                }
                _ => None,
            })
            .collect();

        Ok(Self {
            graph,
            weights,
            input,
            output,
            loss: spec.loss,
            optimizer: spec.optimizer,
            regression: spec.regression,
        })
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn input_name(&self) -> &str {
        &self.graph.nodes()[self.input].name
    }

    pub fn output_name(&self) -> &str {
        &self.graph.nodes()[self.output].name
    }

    pub fn loss(&self) -> Loss {
        self.loss
    }

    pub fn optimizer(&self) -> Optimizer {
        self.optimizer
    }

    pub fn is_regression(&self) -> bool {
        self.regression
    }

    /// Weights of the named convolution.
    pub fn conv_weights(&self, name: &str) -> Option<&ConvWeights> {
        let position = self.graph.nodes().iter().position(|n| n.name == name)?;
        self.weights[position].as_ref()
    }

    /// Total number of trainable values.
    pub fn parameter_count(&self) -> usize {
        self.weights.iter().flatten().map(ConvWeights::len).sum()
    }

    /// Node listing with inferred shapes.
    pub fn summary(&self) -> String {
        self.graph.summary()
    }

    /// Forward pass over `(samples, time, features)`.
    pub fn predict(&self, input: ArrayView3<'_, f64>) -> Result<Array3<f64>> {
        let (samples, time, channels) = input.dim();
        let expected = self.graph.nodes()[self.input].shape;
        if channels != expected.channels {
            return Err(Error::shape(format!(
                "input has {channels} features, model expects {}",
                expected.channels
            )));
        }
        if let Some(fixed) = expected.time {
            if time != fixed {
                return Err(Error::shape(format!(
                    "input has {time} time steps, model expects {fixed}"
                )));
            }
        }
        if samples == 0 || time == 0 {
            return Err(Error::shape("empty input"));
        }

        let outputs = input
            .outer_iter()
            .map(|sample| self.forward(sample))
            .collect::<Result<Vec<_>>>()?;
        let views: Vec<ArrayView2<'_, f64>> = outputs.iter().map(|o| o.view()).collect();
        stack(Axis(0), &views).map_err(|e| Error::shape(e.to_string()))
    }

    /// Loss of the prediction for `input` against `target`.
    pub fn evaluate(&self, input: ArrayView3<'_, f64>, target: ArrayView3<'_, f64>) -> Result<f64> {
        let prediction = self.predict(input)?;
        if prediction.dim() != target.dim() {
            return Err(Error::shape(format!(
                "target shape {:?} does not match output shape {:?}",
                target.dim(),
                prediction.dim()
            )));
        }
        let loss = compute_loss(self.loss, target, prediction.view());
        debug!(loss, "evaluated batch");
        Ok(loss)
    }

    fn forward(&self, sample: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
        let nodes = self.graph.nodes();
        let mut values: Vec<Option<Array2<f64>>> = vec![None; nodes.len()];

        for (i, node) in nodes.iter().enumerate() {
            let input = |k: usize| node_input(&values, node, k);
            let value = match &node.kind {
                NodeKind::Input { .. } => sample.to_owned(),
                NodeKind::Padding { left, right } => pad_time(input(0)?.view(), *left, *right),
                NodeKind::Conv { width, border, .. } => {
                    let weights = self.weights[i]
                        .as_ref()
                        .ok_or_else(|| Error::config(format!("convolution {} has no weights", node.name)))?;
                    conv1d(input(0)?.view(), weights, *width, *border)?
                }
                NodeKind::Activation(activation) => activate(input(0)?.clone(), *activation),
                NodeKind::Merge(mode) => {
                    let parts = (0..node.inputs.len())
                        .map(|k| input(k).map(|a| a.view()))
                        .collect::<Result<Vec<_>>>()?;
                    merge(&parts, *mode)?
                }
                NodeKind::Output => input(0)?.clone(),
            };
            values[i] = Some(value);
        }

        values[self.output]
            .take()
            .ok_or_else(|| Error::config("output node was not evaluated"))
    }
}

fn node_input<'v>(values: &'v [Option<Array2<f64>>], node: &Node, k: usize) -> Result<&'v Array2<f64>> {
    values[node.inputs[k]]
        .as_ref()
        .ok_or_else(|| Error::config(format!("node {} evaluated before its inputs", node.name)))
}

/// Zero rows before and after the time axis.
fn pad_time(x: ArrayView2<'_, f64>, left: usize, right: usize) -> Array2<f64> {
    let (time, channels) = x.dim();
    let mut padded = Array2::zeros((left + time + right, channels));
    padded.slice_mut(s![left..left + time, ..]).assign(&x);
    padded
}

fn conv1d(x: ArrayView2<'_, f64>, weights: &ConvWeights, width: usize, border: Border) -> Result<Array2<f64>> {
    let padded = match border {
        Border::Valid => x.to_owned(),
        Border::Same => {
            let total = width - 1;
            pad_time(x, total / 2, total - total / 2)
        }
    };
    if padded.nrows() < width {
        return Err(Error::shape(format!(
            "{} time steps are too few for a convolution of width {width}",
            padded.nrows()
        )));
    }
    let out_len = padded.nrows() + 1 - width;
    let filters = weights.bias.len();
    let mut out = Array2::zeros((out_len, filters));
    for k in 0..width {
        out += &padded
            .slice(s![k..k + out_len, ..])
            .dot(&weights.kernel.index_axis(Axis(0), k));
    }
    out += &weights.bias;
    Ok(out)
}

fn softplus(x: f64) -> f64 {
    x.max(0.0) + (-x.abs()).exp().ln_1p()
}

fn activate(mut x: Array2<f64>, activation: Activation) -> Array2<f64> {
    match activation {
        Activation::Softplus => x.mapv_inplace(softplus),
        Activation::ParametricSoftplus { alpha, beta } => x.mapv_inplace(|v| alpha * softplus(beta * v)),
        Activation::Relu => x.mapv_inplace(|v| v.max(0.0)),
        Activation::Tanh => x.mapv_inplace(f64::tanh),
        Activation::Sigmoid => x.mapv_inplace(|v| 1.0 / (1.0 + (-v).exp())),
        Activation::Softmax => {
            for mut row in x.rows_mut() {
                let max = row.fold(f64::NEG_INFINITY, |m, &v| m.max(v));
                row.mapv_inplace(|v| (v - max).exp());
                let sum = row.sum();
                row /= sum;
            }
        }
        Activation::Linear => {}
    }
    x
}

fn merge(parts: &[ArrayView2<'_, f64>], mode: MergeMode) -> Result<Array2<f64>> {
    match mode {
        MergeMode::Sum => {
            let mut total = parts[0].to_owned();
            for part in &parts[1..] {
                if part.dim() != total.dim() {
                    return Err(Error::shape(format!(
                        "cannot sum {:?} and {:?}",
                        total.dim(),
                        part.dim()
                    )));
                }
                total += part;
            }
            Ok(total)
        }
        MergeMode::Concat => {
            ndarray::concatenate(Axis(1), parts).map_err(|e| Error::shape(e.to_string()))
        }
    }
}

/// Mean loss over every `(sample, time)` row.
pub fn compute_loss(loss: Loss, target: ArrayView3<'_, f64>, prediction: ArrayView3<'_, f64>) -> f64 {
    match loss {
        Loss::Mse => (&target - &prediction).mapv(|d| d * d).mean().unwrap_or(0.0),
        Loss::CategoricalCrossentropy => {
            let rows = target.len() / target.len_of(Axis(2)).max(1);
            let total: f64 = target
                .iter()
                .zip(prediction.iter())
                .map(|(&y, &p)| -y * p.clamp(EPSILON, 1.0 - EPSILON).ln())
                .sum();
            if rows == 0 {
                0.0
            } else {
                total / rows as f64
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Shape;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn spec() -> TopologySpec {
        TopologySpec {
            sequence_length: 4,
            features: 1,
            nb_filter: 2,
            filter_length: 3,
            output_dim: 1,
            mode: MergeMode::Sum,
            activation: Activation::Linear,
            loss: Loss::Mse,
            regression: true,
            optimizer: Optimizer::Adagrad { learning_rate: 0.01 },
            seed: Some(1),
        }
    }

    #[test]
    fn test_same_conv_keeps_length() {
        let weights = ConvWeights {
            kernel: Array3::from_elem((3, 1, 1), 1.0),
            bias: array![0.5],
        };
        let x = array![[1.0], [2.0], [3.0], [4.0]];
        let out = conv1d(x.view(), &weights, 3, Border::Same).unwrap();
        assert_eq!(out, array![[3.5], [6.5], [9.5], [7.5]]);

        let valid = conv1d(x.view(), &weights, 3, Border::Valid).unwrap();
        assert_eq!(valid, array![[6.5], [9.5]]);
        assert!(conv1d(x.slice(s![..2, ..]), &weights, 3, Border::Valid).is_err());
    }

    #[test]
    fn test_causal_conv_ignores_future() {
        // Left padding of width - 1 followed by a valid convolution.
        let mut graph = Graph::new();
        graph.add("input", NodeKind::Input { shape: Shape::new(None, 1) }, &[]).unwrap();
        graph.add("pad", NodeKind::Padding { left: 2, right: 0 }, &["input"]).unwrap();
        graph
            .add("conv", NodeKind::Conv { filters: 1, width: 3, border: Border::Valid }, &["pad"])
            .unwrap();
        graph.add("output", NodeKind::Output, &["conv"]).unwrap();
        let model = CompiledModel::compile(graph, &spec()).unwrap();

        let a = array![[[1.0], [2.0], [3.0], [4.0]]];
        let mut b = a.clone();
        b[[0, 3, 0]] = 100.0;
        let pa = model.predict(a.view()).unwrap();
        let pb = model.predict(b.view()).unwrap();
        assert_eq!(pa.dim(), (1, 4, 1));
        assert_eq!(pa.slice(s![0, ..3, ..]), pb.slice(s![0, ..3, ..]));
        assert_ne!(pa[[0, 3, 0]], pb[[0, 3, 0]]);
    }

    #[test]
    fn test_activations() {
        let x = array![[-1.0, 0.0, 2.0]];
        assert_abs_diff_eq!(activate(x.clone(), Activation::Softplus)[[0, 1]], 2f64.ln(), epsilon = 1e-12);
        let p = activate(x.clone(), Activation::PARAMETRIC_SOFTPLUS);
        assert_abs_diff_eq!(p[[0, 1]], 0.2 * 2f64.ln(), epsilon = 1e-12);
        assert_eq!(activate(x.clone(), Activation::Relu), array![[0.0, 0.0, 2.0]]);
        let s = activate(x, Activation::Softmax);
        assert_abs_diff_eq!(s.sum(), 1.0, epsilon = 1e-12);
        assert!(s[[0, 2]] > s[[0, 1]]);
        assert!(softplus(800.0).is_finite());
    }

    #[test]
    fn test_lecun_limits() {
        let mut rng = StdRng::seed_from_u64(3);
        let weights = ConvWeights::lecun_uniform(5, 6, 10, &mut rng);
        let limit = (3.0f64 / 30.0).sqrt();
        assert!(weights.kernel.iter().all(|w| w.abs() <= limit));
        assert_eq!(weights.len(), 5 * 6 * 10 + 10);
    }

    #[test]
    fn test_losses() {
        let y = array![[[1.0, 0.0, 0.0], [0.0, 1.0, 0.0]]];
        let p = array![[[0.5, 0.25, 0.25], [0.25, 0.5, 0.25]]];
        assert_abs_diff_eq!(
            compute_loss(Loss::CategoricalCrossentropy, y.view(), p.view()),
            -(0.5f64.ln()),
            epsilon = 1e-12
        );
        assert_abs_diff_eq!(compute_loss(Loss::Mse, y.view(), p.view()), 0.125, epsilon = 1e-12);
        assert_eq!(compute_loss(Loss::Mse, y.view(), y.view()), 0.0);
    }

    #[test]
    fn test_shape_errors() {
        let mut graph = Graph::new();
        graph.add("input", NodeKind::Input { shape: Shape::new(Some(4), 1) }, &[]).unwrap();
        graph.add("output", NodeKind::Output, &["input"]).unwrap();
        let model = CompiledModel::compile(graph, &spec()).unwrap();

        assert!(matches!(model.predict(Array3::<f64>::zeros((1, 5, 1)).view()), Err(Error::Shape(_))));
        assert!(matches!(model.predict(Array3::<f64>::zeros((1, 4, 2)).view()), Err(Error::Shape(_))));
        let x = Array3::<f64>::zeros((1, 4, 1));
        let bad_target = Array3::<f64>::zeros((1, 3, 1));
        assert!(matches!(model.evaluate(x.view(), bad_target.view()), Err(Error::Shape(_))));
        assert_eq!(model.evaluate(x.view(), x.view()).unwrap(), 0.0);
    }
}
