//! The UFCNN encoder-decoder graphs.
//!
//! Six convolution stages with two long-range merges: stage 5 reads stages 2
//! and 4, stage 6 reads stages 1 and 5. Stage 7 maps to `output_dim` channels
//! with a kernel as wide as the training window.

use tracing::info;
use ufcnn_core::Result;

use crate::graph::{Border, Graph, NodeKind, Shape};
use crate::model::CompiledModel;
use crate::spec::{Activation, MergeMode, TopologySpec};

/// Name of the single input node.
pub const INPUT: &str = "input";
/// Name of the single output node.
pub const OUTPUT: &str = "output";

fn conv(filters: usize, width: usize, border: Border) -> NodeKind {
    NodeKind::Conv { filters, width, border }
}

/// Stages 1 to 6, reading from `source`. Returns the name of the last node.
fn add_encoder_decoder(
    graph: &mut Graph,
    spec: &TopologySpec,
    source: &str,
    first_border: Border,
    activation: Activation,
) -> Result<&'static str> {
    let f = spec.nb_filter;
    let w = spec.filter_length;
    graph.add("conv1", conv(f, w, first_border), &[source])?;
    graph.add("relu1", NodeKind::Activation(activation), &["conv1"])?;
    for (conv_name, prev, relu) in [
        ("conv2", "relu1", "relu2"),
        ("conv3", "relu2", "relu3"),
        ("conv4", "relu3", "relu4"),
    ] {
        graph.add(conv_name, conv(f, w, Border::Same), &[prev])?;
        graph.add(relu, NodeKind::Activation(activation), &[conv_name])?;
    }

    graph.add("merge5", NodeKind::Merge(spec.mode), &["relu2", "relu4"])?;
    graph.add("conv5", conv(f, w, Border::Same), &["merge5"])?;
    graph.add("relu5", NodeKind::Activation(activation), &["conv5"])?;

    graph.add("merge6", NodeKind::Merge(spec.mode), &["relu1", "relu5"])?;
    graph.add("conv6", conv(f, w, Border::Same), &["merge6"])?;
    graph.add("relu6", NodeKind::Activation(activation), &["conv6"])?;
    Ok("relu6")
}

/// Stage 7 and the output node.
fn add_head(graph: &mut Graph, spec: &TopologySpec, source: &str) -> Result<()> {
    graph.add(
        "conv7",
        conv(spec.output_dim, spec.sequence_length, Border::Same),
        &[source],
    )?;
    if spec.regression {
        graph.add(OUTPUT, NodeKind::Output, &["conv7"])?;
    } else {
        graph.add("activation", NodeKind::Activation(Activation::Softmax), &["conv7"])?;
        graph.add(OUTPUT, NodeKind::Output, &["activation"])?;
    }
    Ok(())
}

/// Causal zero padding: `filter_length - 1` zeros on the left only, so
/// `conv1` never reads a future time step.
///
/// Only the input stage is causal. `conv2` to `conv7` use `same` borders, so
/// an output row still depends on later rows of the window.
fn causal_padding(spec: &TopologySpec) -> NodeKind {
    NodeKind::Padding { left: spec.filter_length - 1, right: 0 }
}

/// Concatenation variant on variable-length input with causal padding.
pub fn build_concat(spec: &TopologySpec) -> Result<CompiledModel> {
    spec.validate()?;
    let mut graph = Graph::new();
    graph.add(INPUT, NodeKind::Input { shape: Shape::new(None, spec.features) }, &[])?;
    graph.add("input_padding", causal_padding(spec), &[INPUT])?;
    let spec = TopologySpec { mode: MergeMode::Concat, ..spec.clone() };
    let last = add_encoder_decoder(&mut graph, &spec, "input_padding", Border::Valid, spec.activation)?;
    add_head(&mut graph, &spec, last)?;
    CompiledModel::compile(graph, &spec)
}

/// Sum variant on fixed-length input with parametric softplus activations.
pub fn build_sum(spec: &TopologySpec) -> Result<CompiledModel> {
    spec.validate()?;
    let mut graph = Graph::new();
    graph.add(
        INPUT,
        NodeKind::Input { shape: Shape::new(Some(spec.sequence_length), spec.features) },
        &[],
    )?;
    let spec = TopologySpec { mode: MergeMode::Sum, ..spec.clone() };
    let last = add_encoder_decoder(&mut graph, &spec, INPUT, Border::Same, Activation::PARAMETRIC_SOFTPLUS)?;
    add_head(&mut graph, &spec, last)?;
    CompiledModel::compile(graph, &spec)
}

/// Single-path variant without merges, for checking the data path.
pub fn build_sequential(spec: &TopologySpec) -> Result<CompiledModel> {
    spec.validate()?;
    let mut graph = Graph::new();
    graph.add(INPUT, NodeKind::Input { shape: Shape::new(None, spec.features) }, &[])?;
    graph.add("input_padding", causal_padding(spec), &[INPUT])?;
    graph.add("conv1", conv(spec.nb_filter, spec.filter_length, Border::Valid), &["input_padding"])?;
    graph.add("relu1", NodeKind::Activation(Activation::Relu), &["conv1"])?;
    add_head(&mut graph, spec, "relu1")?;
    CompiledModel::compile(graph, spec)
}

/// Build the variant selected by `spec.mode`.
pub fn build_topology(spec: &TopologySpec) -> Result<CompiledModel> {
    let model = match spec.mode {
        MergeMode::Concat => build_concat(spec)?,
        MergeMode::Sum => build_sum(spec)?,
    };
    info!(
        mode = ?spec.mode,
        nodes = model.graph().len(),
        parameters = model.parameter_count(),
        "built topology"
    );
    Ok(model)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::{Loss, Optimizer};
    use approx::assert_abs_diff_eq;
    use ndarray::Array3;

    fn spec(mode: MergeMode, regression: bool) -> TopologySpec {
        TopologySpec {
            sequence_length: 8,
            features: 3,
            nb_filter: 4,
            filter_length: 5,
            output_dim: 3,
            mode,
            activation: Activation::Softplus,
            loss: if regression { Loss::Mse } else { Loss::CategoricalCrossentropy },
            regression,
            optimizer: Optimizer::Adagrad { learning_rate: 0.01 },
            seed: Some(7),
        }
    }

    fn ramp(samples: usize, time: usize, channels: usize) -> Array3<f64> {
        Array3::from_shape_fn((samples, time, channels), |(s, t, c)| {
            ((s * 31 + t * 7 + c * 3) % 11) as f64 / 5.0 - 1.0
        })
    }

    #[test]
    fn test_concat_output_channels() {
        let model = build_topology(&spec(MergeMode::Concat, false)).unwrap();
        let output = model.graph().node(OUTPUT).unwrap();
        assert_eq!(output.shape, Shape::new(None, 3));
        assert_eq!(model.graph().node("conv5").unwrap().shape.channels, 4);
        assert_eq!(model.graph().node("merge5").unwrap().shape.channels, 8);
        assert_eq!(model.graph().node("merge6").unwrap().shape.channels, 8);
    }

    #[test]
    fn test_classification_rows_sum_to_one() {
        for mode in [MergeMode::Concat, MergeMode::Sum] {
            let model = build_topology(&spec(mode, false)).unwrap();
            let prediction = model.predict(ramp(2, 8, 3).view()).unwrap();
            assert_eq!(prediction.dim(), (2, 8, 3));
            for row in prediction.rows() {
                assert_abs_diff_eq!(row.sum(), 1.0, epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn test_variants_share_naming() {
        let spec = spec(MergeMode::Concat, true);
        for model in [
            build_concat(&spec).unwrap(),
            build_sum(&spec).unwrap(),
            build_sequential(&spec).unwrap(),
        ] {
            assert_eq!(model.input_name(), INPUT);
            assert_eq!(model.output_name(), OUTPUT);
            let output = model.predict(ramp(1, 8, 3).view()).unwrap();
            assert_eq!(output.dim(), (1, 8, 3));
        }
    }

    #[test]
    fn test_sum_merge_channels_match() {
        let model = build_sum(&spec(MergeMode::Sum, true)).unwrap();
        assert_eq!(model.graph().node("merge5").unwrap().shape, Shape::new(Some(8), 4));
        assert!(model.graph().node("input_padding").is_none());
    }

    #[test]
    fn test_causal_padding() {
        let model = build_concat(&spec(MergeMode::Concat, true)).unwrap();
        let padding = model.graph().node("input_padding").unwrap();
        assert_eq!(padding.kind, NodeKind::Padding { left: 4, right: 0 });
    }

    #[test]
    fn test_only_input_stage_is_causal() {
        let model = build_concat(&spec(MergeMode::Concat, true)).unwrap();
        let convs: Vec<(&str, Border)> = model
            .graph()
            .nodes()
            .iter()
            .filter_map(|node| match node.kind {
                NodeKind::Conv { border, .. } => Some((node.name.as_str(), border)),
                _ => None,
            })
            .collect();
        assert_eq!(convs.len(), 7);
        assert_eq!(convs[0], ("conv1", Border::Valid));
        assert!(convs[1..].iter().all(|&(_, border)| border == Border::Same));
    }

    #[test]
    fn test_malformed_spec_fails_at_construction() {
        let mut bad = spec(MergeMode::Concat, false);
        bad.filter_length = 0;
        assert!(build_topology(&bad).unwrap_err().is_config());
    }

    #[test]
    fn test_seeded_models_are_reproducible() {
        let a = build_topology(&spec(MergeMode::Concat, false)).unwrap();
        let b = build_topology(&spec(MergeMode::Concat, false)).unwrap();
        let input = ramp(1, 12, 3);
        assert_eq!(a.predict(input.view()).unwrap(), b.predict(input.view()).unwrap());
    }

    #[test]
    fn test_summary_mentions_merges() {
        let model = build_topology(&spec(MergeMode::Concat, false)).unwrap();
        let summary = model.summary();
        assert!(summary.contains("merge6 : Merge(Concat) : [relu1, relu5]"));
        assert_eq!(summary.lines().count(), model.graph().len());
    }
}
