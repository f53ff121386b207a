//! Named-node DAG of layer descriptions with shape inference.
//!
//! Nodes can only reference nodes added before them, so insertion order is a
//! topological order and cycles cannot be expressed.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use ufcnn_core::{Error, Result};

use crate::spec::{Activation, MergeMode};

/// `(time, channels)` of one sample; `time` is `None` for variable-length input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shape {
    pub time: Option<usize>,
    pub channels: usize,
}

impl Shape {
    pub fn new(time: Option<usize>, channels: usize) -> Self {
        Self { time, channels }
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.time {
            Some(t) => write!(f, "({t}, {})", self.channels),
            None => write!(f, "(None, {})", self.channels),
        }
    }
}

/// Convolution border handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Border {
    /// Zero-pad so the output length equals the input length.
    Same,
    /// No padding; output is `width - 1` steps shorter.
    Valid,
}

/// Layer description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NodeKind {
    Input { shape: Shape },
    /// Zeros added before and after the time axis.
    Padding { left: usize, right: usize },
    Conv { filters: usize, width: usize, border: Border },
    Activation(Activation),
    Merge(MergeMode),
    /// Identity marking the graph output.
    Output,
}

impl NodeKind {
    pub fn label(&self) -> String {
        match self {
            NodeKind::Input { .. } => "Input".to_string(),
            NodeKind::Padding { left, right } => format!("ZeroPadding1D({left}, {right})"),
            NodeKind::Conv { filters, width, border } => {
                format!("Convolution1D({filters}, {width}, {border:?})")
            }
            NodeKind::Activation(activation) => format!("Activation({})", activation.name()),
            NodeKind::Merge(mode) => format!("Merge({mode:?})"),
            NodeKind::Output => "Output".to_string(),
        }
    }
}

/// A node with resolved input indices and inferred output shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub name: String,
    pub kind: NodeKind,
    pub inputs: Vec<usize>,
    pub shape: Shape,
}

/// The layer DAG.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    nodes: Vec<Node>,
    index: HashMap<String, usize>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, name: &str) -> Option<&Node> {
        self.index.get(name).map(|&i| &self.nodes[i])
    }

    /// Index of the unique input node.
    pub fn input(&self) -> Result<usize> {
        self.unique(|kind| matches!(kind, NodeKind::Input { .. }), "input")
    }

    /// Index of the unique output node.
    pub fn output(&self) -> Result<usize> {
        self.unique(|kind| matches!(kind, NodeKind::Output), "output")
    }

    fn unique(&self, pred: impl Fn(&NodeKind) -> bool, what: &str) -> Result<usize> {
        let mut found = self.nodes.iter().enumerate().filter(|(_, n)| pred(&n.kind));
        match (found.next(), found.next()) {
            (Some((i, _)), None) => Ok(i),
            (None, _) => Err(Error::config(format!("graph has no {what} node"))),
            (Some(_), Some(_)) => Err(Error::config(format!("graph has more than one {what} node"))),
        }
    }

    /// Add a node fed by already existing nodes, inferring its shape.
    pub fn add(&mut self, name: &str, kind: NodeKind, inputs: &[&str]) -> Result<&Node> {
        if self.index.contains_key(name) {
            return Err(Error::config(format!("duplicate node name {name:?}")));
        }
        let inputs = inputs
            .iter()
            .map(|input| {
                self.index
                    .get(*input)
                    .copied()
                    .ok_or_else(|| Error::config(format!("node {name:?} reads unknown node {input:?}")))
            })
            .collect::<Result<Vec<_>>>()?;
        let input_shapes: Vec<Shape> = inputs.iter().map(|&i| self.nodes[i].shape).collect();
        let shape = infer_shape(name, &kind, &input_shapes)?;

        self.index.insert(name.to_string(), self.nodes.len());
        self.nodes.push(Node {
            name: name.to_string(),
            kind,
            inputs,
            shape,
        });
        Ok(&self.nodes[self.nodes.len() - 1])
    }

    /// One line per node: name, kind, inputs and output shape.
    pub fn summary(&self) -> String {
        self.nodes
            .iter()
            .map(|node| {
                let inputs: Vec<&str> = node.inputs.iter().map(|&i| self.nodes[i].name.as_str()).collect();
                format!("{} : {} : [{}] : {}", node.name, node.kind.label(), inputs.join(", "), node.shape)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn expect_inputs(name: &str, shapes: &[Shape], count: usize) -> Result<()> {
    if shapes.len() != count {
        return Err(Error::config(format!(
            "node {name:?} takes {count} input(s), got {}",
            shapes.len()
        )));
    }
    Ok(())
}

fn infer_shape(name: &str, kind: &NodeKind, inputs: &[Shape]) -> Result<Shape> {
    match kind {
        NodeKind::Input { shape } => {
            expect_inputs(name, inputs, 0)?;
            if shape.channels == 0 || shape.time == Some(0) {
                return Err(Error::config(format!("input {name:?} has an empty shape {shape}")));
            }
            Ok(*shape)
        }
        NodeKind::Padding { left, right } => {
            expect_inputs(name, inputs, 1)?;
            Ok(Shape::new(inputs[0].time.map(|t| t + left + right), inputs[0].channels))
        }
        NodeKind::Conv { filters, width, border } => {
            expect_inputs(name, inputs, 1)?;
            if *filters == 0 || *width == 0 {
                return Err(Error::config(format!("convolution {name:?} needs positive filters and width")));
            }
            let time = match (border, inputs[0].time) {
                (Border::Same, time) => time,
                (Border::Valid, None) => None,
                (Border::Valid, Some(t)) if t >= *width => Some(t - width + 1),
                (Border::Valid, Some(t)) => {
                    return Err(Error::config(format!(
                        "convolution {name:?} of width {width} cannot run over {t} steps"
                    )))
                }
            };
            Ok(Shape::new(time, *filters))
        }
        NodeKind::Activation(_) | NodeKind::Output => {
            expect_inputs(name, inputs, 1)?;
            Ok(inputs[0])
        }
        NodeKind::Merge(mode) => {
            if inputs.len() < 2 {
                return Err(Error::config(format!("merge {name:?} needs at least two inputs")));
            }
            let time = inputs[0].time;
            if inputs.iter().any(|s| s.time != time) {
                return Err(Error::config(format!("merge {name:?} inputs differ in length")));
            }
            match mode {
                MergeMode::Sum => {
                    let channels = inputs[0].channels;
                    if inputs.iter().any(|s| s.channels != channels) {
                        return Err(Error::config(format!(
                            "sum merge {name:?} needs equal channel counts, got {:?}",
                            inputs.iter().map(|s| s.channels).collect::<Vec<_>>()
                        )));
                    }
                    Ok(Shape::new(time, channels))
                }
                MergeMode::Concat => Ok(Shape::new(time, inputs.iter().map(|s| s.channels).sum())),
            }
        }
    }
}
