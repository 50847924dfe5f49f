use serde::{Serialize, Deserialize};

use crate::activation::activation::ActivationFunction;
use crate::error::{FgsmError, Result};
use crate::layers::{BatchNorm2d, Conv2d, Layer};
use crate::math::matrix::Matrix;
use crate::math::tensor::{Shape3, Tensor3};
use crate::model::output::OutputSelect;

/// conv -> optional batch norm -> activation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConvBlock {
    pub conv: Conv2d,
    #[serde(default)]
    pub norm: Option<BatchNorm2d>,
    pub activation: ActivationFunction,
}

/// A small MLP on top of the flattened features.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectionHead {
    pub layers: Vec<Layer>,
}

/// Convolutional feature extractor plus a linear decision head.
///
/// The weights are read-only: every operation takes `&self`, and gradients
/// are only ever propagated to the input image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Discriminator {
    pub input_shape: Shape3,
    pub blocks: Vec<ConvBlock>,
    pub head: Layer,
    #[serde(default)]
    pub projection1: Option<ProjectionHead>,
    #[serde(default)]
    pub projection2: Option<ProjectionHead>,
    /// Scalar heads classify `score >= decision_threshold` as class 1.
    #[serde(default)]
    pub decision_threshold: f64,
}

struct BlockTrace {
    input_shape: Shape3,
    pre_activation: Tensor3,
}

struct ForwardTrace {
    blocks: Vec<BlockTrace>,
    features_shape: Shape3,
    head_pre: Vec<Matrix>,
    output: Vec<f64>,
}

impl Discriminator {
    /// Checks that consecutive layers agree on their shapes.
    pub fn validate(&self) -> Result<()> {
        let features = self.features_shape()?;
        check_dense_chain("decision head", std::slice::from_ref(&self.head), features.len())?;
        for (name, proj) in [("projection1", &self.projection1), ("projection2", &self.projection2)] {
            if let Some(proj) = proj {
                if proj.layers.is_empty() {
                    return Err(FgsmError::InvalidSpec(format!("{} head has no layers", name)));
                }
                check_dense_chain(name, &proj.layers, features.len())?;
            }
        }
        Ok(())
    }

    /// Shape of the final conv block output (the input shape when there are
    /// no conv blocks).
    pub fn features_shape(&self) -> Result<Shape3> {
        let mut shape = self.input_shape;
        for block in &self.blocks {
            block.conv.validate()?;
            shape = block.conv.output_shape(shape)?;
            if let Some(norm) = &block.norm {
                norm.validate()?;
                if norm.channels() != shape.channels {
                    return Err(FgsmError::InvalidSpec(format!(
                        "batch norm over {} channels follows a conv with {} outputs",
                        norm.channels(), shape.channels
                    )));
                }
            }
        }
        Ok(shape)
    }

    pub fn num_classes(&self) -> usize {
        self.head.size
    }

    /// Number of values `forward` returns for `select`.
    pub fn output_len(&self, select: OutputSelect) -> Result<usize> {
        match select {
            OutputSelect::Penultimate => Ok(self.features_shape()?.len()),
            _ => Ok(self.head_layers(select)?.last().map_or(0, |layer| layer.size)),
        }
    }

    fn head_layers(&self, select: OutputSelect) -> Result<&[Layer]> {
        match select {
            OutputSelect::Logits => Ok(std::slice::from_ref(&self.head)),
            OutputSelect::Penultimate => Ok(&[]),
            OutputSelect::Projection1 => self.projection1.as_ref()
                .map(|p| p.layers.as_slice())
                .ok_or(FgsmError::MissingHead(select)),
            OutputSelect::Projection2 => self.projection2.as_ref()
                .map(|p| p.layers.as_slice())
                .ok_or(FgsmError::MissingHead(select)),
        }
    }

    fn trace(&self, image: &Tensor3, select: OutputSelect) -> Result<ForwardTrace> {
        image.expect_shape(self.input_shape)?;
        let head = self.head_layers(select)?;

        let mut blocks = Vec::with_capacity(self.blocks.len());
        let mut current = image.clone();
        for block in &self.blocks {
            let input_shape = current.shape();
            let mut pre = block.conv.forward(&current)?;
            if let Some(norm) = &block.norm {
                pre = norm.forward(&pre)?;
            }
            current = pre.map(|x| block.activation.function(x));
            blocks.push(BlockTrace { input_shape, pre_activation: pre });
        }

        let features_shape = current.shape();
        let mut output = current.data;
        let mut head_pre = Vec::with_capacity(head.len());
        for layer in head {
            let (a, z) = layer.feed_from(&output)?;
            head_pre.push(z);
            output = a;
        }

        Ok(ForwardTrace { blocks, features_shape, head_pre, output })
    }

    /// Forward inference for one image.
    pub fn forward(&self, image: &Tensor3, select: OutputSelect) -> Result<Vec<f64>> {
        Ok(self.trace(image, select)?.output)
    }

    /// Vector-Jacobian product: returns `upstream^T · ∂output/∂image`.
    pub fn input_gradient(
        &self,
        image: &Tensor3,
        select: OutputSelect,
        upstream: &[f64],
    ) -> Result<Tensor3> {
        let trace = self.trace(image, select)?;
        if upstream.len() != trace.output.len() {
            return Err(FgsmError::shape(
                format!("{} upstream gradients", trace.output.len()),
                upstream.len(),
            ));
        }

        let head = self.head_layers(select)?;
        let mut delta = upstream.to_vec();
        for (layer, pre) in head.iter().zip(&trace.head_pre).rev() {
            delta = layer.backprop_input(pre, &delta);
        }

        let mut grad = Tensor3::from_vec(trace.features_shape, delta)?;
        for (block, bt) in self.blocks.iter().zip(&trace.blocks).rev() {
            grad = grad.zip_map(&bt.pre_activation, |g, z| g * block.activation.derivative(z))?;
            if let Some(norm) = &block.norm {
                grad = norm.backprop_input(&grad)?;
            }
            grad = block.conv.backprop_input(bt.input_shape, &grad)?;
        }

        Ok(grad)
    }

    /// Maps decision-head scores to a class index.
    pub fn classify(&self, scores: &[f64]) -> usize {
        if scores.len() == 1 {
            return usize::from(scores[0] >= self.decision_threshold);
        }
        argmax(scores)
    }

    pub fn predict(&self, image: &Tensor3) -> Result<usize> {
        let scores = self.forward(image, OutputSelect::Logits)?;
        Ok(self.classify(&scores))
    }
}

fn check_dense_chain(name: &str, layers: &[Layer], input_size: usize) -> Result<()> {
    let mut expected = input_size;
    for (i, layer) in layers.iter().enumerate() {
        layer.validate()?;
        if layer.input_size() != expected {
            return Err(FgsmError::InvalidSpec(format!(
                "{} layer {} expects {} inputs but receives {}",
                name, i, layer.input_size(), expected
            )));
        }
        expected = layer.size;
    }
    Ok(())
}

/// Index of the maximum element in a slice.
pub(crate) fn argmax(v: &[f64]) -> usize {
    v.iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(i, _)| i)
        .unwrap_or(0)
}
