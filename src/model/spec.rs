use rand::Rng;
use serde::{Serialize, Deserialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use crate::activation::activation::ActivationFunction;
use crate::error::{FgsmError, Result};
use crate::layers::{BatchNorm2d, Conv2d, Layer};
use crate::math::tensor::Shape3;
use crate::model::checkpoint::{Checkpoint, ModelMetadata};
use crate::model::discriminator::{ConvBlock, Discriminator, ProjectionHead};
use crate::model::generator::Generator;

/// Describes one conv block of the discriminator.
///
/// The block's input channel count is implied by the previous block (or the
/// image channels for the first one).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConvBlockSpec {
    pub out_channels: usize,
    pub kernel_size: usize,
    pub stride: usize,
    #[serde(default)]
    pub padding: usize,
    #[serde(default)]
    pub batch_norm: bool,
    pub activation: ActivationFunction,
}

/// Both projection heads share this shape: features -> hidden -> out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectionSpec {
    pub hidden: usize,
    pub out: usize,
    pub activation: ActivationFunction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscriminatorSpec {
    pub input_shape: Shape3,
    pub blocks: Vec<ConvBlockSpec>,
    /// 1 for a real/fake score, otherwise the number of classes.
    pub num_classes: usize,
    #[serde(default)]
    pub projection: Option<ProjectionSpec>,
    #[serde(default)]
    pub decision_threshold: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorSpec {
    pub latent_dim: usize,
    /// Hidden layer widths (latent -> hidden... -> image).
    pub hidden: Vec<usize>,
    pub hidden_activation: ActivationFunction,
    pub output_shape: Shape3,
}

/// Architecture of a full checkpoint, stored independently of any weights.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchitectureSpec {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub output_labels: Option<Vec<String>>,
    pub discriminator: DiscriminatorSpec,
    pub generator: GeneratorSpec,
}

impl DiscriminatorSpec {
    pub fn build<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Discriminator> {
        if self.num_classes == 0 {
            return Err(FgsmError::InvalidSpec("num_classes must be at least 1".into()));
        }
        let mut shape = self.input_shape;
        let mut blocks = Vec::with_capacity(self.blocks.len());
        for block in &self.blocks {
            let gain = if block.activation.prefers_he_init() { 2.0 } else { 1.0 };
            let conv = Conv2d::new(
                shape.channels,
                block.out_channels,
                block.kernel_size,
                block.stride,
                block.padding,
                gain,
                rng,
            );
            conv.validate()?;
            shape = conv.output_shape(shape)?;
            blocks.push(ConvBlock {
                conv,
                norm: block.batch_norm.then(|| BatchNorm2d::new(block.out_channels)),
                activation: block.activation,
            });
        }

        let features = shape.len();
        let head = Layer::new(self.num_classes, features, ActivationFunction::Identity, rng);
        let mut projection = || {
            self.projection.as_ref().map(|p| ProjectionHead {
                layers: vec![
                    Layer::new(p.hidden, features, p.activation, &mut *rng),
                    Layer::new(p.out, p.hidden, ActivationFunction::Identity, &mut *rng),
                ],
            })
        };
        let projection1 = projection();
        let projection2 = projection();

        let model = Discriminator {
            input_shape: self.input_shape,
            blocks,
            head,
            projection1,
            projection2,
            decision_threshold: self.decision_threshold,
        };
        model.validate()?;
        Ok(model)
    }
}

impl GeneratorSpec {
    pub fn build<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Generator> {
        let mut layers = Vec::with_capacity(self.hidden.len() + 1);
        let mut input_size = self.latent_dim;
        for &width in &self.hidden {
            layers.push(Layer::new(width, input_size, self.hidden_activation, rng));
            input_size = width;
        }
        layers.push(Layer::new(self.output_shape.len(), input_size, ActivationFunction::Sigmoid, rng));

        let generator = Generator {
            latent_dim: self.latent_dim,
            output_shape: self.output_shape,
            layers,
        };
        generator.validate()?;
        Ok(generator)
    }
}

impl ArchitectureSpec {
    /// Builds a randomly initialized checkpoint.
    pub fn build<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Checkpoint> {
        if self.discriminator.input_shape != self.generator.output_shape {
            return Err(FgsmError::InvalidSpec(format!(
                "generator produces {} images but the discriminator expects {}",
                self.generator.output_shape, self.discriminator.input_shape
            )));
        }
        Ok(Checkpoint {
            metadata: ModelMetadata {
                name: self.name.clone(),
                description: self.description.clone(),
                output_labels: self.output_labels.clone(),
            },
            discriminator: self.discriminator.build(rng)?,
            generator: self.generator.build(rng)?,
        })
    }

    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<()> {
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    pub fn load_json(path: impl AsRef<Path>) -> Result<ArchitectureSpec> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    fn dcgan_like() -> ArchitectureSpec {
        let leaky = ActivationFunction::LeakyReLU { alpha: 0.2 };
        ArchitectureSpec {
            name: "mnist-4".into(),
            description: None,
            output_labels: Some(vec!["fake".into(), "real".into()]),
            discriminator: DiscriminatorSpec {
                input_shape: Shape3::new(1, 28, 28),
                blocks: vec![
                    ConvBlockSpec { out_channels: 4, kernel_size: 4, stride: 2, padding: 1, batch_norm: false, activation: leaky },
                    ConvBlockSpec { out_channels: 8, kernel_size: 4, stride: 2, padding: 1, batch_norm: true, activation: leaky },
                ],
                num_classes: 1,
                projection: None,
                decision_threshold: 0.0,
            },
            generator: GeneratorSpec {
                latent_dim: 8,
                hidden: vec![16],
                hidden_activation: ActivationFunction::ReLU,
                output_shape: Shape3::new(1, 28, 28),
            },
        }
    }

    #[test]
    fn builds_consistent_checkpoint() {
        let ckpt = dcgan_like().build(&mut StdRng::seed_from_u64(3)).unwrap();
        assert_eq!(ckpt.discriminator.features_shape().unwrap(), Shape3::new(8, 7, 7));
        assert_eq!(ckpt.discriminator.head.input_size(), 8 * 7 * 7);
        assert_eq!(ckpt.generator.layers.last().unwrap().size, 784);
    }

    #[test]
    fn rejects_mismatched_generator_shape() {
        let mut spec = dcgan_like();
        spec.generator.output_shape = Shape3::new(3, 28, 28);
        assert!(spec.build(&mut StdRng::seed_from_u64(3)).is_err());
    }

    #[test]
    fn spec_round_trips_through_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("arch.json");
        dcgan_like().save_json(&path).unwrap();
        let loaded = ArchitectureSpec::load_json(&path).unwrap();
        assert_eq!(loaded.discriminator.blocks.len(), 2);
        assert_eq!(loaded.generator.latent_dim, 8);
    }
}
