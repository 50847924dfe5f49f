use rand::Rng;
use serde::{Serialize, Deserialize};

use crate::error::{FgsmError, Result};
use crate::layers::Layer;
use crate::math::sample_standard_normal;
use crate::math::tensor::{Shape3, Tensor3};

/// Dense generator: latent vector -> hidden layers -> image.
///
/// Only its forward pass is used; it supplies the counterpart image for
/// the gradient-penalty loss.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Generator {
    pub latent_dim: usize,
    pub output_shape: Shape3,
    pub layers: Vec<Layer>,
}

impl Generator {
    pub fn validate(&self) -> Result<()> {
        let mut expected = self.latent_dim;
        for (i, layer) in self.layers.iter().enumerate() {
            layer.validate()?;
            if layer.input_size() != expected {
                return Err(FgsmError::InvalidSpec(format!(
                    "generator layer {} expects {} inputs but receives {}",
                    i, layer.input_size(), expected
                )));
            }
            expected = layer.size;
        }
        if expected != self.output_shape.len() {
            return Err(FgsmError::InvalidSpec(format!(
                "generator emits {} values but images hold {}",
                expected, self.output_shape.len()
            )));
        }
        Ok(())
    }

    /// Draws a latent vector from N(0, I).
    pub fn sample_latent<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<f64> {
        (0..self.latent_dim).map(|_| sample_standard_normal(rng)).collect()
    }

    pub fn generate(&self, latent: &[f64]) -> Result<Tensor3> {
        if latent.len() != self.latent_dim {
            return Err(FgsmError::shape(
                format!("latent of length {}", self.latent_dim),
                latent.len(),
            ));
        }
        let mut current = latent.to_vec();
        for layer in &self.layers {
            current = layer.feed_from(&current)?.0;
        }
        Tensor3::from_vec(self.output_shape, current)
    }

    /// Samples a latent and decodes it in one step.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Tensor3> {
        let latent = self.sample_latent(rng);
        self.generate(&latent)
    }
}
