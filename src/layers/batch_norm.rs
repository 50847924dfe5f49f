use serde::{Serialize, Deserialize};

use crate::error::{FgsmError, Result};
use crate::math::tensor::Tensor3;

fn default_eps() -> f64 {
    1e-5
}

/// Per-channel batch normalization in evaluation mode: the running
/// statistics are fixed, so the layer is an affine map per channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchNorm2d {
    pub gamma: Vec<f64>,
    pub beta: Vec<f64>,
    pub running_mean: Vec<f64>,
    pub running_var: Vec<f64>,
    #[serde(default = "default_eps")]
    pub eps: f64,
}

impl BatchNorm2d {
    /// Identity-initialized normalization for `channels` channels.
    pub fn new(channels: usize) -> BatchNorm2d {
        BatchNorm2d {
            gamma: vec![1.0; channels],
            beta: vec![0.0; channels],
            running_mean: vec![0.0; channels],
            running_var: vec![1.0; channels],
            eps: default_eps(),
        }
    }

    pub fn channels(&self) -> usize {
        self.gamma.len()
    }

    pub fn validate(&self) -> Result<()> {
        let n = self.channels();
        if self.beta.len() != n || self.running_mean.len() != n || self.running_var.len() != n {
            return Err(FgsmError::InvalidSpec(
                "batch norm parameter vectors differ in length".into(),
            ));
        }
        if self.running_var.iter().any(|&v| v + self.eps <= 0.0) {
            return Err(FgsmError::InvalidSpec(
                "batch norm running variance must be positive".into(),
            ));
        }
        Ok(())
    }

    fn scale(&self, c: usize) -> f64 {
        self.gamma[c] / (self.running_var[c] + self.eps).sqrt()
    }

    pub fn forward(&self, input: &Tensor3) -> Result<Tensor3> {
        self.check_channels(input)?;
        let plane = input.height * input.width;
        let mut out = input.clone();
        for (c, chunk) in out.data.chunks_mut(plane.max(1)).enumerate().take(input.channels) {
            let scale = self.scale(c);
            let shift = self.beta[c] - self.running_mean[c] * scale;
            for v in chunk.iter_mut() {
                *v = *v * scale + shift;
            }
        }
        Ok(out)
    }

    pub fn backprop_input(&self, upstream: &Tensor3) -> Result<Tensor3> {
        self.check_channels(upstream)?;
        let plane = upstream.height * upstream.width;
        let mut grad = upstream.clone();
        for (c, chunk) in grad.data.chunks_mut(plane.max(1)).enumerate().take(upstream.channels) {
            let scale = self.scale(c);
            for v in chunk.iter_mut() {
                *v *= scale;
            }
        }
        Ok(grad)
    }

    fn check_channels(&self, t: &Tensor3) -> Result<()> {
        if t.channels != self.channels() {
            return Err(FgsmError::shape(
                format!("{} normalized channels", self.channels()),
                t.shape(),
            ));
        }
        Ok(())
    }
}
