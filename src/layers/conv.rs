use rand::Rng;
use serde::{Serialize, Deserialize};

use crate::error::{FgsmError, Result};
use crate::math::sample_standard_normal;
use crate::math::tensor::{Shape3, Tensor3};

/// 2-D convolution over a single `Tensor3`. Weights are laid out
/// `[out_channel][in_channel][ky][kx]`, flattened.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conv2d {
    pub in_channels: usize,
    pub out_channels: usize,
    pub kernel_size: usize,
    pub stride: usize,
    pub padding: usize,
    pub weights: Vec<f64>,
    pub bias: Vec<f64>,
}

impl Conv2d {
    /// Samples weights from N(0, sqrt(gain / fan_in)); `gain` is 2 for He
    /// and 1 for Xavier.
    pub fn new<R: Rng + ?Sized>(
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        stride: usize,
        padding: usize,
        gain: f64,
        rng: &mut R,
    ) -> Conv2d {
        let fan_in = (in_channels * kernel_size * kernel_size).max(1);
        let std_dev = (gain / fan_in as f64).sqrt();
        let weights = (0..out_channels * fan_in)
            .map(|_| sample_standard_normal(rng) * std_dev)
            .collect();
        Conv2d {
            in_channels,
            out_channels,
            kernel_size,
            stride,
            padding,
            weights,
            bias: vec![0.0; out_channels],
        }
    }

    /// Checks that the stored weight buffers agree with the declared shape.
    pub fn validate(&self) -> Result<()> {
        let expected = self.out_channels * self.in_channels * self.kernel_size * self.kernel_size;
        if self.weights.len() != expected || self.bias.len() != self.out_channels {
            return Err(FgsmError::InvalidSpec(format!(
                "conv weights hold {} values and {} biases, expected {} and {}",
                self.weights.len(), self.bias.len(), expected, self.out_channels
            )));
        }
        if self.stride == 0 || self.kernel_size == 0 {
            return Err(FgsmError::InvalidSpec("conv stride and kernel must be positive".into()));
        }
        Ok(())
    }

    pub fn output_shape(&self, input: Shape3) -> Result<Shape3> {
        if input.channels != self.in_channels {
            return Err(FgsmError::shape(
                format!("{} input channels", self.in_channels),
                input,
            ));
        }
        let padded_h = input.height + 2 * self.padding;
        let padded_w = input.width + 2 * self.padding;
        if padded_h < self.kernel_size || padded_w < self.kernel_size {
            return Err(FgsmError::shape(
                format!("input of at least {0}x{0} after padding", self.kernel_size),
                input,
            ));
        }
        Ok(Shape3::new(
            self.out_channels,
            (padded_h - self.kernel_size) / self.stride + 1,
            (padded_w - self.kernel_size) / self.stride + 1,
        ))
    }

    #[inline]
    fn weight_index(&self, oc: usize, ic: usize, ky: usize, kx: usize) -> usize {
        ((oc * self.in_channels + ic) * self.kernel_size + ky) * self.kernel_size + kx
    }

    /// Maps an output coordinate plus kernel offset to an input coordinate,
    /// or `None` when it falls into the zero padding.
    #[inline]
    fn source(&self, out: usize, k: usize, extent: usize) -> Option<usize> {
        let pos = (out * self.stride + k) as isize - self.padding as isize;
        if pos >= 0 && (pos as usize) < extent {
            Some(pos as usize)
        } else {
            None
        }
    }

    pub fn forward(&self, input: &Tensor3) -> Result<Tensor3> {
        let out_shape = self.output_shape(input.shape())?;
        let mut out = Tensor3::zeros(out_shape);

        for oc in 0..out_shape.channels {
            for oy in 0..out_shape.height {
                for ox in 0..out_shape.width {
                    let mut val = self.bias[oc];
                    for ic in 0..self.in_channels {
                        for ky in 0..self.kernel_size {
                            let Some(iy) = self.source(oy, ky, input.height) else { continue };
                            for kx in 0..self.kernel_size {
                                let Some(ix) = self.source(ox, kx, input.width) else { continue };
                                val += input.at(ic, iy, ix) * self.weights[self.weight_index(oc, ic, ky, kx)];
                            }
                        }
                    }
                    let idx = out.index(oc, oy, ox);
                    out.data[idx] = val;
                }
            }
        }

        Ok(out)
    }

    /// Given ∂L/∂output, returns ∂L/∂input for an input of `input_shape`.
    pub fn backprop_input(&self, input_shape: Shape3, upstream: &Tensor3) -> Result<Tensor3> {
        let out_shape = self.output_shape(input_shape)?;
        upstream.expect_shape(out_shape)?;
        let mut grad = Tensor3::zeros(input_shape);

        for oc in 0..out_shape.channels {
            for oy in 0..out_shape.height {
                for ox in 0..out_shape.width {
                    let delta = upstream.at(oc, oy, ox);
                    if delta == 0.0 {
                        continue;
                    }
                    for ic in 0..self.in_channels {
                        for ky in 0..self.kernel_size {
                            let Some(iy) = self.source(oy, ky, input_shape.height) else { continue };
                            for kx in 0..self.kernel_size {
                                let Some(ix) = self.source(ox, kx, input_shape.width) else { continue };
                                let idx = grad.index(ic, iy, ix);
                                grad.data[idx] += delta * self.weights[self.weight_index(oc, ic, ky, kx)];
                            }
                        }
                    }
                }
            }
        }

        Ok(grad)
    }
}
