use rand::Rng;
use serde::{Serialize, Deserialize};

use crate::{math::matrix::Matrix, activation::activation::ActivationFunction};
use crate::error::{FgsmError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Layer {
    pub size: usize,
    pub weights: Matrix,
    pub biases: Matrix,
    pub activator: ActivationFunction,
}

impl Layer {
    pub fn new<R: Rng + ?Sized>(
        size: usize,
        input_size: usize,
        activation: ActivationFunction,
        rng: &mut R,
    ) -> Layer {
        let weights = if activation.prefers_he_init() {
            Matrix::he(input_size, size, rng)
        } else {
            Matrix::xavier(input_size, size, rng)
        };
        let biases = Matrix::zeros(1, size);

        Layer {
            size,
            weights,
            biases,
            activator: activation,
        }
    }

    pub fn input_size(&self) -> usize {
        self.weights.rows
    }

    /// Checks that `weights` is `input_size x size`, `biases` is `1 x size`,
    /// and both matrices hold as many values as their headers claim.
    pub fn validate(&self) -> Result<()> {
        check_matrix("weights", &self.weights)?;
        check_matrix("biases", &self.biases)?;
        if self.weights.cols != self.size {
            return Err(FgsmError::InvalidSpec(format!(
                "dense layer of size {} has {} weight columns",
                self.size, self.weights.cols
            )));
        }
        if self.biases.rows != 1 || self.biases.cols != self.size {
            return Err(FgsmError::InvalidSpec(format!(
                "dense layer of size {} has {}x{} biases",
                self.size, self.biases.rows, self.biases.cols
            )));
        }
        Ok(())
    }

    /// Forward pass for one input row. Returns the activation `a` and the
    /// pre-activation `z = xW + b`, which `backprop_input` needs.
    pub fn feed_from(&self, input: &[f64]) -> Result<(Vec<f64>, Matrix)> {
        if input.len() != self.input_size() {
            return Err(FgsmError::shape(
                format!("{} dense inputs", self.input_size()),
                input.len(),
            ));
        }
        let z = &Matrix::row(input) * &self.weights + self.biases.clone();
        let a = z.map(|x| self.activator.function(x));
        Ok((a.data[0].clone(), z))
    }

    /// Propagates `upstream` (∂L/∂a for this layer) back to ∂L/∂input.
    pub fn backprop_input(&self, pre: &Matrix, upstream: &[f64]) -> Vec<f64> {
        // Use pre-activation z so that derivative(z) = σ'(z) is computed correctly
        let act_derivative = pre.map(|x| self.activator.derivative(x));
        // δ = error ⊙ σ'(z)
        let layer_delta = Matrix::row(upstream).hadamard(&act_derivative);
        let input_delta = &layer_delta * &self.weights.transpose();
        input_delta.data[0].clone()
    }
}

fn check_matrix(name: &str, m: &Matrix) -> Result<()> {
    if m.data.len() != m.rows || m.data.iter().any(|row| row.len() != m.cols) {
        return Err(FgsmError::InvalidSpec(format!(
            "{} data does not match its {}x{} header",
            name, m.rows, m.cols
        )));
    }
    Ok(())
}
