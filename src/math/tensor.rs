use serde::{Serialize, Deserialize};
use std::fmt;

use crate::error::{FgsmError, Result};

/// A single image or feature map stored channel-major: index
/// `c * height * width + y * width + x`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tensor3 {
    pub channels: usize,
    pub height: usize,
    pub width: usize,
    pub data: Vec<f64>,
}

/// `(channels, height, width)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shape3 {
    pub channels: usize,
    pub height: usize,
    pub width: usize,
}

impl Shape3 {
    pub fn new(channels: usize, height: usize, width: usize) -> Shape3 {
        Shape3 { channels, height, width }
    }

    pub fn len(&self) -> usize {
        self.channels * self.height * self.width
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Display for Shape3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}x{}", self.channels, self.height, self.width)
    }
}

impl Tensor3 {
    pub fn zeros(shape: Shape3) -> Tensor3 {
        Tensor3 {
            channels: shape.channels,
            height: shape.height,
            width: shape.width,
            data: vec![0.0; shape.len()],
        }
    }

    pub fn from_vec(shape: Shape3, data: Vec<f64>) -> Result<Tensor3> {
        if data.len() != shape.len() {
            return Err(FgsmError::shape(
                format!("{} values for {}", shape.len(), shape),
                format!("{} values", data.len()),
            ));
        }
        Ok(Tensor3 {
            channels: shape.channels,
            height: shape.height,
            width: shape.width,
            data,
        })
    }

    pub fn shape(&self) -> Shape3 {
        Shape3::new(self.channels, self.height, self.width)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn index(&self, c: usize, y: usize, x: usize) -> usize {
        (c * self.height + y) * self.width + x
    }

    #[inline]
    pub fn at(&self, c: usize, y: usize, x: usize) -> f64 {
        self.data[self.index(c, y, x)]
    }

    pub fn map<F>(&self, functor: F) -> Tensor3
    where
        F: Fn(f64) -> f64,
    {
        Tensor3 {
            data: self.data.iter().map(|&v| functor(v)).collect(),
            ..self.clone_shape()
        }
    }

    /// Combines two same-shape tensors element by element.
    pub fn zip_map<F>(&self, other: &Tensor3, functor: F) -> Result<Tensor3>
    where
        F: Fn(f64, f64) -> f64,
    {
        self.expect_shape(other.shape())?;
        Ok(Tensor3 {
            data: self.data.iter().zip(&other.data).map(|(&a, &b)| functor(a, b)).collect(),
            ..self.clone_shape()
        })
    }

    /// `self + scale * other`.
    pub fn add_scaled(&self, other: &Tensor3, scale: f64) -> Result<Tensor3> {
        self.zip_map(other, |a, b| a + scale * b)
    }

    pub fn clamp(&self, min: f64, max: f64) -> Tensor3 {
        self.map(|v| v.clamp(min, max))
    }

    pub fn sum(&self) -> f64 {
        self.data.iter().sum()
    }

    pub fn mean(&self) -> f64 {
        if self.data.is_empty() {
            return 0.0;
        }
        self.sum() / self.data.len() as f64
    }

    pub fn l2_norm(&self) -> f64 {
        self.data.iter().map(|v| v * v).sum::<f64>().sqrt()
    }

    pub fn is_finite(&self) -> bool {
        self.data.iter().all(|v| v.is_finite())
    }

    pub fn expect_shape(&self, shape: Shape3) -> Result<()> {
        if self.shape() != shape || self.data.len() != shape.len() {
            return Err(FgsmError::shape(shape, self.shape()));
        }
        Ok(())
    }

    fn clone_shape(&self) -> Tensor3 {
        Tensor3 {
            channels: self.channels,
            height: self.height,
            width: self.width,
            data: Vec::new(),
        }
    }
}
