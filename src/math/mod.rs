pub mod matrix;
pub mod tensor;

use rand::Rng;
use std::f64::consts::PI;

pub use matrix::Matrix;
pub use tensor::Tensor3;

/// Samples a single value from N(0, 1) using the Box-Muller transform.
pub fn sample_standard_normal<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    // Draw two independent uniform samples in (0, 1] to avoid log(0).
    let u1: f64 = 1.0 - rng.gen::<f64>();
    let u2: f64 = 1.0 - rng.gen::<f64>();
    (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
}

/// Sign with `sign(0) == 0`, unlike `f64::signum`.
pub fn sign(x: f64) -> f64 {
    if x > 0.0 {
        1.0
    } else if x < 0.0 {
        -1.0
    } else {
        0.0
    }
}
