use crate::error::{FgsmError, Result};
use crate::math::sign;
use crate::math::tensor::Tensor3;

/// Rejects perturbation strengths outside [0, 1].
pub fn check_epsilon(epsilon: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&epsilon) {
        return Err(FgsmError::InvalidEpsilon(epsilon));
    }
    Ok(())
}

/// Fast Gradient Sign Method step:
/// `clip(image + epsilon * sign(gradient), 0, 1)`.
///
/// Returns a new tensor; `image` is left untouched. With `epsilon == 0`
/// the result equals `image`.
pub fn perturb(image: &Tensor3, epsilon: f64, gradient: &Tensor3) -> Result<Tensor3> {
    check_epsilon(epsilon)?;
    gradient.expect_shape(image.shape())?;
    if !gradient.is_finite() {
        return Err(FgsmError::NonFiniteGradient);
    }
    if epsilon == 0.0 {
        return Ok(image.clone());
    }
    image.zip_map(gradient, |x, g| (x + epsilon * sign(g)).clamp(0.0, 1.0))
}
