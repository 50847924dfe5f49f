use serde::{Serialize, Deserialize};
use std::f64::consts::E;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ActivationFunction {
    Sigmoid,
    ReLU,
    Identity,
    Tanh,
    LeakyReLU { alpha: f64 },
}

impl ActivationFunction {
    pub fn function(&self, x: f64) -> f64 {
        match self {
            ActivationFunction::Sigmoid => 1.0 / (1.0 + E.powf(-x)),
            ActivationFunction::ReLU => if x > 0.0 { x } else { 0.0 },
            ActivationFunction::Identity => x,
            ActivationFunction::Tanh => x.tanh(),
            ActivationFunction::LeakyReLU { alpha } => if x > 0.0 { x } else { alpha * x },
        }
    }

    /// Element-wise derivative, evaluated at the pre-activation value.
    pub fn derivative(&self, x: f64) -> f64 {
        match self {
            ActivationFunction::Sigmoid => {
                let fx = self.function(x);
                fx * (1.0 - fx)
            },
            ActivationFunction::ReLU => if x > 0.0 { 1.0 } else { 0.0 },
            ActivationFunction::Identity => 1.0,
            ActivationFunction::Tanh => {
                let t = x.tanh();
                1.0 - t * t
            }
            ActivationFunction::LeakyReLU { alpha } => if x > 0.0 { 1.0 } else { *alpha },
        }
    }

    /// ReLU-family activations get He init; everything else Xavier.
    pub fn prefers_he_init(&self) -> bool {
        matches!(self, ActivationFunction::ReLU | ActivationFunction::LeakyReLU { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn derivatives_match_finite_differences() {
        let h = 1e-6;
        for act in [
            ActivationFunction::Sigmoid,
            ActivationFunction::Tanh,
            ActivationFunction::Identity,
            ActivationFunction::LeakyReLU { alpha: 0.2 },
        ] {
            for &x in &[-1.3, -0.4, 0.7, 2.1] {
                let numeric = (act.function(x + h) - act.function(x - h)) / (2.0 * h);
                assert_relative_eq!(act.derivative(x), numeric, epsilon = 1e-6);
            }
        }
    }

    #[test]
    fn leaky_relu_scales_negative_side() {
        let act = ActivationFunction::LeakyReLU { alpha: 0.2 };
        assert_eq!(act.function(-2.0), -0.4);
        assert_eq!(act.function(3.0), 3.0);
    }
}
