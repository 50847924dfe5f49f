use serde::{Serialize, Deserialize};
use std::fmt;

use crate::math::tensor::Tensor3;

/// A perturbed image kept for visualization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdversarialExample {
    /// Prediction on the clean image.
    pub original_pred: usize,
    /// Prediction on the perturbed image.
    pub adversarial_pred: usize,
    pub image: Tensor3,
}

impl AdversarialExample {
    pub fn flipped(&self) -> bool {
        self.original_pred != self.adversarial_pred
    }
}

/// Outcome of the attack at one epsilon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpsilonReport {
    pub epsilon: f64,
    /// Samples still classified correctly after perturbation.
    pub correct: usize,
    /// Size of the whole test set, skipped samples included.
    pub total: usize,
    /// `correct / total`, in [0, 1].
    pub accuracy: f64,
    /// Samples skipped because the clean image was already misclassified.
    pub skipped: usize,
    pub examples: Vec<AdversarialExample>,
    pub elapsed_ms: u64,
}

impl fmt::Display for EpsilonReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Epsilon: {}\tTest Accuracy = {} / {} = {}",
            self.epsilon, self.correct, self.total, self.accuracy
        )
    }
}
