pub mod fgsm;
pub mod loss;
pub mod penalty;

pub use fgsm::perturb;
pub use loss::{AttackLoss, LossGradient};
pub use penalty::{GradientPenalty, Penalty};
