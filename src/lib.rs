pub mod error;
pub mod math;
pub mod activation;
pub mod layers;
pub mod model;
pub mod attack;
pub mod data;
pub mod eval;
pub mod plot;

// Convenience re-exports
pub use error::{FgsmError, Result};
pub use math::tensor::{Shape3, Tensor3};
pub use activation::activation::ActivationFunction;
pub use model::{Checkpoint, Discriminator, Generator, OutputSelect};
pub use attack::{perturb, AttackLoss, GradientPenalty};
pub use data::{Dataset, PerturbedSet, Sample};
pub use eval::{run_experiment, AttackContext, EpsilonReport, ExperimentConfig};
