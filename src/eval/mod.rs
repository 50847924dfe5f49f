pub mod config;
pub mod loop_fn;
pub mod report;

pub use config::ExperimentConfig;
pub use loop_fn::{run_epsilon, run_experiment, AttackContext, EpsilonRun, ExperimentResult};
pub use report::{AdversarialExample, EpsilonReport};
