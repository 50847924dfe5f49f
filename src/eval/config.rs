use serde::{Serialize, Deserialize};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use crate::attack::fgsm::check_epsilon;
use crate::error::{FgsmError, Result};
use crate::model::output::OutputSelect;

/// Settings for one attack evaluation run.
///
/// Every field has a default, so a JSON config only needs to name what it
/// changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    /// Perturbation strengths, evaluated in this order.
    pub epsilons: Vec<f64>,
    /// Test set written by `Dataset::save_json`.
    pub data_path: PathBuf,
    /// Pretrained checkpoint written by `Checkpoint::save_json`.
    pub weights_path: PathBuf,
    /// Where the zero-epsilon perturbed set is written.
    pub perturbed_path: PathBuf,
    /// Directory for the accuracy curve and example grid; `None` skips plots.
    pub plots_dir: Option<PathBuf>,
    /// Adversarial examples kept per epsilon for visualization.
    pub examples_per_epsilon: usize,
    /// Weight of the gradient-penalty term in the attack loss.
    pub penalty_weight: f64,
    /// Discriminator output the loss is computed on.
    pub output: OutputSelect,
    pub seed: u64,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        ExperimentConfig {
            epsilons: vec![0.0, 0.05, 0.1, 0.15, 0.2, 0.25, 0.3],
            data_path: PathBuf::from("data/test.json"),
            weights_path: PathBuf::from("weights/checkpoint.json"),
            perturbed_path: PathBuf::from("out/perturbed.json"),
            plots_dir: Some(PathBuf::from("out")),
            examples_per_epsilon: 5,
            penalty_weight: 10.0,
            output: OutputSelect::Logits,
            seed: 0,
        }
    }
}

impl ExperimentConfig {
    pub fn load_json(path: impl AsRef<Path>) -> Result<ExperimentConfig> {
        let reader = BufReader::new(File::open(path)?);
        let config: ExperimentConfig = serde_json::from_reader(reader)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.epsilons.is_empty() {
            return Err(FgsmError::InvalidConfig("epsilon list is empty".into()));
        }
        for &eps in &self.epsilons {
            check_epsilon(eps)?;
        }
        if !self.penalty_weight.is_finite() {
            return Err(FgsmError::InvalidConfig(format!(
                "penalty weight must be finite, got {}",
                self.penalty_weight
            )));
        }
        Ok(())
    }
}
