use serde::{Serialize, Deserialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use crate::error::{FgsmError, Result};
use crate::model::discriminator::Discriminator;
use crate::model::generator::Generator;

/// Optional annotations stored next to the weights.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ModelMetadata {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Human-readable class labels for the decision head (e.g. ["fake", "real"]).
    #[serde(default)]
    pub output_labels: Option<Vec<String>>,
}

/// A pretrained weight file: the discriminator under attack plus the
/// generator that supplies penalty counterparts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    #[serde(default)]
    pub metadata: ModelMetadata,
    pub discriminator: Discriminator,
    pub generator: Generator,
}

impl Checkpoint {
    pub fn validate(&self) -> Result<()> {
        self.discriminator.validate()?;
        self.generator.validate()?;
        if self.generator.output_shape != self.discriminator.input_shape {
            return Err(FgsmError::InvalidSpec(format!(
                "generator produces {} images but the discriminator expects {}",
                self.generator.output_shape, self.discriminator.input_shape
            )));
        }
        if let Some(labels) = &self.metadata.output_labels {
            let classes = self.discriminator.num_classes().max(2);
            if labels.len() != classes {
                return Err(FgsmError::InvalidSpec(format!(
                    "{} output labels for {} classes",
                    labels.len(), classes
                )));
            }
        }
        Ok(())
    }

    /// Human-readable name of a predicted class.
    pub fn label_name(&self, class: usize) -> String {
        self.metadata
            .output_labels
            .as_ref()
            .and_then(|labels| labels.get(class).cloned())
            .unwrap_or_else(|| class.to_string())
    }

    /// Serializes the checkpoint to a pretty-printed JSON file.
    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<()> {
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    /// Loads and validates a checkpoint written by `save_json`.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Checkpoint> {
        let reader = BufReader::new(File::open(path)?);
        let checkpoint: Checkpoint = serde_json::from_reader(reader)?;
        checkpoint.validate()?;
        Ok(checkpoint)
    }
}
