use serde::{Serialize, Deserialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use crate::data::idx::parse_idx_pair;
use crate::error::{FgsmError, Result};
use crate::math::tensor::{Shape3, Tensor3};

/// One labelled test image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub image: Tensor3,
    pub label: usize,
}

/// The read-only test set the attack is evaluated on.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Dataset {
    pub samples: Vec<Sample>,
}

/// The zero-epsilon output: perturbed images and their labels, index-aligned.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerturbedSet {
    pub images: Vec<Tensor3>,
    pub labels: Vec<usize>,
}

impl Dataset {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn image_shape(&self) -> Option<Shape3> {
        self.samples.first().map(|s| s.image.shape())
    }

    /// Every image shares one shape and holds finite values in [0, 1].
    pub fn validate(&self) -> Result<()> {
        let Some(shape) = self.image_shape() else {
            return Err(FgsmError::InvalidDataset("dataset holds no samples".into()));
        };
        for (i, sample) in self.samples.iter().enumerate() {
            sample.image.expect_shape(shape)?;
            if !sample.image.data.iter().all(|v| (0.0..=1.0).contains(v)) {
                return Err(FgsmError::InvalidDataset(format!(
                    "sample {} has pixel values outside [0, 1]",
                    i
                )));
            }
        }
        Ok(())
    }

    /// Builds a dataset from IDX bytes. With `digit` set, only samples of that
    /// class are kept; `relabel` then replaces their label (e.g. 1 = "real").
    pub fn from_idx(
        image_bytes: &[u8],
        label_bytes: &[u8],
        digit: Option<u8>,
        relabel: Option<usize>,
    ) -> Result<Dataset> {
        let parsed = parse_idx_pair(image_bytes, label_bytes)?;
        let samples = parsed
            .images
            .into_iter()
            .zip(parsed.labels)
            .filter(|(_, label)| digit.map_or(true, |d| d == *label))
            .map(|(image, label)| Sample {
                image,
                label: relabel.unwrap_or(label as usize),
            })
            .collect();
        Ok(Dataset { samples })
    }

    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<()> {
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer(writer, self)?;
        Ok(())
    }

    /// Loads and validates a dataset written by `save_json`.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Dataset> {
        let reader = BufReader::new(File::open(path)?);
        let dataset: Dataset = serde_json::from_reader(reader)?;
        dataset.validate()?;
        Ok(dataset)
    }
}

impl PerturbedSet {
    pub fn push(&mut self, image: Tensor3, label: usize) {
        self.images.push(image);
        self.labels.push(label);
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<()> {
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer(writer, self)?;
        Ok(())
    }

    pub fn load_json(path: impl AsRef<Path>) -> Result<PerturbedSet> {
        let reader = BufReader::new(File::open(path)?);
        let set: PerturbedSet = serde_json::from_reader(reader)?;
        if set.images.len() != set.labels.len() {
            return Err(FgsmError::InvalidDataset(format!(
                "{} perturbed images but {} labels",
                set.images.len(), set.labels.len()
            )));
        }
        Ok(set)
    }
}
