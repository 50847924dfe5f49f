pub mod dataset;
pub mod idx;

pub use dataset::{Dataset, PerturbedSet, Sample};
pub use idx::parse_idx_pair;
