pub mod checkpoint;
pub mod discriminator;
pub mod generator;
pub mod output;
pub mod spec;

pub use checkpoint::{Checkpoint, ModelMetadata};
pub use discriminator::{ConvBlock, Discriminator, ProjectionHead};
pub use generator::Generator;
pub use output::OutputSelect;
pub use spec::{ArchitectureSpec, ConvBlockSpec, DiscriminatorSpec, GeneratorSpec, ProjectionSpec};
