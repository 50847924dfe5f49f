pub mod dense;
pub mod conv;
pub mod batch_norm;

pub use dense::Layer;
pub use conv::Conv2d;
pub use batch_norm::BatchNorm2d;
