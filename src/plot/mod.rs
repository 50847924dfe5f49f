pub mod accuracy;
pub mod grid;

pub use accuracy::render_accuracy_curve;
pub use grid::render_example_grid;

use crate::error::FgsmError;

pub(crate) fn plot_error<E: std::fmt::Display>(e: E) -> FgsmError {
    FgsmError::Plot(e.to_string())
}
