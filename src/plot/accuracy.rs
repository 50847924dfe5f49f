use plotters::prelude::*;
use std::path::Path;

use crate::error::{FgsmError, Result};
use crate::eval::report::EpsilonReport;
use crate::plot::plot_error;

const SIZE: (u32, u32) = (720, 480);
const LINE: RGBColor = RGBColor(31, 119, 180);

/// Upper end of the epsilon axis. A sweep of only epsilon 0 still gets a
/// unit-wide axis.
fn epsilon_span(reports: &[EpsilonReport]) -> f64 {
    let max = reports.iter().map(|r| r.epsilon).fold(0.0_f64, f64::max);
    if max > 0.0 { max } else { 1.0 }
}

/// Line chart of accuracy (0 to 1) against epsilon with a marker per
/// evaluated epsilon, written as PNG.
pub fn render_accuracy_curve(reports: &[EpsilonReport], path: impl AsRef<Path>) -> Result<()> {
    if reports.is_empty() {
        return Err(FgsmError::InvalidConfig("no reports to plot".into()));
    }
    let path = path.as_ref();
    let root = BitMapBackend::new(path, SIZE).into_drawing_area();
    root.fill(&WHITE).map_err(plot_error)?;

    {
        let mut chart = ChartBuilder::on(&root)
            .margin(15)
            .caption("Accuracy vs Epsilon", ("sans-serif", 24))
            .x_label_area_size(45)
            .y_label_area_size(55)
            .build_cartesian_2d(0.0..epsilon_span(reports), 0.0..1.0)
            .map_err(plot_error)?;

        chart
            .configure_mesh()
            .x_desc("Epsilon")
            .y_desc("Accuracy")
            .x_labels(reports.len().max(2))
            .y_labels(11)
            .x_label_formatter(&|x| format!("{:.2}", x))
            .y_label_formatter(&|y| format!("{:.1}", y))
            .draw()
            .map_err(plot_error)?;

        let points: Vec<(f64, f64)> = reports.iter().map(|r| (r.epsilon, r.accuracy)).collect();
        chart
            .draw_series(LineSeries::new(points.iter().copied(), LINE.stroke_width(2)))
            .map_err(plot_error)?;
        chart
            .draw_series(points.iter().map(|&p| Circle::new(p, 4, LINE.filled())))
            .map_err(plot_error)?;
    }

    root.present().map_err(plot_error)?;
    Ok(())
}
