use plotters::prelude::*;
use std::path::Path;

use crate::error::{FgsmError, Result};
use crate::eval::report::{AdversarialExample, EpsilonReport};
use crate::math::tensor::Tensor3;
use crate::plot::plot_error;

const TILE: u32 = 120;
const CAPTION: u32 = 22;
const FRAME: i32 = 3;
const KEPT: RGBColor = RGBColor(44, 160, 44);
const FLIPPED: RGBColor = RGBColor(214, 39, 40);

/// Pixel color of a [0, 1] image at `(x, y)`: RGB for three channels,
/// grayscale from the first channel otherwise.
fn tensor_color(t: &Tensor3, x: usize, y: usize) -> RGBColor {
    let to_u8 = |v: f64| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
    if t.channels == 3 {
        RGBColor(to_u8(t.at(0, y, x)), to_u8(t.at(1, y, x)), to_u8(t.at(2, y, x)))
    } else {
        let g = to_u8(t.at(0, y, x));
        RGBColor(g, g, g)
    }
}

fn caption<F: Fn(usize) -> String>(epsilon: f64, example: &AdversarialExample, label: &F) -> String {
    format!(
        "eps {}: {} -> {}",
        epsilon,
        label(example.original_pred),
        label(example.adversarial_pred)
    )
}

/// One row per epsilon, one captioned tile per kept example. A green frame
/// marks a prediction that survived the perturbation, red one that flipped.
/// `label` names a predicted class in the captions.
pub fn render_example_grid<F>(reports: &[EpsilonReport], label: F, path: impl AsRef<Path>) -> Result<()>
where
    F: Fn(usize) -> String,
{
    let first = reports
        .iter()
        .flat_map(|r| r.examples.first())
        .next()
        .ok_or_else(|| FgsmError::InvalidConfig("no examples to plot".into()))?;
    let (img_w, img_h) = (first.image.width, first.image.height);
    let rows = reports.len();
    let cols = reports.iter().map(|r| r.examples.len()).max().unwrap_or(1);

    let path = path.as_ref();
    let size = (cols as u32 * TILE, rows as u32 * (TILE + CAPTION));
    let root = BitMapBackend::new(path, size).into_drawing_area();
    root.fill(&WHITE).map_err(plot_error)?;
    let cells = root.split_evenly((rows, cols));

    for (row, report) in reports.iter().enumerate() {
        for (col, example) in report.examples.iter().enumerate() {
            if example.image.width != img_w || example.image.height != img_h {
                return Err(FgsmError::shape(
                    format!("{}x{} example", img_h, img_w),
                    example.image.shape(),
                ));
            }
            let cell = cells[row * cols + col]
                .titled(&caption(report.epsilon, example, &label), ("sans-serif", 14))
                .map_err(plot_error)?;
            cell.fill(if example.flipped() { &FLIPPED } else { &KEPT })
                .map_err(plot_error)?;

            let tile = cell.margin(FRAME, FRAME, FRAME, FRAME);
            let (w, h) = tile.dim_in_pixel();
            let scale = (w as usize / img_w).min(h as usize / img_h).max(1) as i32;
            for y in 0..img_h {
                for x in 0..img_w {
                    let (x0, y0) = (x as i32 * scale, y as i32 * scale);
                    tile.draw(&Rectangle::new(
                        [(x0, y0), (x0 + scale, y0 + scale)],
                        tensor_color(&example.image, x, y).filled(),
                    ))
                    .map_err(plot_error)?;
                }
            }
        }
    }

    root.present().map_err(plot_error)?;
    Ok(())
}
