//! Parse a pair of IDX binary files (image + label) as used by MNIST and its
//! derivatives (Fashion-MNIST, EMNIST, …).
//!
//! # IDX3 image file layout
//! ```text
//! bytes  0-1:   0x00 0x00   (reserved, must be zero)
//! byte   2:     0x08        (dtype = uint8)
//! byte   3:     0x03        (number of dimensions = 3)
//! bytes  4-7:   N           (number of images, big-endian u32)
//! bytes  8-11:  rows        (image height in pixels, big-endian u32)
//! bytes 12-15:  cols        (image width in pixels, big-endian u32)
//! bytes 16..:   N * rows * cols bytes, row-major, uint8
//! ```
//!
//! # IDX1 label file layout
//! ```text
//! bytes  0-1:   0x00 0x00   (reserved, must be zero)
//! byte   2:     0x08        (dtype = uint8)
//! byte   3:     0x01        (number of dimensions = 1)
//! bytes  4-7:   N           (number of labels, big-endian u32)
//! bytes  8..:   N bytes, each a class index
//! ```

use crate::error::{FgsmError, Result};
use crate::math::tensor::{Shape3, Tensor3};

/// Images decoded from an IDX pair, pixels scaled into [0, 1].
#[derive(Debug, Clone)]
pub struct IdxImages {
    pub images: Vec<Tensor3>,
    pub labels: Vec<u8>,
}

fn be_u32(bytes: &[u8], offset: usize) -> usize {
    u32::from_be_bytes([
        bytes[offset], bytes[offset + 1], bytes[offset + 2], bytes[offset + 3],
    ]) as usize
}

fn check_header(bytes: &[u8], what: &str, dims: u8, header_len: usize) -> Result<()> {
    if bytes.len() < header_len {
        return Err(FgsmError::Idx(format!(
            "{} file too short: expected at least {} header bytes, got {}.",
            what, header_len, bytes.len()
        )));
    }
    if bytes[0] != 0x00 || bytes[1] != 0x00 {
        return Err(FgsmError::Idx(format!(
            "{} file: bytes 0-1 must be 0x00 0x00 (reserved), got 0x{:02X} 0x{:02X}.",
            what, bytes[0], bytes[1]
        )));
    }
    if bytes[2] != 0x08 {
        return Err(FgsmError::Idx(format!(
            "{} file: byte 2 (dtype) must be 0x08 (uint8), got 0x{:02X}.",
            what, bytes[2]
        )));
    }
    if bytes[3] != dims {
        return Err(FgsmError::Idx(format!(
            "{} file: byte 3 (dimensions) must be {}, got {}.",
            what, dims, bytes[3]
        )));
    }
    Ok(())
}

pub fn parse_idx_pair(image_bytes: &[u8], label_bytes: &[u8]) -> Result<IdxImages> {
    // ── Image file validation ───────────────────────────────────────────────

    check_header(image_bytes, "IDX image", 0x03, 16)?;

    let n_items = be_u32(image_bytes, 4);
    let rows = be_u32(image_bytes, 8);
    let cols = be_u32(image_bytes, 12);

    let n_pixels = rows.checked_mul(cols).ok_or_else(|| {
        FgsmError::Idx(format!("rows * cols overflows usize (rows={}, cols={}).", rows, cols))
    })?;
    let data_len = n_items.checked_mul(n_pixels).ok_or_else(|| {
        FgsmError::Idx(format!(
            "n_items * n_pixels overflows usize (n_items={}, n_pixels={}).",
            n_items, n_pixels
        ))
    })?;

    if image_bytes.len() - 16 < data_len {
        return Err(FgsmError::Idx(format!(
            "IDX image file too short: header declares {} items of {}×{} pixels \
             ({} data bytes needed after header), but file is only {} bytes total.",
            n_items, rows, cols, data_len, image_bytes.len()
        )));
    }

    // ── Label file validation ───────────────────────────────────────────────

    check_header(label_bytes, "IDX label", 0x01, 8)?;

    let label_count = be_u32(label_bytes, 4);
    if label_count != n_items {
        return Err(FgsmError::Idx(format!(
            "image file declares {} items but label file declares {}.",
            n_items, label_count
        )));
    }
    if label_bytes.len() - 8 < n_items {
        return Err(FgsmError::Idx(format!(
            "IDX label file too short: header declares {} labels but file is only {} bytes.",
            n_items, label_bytes.len()
        )));
    }

    // ── Decode ──────────────────────────────────────────────────────────────

    let shape = Shape3::new(1, rows, cols);
    let images = if n_pixels == 0 {
        vec![Tensor3::zeros(shape); n_items]
    } else {
        image_bytes[16..16 + data_len]
            .chunks_exact(n_pixels)
            .map(|chunk| Tensor3::from_vec(shape, chunk.iter().map(|&px| px as f64 / 255.0).collect()))
            .collect::<Result<Vec<_>>>()?
    };
    let labels = label_bytes[8..8 + n_items].to_vec();

    Ok(IdxImages { images, labels })
}
