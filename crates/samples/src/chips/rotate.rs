//! Resampling of a square pixel window rotated about its center.

use geo::raster::BandBuffer;

const SNAP_TOLERANCE: f64 = 1e-9;

fn snap(value: f64) -> f64 {
    let rounded = value.round();
    if (value - rounded).abs() < SNAP_TOLERANCE { rounded } else { value }
}

/// Counter-clockwise rotation of pixel coordinates around the center of a square window
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rotation {
    cos: f64,
    sin: f64,
}

impl Rotation {
    pub fn from_degrees(angle: f64) -> Self {
        let radians = angle.to_radians();
        Rotation {
            cos: snap(radians.cos()),
            sin: snap(radians.sin()),
        }
    }

    /// The position in the source window of side `side` that ends up at `(row, col)` in the rotated window
    pub fn source_position(&self, side: usize, row: usize, col: usize) -> (f64, f64) {
        let center = (side as f64 - 1.0) / 2.0;
        let dx = col as f64 - center;
        let dy = row as f64 - center;

        let src_col = center + self.cos * dx - self.sin * dy;
        let src_row = center + self.sin * dx + self.cos * dy;
        (snap(src_row), snap(src_col))
    }
}

/// A square window of a band buffer
pub struct SourceWindow<'a> {
    buffer: &'a BandBuffer,
    top: usize,
    left: usize,
    side: usize,
}

impl<'a> SourceWindow<'a> {
    pub fn new(buffer: &'a BandBuffer, top: usize, left: usize, side: usize) -> Self {
        debug_assert!(top + side <= buffer.size().rows && left + side <= buffer.size().cols);
        SourceWindow { buffer, top, left, side }
    }

    fn value(&self, row: usize, col: usize) -> f64 {
        self.buffer.value(self.top + row, self.left + col)
    }

    fn clamp(&self, pos: f64) -> f64 {
        pos.clamp(0.0, (self.side - 1) as f64)
    }

    /// Bilinear interpolation, positions outside of the window take the nearest edge value.
    /// Neighbours with a zero weight do not contribute so nodata values next to an exact position do not leak in.
    pub fn bilinear(&self, row: f64, col: f64) -> f64 {
        let row = self.clamp(row);
        let col = self.clamp(col);

        let row0 = row.floor() as usize;
        let col0 = col.floor() as usize;
        let row1 = (row0 + 1).min(self.side - 1);
        let col1 = (col0 + 1).min(self.side - 1);
        let row_weight = row - row0 as f64;
        let col_weight = col - col0 as f64;

        let mut result = 0.0;
        for (r, wr) in [(row0, 1.0 - row_weight), (row1, row_weight)] {
            if wr == 0.0 {
                continue;
            }

            for (c, wc) in [(col0, 1.0 - col_weight), (col1, col_weight)] {
                if wc == 0.0 {
                    continue;
                }

                result += wr * wc * self.value(r, c);
            }
        }

        result
    }

    /// Value of the pixel closest to the position, positions outside of the window take the nearest edge value
    pub fn nearest(&self, row: f64, col: f64) -> f64 {
        self.value(self.clamp(row).round() as usize, self.clamp(col).round() as usize)
    }
}
