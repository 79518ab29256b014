//! Mapping of map coordinate extents onto pixel windows of a raster grid.

use crate::{BoundingBox, Cell, GeoReference, RasterSize};

/// Offsets closer than this to a whole pixel are considered aligned on the pixel boundary
const ALIGNMENT_TOLERANCE: f64 = 1e-9;

/// A rectangular region of a raster in pixel space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PixelWindow {
    pub x_offset: usize,
    pub y_offset: usize,
    pub width: usize,
    pub height: usize,
}

impl PixelWindow {
    pub const fn new(x_offset: usize, y_offset: usize, width: usize, height: usize) -> Self {
        PixelWindow {
            x_offset,
            y_offset,
            width,
            height,
        }
    }

    pub fn has_pixels(&self) -> bool {
        self.width > 0 && self.height > 0
    }

    pub fn size(&self) -> RasterSize {
        RasterSize::with_rows_cols(self.height, self.width)
    }

    /// Clamp a raster cell into this window, the window must have pixels
    pub fn clamp_cell(&self, cell: Cell) -> Cell {
        debug_assert!(self.has_pixels());
        cell.clamped(
            (self.y_offset as i32, (self.y_offset + self.height) as i32 - 1),
            (self.x_offset as i32, (self.x_offset + self.width) as i32 - 1),
        )
    }
}

fn is_aligned(raw: f64) -> bool {
    (raw - raw.round()).abs() < ALIGNMENT_TOLERANCE
}

fn padded_start(raw: f64) -> f64 {
    if is_aligned(raw) { raw.round() } else { raw.floor() - 1.0 }
}

fn padded_end(raw: f64) -> f64 {
    if is_aligned(raw) { raw.round() } else { raw.ceil() + 1.0 }
}

fn clamp_offset(offset: f64, size: usize) -> usize {
    if offset.is_nan() || offset <= 0.0 {
        0
    } else {
        (offset as usize).min(size)
    }
}

/// Computes the pixel window of the raster grid that covers the bounding box.
///
/// The window is padded with one pixel on every side unless the bounding box edge aligns
/// exactly on a pixel boundary. The result is clamped to the raster extent, a bounding box that
/// does not overlap the raster yields a window without pixels.
pub fn compute_window(bbox: &BoundingBox, grid: &GeoReference) -> PixelWindow {
    let top_left = grid.top_left();
    let col_a = (bbox.xmin - top_left.x()) / grid.cell_size_x();
    let col_b = (bbox.xmax - top_left.x()) / grid.cell_size_x();
    let row_a = (bbox.ymax - top_left.y()) / grid.cell_size_y();
    let row_b = (bbox.ymin - top_left.y()) / grid.cell_size_y();

    let size = grid.raster_size();
    let col_start = clamp_offset(padded_start(col_a.min(col_b)), size.cols);
    let col_end = clamp_offset(padded_end(col_a.max(col_b)), size.cols);
    let row_start = clamp_offset(padded_start(row_a.min(row_b)), size.rows);
    let row_end = clamp_offset(padded_end(row_a.max(row_b)), size.rows);

    PixelWindow::new(
        col_start,
        row_start,
        col_end.saturating_sub(col_start),
        row_end.saturating_sub(row_start),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Point;

    fn grid() -> GeoReference {
        // 10 x 10 raster with 10m pixels, top left at (0, 100)
        GeoReference::with_origin("", RasterSize::square(10), Point::new(0.0, 100.0), 10.0, None)
    }

    #[test]
    fn aligned_bbox_is_not_padded() {
        let window = compute_window(&BoundingBox::new(20.0, 50.0, 40.0, 80.0), &grid());
        assert_eq!(window, PixelWindow::new(2, 2, 3, 4));
    }

    #[test]
    fn unaligned_bbox_is_padded() {
        let window = compute_window(&BoundingBox::new(25.0, 45.0, 45.0, 75.0), &grid());
        // columns 2.5 .. 4.5 -> 1 .. 6, rows 2.5 .. 5.5 -> 1 .. 7
        assert_eq!(window, PixelWindow::new(1, 1, 5, 6));
    }

    #[test]
    fn window_is_clamped_to_raster() {
        let window = compute_window(&BoundingBox::new(-35.0, 15.0, 85.0, 125.0), &grid());
        assert_eq!(window, PixelWindow::new(0, 0, 3, 3));

        let window = compute_window(&BoundingBox::new(95.0, 150.0, -50.0, 5.0), &grid());
        assert_eq!(window, PixelWindow::new(8, 8, 2, 2));
    }

    #[test]
    fn bbox_outside_raster_has_no_pixels() {
        let window = compute_window(&BoundingBox::new(200.0, 250.0, 40.0, 80.0), &grid());
        assert!(!window.has_pixels());

        let window = compute_window(&BoundingBox::new(20.0, 50.0, -80.0, -40.0), &grid());
        assert!(!window.has_pixels());
    }

    #[test]
    fn degenerate_aligned_bbox_has_no_pixels() {
        let window = compute_window(&BoundingBox::new(20.0, 20.0, 40.0, 80.0), &grid());
        assert_eq!(window.width, 0);
        assert!(!window.has_pixels());
    }

    #[test]
    fn clamp_cell_into_window() {
        let window = PixelWindow::new(2, 3, 4, 2);
        assert_eq!(window.clamp_cell(Cell::from_row_col(0, 0)), Cell::from_row_col(3, 2));
        assert_eq!(window.clamp_cell(Cell::from_row_col(9, 9)), Cell::from_row_col(4, 5));
        assert_eq!(window.clamp_cell(Cell::from_row_col(4, 3)), Cell::from_row_col(4, 3));
    }
}
