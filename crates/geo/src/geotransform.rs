use std::fmt::Debug;

use approx::{AbsDiffEq, RelativeEq};

use crate::Point;

#[derive(Clone, Copy, PartialEq, Default)]
pub struct GeoTransform([f64; 6]);

impl GeoTransform {
    /// Creates a new `GeoTransform` from the provided coefficients.
    ///
    /// The coefficients are in the order: [top left x, pixel width, rotation (0 if north is up), top left y, rotation (0 if north is up), pixel height].
    pub const fn new(coefficients: [f64; 6]) -> Self {
        GeoTransform(coefficients)
    }

    pub fn from_top_left_and_cell_size(top_left: Point, cell_size_x: f64, cell_size_y: f64) -> Self {
        Self::new([top_left.x(), cell_size_x, 0.0, top_left.y(), 0.0, cell_size_y])
    }

    /// Translates a (fractional) pixel location to a point in map coordinates.
    /// Pixel (0, 0) is the top left corner of the raster.
    pub fn apply(&self, col: f64, row: f64) -> Point<f64> {
        let x = self.0[0] + self.0[1] * col + self.0[2] * row;
        let y = self.0[3] + self.0[4] * col + self.0[5] * row;
        Point::new(x, y)
    }

    pub fn top_left(&self) -> Point {
        Point::new(self.0[0], self.0[3])
    }

    /// The horizontal cell size
    pub fn cell_size_x(&self) -> f64 {
        self.0[1]
    }

    /// The vertical cell size, negative for north up rasters
    pub fn cell_size_y(&self) -> f64 {
        self.0[5]
    }

    pub fn is_rotated(&self) -> bool {
        self.0[2] != 0.0 || self.0[4] != 0.0
    }

    /// The transformation of a sub window of the raster starting at the provided pixel offset
    pub fn with_pixel_offset(&self, col_offset: usize, row_offset: usize) -> Self {
        let origin = self.apply(col_offset as f64, row_offset as f64);
        let mut coefficients = self.0;
        coefficients[0] = origin.x();
        coefficients[3] = origin.y();
        GeoTransform(coefficients)
    }
}

impl From<[f64; 6]> for GeoTransform {
    fn from(coefficients: [f64; 6]) -> Self {
        GeoTransform(coefficients)
    }
}

impl From<GeoTransform> for [f64; 6] {
    fn from(geo_trans: GeoTransform) -> [f64; 6] {
        geo_trans.0
    }
}

impl Debug for GeoTransform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "GeoTransform(topleft: ({}, {}), pixel_width: {}, pixel_height: {})",
            self.0[0],
            self.0[3],
            self.cell_size_x(),
            self.cell_size_y()
        )
    }
}

impl AbsDiffEq for GeoTransform {
    type Epsilon = f64;

    fn default_epsilon() -> Self::Epsilon {
        f64::default_epsilon()
    }

    fn abs_diff_eq(&self, other: &Self, epsilon: Self::Epsilon) -> bool {
        self.0.abs_diff_eq(&other.0, epsilon)
    }
}

impl RelativeEq for GeoTransform {
    fn default_max_relative() -> Self::Epsilon {
        f64::default_max_relative()
    }

    fn relative_eq(&self, other: &Self, epsilon: Self::Epsilon, max_relative: Self::Epsilon) -> bool {
        self.0.relative_eq(&other.0, epsilon, max_relative)
    }
}
