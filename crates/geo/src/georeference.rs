use approx::relative_eq;

use crate::{Cell, Error, GeoTransform, Point, RasterSize, Result};

/// Axis aligned bounding box in map coordinates
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BoundingBox {
    pub xmin: f64,
    pub xmax: f64,
    pub ymin: f64,
    pub ymax: f64,
}

impl BoundingBox {
    pub fn new(xmin: f64, xmax: f64, ymin: f64, ymax: f64) -> Self {
        BoundingBox { xmin, xmax, ymin, ymax }
    }
}

/// Describes the pixel grid of a raster: size, geotransform, projection and nodata value
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GeoReference {
    /// The projection string (WKT), can be empty
    projection: String,
    size: RasterSize,
    geo_transform: GeoTransform,
    nodata: Option<f64>,
}

impl GeoReference {
    pub fn new<S: Into<String>>(projection: S, size: RasterSize, geo_transform: GeoTransform, nodata: Option<f64>) -> Self {
        GeoReference {
            projection: projection.into(),
            size,
            geo_transform,
            nodata,
        }
    }

    /// Grid with its top left corner at `top_left` and square cells, north up
    pub fn with_origin<S: Into<String>>(projection: S, size: RasterSize, top_left: Point, cell_size: f64, nodata: Option<f64>) -> Self {
        GeoReference::new(
            projection,
            size,
            GeoTransform::from_top_left_and_cell_size(top_left, cell_size, -cell_size),
            nodata,
        )
    }

    pub fn projection(&self) -> &str {
        &self.projection
    }

    pub fn raster_size(&self) -> RasterSize {
        self.size
    }

    pub fn geo_transform(&self) -> GeoTransform {
        self.geo_transform
    }

    pub fn nodata(&self) -> Option<f64> {
        self.nodata
    }

    pub fn is_nodata(&self, value: f64) -> bool {
        match self.nodata {
            Some(nod) if nod.is_nan() => value.is_nan(),
            Some(nod) => value == nod,
            None => false,
        }
    }

    pub fn cell_size_x(&self) -> f64 {
        self.geo_transform.cell_size_x()
    }

    pub fn cell_size_y(&self) -> f64 {
        self.geo_transform.cell_size_y()
    }

    pub fn top_left(&self) -> Point {
        self.geo_transform.top_left()
    }

    /// Checks the pixel dimensions of the grid, `name` is used in the error message
    pub fn validate(&self, name: &str) -> Result<()> {
        let pixel_width = self.cell_size_x();
        let pixel_height = self.cell_size_y();
        if pixel_width.is_nan() || pixel_width <= 0.0 || pixel_height.is_nan() || pixel_height == 0.0 {
            return Err(Error::Configuration(format!(
                "Raster '{name}' has invalid pixel dimensions (width: {pixel_width}, height: {pixel_height})"
            )));
        }

        if self.geo_transform.is_rotated() {
            return Err(Error::Configuration(format!("Rotated rasters are not supported ('{name}')")));
        }

        Ok(())
    }

    /// The cell containing the point, no padding is applied and the cell may lie outside of the raster.
    /// A point without finite coordinates yields an invalid cell.
    pub fn point_to_cell(&self, point: Point) -> Cell {
        let col = ((point.x() - self.top_left().x()) / self.cell_size_x()).floor();
        let row = ((point.y() - self.top_left().y()) / self.cell_size_y()).floor();
        if !col.is_finite() || !row.is_finite() {
            return Cell::invalid();
        }

        Cell::from_row_col(row as i32, col as i32)
    }

    /// Two grids are aligned when they have the same size and geotransform, the projection is not considered
    pub fn is_aligned_with(&self, other: &GeoReference) -> bool {
        self.size == other.size && relative_eq!(self.geo_transform, other.geo_transform, epsilon = 1e-9)
    }
}
