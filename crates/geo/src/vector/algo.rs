//! Geometry helpers used to intersect vector features with a raster grid.

use gdal::raster::{Buffer, RasterizeOptions};
use gdal::vector::Geometry;
use gdal_sys::OGRwkbGeometryType;

use crate::{BoundingBox, Error, GeoReference, PixelWindow, Point, Result};

const OGRERR_NONE: i64 = 0;

pub fn bounding_box(geometry: &Geometry) -> BoundingBox {
    let env = geometry.envelope();
    BoundingBox::new(env.MinX, env.MaxX, env.MinY, env.MaxY)
}

/// Checks if the geometry is a single point (z and m variants included)
pub fn is_point(geometry: &Geometry) -> bool {
    unsafe { gdal_sys::OGR_GT_Flatten(geometry.geometry_type()) == OGRwkbGeometryType::wkbPoint }
}

/// The coordinates of a point geometry
pub fn point_coordinates(geometry: &Geometry) -> Point {
    let (x, y, _) = geometry.get_point(0);
    Point::new(x, y)
}

/// The centroid of the geometry, fails for empty geometries
pub fn centroid(geometry: &Geometry) -> Result<Point> {
    let centroid = Geometry::empty(OGRwkbGeometryType::wkbPoint)?;
    let rc = unsafe { gdal_sys::OGR_G_Centroid(geometry.c_geometry(), centroid.c_geometry()) } as i64;
    if rc != OGRERR_NONE {
        return Err(Error::Runtime(format!("Failed to compute the centroid of the geometry (error code {rc})")));
    }

    Ok(point_coordinates(&centroid))
}

/// Burns the geometry into an in-memory raster covering the window of the grid.
///
/// Returns the window cells in row-major order, `true` for the cells whose center lies
/// inside of the geometry.
pub fn rasterize_feature_mask(geometry: &Geometry, window: &PixelWindow, grid: &GeoReference) -> Result<Vec<bool>> {
    if !window.has_pixels() {
        return Ok(Vec::new());
    }

    let mem_driver = gdal::DriverManager::get_driver_by_name("MEM")?;
    let mut mask_ds = mem_driver.create_with_band_type::<u8, _>("", window.width, window.height, 1)?;
    let window_transform = grid.geo_transform().with_pixel_offset(window.x_offset, window.y_offset);
    mask_ds.set_geo_transform(&window_transform.into())?;
    mask_ds.set_projection(grid.projection())?;
    mask_ds.rasterband(1)?.fill(0.0, None)?;

    gdal::raster::rasterize(
        &mut mask_ds,
        &[1],
        &[geometry.clone()],
        &[1.0],
        Some(RasterizeOptions {
            all_touched: false,
            ..Default::default()
        }),
    )?;

    let mask_band = mask_ds.rasterband(1)?;
    let mask: Buffer<u8> = mask_band.read_as((0, 0), (window.width, window.height), (window.width, window.height), None)?;
    let (_, data) = mask.into_shape_and_vec();
    Ok(data.into_iter().map(|v| v != 0).collect())
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::{RasterSize, window};

    fn grid() -> GeoReference {
        // 10 x 10 raster with 1m pixels, top left at (0, 10)
        GeoReference::with_origin("", RasterSize::square(10), Point::new(0.0, 10.0), 1.0, None)
    }

    #[test_log::test]
    fn rasterize_square() -> Result<()> {
        let geom = Geometry::from_wkt("POLYGON ((2 6, 5 6, 5 8, 2 8, 2 6))")?;
        let window = window::compute_window(&bounding_box(&geom), &grid());
        assert_eq!(window, PixelWindow::new(2, 2, 3, 2));

        let mask = rasterize_feature_mask(&geom, &window, &grid())?;
        assert_eq!(mask, vec![true; 6]);
        Ok(())
    }

    #[test_log::test]
    fn rasterize_triangle_with_padding() -> Result<()> {
        // Covers the centers of cells (row 1, col 1), (row 2, col 1) and (row 2, col 2)
        let geom = Geometry::from_wkt("POLYGON ((0.8 7.2, 3.2 7.2, 0.8 9.2, 0.8 7.2))")?;
        let window = window::compute_window(&bounding_box(&geom), &grid());
        assert_eq!(window, PixelWindow::new(0, 0, 5, 4));

        let mask = rasterize_feature_mask(&geom, &window, &grid())?;
        let inside: Vec<(usize, usize)> = mask
            .iter()
            .enumerate()
            .filter(|(_, inside)| **inside)
            .map(|(i, _)| (window.y_offset + i / window.width, window.x_offset + i % window.width))
            .collect();
        assert_eq!(inside, vec![(1, 1), (2, 1), (2, 2)]);
        Ok(())
    }

    #[test_log::test]
    fn sub_pixel_polygon_burns_nothing() -> Result<()> {
        let geom = Geometry::from_wkt("POLYGON ((2.1 6.1, 2.3 6.1, 2.3 6.3, 2.1 6.3, 2.1 6.1))")?;
        let window = window::compute_window(&bounding_box(&geom), &grid());
        assert!(window.has_pixels());
        assert!(rasterize_feature_mask(&geom, &window, &grid())?.iter().all(|inside| !inside));

        assert_relative_eq!(centroid(&geom)?, Point::new(2.2, 6.2), epsilon = 1e-9);
        Ok(())
    }

    #[test_log::test]
    fn point_geometry_checks() -> Result<()> {
        assert!(is_point(&Geometry::from_wkt("POINT (1 2)")?));
        assert!(is_point(&Geometry::from_wkt("POINT Z (1 2 3)")?));
        assert!(!is_point(&Geometry::from_wkt("MULTIPOINT ((1 2))")?));
        assert!(!is_point(&Geometry::from_wkt("POLYGON ((0 0, 1 0, 1 1, 0 0))")?));
        assert_eq!(point_coordinates(&Geometry::from_wkt("POINT (1 2)")?), Point::new(1.0, 2.0));
        Ok(())
    }
}
