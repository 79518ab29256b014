//! Raster values below point features.

use gdal::vector::LayerAccess;

use geo::crs::Epsg;
use geo::raster::RasterDataset;
use geo::vector::{FieldWriter, LayerAccessExtension, algo};

use crate::zonal::{layer_transformer, within_thresholds};
use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct PointValueOptions {
    /// Values below this value are replaced by `out_nodata` (inclusive bound)
    pub min_threshold: Option<f64>,
    /// Values above this value are replaced by `out_nodata` (inclusive bound)
    pub max_threshold: Option<f64>,
    /// Value written for points outside of the raster or on invalid pixels
    pub out_nodata: f64,
    /// Spatial reference of the points, overrides the layer spatial reference
    pub vector_epsg: Option<Epsg>,
    pub reproject: bool,
}

impl Default for PointValueOptions {
    fn default() -> Self {
        PointValueOptions {
            min_threshold: None,
            max_threshold: None,
            out_nodata: 0.0,
            vector_epsg: None,
            reproject: false,
        }
    }
}

/// Writes the value of the raster band (1-based) below every point of the layer to `out_field`.
/// All features must be points, the field is created when it does not exist.
/// Returns the number of points that received a raster value.
pub fn point_band_values<L: LayerAccess>(
    layer: &mut L,
    raster: &RasterDataset,
    band: usize,
    out_field: &str,
    options: &PointValueOptions,
) -> Result<usize> {
    let grid = raster.georeference(band)?;
    let transformer = layer_transformer(layer, raster, options.vector_epsg, options.reproject)?;
    let layer_name = layer.name();

    let features = layer.read_features()?;
    let mut points = Vec::with_capacity(features.len());
    for feature in &features {
        match &feature.geometry {
            Some(geometry) if algo::is_point(geometry) => points.push((feature.fid, algo::point_coordinates(geometry))),
            Some(geometry) => {
                return Err(Error::Configuration(format!(
                    "Feature {} of layer '{}' is not a point ({})",
                    feature.fid,
                    layer_name,
                    geometry.geometry_name()
                )));
            }
            None => {
                return Err(Error::Configuration(format!(
                    "Feature {} of layer '{}' has no geometry",
                    feature.fid, layer_name
                )));
            }
        }
    }

    let field_index = layer.ensure_real_fields(&[out_field])?[0];

    let is_valid = |value: f64| {
        value.is_finite() && !grid.is_nodata(value) && within_thresholds(value, options.min_threshold, options.max_threshold)
    };

    let mut sampled = 0;
    let mut values = Vec::with_capacity(points.len());
    for (fid, point) in points {
        let point = match &transformer {
            Some(transformer) => transformer.transform_point(point)?,
            None => point,
        };

        let cell = grid.point_to_cell(point);
        let value = match raster.read_pixel(band, cell)? {
            Some(value) if is_valid(value) => {
                sampled += 1;
                value
            }
            Some(_) => options.out_nodata,
            None => {
                log::debug!("Point {fid} ({}, {}) lies outside of '{}'", point.x(), point.y(), raster.name());
                options.out_nodata
            }
        };

        values.push((fid, value));
    }

    let mut writer = FieldWriter::new(layer);
    for (fid, value) in &values {
        writer.write(*fid, &[(field_index, *value)])?;
    }
    writer.finish()?;

    log::info!(
        "Sampled '{}' band {} for {} points of '{}' ({} outside or invalid)",
        raster.name(),
        band,
        values.len(),
        layer_name,
        values.len() - sampled
    );
    Ok(sampled)
}
