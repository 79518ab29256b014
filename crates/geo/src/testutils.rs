//! Fixtures for tests: in-memory rasters and vector layers.

use gdal::raster::GdalType;
use gdal::spatial_ref::SpatialRef;
use gdal::vector::{Geometry, Layer, LayerAccess, LayerOptions};
use gdal_sys::OGRwkbGeometryType;

use crate::raster::{RasterDataset, io::create_in_memory_dataset_with_data};
use crate::{GeoReference, Point, RasterSize, Result};

pub const NOD: f64 = 255.0;

/// North up grid with square cells and the top left corner at `top_left`
pub fn test_georeference(rows: usize, cols: usize, top_left: Point, cell_size: f64, nodata: Option<f64>) -> GeoReference {
    GeoReference::with_origin("", RasterSize::with_rows_cols(rows, cols), top_left, cell_size, nodata)
}

/// Same as [`test_georeference`] with the projection of the EPSG code
pub fn test_georeference_with_epsg(rows: usize, cols: usize, top_left: Point, cell_size: f64, nodata: Option<f64>, epsg: u32) -> Result<GeoReference> {
    let projection = SpatialRef::from_epsg(epsg)?.to_wkt()?;
    Ok(GeoReference::with_origin(
        projection,
        RasterSize::with_rows_cols(rows, cols),
        top_left,
        cell_size,
        nodata,
    ))
}

/// In-memory raster with one band per data slice
pub fn create_raster<T: GdalType + Copy>(georef: &GeoReference, bands: &[&[T]]) -> Result<RasterDataset> {
    Ok(RasterDataset::from_dataset(create_in_memory_dataset_with_data(georef, bands)?, "in-mem"))
}

fn create_layer<'a>(ds: &'a mut gdal::Dataset, epsg: Option<u32>, geometry_type: OGRwkbGeometryType::Type, wkts: &[&str]) -> Result<Layer<'a>> {
    let srs = epsg.map(SpatialRef::from_epsg).transpose()?;
    let mut layer = ds.create_layer(LayerOptions {
        name: "features",
        srs: srs.as_ref(),
        ty: geometry_type,
        options: None,
    })?;

    for wkt in wkts {
        layer.create_feature(Geometry::from_wkt(wkt)?)?;
    }

    Ok(layer)
}

/// Adds a polygon layer with a feature per WKT geometry to the dataset
pub fn create_polygon_layer<'a>(ds: &'a mut gdal::Dataset, epsg: Option<u32>, wkts: &[&str]) -> Result<Layer<'a>> {
    create_layer(ds, epsg, OGRwkbGeometryType::wkbPolygon, wkts)
}

/// Adds a point layer with a feature per WKT geometry to the dataset
pub fn create_point_layer<'a>(ds: &'a mut gdal::Dataset, epsg: Option<u32>, wkts: &[&str]) -> Result<Layer<'a>> {
    create_layer(ds, epsg, OGRwkbGeometryType::wkbPoint, wkts)
}

/// The real field values of every feature of the layer in layer order
pub fn read_real_field<L: LayerAccess>(layer: &mut L, field_name: &str) -> Result<Vec<Option<f64>>> {
    let field_index = layer.defn().field_index(field_name)?;
    layer.reset_feature_reading();
    let values = layer
        .features()
        .map(|feature| Ok(feature.field_as_double(field_index)?))
        .collect::<Result<Vec<Option<f64>>>>();
    layer.reset_feature_reading();
    values
}
