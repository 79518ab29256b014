//! Spatial reference handling and reconciliation of vector and raster reference systems.

use gdal::spatial_ref::{AxisMappingStrategy, CoordTransform, SpatialRef};
use gdal::vector::Geometry;

use crate::crs::Epsg;
use crate::{Error, Point, Result};

#[derive(Clone)]
pub struct SpatialReference {
    srs: SpatialRef,
}

impl SpatialReference {
    pub fn from_epsg(epsg: Epsg) -> Result<Self> {
        Ok(Self::from_gdal(SpatialRef::from_epsg(epsg.into())?))
    }

    /// Accepts any definition understood by GDAL (WKT, PROJ string, `EPSG:xxxx`, ...)
    pub fn from_definition(def: &str) -> Result<Self> {
        Ok(Self::from_gdal(SpatialRef::from_definition(def)?))
    }

    /// Spatial reference from a projection string, an empty string means no spatial reference
    pub fn from_projection(projection: &str) -> Result<Option<Self>> {
        if projection.trim().is_empty() {
            return Ok(None);
        }

        Ok(Some(Self::from_definition(projection)?))
    }

    pub fn from_gdal(mut srs: SpatialRef) -> Self {
        srs.set_axis_mapping_strategy(AxisMappingStrategy::TraditionalGisOrder);
        SpatialReference { srs }
    }

    pub fn epsg(&self) -> Option<Epsg> {
        match (self.srs.auth_name(), self.srs.auth_code()) {
            (Some(name), Ok(code)) if name.eq_ignore_ascii_case("EPSG") && code > 0 => Some(Epsg::new(code as u32)),
            _ => None,
        }
    }

    /// Short human readable identification used in diagnostics
    pub fn description(&self) -> String {
        if let Some(epsg) = self.epsg() {
            return epsg.to_string();
        }

        self.srs.to_proj4().unwrap_or_else(|_| "unknown".to_string())
    }

    pub fn is_same(&self, other: &SpatialReference) -> bool {
        self.srs == other.srs
    }

    pub fn srs(&self) -> &SpatialRef {
        &self.srs
    }
}

pub struct CoordinateTransformer {
    transformer: CoordTransform,
}

impl CoordinateTransformer {
    pub fn new(source_srs: &SpatialReference, target_srs: &SpatialReference) -> Result<Self> {
        Ok(CoordinateTransformer {
            transformer: CoordTransform::new(source_srs.srs(), target_srs.srs())?,
        })
    }

    pub fn from_epsg(source_epsg: Epsg, target_epsg: Epsg) -> Result<Self> {
        Self::new(&SpatialReference::from_epsg(source_epsg)?, &SpatialReference::from_epsg(target_epsg)?)
    }

    pub fn transform_point(&self, point: Point) -> Result<Point> {
        let mut x = [point.x()];
        let mut y = [point.y()];
        self.transformer.transform_coords(&mut x, &mut y, &mut [])?;
        Ok(Point::new(x[0], y[0]))
    }

    pub fn transform_geometry_in_place(&self, geometry: &mut Geometry) -> Result<()> {
        geometry.transform_inplace(&self.transformer)?;
        Ok(())
    }
}

/// Describes an input in the diagnostics of a projection mismatch
pub struct SrsSource<'a> {
    pub name: &'a str,
    pub srs: Option<SpatialReference>,
}

/// Compares the effective vector spatial reference with the raster spatial reference.
///
/// Returns the transformer to apply on the vector geometries, `None` when the geometries
/// can be used as is. Inputs without spatial reference are assumed to match.
pub fn vector_to_raster_transformer(vector: SrsSource, raster: SrsSource, reproject: bool) -> Result<Option<CoordinateTransformer>> {
    let (vector_srs, raster_srs) = match (vector.srs, raster.srs) {
        (Some(vector_srs), Some(raster_srs)) => (vector_srs, raster_srs),
        (vector_srs, raster_srs) => {
            if vector_srs.is_some() != raster_srs.is_some() {
                log::warn!(
                    "Spatial reference missing for '{}', assuming it matches '{}'",
                    if vector_srs.is_none() { vector.name } else { raster.name },
                    if vector_srs.is_none() { raster.name } else { vector.name },
                );
            }
            return Ok(None);
        }
    };

    if vector_srs.is_same(&raster_srs) {
        return Ok(None);
    }

    if !reproject {
        return Err(Error::ProjectionMismatch {
            vector: format!("{} ({})", vector.name, vector_srs.description()),
            raster: format!("{} ({})", raster.name, raster_srs.description()),
        });
    }

    log::debug!(
        "Reprojecting '{}' from {} to {}",
        vector.name,
        vector_srs.description(),
        raster_srs.description()
    );
    Ok(Some(CoordinateTransformer::new(&vector_srs, &raster_srs)?))
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::crs;

    #[test_log::test]
    fn transform_point() -> Result<()> {
        let trans = CoordinateTransformer::from_epsg(crs::epsg::WGS84, crs::epsg::BELGIAN_LAMBERT72)?;
        let p = trans.transform_point(Point::new(3.5713882022278653, 51.04223683846715))?;
        assert_relative_eq!(p, Point::new(94079.44534873398, 192751.6060780408), epsilon = 1e-1);
        Ok(())
    }

    #[test_log::test]
    fn epsg_of_spatial_reference() -> Result<()> {
        let srs = SpatialReference::from_epsg(crs::epsg::BELGIAN_LAMBERT72)?;
        assert_eq!(srs.epsg(), Some(crs::epsg::BELGIAN_LAMBERT72));
        assert!(SpatialReference::from_projection("")?.is_none());
        Ok(())
    }

    #[test_log::test]
    fn matching_srs_needs_no_transform() -> Result<()> {
        let transformer = vector_to_raster_transformer(
            SrsSource {
                name: "vector",
                srs: Some(SpatialReference::from_epsg(crs::epsg::BELGIAN_LAMBERT72)?),
            },
            SrsSource {
                name: "raster",
                srs: Some(SpatialReference::from_epsg(crs::epsg::BELGIAN_LAMBERT72)?),
            },
            false,
        )?;
        assert!(transformer.is_none());

        let transformer = vector_to_raster_transformer(
            SrsSource { name: "vector", srs: None },
            SrsSource {
                name: "raster",
                srs: Some(SpatialReference::from_epsg(crs::epsg::WGS84)?),
            },
            false,
        )?;
        assert!(transformer.is_none());
        Ok(())
    }

    #[test_log::test]
    fn mismatching_srs() -> Result<()> {
        let result = vector_to_raster_transformer(
            SrsSource {
                name: "parcels",
                srs: Some(SpatialReference::from_epsg(crs::epsg::WGS84)?),
            },
            SrsSource {
                name: "ndvi",
                srs: Some(SpatialReference::from_epsg(crs::epsg::BELGIAN_LAMBERT72)?),
            },
            false,
        );

        match result {
            Err(Error::ProjectionMismatch { vector, raster }) => {
                assert!(vector.contains("parcels"));
                assert!(raster.contains("ndvi"));
            }
            _ => panic!("Expected a projection mismatch"),
        }

        let transformer = vector_to_raster_transformer(
            SrsSource {
                name: "parcels",
                srs: Some(SpatialReference::from_epsg(crs::epsg::WGS84)?),
            },
            SrsSource {
                name: "ndvi",
                srs: Some(SpatialReference::from_epsg(crs::epsg::BELGIAN_LAMBERT72)?),
            },
            true,
        )?;
        assert!(transformer.is_some());
        Ok(())
    }
}
