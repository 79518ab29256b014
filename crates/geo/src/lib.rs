//! Raster and vector primitives on top of GDAL: pixel grids, windows, block streaming,
//! spatial references and attribute updates of vector layers.

#![warn(clippy::unwrap_used)]

mod arraydatatype;
mod cell;
pub mod crs;
mod georeference;
mod geotransform;
pub mod raster;
mod rastersize;
mod runtimeconfiguration;
pub mod srs;
pub mod vector;
pub mod window;

#[cfg(any(test, feature = "testutils"))]
pub mod testutils;

#[doc(inline)]
pub use arraydatatype::ArrayDataType;
#[doc(inline)]
pub use cell::Cell;
#[doc(inline)]
pub use georeference::{BoundingBox, GeoReference};
#[doc(inline)]
pub use geotransform::GeoTransform;
#[doc(inline)]
pub use inf::{Error, Result};
#[doc(inline)]
pub use rastersize::RasterSize;
#[doc(inline)]
pub use runtimeconfiguration::RuntimeConfiguration;
#[doc(inline)]
pub use window::PixelWindow;

pub type Point<T = f64> = geo_types::Point<T>;
