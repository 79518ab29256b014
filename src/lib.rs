//! Zonal statistics and training sample extraction on top of GDAL.
//!
//! The functionality lives in the member crates, this crate only re-exports them:
//! - [`geo`]: raster grids, pixel windows, windowed block reading and vector layer io
//! - [`samples`]: zonal statistics, point sampling, chip/pixel extraction, sample containers and splitting
//! - [`inf`]: shared error type and GDAL runtime helpers

pub use geo;
pub use inf;
pub use samples;
