//! Zonal statistics and training sample extraction.
//!
//! Vector features are summarized with the raster values they cover, point features sample
//! the pixel below them, and mask rasters drive the extraction of pixel and chip samples
//! that are persisted in sample containers and split into train, validation and test sets.

#![warn(clippy::unwrap_used)]

pub mod chips;
mod container;
pub mod pixels;
pub mod points;
pub mod split;
pub mod store;
pub mod zonal;

#[doc(inline)]
pub use container::{Description, SampleContainer, SampleLayout};
#[doc(inline)]
pub use geo::raster::BlockLayer as ImageBands;
#[doc(inline)]
pub use inf::{Error, Result};

/// Optional functionality compiled into the crate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// Reading and writing of sample containers
    pub hdf5: bool,
}

pub fn capabilities() -> Capabilities {
    Capabilities { hdf5: cfg!(feature = "hdf5") }
}
