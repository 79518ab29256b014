//! Vector layer access: buffering features and writing attribute values back.

pub mod algo;
pub mod io;

use gdal::vector::Geometry;

/// A feature buffered from a layer: its id and an owned copy of its geometry
pub struct VectorFeature {
    pub fid: u64,
    pub geometry: Option<Geometry>,
}

#[doc(inline)]
pub use io::{FieldWriter, LayerAccessExtension};
