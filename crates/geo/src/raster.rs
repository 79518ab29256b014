//! Raster access: dataset io, block streaming and value statistics.

pub mod algo;
pub mod blocks;
pub mod io;

#[doc(inline)]
pub use blocks::{BandBuffer, BlockLayer, BlockReader, BlockReaderOptions, RasterBlock};
#[doc(inline)]
pub use io::RasterDataset;
