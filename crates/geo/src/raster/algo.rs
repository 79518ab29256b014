//! Algorithms working on raster values.

mod quantile;
mod statistics;

pub use statistics::{ValueStatistics, statistics};
