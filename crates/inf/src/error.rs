use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// The caller supplied an invalid combination of parameters
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Projection mismatch: vector '{vector}' and raster '{raster}' do not share the same spatial reference")]
    ProjectionMismatch { vector: String, raster: String },
    #[error("Insufficient samples: {context} requested {requested} samples but only {available} are available")]
    InsufficientSamples {
        requested: usize,
        available: usize,
        context: String,
    },
    #[error("Raster dimensions do not match ({}x{}) <-> ({}x{})", .size1.0, .size1.1, .size2.0, .size2.1)]
    SizeMismatch {
        size1: (usize, usize),
        size2: (usize, usize),
    },
    #[error("Invalid path: {0}")]
    InvalidPath(std::path::PathBuf),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Runtime error: {0}")]
    Runtime(String),
    #[error("Invalid string: {0}")]
    InvalidString(#[from] std::ffi::NulError),
    #[error("IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[cfg(feature = "gdal")]
    #[error("GDAL error: {0}")]
    GdalError(#[from] gdal::errors::GdalError),
    #[cfg(feature = "hdf5")]
    #[error("HDF5 error: {0}")]
    Hdf5Error(#[from] hdf5::Error),
}

impl From<std::num::ParseIntError> for Error {
    fn from(err: std::num::ParseIntError) -> Self {
        Error::InvalidArgument(err.to_string())
    }
}

impl From<std::num::ParseFloatError> for Error {
    fn from(err: std::num::ParseFloatError) -> Self {
        Error::InvalidArgument(err.to_string())
    }
}
