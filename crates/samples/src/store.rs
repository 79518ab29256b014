//! Persistence of sample containers.
//!
//! A container file holds the samples in `DATA/DATA`, the optional reference chips in `DATA/REF`
//! and the provenance string in `META-DATA/DESCRIPTION`. Containers are written next to their
//! destination first and moved into place once complete.

use std::path::Path;

use geo::ArrayDataType;

use crate::{Description, Error, Result, SampleContainer};

#[cfg(feature = "hdf5")]
mod h5;

#[cfg(not(feature = "hdf5"))]
mod h5 {
    use std::path::Path;

    use geo::ArrayDataType;

    use crate::{Error, Result, SampleContainer};

    fn unsupported() -> Error {
        Error::Configuration("Sample containers need the 'hdf5' feature".to_string())
    }

    pub fn write(_container: &SampleContainer, _path: &Path, _data_type: ArrayDataType) -> Result<()> {
        Err(unsupported())
    }

    pub fn read(_path: &Path) -> Result<SampleContainer> {
        Err(unsupported())
    }

    pub fn read_count(_path: &Path) -> Result<usize> {
        Err(unsupported())
    }
}

/// Writes the container, an existing file at `path` is replaced
pub fn write(container: &SampleContainer, path: &Path, data_type: ArrayDataType) -> Result<()> {
    inf::fs::create_directory_for_file(path)?;

    let staging = inf::fs::staging_path(path);
    if let Err(err) = h5::write(container, &staging, data_type) {
        if let Err(cleanup_err) = inf::fs::remove_file_if_exists(&staging) {
            log::warn!("Failed to remove '{}' ({cleanup_err})", staging.display());
        }
        return Err(err);
    }

    inf::fs::remove_file_if_exists(path)?;
    std::fs::rename(&staging, path)?;

    log::debug!(
        "Wrote {} samples of shape {:?} as {} to '{}'",
        container.len(),
        container.trailing_shape(),
        data_type,
        path.display()
    );
    Ok(())
}

/// Reads the container, values are converted to `f64`. The stored element type is available
/// through [`SampleContainer::data_type`].
pub fn read(path: &Path) -> Result<SampleContainer> {
    h5::read(path)
}

/// The number of samples in the container without reading the sample data
pub fn read_count(path: &Path) -> Result<usize> {
    h5::read_count(path)
}

/// Concatenates the samples of the inputs in order into a new container
pub fn merge(inputs: &[&Path], output: &Path, data_type: ArrayDataType) -> Result<SampleContainer> {
    if inputs.is_empty() {
        return Err(Error::Configuration("No sample files provided to merge".to_string()));
    }

    let containers = inputs.iter().map(|path| read(path)).collect::<Result<Vec<_>>>()?;
    let merged = SampleContainer::concatenate(&containers, Description::Merged).map_err(|err| match err {
        Error::Configuration(msg) => Error::Configuration(format!(
            "Sample files can not be merged into '{}': {msg}",
            output.display()
        )),
        err => err,
    })?;

    write(&merged, output, data_type)?;
    log::info!("Merged {} sample files into '{}' ({} samples)", inputs.len(), output.display(), merged.len());
    Ok(merged)
}

#[cfg(all(test, feature = "hdf5"))]
mod tests {
    use approx::assert_relative_eq;
    use ndarray::{Array, Array3, Array4, array};

    use super::*;
    use crate::SampleLayout;

    fn chips(n: usize, offset: f64) -> Result<SampleContainer> {
        let data = Array4::from_shape_fn((n, 4, 4, 2), |(s, r, c, b)| offset + (s * 32 + r * 8 + c * 2 + b) as f64);
        let reference = Array3::from_shape_fn((n, 4, 4), |(s, r, c)| ((s + r + c) % 3) as f64);
        SampleContainer::chips(data, Some(reference), Description::ImageRefTiles)
    }

    #[test_log::test]
    fn write_read_chips() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("nested").join("chips.h5");
        let container = chips(3, 0.5)?;

        write(&container, &path, ArrayDataType::Float32)?;
        assert!(path.exists());
        assert!(!inf::fs::staging_path(&path).exists());
        assert_eq!(read_count(&path)?, 3);

        let read_back = read(&path)?;
        assert_eq!(read_back.layout(), SampleLayout::Chips);
        assert_eq!(read_back.data_type(), ArrayDataType::Float32);
        assert_eq!(read_back.description(), &Description::ImageRefTiles);
        assert_eq!(read_back.data().shape(), &[3, 4, 4, 2]);
        assert_relative_eq!(read_back.data()[[2, 3, 1, 1]], container.data()[[2, 3, 1, 1]]);
        assert_eq!(read_back.reference(), container.reference());
        Ok(())
    }

    #[test_log::test]
    fn write_integer_samples() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("tabular.h5");
        let container = SampleContainer::tabular(array![[1.0, 200.0], [3.0, 4.0]], Description::FiniteValues);

        write(&container, &path, ArrayDataType::Uint8)?;
        let read_back = read(&path)?;
        assert_eq!(read_back.data_type(), ArrayDataType::Uint8);
        assert_eq!(read_back.data(), container.data());
        assert!(read_back.reference().is_none());

        let negative = SampleContainer::tabular(array![[-1.0]], Description::FiniteValues);
        assert!(matches!(write(&negative, &path, ArrayDataType::Uint8), Err(Error::Configuration(_))));
        // the failed write leaves the previous file untouched
        assert_eq!(read_count(&path)?, 2);
        Ok(())
    }

    #[test_log::test]
    fn write_empty_container() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("empty.h5");
        let container = SampleContainer::chips(Array4::zeros((0, 3, 3, 2)), None, Description::ImageTiles)?;

        write(&container, &path, ArrayDataType::Float32)?;
        assert_eq!(read_count(&path)?, 0);
        assert_eq!(read(&path)?.trailing_shape(), &[3, 3, 2]);
        Ok(())
    }

    #[test_log::test]
    fn merge_preserves_row_order() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let paths: Vec<_> = ["a.h5", "b.h5", "c.h5"].iter().map(|name| dir.path().join(name)).collect();
        for (index, path) in paths.iter().enumerate() {
            write(&chips(index + 1, index as f64 * 1000.0)?, path, ArrayDataType::Float64)?;
        }

        let ab = dir.path().join("ab.h5");
        merge(&[paths[0].as_path(), paths[1].as_path()], &ab, ArrayDataType::Float64)?;
        let ab_c = dir.path().join("ab_c.h5");
        merge(&[ab.as_path(), paths[2].as_path()], &ab_c, ArrayDataType::Float64)?;
        let abc = dir.path().join("abc.h5");
        let merged = merge(&[paths[0].as_path(), paths[1].as_path(), paths[2].as_path()], &abc, ArrayDataType::Float64)?;

        assert_eq!(merged.len(), 6);
        let nested = read(&ab_c)?;
        let flat = read(&abc)?;
        assert_eq!(nested.data(), flat.data());
        assert_eq!(nested.reference(), flat.reference());
        assert_eq!(flat.description(), &Description::Merged);
        assert_eq!(flat.data()[[1, 0, 0, 0]], 1000.0);
        assert_eq!(flat.data()[[3, 0, 0, 0]], 2000.0);
        Ok(())
    }

    #[test_log::test]
    fn merge_mismatching_shapes() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let chips_path = dir.path().join("chips.h5");
        let tabular_path = dir.path().join("tabular.h5");
        write(&chips(2, 0.0)?, &chips_path, ArrayDataType::Float32)?;
        write(
            &SampleContainer::tabular(Array::zeros((2, 32)), Description::FiniteValues),
            &tabular_path,
            ArrayDataType::Float32,
        )?;

        let output = dir.path().join("merged.h5");
        assert!(matches!(
            merge(&[chips_path.as_path(), tabular_path.as_path()], &output, ArrayDataType::Float32),
            Err(Error::Configuration(_))
        ));
        assert!(!output.exists());
        Ok(())
    }

    #[test]
    fn read_missing_file() {
        assert!(matches!(read(Path::new("/does/not/exist.h5")), Err(Error::InvalidPath(_))));
    }
}
