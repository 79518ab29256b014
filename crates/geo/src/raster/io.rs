//! Reading raster data using the GDAL library.

use std::path::{Path, PathBuf};

use gdal::errors::GdalError;
use gdal::raster::{Buffer, GdalType};

use crate::srs::SpatialReference;
use crate::{Cell, Error, GeoReference, GeoTransform, PixelWindow, RasterSize, Result};

fn open_with_options(path: &Path, options: gdal::DatasetOptions) -> Result<gdal::Dataset> {
    gdal::Dataset::open_ex(path, options).map_err(|err| match err {
        // Match on the error to give a cleaner error message when the file does not exist
        GdalError::NullPointer { method_name: _, msg: _ } => {
            if !path.exists() {
                Error::InvalidPath(PathBuf::from(path))
            } else {
                Error::Runtime(format!(
                    "Failed to open raster dataset ({}), check file correctness or driver configuration ({})",
                    path.to_string_lossy(),
                    err
                ))
            }
        }
        _ => Error::Runtime(format!("Failed to open raster dataset: {} ({})", path.to_string_lossy(), err)),
    })
}

/// A GDAL raster dataset opened for the duration of one operation
pub struct RasterDataset {
    ds: gdal::Dataset,
    name: String,
}

impl RasterDataset {
    pub fn open_read_only(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let options = gdal::DatasetOptions {
            open_flags: gdal::GdalOpenFlags::GDAL_OF_READONLY | gdal::GdalOpenFlags::GDAL_OF_RASTER,
            ..Default::default()
        };

        let ds = open_with_options(path, options)?;
        Ok(RasterDataset {
            ds,
            name: path.to_string_lossy().to_string(),
        })
    }

    /// Wraps an already opened dataset, the name is used in diagnostics
    pub fn from_dataset(ds: gdal::Dataset, name: impl Into<String>) -> Self {
        RasterDataset { ds, name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn band_count(&self) -> usize {
        self.ds.raster_count()
    }

    pub fn raster_size(&self) -> RasterSize {
        let (cols, rows) = self.ds.raster_size();
        RasterSize::with_rows_cols(rows, cols)
    }

    /// The grid description of the provided band (1-based), the pixel dimensions are validated
    pub fn georeference(&self, band_index: usize) -> Result<GeoReference> {
        let band = self.ds.rasterband(self.checked_band_index(band_index)?)?;
        let georef = GeoReference::new(
            self.ds.projection(),
            self.raster_size(),
            GeoTransform::from(self.ds.geo_transform()?),
            band.no_data_value(),
        );

        georef.validate(&self.name)?;
        Ok(georef)
    }

    pub fn spatial_reference(&self) -> Result<Option<SpatialReference>> {
        SpatialReference::from_projection(&self.ds.projection())
    }

    pub fn nodata(&self, band_index: usize) -> Result<Option<f64>> {
        Ok(self.ds.rasterband(self.checked_band_index(band_index)?)?.no_data_value())
    }

    /// Checks that the 1-based band index exists in the dataset
    pub fn checked_band_index(&self, band_index: usize) -> Result<usize> {
        if band_index == 0 || band_index > self.band_count() {
            return Err(Error::Configuration(format!(
                "Band {} is not available in '{}' ({} bands)",
                band_index,
                self.name,
                self.band_count()
            )));
        }

        Ok(band_index)
    }

    /// Reads the window of the band as f64 values in row-major order.
    /// The window must lie within the raster.
    pub fn read_window(&self, band_index: usize, window: &PixelWindow) -> Result<Vec<f64>> {
        if !window.has_pixels() {
            return Ok(Vec::new());
        }

        let size = self.raster_size();
        if window.x_offset + window.width > size.cols || window.y_offset + window.height > size.rows {
            return Err(Error::InvalidArgument(format!(
                "Window {:?} exceeds the extent of '{}' {}",
                window, self.name, size
            )));
        }

        let band = self.ds.rasterband(self.checked_band_index(band_index)?)?;
        let buffer: Buffer<f64> = band.read_as(
            (window.x_offset as isize, window.y_offset as isize),
            (window.width, window.height),
            (window.width, window.height),
            None,
        )?;

        let (_, data) = buffer.into_shape_and_vec();
        Ok(data)
    }

    /// Reads a single pixel value, `None` when the cell lies outside of the raster
    pub fn read_pixel(&self, band_index: usize, cell: Cell) -> Result<Option<f64>> {
        if !cell.is_within(self.raster_size()) {
            return Ok(None);
        }

        let data = self.read_window(band_index, &PixelWindow::new(cell.col as usize, cell.row as usize, 1, 1))?;
        Ok(data.first().copied())
    }
}

/// Creates an in-memory dataset with the grid of the provided georeference and one band per data slice.
/// The nodata value of the georeference is set on every band.
pub fn create_in_memory_dataset_with_data<T: GdalType + Copy>(georef: &GeoReference, bands: &[&[T]]) -> Result<gdal::Dataset> {
    let size = georef.raster_size();
    for band in bands {
        if band.len() != size.cell_count() {
            return Err(Error::SizeMismatch {
                size1: (size.rows, size.cols),
                size2: (band.len() / size.cols.max(1), size.cols),
            });
        }
    }

    let mem_driver = gdal::DriverManager::get_driver_by_name("MEM")?;
    let mut ds = mem_driver.create_with_band_type::<T, _>("in_mem", size.cols, size.rows, bands.len())?;
    ds.set_geo_transform(&georef.geo_transform().into())?;
    ds.set_projection(georef.projection())?;

    for (index, data) in bands.iter().enumerate() {
        let mut band = ds.rasterband(index + 1)?;
        band.set_no_data_value(georef.nodata())?;
        let mut buffer = Buffer::new((size.cols, size.rows), data.to_vec());
        band.write((0, 0), (size.cols, size.rows), &mut buffer)?;
    }

    Ok(ds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Point;

    fn georef() -> GeoReference {
        GeoReference::with_origin("", RasterSize::with_rows_cols(3, 4), Point::new(0.0, 30.0), 10.0, Some(-9.0))
    }

    #[rustfmt::skip]
    const DATA: [f32; 12] = [
        1.0, 2.0, 3.0, 4.0,
        5.0, 6.0, 7.0, 8.0,
        9.0, 10.0, 11.0, -9.0,
    ];

    #[test]
    fn open_read_only_invalid_path() {
        let path = PathBuf::from("/this/does/not/exist.tif");
        let res = RasterDataset::open_read_only(path.as_path());
        assert!(matches!(res, Err(Error::InvalidPath(p)) if p == path));
    }

    #[test_log::test]
    fn read_window() -> Result<()> {
        let raster = RasterDataset::from_dataset(create_in_memory_dataset_with_data(&georef(), &[&DATA])?, "mem");
        assert_eq!(raster.band_count(), 1);
        assert_eq!(raster.raster_size(), RasterSize::with_rows_cols(3, 4));

        let values = raster.read_window(1, &PixelWindow::new(1, 1, 3, 2))?;
        assert_eq!(values, vec![6.0, 7.0, 8.0, 10.0, 11.0, -9.0]);

        assert!(raster.read_window(1, &PixelWindow::new(2, 2, 3, 2)).is_err());
        assert!(matches!(raster.read_window(2, &PixelWindow::new(0, 0, 1, 1)), Err(Error::Configuration(_))));
        Ok(())
    }

    #[test_log::test]
    fn read_pixel() -> Result<()> {
        let raster = RasterDataset::from_dataset(create_in_memory_dataset_with_data(&georef(), &[&DATA])?, "mem");
        assert_eq!(raster.read_pixel(1, Cell::from_row_col(2, 0))?, Some(9.0));
        assert_eq!(raster.read_pixel(1, Cell::from_row_col(3, 0))?, None);
        assert_eq!(raster.read_pixel(1, Cell::from_row_col(-1, 0))?, None);
        Ok(())
    }

    #[test_log::test]
    fn georeference_of_dataset() -> Result<()> {
        let raster = RasterDataset::from_dataset(create_in_memory_dataset_with_data(&georef(), &[&DATA, &DATA])?, "mem");
        let meta = raster.georeference(2)?;
        assert_eq!(meta.nodata(), Some(-9.0));
        assert_eq!(meta.raster_size(), RasterSize::with_rows_cols(3, 4));
        assert_eq!(meta.top_left(), Point::new(0.0, 30.0));
        assert!(raster.spatial_reference()?.is_none());
        Ok(())
    }
}
