//! Contains functions to read and update vector data using the GDAL library.

use std::path::{Path, PathBuf};

use gdal::vector::LayerAccess;
use gdal_sys::OGRFieldType;

use crate::vector::VectorFeature;
use crate::{Error, Result};

const OGRERR_NONE: i64 = 0;
const OGRERR_UNSUPPORTED_OPERATION: i64 = 4;

/// Number of features written in one transaction
pub const TRANSACTION_SIZE: usize = 20_000;

pub mod dataset {
    use super::*;

    use gdal::{Dataset, DatasetOptions, DriverManager, GdalOpenFlags, errors::GdalError};

    /// Create a new in-memory vector dataset
    pub fn create_in_memory() -> Result<Dataset> {
        // The vector memory driver was merged into the MEM driver in recent GDAL versions
        let mem_driver = match DriverManager::get_driver_by_name("Memory") {
            Ok(driver) => driver,
            Err(_) => DriverManager::get_driver_by_name("MEM")?,
        };

        Ok(mem_driver.create_vector_only("in-mem")?)
    }

    fn open_with_options(path: &Path, options: DatasetOptions) -> Result<Dataset> {
        Dataset::open_ex(path, options).map_err(|err| match err {
            // Match on the error to give a cleaner error message when the file does not exist
            GdalError::NullPointer { method_name: _, msg: _ } if !path.exists() => Error::InvalidPath(PathBuf::from(path)),
            _ => Error::Runtime(format!("Failed to open vector dataset: {} ({})", path.to_string_lossy(), err)),
        })
    }

    /// Open a GDAL vector dataset for reading
    pub fn open_read_only(path: &Path) -> Result<Dataset> {
        let options = DatasetOptions {
            open_flags: GdalOpenFlags::GDAL_OF_READONLY | GdalOpenFlags::GDAL_OF_VECTOR,
            ..Default::default()
        };

        open_with_options(path, options)
    }

    /// Open a GDAL vector dataset for updating the attributes of its layers
    pub fn open_for_update(path: &Path) -> Result<Dataset> {
        let options = DatasetOptions {
            open_flags: GdalOpenFlags::GDAL_OF_UPDATE | GdalOpenFlags::GDAL_OF_VECTOR,
            ..Default::default()
        };

        open_with_options(path, options)
    }
}

/// [`gdal::vector::LayerAccess`] extension trait that implements missing functionality
/// for working with GDAL vector layers
pub trait LayerAccessExtension
where
    Self: LayerAccess,
{
    /// Index of the field with the provided name, the name comparison ignores case
    fn field_index_case_insensitive(&self, field_name: &str) -> Option<usize> {
        self.defn().fields().position(|field| field.name().eq_ignore_ascii_case(field_name))
    }

    /// Returns the indexes of the fields, fields that are not present are created as real fields
    fn ensure_real_fields(&mut self, field_names: &[&str]) -> Result<Vec<usize>> {
        let missing: Vec<(&str, OGRFieldType::Type)> = field_names
            .iter()
            .filter(|name| self.field_index_case_insensitive(name).is_none())
            .map(|name| (*name, OGRFieldType::OFTReal))
            .collect();

        if !missing.is_empty() {
            log::debug!("Creating fields {:?} on layer '{}'", missing.iter().map(|f| f.0).collect::<Vec<_>>(), self.name());
            self.create_defn_fields(&missing)?;
        }

        field_names
            .iter()
            .map(|name| {
                self.field_index_case_insensitive(name)
                    .ok_or_else(|| Error::Runtime(format!("Failed to create field '{}' on layer '{}'", name, self.name())))
            })
            .collect()
    }

    /// Buffers the id and geometry of every feature of the layer in layer order
    fn read_features(&mut self) -> Result<Vec<VectorFeature>> {
        let layer_name = self.name();
        self.reset_feature_reading();
        let mut result = Vec::with_capacity(self.feature_count() as usize);
        for feature in self.features() {
            let fid = feature
                .fid()
                .ok_or_else(|| Error::Runtime(format!("Feature without id in layer '{layer_name}'")))?;
            result.push(VectorFeature {
                fid,
                geometry: feature.geometry().cloned(),
            });
        }

        self.reset_feature_reading();
        Ok(result)
    }
}

impl<L: LayerAccess> LayerAccessExtension for L {}

/// Writes real field values to existing features of a layer.
/// The writes are grouped in transactions when the layer supports them.
pub struct FieldWriter<'a, L: LayerAccess> {
    layer: &'a mut L,
    transaction_size: usize,
    pending: usize,
    written: usize,
    in_transaction: bool,
    transactions_supported: bool,
}

impl<'a, L: LayerAccess> FieldWriter<'a, L> {
    pub fn new(layer: &'a mut L) -> Self {
        Self::with_transaction_size(layer, TRANSACTION_SIZE)
    }

    pub fn with_transaction_size(layer: &'a mut L, transaction_size: usize) -> Self {
        FieldWriter {
            layer,
            transaction_size: transaction_size.max(1),
            pending: 0,
            written: 0,
            in_transaction: false,
            transactions_supported: true,
        }
    }

    fn start_transaction(&mut self) -> Result<()> {
        if !self.transactions_supported || self.in_transaction {
            return Ok(());
        }

        let rc = unsafe { gdal_sys::OGR_L_StartTransaction(self.layer.c_layer()) } as i64;
        match rc {
            OGRERR_NONE => self.in_transaction = true,
            OGRERR_UNSUPPORTED_OPERATION => {
                log::warn!("Layer '{}' does not support transactions, writing directly", self.layer.name());
                self.transactions_supported = false;
            }
            _ => {
                return Err(Error::Runtime(format!(
                    "Failed to start a transaction on layer '{}' (error code {rc})",
                    self.layer.name()
                )));
            }
        }

        Ok(())
    }

    fn commit_transaction(&mut self) -> Result<()> {
        if !self.in_transaction {
            return Ok(());
        }

        self.in_transaction = false;
        let rc = unsafe { gdal_sys::OGR_L_CommitTransaction(self.layer.c_layer()) } as i64;
        if rc != OGRERR_NONE {
            return Err(Error::Runtime(format!(
                "Failed to commit the transaction on layer '{}' (error code {rc})",
                self.layer.name()
            )));
        }

        log::debug!("Committed {} features on layer '{}'", self.pending, self.layer.name());
        self.pending = 0;
        Ok(())
    }

    /// Sets the values of the fields (by index) on the feature with the provided id
    pub fn write(&mut self, fid: u64, values: &[(usize, f64)]) -> Result<()> {
        self.start_transaction()?;

        let rc = {
            let mut feature = self
                .layer
                .feature(fid)
                .ok_or_else(|| Error::Runtime(format!("Feature {} not found in layer '{}'", fid, self.layer.name())))?;

            for &(field_index, value) in values {
                feature.set_field_double(field_index, value)?;
            }

            unsafe { gdal_sys::OGR_L_SetFeature(self.layer.c_layer(), feature.c_feature()) as i64 }
        };

        if rc != OGRERR_NONE {
            return Err(Error::Runtime(format!(
                "Failed to update feature {} in layer '{}' (error code {rc})",
                fid,
                self.layer.name()
            )));
        }

        self.pending += 1;
        self.written += 1;
        if self.pending >= self.transaction_size {
            self.commit_transaction()?;
        }

        Ok(())
    }

    /// Commits the outstanding writes, returns the number of written features
    pub fn finish(mut self) -> Result<usize> {
        self.commit_transaction()?;
        Ok(self.written)
    }
}

impl<L: LayerAccess> Drop for FieldWriter<'_, L> {
    fn drop(&mut self) {
        if self.in_transaction {
            // Only reached when writing failed, discard the partial batch
            unsafe { gdal_sys::OGR_L_RollbackTransaction(self.layer.c_layer()) };
        }
    }
}

#[cfg(test)]
mod tests {
    use gdal::vector::{FieldValue, LayerAccess};

    use super::*;
    use crate::testutils;

    #[test_log::test]
    fn open_invalid_path() {
        let path = PathBuf::from("/this/does/not/exist.gpkg");
        assert!(matches!(dataset::open_read_only(&path), Err(Error::InvalidPath(p)) if p == path));
    }

    #[test_log::test]
    fn case_insensitive_field_creation() -> Result<()> {
        let mut ds = dataset::create_in_memory()?;
        let mut layer = testutils::create_polygon_layer(&mut ds, None, &["POLYGON ((0 0, 1 0, 1 1, 0 1, 0 0))"])?;

        let indexes = layer.ensure_real_fields(&["Mean", "max"])?;
        assert_eq!(indexes, vec![0, 1]);
        assert_eq!(layer.field_index_case_insensitive("MEAN"), Some(0));

        // Existing fields are not created again
        let indexes = layer.ensure_real_fields(&["MAX", "count"])?;
        assert_eq!(indexes, vec![1, 2]);
        assert_eq!(layer.defn().fields().count(), 3);
        Ok(())
    }

    #[test_log::test]
    fn write_fields_in_transactions() -> Result<()> {
        let mut ds = dataset::create_in_memory()?;
        let polygons = [
            "POLYGON ((0 0, 1 0, 1 1, 0 1, 0 0))",
            "POLYGON ((1 1, 2 1, 2 2, 1 2, 1 1))",
            "POLYGON ((2 2, 3 2, 3 3, 2 3, 2 2))",
        ];
        let mut layer = testutils::create_polygon_layer(&mut ds, None, &polygons)?;
        let field_indexes = layer.ensure_real_fields(&["value"])?;
        let features = layer.read_features()?;
        assert_eq!(features.len(), 3);

        let mut writer = FieldWriter::with_transaction_size(&mut layer, 2);
        for (i, feature) in features.iter().enumerate() {
            writer.write(feature.fid, &[(field_indexes[0], i as f64 * 1.5)])?;
        }
        assert_eq!(writer.finish()?, 3);

        let values: Vec<Option<FieldValue>> = layer.features().map(|f| f.field(field_indexes[0])).collect::<std::result::Result<_, _>>()?;
        assert_eq!(
            values,
            vec![
                Some(FieldValue::RealValue(0.0)),
                Some(FieldValue::RealValue(1.5)),
                Some(FieldValue::RealValue(3.0))
            ]
        );
        Ok(())
    }
}
