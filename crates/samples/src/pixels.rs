//! Extraction of tabular pixel samples: the band values of every mask pixel that matches a target value.

use std::path::Path;

use ndarray::{Array2, Axis};

use geo::ArrayDataType;
use geo::raster::{BlockLayer, BlockReader, BlockReaderOptions, RasterDataset};

use crate::chips::count_mask_pixels;
use crate::{Description, Error, ImageBands, Result, SampleContainer, store};

#[derive(Debug, Clone, PartialEq)]
pub struct PixelExtractionOptions {
    /// Samples are extracted for the mask pixels with this value
    pub mask_value: f64,
    /// The mask band (1-based)
    pub mask_band: usize,
    pub block_size: usize,
}

impl Default for PixelExtractionOptions {
    fn default() -> Self {
        PixelExtractionOptions {
            mask_value: 1.0,
            mask_band: 1,
            block_size: BlockReaderOptions::default().block_size,
        }
    }
}

/// Extracts one row per matching mask pixel with the selected bands of the images in order.
/// Rows containing a non-finite value are dropped.
pub fn extract_pixel_samples(mask: &RasterDataset, images: &[ImageBands], options: &PixelExtractionOptions) -> Result<SampleContainer> {
    if images.is_empty() {
        return Err(Error::Configuration("At least one image is needed to extract pixel samples".to_string()));
    }

    let mut layers = Vec::with_capacity(images.len() + 1);
    layers.push(BlockLayer::new(mask, vec![options.mask_band]));
    layers.extend(images.iter().cloned());
    let reader = BlockReader::new(
        layers,
        BlockReaderOptions {
            block_size: options.block_size,
            overlap: 0,
        },
    )?;
    let variable_count: usize = reader.band_counts().iter().skip(1).sum();

    let pixel_count = count_mask_pixels(mask, options.mask_band, options.mask_value, options.block_size)?;
    let mut samples = Array2::<f64>::zeros((pixel_count, variable_count));
    let mut next_row = 0;

    for block in reader {
        let block = block?;
        let mask_buffer = block.band(0, 0);
        for (index, _) in mask_buffer.data().iter().enumerate().filter(|&(_, &v)| v == options.mask_value) {
            if next_row >= pixel_count {
                return Err(Error::Runtime(format!(
                    "More matching mask pixels found in '{}' than counted ({pixel_count})",
                    mask.name()
                )));
            }

            let mut variable = 0;
            for layer in 1..block.layer_count() {
                for buffer in block.layer(layer) {
                    samples[[next_row, variable]] = buffer.data()[index];
                    variable += 1;
                }
            }
            next_row += 1;
        }
    }

    if next_row != pixel_count {
        return Err(Error::Runtime(format!(
            "Extracted {next_row} pixel samples from '{}' but {pixel_count} were counted",
            mask.name()
        )));
    }

    let finite_rows: Vec<usize> = samples
        .axis_iter(Axis(0))
        .enumerate()
        .filter(|(_, row)| row.iter().all(|v| v.is_finite()))
        .map(|(index, _)| index)
        .collect();

    if finite_rows.len() != pixel_count {
        log::debug!(
            "Dropped {} pixel samples with non finite values",
            pixel_count - finite_rows.len()
        );
    }

    let samples = samples.select(Axis(0), &finite_rows);
    log::info!(
        "Extracted {} pixel samples with {} variables from '{}'",
        samples.nrows(),
        variable_count,
        mask.name()
    );
    Ok(SampleContainer::tabular(samples, Description::FiniteValues))
}

/// Extracts the pixel samples and writes them to a sample container file, returns the number of samples
pub fn extract_pixel_samples_to_file(
    mask: &RasterDataset,
    images: &[ImageBands],
    options: &PixelExtractionOptions,
    output: &Path,
    data_type: ArrayDataType,
) -> Result<usize> {
    let container = extract_pixel_samples(mask, images, options)?;
    store::write(&container, output, data_type)?;
    Ok(container.len())
}
