//! Extraction of chip samples: square pixel neighbourhoods centered on the mask pixels that
//! match a target value.
//!
//! The mask is scanned twice. The first pass counts the matching pixels so the sample arrays
//! are allocated once, the second pass streams the mask together with the images in overlapping
//! blocks and copies the chips. Samples are stored in block-scan order, for every matching pixel
//! the plain chip is followed by one chip per requested rotation.

mod rotate;

use std::path::Path;

use ndarray::{Array3, Array4};

use geo::ArrayDataType;
use geo::raster::{BandBuffer, BlockLayer, BlockReader, BlockReaderOptions, RasterBlock, RasterDataset};

use crate::{Description, Error, ImageBands, Result, SampleContainer, store};

use self::rotate::{Rotation, SourceWindow};

#[derive(Debug, Clone, PartialEq)]
pub struct ChipExtractionOptions {
    /// Width and height of the chips in pixels
    pub chip_size: usize,
    /// Chips are extracted around the mask pixels with this value
    pub mask_value: f64,
    /// The mask band (1-based)
    pub mask_band: usize,
    /// Additional rotated chips per matching pixel, counter-clockwise angles in degrees
    pub rotations: Vec<f64>,
    /// Size of the blocks used to stream the rasters
    pub block_size: usize,
}

impl Default for ChipExtractionOptions {
    fn default() -> Self {
        ChipExtractionOptions {
            chip_size: 32,
            mask_value: 1.0,
            mask_band: 1,
            rotations: Vec::new(),
            block_size: BlockReaderOptions::default().block_size,
        }
    }
}

/// Counts the mask pixels equal to `mask_value`
pub(crate) fn count_mask_pixels(mask: &RasterDataset, mask_band: usize, mask_value: f64, block_size: usize) -> Result<usize> {
    let reader = BlockReader::new(
        vec![BlockLayer::new(mask, vec![mask_band])],
        BlockReaderOptions { block_size, overlap: 0 },
    )?;

    let mut count = 0;
    for block in reader {
        count += block?.band(0, 0).data().iter().filter(|&&v| v == mask_value).count();
    }

    Ok(count)
}

/// Per call configuration shared by every block
struct ChipContext {
    chip_size: usize,
    half: usize,
    odd: usize,
    /// Border needed to rotate a chip without running out of source pixels
    rotation_half: usize,
    rotations: Vec<Rotation>,
    mask_value: f64,
    image_layers: usize,
    has_reference: bool,
}

impl ChipContext {
    fn new(options: &ChipExtractionOptions, image_layers: usize, has_reference: bool) -> Self {
        let chip_size = options.chip_size;
        ChipContext {
            chip_size,
            half: chip_size / 2,
            odd: chip_size % 2,
            rotation_half: (chip_size as f64 * std::f64::consts::SQRT_2 / 2.0).ceil() as usize,
            rotations: options.rotations.iter().map(|&angle| Rotation::from_degrees(angle)).collect(),
            mask_value: options.mask_value,
            image_layers,
            has_reference,
        }
    }

    fn overlap(&self) -> usize {
        if self.rotations.is_empty() {
            self.half
        } else {
            self.rotation_half
        }
    }

    fn samples_per_pixel(&self) -> usize {
        1 + self.rotations.len()
    }

    /// Side of the window that is rotated before cropping to the chip size
    fn rotation_side(&self) -> usize {
        2 * self.rotation_half + self.odd
    }

    fn reference_layer(&self) -> usize {
        1 + self.image_layers
    }
}

/// The sample arrays being filled
struct ChipAccumulator {
    data: Array4<f64>,
    reference: Option<Array3<f64>>,
    next_slot: usize,
}

impl ChipAccumulator {
    fn check_capacity(&self) -> Result<()> {
        if self.next_slot >= self.data.shape()[0] {
            return Err(Error::Runtime(format!(
                "More matching mask pixels found than counted ({} samples allocated)",
                self.data.shape()[0]
            )));
        }

        Ok(())
    }

    /// Copies the chip with its top left corner at `(top, left)` in the block buffers
    fn push_chip(&mut self, ctx: &ChipContext, block: &RasterBlock, top: usize, left: usize) -> Result<()> {
        self.check_capacity()?;
        let slot = self.next_slot;

        let mut band_offset = 0;
        for layer in 1..=ctx.image_layers {
            for buffer in block.layer(layer) {
                for row in 0..ctx.chip_size {
                    for col in 0..ctx.chip_size {
                        self.data[[slot, row, col, band_offset]] = buffer.value(top + row, left + col);
                    }
                }
                band_offset += 1;
            }
        }

        if let Some(reference) = &mut self.reference {
            let buffer = block.band(ctx.reference_layer(), 0);
            for row in 0..ctx.chip_size {
                for col in 0..ctx.chip_size {
                    reference[[slot, row, col]] = buffer.value(top + row, left + col);
                }
            }
        }

        self.next_slot += 1;
        Ok(())
    }

    /// Rotates the window of side `ctx.rotation_side()` with its top left corner at `(top, left)`
    /// and stores the centered chip
    fn push_rotated_chip(&mut self, ctx: &ChipContext, block: &RasterBlock, rotation: &Rotation, top: usize, left: usize) -> Result<()> {
        self.check_capacity()?;
        let slot = self.next_slot;
        let side = ctx.rotation_side();
        let crop = ctx.rotation_half - ctx.half;

        let mut band_offset = 0;
        for layer in 1..=ctx.image_layers {
            for buffer in block.layer(layer) {
                let window = SourceWindow::new(buffer, top, left, side);
                for row in 0..ctx.chip_size {
                    for col in 0..ctx.chip_size {
                        let (src_row, src_col) = rotation.source_position(side, row + crop, col + crop);
                        self.data[[slot, row, col, band_offset]] = window.bilinear(src_row, src_col);
                    }
                }
                band_offset += 1;
            }
        }

        if let Some(reference) = &mut self.reference {
            let window = SourceWindow::new(block.band(ctx.reference_layer(), 0), top, left, side);
            for row in 0..ctx.chip_size {
                for col in 0..ctx.chip_size {
                    let (src_row, src_col) = rotation.source_position(side, row + crop, col + crop);
                    reference[[slot, row, col]] = window.nearest(src_row, src_col);
                }
            }
        }

        self.next_slot += 1;
        Ok(())
    }

    fn process_block(&mut self, ctx: &ChipContext, block: &RasterBlock) -> Result<()> {
        let window = block.window();
        let overlap = block.overlap();
        let mask: &BandBuffer = block.band(0, 0);

        for row in 0..window.height {
            for col in 0..window.width {
                // position of the pixel in the padded block buffers
                let row = row + overlap;
                let col = col + overlap;
                if mask.value(row, col) != ctx.mask_value {
                    continue;
                }

                self.push_chip(ctx, block, row - ctx.half, col - ctx.half)?;
                for rotation in &ctx.rotations {
                    self.push_rotated_chip(ctx, block, rotation, row - ctx.rotation_half, col - ctx.rotation_half)?;
                }
            }
        }

        Ok(())
    }
}

fn validate(images: &[ImageBands], reference: Option<&RasterDataset>, options: &ChipExtractionOptions) -> Result<()> {
    if images.is_empty() {
        return Err(Error::Configuration("At least one image is needed to extract chips".to_string()));
    }

    if options.chip_size == 0 {
        return Err(Error::Configuration("Chip size must be at least 1".to_string()));
    }

    if let Some(reference) = reference {
        if options.chip_size % 2 != 0 {
            return Err(Error::Configuration(format!(
                "Chip size must be even when extracting reference chips from '{}' (got {})",
                reference.name(),
                options.chip_size
            )));
        }
    }

    if options.rotations.iter().any(|angle| !angle.is_finite()) {
        return Err(Error::Configuration(format!("Invalid rotation angles: {:?}", options.rotations)));
    }

    Ok(())
}

/// Extracts a chip around every mask pixel that matches the mask value.
///
/// The chips contain the selected bands of the images in order, `reference` provides the
/// optional reference chips (band 1). All rasters need to share the grid of the mask.
pub fn extract_chip_samples(
    mask: &RasterDataset,
    images: &[ImageBands],
    reference: Option<&RasterDataset>,
    options: &ChipExtractionOptions,
) -> Result<SampleContainer> {
    validate(images, reference, options)?;

    let ctx = ChipContext::new(options, images.len(), reference.is_some());
    let mut layers = Vec::with_capacity(images.len() + 2);
    layers.push(BlockLayer::new(mask, vec![options.mask_band]));
    layers.extend(images.iter().cloned());
    if let Some(reference) = reference {
        layers.push(BlockLayer::new(reference, vec![1]));
    }

    // validates the alignment of the rasters before the first pass
    let reader = BlockReader::new(
        layers,
        BlockReaderOptions {
            block_size: options.block_size,
            overlap: ctx.overlap(),
        },
    )?;
    let band_count: usize = reader.band_counts().iter().skip(1).take(images.len()).sum();

    let pixel_count = count_mask_pixels(mask, options.mask_band, options.mask_value, options.block_size)?;
    let sample_count = pixel_count * ctx.samples_per_pixel();
    log::debug!(
        "Found {pixel_count} pixels with value {} in '{}', extracting {sample_count} chips",
        options.mask_value,
        mask.name()
    );

    let mut acc = ChipAccumulator {
        data: Array4::zeros((sample_count, ctx.chip_size, ctx.chip_size, band_count)),
        reference: ctx
            .has_reference
            .then(|| Array3::zeros((sample_count, ctx.chip_size, ctx.chip_size))),
        next_slot: 0,
    };

    for block in reader {
        acc.process_block(&ctx, &block?)?;
    }

    if acc.next_slot != sample_count {
        return Err(Error::Runtime(format!(
            "Extracted {} chips from '{}' but {} were counted",
            acc.next_slot,
            mask.name(),
            sample_count
        )));
    }

    let description = if ctx.has_reference {
        Description::ImageRefTiles
    } else {
        Description::ImageTiles
    };

    log::info!(
        "Extracted {} chips of {}x{}x{} from '{}'",
        sample_count,
        ctx.chip_size,
        ctx.chip_size,
        band_count,
        mask.name()
    );
    SampleContainer::chips(acc.data, acc.reference, description)
}

/// Extracts the chips and writes them to a sample container file, returns the number of samples
pub fn extract_chip_samples_to_file(
    mask: &RasterDataset,
    images: &[ImageBands],
    reference: Option<&RasterDataset>,
    options: &ChipExtractionOptions,
    output: &Path,
    data_type: ArrayDataType,
) -> Result<usize> {
    let container = extract_chip_samples(mask, images, reference, options)?;
    store::write(&container, output, data_type)?;
    Ok(container.len())
}

#[cfg(test)]
mod tests {
    use ndarray::s;

    use geo::testutils;
    use geo::{GeoReference, Point};

    use super::*;

    const TARGET: f64 = 7.0;

    fn grid(nodata: Option<f64>) -> GeoReference {
        testutils::test_georeference(10, 10, Point::new(0.0, 10.0), 1.0, nodata)
    }

    fn mask(pixels: &[(usize, usize)]) -> Result<RasterDataset> {
        let mut data = vec![0u8; 100];
        data[55] = 3;
        for &(row, col) in pixels {
            data[row * 10 + col] = TARGET as u8;
        }
        testutils::create_raster(&grid(Some(0.0)), &[&data])
    }

    fn image(offset: f32) -> Result<RasterDataset> {
        let data: Vec<f32> = (0..100).map(|v| offset + v as f32).collect();
        testutils::create_raster(&grid(None), &[&data])
    }

    fn options(chip_size: usize) -> ChipExtractionOptions {
        ChipExtractionOptions {
            chip_size,
            mask_value: TARGET,
            ..Default::default()
        }
    }

    #[test_log::test]
    fn chip_shape_and_values() -> Result<()> {
        let mask = mask(&[(2, 3), (0, 0), (8, 9)])?;
        let img1 = image(0.0)?;
        let img2 = image(1000.0)?;
        let images = [ImageBands::all_bands(&img1), ImageBands::all_bands(&img2)];

        let samples = extract_chip_samples(&mask, &images, None, &options(3))?;
        assert_eq!(samples.data().shape(), &[3, 3, 3, 2]);
        assert_eq!(samples.description(), &Description::ImageTiles);
        assert!(samples.reference().is_none());

        // block-scan order: (0, 0), (2, 3), (8, 9)
        let data = samples.data();
        assert_eq!(data[[0, 1, 1, 0]], 0.0);
        assert_eq!(data[[1, 1, 1, 0]], 23.0);
        assert_eq!(data[[1, 1, 1, 1]], 1023.0);
        assert_eq!(data[[1, 0, 0, 0]], 12.0);
        assert_eq!(data[[1, 2, 2, 1]], 1034.0);
        assert_eq!(data[[2, 1, 1, 0]], 89.0);

        // the border outside of the raster is zero filled
        assert_eq!(data[[0, 0, 0, 0]], 0.0);
        assert_eq!(data[[0, 2, 2, 1]], 1011.0);
        assert_eq!(data[[2, 1, 2, 0]], 0.0);
        Ok(())
    }

    #[test_log::test]
    fn chip_order_follows_blocks() -> Result<()> {
        let mask = mask(&[(1, 8), (3, 2)])?;
        let img = image(0.0)?;
        let opts = ChipExtractionOptions {
            block_size: 5,
            ..options(1)
        };

        let samples = extract_chip_samples(&mask, &[ImageBands::all_bands(&img)], None, &opts)?;
        // all pixels of the top left block come before the pixels of the top right block
        assert_eq!(samples.data().iter().copied().collect::<Vec<_>>(), vec![32.0, 18.0]);
        Ok(())
    }

    #[test_log::test]
    fn band_selection() -> Result<()> {
        let mask = mask(&[(4, 4)])?;
        let georef = grid(None);
        let band1 = vec![1.0f32; 100];
        let band2 = vec![2.0f32; 100];
        let band3 = vec![3.0f32; 100];
        let img = testutils::create_raster(&georef, &[band1.as_slice(), band2.as_slice(), band3.as_slice()])?;

        let samples = extract_chip_samples(&mask, &[ImageBands::new(&img, vec![3, 1])], None, &options(2))?;
        assert_eq!(samples.data().shape(), &[1, 2, 2, 2]);
        assert!(samples.data().slice(s![.., .., .., 0]).iter().all(|&v| v == 3.0));
        assert!(samples.data().slice(s![.., .., .., 1]).iter().all(|&v| v == 1.0));
        Ok(())
    }

    #[test_log::test]
    fn rotations_multiply_samples() -> Result<()> {
        let targets = [(1, 1), (4, 5), (5, 4), (9, 9)];
        let mask = mask(&targets)?;
        let img = image(0.0)?;

        for rotations in [vec![], vec![90.0], vec![90.0, 180.0, 45.0]] {
            let opts = ChipExtractionOptions {
                rotations: rotations.clone(),
                ..options(3)
            };
            let samples = extract_chip_samples(&mask, &[ImageBands::all_bands(&img)], None, &opts)?;
            assert_eq!(samples.len(), targets.len() * (1 + rotations.len()));
        }

        Ok(())
    }

    #[test_log::test]
    fn chips_across_block_boundaries() -> Result<()> {
        // every target lies on the edge of a 3 pixel block, the order of the targets
        // is the same in block-scan and row-major order
        let targets = [(2, 2), (2, 3), (3, 5), (5, 6), (6, 0), (9, 9)];
        let mask = mask(&targets)?;
        let img1 = image(0.0)?;
        let img2 = image(1000.0)?;
        let images = [ImageBands::all_bands(&img1), ImageBands::all_bands(&img2)];
        let reference_data: Vec<u8> = (0..100).map(|v| (v % 10) as u8).collect();
        let reference = testutils::create_raster(&grid(None), &[&reference_data])?;

        let opts = ChipExtractionOptions {
            rotations: vec![45.0, 90.0],
            ..options(4)
        };
        let single_block = extract_chip_samples(&mask, &images, Some(&reference), &opts)?;
        let small_blocks = extract_chip_samples(
            &mask,
            &images,
            Some(&reference),
            &ChipExtractionOptions {
                block_size: 3,
                ..opts.clone()
            },
        )?;

        assert_eq!(small_blocks.len(), targets.len() * 3);
        assert_eq!(small_blocks.data().shape(), &[18, 4, 4, 2]);
        assert_eq!(small_blocks.data(), single_block.data());
        assert_eq!(small_blocks.reference(), single_block.reference());

        // chip of (2, 3) covers rows 0..4 and columns 1..5, spanning four blocks
        assert_eq!(
            small_blocks.data().slice(s![3, .., .., 0]),
            ndarray::array![[1.0, 2.0, 3.0, 4.0], [11.0, 12.0, 13.0, 14.0], [21.0, 22.0, 23.0, 24.0], [31.0, 32.0, 33.0, 34.0]]
        );
        Ok(())
    }

    #[test_log::test]
    fn rotated_chip_values() -> Result<()> {
        let mask = mask(&[(4, 4)])?;
        let img = image(0.0)?;
        let opts = ChipExtractionOptions {
            rotations: vec![0.0, 90.0],
            ..options(3)
        };

        let samples = extract_chip_samples(&mask, &[ImageBands::all_bands(&img)], None, &opts)?;
        let plain = samples.data().slice(s![0, .., .., 0]).to_owned();
        let unrotated = samples.data().slice(s![1, .., .., 0]).to_owned();
        let quarter = samples.data().slice(s![2, .., .., 0]).to_owned();

        assert_eq!(plain, ndarray::array![[33.0, 34.0, 35.0], [43.0, 44.0, 45.0], [53.0, 54.0, 55.0]]);
        assert_eq!(unrotated, plain);
        assert_eq!(quarter, ndarray::array![[35.0, 45.0, 55.0], [34.0, 44.0, 54.0], [33.0, 43.0, 53.0]]);
        Ok(())
    }

    #[test_log::test]
    fn reference_chips() -> Result<()> {
        let mask = mask(&[(5, 5)])?;
        let img = image(0.0)?;
        let reference_data: Vec<u8> = (0..100).map(|v| (v % 10) as u8).collect();
        let reference = testutils::create_raster(&grid(None), &[&reference_data])?;

        let opts = ChipExtractionOptions {
            rotations: vec![180.0],
            ..options(2)
        };
        let samples = extract_chip_samples(&mask, &[ImageBands::all_bands(&img)], Some(&reference), &opts)?;
        assert_eq!(samples.description(), &Description::ImageRefTiles);

        let reference = samples.reference().expect("reference chips");
        assert_eq!(reference.shape(), &[2, 2, 2]);
        // chip covers rows 4..6 and columns 4..6
        assert_eq!(reference.slice(s![0, .., ..]).iter().copied().collect::<Vec<_>>(), vec![4.0, 5.0, 4.0, 5.0]);
        assert_eq!(reference.slice(s![1, .., ..]).iter().copied().collect::<Vec<_>>(), vec![5.0, 4.0, 5.0, 4.0]);
        assert_eq!(samples.data()[[1, 0, 0, 0]], 55.0);
        Ok(())
    }

    #[test_log::test]
    fn invalid_configurations() -> Result<()> {
        let mask = mask(&[(5, 5)])?;
        let img = image(0.0)?;
        let images = [ImageBands::all_bands(&img)];

        assert!(matches!(
            extract_chip_samples(&mask, &[], None, &options(3)),
            Err(Error::Configuration(_))
        ));
        assert!(matches!(
            extract_chip_samples(&mask, &images, None, &options(0)),
            Err(Error::Configuration(_))
        ));
        assert!(matches!(
            extract_chip_samples(&mask, &images, Some(&img), &options(3)),
            Err(Error::Configuration(_))
        ));

        let other_grid = testutils::test_georeference(10, 10, Point::new(5.0, 10.0), 1.0, None);
        let zeros = vec![0f32; 100];
        let shifted = testutils::create_raster(&other_grid, &[zeros.as_slice()])?;
        assert!(matches!(
            extract_chip_samples(&mask, &[ImageBands::all_bands(&shifted)], None, &options(3)),
            Err(Error::Configuration(_))
        ));
        Ok(())
    }

    #[test_log::test]
    fn no_matching_pixels() -> Result<()> {
        let mask = mask(&[])?;
        let img = image(0.0)?;
        let samples = extract_chip_samples(&mask, &[ImageBands::all_bands(&img)], None, &options(4))?;
        assert!(samples.is_empty());
        assert_eq!(samples.trailing_shape(), &[4, 4, 1]);
        Ok(())
    }
}
