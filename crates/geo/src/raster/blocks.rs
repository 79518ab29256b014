//! Streaming of co-registered rasters in fixed-size, optionally overlapping blocks.
//!
//! Blocks are visited in row-major order. Every block carries the values of its interior
//! window plus an overlap border on every side, border cells outside of the raster contain
//! the nodata value of the band (or 0 when the band has no nodata value).

use crate::raster::RasterDataset;
use crate::{Error, PixelWindow, RasterSize, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockReaderOptions {
    /// Size of the interior of a block in pixels
    pub block_size: usize,
    /// Number of border pixels added on every side of a block
    pub overlap: usize,
}

impl Default for BlockReaderOptions {
    fn default() -> Self {
        BlockReaderOptions {
            block_size: 200,
            overlap: 0,
        }
    }
}

/// A raster to stream together with the bands (1-based) to read, an empty band list selects all bands
#[derive(Clone)]
pub struct BlockLayer<'a> {
    pub raster: &'a RasterDataset,
    pub bands: Vec<usize>,
}

impl<'a> BlockLayer<'a> {
    pub fn new(raster: &'a RasterDataset, bands: Vec<usize>) -> Self {
        BlockLayer { raster, bands }
    }

    pub fn all_bands(raster: &'a RasterDataset) -> Self {
        BlockLayer { raster, bands: Vec::new() }
    }
}

/// Values of one band of a block in row-major order, including the overlap border
#[derive(Debug, Clone, PartialEq)]
pub struct BandBuffer {
    size: RasterSize,
    data: Vec<f64>,
}

impl BandBuffer {
    pub fn new(size: RasterSize, data: Vec<f64>) -> Self {
        debug_assert_eq!(size.cell_count(), data.len());
        BandBuffer { size, data }
    }

    pub fn filled(size: RasterSize, value: f64) -> Self {
        BandBuffer {
            size,
            data: vec![value; size.cell_count()],
        }
    }

    pub fn size(&self) -> RasterSize {
        self.size
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    pub fn value(&self, row: usize, col: usize) -> f64 {
        self.data[row * self.size.cols + col]
    }
}

/// One block of data for every streamed layer
pub struct RasterBlock {
    window: PixelWindow,
    overlap: usize,
    layers: Vec<Vec<BandBuffer>>,
}

impl RasterBlock {
    /// The interior of the block in raster pixel coordinates
    pub fn window(&self) -> PixelWindow {
        self.window
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// The size of the band buffers: the interior plus the overlap border
    pub fn padded_size(&self) -> RasterSize {
        RasterSize::with_rows_cols(self.window.height + 2 * self.overlap, self.window.width + 2 * self.overlap)
    }

    /// The band buffers of the layer in the order of the band selection
    pub fn layer(&self, layer_index: usize) -> &[BandBuffer] {
        &self.layers[layer_index]
    }

    pub fn band(&self, layer_index: usize, band: usize) -> &BandBuffer {
        &self.layers[layer_index][band]
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }
}

struct LayerBands<'a> {
    raster: &'a RasterDataset,
    bands: Vec<usize>,
    fill_values: Vec<f64>,
}

/// Iterator over the blocks of one or more co-registered rasters
pub struct BlockReader<'a> {
    layers: Vec<LayerBands<'a>>,
    options: BlockReaderOptions,
    size: RasterSize,
    blocks_x: usize,
    blocks_y: usize,
    next_block: usize,
}

impl<'a> BlockReader<'a> {
    /// All layers must share the raster size and geotransform of the first layer
    pub fn new(layers: Vec<BlockLayer<'a>>, options: BlockReaderOptions) -> Result<Self> {
        if options.block_size == 0 {
            return Err(Error::Configuration("Block size must be at least 1".to_string()));
        }

        let first_raster = layers
            .first()
            .map(|layer| layer.raster)
            .ok_or_else(|| Error::Configuration("At least one raster is needed to read blocks".to_string()))?;
        let georef = first_raster.georeference(1)?;

        let mut layer_bands = Vec::with_capacity(layers.len());
        for layer in layers {
            let layer_georef = layer.raster.georeference(1)?;
            if !layer_georef.is_aligned_with(&georef) {
                return Err(Error::Configuration(format!(
                    "Raster '{}' is not aligned with '{}' ({:?} {} <-> {:?} {})",
                    layer.raster.name(),
                    first_raster.name(),
                    layer_georef.geo_transform(),
                    layer_georef.raster_size(),
                    georef.geo_transform(),
                    georef.raster_size(),
                )));
            }

            let bands = if layer.bands.is_empty() {
                (1..=layer.raster.band_count()).collect()
            } else {
                layer
                    .bands
                    .iter()
                    .map(|&band| layer.raster.checked_band_index(band))
                    .collect::<Result<Vec<usize>>>()?
            };

            let fill_values = bands
                .iter()
                .map(|&band| Ok(layer.raster.nodata(band)?.unwrap_or(0.0)))
                .collect::<Result<Vec<f64>>>()?;

            layer_bands.push(LayerBands {
                raster: layer.raster,
                bands,
                fill_values,
            });
        }

        let size = georef.raster_size();
        Ok(BlockReader {
            layers: layer_bands,
            options,
            size,
            blocks_x: size.cols.div_ceil(options.block_size),
            blocks_y: size.rows.div_ceil(options.block_size),
            next_block: 0,
        })
    }

    pub fn block_count(&self) -> usize {
        self.blocks_x * self.blocks_y
    }

    /// Number of selected bands per layer
    pub fn band_counts(&self) -> Vec<usize> {
        self.layers.iter().map(|layer| layer.bands.len()).collect()
    }

    fn read_block(&self, block_index: usize) -> Result<RasterBlock> {
        let block_size = self.options.block_size;
        let overlap = self.options.overlap;
        let block_row = block_index / self.blocks_x;
        let block_col = block_index % self.blocks_x;

        let x_offset = block_col * block_size;
        let y_offset = block_row * block_size;
        let window = PixelWindow::new(
            x_offset,
            y_offset,
            block_size.min(self.size.cols - x_offset),
            block_size.min(self.size.rows - y_offset),
        );

        // The part of the padded block that lies inside of the raster
        let read_x_start = x_offset.saturating_sub(overlap);
        let read_y_start = y_offset.saturating_sub(overlap);
        let read_x_end = (x_offset + window.width + overlap).min(self.size.cols);
        let read_y_end = (y_offset + window.height + overlap).min(self.size.rows);
        let read_window = PixelWindow::new(read_x_start, read_y_start, read_x_end - read_x_start, read_y_end - read_y_start);

        // Position of the read window inside of the padded block
        let dst_col = read_x_start + overlap - x_offset;
        let dst_row = read_y_start + overlap - y_offset;

        let padded_size = RasterSize::with_rows_cols(window.height + 2 * overlap, window.width + 2 * overlap);
        let mut layers = Vec::with_capacity(self.layers.len());
        for layer in &self.layers {
            let mut buffers = Vec::with_capacity(layer.bands.len());
            for (&band, &fill) in layer.bands.iter().zip(layer.fill_values.iter()) {
                let values = layer.raster.read_window(band, &read_window)?;
                if overlap == 0 {
                    buffers.push(BandBuffer::new(padded_size, values));
                    continue;
                }

                let mut buffer = BandBuffer::filled(padded_size, fill);
                for (row, src_row) in values.chunks_exact(read_window.width).enumerate() {
                    let start = (dst_row + row) * padded_size.cols + dst_col;
                    buffer.data[start..start + read_window.width].copy_from_slice(src_row);
                }

                buffers.push(buffer);
            }

            layers.push(buffers);
        }

        Ok(RasterBlock { window, overlap, layers })
    }
}

impl Iterator for BlockReader<'_> {
    type Item = Result<RasterBlock>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next_block >= self.block_count() {
            return None;
        }

        let block = self.read_block(self.next_block);
        self.next_block += 1;
        if block.is_err() {
            // Stop iterating after the first error
            self.next_block = self.block_count();
        }

        Some(block)
    }
}
