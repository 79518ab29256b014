use std::path::{Path, PathBuf};
use std::str::FromStr;

use clap::{Parser, Subcommand};
use env_logger::{Env, TimestampPrecision};
use gdal::vector::Layer;

use geo::ArrayDataType;
use geo::crs::Epsg;
use geo::raster::RasterDataset;
use geo::vector::io::dataset;
use samples::chips::{ChipExtractionOptions, extract_chip_samples_to_file};
use samples::pixels::{PixelExtractionOptions, extract_pixel_samples_to_file};
use samples::points::{PointValueOptions, point_band_values};
use samples::split::{SplitSizes, split_sample, split_sample_train_valid_test};
use samples::store;
use samples::zonal::{StatField, ZonalStatsOptions, zonal_band_stats};
use samples::{ImageBands, capabilities};

pub type Result<T> = anyhow::Result<T>;

fn parse_arg<T: FromStr<Err = samples::Error>>(s: &str) -> std::result::Result<T, String> {
    s.parse::<T>().map_err(|err| err.to_string())
}

/// An image path with an optional band selection: `image.tif` or `image.tif:1,3`
#[derive(Debug, Clone)]
struct ImageArg {
    path: PathBuf,
    bands: Vec<usize>,
}

fn parse_image(s: &str) -> std::result::Result<ImageArg, String> {
    if let Some((path, bands)) = s.rsplit_once(':') {
        let parsed: std::result::Result<Vec<usize>, _> = bands.split(',').map(|band| band.trim().parse::<usize>()).collect();
        if let Ok(bands) = parsed {
            return Ok(ImageArg {
                path: PathBuf::from(path),
                bands,
            });
        }
    }

    Ok(ImageArg {
        path: PathBuf::from(s),
        bands: Vec::new(),
    })
}

#[derive(Parser, Debug)]
#[command(name = "samplecli", about = "Zonal statistics and training sample extraction")]
struct Cli {
    /// Enable debug logging
    #[arg(short = 'v', long = "verbose", global = true)]
    verbose: bool,

    /// Location of the proj.db file
    #[arg(long = "proj-db", global = true)]
    proj_db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(name = "zonal-stats", about = "Store raster statistics per polygon as attributes of the vector layer")]
    ZonalStats {
        #[arg(long = "vector", help = "Vector file, updated in place")]
        vector: PathBuf,
        #[arg(long = "layer", help = "Layer name, the first layer when omitted")]
        layer: Option<String>,
        #[arg(long = "raster")]
        raster: PathBuf,
        #[arg(long = "band", default_value = "1")]
        band: usize,
        #[arg(long = "stat", required = true, value_parser = parse_arg::<StatField>, help = "Statistic to compute: min, max, mean, std, sum, count, mode, median or pNN, optionally followed by =field_name")]
        stats: Vec<StatField>,
        #[arg(long = "min")]
        min_threshold: Option<f64>,
        #[arg(long = "max")]
        max_threshold: Option<f64>,
        #[arg(long = "out-nodata", default_value = "0", allow_negative_numbers = true)]
        out_nodata: f64,
        #[arg(long = "vector-epsg", value_parser = parse_arg::<Epsg>, help = "Overrides the spatial reference of the vector layer")]
        vector_epsg: Option<Epsg>,
        #[arg(long = "reproject")]
        reproject: bool,
    },
    #[command(name = "point-values", about = "Store the raster value below every point as attribute of the vector layer")]
    PointValues {
        #[arg(long = "vector", help = "Vector file, updated in place")]
        vector: PathBuf,
        #[arg(long = "layer")]
        layer: Option<String>,
        #[arg(long = "raster")]
        raster: PathBuf,
        #[arg(long = "band", default_value = "1")]
        band: usize,
        #[arg(long = "field", default_value = "value")]
        field: String,
        #[arg(long = "min")]
        min_threshold: Option<f64>,
        #[arg(long = "max")]
        max_threshold: Option<f64>,
        #[arg(long = "out-nodata", default_value = "0", allow_negative_numbers = true)]
        out_nodata: f64,
        #[arg(long = "vector-epsg", value_parser = parse_arg::<Epsg>)]
        vector_epsg: Option<Epsg>,
        #[arg(long = "reproject")]
        reproject: bool,
    },
    #[command(name = "extract-chips", about = "Extract chips around the matching mask pixels")]
    ExtractChips {
        #[arg(long = "mask")]
        mask: PathBuf,
        #[arg(long = "mask-band", default_value = "1")]
        mask_band: usize,
        #[arg(long = "mask-value", default_value = "1", allow_negative_numbers = true)]
        mask_value: f64,
        #[arg(long = "image", required = true, value_parser = parse_image, help = "Image path with an optional band selection (image.tif:1,3)")]
        images: Vec<ImageArg>,
        #[arg(long = "reference", help = "Raster with the reference values, requires an even chip size")]
        reference: Option<PathBuf>,
        #[arg(long = "chip-size", default_value = "32")]
        chip_size: usize,
        #[arg(long = "rotation", allow_negative_numbers = true, help = "Rotation angle in degrees, can be repeated")]
        rotations: Vec<f64>,
        #[arg(long = "block-size", default_value = "200")]
        block_size: usize,
        #[arg(short = 'o', long = "output")]
        output: PathBuf,
        #[arg(long = "datatype", default_value = "float32", value_parser = parse_arg::<ArrayDataType>)]
        data_type: ArrayDataType,
    },
    #[command(name = "extract-pixels", about = "Extract the band values of the matching mask pixels")]
    ExtractPixels {
        #[arg(long = "mask")]
        mask: PathBuf,
        #[arg(long = "mask-band", default_value = "1")]
        mask_band: usize,
        #[arg(long = "mask-value", default_value = "1", allow_negative_numbers = true)]
        mask_value: f64,
        #[arg(long = "image", required = true, value_parser = parse_image)]
        images: Vec<ImageArg>,
        #[arg(long = "block-size", default_value = "200")]
        block_size: usize,
        #[arg(short = 'o', long = "output")]
        output: PathBuf,
        #[arg(long = "datatype", default_value = "float32", value_parser = parse_arg::<ArrayDataType>)]
        data_type: ArrayDataType,
    },
    #[command(name = "split", about = "Split a sample file in a random sample and the remaining samples")]
    Split {
        #[arg(short = 'i', long = "input")]
        input: PathBuf,
        #[arg(long = "sample-output")]
        sample_output: PathBuf,
        #[arg(long = "remain-output")]
        remain_output: PathBuf,
        #[arg(long = "sample-size")]
        sample_size: usize,
        #[arg(long = "seed", default_value = "0")]
        seed: u64,
        #[arg(long = "datatype", default_value = "float32", value_parser = parse_arg::<ArrayDataType>)]
        data_type: ArrayDataType,
    },
    #[command(name = "split-train-valid-test", about = "Split a sample file in train, validation and test samples")]
    SplitTrainValidTest {
        #[arg(short = 'i', long = "input")]
        input: PathBuf,
        #[arg(long = "train")]
        train_output: PathBuf,
        #[arg(long = "valid")]
        valid_output: PathBuf,
        #[arg(long = "test")]
        test_output: PathBuf,
        #[arg(long = "test-size")]
        test_size: usize,
        #[arg(long = "valid-size")]
        valid_size: usize,
        #[arg(long = "train-size", help = "Number of train samples, all remaining samples when omitted")]
        train_size: Option<usize>,
        #[arg(long = "seed", default_value = "0")]
        seed: u64,
        #[arg(long = "datatype", default_value = "float32", value_parser = parse_arg::<ArrayDataType>)]
        data_type: ArrayDataType,
    },
    #[command(name = "merge", about = "Concatenate sample files")]
    Merge {
        #[arg(short = 'i', long = "input", required = true)]
        inputs: Vec<PathBuf>,
        #[arg(short = 'o', long = "output")]
        output: PathBuf,
        #[arg(long = "datatype", default_value = "float32", value_parser = parse_arg::<ArrayDataType>)]
        data_type: ArrayDataType,
    },
    #[command(name = "count", about = "Print the number of samples in a sample file")]
    Count {
        #[arg(short = 'i', long = "input")]
        input: PathBuf,
    },
}

fn open_layer<'a>(ds: &'a gdal::Dataset, path: &Path, layer: Option<&str>) -> Result<Layer<'a>> {
    let result = match layer {
        Some(name) => ds.layer_by_name(name),
        None => ds.layer(0),
    };

    result.map_err(|err| anyhow::anyhow!("Failed to open layer {:?} of '{}' ({err})", layer, path.display()))
}

fn open_images(images: &[ImageArg]) -> Result<Vec<RasterDataset>> {
    images
        .iter()
        .map(|image| -> Result<RasterDataset> { Ok(RasterDataset::open_read_only(&image.path)?) })
        .collect()
}

fn image_bands<'a>(rasters: &'a [RasterDataset], images: &[ImageArg]) -> Vec<ImageBands<'a>> {
    rasters
        .iter()
        .zip(images)
        .map(|(raster, image)| ImageBands::new(raster, image.bands.clone()))
        .collect()
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(Env::default().default_filter_or(default_filter))
        .format_timestamp(Some(TimestampPrecision::Millis))
        .init();

    geo::RuntimeConfiguration::builder()
        .maybe_proj_db(cli.proj_db.as_deref())
        .gdal_debug_log(cli.verbose)
        .build()
        .apply()?;

    log::debug!("Capabilities: {:?}", capabilities());

    match cli.command {
        Commands::ZonalStats {
            vector,
            layer,
            raster,
            band,
            stats,
            min_threshold,
            max_threshold,
            out_nodata,
            vector_epsg,
            reproject,
        } => {
            let ds = dataset::open_for_update(&vector)?;
            let mut layer = open_layer(&ds, &vector, layer.as_deref())?;
            let raster = RasterDataset::open_read_only(&raster)?;
            let options = ZonalStatsOptions {
                min_threshold,
                max_threshold,
                out_nodata,
                vector_epsg,
                reproject,
            };

            let summary = zonal_band_stats(&mut layer, &raster, band, &stats, &options)?;
            println!(
                "{} features, {} centroid fallbacks, {} without data",
                summary.features, summary.centroid_fallbacks, summary.without_data
            );
        }
        Commands::PointValues {
            vector,
            layer,
            raster,
            band,
            field,
            min_threshold,
            max_threshold,
            out_nodata,
            vector_epsg,
            reproject,
        } => {
            let ds = dataset::open_for_update(&vector)?;
            let mut layer = open_layer(&ds, &vector, layer.as_deref())?;
            let raster = RasterDataset::open_read_only(&raster)?;
            let options = PointValueOptions {
                min_threshold,
                max_threshold,
                out_nodata,
                vector_epsg,
                reproject,
            };

            let sampled = point_band_values(&mut layer, &raster, band, &field, &options)?;
            println!("{sampled} points sampled");
        }
        Commands::ExtractChips {
            mask,
            mask_band,
            mask_value,
            images,
            reference,
            chip_size,
            rotations,
            block_size,
            output,
            data_type,
        } => {
            let mask = RasterDataset::open_read_only(&mask)?;
            let rasters = open_images(&images)?;
            let reference = reference.as_deref().map(RasterDataset::open_read_only).transpose()?;
            let options = ChipExtractionOptions {
                chip_size,
                mask_value,
                mask_band,
                rotations,
                block_size,
            };

            let count = extract_chip_samples_to_file(
                &mask,
                &image_bands(&rasters, &images),
                reference.as_ref(),
                &options,
                &output,
                data_type,
            )?;
            println!("{count} chips written to '{}'", output.display());
        }
        Commands::ExtractPixels {
            mask,
            mask_band,
            mask_value,
            images,
            block_size,
            output,
            data_type,
        } => {
            let mask = RasterDataset::open_read_only(&mask)?;
            let rasters = open_images(&images)?;
            let options = PixelExtractionOptions {
                mask_value,
                mask_band,
                block_size,
            };

            let count = extract_pixel_samples_to_file(&mask, &image_bands(&rasters, &images), &options, &output, data_type)?;
            println!("{count} pixel samples written to '{}'", output.display());
        }
        Commands::Split {
            input,
            sample_output,
            remain_output,
            sample_size,
            seed,
            data_type,
        } => {
            let (sampled, remaining) = split_sample(&input, &sample_output, &remain_output, sample_size, seed, data_type)?;
            println!("{sampled} sampled, {remaining} remaining");
        }
        Commands::SplitTrainValidTest {
            input,
            train_output,
            valid_output,
            test_output,
            test_size,
            valid_size,
            train_size,
            seed,
            data_type,
        } => {
            let sizes = SplitSizes {
                test: test_size,
                validation: valid_size,
                train: train_size,
            };
            let assignment = split_sample_train_valid_test(&input, &train_output, &valid_output, &test_output, &sizes, seed, data_type)?;
            println!(
                "{} train, {} validation, {} test samples",
                assignment.train.len(),
                assignment.validation.len(),
                assignment.test.len()
            );
        }
        Commands::Merge { inputs, output, data_type } => {
            let inputs: Vec<&Path> = inputs.iter().map(PathBuf::as_path).collect();
            let merged = store::merge(&inputs, &output, data_type)?;
            println!("{} samples written to '{}'", merged.len(), output.display());
        }
        Commands::Count { input } => {
            println!("{}", store::read_count(&input)?);
        }
    }

    Ok(())
}
