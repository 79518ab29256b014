//! Zonal statistics of a raster band per vector feature.
//!
//! Every feature yields a value for each requested statistic: the statistics of the valid
//! pixels inside of the polygon, the value of the pixel below the centroid when no such
//! pixels exist, or the output nodata value when the centroid pixel is not valid either.

use std::str::FromStr;

use gdal::vector::LayerAccess;

use geo::crs::Epsg;
use geo::raster::RasterDataset;
use geo::raster::algo::{ValueStatistics, statistics};
use geo::srs::{CoordinateTransformer, SpatialReference, SrsSource, vector_to_raster_transformer};
use geo::vector::{FieldWriter, LayerAccessExtension, VectorFeature, algo};
use geo::{GeoReference, PixelWindow, window};

use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ZonalStatistic {
    Min,
    Max,
    Mean,
    /// Population standard deviation
    StdDev,
    Sum,
    Count,
    /// Most frequent value, ties resolve to the smallest value
    Mode,
    Median,
    /// Percentile in the range [0, 100]
    Percentile(f64),
}

impl ZonalStatistic {
    /// Field name used when no explicit name is configured
    pub fn default_field_name(&self) -> String {
        match self {
            ZonalStatistic::Min => "min".to_string(),
            ZonalStatistic::Max => "max".to_string(),
            ZonalStatistic::Mean => "mean".to_string(),
            ZonalStatistic::StdDev => "stddev".to_string(),
            ZonalStatistic::Sum => "sum".to_string(),
            ZonalStatistic::Count => "count".to_string(),
            ZonalStatistic::Mode => "mode".to_string(),
            ZonalStatistic::Median => "median".to_string(),
            ZonalStatistic::Percentile(p) => format!("p{p}"),
        }
    }

    fn value(&self, stats: &ValueStatistics, percentile_index: &mut usize) -> f64 {
        match self {
            ZonalStatistic::Min => stats.min,
            ZonalStatistic::Max => stats.max,
            ZonalStatistic::Mean => stats.mean,
            ZonalStatistic::StdDev => stats.stddev,
            ZonalStatistic::Sum => stats.sum,
            ZonalStatistic::Count => stats.count as f64,
            ZonalStatistic::Mode => stats.mode,
            ZonalStatistic::Median => stats.median,
            ZonalStatistic::Percentile(_) => {
                let value = stats.quantiles[*percentile_index];
                *percentile_index += 1;
                value
            }
        }
    }
}

impl FromStr for ZonalStatistic {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let lower = s.trim().to_ascii_lowercase();
        Ok(match lower.as_str() {
            "min" | "minimum" => ZonalStatistic::Min,
            "max" | "maximum" => ZonalStatistic::Max,
            "mean" | "average" => ZonalStatistic::Mean,
            "std" | "stddev" => ZonalStatistic::StdDev,
            "sum" => ZonalStatistic::Sum,
            "count" => ZonalStatistic::Count,
            "mode" => ZonalStatistic::Mode,
            "median" => ZonalStatistic::Median,
            _ => {
                let percentile = lower
                    .strip_prefix("percentile_")
                    .or_else(|| lower.strip_prefix('p'))
                    .ok_or_else(|| Error::InvalidArgument(format!("Unknown zonal statistic: '{s}'")))?
                    .parse::<f64>()?;
                if !(0.0..=100.0).contains(&percentile) {
                    return Err(Error::InvalidArgument(format!(
                        "Percentile must be in the range [0, 100]: '{s}'"
                    )));
                }
                ZonalStatistic::Percentile(percentile)
            }
        })
    }
}

/// A statistic and the name of the field it is written to
#[derive(Debug, Clone, PartialEq)]
pub struct StatField {
    pub statistic: ZonalStatistic,
    pub field_name: String,
}

impl StatField {
    pub fn new(statistic: ZonalStatistic) -> Self {
        StatField {
            statistic,
            field_name: statistic.default_field_name(),
        }
    }

    pub fn with_name(statistic: ZonalStatistic, field_name: impl Into<String>) -> Self {
        StatField {
            statistic,
            field_name: field_name.into(),
        }
    }
}

/// Parses `stat` or `stat=field_name`
impl FromStr for StatField {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.split_once('=') {
            Some((stat, field)) => Ok(StatField::with_name(stat.parse()?, field.trim())),
            None => Ok(StatField::new(s.parse()?)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ZonalStatsOptions {
    /// Pixels below this value are ignored (inclusive bound)
    pub min_threshold: Option<f64>,
    /// Pixels above this value are ignored (inclusive bound)
    pub max_threshold: Option<f64>,
    /// Value written when a feature has no valid pixel
    pub out_nodata: f64,
    /// Spatial reference of the vector geometries, overrides the layer spatial reference
    pub vector_epsg: Option<Epsg>,
    /// Reproject the geometries to the raster spatial reference if it differs
    pub reproject: bool,
}

impl Default for ZonalStatsOptions {
    fn default() -> Self {
        ZonalStatsOptions {
            min_threshold: None,
            max_threshold: None,
            out_nodata: 0.0,
            vector_epsg: None,
            reproject: false,
        }
    }
}

impl ZonalStatsOptions {
    pub(crate) fn in_range(&self, value: f64) -> bool {
        within_thresholds(value, self.min_threshold, self.max_threshold)
    }
}

/// Both bounds are inclusive, a missing bound does not limit the value
pub(crate) fn within_thresholds(value: f64, min: Option<f64>, max: Option<f64>) -> bool {
    min.is_none_or(|min| value >= min) && max.is_none_or(|max| value <= max)
}

/// Number of features per outcome of a zonal statistics run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ZonalStatsSummary {
    pub features: usize,
    /// Features that used the value of their centroid pixel
    pub centroid_fallbacks: usize,
    /// Features without any valid value
    pub without_data: usize,
}

/// Resolves the effective spatial reference of the layer and the transformer towards the raster grid
pub(crate) fn layer_transformer<L: LayerAccess>(
    layer: &L,
    raster: &RasterDataset,
    vector_epsg: Option<Epsg>,
    reproject: bool,
) -> Result<Option<CoordinateTransformer>> {
    let vector_srs = match vector_epsg {
        Some(epsg) => Some(SpatialReference::from_epsg(epsg)?),
        None => layer.spatial_ref().map(SpatialReference::from_gdal),
    };

    let layer_name = layer.name();
    vector_to_raster_transformer(
        SrsSource {
            name: &layer_name,
            srs: vector_srs,
        },
        SrsSource {
            name: raster.name(),
            srs: raster.spatial_reference()?,
        },
        reproject,
    )
}

/// Per call configuration shared by every feature
struct ZonalContext<'a> {
    raster: &'a RasterDataset,
    band: usize,
    grid: GeoReference,
    options: &'a ZonalStatsOptions,
    quantiles: Vec<f64>,
}

enum FeatureOutcome {
    Statistics(ValueStatistics),
    Centroid(f64),
    NoData,
}

impl ZonalContext<'_> {
    fn is_valid(&self, value: f64) -> bool {
        value.is_finite() && !self.grid.is_nodata(value) && self.options.in_range(value)
    }

    fn feature_outcome(&self, feature: &VectorFeature) -> Result<FeatureOutcome> {
        let Some(geometry) = &feature.geometry else {
            log::debug!("Feature {} has no geometry", feature.fid);
            return Ok(FeatureOutcome::NoData);
        };

        let pixel_window = window::compute_window(&algo::bounding_box(geometry), &self.grid);
        if pixel_window.has_pixels() {
            let values = self.raster.read_window(self.band, &pixel_window)?;
            let inside = algo::rasterize_feature_mask(geometry, &pixel_window, &self.grid)?;
            let valid: Vec<f64> = values
                .into_iter()
                .zip(inside)
                .filter(|&(value, inside)| inside && self.is_valid(value))
                .map(|(value, _)| value)
                .collect();

            if let Some(stats) = statistics(&valid, &self.quantiles)? {
                return Ok(FeatureOutcome::Statistics(stats));
            }
        }

        self.centroid_outcome(feature.fid, geometry, &pixel_window)
    }

    fn centroid_outcome(&self, fid: u64, geometry: &gdal::vector::Geometry, pixel_window: &PixelWindow) -> Result<FeatureOutcome> {
        let centroid = match algo::centroid(geometry) {
            Ok(centroid) => centroid,
            Err(err) => {
                log::debug!("Feature {fid}: no centroid available ({err})");
                return Ok(FeatureOutcome::NoData);
            }
        };

        if !centroid.x().is_finite() || !centroid.y().is_finite() {
            log::debug!("Feature {fid}: centroid has no finite coordinates");
            return Ok(FeatureOutcome::NoData);
        }

        let mut cell = self.grid.point_to_cell(centroid);
        if pixel_window.has_pixels() {
            cell = pixel_window.clamp_cell(cell);
        }

        match self.raster.read_pixel(self.band, cell)? {
            Some(value) if self.is_valid(value) => {
                log::debug!("Feature {fid}: no valid pixels inside, using the centroid pixel {cell:?}");
                Ok(FeatureOutcome::Centroid(value))
            }
            Some(_) => {
                log::debug!("Feature {fid}: centroid pixel {cell:?} is not valid");
                Ok(FeatureOutcome::NoData)
            }
            None => {
                log::debug!("Feature {fid}: centroid pixel {cell:?} lies outside of the raster");
                Ok(FeatureOutcome::NoData)
            }
        }
    }
}

fn field_values(stat_fields: &[StatField], field_indexes: &[usize], outcome: &FeatureOutcome, context: &ZonalContext) -> Vec<(usize, f64)> {
    let stats = match outcome {
        FeatureOutcome::Statistics(stats) => Some(stats.clone()),
        FeatureOutcome::Centroid(value) => Some(ValueStatistics::single_value(*value, context.quantiles.len())),
        FeatureOutcome::NoData => None,
    };

    let mut percentile_index = 0;
    stat_fields
        .iter()
        .zip(field_indexes)
        .map(|(field, &index)| {
            let value = match &stats {
                Some(stats) => field.statistic.value(stats, &mut percentile_index),
                None if field.statistic == ZonalStatistic::Count => 0.0,
                None => context.options.out_nodata,
            };
            (index, value)
        })
        .collect()
}

/// Computes the statistics of the raster band (1-based) for every feature of the layer
/// and stores them in the configured fields, missing fields are created.
pub fn zonal_band_stats<L: LayerAccess>(
    layer: &mut L,
    raster: &RasterDataset,
    band: usize,
    stat_fields: &[StatField],
    options: &ZonalStatsOptions,
) -> Result<ZonalStatsSummary> {
    if stat_fields.is_empty() {
        return Err(Error::Configuration(format!(
            "No statistics requested for layer '{}'",
            layer.name()
        )));
    }

    let grid = raster.georeference(band)?;
    let transformer = layer_transformer(layer, raster, options.vector_epsg, options.reproject)?;

    let field_names: Vec<&str> = stat_fields.iter().map(|field| field.field_name.as_str()).collect();
    let field_indexes = layer.ensure_real_fields(&field_names)?;

    let mut features = layer.read_features()?;
    if let Some(transformer) = &transformer {
        for geometry in features.iter_mut().filter_map(|feature| feature.geometry.as_mut()) {
            transformer.transform_geometry_in_place(geometry)?;
        }
    }

    let context = ZonalContext {
        raster,
        band,
        grid,
        options,
        quantiles: stat_fields
            .iter()
            .filter_map(|field| match field.statistic {
                ZonalStatistic::Percentile(p) => Some(p / 100.0),
                _ => None,
            })
            .collect(),
    };

    let layer_name = layer.name();
    let mut summary = ZonalStatsSummary::default();
    let mut updates = Vec::with_capacity(features.len());
    for feature in &features {
        let outcome = context.feature_outcome(feature)?;
        match outcome {
            FeatureOutcome::Statistics(_) => {}
            FeatureOutcome::Centroid(_) => summary.centroid_fallbacks += 1,
            FeatureOutcome::NoData => summary.without_data += 1,
        }

        summary.features += 1;
        updates.push((feature.fid, field_values(stat_fields, &field_indexes, &outcome, &context)));
    }

    let mut writer = FieldWriter::new(layer);
    for (fid, values) in &updates {
        writer.write(*fid, values)?;
    }
    writer.finish()?;

    log::info!(
        "Zonal statistics of '{}' band {} for {} features of '{}' ({} centroid fallbacks, {} without data)",
        raster.name(),
        band,
        summary.features,
        layer_name,
        summary.centroid_fallbacks,
        summary.without_data
    );
    Ok(summary)
}
