use std::path::Path;

use hdf5::types::{FixedAscii, FloatSize, IntSize, TypeDescriptor};
use hdf5::{File, Group, H5Type};
use ndarray::{ArrayD, IxDyn};
use num::{NumCast, ToPrimitive};

use geo::ArrayDataType;

use crate::{Description, Error, Result, SampleContainer, SampleLayout};

const DATA_GROUP: &str = "DATA";
const DATA_DATASET: &str = "DATA";
const REFERENCE_DATASET: &str = "REF";
const METADATA_GROUP: &str = "META-DATA";
const DESCRIPTION_DATASET: &str = "DESCRIPTION";

const CHIP_CHUNK_SAMPLES: usize = 250;
const TABULAR_CHUNK_SAMPLES: usize = 1000;
const DEFLATE_LEVEL: u8 = 4;

type DescriptionString = FixedAscii<64>;

fn chunk_samples(layout: SampleLayout, sample_count: usize) -> usize {
    match layout {
        SampleLayout::Chips => sample_count.min(CHIP_CHUNK_SAMPLES),
        SampleLayout::Tabular => sample_count.min(TABULAR_CHUNK_SAMPLES),
    }
}

fn cast_array<T: NumCast>(data: &ArrayD<f64>, data_type: ArrayDataType) -> Result<ArrayD<T>> {
    let values = data
        .iter()
        .map(|&v| {
            <T as NumCast>::from(v)
                .ok_or_else(|| Error::Configuration(format!("Sample value {v} can not be stored as {data_type}")))
        })
        .collect::<Result<Vec<T>>>()?;

    ArrayD::from_shape_vec(IxDyn(data.shape()), values).map_err(|err| Error::Runtime(err.to_string()))
}

fn create_dataset<T: H5Type + NumCast + Copy>(
    group: &Group,
    name: &str,
    data: &ArrayD<f64>,
    data_type: ArrayDataType,
    chunk_samples: usize,
) -> Result<()> {
    let values = cast_array::<T>(data, data_type)?;
    if chunk_samples == 0 {
        // chunks can not be empty, store the empty dataset contiguous
        group.new_dataset::<T>().shape(data.shape().to_vec()).create(name)?;
        return Ok(());
    }

    let mut chunk = data.shape().to_vec();
    chunk[0] = chunk_samples;
    group
        .new_dataset_builder()
        .chunk(chunk)
        .shuffle()
        .deflate(DEFLATE_LEVEL)
        .with_data(&values)
        .create(name)?;

    Ok(())
}

fn write_array(group: &Group, name: &str, data: &ArrayD<f64>, data_type: ArrayDataType, chunk_samples: usize) -> Result<()> {
    match data_type {
        ArrayDataType::Int8 => create_dataset::<i8>(group, name, data, data_type, chunk_samples),
        ArrayDataType::Uint8 => create_dataset::<u8>(group, name, data, data_type, chunk_samples),
        ArrayDataType::Int16 => create_dataset::<i16>(group, name, data, data_type, chunk_samples),
        ArrayDataType::Uint16 => create_dataset::<u16>(group, name, data, data_type, chunk_samples),
        ArrayDataType::Int32 => create_dataset::<i32>(group, name, data, data_type, chunk_samples),
        ArrayDataType::Uint32 => create_dataset::<u32>(group, name, data, data_type, chunk_samples),
        ArrayDataType::Int64 => create_dataset::<i64>(group, name, data, data_type, chunk_samples),
        ArrayDataType::Uint64 => create_dataset::<u64>(group, name, data, data_type, chunk_samples),
        ArrayDataType::Float32 => create_dataset::<f32>(group, name, data, data_type, chunk_samples),
        ArrayDataType::Float64 => create_dataset::<f64>(group, name, data, data_type, chunk_samples),
    }
}

fn read_as_f64<T: H5Type + ToPrimitive + Copy>(dataset: &hdf5::Dataset) -> Result<ArrayD<f64>> {
    Ok(dataset.read_dyn::<T>()?.mapv(|v| v.to_f64().unwrap_or(f64::NAN)))
}

fn stored_data_type(dataset: &hdf5::Dataset) -> Result<ArrayDataType> {
    Ok(match dataset.dtype()?.to_descriptor()? {
        TypeDescriptor::Integer(IntSize::U1) => ArrayDataType::Int8,
        TypeDescriptor::Integer(IntSize::U2) => ArrayDataType::Int16,
        TypeDescriptor::Integer(IntSize::U4) => ArrayDataType::Int32,
        TypeDescriptor::Integer(IntSize::U8) => ArrayDataType::Int64,
        TypeDescriptor::Unsigned(IntSize::U1) => ArrayDataType::Uint8,
        TypeDescriptor::Unsigned(IntSize::U2) => ArrayDataType::Uint16,
        TypeDescriptor::Unsigned(IntSize::U4) => ArrayDataType::Uint32,
        TypeDescriptor::Unsigned(IntSize::U8) => ArrayDataType::Uint64,
        TypeDescriptor::Float(FloatSize::U4) => ArrayDataType::Float32,
        TypeDescriptor::Float(FloatSize::U8) => ArrayDataType::Float64,
        other => {
            return Err(Error::Runtime(format!(
                "Unsupported sample data type in '{}': {other:?}",
                dataset.name()
            )));
        }
    })
}

fn read_array(dataset: &hdf5::Dataset) -> Result<(ArrayD<f64>, ArrayDataType)> {
    let data_type = stored_data_type(dataset)?;
    let data = match data_type {
        ArrayDataType::Int8 => read_as_f64::<i8>(dataset)?,
        ArrayDataType::Uint8 => read_as_f64::<u8>(dataset)?,
        ArrayDataType::Int16 => read_as_f64::<i16>(dataset)?,
        ArrayDataType::Uint16 => read_as_f64::<u16>(dataset)?,
        ArrayDataType::Int32 => read_as_f64::<i32>(dataset)?,
        ArrayDataType::Uint32 => read_as_f64::<u32>(dataset)?,
        ArrayDataType::Int64 => read_as_f64::<i64>(dataset)?,
        ArrayDataType::Uint64 => read_as_f64::<u64>(dataset)?,
        ArrayDataType::Float32 => read_as_f64::<f32>(dataset)?,
        ArrayDataType::Float64 => read_as_f64::<f64>(dataset)?,
    };

    Ok((data, data_type))
}

fn open(path: &Path) -> Result<File> {
    if !path.is_file() {
        return Err(Error::InvalidPath(path.to_path_buf()));
    }

    Ok(File::open(path)?)
}

pub fn write(container: &SampleContainer, path: &Path, data_type: ArrayDataType) -> Result<()> {
    let description = DescriptionString::from_ascii(container.description().as_str().as_bytes()).map_err(|err| {
        Error::Configuration(format!(
            "Invalid sample description '{}' ({err})",
            container.description()
        ))
    })?;

    let file = File::create(path)?;
    let chunk = chunk_samples(container.layout(), container.len());

    let data_group = file.create_group(DATA_GROUP)?;
    write_array(&data_group, DATA_DATASET, container.data(), data_type, chunk)?;
    if let Some(reference) = container.reference() {
        write_array(&data_group, REFERENCE_DATASET, reference, data_type, chunk)?;
    }

    let meta_group = file.create_group(METADATA_GROUP)?;
    meta_group
        .new_dataset_builder()
        .with_data(&ndarray::arr0(description))
        .create(DESCRIPTION_DATASET)?;

    file.close()?;
    Ok(())
}

pub fn read(path: &Path) -> Result<SampleContainer> {
    let file = open(path)?;
    let data_group = file.group(DATA_GROUP)?;
    let (data, data_type) = read_array(&data_group.dataset(DATA_DATASET)?)?;

    let reference = if data_group.link_exists(REFERENCE_DATASET) {
        Some(read_array(&data_group.dataset(REFERENCE_DATASET)?)?.0)
    } else {
        None
    };

    let description = match file.group(METADATA_GROUP) {
        Ok(meta) if meta.link_exists(DESCRIPTION_DATASET) => {
            let desc = meta.dataset(DESCRIPTION_DATASET)?.read_scalar::<DescriptionString>()?;
            Description::from(desc.as_str())
        }
        _ => {
            log::debug!("No sample description in '{}'", path.display());
            Description::Other(String::new())
        }
    };

    SampleContainer::from_parts(data, reference, description, data_type)
}

pub fn read_count(path: &Path) -> Result<usize> {
    let file = open(path)?;
    let shape = file.group(DATA_GROUP)?.dataset(DATA_DATASET)?.shape();
    shape
        .first()
        .copied()
        .ok_or_else(|| Error::Runtime(format!("Sample dataset in '{}' is a scalar", path.display())))
}
