//! Reproducible partitioning of sample containers into disjoint subsets.
//!
//! Every partition step draws from a generator seeded with the same seed value, so a split is
//! fully determined by the seed and the number of samples in the input.

use std::collections::BTreeSet;
use std::path::Path;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use geo::ArrayDataType;

use crate::{Error, Result, SampleContainer, store};

/// Sample indexes of a three-way split, every list is sorted ascending
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitAssignment {
    pub test: Vec<usize>,
    pub validation: Vec<usize>,
    pub train: Vec<usize>,
}

/// Requested subset sizes, without a train size all samples not used for testing or validation are used for training
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SplitSizes {
    pub test: usize,
    pub validation: usize,
    pub train: Option<usize>,
}

fn max_draw_rounds(n_rows: usize) -> usize {
    20 * n_rows + 1000
}

fn insufficient(requested: usize, available: usize, context: &str) -> Error {
    Error::InsufficientSamples {
        requested,
        available,
        context: context.to_string(),
    }
}

/// Draws `sample_size` unique indexes from `0..n_rows`.
/// Returns the sorted sample indexes and the sorted remaining indexes.
pub fn partition(n_rows: usize, sample_size: usize, seed: u64) -> Result<(Vec<usize>, Vec<usize>)> {
    if sample_size > n_rows {
        return Err(insufficient(sample_size, n_rows, "partition"));
    }

    if sample_size == n_rows {
        return Ok(((0..n_rows).collect(), Vec::new()));
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut sample = BTreeSet::new();
    let mut rounds = 0;
    while sample.len() < sample_size {
        rounds += 1;
        if rounds > max_draw_rounds(n_rows) {
            return Err(insufficient(
                sample_size,
                sample.len(),
                &format!("partition of {n_rows} rows gave up after {} draw rounds", rounds - 1),
            ));
        }

        let needed = sample_size - sample.len();
        for _ in 0..needed {
            sample.insert(rng.gen_range(0..n_rows));
        }
    }

    let remain = (0..n_rows).filter(|index| !sample.contains(index)).collect();
    Ok((sample.into_iter().collect(), remain))
}

/// Partitions the rows referenced by `rows` and maps the result back to row indexes
fn partition_rows(rows: &[usize], sample_size: usize, seed: u64) -> Result<(Vec<usize>, Vec<usize>)> {
    let (sample, remain) = partition(rows.len(), sample_size, seed)?;
    Ok((
        sample.into_iter().map(|pos| rows[pos]).collect(),
        remain.into_iter().map(|pos| rows[pos]).collect(),
    ))
}

/// Three-way split: the test samples are drawn from all rows, the validation samples from the remaining rows.
/// The train samples are the rows left after that, or a further partition of them when a train size is requested.
pub fn split_assignment(n_rows: usize, sizes: &SplitSizes, seed: u64) -> Result<SplitAssignment> {
    let requested = sizes.test + sizes.validation + sizes.train.unwrap_or(0);
    if requested > n_rows {
        return Err(insufficient(
            requested,
            n_rows,
            &format!(
                "split into {} test, {} validation and {} train samples",
                sizes.test,
                sizes.validation,
                sizes.train.map_or_else(|| "the remaining".to_string(), |n| n.to_string())
            ),
        ));
    }

    let (test, remain) = partition(n_rows, sizes.test, seed)?;
    let (validation, remain) = partition_rows(&remain, sizes.validation, seed)?;
    let train = match sizes.train {
        Some(train_size) => partition_rows(&remain, train_size, seed)?.0,
        None => remain,
    };

    Ok(SplitAssignment { test, validation, train })
}

fn write_outputs(outputs: &[(&SampleContainer, &Path)], data_type: ArrayDataType) -> Result<()> {
    for (index, (container, path)) in outputs.iter().enumerate() {
        if let Err(err) = store::write(container, path, data_type) {
            for (_, written) in &outputs[..index] {
                if let Err(cleanup_err) = inf::fs::remove_file_if_exists(written) {
                    log::warn!("Failed to remove '{}' ({cleanup_err})", written.display());
                }
            }

            return Err(err);
        }
    }

    Ok(())
}

/// Splits the samples of `input` in a random sample of `sample_size` samples and the remaining samples
pub fn split_sample(
    input: &Path,
    sample_output: &Path,
    remain_output: &Path,
    sample_size: usize,
    seed: u64,
    data_type: ArrayDataType,
) -> Result<(usize, usize)> {
    let container = store::read(input)?;
    let (sample, remain) = partition(container.len(), sample_size, seed).map_err(|err| match err {
        Error::InsufficientSamples { requested, available, .. } => {
            insufficient(requested, available, &format!("sample of '{}'", input.display()))
        }
        err => err,
    })?;

    let sample_container = container.select(&sample)?;
    let remain_container = container.select(&remain)?;
    write_outputs(
        &[(&sample_container, sample_output), (&remain_container, remain_output)],
        data_type,
    )?;

    log::info!(
        "Split '{}' in {} sampled and {} remaining samples",
        input.display(),
        sample.len(),
        remain.len()
    );
    Ok((sample.len(), remain.len()))
}

/// Splits the samples of `input` in disjoint train, validation and test containers.
/// The sizes are validated before any output is written, no outputs remain on disk when writing fails.
pub fn split_sample_train_valid_test(
    input: &Path,
    train_output: &Path,
    validation_output: &Path,
    test_output: &Path,
    sizes: &SplitSizes,
    seed: u64,
    data_type: ArrayDataType,
) -> Result<SplitAssignment> {
    let container = store::read(input)?;
    let assignment = split_assignment(container.len(), sizes, seed).map_err(|err| match err {
        Error::InsufficientSamples {
            requested,
            available,
            context,
        } => insufficient(requested, available, &format!("{context} of '{}'", input.display())),
        err => err,
    })?;

    let train = container.select(&assignment.train)?;
    let validation = container.select(&assignment.validation)?;
    let test = container.select(&assignment.test)?;
    write_outputs(
        &[(&train, train_output), (&validation, validation_output), (&test, test_output)],
        data_type,
    )?;

    log::info!(
        "Split '{}' in {} train, {} validation and {} test samples",
        input.display(),
        train.len(),
        validation.len(),
        test.len()
    );
    Ok(assignment)
}
