use crate::{Error, Result};

/// Quantiles of sorted data using linear interpolation between the closest ranks
pub(crate) fn sorted_quantiles(data: &[f64], quantile_vals: &[f64]) -> Option<Vec<f64>> {
    if data.is_empty() {
        return None;
    }

    let len = data.len() as f64;
    let results = quantile_vals
        .iter()
        .map(|&q| {
            let pos = q * (len - 1.0);
            let lower = pos.floor() as usize;
            let upper = pos.ceil() as usize;

            if lower == upper {
                data[lower]
            } else {
                let weight = pos - lower as f64;
                data[lower] * (1.0 - weight) + data[upper] * weight
            }
        })
        .collect();

    Some(results)
}

pub(crate) fn check_quantile_values(quantile_vals: &[f64]) -> Result<()> {
    if quantile_vals.iter().any(|&q| !(0.0..=1.0).contains(&q)) {
        return Err(Error::InvalidArgument("Quantile values must be between 0 and 1".to_string()));
    }

    Ok(())
}
