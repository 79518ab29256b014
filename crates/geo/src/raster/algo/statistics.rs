use std::cmp::Ordering;

use crate::Result;

use super::quantile;

#[derive(Debug, Clone, PartialEq)]
pub struct ValueStatistics {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    /// Population standard deviation
    pub stddev: f64,
    pub sum: f64,
    pub count: usize,
    /// Most frequent value, the smallest one when several values are equally frequent
    pub mode: f64,
    pub median: f64,
    /// The requested quantiles in the order they were requested
    pub quantiles: Vec<f64>,
}

impl ValueStatistics {
    /// Statistics of a single value
    pub fn single_value(value: f64, quantile_count: usize) -> Self {
        ValueStatistics {
            min: value,
            max: value,
            mean: value,
            stddev: 0.0,
            sum: value,
            count: 1,
            mode: value,
            median: value,
            quantiles: vec![value; quantile_count],
        }
    }
}

/// Calculates the statistics of the values in one sort.
/// Returns `None` if there are no values.
pub fn statistics(values: &[f64], quantile_vals: &[f64]) -> Result<Option<ValueStatistics>> {
    quantile::check_quantile_values(quantile_vals)?;

    if values.is_empty() {
        return Ok(None);
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));

    let sum: f64 = sorted.iter().sum();
    let count = sorted.len();
    let mean = sum / count as f64;

    let median = if count % 2 == 0 {
        (sorted[count / 2 - 1] + sorted[count / 2]) / 2.0
    } else {
        sorted[count / 2]
    };

    Ok(Some(ValueStatistics {
        min: sorted[0],
        max: sorted[count - 1],
        mean,
        stddev: std_deviation(&sorted, mean),
        sum,
        count,
        mode: sorted_mode(&sorted),
        median,
        quantiles: quantile::sorted_quantiles(&sorted, quantile_vals).unwrap_or_default(),
    }))
}

fn std_deviation(data: &[f64], data_mean: f64) -> f64 {
    let variance = data
        .iter()
        .map(|value| {
            let diff = data_mean - value;
            diff * diff
        })
        .sum::<f64>()
        / data.len() as f64;

    variance.sqrt()
}

/// The longest run of equal values in sorted data, the first run wins ties
fn sorted_mode(sorted: &[f64]) -> f64 {
    let mut mode = sorted[0];
    let mut mode_count = 0;

    let mut run_value = sorted[0];
    let mut run_count = 0;
    for &value in sorted {
        if value == run_value {
            run_count += 1;
        } else {
            run_value = value;
            run_count = 1;
        }

        if run_count > mode_count {
            mode = run_value;
            mode_count = run_count;
        }
    }

    mode
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn statistics_of_empty_data() -> Result<()> {
        assert!(statistics(&[], &[0.5])?.is_none());
        Ok(())
    }

    #[test]
    fn statistics_even_count() -> Result<()> {
        // Sorted vals: 1.0, 1.0, 2.0, 3.0, 4.0, 7.0
        let stats = statistics(&[3.0, 1.0, 4.0, 7.0, 1.0, 2.0], &[0.0, 0.25, 0.5, 0.75, 1.0])?.expect("Statistics should have a value");
        assert_eq!(stats.min, 1.0);
        assert_eq!(stats.max, 7.0);
        assert_eq!(stats.mean, 18.0 / 6.0);
        assert_eq!(stats.median, 2.5);
        assert_eq!(stats.sum, 18.0);
        assert_eq!(stats.count, 6);
        assert_eq!(stats.mode, 1.0);
        assert_relative_eq!(stats.stddev, 2.0816659994661, epsilon = 1e-8);
        assert_eq!(stats.quantiles, vec![1.0, 1.25, 2.5, 3.75, 7.0]);
        Ok(())
    }

    #[test]
    fn statistics_odd_count() -> Result<()> {
        // Sorted vals: 1.0, 2.0, 3.0, 4.0, 7.0
        let stats = statistics(&[3.0, 2.0, 4.0, 7.0, 1.0], &[])?.expect("Statistics should have a value");
        assert_eq!(stats.min, 1.0);
        assert_eq!(stats.max, 7.0);
        assert_eq!(stats.mean, 17.0 / 5.0);
        assert_eq!(stats.median, 3.0);
        assert_eq!(stats.count, 5);
        assert_relative_eq!(stats.stddev, 2.0591260281974, epsilon = 1e-8);
        assert!(stats.quantiles.is_empty());
        Ok(())
    }

    #[test]
    fn mode_ties_pick_smallest_value() -> Result<()> {
        let stats = statistics(&[5.0, 2.0, 5.0, 2.0, 9.0], &[])?.expect("Statistics should have a value");
        assert_eq!(stats.mode, 2.0);

        let stats = statistics(&[5.0, 2.0, 5.0, 9.0, 5.0, 2.0], &[])?.expect("Statistics should have a value");
        assert_eq!(stats.mode, 5.0);
        Ok(())
    }

    #[test]
    fn single_value_statistics() {
        let stats = ValueStatistics::single_value(4.0, 2);
        assert_eq!(stats.min, 4.0);
        assert_eq!(stats.stddev, 0.0);
        assert_eq!(stats.count, 1);
        assert_eq!(stats.quantiles, vec![4.0, 4.0]);
    }
}
