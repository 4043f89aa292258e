//! Dispersion helpers shared by the per-poll and whole-run headway figures.

/// Computes the arithmetic mean of a slice of values. Returns 0.0 for empty input.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Computes the population standard deviation given a pre-computed mean.
/// Returns 0.0 for fewer than two values.
pub fn stddev(values: &[f64], mean: f64) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;

    variance.sqrt()
}

/// Mean and population standard deviation of integer samples.
pub fn mean_and_stddev(samples: &[i64]) -> (f64, f64) {
    let values: Vec<f64> = samples.iter().map(|&v| v as f64).collect();
    let avg = mean(&values);
    (avg, stddev(&values, avg))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_empty_is_zero() {
        assert_eq!(mean(&[]), 0.0);
    }

    #[test]
    fn test_population_stddev_closed_form() {
        // sqrt(((1-2)^2 + 0 + (3-2)^2) / 3) = sqrt(2/3)
        let values = [1.0, 2.0, 3.0];
        let sd = stddev(&values, mean(&values));
        assert!((sd - (2.0f64 / 3.0).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_repeated_value_has_zero_stddev() {
        let values = [4.0, 4.0, 4.0, 4.0];
        assert_eq!(stddev(&values, mean(&values)), 0.0);
    }

    #[test]
    fn test_single_value_has_zero_stddev() {
        assert_eq!(stddev(&[7.0], 7.0), 0.0);
        assert_eq!(stddev(&[], 0.0), 0.0);
    }

    #[test]
    fn test_mean_and_stddev_of_integers() {
        let (avg, sd) = mean_and_stddev(&[2, 4, 4, 4, 5, 5, 7, 9]);
        assert_eq!(avg, 5.0);
        assert_eq!(sd, 2.0);
    }
}
