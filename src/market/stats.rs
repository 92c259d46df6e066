/// Percentile with linear interpolation between the closest ranks. `values` is sorted in place
/// and must not be empty.
pub fn percentile(values: &mut [f64], q: f64) -> f64 {
    values.sort_by(|a, b| a.total_cmp(b));
    let last = values.len() - 1;
    let rank = (q / 100.0) * last as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let weight = rank - lower as f64;
    values[lower] + (values[upper.min(last)] - values[lower]) * weight
}

#[cfg(test)]
mod tests {
    use super::percentile;

    #[test]
    fn test_that_percentile_interpolates_between_ranks() {
        let mut values = vec![4.0, 1.0, 3.0, 2.0];
        // rank 0.9 * 3 = 2.7 -> 3.0 + 0.7 * (4.0 - 3.0)
        assert!((percentile(&mut values, 90.0) - 3.7).abs() < 1e-12);
    }

    #[test]
    fn test_that_percentile_of_single_value_is_value() {
        let mut values = vec![7.0];
        assert_eq!(percentile(&mut values, 90.0), 7.0);
    }

    #[test]
    fn test_that_extreme_percentiles_are_min_and_max() {
        let mut values = vec![5.0, 9.0, 1.0];
        assert_eq!(percentile(&mut values, 0.0), 1.0);
        assert_eq!(percentile(&mut values, 100.0), 9.0);
    }
}
