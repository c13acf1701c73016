//! Small aggregates shared by the stats endpoints.

/// Arithmetic mean, `0.0` for an empty slice.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Mean of review ratings, unrounded so it always equals the true mean.
pub fn average_rating(ratings: &[i16]) -> f64 {
    let values: Vec<f64> = ratings.iter().map(|r| *r as f64).collect();
    mean(&values)
}

/// `part / whole` as a percentage with one decimal, `0.0` when `whole` is zero.
pub fn percentage(part: i64, whole: i64) -> f64 {
    if whole <= 0 {
        return 0.0;
    }
    (part as f64 / whole as f64 * 1000.0).round() / 10.0
}

/// Rounds to one decimal for display.
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn average_rating_test() {
        assert_eq!(average_rating(&[]), 0.0);
        assert_eq!(average_rating(&[5]), 5.0);
        assert_eq!(average_rating(&[4, 5]), 4.5);
        let avg = average_rating(&[1, 2, 2]);
        assert!((avg - 5.0 / 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn percentage_test() {
        assert_eq!(percentage(0, 0), 0.0);
        assert_eq!(percentage(1, 3), 33.3);
        assert_eq!(percentage(2, 3), 66.7);
        assert_eq!(percentage(5, 5), 100.0);
    }

    #[test]
    fn mean_test() {
        assert_eq!(mean(&[]), 0.0);
        assert_eq!(mean(&[70.0, 80.0, 90.0]), 80.0);
        assert_eq!(round1(80.04), 80.0);
    }
}
