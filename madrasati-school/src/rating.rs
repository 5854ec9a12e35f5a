use serde::{Deserialize, Serialize};

pub const MIN_RATING: i16 = 1;
pub const MAX_RATING: i16 = 5;

/// Mean of the four sub-ratings rounded half-up to one decimal.
///
/// Integer arithmetic keeps `(5, 4, 5, 3)` at exactly `4.3`.
pub fn overall(ratings: [i16; 4]) -> f64 {
    let sum: i32 = ratings.iter().map(|&r| r as i32).sum();
    let tenths = (sum * 25 + 5) / 10;
    tenths as f64 / 10.0
}

/// Rounds an arbitrary average to one decimal for display.
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Per-criterion averages over a school's published reviews.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RatingSummary {
    pub review_count: u64,
    pub average_rating: Option<f64>,
    pub hygiene: Option<f64>,
    pub management: Option<f64>,
    pub education_quality: Option<f64>,
    pub parent_communication: Option<f64>,
}

impl RatingSummary {
    pub fn from_ratings<I>(ratings: I) -> Self
    where
        I: IntoIterator<Item = [i16; 4]>,
    {
        let mut sums = [0i64; 4];
        let mut count = 0u64;
        for r in ratings {
            for (sum, value) in sums.iter_mut().zip(r) {
                *sum += value as i64;
            }
            count += 1;
        }

        if count == 0 {
            return Self::default();
        }

        let avg = |sum: i64| round1(sum as f64 / count as f64);
        let total: i64 = sums.iter().sum();
        Self {
            review_count: count,
            average_rating: Some(round1(total as f64 / (count as f64 * 4.0))),
            hygiene: Some(avg(sums[0])),
            management: Some(avg(sums[1])),
            education_quality: Some(avg(sums[2])),
            parent_communication: Some(avg(sums[3])),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overall_rounds_to_one_decimal() {
        assert_eq!(overall([5, 4, 5, 3]), 4.3);
        assert_eq!(overall([1, 1, 1, 1]), 1.0);
        assert_eq!(overall([5, 5, 5, 5]), 5.0);
        assert_eq!(overall([1, 2, 1, 1]), 1.3);
        assert_eq!(overall([2, 1, 1, 1]), 1.3);
        assert_eq!(overall([4, 4, 4, 5]), 4.3);
        assert_eq!(overall([3, 4, 4, 4]), 3.8);
    }

    #[test]
    fn summary_of_nothing_is_empty() {
        let summary = RatingSummary::from_ratings(Vec::<[i16; 4]>::new());
        assert_eq!(summary.review_count, 0);
        assert!(summary.average_rating.is_none());
    }

    #[test]
    fn summary_averages_each_criterion() {
        let summary = RatingSummary::from_ratings(vec![[5, 4, 5, 3], [3, 4, 1, 3]]);
        assert_eq!(summary.review_count, 2);
        assert_eq!(summary.hygiene, Some(4.0));
        assert_eq!(summary.management, Some(4.0));
        assert_eq!(summary.education_quality, Some(3.0));
        assert_eq!(summary.parent_communication, Some(3.0));
        assert_eq!(summary.average_rating, Some(3.5));
    }
}
