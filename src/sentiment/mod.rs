// Historical sentiment lookup
use chrono::{DateTime, Utc};

use crate::error::{Error, Result};
use crate::models::SentimentSample;

/// Ordered sentiment samples with as-of lookup
#[derive(Debug, Clone, Default)]
pub struct SentimentSeries {
    samples: Vec<SentimentSample>,
}

impl SentimentSeries {
    /// Build a series, sorting by timestamp
    ///
    /// Scores must be finite and within [-1, 1]. When two samples share a
    /// timestamp the later one in input order wins.
    pub fn new(mut samples: Vec<SentimentSample>) -> Result<Self> {
        if let Some(bad) = samples
            .iter()
            .find(|s| !s.score.is_finite() || !(-1.0..=1.0).contains(&s.score))
        {
            return Err(Error::InvalidSentiment(format!(
                "score {} at {} is outside [-1, 1]",
                bad.score, bad.timestamp
            )));
        }

        // stable sort keeps input order among equal timestamps
        samples.sort_by_key(|s| s.timestamp);
        Ok(Self { samples })
    }

    /// Series with no samples: every lookup is neutral
    pub fn neutral() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Latest score at or before `timestamp`, or 0.0 if none exists
    pub fn as_of(&self, timestamp: DateTime<Utc>) -> f64 {
        let idx = self.samples.partition_point(|s| s.timestamp <= timestamp);
        idx.checked_sub(1)
            .map(|i| self.samples[i].score)
            .unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t(hour: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap() + Duration::hours(hour)
    }

    fn sample(hour: i64, score: f64) -> SentimentSample {
        SentimentSample {
            timestamp: t(hour),
            score,
        }
    }

    #[test]
    fn test_exact_and_preceding_lookup() {
        let series = SentimentSeries::new(vec![sample(1, 0.5), sample(4, -0.3)]).unwrap();

        assert_eq!(series.as_of(t(1)), 0.5); // exact
        assert_eq!(series.as_of(t(3)), 0.5); // nearest preceding
        assert_eq!(series.as_of(t(4)), -0.3);
        assert_eq!(series.as_of(t(100)), -0.3);
    }

    #[test]
    fn test_before_first_sample_is_neutral() {
        let series = SentimentSeries::new(vec![sample(5, 0.8)]).unwrap();
        assert_eq!(series.as_of(t(2)), 0.0);
    }

    #[test]
    fn test_empty_series_is_neutral() {
        let series = SentimentSeries::neutral();
        assert!(series.is_empty());
        assert_eq!(series.as_of(t(0)), 0.0);
    }

    #[test]
    fn test_unsorted_input_is_ordered() {
        let series =
            SentimentSeries::new(vec![sample(6, 0.6), sample(2, 0.2), sample(4, 0.4)]).unwrap();
        assert_eq!(series.as_of(t(3)), 0.2);
        assert_eq!(series.as_of(t(5)), 0.4);
    }

    #[test]
    fn test_out_of_range_score_rejected() {
        let result = SentimentSeries::new(vec![sample(1, 1.5)]);
        assert!(matches!(result, Err(Error::InvalidSentiment(_))));
    }
}
