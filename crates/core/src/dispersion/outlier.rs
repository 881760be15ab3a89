//! Interquartile-range outlier rejection
//!
//! Each axis (downrange, crossrange) gets its own fence
//! `[Q1 − k·IQR, Q3 + k·IQR]`; a point survives only if both coordinates lie
//! inside their fences. Quartiles interpolate linearly between order
//! statistics (position `q·(n − 1)`).

use crate::config::FilterConfig;
use crate::error::{CloudKind, PipelineError};
use crate::simulation::TrajectorySample;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Fewest points an ellipse can be fitted to
pub const MIN_CLOUD_POINTS: usize = 3;

/// Closed interval kept by the filter on one axis
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Fence {
    /// Lower bound, km
    pub low: f64,
    /// Upper bound, km
    pub high: f64,
}

impl Fence {
    /// Whether `value` lies inside the fence
    #[must_use]
    pub fn contains(&self, value: f64) -> bool {
        value >= self.low && value <= self.high
    }
}

/// What the filter did to one cloud
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterReport {
    /// Cloud that was filtered
    pub cloud: CloudKind,
    /// Points before filtering
    pub total: usize,
    /// Points kept
    pub retained: usize,
    /// Downrange fence
    pub downrange: Fence,
    /// Crossrange fence
    pub crossrange: Fence,
}

impl FilterReport {
    /// Fraction of points kept
    #[must_use]
    pub fn retained_fraction(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.retained as f64 / self.total as f64
        }
    }
}

/// Quantile `q` of an ascending slice, linear interpolation between ranks
#[must_use]
pub fn quantile(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

/// IQR fence for a set of values, `None` if there are none
#[must_use]
pub fn iqr_fence(values: &[f64], multiplier: f64) -> Option<Fence> {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let q1 = quantile(&sorted, 0.25)?;
    let q3 = quantile(&sorted, 0.75)?;
    let iqr = q3 - q1;
    Some(Fence {
        low: q1 - multiplier * iqr,
        high: q3 + multiplier * iqr,
    })
}

/// Per-axis IQR filter
#[derive(Debug, Clone, Copy)]
pub struct OutlierFilter {
    config: FilterConfig,
}

impl OutlierFilter {
    /// Create a filter with the given fence multiplier and retention floor
    #[must_use]
    pub fn new(config: FilterConfig) -> Self {
        Self { config }
    }

    /// Filter one impact cloud.
    ///
    /// # Errors
    ///
    /// [`PipelineError::DegenerateSampleSet`] if fewer than
    /// [`MIN_CLOUD_POINTS`] points survive or the retained fraction falls below
    /// `min_retained_fraction`.
    pub fn apply(
        &self,
        cloud: CloudKind,
        samples: &[TrajectorySample],
    ) -> Result<(Vec<TrajectorySample>, FilterReport), PipelineError> {
        let total = samples.len();
        let degenerate = |retained| PipelineError::DegenerateSampleSet {
            cloud,
            retained,
            total,
            min_fraction: self.config.min_retained_fraction,
        };

        let downrange: Vec<f64> = samples.iter().map(|s| s.downrange_km).collect();
        let crossrange: Vec<f64> = samples.iter().map(|s| s.crossrange_km).collect();
        let k = self.config.iqr_multiplier;
        let (Some(d_fence), Some(c_fence)) = (iqr_fence(&downrange, k), iqr_fence(&crossrange, k))
        else {
            return Err(degenerate(0));
        };

        let kept: Vec<TrajectorySample> = samples
            .iter()
            .filter(|s| d_fence.contains(s.downrange_km) && c_fence.contains(s.crossrange_km))
            .copied()
            .collect();

        let report = FilterReport {
            cloud,
            total,
            retained: kept.len(),
            downrange: d_fence,
            crossrange: c_fence,
        };
        debug!(
            %cloud,
            downrange_low = d_fence.low,
            downrange_high = d_fence.high,
            crossrange_low = c_fence.low,
            crossrange_high = c_fence.high,
            "IQR fences"
        );

        if kept.len() < MIN_CLOUD_POINTS
            || report.retained_fraction() < self.config.min_retained_fraction
        {
            return Err(degenerate(kept.len()));
        }

        info!(
            %cloud,
            total,
            retained = kept.len(),
            "Outlier filter applied"
        );
        Ok((kept, report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_types::GeoPoint;
    use crate::simulation::sampling::{sample_gaussian, stream_rng};

    fn sample(d: f64, c: f64) -> TrajectorySample {
        TrajectorySample {
            iteration: 0,
            impact: GeoPoint::new(0.0, 0.0),
            downrange_km: d,
            crossrange_km: c,
            is_fragment: false,
            valid: true,
            flight_time_s: None,
            impact_speed_m_s: None,
        }
    }

    #[test]
    fn test_quantile_interpolates() {
        let v = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(quantile(&v, 0.0), Some(1.0));
        assert_eq!(quantile(&v, 1.0), Some(4.0));
        assert_eq!(quantile(&v, 0.25), Some(1.75));
        assert_eq!(quantile(&v, 0.75), Some(3.25));
        assert_eq!(quantile(&[], 0.5), None);
    }

    #[test]
    fn test_gaussian_retention_per_axis() {
        // Only downrange varies, so retention is the one-axis figure (~99.3 %)
        let mut rng = stream_rng(11, 0);
        let samples: Vec<_> = (0..40_000)
            .map(|_| sample(sample_gaussian(&mut rng, 300.0, 10.0), 0.0))
            .collect();
        let filter = OutlierFilter::new(FilterConfig::default());
        let (_, report) = filter.apply(CloudKind::Primary, &samples).unwrap();
        let frac = report.retained_fraction();
        assert!((frac - 0.993).abs() < 0.003, "retained {frac}");
    }

    #[test]
    fn test_gaussian_retention_both_axes() {
        let mut rng = stream_rng(12, 0);
        let samples: Vec<_> = (0..40_000)
            .map(|_| {
                let d = sample_gaussian(&mut rng, 300.0, 10.0);
                let c = sample_gaussian(&mut rng, 0.0, 4.0);
                sample(d, c)
            })
            .collect();
        let filter = OutlierFilter::new(FilterConfig::default());
        let (kept, report) = filter.apply(CloudKind::Primary, &samples).unwrap();
        let frac = report.retained_fraction();
        assert!((frac - 0.993 * 0.993).abs() < 0.004, "retained {frac}");
        assert!(kept
            .iter()
            .all(|s| report.downrange.contains(s.downrange_km)
                && report.crossrange.contains(s.crossrange_km)));
    }

    #[test]
    fn test_far_outlier_removed() {
        let mut samples: Vec<_> = (0..20).map(|i| sample(f64::from(i), 0.0)).collect();
        samples.push(sample(1_000.0, 0.0));
        let filter = OutlierFilter::new(FilterConfig::default());
        let (kept, report) = filter.apply(CloudKind::Fragment, &samples).unwrap();
        assert_eq!(kept.len(), 20);
        assert_eq!(report.total, 21);
        assert!(kept.iter().all(|s| s.downrange_km < 100.0));
    }

    #[test]
    fn test_too_few_points_is_degenerate() {
        let samples = vec![sample(1.0, 1.0), sample(2.0, 2.0)];
        let filter = OutlierFilter::new(FilterConfig::default());
        let err = filter.apply(CloudKind::Fragment, &samples).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::DegenerateSampleSet {
                cloud: CloudKind::Fragment,
                retained: 2,
                ..
            }
        ));
        assert!(filter.apply(CloudKind::Primary, &[]).is_err());
    }

    #[test]
    fn test_retention_floor_enforced() {
        let samples: Vec<_> = (0..20).map(|i| sample(f64::from(i), 0.0)).collect();
        let filter = OutlierFilter::new(FilterConfig {
            iqr_multiplier: 1.5,
            min_retained_fraction: 1.0,
        });
        // Every point is inside the fences, so even a 100 % floor passes
        assert!(filter.apply(CloudKind::Primary, &samples).is_ok());

        let mut spread = samples.clone();
        spread.extend((0..5).map(|i| sample(500.0 + f64::from(i), 0.0)));
        assert!(filter.apply(CloudKind::Primary, &spread).is_err());
    }
}
