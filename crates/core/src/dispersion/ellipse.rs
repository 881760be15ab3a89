//! Covariance dispersion ellipses
//!
//! The cloud is projected into an azimuthal-equidistant frame centred on its
//! geographic centroid, so the covariance is computed in kilometres and the
//! result does not depend on latitude. Degrees only reappear when the centre
//! and polygon vertices are handed back to the caller.

use super::outlier::MIN_CLOUD_POINTS;
use crate::config::EllipseConfig;
use crate::core_types::{GeoPoint, LocalFrame, MetricPoint};
use crate::error::{CloudKind, PipelineError};
use crate::simulation::TrajectorySample;
use nalgebra::Matrix2;
use serde::{Deserialize, Serialize};
use std::f64::consts::{PI, TAU};
use tracing::{debug, info};

/// Smallest semi-axis, km, that still counts as a two-dimensional cloud
pub const MIN_SEMI_AXIS_KM: f64 = 1e-6;

/// Confidence ellipse of one impact cloud
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DispersionEllipse {
    /// Ellipse centre (cloud mean)
    pub center: GeoPoint,
    /// Semi-major axis, km
    pub semi_major_km: f64,
    /// Semi-minor axis, km
    pub semi_minor_km: f64,
    /// Major-axis direction, degrees counter-clockwise from east, in (−90, 90]
    pub rotation_deg: f64,
    /// Axis scale factor applied to the standard deviations
    pub sigma_level: f64,
    /// Cloud the ellipse was fitted to
    pub kind: CloudKind,
    /// Points used in the fit
    pub point_count: usize,
}

impl DispersionEllipse {
    /// Ellipse area, km²
    #[must_use]
    pub fn area_km2(&self) -> f64 {
        PI * self.semi_major_km * self.semi_minor_km
    }

    /// Frame centred on the ellipse
    #[must_use]
    pub fn frame(&self) -> LocalFrame {
        LocalFrame::new(self.center)
    }

    /// Whether an offset from the centre (in [`Self::frame`]) lies inside
    #[must_use]
    pub fn contains_metric(&self, offset: &MetricPoint) -> bool {
        if self.semi_major_km <= 0.0 || self.semi_minor_km <= 0.0 {
            return false;
        }
        let (sin, cos) = self.rotation_deg.to_radians().sin_cos();
        let u = offset.x * cos + offset.y * sin;
        let v = -offset.x * sin + offset.y * cos;
        (u / self.semi_major_km).powi(2) + (v / self.semi_minor_km).powi(2) <= 1.0
    }

    /// Boundary vertices in the ellipse's own frame (open ring, counter-clockwise)
    fn local_ring(&self, vertices: usize) -> Vec<MetricPoint> {
        let (sin, cos) = self.rotation_deg.to_radians().sin_cos();
        (0..vertices)
            .map(|i| {
                let t = TAU * i as f64 / vertices as f64;
                let (u, v) = (self.semi_major_km * t.cos(), self.semi_minor_km * t.sin());
                MetricPoint::new(u * cos - v * sin, u * sin + v * cos)
            })
            .collect()
    }

    /// Boundary as geographic vertices (open ring)
    #[must_use]
    pub fn geographic_polygon(&self, vertices: usize) -> Vec<GeoPoint> {
        let frame = self.frame();
        self.local_ring(vertices)
            .iter()
            .map(|p| frame.to_geographic(p))
            .collect()
    }

    /// Boundary expressed in another metric frame (open ring)
    #[must_use]
    pub fn metric_polygon(&self, frame: &LocalFrame, vertices: usize) -> Vec<MetricPoint> {
        self.geographic_polygon(vertices)
            .iter()
            .map(|p| frame.to_metric(p))
            .collect()
    }
}

/// Fits [`DispersionEllipse`]s to impact clouds
#[derive(Debug, Clone, Copy)]
pub struct DispersionEllipseEstimator {
    config: EllipseConfig,
}

impl DispersionEllipseEstimator {
    /// Create an estimator scaling the axes by `config.sigma_level`
    #[must_use]
    pub fn new(config: EllipseConfig) -> Self {
        Self { config }
    }

    /// Fit an ellipse to a filtered cloud.
    ///
    /// # Errors
    ///
    /// [`PipelineError::DegenerateSampleSet`] if the cloud has fewer than three
    /// points or no two-dimensional spread.
    pub fn estimate(
        &self,
        kind: CloudKind,
        samples: &[TrajectorySample],
    ) -> Result<DispersionEllipse, PipelineError> {
        let points: Vec<GeoPoint> = samples.iter().map(|s| s.impact).collect();
        let degenerate = || PipelineError::DegenerateSampleSet {
            cloud: kind,
            retained: samples.len(),
            total: samples.len(),
            min_fraction: 0.0,
        };
        if points.len() < MIN_CLOUD_POINTS {
            return Err(degenerate());
        }
        let origin = GeoPoint::centroid(&points).ok_or_else(degenerate)?;
        let frame = LocalFrame::new(origin);
        let metric: Vec<MetricPoint> = points.iter().map(|p| frame.to_metric(p)).collect();
        let ellipse = self.fit_metric(kind, &frame, &metric)?;

        info!(
            cloud = %kind,
            points = ellipse.point_count,
            semi_major_km = ellipse.semi_major_km,
            semi_minor_km = ellipse.semi_minor_km,
            rotation_deg = ellipse.rotation_deg,
            "Dispersion ellipse fitted"
        );
        Ok(ellipse)
    }

    /// Fit an ellipse to points already projected into `frame`
    ///
    /// # Errors
    ///
    /// [`PipelineError::DegenerateSampleSet`] for fewer than three points, or
    /// when either scaled semi-axis is below [`MIN_SEMI_AXIS_KM`] (coincident
    /// or collinear impacts).
    pub fn fit_metric(
        &self,
        kind: CloudKind,
        frame: &LocalFrame,
        points: &[MetricPoint],
    ) -> Result<DispersionEllipse, PipelineError> {
        let n = points.len();
        let degenerate = || PipelineError::DegenerateSampleSet {
            cloud: kind,
            retained: n,
            total: n,
            min_fraction: 0.0,
        };
        if n < MIN_CLOUD_POINTS {
            return Err(degenerate());
        }

        let nf = n as f64;
        let mean_x = points.iter().map(|p| p.x).sum::<f64>() / nf;
        let mean_y = points.iter().map(|p| p.y).sum::<f64>() / nf;
        let (mut sxx, mut sxy, mut syy) = (0.0, 0.0, 0.0);
        for p in points {
            let (dx, dy) = (p.x - mean_x, p.y - mean_y);
            sxx += dx * dx;
            sxy += dx * dy;
            syy += dy * dy;
        }
        let denom = nf - 1.0;
        let covariance = Matrix2::new(sxx / denom, sxy / denom, sxy / denom, syy / denom);

        let eigen = covariance.symmetric_eigen();
        let (major, minor) = if eigen.eigenvalues[0] >= eigen.eigenvalues[1] {
            (0, 1)
        } else {
            (1, 0)
        };
        let lambda1 = eigen.eigenvalues[major].max(0.0);
        let lambda2 = eigen.eigenvalues[minor].max(0.0);
        let v1 = eigen.eigenvectors.column(major);

        let s = self.config.sigma_level;
        let (semi_major_km, semi_minor_km) = (lambda1.sqrt() * s, lambda2.sqrt() * s);
        if semi_minor_km.is_nan() || semi_minor_km < MIN_SEMI_AXIS_KM {
            debug!(cloud = %kind, points = n, semi_major_km, semi_minor_km, "Cloud has no spread");
            return Err(degenerate());
        }
        Ok(DispersionEllipse {
            center: frame.to_geographic(&MetricPoint::new(mean_x, mean_y)),
            semi_major_km,
            semi_minor_km,
            rotation_deg: normalize_axis_angle(v1[1].atan2(v1[0]).to_degrees()),
            sigma_level: s,
            kind,
            point_count: n,
        })
    }
}

/// Fold an axis direction into (−90, 90]
fn normalize_axis_angle(deg: f64) -> f64 {
    let mut a = deg % 180.0;
    if a <= -90.0 {
        a += 180.0;
    } else if a > 90.0 {
        a -= 180.0;
    }
    a
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::sampling::{sample_gaussian, stream_rng};
    use approx::assert_abs_diff_eq;
    use approx::assert_relative_eq;

    /// Correlated Gaussian cloud in km with the given axis sigmas and rotation
    fn metric_cloud(n: usize, sigma_u: f64, sigma_v: f64, rotation_deg: f64) -> Vec<MetricPoint> {
        let mut rng = stream_rng(2024, 0);
        let (sin, cos) = rotation_deg.to_radians().sin_cos();
        (0..n)
            .map(|_| {
                let u = sample_gaussian(&mut rng, 0.0, sigma_u);
                let v = sample_gaussian(&mut rng, 0.0, sigma_v);
                MetricPoint::new(u * cos - v * sin, u * sin + v * cos)
            })
            .collect()
    }

    fn as_samples(points: &[GeoPoint]) -> Vec<TrajectorySample> {
        points
            .iter()
            .map(|&impact| TrajectorySample {
                iteration: 0,
                impact,
                downrange_km: 0.0,
                crossrange_km: 0.0,
                is_fragment: false,
                valid: true,
                flight_time_s: None,
                impact_speed_m_s: None,
            })
            .collect()
    }

    #[test]
    fn test_axis_angle_normalisation() {
        assert_eq!(normalize_axis_angle(90.0), 90.0);
        assert_eq!(normalize_axis_angle(-90.0), 90.0);
        assert_eq!(normalize_axis_angle(135.0), -45.0);
        assert_eq!(normalize_axis_angle(-135.0), 45.0);
        assert_eq!(normalize_axis_angle(30.0), 30.0);
    }

    #[test]
    fn test_recovers_analytic_axes() {
        let frame = LocalFrame::new(GeoPoint::new(47.0, 66.0));
        let cloud = metric_cloud(20_000, 10.0, 4.0, 30.0);
        let estimator = DispersionEllipseEstimator::new(EllipseConfig::default());
        let e = estimator
            .fit_metric(CloudKind::Primary, &frame, &cloud)
            .unwrap();
        assert_relative_eq!(e.semi_major_km, 30.0, max_relative = 0.03);
        assert_relative_eq!(e.semi_minor_km, 12.0, max_relative = 0.03);
        assert_abs_diff_eq!(e.rotation_deg, 30.0, epsilon = 1.0);
        assert_eq!(e.point_count, 20_000);
    }

    #[test]
    fn test_km_and_degree_inputs_agree() {
        let origin = GeoPoint::new(48.5, 67.0);
        let frame = LocalFrame::new(origin);
        let cloud = metric_cloud(5_000, 20.0, 6.0, -60.0);
        let estimator = DispersionEllipseEstimator::new(EllipseConfig::default());

        let from_km = estimator
            .fit_metric(CloudKind::Primary, &frame, &cloud)
            .unwrap();
        let geo: Vec<GeoPoint> = cloud.iter().map(|p| frame.to_geographic(p)).collect();
        let from_deg = estimator
            .estimate(CloudKind::Primary, &as_samples(&geo))
            .unwrap();

        assert_relative_eq!(from_km.semi_major_km, from_deg.semi_major_km, max_relative = 1e-3);
        assert_relative_eq!(from_km.semi_minor_km, from_deg.semi_minor_km, max_relative = 1e-3);
        assert_abs_diff_eq!(from_km.rotation_deg, from_deg.rotation_deg, epsilon = 0.05);
        assert!(from_km.center.distance_km(&from_deg.center) < 0.01);
    }

    #[test]
    fn test_polygon_vertices_lie_on_boundary() {
        let e = DispersionEllipse {
            center: GeoPoint::new(46.0, 65.0),
            semi_major_km: 40.0,
            semi_minor_km: 15.0,
            rotation_deg: 20.0,
            sigma_level: 3.0,
            kind: CloudKind::Primary,
            point_count: 100,
        };
        let frame = e.frame();
        for p in e.metric_polygon(&frame, 36) {
            let (sin, cos) = e.rotation_deg.to_radians().sin_cos();
            let u = p.x * cos + p.y * sin;
            let v = -p.x * sin + p.y * cos;
            let r = (u / 40.0).powi(2) + (v / 15.0).powi(2);
            assert_abs_diff_eq!(r, 1.0, epsilon = 1e-6);
        }
        assert!(e.contains_metric(&MetricPoint::new(0.0, 0.0)));
        let (sin, cos) = 20f64.to_radians().sin_cos();
        assert!(e.contains_metric(&MetricPoint::new(35.0 * cos, 35.0 * sin)));
        assert!(!e.contains_metric(&MetricPoint::new(0.0, 30.0)));
        assert_relative_eq!(e.area_km2(), PI * 600.0);
    }

    #[test]
    fn test_rejects_cloud_without_spread() {
        let frame = LocalFrame::new(GeoPoint::new(46.0, 63.0));
        let estimator = DispersionEllipseEstimator::new(EllipseConfig::default());

        let coincident = vec![MetricPoint::new(12.0, -4.0); 50];
        let err = estimator
            .fit_metric(CloudKind::Primary, &frame, &coincident)
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::DegenerateSampleSet {
                cloud: CloudKind::Primary,
                retained: 50,
                ..
            }
        ));

        let collinear: Vec<MetricPoint> =
            (0..20).map(|i| MetricPoint::new(f64::from(i), 5.0)).collect();
        assert!(matches!(
            estimator.fit_metric(CloudKind::Fragment, &frame, &collinear),
            Err(PipelineError::DegenerateSampleSet { .. })
        ));
    }

    #[test]
    fn test_rejects_tiny_cloud() {
        let estimator = DispersionEllipseEstimator::new(EllipseConfig::default());
        let geo = [GeoPoint::new(45.0, 60.0), GeoPoint::new(45.1, 60.1)];
        assert!(estimator
            .estimate(CloudKind::Fragment, &as_samples(&geo))
            .is_err());
    }
}
