//! Impact cloud statistics: outlier rejection and confidence ellipses

pub mod ellipse;
pub mod outlier;

pub use ellipse::{DispersionEllipse, DispersionEllipseEstimator, MIN_SEMI_AXIS_KM};
pub use outlier::{iqr_fence, quantile, Fence, FilterReport, OutlierFilter, MIN_CLOUD_POINTS};
