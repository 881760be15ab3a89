//! Error taxonomy for the dispersion and scoring pipeline
//!
//! Fatal conditions surface as [`PipelineError`]. Conditions that are
//! recovered locally never become errors: a diverged trajectory is a
//! [`crate::physics::TrajectoryOutcome::Diverged`] sample that gets counted
//! and dropped, and a failed raster field is recorded in the cell's
//! `missing_data` set with a fallback substituted.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Which impact cloud a stage was working on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CloudKind {
    /// Intact stage impacts
    Primary,
    /// Breakup fragment impacts
    Fragment,
}

impl CloudKind {
    /// Lower-case tag used in logs and GeoJSON properties
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            CloudKind::Primary => "primary",
            CloudKind::Fragment => "fragment",
        }
    }
}

impl fmt::Display for CloudKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fatal pipeline errors
#[derive(Debug)]
pub enum PipelineError {
    /// A configuration field failed validation
    InvalidConfig {
        /// Dotted path of the offending field
        field: &'static str,
        /// What is wrong with it
        reason: String,
    },
    /// Outlier filtering left too few points to fit an ellipse
    DegenerateSampleSet {
        /// Cloud being filtered
        cloud: CloudKind,
        /// Points kept by the filter
        retained: usize,
        /// Points before filtering
        total: usize,
        /// Configured minimum retained fraction
        min_fraction: f64,
    },
    /// Polygon membership cannot be evaluated for an ellipse polygon
    PolygonMembershipUnavailable {
        /// Index of the polygon in the generator input
        polygon: usize,
        /// Why the polygon is unusable
        reason: String,
    },
    /// The grid would exceed the configured cell budget
    CapacityExceeded {
        /// Cells accepted when the limit was hit
        cell_count: usize,
        /// Configured maximum
        max_cells: usize,
    },
    /// Raster cache persistence failed
    Cache(CacheError),
    /// Writing an output file failed
    Export {
        /// Destination
        path: String,
        /// Underlying I/O or serialisation error
        reason: String,
    },
    /// The abort flag was raised before `stage` started
    Aborted {
        /// Stage that did not run
        stage: &'static str,
    },
}

impl PipelineError {
    /// Shorthand for an [`PipelineError::InvalidConfig`]
    pub fn invalid_config(field: &'static str, reason: impl Into<String>) -> Self {
        PipelineError::InvalidConfig {
            field,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::InvalidConfig { field, reason } => {
                write!(f, "Invalid configuration for '{field}': {reason}")
            }
            PipelineError::DegenerateSampleSet {
                cloud,
                retained,
                total,
                min_fraction,
            } => write!(
                f,
                "Degenerate {cloud} sample set: {retained} of {total} points retained after \
                 IQR filtering (minimum fraction {min_fraction:.2})"
            ),
            PipelineError::PolygonMembershipUnavailable { polygon, reason } => write!(
                f,
                "Polygon membership unavailable for polygon {polygon}: {reason}"
            ),
            PipelineError::CapacityExceeded {
                cell_count,
                max_cells,
            } => write!(
                f,
                "Grid capacity exceeded: more than {max_cells} cells requested \
                 (reached {cell_count})"
            ),
            PipelineError::Cache(err) => write!(f, "Raster cache error: {err}"),
            PipelineError::Export { path, reason } => {
                write!(f, "Failed to write '{path}': {reason}")
            }
            PipelineError::Aborted { stage } => write!(f, "Run aborted before stage '{stage}'"),
        }
    }
}

impl std::error::Error for PipelineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PipelineError::Cache(err) => Some(err),
            _ => None,
        }
    }
}

impl From<CacheError> for PipelineError {
    fn from(err: CacheError) -> Self {
        PipelineError::Cache(err)
    }
}

/// Failure of a single raster request
#[derive(Debug, Clone, PartialEq)]
pub enum FetchError {
    /// The provider did not answer within the request timeout
    Timeout {
        /// Time spent before giving up
        elapsed: Duration,
    },
    /// The dataset has no coverage for the requested box or date
    MissingCoverage,
    /// Any other provider-side failure
    Provider(String),
}

impl FetchError {
    /// Whether retrying the same request can succeed
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, FetchError::Timeout { .. } | FetchError::Provider(_))
    }
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchError::Timeout { elapsed } => {
                write!(f, "Request timed out after {:.1}s", elapsed.as_secs_f64())
            }
            FetchError::MissingCoverage => write!(f, "No coverage for requested area"),
            FetchError::Provider(msg) => write!(f, "Provider error: {msg}"),
        }
    }
}

impl std::error::Error for FetchError {}

/// Errors that can occur with cache persistence
#[derive(Debug)]
pub enum CacheError {
    /// Failed to load file
    LoadFailed(String),
    /// Failed to parse file contents
    ParseFailed(String),
    /// Failed to serialize cache
    SerializeFailed(String),
    /// Failed to save file
    SaveFailed(String),
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheError::LoadFailed(msg) => write!(f, "Failed to load: {msg}"),
            CacheError::ParseFailed(msg) => write!(f, "Failed to parse: {msg}"),
            CacheError::SerializeFailed(msg) => write!(f, "Failed to serialize: {msg}"),
            CacheError::SaveFailed(msg) => write!(f, "Failed to save: {msg}"),
        }
    }
}

impl std::error::Error for CacheError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_carries_context() {
        let err = PipelineError::DegenerateSampleSet {
            cloud: CloudKind::Fragment,
            retained: 4,
            total: 20,
            min_fraction: 0.5,
        };
        let msg = err.to_string();
        assert!(msg.contains("fragment"));
        assert!(msg.contains("4 of 20"));

        let err = PipelineError::CapacityExceeded {
            cell_count: 50_001,
            max_cells: 50_000,
        };
        assert!(err.to_string().contains("50000"));
    }

    #[test]
    fn test_retryable_classification() {
        assert!(FetchError::Timeout {
            elapsed: Duration::from_secs(3)
        }
        .is_retryable());
        assert!(FetchError::Provider("503".into()).is_retryable());
        assert!(!FetchError::MissingCoverage.is_retryable());
    }

    #[test]
    fn test_cache_error_source() {
        use std::error::Error;
        let err: PipelineError = CacheError::SaveFailed("disk full".into()).into();
        assert!(err.source().is_some());
        assert!(err.to_string().contains("disk full"));
    }
}
