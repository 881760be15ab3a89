//! Stage Impact Dispersion Core Library
//!
//! Estimates where a spent rocket stage and its breakup fragments come down,
//! then scores the ground inside the dispersion ellipses as Optimal Touchdown
//! Units (OTU).
//!
//! ## Pipeline
//!
//! - Monte Carlo ballistic propagation from a perturbed separation state
//! - IQR outlier filtering and covariance dispersion ellipses in a local
//!   metric frame
//! - Square landing-zone grid restricted to the ellipse polygons
//! - Chunked, cached, concurrent raster acquisition through an injected provider
//! - Composite OTU index per cell with missing-data fallbacks

// Core types and utilities
pub mod config;
pub mod core_types;
pub mod error;

// Stages
pub mod dispersion;
pub mod fetch;
pub mod grid;
pub mod otu;
pub mod physics;
pub mod simulation;

// Orchestration and output
pub mod export;
pub mod pipeline;

// Re-export core types
pub use config::PipelineConfig;
pub use core_types::{BoundingBox, GeoPoint, Kilometers, LocalFrame, MetricPoint};
pub use error::{CloudKind, FetchError, PipelineError};

// Re-export stage types
pub use dispersion::{DispersionEllipse, DispersionEllipseEstimator, OutlierFilter};
pub use fetch::{AbortFlag, Dataset, RasterCache, RasterProvider, SyntheticRasterProvider};
pub use grid::{DataField, Grid, GridCell, GridGenerator};
pub use otu::OtuIndexCalculator;
pub use pipeline::{Pipeline, PipelineOutput};
pub use simulation::{ImpactPointSet, MonteCarloDriver, TrajectorySample};
