//! Core types and utilities

pub mod geo;
pub mod noise;
pub mod units;

pub use geo::{BoundingBox, GeoPoint, LocalFrame, MetricPoint, EARTH_RADIUS_KM};
pub use noise::{fbm_2d, value_noise_2d};
pub use units::Kilometers;
