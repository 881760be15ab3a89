//! Landing-zone grid: polygons, cells and the lattice generator

pub mod cell;
pub mod generator;
pub mod polygon;

pub use cell::{DataField, Grid, GridCell, RasterSample};
pub use generator::GridGenerator;
pub use polygon::{MetricPolygon, PolygonDefect};
