//! Raster provider seam
//!
//! The pipeline never talks to a data service directly. Everything it needs
//! goes through an injected [`RasterProvider`], so tests and offline runs can
//! swap in a deterministic source.

use super::raster::Raster;
use crate::core_types::BoundingBox;
use crate::error::FetchError;
use crate::grid::DataField;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// External dataset a raster is requested from
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dataset {
    /// NDVI composite
    Vegetation,
    /// Digital elevation model, m
    Elevation,
    /// Surface water mask (1 = water, 0 = land)
    WaterMask,
    /// Clay content, %
    SoilClay,
    /// Bulk density, g/cm³
    SoilBulkDensity,
    /// Soil organic carbon, g/kg
    SoilOrganicCarbon,
    /// Total nitrogen, g/kg
    SoilNitrogen,
}

impl Dataset {
    /// Every dataset, in request order
    pub const ALL: [Dataset; 7] = [
        Dataset::Vegetation,
        Dataset::Elevation,
        Dataset::WaterMask,
        Dataset::SoilClay,
        Dataset::SoilBulkDensity,
        Dataset::SoilOrganicCarbon,
        Dataset::SoilNitrogen,
    ];

    /// Identifier used in logs and cache keys
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Dataset::Vegetation => "vegetation",
            Dataset::Elevation => "elevation",
            Dataset::WaterMask => "water_mask",
            Dataset::SoilClay => "soil_clay",
            Dataset::SoilBulkDensity => "soil_bulk_density",
            Dataset::SoilOrganicCarbon => "soil_organic_carbon",
            Dataset::SoilNitrogen => "soil_nitrogen",
        }
    }

    /// Cell fields derived from this dataset
    #[must_use]
    pub fn fields(self) -> &'static [DataField] {
        match self {
            Dataset::Vegetation => &[DataField::Vegetation],
            Dataset::Elevation => &[DataField::Slope, DataField::Aspect],
            Dataset::WaterMask => &[DataField::Water],
            Dataset::SoilClay => &[DataField::Clay],
            Dataset::SoilBulkDensity => &[DataField::BulkDensity],
            Dataset::SoilOrganicCarbon => &[DataField::Soc],
            Dataset::SoilNitrogen => &[DataField::Nitrogen],
        }
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One raster request covering a chunk
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterRequest {
    /// Area to cover
    pub bbox: BoundingBox,
    /// Dataset to read
    pub dataset: Dataset,
    /// Acquisition date
    pub date: NaiveDate,
    /// Time the provider may spend before giving up
    pub timeout: Duration,
}

/// Source of raster data.
///
/// Implementations must be safe to call from several worker threads at once.
/// Each call runs on its own thread; the fetcher stops waiting after
/// `request.timeout` and reports [`FetchError::Timeout`].
pub trait RasterProvider: Send + Sync {
    /// Provider name for logs
    fn name(&self) -> &str {
        "raster-provider"
    }

    /// Fetch one raster
    ///
    /// # Errors
    ///
    /// [`FetchError`] describing why the raster could not be produced.
    fn fetch(&self, request: &RasterRequest) -> Result<Raster, FetchError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_field_has_one_dataset() {
        for field in DataField::ALL {
            let owners = Dataset::ALL
                .iter()
                .filter(|d| d.fields().contains(&field))
                .count();
            assert_eq!(owners, 1, "{field} must come from exactly one dataset");
        }
    }
}
