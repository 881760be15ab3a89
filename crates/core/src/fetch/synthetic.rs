//! Deterministic offline raster provider
//!
//! Produces plausible, spatially smooth fields from seeded value noise so the
//! whole pipeline can run without network access. Values depend only on the
//! pixel position, the dataset and the seed, never on the request box, so
//! neighbouring chunks agree along their shared edges.

use super::provider::{Dataset, RasterProvider, RasterRequest};
use super::raster::Raster;
use crate::core_types::{fbm_2d, value_noise_2d, GeoPoint, EARTH_RADIUS_KM};
use crate::error::FetchError;

/// Kilometres per degree of latitude
const KM_PER_DEG: f64 = EARTH_RADIUS_KM * std::f64::consts::PI / 180.0;

/// Seeded synthetic landscape
#[derive(Debug, Clone)]
pub struct SyntheticRasterProvider {
    seed: u32,
    pixels_per_degree: f64,
    max_pixels_per_side: usize,
}

impl Default for SyntheticRasterProvider {
    fn default() -> Self {
        Self::new(7)
    }
}

impl SyntheticRasterProvider {
    /// Provider with ~250 m pixels
    #[must_use]
    pub fn new(seed: u32) -> Self {
        Self {
            seed,
            pixels_per_degree: 400.0,
            max_pixels_per_side: 512,
        }
    }

    /// Override the pixel density
    #[must_use]
    pub fn with_resolution(mut self, pixels_per_degree: f64) -> Self {
        self.pixels_per_degree = pixels_per_degree.max(1.0);
        self
    }

    fn seed_for(&self, dataset: Dataset) -> u32 {
        self.seed.wrapping_mul(97).wrapping_add(dataset as u32 * 1013)
    }

    /// Field value at a point
    #[must_use]
    pub fn value_at(&self, dataset: Dataset, point: GeoPoint) -> f64 {
        let y = point.lat * KM_PER_DEG;
        let x = point.lon * KM_PER_DEG * point.lat.to_radians().cos();
        let seed = self.seed_for(dataset);
        match dataset {
            Dataset::Vegetation => {
                (0.45 + 0.35 * fbm_2d(x, y, 20.0, 3, 0.5, seed)).clamp(-0.1, 0.95)
            }
            Dataset::Elevation => 250.0 + 300.0 * fbm_2d(x, y, 12.0, 4, 0.5, seed),
            Dataset::WaterMask => {
                if value_noise_2d(x, y, 6.0, seed) > 0.8 {
                    1.0
                } else {
                    0.0
                }
            }
            Dataset::SoilClay => 25.0 + 15.0 * fbm_2d(x, y, 25.0, 2, 0.5, seed),
            Dataset::SoilBulkDensity => 1.4 + 0.2 * fbm_2d(x, y, 25.0, 2, 0.5, seed),
            Dataset::SoilOrganicCarbon => 12.0 + 8.0 * fbm_2d(x, y, 18.0, 2, 0.5, seed),
            Dataset::SoilNitrogen => 1.2 + 0.6 * fbm_2d(x, y, 18.0, 2, 0.5, seed),
        }
    }
}

impl RasterProvider for SyntheticRasterProvider {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn fetch(&self, request: &RasterRequest) -> Result<Raster, FetchError> {
        let bbox = request.bbox;
        if !(bbox.height_deg() >= 0.0 && bbox.width_deg() >= 0.0) {
            return Err(FetchError::Provider(format!("invalid request box {bbox:?}")));
        }
        let side = |deg: f64| {
            ((deg * self.pixels_per_degree).ceil() as usize).clamp(3, self.max_pixels_per_side)
        };
        let width = side(bbox.width_deg());
        let height = side(bbox.height_deg());
        Ok(Raster::from_fn(bbox, width, height, |p| {
            Some(self.value_at(request.dataset, p))
        }))
    }
}
