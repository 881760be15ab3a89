//! Georeferenced rasters and per-cell statistics

use crate::core_types::{BoundingBox, GeoPoint, EARTH_RADIUS_KM};
use crate::error::FetchError;
use serde::{Deserialize, Serialize};

/// Mean gradient below which a cell is treated as flat (no aspect)
const FLAT_GRADIENT: f64 = 1e-4;

/// Regular lat/lon raster, row 0 at the northern edge.
///
/// `None` pixels are no-data and are ignored by every statistic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Raster {
    bbox: BoundingBox,
    width: usize,
    height: usize,
    values: Vec<Option<f64>>,
}

/// Slope and aspect summary of a cell
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TerrainStats {
    /// Mean slope, degrees
    pub slope_deg: f64,
    /// Downslope direction of the mean gradient, degrees clockwise from north;
    /// `None` on flat ground
    pub aspect_deg: Option<f64>,
}

impl Raster {
    /// Wrap row-major pixel values.
    ///
    /// # Errors
    ///
    /// [`FetchError::Provider`] if the dimensions are empty or do not match the
    /// number of values.
    pub fn new(
        bbox: BoundingBox,
        width: usize,
        height: usize,
        values: Vec<Option<f64>>,
    ) -> Result<Self, FetchError> {
        if width == 0 || height == 0 || values.len() != width * height {
            return Err(FetchError::Provider(format!(
                "raster shape {width}x{height} does not match {} values",
                values.len()
            )));
        }
        Ok(Self {
            bbox,
            width,
            height,
            values,
        })
    }

    /// Build a raster by evaluating `f` at every pixel centre
    pub fn from_fn<F>(bbox: BoundingBox, width: usize, height: usize, mut f: F) -> Self
    where
        F: FnMut(GeoPoint) -> Option<f64>,
    {
        let width = width.max(1);
        let height = height.max(1);
        let mut values = Vec::with_capacity(width * height);
        let (dlat, dlon) = (
            bbox.height_deg() / height as f64,
            bbox.width_deg() / width as f64,
        );
        for row in 0..height {
            for col in 0..width {
                values.push(f(GeoPoint {
                    lat: bbox.max_lat - (row as f64 + 0.5) * dlat,
                    lon: bbox.min_lon + (col as f64 + 0.5) * dlon,
                }));
            }
        }
        Self {
            bbox,
            width,
            height,
            values,
        }
    }

    /// Area covered
    #[must_use]
    pub fn bbox(&self) -> &BoundingBox {
        &self.bbox
    }

    /// Pixel columns
    #[must_use]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Pixel rows
    #[must_use]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Pixel value, `None` for no-data or out of range
    #[must_use]
    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        if row >= self.height || col >= self.width {
            return None;
        }
        self.values[row * self.width + col].filter(|v| v.is_finite())
    }

    fn pixel_deg(&self) -> (f64, f64) {
        (
            self.bbox.height_deg() / self.height as f64,
            self.bbox.width_deg() / self.width as f64,
        )
    }

    /// Centre of pixel `(row, col)`
    #[must_use]
    pub fn pixel_center(&self, row: usize, col: usize) -> GeoPoint {
        let (dlat, dlon) = self.pixel_deg();
        GeoPoint {
            lat: self.bbox.max_lat - (row as f64 + 0.5) * dlat,
            lon: self.bbox.min_lon + (col as f64 + 0.5) * dlon,
        }
    }

    /// Pixel containing `point`, if any
    #[must_use]
    pub fn pixel_at(&self, point: &GeoPoint) -> Option<(usize, usize)> {
        if !self.bbox.contains(point) {
            return None;
        }
        let (dlat, dlon) = self.pixel_deg();
        let row = if dlat > 0.0 {
            ((self.bbox.max_lat - point.lat) / dlat) as usize
        } else {
            0
        };
        let col = if dlon > 0.0 {
            ((point.lon - self.bbox.min_lon) / dlon) as usize
        } else {
            0
        };
        Some((row.min(self.height - 1), col.min(self.width - 1)))
    }

    /// Pixels whose centres fall inside `area`; the pixel under the area's
    /// centre if none do
    fn pixels_in(&self, area: &BoundingBox) -> Vec<(usize, usize)> {
        let mut pixels = Vec::new();
        for row in 0..self.height {
            for col in 0..self.width {
                if area.contains(&self.pixel_center(row, col)) {
                    pixels.push((row, col));
                }
            }
        }
        if pixels.is_empty() {
            pixels.extend(self.pixel_at(&area.center()));
        }
        pixels
    }

    /// Mean of the valid pixels inside `area`, `None` if there are none
    #[must_use]
    pub fn mean_within(&self, area: &BoundingBox) -> Option<f64> {
        let (sum, n) = self
            .pixels_in(area)
            .into_iter()
            .filter_map(|(r, c)| self.get(r, c))
            .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
        (n > 0).then(|| sum / n as f64)
    }

    /// Horn (1981) 3×3 gradient at an interior pixel, (dz/dx east, dz/dy north)
    fn horn_gradient(&self, row: usize, col: usize) -> Option<(f64, f64)> {
        if row == 0 || col == 0 || row + 1 >= self.height || col + 1 >= self.width {
            return None;
        }
        let z = |dr: isize, dc: isize| {
            self.get(row.wrapping_add_signed(dr), col.wrapping_add_signed(dc))
        };
        let (nw, n, ne) = (z(-1, -1)?, z(-1, 0)?, z(-1, 1)?);
        let (w, e) = (z(0, -1)?, z(0, 1)?);
        let (sw, s, se) = (z(1, -1)?, z(1, 0)?, z(1, 1)?);

        let (dlat, dlon) = self.pixel_deg();
        let lat = self.pixel_center(row, col).lat.to_radians();
        let dy_m = dlat.to_radians() * EARTH_RADIUS_KM * 1000.0;
        let dx_m = dlon.to_radians() * EARTH_RADIUS_KM * 1000.0 * lat.cos();
        if dx_m <= 0.0 || dy_m <= 0.0 {
            return None;
        }

        let dz_dx = ((ne + 2.0 * e + se) - (nw + 2.0 * w + sw)) / (8.0 * dx_m);
        let dz_dy = ((nw + 2.0 * n + ne) - (sw + 2.0 * s + se)) / (8.0 * dy_m);
        Some((dz_dx, dz_dy))
    }

    /// Slope and aspect of an elevation raster inside `area`
    #[must_use]
    pub fn terrain_within(&self, area: &BoundingBox) -> Option<TerrainStats> {
        let gradients: Vec<(f64, f64)> = self
            .pixels_in(area)
            .into_iter()
            .filter_map(|(r, c)| self.horn_gradient(r, c))
            .collect();
        if gradients.is_empty() {
            return None;
        }
        let n = gradients.len() as f64;
        let slope_deg = gradients
            .iter()
            .map(|(gx, gy)| gx.hypot(*gy).atan().to_degrees())
            .sum::<f64>()
            / n;
        let gx = gradients.iter().map(|g| g.0).sum::<f64>() / n;
        let gy = gradients.iter().map(|g| g.1).sum::<f64>() / n;
        let aspect_deg = (gx.hypot(gy) >= FLAT_GRADIENT)
            .then(|| (-gx).atan2(-gy).to_degrees().rem_euclid(360.0));
        Some(TerrainStats {
            slope_deg,
            aspect_deg,
        })
    }
}
