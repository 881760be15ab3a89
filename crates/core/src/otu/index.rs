//! Composite landing-zone index
//!
//! Each cell is scored from its raw raster statistics:
//!
//! - `Q_Vi`: normalised NDVI
//! - `Q_Si`: soil structure, `0.6·bulk_density + 0.4·clay`
//! - `Q_Bi`: soil biology, `0.7·SOC + 0.3·nitrogen`
//! - `Q_Relief`: slope, aspect and water modifier
//!
//! `Q_OTU = (k_vi·Q_Vi + k_si·Q_Si + k_bi·Q_Bi)·Q_Relief`, clipped to [0, 1].
//! `Q_Fire = 1 − Q_Vi^e` is reported separately as a fire-risk proxy.

use crate::config::{OtuConfig, ReliefParams};
use crate::grid::{GridCell, RasterSample};
use tracing::debug;

/// Sub-indices and composite for one cell
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OtuScores {
    /// Vegetation index
    pub q_vi: f64,
    /// Soil-structure index
    pub q_si: f64,
    /// Soil-biology index
    pub q_bi: f64,
    /// Relief modifier
    pub q_relief: f64,
    /// Composite index
    pub q_otu: f64,
    /// Fire-risk proxy
    pub q_fire: f64,
}

#[inline]
fn clip(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Deterministic scorer
#[derive(Debug, Clone, Copy, Default)]
pub struct OtuIndexCalculator {
    config: OtuConfig,
}

impl OtuIndexCalculator {
    /// Create a calculator from validated settings
    #[must_use]
    pub fn new(config: OtuConfig) -> Self {
        Self { config }
    }

    /// Relief modifier in [0, 1].
    ///
    /// Slope factor is 1 up to `flat_slope_deg` and falls linearly to 0 at
    /// `max_slope_deg`. Aspect factor is `1 − w·(1 − cos Δ)/2` where `Δ` is
    /// the angle from the preferred aspect, so facing directly away costs `w`.
    /// Missing aspect is neutral. Water at or above the threshold zeroes the
    /// modifier; below it the dry fraction scales it.
    #[must_use]
    pub fn relief(params: &ReliefParams, sample: &RasterSample) -> f64 {
        let water = clip(sample.water_fraction);
        if water >= params.water_threshold {
            return 0.0;
        }

        let slope = sample.slope_deg.abs();
        let slope_factor = if slope <= params.flat_slope_deg {
            1.0
        } else {
            1.0 - (slope - params.flat_slope_deg) / (params.max_slope_deg - params.flat_slope_deg)
        };

        let aspect_factor = sample.aspect_deg.map_or(1.0, |aspect| {
            let delta = (aspect - params.preferred_aspect_deg).to_radians();
            1.0 - params.aspect_weight * (1.0 - delta.cos()) / 2.0
        });

        clip(clip(slope_factor) * aspect_factor * (1.0 - water))
    }

    /// Scores for a raw sample
    #[must_use]
    pub fn scores(&self, sample: &RasterSample) -> OtuScores {
        let r = &self.config.ranges;
        let w = &self.config.weights;

        let q_vi = clip(r.ndvi.normalize(sample.ndvi));
        let q_si = clip(
            0.6 * r.bulk_density.normalize(sample.bulk_density_g_cm3)
                + 0.4 * r.clay.normalize(sample.clay_pct),
        );
        let q_bi = clip(
            0.7 * r.soc.normalize(sample.soc_g_kg)
                + 0.3 * r.nitrogen.normalize(sample.nitrogen_g_kg),
        );
        let q_relief = Self::relief(&self.config.relief, sample);
        let q_otu = Self::composite(w.k_vi, w.k_si, w.k_bi, q_vi, q_si, q_bi, q_relief);
        let q_fire = clip(1.0 - q_vi.powf(self.config.fire_exponent));

        OtuScores {
            q_vi,
            q_si,
            q_bi,
            q_relief,
            q_otu,
            q_fire,
        }
    }

    /// Weighted composite times relief, clipped
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn composite(
        k_vi: f64,
        k_si: f64,
        k_bi: f64,
        q_vi: f64,
        q_si: f64,
        q_bi: f64,
        q_relief: f64,
    ) -> f64 {
        clip((k_vi * q_vi + k_si * q_si + k_bi * q_bi) * q_relief)
    }

    /// Score a cell in place and mark it processed
    pub fn score(&self, cell: &mut GridCell) {
        let s = self.scores(&cell.sample);
        cell.q_vi = s.q_vi;
        cell.q_si = s.q_si;
        cell.q_bi = s.q_bi;
        cell.q_relief = s.q_relief;
        cell.q_otu = s.q_otu;
        cell.q_fire = s.q_fire;
        cell.is_processed = true;
    }

    /// Score the listed cells; returns how many were scored
    pub fn score_cells(&self, cells: &mut [GridCell], indices: &[usize]) -> usize {
        let mut scored = 0;
        for &i in indices {
            if let Some(cell) = cells.get_mut(i) {
                self.score(cell);
                scored += 1;
            }
        }
        debug!(scored, total = cells.len(), "Cells scored");
        scored
    }
}
