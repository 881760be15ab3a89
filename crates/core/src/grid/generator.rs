//! Landing-zone grid generation
//!
//! All ellipse polygons are projected into one shared frame centred on the
//! centroid of the ellipse centres. A square lattice covers their union
//! bounding rectangle and every lattice centre is tested against every
//! polygon in that same frame; a cell is kept if it falls inside at least one.

use super::cell::{Grid, GridCell};
use super::polygon::MetricPolygon;
use crate::config::GridConfig;
use crate::core_types::{GeoPoint, LocalFrame, MetricPoint};
use crate::dispersion::DispersionEllipse;
use crate::error::PipelineError;
use tracing::{debug, info};

/// Lays out square cells inside dispersion ellipses
#[derive(Debug, Clone, Copy)]
pub struct GridGenerator {
    config: GridConfig,
    polygon_vertices: usize,
}

impl GridGenerator {
    /// Create a generator; ellipses are turned into `polygon_vertices`-gons
    #[must_use]
    pub fn new(config: GridConfig, polygon_vertices: usize) -> Self {
        Self {
            config,
            polygon_vertices,
        }
    }

    /// Generate the grid for a set of ellipses.
    ///
    /// # Errors
    ///
    /// * [`PipelineError::PolygonMembershipUnavailable`] if there are no
    ///   ellipses or an ellipse polygon is degenerate
    /// * [`PipelineError::CapacityExceeded`] if more than `max_cells` cells
    ///   would be accepted
    pub fn generate(&self, ellipses: &[DispersionEllipse]) -> Result<Grid, PipelineError> {
        let centers: Vec<GeoPoint> = ellipses.iter().map(|e| e.center).collect();
        let origin = GeoPoint::centroid(&centers).ok_or_else(|| {
            PipelineError::PolygonMembershipUnavailable {
                polygon: 0,
                reason: "no ellipse to build the grid from".to_string(),
            }
        })?;
        let frame = LocalFrame::new(origin);
        let rings: Vec<Vec<MetricPoint>> = ellipses
            .iter()
            .map(|e| e.metric_polygon(&frame, self.polygon_vertices))
            .collect();
        self.generate_in_frame(frame, rings)
    }

    /// Generate the grid for rings already expressed in `frame`.
    ///
    /// # Errors
    ///
    /// Same as [`Self::generate`].
    pub fn generate_in_frame(
        &self,
        frame: LocalFrame,
        rings: Vec<Vec<MetricPoint>>,
    ) -> Result<Grid, PipelineError> {
        if rings.is_empty() {
            return Err(PipelineError::PolygonMembershipUnavailable {
                polygon: 0,
                reason: "no polygon to build the grid from".to_string(),
            });
        }
        let polygons = rings
            .into_iter()
            .enumerate()
            .map(|(i, ring)| {
                MetricPolygon::new(ring).map_err(|defect| {
                    PipelineError::PolygonMembershipUnavailable {
                        polygon: i,
                        reason: defect.to_string(),
                    }
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut lo = MetricPoint::new(f64::INFINITY, f64::INFINITY);
        let mut hi = MetricPoint::new(f64::NEG_INFINITY, f64::NEG_INFINITY);
        for (plo, phi) in polygons.iter().map(MetricPolygon::bounds) {
            lo.x = lo.x.min(plo.x);
            lo.y = lo.y.min(plo.y);
            hi.x = hi.x.max(phi.x);
            hi.y = hi.y.max(phi.y);
        }

        let size = *self.config.cell_size_km;
        let cols = (((hi.x - lo.x) / size).ceil() as usize).max(1);
        let rows = (((hi.y - lo.y) / size).ceil() as usize).max(1);
        debug!(rows, cols, cell_size_km = size, "Candidate lattice");

        let mut cells = Vec::new();
        for row in 0..rows {
            let y = lo.y + (row as f64 + 0.5) * size;
            for col in 0..cols {
                let center = MetricPoint::new(lo.x + (col as f64 + 0.5) * size, y);
                if !polygons.iter().any(|p| p.contains(&center)) {
                    continue;
                }
                if cells.len() == self.config.max_cells {
                    return Err(PipelineError::CapacityExceeded {
                        cell_count: cells.len() + 1,
                        max_cells: self.config.max_cells,
                    });
                }
                cells.push(GridCell::new(cells.len(), row, col, center, size, &frame));
            }
        }

        info!(
            cells = cells.len(),
            polygons = polygons.len(),
            rows,
            cols,
            area_km2 = cells.len() as f64 * self.config.cell_size_km.squared(),
            "Grid generated"
        );
        Ok(Grid {
            frame,
            cell_size_km: size,
            rows,
            cols,
            cells,
        })
    }
}
