//! Grid cells and the per-cell ecological sample

use crate::core_types::{BoundingBox, GeoPoint, LocalFrame, MetricPoint};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Ecological field that can be missing from a cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataField {
    /// NDVI
    Vegetation,
    /// Terrain slope
    Slope,
    /// Terrain aspect
    Aspect,
    /// Surface water fraction
    Water,
    /// Clay content
    Clay,
    /// Bulk density
    BulkDensity,
    /// Soil organic carbon
    Soc,
    /// Total nitrogen
    Nitrogen,
}

impl DataField {
    /// Every field, in reporting order
    pub const ALL: [DataField; 8] = [
        DataField::Vegetation,
        DataField::Slope,
        DataField::Aspect,
        DataField::Water,
        DataField::Clay,
        DataField::BulkDensity,
        DataField::Soc,
        DataField::Nitrogen,
    ];

    /// Name recorded in `missing_data`
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            DataField::Vegetation => "vegetation",
            DataField::Slope => "slope",
            DataField::Aspect => "aspect",
            DataField::Water => "water",
            DataField::Clay => "clay",
            DataField::BulkDensity => "bulk_density",
            DataField::Soc => "soc",
            DataField::Nitrogen => "nitrogen",
        }
    }
}

impl fmt::Display for DataField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw per-cell statistics feeding the OTU index
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RasterSample {
    /// Mean NDVI
    pub ndvi: f64,
    /// Mean terrain slope, degrees
    pub slope_deg: f64,
    /// Mean downslope direction, degrees clockwise from north; `None` on flat ground
    pub aspect_deg: Option<f64>,
    /// Fraction of the cell covered by water, [0, 1]
    pub water_fraction: f64,
    /// Clay content, %
    pub clay_pct: f64,
    /// Bulk density, g/cm³
    pub bulk_density_g_cm3: f64,
    /// Soil organic carbon, g/kg
    pub soc_g_kg: f64,
    /// Total nitrogen, g/kg
    pub nitrogen_g_kg: f64,
}

impl RasterSample {
    /// Values substituted for fields that could not be fetched
    pub const FALLBACK: RasterSample = RasterSample {
        ndvi: 0.3,
        slope_deg: 0.0,
        aspect_deg: None,
        water_fraction: 0.0,
        clay_pct: 25.0,
        bulk_density_g_cm3: 1.35,
        soc_g_kg: 10.0,
        nitrogen_g_kg: 1.0,
    };

    /// Replace one field with its fallback value
    pub fn apply_fallback(&mut self, field: DataField) {
        let fb = Self::FALLBACK;
        match field {
            DataField::Vegetation => self.ndvi = fb.ndvi,
            DataField::Slope => self.slope_deg = fb.slope_deg,
            DataField::Aspect => self.aspect_deg = fb.aspect_deg,
            DataField::Water => self.water_fraction = fb.water_fraction,
            DataField::Clay => self.clay_pct = fb.clay_pct,
            DataField::BulkDensity => self.bulk_density_g_cm3 = fb.bulk_density_g_cm3,
            DataField::Soc => self.soc_g_kg = fb.soc_g_kg,
            DataField::Nitrogen => self.nitrogen_g_kg = fb.nitrogen_g_kg,
        }
    }
}

impl Default for RasterSample {
    fn default() -> Self {
        Self::FALLBACK
    }
}

/// One square landing-zone cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridCell {
    /// Sequential id in row-major lattice order
    pub id: usize,
    /// Lattice row (south to north)
    pub row: usize,
    /// Lattice column (west to east)
    pub col: usize,
    /// Cell centre
    pub center: GeoPoint,
    /// Cell centre in the grid frame, km
    pub metric_center: MetricPoint,
    /// Side length, km
    pub size_km: f64,
    /// Cell area, km²
    pub area_km2: f64,
    /// Vegetation index
    pub q_vi: f64,
    /// Soil-structure index
    pub q_si: f64,
    /// Soil-biology index
    pub q_bi: f64,
    /// Relief modifier
    pub q_relief: f64,
    /// Composite OTU index
    pub q_otu: f64,
    /// Fire-risk proxy
    pub q_fire: f64,
    /// Fields that fell back to defaults
    pub missing_data: BTreeSet<DataField>,
    /// Whether the cell has been scored
    pub is_processed: bool,
    /// Raw statistics the indices were computed from
    pub sample: RasterSample,
}

impl GridCell {
    /// New unscored cell
    #[must_use]
    pub fn new(
        id: usize,
        row: usize,
        col: usize,
        metric_center: MetricPoint,
        size_km: f64,
        frame: &LocalFrame,
    ) -> Self {
        Self {
            id,
            row,
            col,
            center: frame.to_geographic(&metric_center),
            metric_center,
            size_km,
            area_km2: size_km * size_km,
            q_vi: 0.0,
            q_si: 0.0,
            q_bi: 0.0,
            q_relief: 0.0,
            q_otu: 0.0,
            q_fire: 0.0,
            missing_data: BTreeSet::new(),
            is_processed: false,
            sample: RasterSample::FALLBACK,
        }
    }

    /// Square corners in the grid frame, counter-clockwise from south-west
    #[must_use]
    pub fn metric_corners(&self) -> [MetricPoint; 4] {
        let h = self.size_km / 2.0;
        let c = self.metric_center;
        [
            MetricPoint::new(c.x - h, c.y - h),
            MetricPoint::new(c.x + h, c.y - h),
            MetricPoint::new(c.x + h, c.y + h),
            MetricPoint::new(c.x - h, c.y + h),
        ]
    }

    /// Square corners in geographic coordinates
    #[must_use]
    pub fn corners(&self, frame: &LocalFrame) -> [GeoPoint; 4] {
        self.metric_corners().map(|p| frame.to_geographic(&p))
    }

    /// Geographic bounding box of the cell square
    #[must_use]
    pub fn extent(&self, frame: &LocalFrame) -> BoundingBox {
        let corners = self.corners(frame);
        BoundingBox::from_points(&corners).unwrap_or_else(|| {
            BoundingBox::new(self.center.lat, self.center.lon, self.center.lat, self.center.lon)
        })
    }

    /// Record a field as missing and substitute its fallback
    pub fn mark_missing(&mut self, field: DataField) {
        self.sample.apply_fallback(field);
        self.missing_data.insert(field);
    }

    /// Missing field names in order
    #[must_use]
    pub fn missing_names(&self) -> Vec<&'static str> {
        self.missing_data.iter().map(|f| f.as_str()).collect()
    }
}

/// Accepted cells and the frame they were laid out in
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grid {
    /// Shared metric frame
    pub frame: LocalFrame,
    /// Cell side length, km
    pub cell_size_km: f64,
    /// Lattice rows
    pub rows: usize,
    /// Lattice columns
    pub cols: usize,
    /// Accepted cells, ordered by id
    pub cells: Vec<GridCell>,
}

impl Grid {
    /// Number of accepted cells
    #[must_use]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Whether no cell was accepted
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Total accepted area, km²
    #[must_use]
    pub fn total_area_km2(&self) -> f64 {
        self.cells.iter().map(|c| c.area_km2).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_mark_missing_applies_fallback() {
        let frame = LocalFrame::new(GeoPoint::new(47.0, 66.0));
        let mut cell = GridCell::new(0, 0, 0, MetricPoint::new(0.0, 0.0), 1.0, &frame);
        cell.sample.ndvi = 0.8;
        cell.mark_missing(DataField::Vegetation);
        cell.mark_missing(DataField::Clay);
        assert_eq!(cell.sample.ndvi, 0.3);
        assert_eq!(cell.missing_names(), vec!["vegetation", "clay"]);
    }

    #[test]
    fn test_cell_extent_brackets_center() {
        let frame = LocalFrame::new(GeoPoint::new(47.0, 66.0));
        let cell = GridCell::new(3, 1, 2, MetricPoint::new(10.0, -5.0), 2.0, &frame);
        let bbox = cell.extent(&frame);
        assert!(bbox.contains(&cell.center));
        // 2 km is roughly 0.018 degrees of latitude
        assert_abs_diff_eq!(bbox.height_deg(), 2.0 / 111.2, epsilon = 1e-3);
        assert_eq!(cell.area_km2, 4.0);
    }

    #[test]
    fn test_field_names_serialize_snake_case() {
        let json = serde_json::to_string(&DataField::BulkDensity).unwrap();
        assert_eq!(json, "\"bulk_density\"");
        assert_eq!(DataField::ALL.len(), 8);
    }
}
