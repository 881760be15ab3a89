//! GeoJSON output for ellipses, impact points and scored cells
//!
//! Coordinates are written `[lon, lat]` and polygon rings are closed.

use crate::core_types::GeoPoint;
use crate::dispersion::DispersionEllipse;
use crate::error::PipelineError;
use crate::grid::Grid;
use crate::simulation::TrajectorySample;
use serde::Serialize;
use serde_json::{json, Value};
use std::fs;
use std::path::Path;
use tracing::info;

fn position(p: &GeoPoint) -> Value {
    json!([p.lon, p.lat])
}

/// Closed linear ring from an open vertex list
fn ring(points: &[GeoPoint]) -> Vec<Value> {
    let mut ring: Vec<Value> = points.iter().map(position).collect();
    if let Some(first) = points.first() {
        ring.push(position(first));
    }
    ring
}

/// Wrap features in a `FeatureCollection`
#[must_use]
pub fn feature_collection(features: Vec<Value>) -> Value {
    json!({
        "type": "FeatureCollection",
        "features": features,
    })
}

/// One polygon feature per ellipse
#[must_use]
pub fn ellipse_features(ellipses: &[DispersionEllipse], vertices: usize) -> Vec<Value> {
    ellipses
        .iter()
        .map(|e| {
            json!({
                "type": "Feature",
                "geometry": {
                    "type": "Polygon",
                    "coordinates": [ring(&e.geographic_polygon(vertices))],
                },
                "properties": {
                    "type": e.kind.as_str(),
                    "semi_major_km": e.semi_major_km,
                    "semi_minor_km": e.semi_minor_km,
                    "rotation_deg": e.rotation_deg,
                    "sigma_level": e.sigma_level,
                    "point_count": e.point_count,
                    "area_km2": e.area_km2(),
                },
            })
        })
        .collect()
}

/// One point feature per impact
#[must_use]
pub fn impact_features(samples: &[TrajectorySample]) -> Vec<Value> {
    samples
        .iter()
        .map(|s| {
            let kind = if s.is_fragment { "fragment" } else { "primary" };
            json!({
                "type": "Feature",
                "geometry": {
                    "type": "Point",
                    "coordinates": position(&s.impact),
                },
                "properties": {
                    "type": kind,
                    "iteration": s.iteration,
                    "downrange_km": s.downrange_km,
                    "crossrange_km": s.crossrange_km,
                },
            })
        })
        .collect()
}

/// One polygon feature per grid cell with its scores
#[must_use]
pub fn cell_features(grid: &Grid) -> Vec<Value> {
    grid.cells
        .iter()
        .map(|cell| {
            json!({
                "type": "Feature",
                "geometry": {
                    "type": "Polygon",
                    "coordinates": [ring(&cell.corners(&grid.frame))],
                },
                "properties": {
                    "id": cell.id,
                    "q_vi": cell.q_vi,
                    "q_si": cell.q_si,
                    "q_bi": cell.q_bi,
                    "q_relief": cell.q_relief,
                    "q_otu": cell.q_otu,
                    "q_fire": cell.q_fire,
                    "missing_data": cell.missing_names(),
                    "is_processed": cell.is_processed,
                    "area_km2": cell.area_km2,
                },
            })
        })
        .collect()
}

/// Pretty-print any serialisable value to `path`
///
/// # Errors
/// Returns [`PipelineError::Export`] if serialisation or the write fails
pub fn write_json<P: AsRef<Path>, T: Serialize + ?Sized>(
    path: P,
    value: &T,
) -> Result<(), PipelineError> {
    let path = path.as_ref();
    let export_error = |reason: String| PipelineError::Export {
        path: path.display().to_string(),
        reason,
    };
    let contents = serde_json::to_string_pretty(value).map_err(|e| export_error(e.to_string()))?;
    fs::write(path, contents).map_err(|e| export_error(e.to_string()))
}

/// Pretty-print a GeoJSON value to `path`
///
/// # Errors
/// Returns [`PipelineError::Export`] if serialisation or the write fails
pub fn write_feature_collection<P: AsRef<Path>>(
    path: P,
    value: &Value,
) -> Result<(), PipelineError> {
    let path = path.as_ref();
    write_json(path, value)?;
    let features = value["features"].as_array().map_or(0, Vec::len);
    info!(path = %path.display(), features, "GeoJSON written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_types::{LocalFrame, MetricPoint};
    use crate::error::CloudKind;
    use crate::fetch::FetchReport;
    use crate::grid::{DataField, GridCell};

    fn ellipse() -> DispersionEllipse {
        DispersionEllipse {
            center: GeoPoint::new(46.5, 64.2),
            semi_major_km: 12.0,
            semi_minor_km: 4.0,
            rotation_deg: 30.0,
            sigma_level: 3.0,
            kind: CloudKind::Primary,
            point_count: 100,
        }
    }

    #[test]
    fn test_ellipse_ring_is_closed() {
        let features = ellipse_features(&[ellipse()], 36);
        let ring = features[0]["geometry"]["coordinates"][0].as_array().unwrap();
        assert_eq!(ring.len(), 37);
        assert_eq!(ring.first(), ring.last());
        assert_eq!(features[0]["properties"]["type"], "primary");
        assert_eq!(features[0]["properties"]["semi_major_km"], 12.0);
    }

    #[test]
    fn test_cell_properties() {
        let frame = LocalFrame::new(GeoPoint::new(46.0, 64.0));
        let mut cell = GridCell::new(7, 0, 0, MetricPoint::new(0.5, 0.5), 1.0, &frame);
        cell.mark_missing(DataField::Vegetation);
        cell.q_otu = 0.42;
        let grid = Grid {
            frame,
            cell_size_km: 1.0,
            rows: 1,
            cols: 1,
            cells: vec![cell],
        };
        let fc = feature_collection(cell_features(&grid));
        let props = &fc["features"][0]["properties"];
        assert_eq!(fc["type"], "FeatureCollection");
        assert_eq!(props["id"], 7);
        assert_eq!(props["q_otu"], 0.42);
        assert_eq!(props["missing_data"], json!(["vegetation"]));
        assert_eq!(props["is_processed"], false);
        assert_eq!(fc["features"][0]["geometry"]["coordinates"][0].as_array().unwrap().len(), 5);
    }

    #[test]
    fn test_write_and_read_back() {
        let path = std::env::temp_dir().join(format!("otu-export-{}.geojson", std::process::id()));
        let fc = feature_collection(ellipse_features(&[ellipse()], 16));
        write_feature_collection(&path, &fc).unwrap();
        let read: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(read["features"].as_array().unwrap().len(), 1);
        assert_eq!(read["features"][0]["properties"]["sigma_level"], 3.0);
        assert!(write_feature_collection("/nonexistent/dir/out.geojson", &fc).is_err());
    }

    #[test]
    fn test_write_json_round_trips_reports() {
        let path = std::env::temp_dir().join(format!("otu-summary-{}.json", std::process::id()));
        let report = FetchReport {
            chunks: 3,
            chunks_processed: 3,
            requests: 21,
            ..FetchReport::default()
        };
        write_json(&path, &report).unwrap();
        let back: FetchReport =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(back, report);

        let err = write_json("/nonexistent/dir/summary.json", &report).unwrap_err();
        match err {
            PipelineError::Export { path, .. } => assert!(path.ends_with("summary.json")),
            other => panic!("unexpected error: {other}"),
        }
    }
}
