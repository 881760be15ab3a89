//! End-to-end tests for the dispersion and scoring pipeline
//!
//! Runs the full chain against the synthetic provider and checks the
//! properties every output must satisfy.

use otu_core::config::PipelineConfig;
use otu_core::export::{cell_features, ellipse_features, feature_collection, impact_features};
use otu_core::grid::MetricPolygon;
use otu_core::simulation::MonteCarloDriver;
use otu_core::{CloudKind, Kilometers, Pipeline, SyntheticRasterProvider};
use std::collections::HashSet;
use std::sync::Arc;

#[ctor::ctor]
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn test_config() -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.simulation.iterations = 200;
    config.simulation.seed = 2024;
    config.grid.cell_size_km = Kilometers::new(5.0);
    config.fetch.initial_backoff_ms = 1;
    config
}

fn driver(config: &PipelineConfig) -> MonteCarloDriver {
    MonteCarloDriver::new(&config.launch_site, config.stage.clone(), config.simulation.clone())
}

fn provider() -> Arc<SyntheticRasterProvider> {
    Arc::new(SyntheticRasterProvider::new(5).with_resolution(100.0))
}

#[test]
fn test_fixed_seed_is_bit_identical_across_thread_counts() {
    let mut config = test_config();
    config.simulation.iterations = 100;
    let driver = driver(&config);

    let single = rayon::ThreadPoolBuilder::new()
        .num_threads(1)
        .build()
        .unwrap()
        .install(|| driver.run());
    let many = rayon::ThreadPoolBuilder::new()
        .num_threads(4)
        .build()
        .unwrap()
        .install(|| driver.run());

    assert_eq!(single, many);
    assert_eq!(single.diagnostics.total_samples, 100);
    for (a, b) in single.impacts.primary.iter().zip(&many.impacts.primary) {
        assert_eq!(a.impact.lat.to_bits(), b.impact.lat.to_bits());
        assert_eq!(a.impact.lon.to_bits(), b.impact.lon.to_bits());
    }
}

#[test]
fn test_different_seeds_give_different_clouds() {
    let config = test_config();
    let mut other = test_config();
    other.simulation.seed += 1;
    let a = driver(&config).run();
    let b = driver(&other).run();
    assert_ne!(a.impacts.primary, b.impacts.primary);
}

#[test]
fn test_full_run_satisfies_grid_and_index_invariants() {
    let config = test_config();
    let output = Pipeline::new(config.clone(), provider()).run().unwrap();

    assert_eq!(output.ellipses[0].kind, CloudKind::Primary);
    assert!(output.ellipses.len() <= 2);
    assert_eq!(output.filter_reports.len(), output.ellipses.len());
    assert!(output.filter_reports[0].retained_fraction() >= config.filter.min_retained_fraction);

    let grid = &output.grid;
    assert!(!grid.is_empty());
    assert!(grid.len() <= config.grid.max_cells);

    // Same membership test the generator uses, in the grid frame
    let polygons: Vec<MetricPolygon> = output
        .ellipses
        .iter()
        .map(|e| e.metric_polygon(&grid.frame, config.ellipse.polygon_vertices))
        .map(|ring| MetricPolygon::new(ring).unwrap())
        .collect();
    let mut ids = HashSet::new();
    for cell in output.cells() {
        assert!(ids.insert(cell.id));
        assert!(polygons.iter().any(|p| p.contains(&cell.metric_center)));
        assert!(cell.is_processed);
        for q in [cell.q_vi, cell.q_si, cell.q_bi, cell.q_relief, cell.q_otu, cell.q_fire] {
            assert!((0.0..=1.0).contains(&q), "cell {} score {q}", cell.id);
        }
    }
    assert_eq!(output.processed_cells(), grid.len());
    assert!(output.best_cell().is_some());
    assert!(!output.fetch_report.aborted);
    assert_eq!(output.fetch_report.failures, 0);
}

#[test]
fn test_repeated_runs_produce_identical_output() {
    let a = Pipeline::new(test_config(), provider()).run().unwrap();
    let b = Pipeline::new(test_config(), provider()).run().unwrap();
    assert_eq!(a.impacts, b.impacts);
    assert_eq!(a.ellipses, b.ellipses);
    assert_eq!(a.grid, b.grid);
}

#[test]
fn test_geojson_covers_every_output() {
    let config = test_config();
    let output = Pipeline::new(config.clone(), provider()).run().unwrap();

    let ellipses = ellipse_features(&output.ellipses, config.ellipse.polygon_vertices);
    assert_eq!(ellipses.len(), output.ellipses.len());

    let impacts = impact_features(&output.impacts.primary);
    assert_eq!(impacts.len(), output.impacts.primary.len());

    let cells = feature_collection(cell_features(&output.grid));
    let features = cells["features"].as_array().unwrap();
    assert_eq!(features.len(), output.grid.len());
    let props = &features[0]["properties"];
    let keys = [
        "id",
        "q_vi",
        "q_si",
        "q_bi",
        "q_relief",
        "q_otu",
        "q_fire",
        "missing_data",
        "is_processed",
        "area_km2",
    ];
    for key in keys {
        assert!(!props[key].is_null(), "missing property {key}");
    }
}

#[test]
fn test_config_file_round_trip() {
    let config = test_config();
    let path = std::env::temp_dir().join(format!("otu-config-{}.json", std::process::id()));
    std::fs::write(&path, serde_json::to_string_pretty(&config).unwrap()).unwrap();
    let loaded = PipelineConfig::load(&path).unwrap();
    std::fs::remove_file(&path).ok();
    assert_eq!(loaded, config);
}
