use clap::Parser;
use otu_core::config::PipelineConfig;
use otu_core::export::{
    cell_features, ellipse_features, feature_collection, impact_features, write_feature_collection,
    write_json,
};
use otu_core::{Kilometers, Pipeline, PipelineError, PipelineOutput, SyntheticRasterProvider};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Stage impact dispersion and landing-zone scoring
#[derive(Parser, Debug)]
#[command(name = "otu-headless")]
#[command(about = "Monte Carlo impact dispersion with OTU landing-zone scoring", long_about = None)]
struct Args {
    /// JSON configuration file (defaults are used for anything omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the number of Monte Carlo iterations
    #[arg(short = 'n', long)]
    iterations: Option<usize>,

    /// Override the Monte Carlo seed
    #[arg(short, long)]
    seed: Option<u64>,

    /// Override the grid cell size in km
    #[arg(long)]
    cell_size_km: Option<f64>,

    /// Seed of the synthetic raster landscape
    #[arg(long, default_value_t = 7)]
    landscape_seed: u32,

    /// Raster cache file, reused across runs
    #[arg(long)]
    cache: Option<PathBuf>,

    /// Directory for GeoJSON and summary output
    #[arg(short, long, default_value = "otu-output")]
    output: PathBuf,

    /// Verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn build_config(args: &Args) -> Result<PipelineConfig, PipelineError> {
    let mut config = match &args.config {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::default(),
    };
    if let Some(n) = args.iterations {
        config.simulation.iterations = n;
    }
    if let Some(seed) = args.seed {
        config.simulation.seed = seed;
    }
    if let Some(size) = args.cell_size_km {
        config.grid.cell_size_km = Kilometers::new(size);
    }
    if args.cache.is_some() {
        config.fetch.cache_path.clone_from(&args.cache);
    }
    config.validate()?;
    Ok(config)
}

fn write_outputs(
    dir: &Path,
    config: &PipelineConfig,
    output: &PipelineOutput,
) -> Result<(), PipelineError> {
    std::fs::create_dir_all(dir).map_err(|e| PipelineError::Export {
        path: dir.display().to_string(),
        reason: e.to_string(),
    })?;

    let vertices = config.ellipse.polygon_vertices;
    write_feature_collection(
        dir.join("ellipses.geojson"),
        &feature_collection(ellipse_features(&output.ellipses, vertices)),
    )?;

    let mut impacts = impact_features(&output.impacts.primary);
    impacts.extend(impact_features(&output.impacts.fragment));
    write_feature_collection(dir.join("impacts.geojson"), &feature_collection(impacts))?;

    let cells = feature_collection(cell_features(&output.grid));
    write_feature_collection(dir.join("cells.geojson"), &cells)?;

    let summary = serde_json::json!({
        "diagnostics": output.diagnostics,
        "primary_statistics": output.primary_statistics,
        "fragment_statistics": output.fragment_statistics,
        "filter_reports": output.filter_reports,
        "fetch_report": output.fetch_report,
        "cells": output.grid.len(),
        "processed_cells": output.processed_cells(),
    });
    write_json(dir.join("summary.json"), &summary)?;
    info!(dir = %dir.display(), "Outputs written");
    Ok(())
}

fn print_report(output: &PipelineOutput) {
    let d = &output.diagnostics;
    println!("=== Impact Dispersion ===\n");
    println!(
        "Samples: {} valid / {} total ({} diverged, {} breakups, {} fragment impacts){}",
        d.valid_samples,
        d.total_samples,
        d.invalid_samples,
        d.breakups,
        d.fragment_points,
        if d.degraded { "  [DEGRADED]" } else { "" }
    );
    if let Some(stats) = &output.primary_statistics {
        println!(
            "Primary: mean downrange {:.1} km, crossrange {:.1} km, CEP50 {:.1} km",
            stats.mean_downrange_km, stats.mean_crossrange_km, stats.cep50_km
        );
    }
    for e in &output.ellipses {
        println!(
            "{} ellipse ({}σ): {:.1} x {:.1} km, rotation {:.1}°, area {:.0} km²",
            e.kind,
            e.sigma_level,
            e.semi_major_km,
            e.semi_minor_km,
            e.rotation_deg,
            e.area_km2()
        );
    }

    let f = &output.fetch_report;
    println!("\n=== Landing Zone ===\n");
    println!(
        "Cells: {} ({:.0} km²), scored {}",
        output.grid.len(),
        output.grid.total_area_km2(),
        output.processed_cells()
    );
    println!(
        "Fetch: {} chunks, {} requests, {} cache hits, {} retries, {} failures{}",
        f.chunks,
        f.requests,
        f.cache_hits,
        f.retries,
        f.failures,
        if f.aborted { "  [ABORTED]" } else { "" }
    );
    if let Some(best) = output.best_cell() {
        println!(
            "Best cell #{} at ({:.4}, {:.4}): Q_OTU {:.3} \
             (Vi {:.2}, Si {:.2}, Bi {:.2}, relief {:.2})",
            best.id,
            best.center.lat,
            best.center.lon,
            best.q_otu,
            best.q_vi,
            best.q_si,
            best.q_bi,
            best.q_relief
        );
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.verbose);

    let config = match build_config(&args) {
        Ok(config) => config,
        Err(err) => {
            error!(error = %err, "Configuration rejected");
            eprintln!("error: {err}");
            return ExitCode::FAILURE;
        }
    };

    let provider = Arc::new(SyntheticRasterProvider::new(args.landscape_seed));
    let output = match Pipeline::new(config.clone(), provider).run() {
        Ok(output) => output,
        Err(err) => {
            error!(error = %err, "Pipeline failed");
            eprintln!("error: {err}");
            return ExitCode::FAILURE;
        }
    };

    print_report(&output);
    if let Err(err) = write_outputs(&args.output, &config, &output) {
        eprintln!("error: {err}");
        return ExitCode::FAILURE;
    }
    println!("\nWrote GeoJSON to {}", args.output.display());
    ExitCode::SUCCESS
}
