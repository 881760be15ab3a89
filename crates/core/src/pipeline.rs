//! End-to-end run: impacts → ellipses → grid → ecological data → OTU
//!
//! Stages run strictly in sequence. The abort flag is checked before each
//! stage and between fetch chunks; cells that were never fetched are returned
//! with `is_processed = false`.

use crate::config::PipelineConfig;
use crate::dispersion::{
    DispersionEllipse, DispersionEllipseEstimator, FilterReport, OutlierFilter, MIN_CLOUD_POINTS,
};
use crate::error::{CloudKind, PipelineError};
use crate::fetch::{
    AbortFlag, ChunkManager, EcologicalFetcher, FetchReport, RasterCache, RasterProvider,
};
use crate::grid::{Grid, GridCell, GridGenerator};
use crate::otu::OtuIndexCalculator;
use crate::simulation::{ImpactPointSet, ImpactStatistics, MonteCarloDriver, RunDiagnostics};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Everything a run produces
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineOutput {
    /// Valid impacts before outlier filtering
    pub impacts: ImpactPointSet,
    /// Summary of the primary cloud before filtering
    pub primary_statistics: Option<ImpactStatistics>,
    /// Summary of the fragment cloud before filtering
    pub fragment_statistics: Option<ImpactStatistics>,
    /// Primary ellipse first, then the fragment ellipse if one was fitted
    pub ellipses: Vec<DispersionEllipse>,
    /// Scored landing-zone grid
    pub grid: Grid,
    /// Monte Carlo counters
    pub diagnostics: RunDiagnostics,
    /// One report per filtered cloud
    pub filter_reports: Vec<FilterReport>,
    /// Fetch counters
    pub fetch_report: FetchReport,
}

impl PipelineOutput {
    /// Grid cells in id order
    #[must_use]
    pub fn cells(&self) -> &[GridCell] {
        &self.grid.cells
    }

    /// Number of cells that received scores
    #[must_use]
    pub fn processed_cells(&self) -> usize {
        self.grid.cells.iter().filter(|c| c.is_processed).count()
    }

    /// Highest-scoring processed cell
    #[must_use]
    pub fn best_cell(&self) -> Option<&GridCell> {
        self.grid
            .cells
            .iter()
            .filter(|c| c.is_processed)
            .max_by(|a, b| a.q_otu.total_cmp(&b.q_otu))
    }
}

/// Configured pipeline with its injected collaborators
pub struct Pipeline {
    config: PipelineConfig,
    provider: Arc<dyn RasterProvider>,
    cache: Option<Arc<RasterCache>>,
    abort: AbortFlag,
}

impl Pipeline {
    /// Create a pipeline. A cache is created (or loaded from
    /// `fetch.cache_path`) at run time unless one is supplied.
    #[must_use]
    pub fn new(config: PipelineConfig, provider: Arc<dyn RasterProvider>) -> Self {
        Self {
            config,
            provider,
            cache: None,
            abort: AbortFlag::new(),
        }
    }

    /// Share a raster cache with other runs
    pub fn with_cache(mut self, cache: Arc<RasterCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Use an externally controlled abort flag
    pub fn with_abort_flag(mut self, abort: AbortFlag) -> Self {
        self.abort = abort;
        self
    }

    /// Configuration in use
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    fn checkpoint(&self, stage: &'static str) -> Result<(), PipelineError> {
        if self.abort.is_raised() {
            warn!(stage, "Abort requested");
            return Err(PipelineError::Aborted { stage });
        }
        Ok(())
    }

    fn resolve_cache(&self) -> Result<Arc<RasterCache>, PipelineError> {
        if let Some(cache) = &self.cache {
            return Ok(Arc::clone(cache));
        }
        match &self.config.fetch.cache_path {
            Some(path) if path.exists() => Ok(Arc::new(RasterCache::load(path)?)),
            _ => Ok(Arc::new(RasterCache::new())),
        }
    }

    /// Filter one cloud and fit its ellipse
    fn fit_cloud(
        &self,
        kind: CloudKind,
        impacts: &ImpactPointSet,
    ) -> Result<(DispersionEllipse, FilterReport), PipelineError> {
        let (kept, report) =
            OutlierFilter::new(self.config.filter).apply(kind, impacts.cloud(kind))?;
        let ellipse = DispersionEllipseEstimator::new(self.config.ellipse).estimate(kind, &kept)?;
        Ok((ellipse, report))
    }

    /// Fragment ellipse, or `None` when the fragment cloud is empty, smaller
    /// than [`MIN_CLOUD_POINTS`] or degenerate after filtering
    fn fit_fragment_cloud(
        &self,
        impacts: &ImpactPointSet,
    ) -> Result<Option<(DispersionEllipse, FilterReport)>, PipelineError> {
        let fragments = impacts.fragment.len();
        if fragments == 0 {
            info!("No fragment impacts; primary ellipse only");
            return Ok(None);
        }
        if fragments < MIN_CLOUD_POINTS {
            warn!(
                fragments,
                minimum = MIN_CLOUD_POINTS,
                "Too few fragment impacts; skipping fragment ellipse"
            );
            return Ok(None);
        }
        match self.fit_cloud(CloudKind::Fragment, impacts) {
            Ok(fitted) => Ok(Some(fitted)),
            Err(err @ PipelineError::DegenerateSampleSet { .. }) => {
                warn!(error = %err, "Skipping fragment ellipse");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    /// Execute every stage.
    ///
    /// # Errors
    ///
    /// * [`PipelineError::InvalidConfig`] if the configuration does not validate
    /// * [`PipelineError::DegenerateSampleSet`] if the primary cloud cannot be fitted
    /// * [`PipelineError::PolygonMembershipUnavailable`] or
    ///   [`PipelineError::CapacityExceeded`] from grid generation
    /// * [`PipelineError::Cache`] if the persistent cache cannot be read or written
    /// * [`PipelineError::Aborted`] if the abort flag is raised before the fetch stage
    pub fn run(&self) -> Result<PipelineOutput, PipelineError> {
        let started = Instant::now();
        self.config.validate()?;

        // Stage 1: Monte Carlo
        self.checkpoint("monte_carlo")?;
        let driver = MonteCarloDriver::new(
            &self.config.launch_site,
            self.config.stage.clone(),
            self.config.simulation.clone(),
        );
        let run = driver.run();
        let primary_statistics = ImpactStatistics::from_samples(&run.impacts.primary);
        let fragment_statistics = ImpactStatistics::from_samples(&run.impacts.fragment);

        // Stage 2: outlier filter and ellipses
        self.checkpoint("dispersion")?;
        let mut ellipses = Vec::with_capacity(2);
        let mut filter_reports = Vec::with_capacity(2);

        let (primary, report) = self.fit_cloud(CloudKind::Primary, &run.impacts)?;
        ellipses.push(primary);
        filter_reports.push(report);

        if let Some((fragment, report)) = self.fit_fragment_cloud(&run.impacts)? {
            ellipses.push(fragment);
            filter_reports.push(report);
        }

        // Stage 3: grid
        self.checkpoint("grid")?;
        let mut grid = GridGenerator::new(self.config.grid, self.config.ellipse.polygon_vertices)
            .generate(&ellipses)?;

        // Stage 4: chunked fetch
        self.checkpoint("fetch")?;
        let cache = self.resolve_cache()?;
        let chunks = ChunkManager::new(self.config.fetch.chunk_cells_per_side).partition(&grid);
        let fetcher = EcologicalFetcher::new(
            Arc::clone(&self.provider),
            Arc::clone(&cache),
            self.config.fetch.clone(),
            self.abort.clone(),
        );
        let outcome = fetcher.fetch_grid(&mut grid, &chunks)?;
        if let Some(path) = &self.config.fetch.cache_path {
            cache.save(path)?;
        }

        // Stage 5: OTU scoring of fetched cells
        let scored = OtuIndexCalculator::new(self.config.otu)
            .score_cells(&mut grid.cells, &outcome.fetched_cells);

        info!(
            cells = grid.len(),
            scored,
            ellipses = ellipses.len(),
            aborted = outcome.report.aborted,
            elapsed_ms = started.elapsed().as_millis(),
            "Pipeline complete"
        );

        Ok(PipelineOutput {
            impacts: run.impacts,
            primary_statistics,
            fragment_statistics,
            ellipses,
            grid,
            diagnostics: run.diagnostics,
            filter_reports,
            fetch_report: outcome.report,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FragmentLaw, Perturbation};
    use crate::core_types::{GeoPoint, Kilometers};
    use crate::fetch::SyntheticRasterProvider;
    use crate::simulation::TrajectorySample;

    fn quick_config() -> PipelineConfig {
        let mut config = PipelineConfig::default();
        config.simulation.iterations = 150;
        config.simulation.seed = 11;
        config.grid.cell_size_km = Kilometers::new(5.0);
        config.fetch.initial_backoff_ms = 1;
        config
    }

    fn provider() -> Arc<SyntheticRasterProvider> {
        Arc::new(SyntheticRasterProvider::new(5).with_resolution(100.0))
    }

    fn fragment_at(iteration: usize, lat: f64, lon: f64) -> TrajectorySample {
        TrajectorySample {
            iteration,
            impact: GeoPoint::new(lat, lon),
            downrange_km: 0.0,
            crossrange_km: 0.0,
            is_fragment: true,
            valid: true,
            flight_time_s: None,
            impact_speed_m_s: None,
        }
    }

    #[test]
    fn test_fragment_cloud_below_minimum_is_skipped() {
        let pipeline = Pipeline::new(quick_config(), provider());
        let impacts = ImpactPointSet {
            primary: Vec::new(),
            fragment: vec![fragment_at(0, 46.0, 64.0), fragment_at(1, 46.1, 64.2)],
        };
        assert!(pipeline.fit_fragment_cloud(&impacts).unwrap().is_none());
        assert!(pipeline
            .fit_fragment_cloud(&ImpactPointSet::default())
            .unwrap()
            .is_none());

        let spread = ImpactPointSet {
            primary: Vec::new(),
            fragment: (0..12)
                .map(|i| {
                    let t = f64::from(i);
                    fragment_at(i as usize, 46.0 + 0.01 * t, 64.0 + 0.02 * (t * 1.7).sin())
                })
                .collect(),
        };
        let (ellipse, report) = pipeline.fit_fragment_cloud(&spread).unwrap().unwrap();
        assert_eq!(ellipse.kind, CloudKind::Fragment);
        assert_eq!(report.total, 12);
    }

    #[test]
    fn test_coincident_fragments_keep_primary_ellipse() {
        let mut config = quick_config();
        config.simulation.breakup.max_probability = 1.0;
        config.simulation.breakup.altitude_scale_m = 1.0;
        // Every fragment lands on the separation point
        config.simulation.fragments = FragmentLaw {
            poisson_lambda: 5.0,
            range_fraction: 0.0,
            along_track_sigma_km: 0.0,
            cross_track_sigma_km: 0.0,
        };

        let output = Pipeline::new(config, provider()).run().unwrap();
        assert!(output.impacts.fragment.len() >= MIN_CLOUD_POINTS);
        assert_eq!(output.ellipses.len(), 1);
        assert_eq!(output.ellipses[0].kind, CloudKind::Primary);
        assert_eq!(output.filter_reports.len(), 1);
        assert_eq!(output.processed_cells(), output.grid.len());
    }

    #[test]
    fn test_deterministic_primary_cloud_is_degenerate() {
        let mut config = quick_config();
        config.simulation.iterations = 50;
        config.simulation.mass_factor = Perturbation::Fixed { value: 1.0 };
        config.simulation.density_factor = Perturbation::Fixed { value: 1.0 };
        config.simulation.wind_east_m_s = Perturbation::Fixed { value: 0.0 };
        config.simulation.wind_north_m_s = Perturbation::Fixed { value: 0.0 };
        config.simulation.breakup.max_probability = 0.0;
        let sep = &mut config.stage.separation;
        for param in [
            &mut sep.altitude_m,
            &mut sep.velocity_m_s,
            &mut sep.flight_path_angle_deg,
            &mut sep.azimuth_deg,
        ] {
            param.std_dev = 0.0;
        }
        config.stage.cd_max = config.stage.cd_min;

        let err = Pipeline::new(config, provider()).run().unwrap_err();
        assert!(
            matches!(
                err,
                PipelineError::DegenerateSampleSet {
                    cloud: CloudKind::Primary,
                    ..
                }
            ),
            "unexpected error: {err}"
        );
    }

    #[test]
    fn test_invalid_config_is_rejected_before_running() {
        let mut config = quick_config();
        config.otu.weights.k_vi = 0.9;
        let err = Pipeline::new(config, Arc::new(SyntheticRasterProvider::default()))
            .run()
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidConfig { .. }));
    }

    #[test]
    fn test_pre_raised_abort_stops_first_stage() {
        let abort = AbortFlag::new();
        abort.raise();
        let err = Pipeline::new(quick_config(), Arc::new(SyntheticRasterProvider::default()))
            .with_abort_flag(abort)
            .run()
            .unwrap_err();
        assert!(matches!(err, PipelineError::Aborted { stage: "monte_carlo" }));
    }
}
