//! Ecological data acquisition for grid cells
//!
//! Chunks are processed on a dedicated rayon pool sized to the provider's
//! concurrency limit. For each chunk one request per dataset covers the chunk
//! box; every cell then takes the mean of the pixels inside its own extent.
//! A dataset that still fails after the retry budget does not stop the run:
//! the cells of that chunk get the documented fallback and the field is
//! recorded in their `missing_data`.

use super::cache::RasterCache;
use super::chunk::Chunk;
use super::provider::{Dataset, RasterProvider, RasterRequest};
use super::raster::Raster;
use crate::config::FetchConfig;
use crate::core_types::BoundingBox;
use crate::error::{FetchError, PipelineError};
use crate::grid::{DataField, Grid, RasterSample};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Cooperative cancellation shared between the caller and the pipeline
#[derive(Debug, Clone, Default)]
pub struct AbortFlag(Arc<AtomicBool>);

impl AbortFlag {
    /// Flag in the lowered state
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the pipeline to stop at the next checkpoint
    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether an abort was requested
    #[must_use]
    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// What the fetch stage did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchReport {
    /// Chunks in the partition
    pub chunks: usize,
    /// Chunks actually processed
    pub chunks_processed: usize,
    /// Provider calls, retries included
    pub requests: usize,
    /// Retries after retryable failures
    pub retries: usize,
    /// Dataset requests that ended without a raster
    pub failures: usize,
    /// Dataset requests answered from the cache
    pub cache_hits: usize,
    /// Set when the abort flag stopped the stage early
    pub aborted: bool,
}

/// Samples for the cells of one chunk
#[derive(Debug, Default)]
struct ChunkOutcome {
    samples: Vec<(usize, RasterSample, BTreeSet<DataField>)>,
    requests: usize,
    retries: usize,
    failures: usize,
    cache_hits: usize,
}

/// Result of the fetch stage
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchOutcome {
    /// Counters
    pub report: FetchReport,
    /// Indices of cells that received a sample, ascending
    pub fetched_cells: Vec<usize>,
}

/// Fetches every dataset for every chunk of a grid
#[derive(Clone)]
pub struct EcologicalFetcher {
    provider: Arc<dyn RasterProvider>,
    cache: Arc<RasterCache>,
    config: FetchConfig,
    abort: AbortFlag,
}

impl EcologicalFetcher {
    /// Create a fetcher around an injected provider and cache
    #[must_use]
    pub fn new(
        provider: Arc<dyn RasterProvider>,
        cache: Arc<RasterCache>,
        config: FetchConfig,
        abort: AbortFlag,
    ) -> Self {
        Self {
            provider,
            cache,
            config,
            abort,
        }
    }

    /// Fetch all chunks and write samples into the grid cells.
    ///
    /// Cells of chunks skipped after an abort keep their fallback sample and
    /// are not listed in [`FetchOutcome::fetched_cells`].
    ///
    /// # Errors
    ///
    /// [`PipelineError::InvalidConfig`] if the worker pool cannot be built.
    pub fn fetch_grid(
        &self,
        grid: &mut Grid,
        chunks: &[Chunk],
    ) -> Result<FetchOutcome, PipelineError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.max_concurrent_requests)
            .build()
            .map_err(|e| {
                PipelineError::invalid_config("fetch.max_concurrent_requests", e.to_string())
            })?;
        info!(
            provider = self.provider.name(),
            chunks = chunks.len(),
            workers = self.config.max_concurrent_requests,
            "Fetching ecological data"
        );

        let shared: &Grid = grid;
        let outcomes: Vec<Option<ChunkOutcome>> = pool.install(|| {
            chunks
                .par_iter()
                .map(|chunk| {
                    if self.abort.is_raised() {
                        return None;
                    }
                    Some(self.process_chunk(shared, chunk))
                })
                .collect()
        });

        let mut report = FetchReport {
            chunks: chunks.len(),
            ..FetchReport::default()
        };
        let mut fetched_cells = Vec::new();
        for outcome in outcomes {
            let Some(outcome) = outcome else {
                report.aborted = true;
                continue;
            };
            report.chunks_processed += 1;
            report.requests += outcome.requests;
            report.retries += outcome.retries;
            report.failures += outcome.failures;
            report.cache_hits += outcome.cache_hits;
            for (index, sample, missing) in outcome.samples {
                let cell = &mut grid.cells[index];
                cell.sample = sample;
                cell.missing_data = missing;
                fetched_cells.push(index);
            }
        }
        fetched_cells.sort_unstable();

        if report.aborted {
            warn!(
                processed = report.chunks_processed,
                total = report.chunks,
                "Fetch aborted; remaining cells left unprocessed"
            );
        }
        info!(
            requests = report.requests,
            cache_hits = report.cache_hits,
            failures = report.failures,
            "Fetch complete"
        );
        Ok(FetchOutcome {
            report,
            fetched_cells,
        })
    }

    fn process_chunk(&self, grid: &Grid, chunk: &Chunk) -> ChunkOutcome {
        let mut outcome = ChunkOutcome::default();
        let mut samples: Vec<(usize, RasterSample, BTreeSet<DataField>)> = chunk
            .cell_indices
            .iter()
            .map(|&i| (i, RasterSample::FALLBACK, BTreeSet::new()))
            .collect();

        for dataset in Dataset::ALL {
            let request = RasterRequest {
                bbox: chunk.bbox,
                dataset,
                date: self.config.acquisition_date,
                timeout: self.config.timeout(),
            };
            let key = chunk.cache_key(dataset, self.config.acquisition_date);
            let (mut requests, mut retries) = (0, 0);
            let result = self.cache.get_or_fetch(&key, || {
                self.fetch_with_retry(&request, &mut requests, &mut retries)
            });
            outcome.requests += requests;
            outcome.retries += retries;

            match result {
                Ok((raster, hit)) => {
                    if hit {
                        outcome.cache_hits += 1;
                    }
                    for (index, sample, missing) in &mut samples {
                        let extent = grid.cells[*index].extent(&grid.frame);
                        apply_dataset(&raster, dataset, &extent, sample, missing);
                    }
                }
                Err(err) => {
                    outcome.failures += 1;
                    warn!(
                        chunk = chunk.id,
                        %dataset,
                        error = %err,
                        "Dataset unavailable; substituting fallbacks"
                    );
                    for (_, sample, missing) in &mut samples {
                        for &field in dataset.fields() {
                            sample.apply_fallback(field);
                            missing.insert(field);
                        }
                    }
                }
            }
        }

        debug!(chunk = chunk.id, cells = samples.len(), "Chunk fetched");
        outcome.samples = samples;
        outcome
    }

    /// Call the provider, retrying retryable failures with exponential backoff
    fn fetch_with_retry(
        &self,
        request: &RasterRequest,
        requests: &mut usize,
        retries: &mut usize,
    ) -> Result<Raster, FetchError> {
        let mut attempt = 0;
        loop {
            *requests += 1;
            match self.call_with_deadline(request) {
                Ok(raster) => return Ok(raster),
                Err(err) if err.is_retryable() && attempt < self.config.max_retries => {
                    attempt += 1;
                    *retries += 1;
                    let wait = self.config.backoff(attempt);
                    debug!(
                        dataset = %request.dataset,
                        attempt,
                        wait_ms = wait.as_millis(),
                        error = %err,
                        "Retrying raster request"
                    );
                    thread::sleep(wait);
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Run one provider call on its own thread and stop waiting at
    /// `request.timeout`. A call that overruns is abandoned; its result is
    /// dropped when it eventually arrives.
    fn call_with_deadline(&self, request: &RasterRequest) -> Result<Raster, FetchError> {
        let (tx, rx) = mpsc::channel();
        let provider = Arc::clone(&self.provider);
        let owned = *request;
        let started = Instant::now();
        thread::Builder::new()
            .name(format!("raster-{}", request.dataset))
            .spawn(move || {
                // The receiver is gone once the deadline has passed
                let _ = tx.send(provider.fetch(&owned));
            })
            .map_err(|e| FetchError::Provider(format!("cannot start request thread: {e}")))?;

        match rx.recv_timeout(request.timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(FetchError::Timeout {
                elapsed: started.elapsed(),
            }),
            Err(RecvTimeoutError::Disconnected) => {
                Err(FetchError::Provider("request thread ended without a result".into()))
            }
        }
    }
}

/// Reduce one dataset raster to the fields of a cell
fn apply_dataset(
    raster: &Raster,
    dataset: Dataset,
    extent: &BoundingBox,
    sample: &mut RasterSample,
    missing: &mut BTreeSet<DataField>,
) {
    if dataset == Dataset::Elevation {
        if let Some(terrain) = raster.terrain_within(extent) {
            sample.slope_deg = terrain.slope_deg;
            sample.aspect_deg = terrain.aspect_deg;
        } else {
            for &field in dataset.fields() {
                sample.apply_fallback(field);
                missing.insert(field);
            }
        }
        return;
    }

    let Some(value) = raster.mean_within(extent) else {
        for &field in dataset.fields() {
            sample.apply_fallback(field);
            missing.insert(field);
        }
        return;
    };
    match dataset {
        Dataset::Vegetation => sample.ndvi = value,
        Dataset::WaterMask => sample.water_fraction = value.clamp(0.0, 1.0),
        Dataset::SoilClay => sample.clay_pct = value,
        Dataset::SoilBulkDensity => sample.bulk_density_g_cm3 = value,
        Dataset::SoilOrganicCarbon => sample.soc_g_kg = value,
        Dataset::SoilNitrogen => sample.nitrogen_g_kg = value,
        Dataset::Elevation => {}
    }
}
