//! Ecological raster acquisition
//!
//! Chunking, the provider seam, the shared cache and the concurrent fetcher
//! that fills [`crate::grid::GridCell`] samples.

pub mod cache;
pub mod chunk;
pub mod fetcher;
pub mod provider;
pub mod raster;
pub mod synthetic;

pub use cache::{CacheKey, CacheStats, RasterCache};
pub use chunk::{Chunk, ChunkManager};
pub use fetcher::{AbortFlag, EcologicalFetcher, FetchOutcome, FetchReport};
pub use provider::{Dataset, RasterProvider, RasterRequest};
pub use raster::{Raster, TerrainStats};
pub use synthetic::SyntheticRasterProvider;
