//! Partitioning the grid into provider-sized tiles

use super::cache::CacheKey;
use super::provider::Dataset;
use crate::core_types::BoundingBox;
use crate::grid::Grid;
use chrono::NaiveDate;
use std::collections::BTreeMap;
use tracing::debug;

/// Contiguous square tile of lattice cells
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// Sequential chunk id
    pub id: usize,
    /// Tile row in chunk units
    pub tile_row: usize,
    /// Tile column in chunk units
    pub tile_col: usize,
    /// Geographic extent of all member cells
    pub bbox: BoundingBox,
    /// Indices into `Grid::cells`
    pub cell_indices: Vec<usize>,
}

impl Chunk {
    /// Cache key for one dataset of this chunk
    #[must_use]
    pub fn cache_key(&self, dataset: Dataset, date: NaiveDate) -> CacheKey {
        CacheKey::new(&self.bbox, dataset, date)
    }
}

/// Splits a grid into tiles of at most `cells_per_side²` cells
#[derive(Debug, Clone, Copy)]
pub struct ChunkManager {
    cells_per_side: usize,
}

impl ChunkManager {
    /// Create a manager; a side of zero is treated as one
    #[must_use]
    pub fn new(cells_per_side: usize) -> Self {
        Self {
            cells_per_side: cells_per_side.max(1),
        }
    }

    /// Maximum cells per chunk
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.cells_per_side * self.cells_per_side
    }

    /// Partition the accepted cells, ordered by tile row then tile column
    #[must_use]
    pub fn partition(&self, grid: &Grid) -> Vec<Chunk> {
        let n = self.cells_per_side;
        let mut tiles: BTreeMap<(usize, usize), (BoundingBox, Vec<usize>)> = BTreeMap::new();
        for (index, cell) in grid.cells.iter().enumerate() {
            let extent = cell.extent(&grid.frame);
            tiles
                .entry((cell.row / n, cell.col / n))
                .and_modify(|(bbox, members)| {
                    *bbox = bbox.union(&extent);
                    members.push(index);
                })
                .or_insert_with(|| (extent, vec![index]));
        }

        let chunks: Vec<Chunk> = tiles
            .into_iter()
            .enumerate()
            .map(|(id, ((tile_row, tile_col), (bbox, cell_indices)))| Chunk {
                id,
                tile_row,
                tile_col,
                bbox,
                cell_indices,
            })
            .collect();
        debug!(
            chunks = chunks.len(),
            cells = grid.len(),
            capacity = self.capacity(),
            "Grid partitioned"
        );
        chunks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_types::{GeoPoint, LocalFrame, MetricPoint};
    use crate::grid::GridCell;
    use std::collections::HashSet;

    fn square_grid(side: usize) -> Grid {
        let frame = LocalFrame::new(GeoPoint::new(46.0, 64.0));
        let mut cells = Vec::new();
        for row in 0..side {
            for col in 0..side {
                let center = MetricPoint::new(col as f64 + 0.5, row as f64 + 0.5);
                cells.push(GridCell::new(cells.len(), row, col, center, 1.0, &frame));
            }
        }
        Grid {
            frame,
            cell_size_km: 1.0,
            rows: side,
            cols: side,
            cells,
        }
    }

    #[test]
    fn test_partition_respects_capacity_and_covers_all() {
        let grid = square_grid(25);
        let manager = ChunkManager::new(10);
        let chunks = manager.partition(&grid);
        assert_eq!(chunks.len(), 9);
        let mut seen = HashSet::new();
        for chunk in &chunks {
            assert!(chunk.cell_indices.len() <= manager.capacity());
            for &i in &chunk.cell_indices {
                assert!(seen.insert(i));
                assert!(chunk.bbox.contains(&grid.cells[i].center));
            }
        }
        assert_eq!(seen.len(), grid.len());
        assert_eq!(chunks[0].cell_indices.len(), 100);
        assert_eq!(chunks[8].cell_indices.len(), 25);
    }

    #[test]
    fn test_same_chunk_same_key() {
        let grid = square_grid(4);
        let chunks = ChunkManager::new(2).partition(&grid);
        let date = NaiveDate::from_ymd_opt(2024, 7, 1).unwrap();
        assert_eq!(
            chunks[0].cache_key(Dataset::Vegetation, date),
            chunks[0].cache_key(Dataset::Vegetation, date)
        );
        assert_ne!(
            chunks[0].cache_key(Dataset::Vegetation, date),
            chunks[1].cache_key(Dataset::Vegetation, date)
        );
        assert_ne!(
            chunks[0].cache_key(Dataset::Vegetation, date),
            chunks[0].cache_key(Dataset::SoilClay, date)
        );
    }
}
