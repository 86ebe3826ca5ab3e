use std::collections::HashSet;

use crate::mosaic::catalog::ZoomLevel;

/// One decoded tile, RGBA8.
#[derive(Debug, Clone, PartialEq)]
pub struct Tile {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

/// Demand-paged tile cache for the currently selected zoom level.
///
/// Two parallel row-major arrays sized exactly rows x cols: the resident
/// tiles and the in-flight flags. `pending[cell] == true` means exactly one
/// fetch is outstanding for that cell.
///
/// The grid is not synchronized. All mutation must happen on the single
/// controller-owning context; fetch completions re-enter through the
/// controller carrying the epoch they were issued under, and completions
/// from before the most recent `reset` are discarded wholesale.
#[derive(Debug, Default)]
pub struct TileGrid {
    rows: usize,
    cols: usize,
    epoch: u64,
    tiles: Vec<Option<Tile>>,
    pending: Vec<bool>,
}

impl TileGrid {
    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Identifies the current grid generation. Bumped on every `reset`;
    /// a fetch outcome is only applied if its epoch still matches.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Throw away both arrays and reallocate them for `level`'s shape.
    ///
    /// Previously pending fetches become orphaned: their completions carry
    /// the old epoch and are ignored on arrival.
    pub fn reset(&mut self, level: &ZoomLevel) {
        self.rows = level.rows;
        self.cols = level.cols;
        self.epoch += 1;
        self.tiles = vec![None; level.rows * level.cols];
        self.pending = vec![false; level.rows * level.cols];
    }

    pub fn get(&self, row: usize, col: usize) -> Option<&Tile> {
        let index = self.cell_index(row, col)?;
        self.tiles[index].as_ref()
    }

    /// Store a decoded tile. Silently drops the tile if `epoch` is stale
    /// (the grid was reset since the fetch was issued) or the cell is out
    /// of bounds for the current shape.
    pub fn put(&mut self, epoch: u64, row: usize, col: usize, tile: Tile) {
        if epoch != self.epoch {
            return;
        }
        if let Some(index) = self.cell_index(row, col) {
            self.tiles[index] = Some(tile);
        }
    }

    pub fn is_pending(&self, row: usize, col: usize) -> bool {
        self.cell_index(row, col)
            .map(|index| self.pending[index])
            .unwrap_or(false)
    }

    pub fn mark_pending(&mut self, row: usize, col: usize) {
        if let Some(index) = self.cell_index(row, col) {
            self.pending[index] = true;
        }
    }

    /// Clear the in-flight flag for a completed fetch. Epoch-guarded so a
    /// stale completion cannot clear the flag of a newer fetch for the
    /// same cell.
    pub fn clear_pending(&mut self, epoch: u64, row: usize, col: usize) {
        if epoch != self.epoch {
            return;
        }
        if let Some(index) = self.cell_index(row, col) {
            self.pending[index] = false;
        }
    }

    /// Remove every resident tile whose coordinates are not in `keep`.
    ///
    /// In-flight fetches for evicted cells are not cancelled; a late
    /// result is simply stored and swept again on the next pass if still
    /// out of view. Returns the number of tiles dropped.
    pub fn evict(&mut self, keep: &HashSet<(usize, usize)>) -> usize {
        let mut dropped = 0;
        for row in 0..self.rows {
            for col in 0..self.cols {
                if keep.contains(&(row, col)) {
                    continue;
                }
                let index = row * self.cols + col;
                if self.tiles[index].take().is_some() {
                    dropped += 1;
                }
            }
        }
        dropped
    }

    /// Iterate over resident tiles in row-major order.
    pub fn resident(&self) -> impl Iterator<Item = (usize, usize, &Tile)> + '_ {
        self.tiles.iter().enumerate().filter_map(move |(i, slot)| {
            let tile = slot.as_ref()?;
            Some((i / self.cols, i % self.cols, tile))
        })
    }

    fn cell_index(&self, row: usize, col: usize) -> Option<usize> {
        if row >= self.rows || col >= self.cols {
            return None;
        }
        Some(row * self.cols + col)
    }
}
