use cgmath::Vector2;

use crate::error::MetadataError;
use crate::mosaic::catalog::{MosaicCatalog, Rect, ZoomLevel};
use crate::mosaic::culling;
use crate::mosaic::fetch::{TileFetchOutcome, TileRequest};
use crate::mosaic::grid::TileGrid;

/// Viewer lifecycle. `LevelSelected` from the source design splits into
/// `Settled` and `Panning`; a level is always selected once settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewerPhase {
    Unloaded,
    CatalogLoading,
    Settled,
    Panning,
}

/// Pan offset in viewport pixels. Mutated continuously during a drag,
/// committed only when the gesture ends.
#[derive(Debug, Clone, Copy)]
pub struct PanState {
    pub offset: Vector2<f32>,
    committed: Vector2<f32>,
}

impl Default for PanState {
    fn default() -> Self {
        PanState {
            offset: Vector2::new(0.0, 0.0),
            committed: Vector2::new(0.0, 0.0),
        }
    }
}

impl PanState {
    fn move_by(&mut self, delta: Vector2<f32>) {
        self.offset += delta;
    }

    fn commit(&mut self) {
        self.committed = self.offset;
    }

    fn reset(&mut self) {
        *self = PanState::default();
    }
}

/// Top-level coordinator for one open image.
///
/// Owns the pan state and the tile grid, reacts to zoom-level switches,
/// and drives culling -> fetch -> eviction every time the viewport
/// changes. All methods must be called from a single context (the iced
/// update loop in the app, the test body in tests); fetch completions
/// re-enter through `tile_fetched`.
pub struct MosaicController {
    image_id: String,
    buffer_tiles: u32,
    phase: ViewerPhase,
    catalog: Option<MosaicCatalog>,
    level_index: usize,
    grid: TileGrid,
    pan: PanState,
    viewport_size: (f32, f32),
}

impl MosaicController {
    pub fn new(image_id: String, buffer_tiles: u32) -> Self {
        MosaicController {
            image_id,
            buffer_tiles,
            phase: ViewerPhase::Unloaded,
            catalog: None,
            level_index: 0,
            grid: TileGrid::default(),
            pan: PanState::default(),
            viewport_size: (0.0, 0.0),
        }
    }

    pub fn phase(&self) -> ViewerPhase {
        self.phase
    }

    pub fn grid(&self) -> &TileGrid {
        &self.grid
    }

    pub fn pan_offset(&self) -> Vector2<f32> {
        self.pan.offset
    }

    /// Offset as of the last committed gesture; lags `pan_offset` while a
    /// drag is in progress.
    pub fn pan_committed(&self) -> Vector2<f32> {
        self.pan.committed
    }

    pub fn catalog(&self) -> Option<&MosaicCatalog> {
        self.catalog.as_ref()
    }

    pub fn current_level(&self) -> Option<&ZoomLevel> {
        self.catalog.as_ref()?.zoom_levels.get(self.level_index)
    }

    /// Viewer open: the catalog load round trip is in flight.
    pub fn open(&mut self) {
        self.phase = ViewerPhase::CatalogLoading;
    }

    /// Catalog arrived: pick the default level (first in the server's
    /// list, matching source behavior), size the grid for it, and run the
    /// initial cull + fetch.
    ///
    /// A catalog without zoom levels cannot select a level and is rejected
    /// as malformed metadata, ending the session like any catalog failure.
    pub fn catalog_loaded(
        &mut self,
        catalog: MosaicCatalog,
    ) -> Result<Vec<TileRequest>, MetadataError> {
        if catalog.zoom_levels.is_empty() {
            self.catalog_failed();
            return Err(MetadataError::Malformed(
                "catalog contains no zoom levels".into(),
            ));
        }
        self.catalog = Some(catalog);
        Ok(self.enter_level(0))
    }

    /// Catalog load failed; the session is over before it began. The app
    /// surfaces this as "unable to load image".
    pub fn catalog_failed(&mut self) {
        self.phase = ViewerPhase::Unloaded;
        self.catalog = None;
    }

    /// The canvas reported a new size. Re-runs the visibility pass when a
    /// level is active.
    pub fn set_viewport(&mut self, width: f32, height: f32) -> Vec<TileRequest> {
        self.viewport_size = (width, height);
        if self.phase == ViewerPhase::Settled {
            self.sync_pass()
        } else {
            Vec::new()
        }
    }

    /// Drag gesture started. No cull/fetch/evict work happens mid-drag so
    /// dragging stays smooth.
    pub fn pan_started(&mut self) {
        if self.phase == ViewerPhase::Settled {
            self.phase = ViewerPhase::Panning;
        }
    }

    /// Continuous offset update during a drag.
    pub fn pan_moved(&mut self, delta: Vector2<f32>) {
        if self.phase == ViewerPhase::Panning {
            self.pan.move_by(delta);
        }
    }

    /// Drag gesture ended: commit the offset, then run one full
    /// cull -> fetch -> evict pass.
    pub fn pan_ended(&mut self) -> Vec<TileRequest> {
        if self.phase != ViewerPhase::Panning {
            return Vec::new();
        }
        self.pan.commit();
        self.phase = ViewerPhase::Settled;
        self.sync_pass()
    }

    /// Explicit zoom-level change, re-entrant from any loaded state.
    /// Resets the grid and discards the old pan offset; position is not
    /// preserved across levels.
    pub fn select_level(&mut self, index: usize) -> Vec<TileRequest> {
        let known = self
            .catalog
            .as_ref()
            .is_some_and(|catalog| index < catalog.zoom_levels.len());
        if !known {
            return Vec::new();
        }
        self.enter_level(index)
    }

    /// Step to an adjacent zoom level (wheel gesture), clamped to the
    /// catalog range.
    pub fn step_level(&mut self, delta: i32) -> Vec<TileRequest> {
        let Some(catalog) = &self.catalog else {
            return Vec::new();
        };
        let last = catalog.zoom_levels.len().saturating_sub(1);
        let target = self
            .level_index
            .saturating_add_signed(delta as isize)
            .min(last);
        if target == self.level_index {
            return Vec::new();
        }
        self.enter_level(target)
    }

    /// Periodic visibility recompute while settled.
    pub fn refresh_visible(&mut self) -> Vec<TileRequest> {
        if self.phase == ViewerPhase::Settled {
            self.sync_pass()
        } else {
            Vec::new()
        }
    }

    /// A tile fetch finished. Completions from before the most recent grid
    /// reset carry a stale epoch and are discarded wholesale; otherwise the
    /// pending flag clears and a successful decode is stored even if the
    /// cell has since scrolled out of view (the next sweep drops it again).
    pub fn tile_fetched(&mut self, outcome: TileFetchOutcome) {
        if outcome.epoch != self.grid.epoch() {
            return;
        }
        self.grid
            .clear_pending(outcome.epoch, outcome.row, outcome.col);
        if let Some(tile) = outcome.tile {
            self.grid.put(outcome.epoch, outcome.row, outcome.col, tile);
        }
    }

    fn enter_level(&mut self, index: usize) -> Vec<TileRequest> {
        self.level_index = index;
        let Some(level) = self.current_level().cloned() else {
            return Vec::new();
        };
        self.grid.reset(&level);
        self.pan.reset();
        self.phase = ViewerPhase::Settled;
        self.sync_pass()
    }

    /// One cull -> fetch -> evict pass: ask the culler for the buffered
    /// visible set, emit a request for every empty non-pending cell in it
    /// (marking it pending, so at most one fetch is ever outstanding per
    /// cell), and drop every resident tile outside it.
    fn sync_pass(&mut self) -> Vec<TileRequest> {
        let Some(level) = self.current_level().cloned() else {
            return Vec::new();
        };
        let Some(catalog) = &self.catalog else {
            return Vec::new();
        };
        let extension = catalog.extension.clone();

        let keep = culling::visible_cells(self.viewport_rect(), &level, self.buffer_tiles);
        self.grid.evict(&keep);

        let mut requests = Vec::new();
        let mut cells: Vec<&(usize, usize)> = keep.iter().collect();
        cells.sort();
        for &&(row, col) in &cells {
            if self.grid.get(row, col).is_some() || self.grid.is_pending(row, col) {
                continue;
            }
            self.grid.mark_pending(row, col);
            requests.push(TileRequest {
                image_id: self.image_id.clone(),
                level_index: level.index,
                row,
                col,
                extension: extension.clone(),
                epoch: self.grid.epoch(),
            });
        }
        requests
    }

    /// The visible region in level pixel coordinates. The pan offset moves
    /// the image under the viewport, so the viewport origin in image space
    /// is its negation.
    fn viewport_rect(&self) -> Rect {
        Rect::new(
            -self.pan.offset.x,
            -self.pan.offset.y,
            self.viewport_size.0,
            self.viewport_size.1,
        )
    }

    #[cfg(test)]
    fn pending_cells(&self) -> std::collections::HashSet<(usize, usize)> {
        let mut cells = std::collections::HashSet::new();
        for row in 0..self.grid.rows() {
            for col in 0..self.grid.cols() {
                if self.grid.is_pending(row, col) {
                    cells.insert((row, col));
                }
            }
        }
        cells
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mosaic::catalog::TileDescriptor;
    use crate::mosaic::grid::Tile;

    fn catalog() -> MosaicCatalog {
        MosaicCatalog {
            extension: "jpg".into(),
            zoom_levels: vec![
                ZoomLevel {
                    index: 0,
                    width: 2048,
                    height: 2048,
                    rows: 8,
                    cols: 8,
                    scale_down_percentage: 100.0,
                    tile: TileDescriptor {
                        width: 256,
                        height: 256,
                        last_col_width: 256,
                        last_row_height: 256,
                    },
                },
                ZoomLevel {
                    index: 1,
                    width: 1024,
                    height: 1024,
                    rows: 4,
                    cols: 4,
                    scale_down_percentage: 50.0,
                    tile: TileDescriptor {
                        width: 256,
                        height: 256,
                        last_col_width: 256,
                        last_row_height: 256,
                    },
                },
            ],
        }
    }

    fn tile() -> Tile {
        Tile {
            width: 256,
            height: 256,
            pixels: vec![0; 4],
        }
    }

    fn opened_controller() -> (MosaicController, Vec<TileRequest>) {
        let mut controller = MosaicController::new("img-1".into(), 1);
        controller.open();
        assert_eq!(controller.phase(), ViewerPhase::CatalogLoading);
        controller.set_viewport(512.0, 512.0);
        let requests = controller.catalog_loaded(catalog()).unwrap();
        (controller, requests)
    }

    #[test]
    fn catalog_load_selects_first_level_and_requests_visible_cells() {
        let (controller, requests) = opened_controller();

        assert_eq!(controller.phase(), ViewerPhase::Settled);
        assert_eq!(controller.current_level().unwrap().index, 0);

        // 512x512 viewport, 256px tiles, one-tile buffer: 3x3 block.
        assert_eq!(requests.len(), 9);
        assert!(requests
            .iter()
            .all(|r| r.row < 3 && r.col < 3 && r.level_index == 0 && r.extension == "jpg"));
    }

    #[test]
    fn repeated_passes_do_not_duplicate_pending_requests() {
        let (mut controller, first) = opened_controller();
        assert_eq!(first.len(), 9);

        // Everything visible is already pending: a recompute issues nothing.
        let second = controller.refresh_visible();
        assert!(second.is_empty());
        assert_eq!(controller.pending_cells().len(), 9);
    }

    #[test]
    fn failed_cells_are_requested_again_on_the_next_pass() {
        let (mut controller, requests) = opened_controller();
        let epoch = controller.grid().epoch();

        for request in &requests {
            controller.tile_fetched(TileFetchOutcome {
                row: request.row,
                col: request.col,
                epoch,
                tile: None,
            });
        }

        let retry = controller.refresh_visible();
        assert_eq!(retry.len(), requests.len());
    }

    #[test]
    fn mid_drag_updates_do_no_grid_work() {
        let (mut controller, _) = opened_controller();

        controller.pan_started();
        assert_eq!(controller.phase(), ViewerPhase::Panning);

        controller.pan_moved(Vector2::new(-300.0, 0.0));
        controller.pan_moved(Vector2::new(-212.0, 0.0));
        assert!(controller.refresh_visible().is_empty());
        assert_eq!(controller.pan_offset(), Vector2::new(-512.0, 0.0));
        // Nothing is committed until the gesture ends.
        assert_eq!(controller.pan_committed(), Vector2::new(0.0, 0.0));
    }

    #[test]
    fn pan_commit_fetches_newly_visible_and_evicts_the_rest() {
        let (mut controller, requests) = opened_controller();
        let epoch = controller.grid().epoch();

        // Land every initial tile.
        for request in &requests {
            controller.tile_fetched(TileFetchOutcome {
                row: request.row,
                col: request.col,
                epoch,
                tile: Some(tile()),
            });
        }

        // Pan two tiles right: columns 0..=4 become the buffered set.
        controller.pan_started();
        controller.pan_moved(Vector2::new(-512.0, 0.0));
        let requests = controller.pan_ended();

        assert_eq!(controller.phase(), ViewerPhase::Settled);
        assert_eq!(controller.pan_committed(), Vector2::new(-512.0, 0.0));
        // Newly visible columns 3 and 4, rows 0..=2.
        assert_eq!(requests.len(), 6);
        assert!(requests.iter().all(|r| r.col >= 3 && r.col <= 4));
        // Column 0 scrolled out of the buffered set and was evicted.
        assert!(controller.grid().get(0, 0).is_none());
        // Column 1 is still inside the buffer ring.
        assert!(controller.grid().get(0, 1).is_some());
    }

    #[test]
    fn level_switch_resets_grid_pan_and_discards_stale_completions() {
        let (mut controller, requests) = opened_controller();
        let old_epoch = controller.grid().epoch();

        controller.pan_started();
        controller.pan_moved(Vector2::new(-100.0, -100.0));
        controller.pan_ended();

        let switch_requests = controller.select_level(1);
        assert_eq!(controller.current_level().unwrap().index, 1);
        assert_eq!(controller.pan_offset(), Vector2::new(0.0, 0.0));
        assert!(!switch_requests.is_empty());
        assert!(switch_requests.iter().all(|r| r.level_index == 1));

        // A straggler from the old level arrives after the reset.
        let straggler = &requests[0];
        controller.tile_fetched(TileFetchOutcome {
            row: straggler.row,
            col: straggler.col,
            epoch: old_epoch,
            tile: Some(tile()),
        });
        assert!(controller.grid().get(straggler.row, straggler.col).is_none());
    }

    #[test]
    fn step_level_clamps_to_the_catalog_range() {
        let (mut controller, _) = opened_controller();

        assert!(controller.step_level(-1).is_empty());
        assert_eq!(controller.current_level().unwrap().index, 0);

        let up = controller.step_level(1);
        assert!(!up.is_empty());
        assert_eq!(controller.current_level().unwrap().index, 1);

        assert!(controller.step_level(1).is_empty());
        assert_eq!(controller.current_level().unwrap().index, 1);
    }

    #[test]
    fn level_less_catalog_is_rejected_as_metadata_failure() {
        let mut controller = MosaicController::new("img-1".into(), 1);
        controller.open();
        controller.set_viewport(512.0, 512.0);

        let result = controller.catalog_loaded(MosaicCatalog {
            extension: "jpg".into(),
            zoom_levels: Vec::new(),
        });

        // The session ends like any other catalog failure instead of
        // staying stuck waiting for a level that can never be selected.
        assert!(matches!(result, Err(MetadataError::Malformed(_))));
        assert_eq!(controller.phase(), ViewerPhase::Unloaded);
        assert!(controller.catalog().is_none());
        assert!(controller.refresh_visible().is_empty());
    }

    #[test]
    fn catalog_failure_returns_to_unloaded() {
        let mut controller = MosaicController::new("img-1".into(), 1);
        controller.open();
        controller.catalog_failed();
        assert_eq!(controller.phase(), ViewerPhase::Unloaded);
        assert!(controller.catalog().is_none());
    }
}
