use std::collections::HashSet;

use crate::mosaic::catalog::{Rect, ZoomLevel};

/// Compute the set of grid cells whose tile frames intersect the viewport
/// inflated by `buffer_tiles` nominal tile sizes per axis.
///
/// The buffer ring keeps tiles ready slightly before they enter the screen
/// so continuous panning does not show pop-in. This is an O(rows x cols)
/// scan per recomputation; grid sizes are bounded (a few hundred tiles per
/// level), so no spatial index is needed. A port targeting much larger
/// grids should replace the scan with a direct row/col range computation.
pub fn visible_cells(
    viewport: Rect,
    level: &ZoomLevel,
    buffer_tiles: u32,
) -> HashSet<(usize, usize)> {
    let inflated = viewport.inflated(
        (buffer_tiles * level.tile.width) as f32,
        (buffer_tiles * level.tile.height) as f32,
    );

    let mut cells = HashSet::new();
    for row in 0..level.rows {
        for col in 0..level.cols {
            if inflated.intersects(&level.tile_frame(row, col)) {
                cells.insert((row, col));
            }
        }
    }
    cells
}
