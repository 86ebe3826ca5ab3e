use serde::Deserialize;

/// Nominal tile dimensions for one zoom level, plus the true pixel size of
/// the rightmost column and bottommost row. Image dimensions rarely divide
/// evenly by the tile size, so the last column/row are usually smaller.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TileDescriptor {
    pub width: u32,
    pub height: u32,
    pub last_col_width: u32,
    pub last_row_height: u32,
}

/// One pyramid level: the full image at one resolution, split into a
/// rows x cols grid of tiles. Immutable once received from the server.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoomLevel {
    /// Ordinal as provided by the server
    pub index: usize,
    /// Pixel width of the full image at this level
    pub width: u32,
    /// Pixel height of the full image at this level
    pub height: u32,
    /// Tile grid shape
    pub rows: usize,
    pub cols: usize,
    /// Display metadata only
    pub scale_down_percentage: f32,
    pub tile: TileDescriptor,
}

/// The full set of zoom levels for one image plus the file-extension hint
/// used when requesting individual tiles. Fetched once per image.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MosaicCatalog {
    pub extension: String,
    pub zoom_levels: Vec<ZoomLevel>,
}

impl ZoomLevel {
    /// True pixel size of the tile at `(row, col)`. Only the last column
    /// and last row use the override sizes.
    pub fn tile_size(&self, row: usize, col: usize) -> (u32, u32) {
        let width = if col + 1 == self.cols {
            self.tile.last_col_width
        } else {
            self.tile.width
        };
        let height = if row + 1 == self.rows {
            self.tile.last_row_height
        } else {
            self.tile.height
        };
        (width, height)
    }

    /// Center of the tile at `(row, col)` in level pixel coordinates.
    ///
    /// All preceding columns/rows are assumed to be full nominal size and
    /// only the final row/column is shrunk. Changing the nominal tile size
    /// would retroactively shift every subsequent tile, so tile size never
    /// changes within a level.
    pub fn tile_center(&self, row: usize, col: usize) -> (f32, f32) {
        let (width, height) = self.tile_size(row, col);
        let x = (col as u32 * self.tile.width) as f32 + width as f32 / 2.0;
        let y = (row as u32 * self.tile.height) as f32 + height as f32 / 2.0;
        (x, y)
    }

    /// Bounding frame of the tile at `(row, col)`: a rect of the tile's
    /// true size centered at its center position.
    pub fn tile_frame(&self, row: usize, col: usize) -> Rect {
        let (width, height) = self.tile_size(row, col);
        let (x, y) = self.tile_center(row, col);
        Rect::centered_at(x, y, width as f32, height as f32)
    }
}

/// Axis-aligned rectangle in level pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Rect {
            x,
            y,
            width,
            height,
        }
    }

    pub fn centered_at(cx: f32, cy: f32, width: f32, height: f32) -> Self {
        Rect {
            x: cx - width / 2.0,
            y: cy - height / 2.0,
            width,
            height,
        }
    }

    /// Grow the rect by `dx`/`dy` on every side.
    pub fn inflated(&self, dx: f32, dy: f32) -> Self {
        Rect {
            x: self.x - dx,
            y: self.y - dy,
            width: self.width + dx * 2.0,
            height: self.height + dy * 2.0,
        }
    }

    /// Whether the two rects overlap with positive area. Rects that merely
    /// share an edge do not intersect.
    pub fn intersects(&self, other: &Rect) -> bool {
        self.x < other.x + other.width
            && other.x < self.x + self.width
            && self.y < other.y + other.height
            && other.y < self.y + self.height
    }
}
