use thiserror::Error;

/// Catalog fetch or parse failure. Fatal to the viewer session: there is
/// nothing to render without pyramid metadata, so this is the only error
/// that reaches the user.
#[derive(Debug, Clone, Error)]
pub enum MetadataError {
    /// The metadata request itself failed (connection, status, timeout).
    #[error("catalog request failed: {0}")]
    Transport(String),
    /// The server answered but the payload did not decode.
    #[error("malformed catalog payload: {0}")]
    Malformed(String),
}

/// A single tile's byte fetch failed. Non-fatal: the cell is left empty
/// and re-requested the next time it is found visible.
#[derive(Debug, Clone, Error)]
#[error("tile fetch failed: {0}")]
pub struct TileFetchError(pub String);

/// Tile bytes arrived but could not be decoded as an image. Treated
/// exactly like a fetch failure.
#[derive(Debug, Clone, Error)]
#[error("tile decode failed: {0}")]
pub struct DecodeError(pub String);
