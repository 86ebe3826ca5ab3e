/// Tiled mosaic subsystem
///
/// This module handles:
/// - Pyramid metadata for one source image (catalog.rs)
/// - The per-level grid of resident/pending tiles (grid.rs)
/// - Viewport culling with a prefetch buffer ring (culling.rs)
/// - Deduplicated asynchronous tile fetches (fetch.rs)
/// - The controller state machine driving cull -> fetch -> evict (controller.rs)

pub mod catalog;
pub mod controller;
pub mod culling;
pub mod fetch;
pub mod grid;
