use clap::Parser;

/// Command-line configuration for the viewer.
///
/// Everything can also come from the environment so the binary works from
/// launchers that cannot pass flags.
#[derive(Debug, Clone, Parser)]
#[command(name = "mosaic-viewer", about = "Tiled mosaic viewer for very large images")]
pub struct Config {
    /// Base URL of the mosaic server, e.g. https://api.example.com
    #[arg(long, env = "MOSAIC_SERVER")]
    pub server: String,

    /// Identifier of the image to open
    #[arg(long, env = "MOSAIC_IMAGE_ID")]
    pub image_id: String,

    /// Optional bearer token for authenticated servers
    #[arg(long, env = "MOSAIC_TOKEN")]
    pub token: Option<String>,

    /// Extra ring of tiles kept resident beyond the visible viewport
    #[arg(long, default_value_t = 1)]
    pub buffer_tiles: u32,

    /// Cap on concurrent tile fetches; absent means unbounded, matching
    /// the original client
    #[arg(long)]
    pub max_concurrent_fetches: Option<usize>,
}
