use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Semaphore;

use crate::error::{DecodeError, MetadataError, TileFetchError};
use crate::mosaic::catalog::MosaicCatalog;
use crate::mosaic::grid::Tile;

/// One tile fetch issued by the controller. Carries everything needed to
/// build the request URL plus the grid epoch it was issued under.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TileRequest {
    pub image_id: String,
    pub level_index: usize,
    pub row: usize,
    pub col: usize,
    pub extension: String,
    pub epoch: u64,
}

/// Completion of one tile fetch, delivered back to the controller context.
/// `tile` is `None` on fetch or decode failure; the cell stays empty and
/// is re-requested the next time it is found visible.
#[derive(Debug, Clone)]
pub struct TileFetchOutcome {
    pub row: usize,
    pub col: usize,
    pub epoch: u64,
    pub tile: Option<Tile>,
}

/// External byte-fetch collaborator. The pipeline never sees HTTP details;
/// tests substitute a scripted fake.
#[async_trait]
pub trait TileTransport: Send + Sync {
    async fn fetch_catalog(&self, image_id: &str) -> Result<MosaicCatalog, MetadataError>;

    async fn fetch_tile_bytes(&self, request: &TileRequest) -> Result<Vec<u8>, TileFetchError>;
}

/// Capability interface over the concrete image type so the pipeline is
/// testable without real codecs.
pub trait TileDecoder: Send + Sync {
    fn decode(&self, bytes: &[u8]) -> Result<Tile, DecodeError>;
}

/// reqwest-backed transport speaking the mosaic server's REST surface.
pub struct HttpTileTransport {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpTileTransport {
    pub fn new(base_url: String, token: Option<String>) -> Self {
        HttpTileTransport {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        }
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

#[async_trait]
impl TileTransport for HttpTileTransport {
    async fn fetch_catalog(&self, image_id: &str) -> Result<MosaicCatalog, MetadataError> {
        let url = format!("{}/mosaics/{}/info", self.base_url, image_id);
        let response = self
            .authorized(self.client.get(&url))
            .send()
            .await
            .map_err(|e| MetadataError::Transport(e.to_string()))?
            .error_for_status()
            .map_err(|e| MetadataError::Transport(e.to_string()))?;

        response
            .json::<MosaicCatalog>()
            .await
            .map_err(|e| MetadataError::Malformed(e.to_string()))
    }

    async fn fetch_tile_bytes(&self, request: &TileRequest) -> Result<Vec<u8>, TileFetchError> {
        let url = format!(
            "{}/mosaics/{}/zoom_level/{}/row/{}/col/{}/ext/{}",
            self.base_url,
            request.image_id,
            request.level_index,
            request.row,
            request.col,
            request.extension,
        );
        let response = self
            .authorized(self.client.get(&url))
            .send()
            .await
            .map_err(|e| TileFetchError(e.to_string()))?
            .error_for_status()
            .map_err(|e| TileFetchError(e.to_string()))?;

        let bytes = response
            .bytes()
            .await
            .map_err(|e| TileFetchError(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

/// `image`-crate decoder producing RGBA8 tiles.
pub struct ImageTileDecoder;

impl TileDecoder for ImageTileDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<Tile, DecodeError> {
        let decoded = image::load_from_memory(bytes).map_err(|e| DecodeError(e.to_string()))?;
        let rgba = decoded.to_rgba8();
        Ok(Tile {
            width: rgba.width(),
            height: rgba.height(),
            pixels: rgba.into_raw(),
        })
    }
}

/// Optional cap on concurrent tile fetches. The original client fans out
/// one fetch per missing visible cell with no cap, so the default takes no
/// permit at all.
#[derive(Clone, Default)]
pub struct FetchLimits {
    permits: Option<Arc<Semaphore>>,
}

impl FetchLimits {
    pub fn unbounded() -> Self {
        FetchLimits { permits: None }
    }

    pub fn capped(max_concurrent: usize) -> Self {
        FetchLimits {
            permits: Some(Arc::new(Semaphore::new(max_concurrent))),
        }
    }

    pub fn from_cap(cap: Option<usize>) -> Self {
        match cap {
            Some(max) => FetchLimits::capped(max),
            None => FetchLimits::unbounded(),
        }
    }
}

/// Fetch and decode one tile. Never fails from the caller's point of view:
/// both transport and decode errors are logged and collapse into an empty
/// outcome. No retry counter, no backoff; a failed cell is retried lazily
/// every time it re-enters the visible set.
pub async fn fetch_tile(
    transport: Arc<dyn TileTransport>,
    decoder: Arc<dyn TileDecoder>,
    limits: FetchLimits,
    request: TileRequest,
) -> TileFetchOutcome {
    let _permit = match &limits.permits {
        Some(semaphore) => semaphore.clone().acquire_owned().await.ok(),
        None => None,
    };

    let tile = match transport.fetch_tile_bytes(&request).await {
        Ok(bytes) => match decoder.decode(&bytes) {
            Ok(tile) => Some(tile),
            Err(error) => {
                tracing::warn!(
                    row = request.row,
                    col = request.col,
                    level = request.level_index,
                    %error,
                    "tile decode failed"
                );
                None
            }
        },
        Err(error) => {
            tracing::debug!(
                row = request.row,
                col = request.col,
                level = request.level_index,
                %error,
                "tile fetch failed"
            );
            None
        }
    };

    TileFetchOutcome {
        row: request.row,
        col: request.col,
        epoch: request.epoch,
        tile,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedTransport {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl TileTransport for ScriptedTransport {
        async fn fetch_catalog(&self, _image_id: &str) -> Result<MosaicCatalog, MetadataError> {
            Err(MetadataError::Transport("not scripted".into()))
        }

        async fn fetch_tile_bytes(
            &self,
            _request: &TileRequest,
        ) -> Result<Vec<u8>, TileFetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(TileFetchError("scripted failure".into()))
            } else {
                Ok(vec![1, 2, 3])
            }
        }
    }

    struct PassthroughDecoder;

    impl TileDecoder for PassthroughDecoder {
        fn decode(&self, bytes: &[u8]) -> Result<Tile, DecodeError> {
            Ok(Tile {
                width: 1,
                height: 1,
                pixels: bytes.to_vec(),
            })
        }
    }

    struct RejectingDecoder;

    impl TileDecoder for RejectingDecoder {
        fn decode(&self, _bytes: &[u8]) -> Result<Tile, DecodeError> {
            Err(DecodeError("scripted garbage".into()))
        }
    }

    fn request() -> TileRequest {
        TileRequest {
            image_id: "img-1".into(),
            level_index: 0,
            row: 1,
            col: 2,
            extension: "jpg".into(),
            epoch: 1,
        }
    }

    #[tokio::test]
    async fn successful_fetch_produces_a_decoded_tile() {
        let transport = Arc::new(ScriptedTransport {
            calls: AtomicUsize::new(0),
            fail: false,
        });
        let outcome = fetch_tile(
            transport.clone(),
            Arc::new(PassthroughDecoder),
            FetchLimits::unbounded(),
            request(),
        )
        .await;

        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
        assert_eq!(outcome.row, 1);
        assert_eq!(outcome.col, 2);
        assert_eq!(outcome.epoch, 1);
        assert_eq!(outcome.tile.unwrap().pixels, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn transport_failure_yields_an_empty_outcome() {
        let transport = Arc::new(ScriptedTransport {
            calls: AtomicUsize::new(0),
            fail: true,
        });
        let outcome = fetch_tile(
            transport,
            Arc::new(PassthroughDecoder),
            FetchLimits::unbounded(),
            request(),
        )
        .await;

        assert!(outcome.tile.is_none());
    }

    #[tokio::test]
    async fn decode_failure_is_treated_like_a_fetch_failure() {
        let transport = Arc::new(ScriptedTransport {
            calls: AtomicUsize::new(0),
            fail: false,
        });
        let outcome = fetch_tile(
            transport,
            Arc::new(RejectingDecoder),
            FetchLimits::unbounded(),
            request(),
        )
        .await;

        assert!(outcome.tile.is_none());
    }

    #[tokio::test]
    async fn capped_limits_still_complete_every_fetch() {
        let transport = Arc::new(ScriptedTransport {
            calls: AtomicUsize::new(0),
            fail: false,
        });
        let limits = FetchLimits::capped(1);

        for _ in 0..3 {
            let outcome = fetch_tile(
                transport.clone(),
                Arc::new(PassthroughDecoder),
                limits.clone(),
                request(),
            )
            .await;
            assert!(outcome.tile.is_some());
        }
        assert_eq!(transport.calls.load(Ordering::SeqCst), 3);
    }
}
