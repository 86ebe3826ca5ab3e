use iced::widget::{canvas, column, container, text};
use iced::{Element, Length, Size, Subscription, Task, Theme};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

mod config;
mod error;
mod mosaic;
mod ui;

use error::MetadataError;
use mosaic::catalog::MosaicCatalog;
use mosaic::controller::{MosaicController, ViewerPhase};
use mosaic::fetch::{
    self, FetchLimits, HttpTileTransport, ImageTileDecoder, TileDecoder, TileFetchOutcome,
    TileRequest, TileTransport,
};

/// Application messages (events)
#[derive(Debug, Clone)]
pub enum Message {
    /// Catalog round trip finished
    CatalogLoaded(Result<MosaicCatalog, MetadataError>),
    /// One tile fetch finished (success or failure)
    TileFetched(TileFetchOutcome),
    /// The canvas reported a new size
    ViewportResized(Size),
    /// Drag gesture started
    PanStarted,
    /// Continuous offset update during a drag
    Pan(cgmath::Vector2<f32>),
    /// Drag gesture ended; commit and run a visibility pass
    PanEnded,
    /// Wheel gesture: move to an adjacent zoom level
    ZoomStep(i32),
    /// Periodic visibility recompute while settled
    RefreshVisible,
}

/// Main application state
struct MosaicViewer {
    /// The viewer state machine; all grid mutation funnels through here,
    /// on this update loop only
    controller: MosaicController,
    transport: Arc<dyn TileTransport>,
    decoder: Arc<dyn TileDecoder>,
    limits: FetchLimits,
    /// Image handles for resident tiles, mirroring the grid
    handles: HashMap<(usize, usize), iced::widget::image::Handle>,
    /// Status message to display to the user
    status: String,
}

impl MosaicViewer {
    fn new(config: config::Config) -> (Self, Task<Message>) {
        let transport: Arc<dyn TileTransport> = Arc::new(HttpTileTransport::new(
            config.server.clone(),
            config.token.clone(),
        ));
        let decoder: Arc<dyn TileDecoder> = Arc::new(ImageTileDecoder);
        let limits = FetchLimits::from_cap(config.max_concurrent_fetches);

        let mut controller = MosaicController::new(config.image_id.clone(), config.buffer_tiles);
        controller.open();

        let status = format!("Loading {}...", config.image_id);

        let load = {
            let transport = transport.clone();
            let image_id = config.image_id.clone();
            Task::perform(
                async move { transport.fetch_catalog(&image_id).await },
                Message::CatalogLoaded,
            )
        };

        (
            MosaicViewer {
                controller,
                transport,
                decoder,
                limits,
                handles: HashMap::new(),
                status,
            },
            load,
        )
    }

    /// Handle application messages and update state
    fn update(&mut self, message: Message) -> Task<Message> {
        match message {
            Message::CatalogLoaded(Ok(catalog)) => {
                let levels = catalog.zoom_levels.len();
                match self.controller.catalog_loaded(catalog) {
                    Ok(requests) => {
                        self.status = format!("Level 0 of {} loaded", levels);
                        self.after_pass(requests)
                    }
                    Err(error) => {
                        tracing::error!(%error, "catalog rejected");
                        self.status = "Unable to load image".to_string();
                        Task::none()
                    }
                }
            }
            Message::CatalogLoaded(Err(error)) => {
                tracing::error!(%error, "catalog load failed");
                self.controller.catalog_failed();
                self.status = "Unable to load image".to_string();
                Task::none()
            }
            Message::TileFetched(outcome) => {
                self.controller.tile_fetched(outcome);
                self.sync_handles();
                Task::none()
            }
            Message::ViewportResized(size) => {
                let requests = self.controller.set_viewport(size.width, size.height);
                self.after_pass(requests)
            }
            Message::PanStarted => {
                self.controller.pan_started();
                Task::none()
            }
            Message::Pan(delta) => {
                self.controller.pan_moved(delta);
                Task::none()
            }
            Message::PanEnded => {
                let requests = self.controller.pan_ended();
                self.after_pass(requests)
            }
            Message::ZoomStep(step) => {
                let requests = self.controller.step_level(step);
                if let Some(level) = self.controller.current_level() {
                    self.status = format!("Zoom level {}", level.index);
                }
                self.after_pass(requests)
            }
            Message::RefreshVisible => {
                let requests = self.controller.refresh_visible();
                self.after_pass(requests)
            }
        }
    }

    /// Build the user interface
    fn view(&self) -> Element<Message> {
        let viewer = canvas::Canvas::new(ui::canvas::MosaicCanvas {
            controller: &self.controller,
            handles: &self.handles,
        })
        .width(Length::Fill)
        .height(Length::Fill);

        let content = column![
            container(viewer).width(Length::Fill).height(Length::Fill),
            text(&self.status).size(14),
        ]
        .spacing(4)
        .padding(4);

        container(content)
            .width(Length::Fill)
            .height(Length::Fill)
            .into()
    }

    /// Window size reports plus the periodic visibility recompute.
    ///
    /// The window events seed the viewport before any mouse event reaches
    /// the canvas; the canvas later refines it to its exact bounds.
    fn subscription(&self) -> Subscription<Message> {
        let window_sizes = iced::event::listen_with(|event, _status, _window| match event {
            iced::Event::Window(iced::window::Event::Opened { size, .. }) => {
                Some(Message::ViewportResized(size))
            }
            iced::Event::Window(iced::window::Event::Resized(size)) => {
                Some(Message::ViewportResized(size))
            }
            _ => None,
        });

        let refresh = match self.controller.phase() {
            ViewerPhase::Settled => {
                iced::time::every(Duration::from_millis(500)).map(|_| Message::RefreshVisible)
            }
            _ => Subscription::none(),
        };

        Subscription::batch([window_sizes, refresh])
    }

    /// Set the application theme
    fn theme(&self) -> Theme {
        Theme::Dark
    }

    /// Refresh tile handles, then launch one concurrent fetch per request.
    fn after_pass(&mut self, requests: Vec<TileRequest>) -> Task<Message> {
        self.sync_handles();
        Task::batch(requests.into_iter().map(|request| {
            Task::perform(
                fetch::fetch_tile(
                    self.transport.clone(),
                    self.decoder.clone(),
                    self.limits.clone(),
                    request,
                ),
                Message::TileFetched,
            )
        }))
    }

    /// Mirror the grid's resident tiles into iced image handles: drop
    /// handles for evicted cells, create handles for new arrivals.
    fn sync_handles(&mut self) {
        let mut fresh = HashMap::new();
        for (row, col, tile) in self.controller.grid().resident() {
            let handle = self.handles.remove(&(row, col)).unwrap_or_else(|| {
                iced::widget::image::Handle::from_rgba(
                    tile.width,
                    tile.height,
                    tile.pixels.clone(),
                )
            });
            fresh.insert((row, col), handle);
        }
        self.handles = fresh;
    }
}

fn main() -> iced::Result {
    let config = config::Config::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    iced::application("Mosaic Viewer", MosaicViewer::update, MosaicViewer::view)
        .subscription(MosaicViewer::subscription)
        .theme(MosaicViewer::theme)
        .centered()
        .run_with(move || MosaicViewer::new(config.clone()))
}
