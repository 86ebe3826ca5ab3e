use iced::mouse::{self, Cursor};
use iced::widget::canvas::{self, Program};
use iced::widget::image::Handle;
use iced::{Point, Rectangle, Renderer, Size, Theme};
use std::collections::HashMap;

use crate::mosaic::controller::MosaicController;
use crate::Message;

/// Canvas renderer for the mosaic viewer.
///
/// Draws every resident tile of the current level at its frame, shifted by
/// the pan offset, and translates mouse events into pan/zoom messages. All
/// real state lives in the controller; this widget only borrows it.
pub struct MosaicCanvas<'a> {
    pub controller: &'a MosaicController,
    /// Image handles for resident tiles, kept in sync by the app
    pub handles: &'a HashMap<(usize, usize), Handle>,
}

impl<'a> Program<Message> for MosaicCanvas<'a> {
    type State = DragState;

    fn draw(
        &self,
        _state: &Self::State,
        renderer: &Renderer,
        _theme: &Theme,
        bounds: Rectangle,
        _cursor: Cursor,
    ) -> Vec<canvas::Geometry> {
        let mut frame = canvas::Frame::new(renderer, bounds.size());

        if let Some(level) = self.controller.current_level() {
            let offset = self.controller.pan_offset();
            for ((row, col), handle) in self.handles {
                let tile_frame = level.tile_frame(*row, *col);
                let rect = Rectangle::new(
                    Point::new(tile_frame.x + offset.x, tile_frame.y + offset.y),
                    Size::new(tile_frame.width, tile_frame.height),
                );
                frame.draw_image(rect, handle);
            }
        }

        vec![frame.into_geometry()]
    }

    fn update(
        &self,
        state: &mut Self::State,
        event: canvas::Event,
        bounds: Rectangle,
        cursor: Cursor,
    ) -> (canvas::event::Status, Option<Message>) {
        let gesture = match event {
            // Mouse wheel steps between zoom levels
            canvas::Event::Mouse(mouse::Event::WheelScrolled { delta }) => {
                let y = match delta {
                    mouse::ScrollDelta::Lines { y, .. } => y,
                    mouse::ScrollDelta::Pixels { y, .. } => y,
                };
                if y != 0.0 {
                    let step = if y > 0.0 { 1 } else { -1 };
                    Some(Message::ZoomStep(step))
                } else {
                    None
                }
            }

            // Mouse button press - start dragging
            canvas::Event::Mouse(mouse::Event::ButtonPressed(mouse::Button::Left)) => {
                cursor.position().map(|pos| {
                    state.is_dragging = true;
                    state.last_position = Some(pos);
                    Message::PanStarted
                })
            }

            // Mouse button release - commit the pan
            canvas::Event::Mouse(mouse::Event::ButtonReleased(mouse::Button::Left)) => {
                if state.is_dragging {
                    state.is_dragging = false;
                    state.last_position = None;
                    Some(Message::PanEnded)
                } else {
                    None
                }
            }

            // Mouse move - pan if dragging
            canvas::Event::Mouse(mouse::Event::CursorMoved { .. }) => {
                match (state.is_dragging, cursor.position(), state.last_position) {
                    (true, Some(current_pos), Some(last_pos)) => {
                        let delta = cgmath::Vector2::new(
                            current_pos.x - last_pos.x,
                            current_pos.y - last_pos.y,
                        );
                        state.last_position = Some(current_pos);
                        Some(Message::Pan(delta))
                    }
                    _ => None,
                }
            }

            _ => None,
        };

        if let Some(message) = gesture {
            return (canvas::event::Status::Captured, Some(message));
        }

        // Gesture-free event: use it to report canvas size changes so the
        // controller culls against the real bounds. Gestures are never
        // displaced by the size report.
        if state.last_size != Some(bounds.size()) {
            state.last_size = Some(bounds.size());
            return (
                canvas::event::Status::Ignored,
                Some(Message::ViewportResized(bounds.size())),
            );
        }

        (canvas::event::Status::Ignored, None)
    }
}

/// State for drag interactions
#[derive(Debug, Clone, Default)]
pub struct DragState {
    pub is_dragging: bool,
    pub last_position: Option<Point>,
    pub last_size: Option<Size>,
}
