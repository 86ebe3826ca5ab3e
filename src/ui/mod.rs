/// UI layer: the canvas that captures pan/zoom gestures and draws the
/// resident tiles of the current zoom level.

pub mod canvas;
