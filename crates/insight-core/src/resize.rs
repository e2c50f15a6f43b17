//! Pointer-drag resizing of the sidebar.
//!
//! Widths are logical pixels. Pointer tracking is attached when a drag starts
//! and released by the session guard, so every way out of `Dragging`
//! (pointer-up, a new drag, dropping the controller) detaches it.

pub const MIN_SIDEBAR_WIDTH: u32 = 250;
pub const MAX_SIDEBAR_WIDTH: u32 = 500;
pub const DEFAULT_SIDEBAR_WIDTH: u32 = 300;

/// Global pointer tracking toggled around a drag.
pub trait PointerCapture {
    fn attach(&self);
    fn detach(&self);
}

pub fn clamp_width(width: i64) -> u32 {
    width.clamp(MIN_SIDEBAR_WIDTH as i64, MAX_SIDEBAR_WIDTH as i64) as u32
}

/// Holds pointer tracking for the duration of one drag.
#[derive(Debug)]
pub struct DragSession<C: PointerCapture> {
    start_x: i32,
    start_width: u32,
    capture: C,
}

impl<C: PointerCapture> DragSession<C> {
    fn start(start_x: i32, start_width: u32, capture: C) -> Self {
        capture.attach();
        Self {
            start_x,
            start_width,
            capture,
        }
    }

    fn width_at(&self, x: i32) -> u32 {
        clamp_width(self.start_width as i64 + (x as i64 - self.start_x as i64))
    }
}

impl<C: PointerCapture> Drop for DragSession<C> {
    fn drop(&mut self) {
        self.capture.detach();
    }
}

#[derive(Debug)]
pub enum DragState<C: PointerCapture> {
    Idle,
    Dragging(DragSession<C>),
}

#[derive(Debug)]
pub struct ResizeController<C: PointerCapture + Clone> {
    width: u32,
    state: DragState<C>,
    capture: C,
}

impl<C: PointerCapture + Clone> ResizeController<C> {
    pub fn new(capture: C) -> Self {
        Self::with_width(capture, DEFAULT_SIDEBAR_WIDTH)
    }

    pub fn with_width(capture: C, width: u32) -> Self {
        Self {
            width: clamp_width(width as i64),
            state: DragState::Idle,
            capture,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn is_dragging(&self) -> bool {
        matches!(self.state, DragState::Dragging(_))
    }

    pub fn begin_drag(&mut self, x: i32) {
        // Replacing an old session drops it first, detaching its tracking.
        self.state = DragState::Idle;
        self.state = DragState::Dragging(DragSession::start(x, self.width, self.capture.clone()));
    }

    /// Applies a pointer move. Returns the new width while dragging.
    pub fn drag_to(&mut self, x: i32) -> Option<u32> {
        let DragState::Dragging(session) = &self.state else {
            return None;
        };
        self.width = session.width_at(x);
        Some(self.width)
    }

    pub fn end_drag(&mut self) {
        self.state = DragState::Idle;
    }
}
