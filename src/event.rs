use kurbo::Point;

/// Keyboard modifier held during a wheel event. Routing depends only on
/// this and never on pointer position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WheelModifier {
    #[default]
    None,
    Ctrl,
    Shift,
}

/// A normalized wheel event from the windowing layer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WheelEvent {
    /// Positive scrolls up / away from the user.
    pub delta_y: f64,
    /// Pointer position relative to the content area origin.
    pub pointer: Point,
    pub over_content: bool,
    pub modifier: WheelModifier,
}

impl WheelEvent {
    pub fn up(modifier: WheelModifier) -> Self {
        Self {
            delta_y: 120.0,
            pointer: Point::ZERO,
            over_content: false,
            modifier,
        }
    }

    pub fn down(modifier: WheelModifier) -> Self {
        Self {
            delta_y: -120.0,
            pointer: Point::ZERO,
            over_content: false,
            modifier,
        }
    }

    pub fn at(mut self, pointer: Point) -> Self {
        self.pointer = pointer;
        self.over_content = true;
        self
    }
}

/// A pointer press or drag-release on the content area, in screen
/// coordinates of the displayed page image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerEvent {
    pub position: Point,
}

impl PointerEvent {
    pub fn new(x: f64, y: f64) -> Self {
        Self {
            position: Point::new(x, y),
        }
    }
}
