use image::RgbaImage;

use crate::error::AppResult;

/// The windowing seam. The view controller renders into this trait and
/// never talks to a real window directly, so every display-side effect
/// can be observed by a test double.
pub trait PresentationSink {
    /// Shows a freshly composed frame.
    fn present(&mut self, frame: &RgbaImage) -> AppResult<()>;

    /// Window-level opacity, separate from the per-frame alpha.
    fn set_window_opacity(&mut self, opacity: f64);

    /// Scroll position of the content area, in pixels.
    fn set_scroll_offset(&mut self, x: i32, y: i32);

    fn set_maximized(&mut self, maximized: bool);

    /// Current content viewport in pixels.
    fn viewport(&self) -> (u32, u32);
}
