use crate::annotations::Color;
use crate::app::constants::{
    DEFAULT_OPACITY, MAX_OPACITY, MAX_ZOOM, MIN_OPACITY, MIN_ZOOM,
};

/// Active drawing tool. `Select` never creates annotations; the other
/// variants decide what a press/release drag produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Tool {
    #[default]
    Select,
    Rectangle,
    Arrow,
    Text,
}

/// Mutable view parameters, all clamped at the setter so the rest of
/// the pipeline can rely on the documented ranges.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewState {
    pub current_page: usize,
    pub page_count: usize,
    zoom: f64,
    opacity: f64,
    pub locked: bool,
    pub maximized: bool,
    pub tool: Tool,
    pub tool_color: Color,
    pub scroll_offset: (i32, i32),
}

impl Default for ViewState {
    fn default() -> Self {
        Self {
            current_page: 0,
            page_count: 0,
            zoom: 1.0,
            opacity: DEFAULT_OPACITY,
            locked: false,
            maximized: false,
            tool: Tool::default(),
            tool_color: Color::RED,
            scroll_offset: (0, 0),
        }
    }
}

impl ViewState {
    pub fn zoom(&self) -> f64 {
        self.zoom
    }

    /// Clamps into `[MIN_ZOOM, MAX_ZOOM]`; returns true on change.
    pub fn set_zoom(&mut self, zoom: f64) -> bool {
        let clamped = if zoom.is_finite() {
            zoom.clamp(MIN_ZOOM, MAX_ZOOM)
        } else {
            self.zoom
        };
        let changed = clamped != self.zoom;
        self.zoom = clamped;
        changed
    }

    pub fn opacity(&self) -> f64 {
        self.opacity
    }

    /// Clamps into `[MIN_OPACITY, MAX_OPACITY]`; returns true on change.
    pub fn set_opacity(&mut self, opacity: f64) -> bool {
        let clamped = if opacity.is_finite() {
            opacity.clamp(MIN_OPACITY, MAX_OPACITY)
        } else {
            self.opacity
        };
        let changed = clamped != self.opacity;
        self.opacity = clamped;
        changed
    }

    pub fn clamp_page(&self, page: usize) -> usize {
        if self.page_count == 0 {
            0
        } else {
            page.min(self.page_count - 1)
        }
    }

    pub fn has_next_page(&self) -> bool {
        self.page_count > 0 && self.current_page + 1 < self.page_count
    }

    pub fn has_prev_page(&self) -> bool {
        self.current_page > 0
    }
}
