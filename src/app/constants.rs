pub const MIN_ZOOM: f64 = 0.1;
pub const MAX_ZOOM: f64 = 5.0;

pub const MIN_OPACITY: f64 = 0.1;
pub const MAX_OPACITY: f64 = 1.0;
pub const DEFAULT_OPACITY: f64 = 1.0;

/// Zoom-out multiplier; not the reciprocal of the zoom-in step.
pub const ZOOM_OUT_STEP: f64 = 0.8;

/// Placeholder shade shown when a page fails to rasterize.
pub const PLACEHOLDER_GRAY: u8 = 0xee;
pub const PLACEHOLDER_SIZE: (u32, u32) = (612, 792);
