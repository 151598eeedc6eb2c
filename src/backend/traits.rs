use std::path::Path;
use std::sync::Arc;

use kurbo::{Point, Rect};

use crate::error::AppResult;

/// A finished page raster in tightly packed RGB8.
///
/// `stride` is the byte width of one row; rows may carry padding when a
/// decoder hands back aligned buffers, so readers must honor it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RgbFrame {
    pub width: u32,
    pub height: u32,
    pub stride: usize,
    pub pixels: Arc<[u8]>,
}

impl RgbFrame {
    pub fn byte_len(&self) -> usize {
        self.pixels.len()
    }

    /// Copies the frame into a tight `width * 3` row layout, dropping
    /// any row padding.
    pub fn to_tight_rgb(&self) -> Vec<u8> {
        let row_bytes = self.width as usize * 3;
        if self.stride == row_bytes {
            return self.pixels.as_ref().to_vec();
        }

        let mut out = Vec::with_capacity(row_bytes * self.height as usize);
        for row in 0..self.height as usize {
            let start = row * self.stride;
            out.extend_from_slice(&self.pixels[start..start + row_bytes]);
        }
        out
    }
}

/// The document boundary. The core never parses document bytes itself;
/// everything it needs from the file goes through this trait.
///
/// Every call is fallible: the core must not assume a page exists or
/// that rasterization succeeds.
pub trait DocumentBackend: Send {
    fn path(&self) -> &Path;
    fn doc_id(&self) -> u64;
    fn page_count(&self) -> usize;

    /// Current rotation of the page in degrees, one of 0/90/180/270.
    /// Rotation is owned here, not duplicated in the core; callers
    /// re-read it before each raster request.
    fn page_rotation(&self, page: usize) -> AppResult<i32>;
    fn set_page_rotation(&self, page: usize, degrees: i32) -> AppResult<()>;

    fn rasterize_page(&self, page: usize, scale_x: f32, scale_y: f32) -> AppResult<RgbFrame>;

    /// A second handle onto the same document for a pool worker thread,
    /// sharing the underlying bytes and the rotation table.
    fn fork_for_render(&self) -> AppResult<Box<dyn DocumentBackend>>;

    // Burn-in primitives used by the save flow. Coordinates are in page
    // points, colors RGB8.
    fn draw_rect(&self, page: usize, rect: Rect, rgb: [u8; 3]) -> AppResult<()>;
    fn draw_line(&self, page: usize, p0: Point, p1: Point, rgb: [u8; 3]) -> AppResult<()>;
    fn insert_text(&self, page: usize, at: Point, text: &str, rgb: [u8; 3]) -> AppResult<()>;

    fn save(&self, path: &Path) -> AppResult<()>;
}
