//! Pure coordinate math between document space (page points, the space
//! annotations are stored in), screen space (the zoomed, fitted image
//! on display), and the viewport.
//!
//! Every function here is stateless; the view controller supplies the
//! sizes and owns the results.

use kurbo::Point;

/// Uniform scale that fits `bitmap` inside `available` while
/// preserving the aspect ratio.
pub fn scale_to_fit(bitmap: (u32, u32), available: (u32, u32)) -> f64 {
    let (bw, bh) = bitmap;
    if bw == 0 || bh == 0 {
        return 1.0;
    }
    let scale_x = available.0 as f64 / bw as f64;
    let scale_y = available.1 as f64 / bh as f64;
    scale_x.min(scale_y)
}

/// Multiplies both dimensions by `zoom`, rounding to the nearest pixel.
pub fn apply_zoom(size: (u32, u32), zoom: f64) -> (u32, u32) {
    (
        (size.0 as f64 * zoom).round().max(1.0) as u32,
        (size.1 as f64 * zoom).round().max(1.0) as u32,
    )
}

/// Display size of a bitmap fitted into `viewport` and then zoomed.
pub fn display_size(bitmap: (u32, u32), viewport: (u32, u32), zoom: f64) -> (u32, u32) {
    let fitted = apply_zoom(bitmap, scale_to_fit(bitmap, viewport));
    apply_zoom(fitted, zoom)
}

/// Forward map: document-space point to the displayed image.
pub fn document_to_screen(p: Point, bitmap: (u32, u32), display: (u32, u32)) -> Point {
    if display.0 == 0 || display.1 == 0 || bitmap.0 == 0 || bitmap.1 == 0 {
        return p;
    }
    Point::new(
        p.x * display.0 as f64 / bitmap.0 as f64,
        p.y * display.1 as f64 / bitmap.1 as f64,
    )
}

/// Inverse map: screen point back into document space. Exact algebraic
/// inverse of [`document_to_screen`]; identity when a display dimension
/// is zero (no content on screen yet).
pub fn screen_to_document(p: Point, bitmap: (u32, u32), display: (u32, u32)) -> Point {
    if display.0 == 0 || display.1 == 0 || bitmap.0 == 0 || bitmap.1 == 0 {
        return p;
    }
    Point::new(
        p.x * bitmap.0 as f64 / display.0 as f64,
        p.y * bitmap.1 as f64 / display.1 as f64,
    )
}

/// Relative anchor for a zoom step, in [0,1]^2 of the content area.
///
/// Zoom centers on the pointer when the event originated over the
/// content, and on the content midpoint otherwise.
pub fn zoom_anchor(pointer: Point, content: (u32, u32), over_content: bool) -> (f64, f64) {
    if !over_content || content.0 == 0 || content.1 == 0 {
        return (0.5, 0.5);
    }
    (
        (pointer.x / content.0 as f64).clamp(0.0, 1.0),
        (pointer.y / content.1 as f64).clamp(0.0, 1.0),
    )
}

/// Scroll offset keeping `anchor` under the pointer after the content
/// grew or shrank to `new_content`.
pub fn scroll_offset_after_zoom(
    anchor: (f64, f64),
    new_content: (u32, u32),
    pointer: Point,
) -> (i32, i32) {
    (
        (anchor.0 * new_content.0 as f64 - pointer.x).round() as i32,
        (anchor.1 * new_content.1 as f64 - pointer.y).round() as i32,
    )
}
