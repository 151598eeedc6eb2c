//! Builds the displayed frame: resample the cached page raster to its
//! display size, apply the view opacity, then draw the annotation
//! overlay and the selection highlight.
//!
//! The pipeline is fully deterministic; the same inputs produce a
//! byte-identical image, which the tests rely on.

use ab_glyph::{FontVec, PxScale};
use fast_image_resize as fr;
use image::{Rgba, RgbaImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_line_segment_mut, draw_text_mut};
use imageproc::rect::Rect as PixelRect;
use kurbo::Point;

use crate::annotations::{Annotation, AnnotationKind, Color};
use crate::backend::RgbFrame;
use crate::error::{AppError, AppResult};
use crate::transform;

const RESAMPLE_FILTER: fr::FilterType = fr::FilterType::CatmullRom;
const ANNOTATION_STROKE_PX: u32 = 2;
const SELECTION_STROKE_PX: u32 = 3;

/// Everything the compositor needs besides the raster itself.
pub struct ComposeParams<'a> {
    pub annotations: &'a [Annotation],
    /// Index into `annotations` to highlight, drawn last.
    pub selected: Option<usize>,
    /// Page size in points; the space annotation coordinates live in.
    pub page_size: (u32, u32),
    pub display: (u32, u32),
    /// Uniform frame opacity in [0,1].
    pub opacity: f64,
    pub font: Option<&'a FontVec>,
    pub text_px: f32,
}

/// Composes one page for display.
///
/// The raster is always resampled with a convolution filter, even for
/// upscales, so zoomed output never shows nearest-neighbor blockiness.
pub fn compose_page(frame: &RgbFrame, params: &ComposeParams<'_>) -> AppResult<RgbaImage> {
    let (dst_w, dst_h) = params.display;
    if dst_w == 0 || dst_h == 0 {
        return Err(AppError::invalid_argument(
            "display size must be non-zero to compose",
        ));
    }

    let alpha = opacity_alpha(params.opacity);
    let resized = resample_rgb(frame, dst_w, dst_h)?;
    let mut image = rgb_to_rgba(dst_w, dst_h, &resized, alpha)?;

    let bitmap = params.page_size;
    for annotation in params.annotations {
        draw_annotation(&mut image, annotation, bitmap, params.display, alpha, params);
    }
    if let Some(index) = params.selected
        && let Some(selected) = params.annotations.get(index)
    {
        draw_selection(&mut image, selected, bitmap, params.display, alpha);
    }

    Ok(image)
}

/// Uniform alpha for a view opacity, rounded to the nearest step.
pub fn opacity_alpha(opacity: f64) -> u8 {
    (opacity.clamp(0.0, 1.0) * 255.0).round() as u8
}

fn resample_rgb(frame: &RgbFrame, dst_w: u32, dst_h: u32) -> AppResult<Vec<u8>> {
    let tight = frame.to_tight_rgb();
    if frame.width == dst_w && frame.height == dst_h {
        return Ok(tight);
    }

    let src = fr::images::Image::from_vec_u8(frame.width, frame.height, tight, fr::PixelType::U8x3)
        .map_err(|_| AppError::invalid_argument("rgb frame pixels length does not match dimensions"))?;
    let mut dst = fr::images::Image::new(dst_w, dst_h, fr::PixelType::U8x3);
    let mut resizer = fr::Resizer::new();
    let options =
        fr::ResizeOptions::new().resize_alg(fr::ResizeAlg::Convolution(RESAMPLE_FILTER));

    resizer
        .resize(&src, &mut dst, &options)
        .map_err(|_| AppError::unsupported("failed to resample page raster"))?;

    Ok(dst.into_vec())
}

fn rgb_to_rgba(width: u32, height: u32, rgb: &[u8], alpha: u8) -> AppResult<RgbaImage> {
    let mut pixels = Vec::with_capacity(width as usize * height as usize * 4);
    for chunk in rgb.chunks_exact(3) {
        pixels.extend_from_slice(chunk);
        pixels.push(alpha);
    }
    RgbaImage::from_raw(width, height, pixels).ok_or_else(|| {
        AppError::invalid_argument("rgba pixel buffer length does not match dimensions")
    })
}

fn draw_annotation(
    image: &mut RgbaImage,
    annotation: &Annotation,
    bitmap: (u32, u32),
    display: (u32, u32),
    alpha: u8,
    params: &ComposeParams<'_>,
) {
    let color = stroke_color(annotation.color, alpha);
    match annotation.kind {
        AnnotationKind::Rectangle => {
            draw_stroked_rect(image, annotation, bitmap, display, color, ANNOTATION_STROKE_PX);
        }
        AnnotationKind::Arrow => {
            let p0 = transform::document_to_screen(annotation.start, bitmap, display);
            let p1 = transform::document_to_screen(annotation.end, bitmap, display);
            draw_line_segment_mut(
                image,
                (p0.x as f32, p0.y as f32),
                (p1.x as f32, p1.y as f32),
                color,
            );
        }
        AnnotationKind::Text => {
            let at = transform::document_to_screen(annotation.start, bitmap, display);
            let text = annotation.text.as_deref().unwrap_or("");
            match params.font {
                Some(font) if !text.is_empty() => {
                    draw_text_mut(
                        image,
                        color,
                        at.x as i32,
                        at.y as i32,
                        PxScale::from(params.text_px),
                        font,
                        text,
                    );
                }
                _ => draw_text_caret(image, at, params.text_px, color),
            }
        }
    }
}

fn draw_selection(
    image: &mut RgbaImage,
    annotation: &Annotation,
    bitmap: (u32, u32),
    display: (u32, u32),
    alpha: u8,
) {
    let highlight = stroke_color(Color::HIGHLIGHT, alpha);
    match annotation.kind {
        AnnotationKind::Rectangle | AnnotationKind::Text => {
            draw_stroked_rect(image, annotation, bitmap, display, highlight, SELECTION_STROKE_PX);
        }
        AnnotationKind::Arrow => {
            let p0 = transform::document_to_screen(annotation.start, bitmap, display);
            let p1 = transform::document_to_screen(annotation.end, bitmap, display);
            for offset in 0..SELECTION_STROKE_PX as i32 {
                let shift = (offset - 1) as f32;
                draw_line_segment_mut(
                    image,
                    (p0.x as f32, p0.y as f32 + shift),
                    (p1.x as f32, p1.y as f32 + shift),
                    highlight,
                );
            }
        }
    }
}

/// Hollow rectangle with pixel thickness, drawn as nested 1px rects
/// shrinking inward so the outline never spills outside the bounds.
/// Endpoint pixels are inclusive; bounds outside the image are clipped
/// to it, not shifted into it.
fn draw_stroked_rect(
    image: &mut RgbaImage,
    annotation: &Annotation,
    bitmap: (u32, u32),
    display: (u32, u32),
    color: Rgba<u8>,
    stroke: u32,
) {
    let bounds = annotation.bounds();
    let min = transform::document_to_screen(bounds.origin(), bitmap, display);
    let max = transform::document_to_screen(Point::new(bounds.x1, bounds.y1), bitmap, display);

    let (iw, ih) = (i64::from(image.width()), i64::from(image.height()));
    if max.x < 0.0 || max.y < 0.0 || min.x >= iw as f64 || min.y >= ih as f64 {
        return;
    }
    let x0 = (min.x.floor() as i64).clamp(0, iw - 1);
    let y0 = (min.y.floor() as i64).clamp(0, ih - 1);
    let x1 = (max.x.floor() as i64).clamp(0, iw - 1);
    let y1 = (max.y.floor() as i64).clamp(0, ih - 1);
    let w = (x1 - x0 + 1) as u32;
    let h = (y1 - y0 + 1) as u32;

    for t in 0..stroke {
        let inner_w = w.saturating_sub(2 * t);
        let inner_h = h.saturating_sub(2 * t);
        if inner_w == 0 || inner_h == 0 {
            break;
        }
        let rect =
            PixelRect::at((x0 + i64::from(t)) as i32, (y0 + i64::from(t)) as i32)
                .of_size(inner_w, inner_h);
        draw_hollow_rect_mut(image, rect, color);
    }
}

/// Placeholder glyph when no preview font is configured: a short
/// vertical caret with a foot, sized to the configured text height.
fn draw_text_caret(image: &mut RgbaImage, at: Point, text_px: f32, color: Rgba<u8>) {
    let height = text_px.max(4.0);
    let (x, y) = (at.x as f32, at.y as f32);
    draw_line_segment_mut(image, (x, y), (x, y + height), color);
    draw_line_segment_mut(image, (x, y + height), (x + height * 0.4, y + height), color);
}

// Stroke alpha never exceeds the frame opacity.
fn stroke_color(color: Color, alpha: u8) -> Rgba<u8> {
    Rgba([color.r, color.g, color.b, color.a.min(alpha)])
}
