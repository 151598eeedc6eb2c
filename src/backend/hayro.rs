use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use hayro::hayro_interpret::InterpreterSettings;
use hayro::hayro_syntax::Pdf;
use hayro::vello_cpu::color::palette::css::WHITE;
use hayro::{RenderSettings, render};
use kurbo::{Point, Rect};

use crate::error::{AppError, AppResult};

use super::traits::{DocumentBackend, RgbFrame};

/// Hayro-backed document handle.
///
/// The hayro stack is render-only: the burn-in primitives and `save`
/// report `Unsupported`, which the save flow surfaces to the caller.
pub struct PdfDoc {
    path: PathBuf,
    doc_id: u64,
    bytes: Arc<Vec<u8>>,
    pdf: Pdf,
    // Shared across render forks so rotation set on one handle is
    // observed by every worker before its next raster request.
    rotations: Arc<RwLock<Vec<i32>>>,
}

impl DocumentBackend for PdfDoc {
    fn path(&self) -> &Path {
        &self.path
    }

    fn doc_id(&self) -> u64 {
        self.doc_id
    }

    fn page_count(&self) -> usize {
        self.pdf.pages().len()
    }

    fn page_rotation(&self, page: usize) -> AppResult<i32> {
        let rotations = self
            .rotations
            .read()
            .map_err(|_| AppError::invalid_argument("rotation table lock was poisoned"))?;
        rotations
            .get(page)
            .copied()
            .ok_or_else(|| AppError::invalid_argument("page index is out of range"))
    }

    fn set_page_rotation(&self, page: usize, degrees: i32) -> AppResult<()> {
        if degrees.rem_euclid(90) != 0 {
            return Err(AppError::invalid_argument(
                "rotation must be a multiple of 90 degrees",
            ));
        }
        let mut rotations = self
            .rotations
            .write()
            .map_err(|_| AppError::invalid_argument("rotation table lock was poisoned"))?;
        let slot = rotations
            .get_mut(page)
            .ok_or_else(|| AppError::invalid_argument("page index is out of range"))?;
        *slot = degrees.rem_euclid(360);
        Ok(())
    }

    fn rasterize_page(&self, page: usize, scale_x: f32, scale_y: f32) -> AppResult<RgbFrame> {
        if !scale_x.is_finite() || scale_x <= 0.0 || !scale_y.is_finite() || scale_y <= 0.0 {
            return Err(AppError::invalid_argument(
                "raster scale must be positive and finite",
            ));
        }

        let rotation = self.page_rotation(page)?;
        let page_ref = self
            .pdf
            .pages()
            .get(page)
            .ok_or_else(|| AppError::invalid_argument("page index is out of range"))?;

        let render_settings = RenderSettings {
            x_scale: scale_x,
            y_scale: scale_y,
            bg_color: WHITE,
            ..Default::default()
        };
        let interpreter_settings = InterpreterSettings::default();
        let pixmap = render(page_ref, &interpreter_settings, &render_settings);

        let frame = rgba_to_rgb(
            pixmap.width() as u32,
            pixmap.height() as u32,
            pixmap.data_as_u8_slice(),
        );
        Ok(rotate_frame(frame, rotation))
    }

    fn fork_for_render(&self) -> AppResult<Box<dyn DocumentBackend>> {
        let bytes = Arc::clone(&self.bytes);
        let pdf = Pdf::new(bytes)
            .map_err(|_| AppError::decode("failed to reparse PDF for render worker"))?;
        Ok(Box::new(Self {
            path: self.path.clone(),
            doc_id: self.doc_id,
            bytes: Arc::clone(&self.bytes),
            pdf,
            rotations: Arc::clone(&self.rotations),
        }))
    }

    fn draw_rect(&self, _page: usize, _rect: Rect, _rgb: [u8; 3]) -> AppResult<()> {
        Err(AppError::unsupported(
            "hayro backend is render-only; shape burn-in requires a writable backend",
        ))
    }

    fn draw_line(&self, _page: usize, _p0: Point, _p1: Point, _rgb: [u8; 3]) -> AppResult<()> {
        Err(AppError::unsupported(
            "hayro backend is render-only; shape burn-in requires a writable backend",
        ))
    }

    fn insert_text(&self, _page: usize, _at: Point, _text: &str, _rgb: [u8; 3]) -> AppResult<()> {
        Err(AppError::unsupported(
            "hayro backend is render-only; text burn-in requires a writable backend",
        ))
    }

    fn save(&self, _path: &Path) -> AppResult<()> {
        Err(AppError::unsupported(
            "hayro backend is render-only; saving requires a writable backend",
        ))
    }
}

impl PdfDoc {
    pub fn open(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref();
        let bytes = Self::load_shared_bytes(path)?;
        Self::open_with_shared_bytes(path, bytes)
    }

    pub fn load_shared_bytes(path: impl AsRef<Path>) -> AppResult<Arc<Vec<u8>>> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Err(AppError::invalid_argument("pdf path must not be empty"));
        }
        if !path.exists() {
            return Err(AppError::io_with_context(
                std::io::Error::new(std::io::ErrorKind::NotFound, "missing file"),
                format!("pdf file not found: {}", path.display()),
            ));
        }
        if !path.is_file() {
            return Err(AppError::invalid_argument(
                "pdf path must be a regular file",
            ));
        }

        let bytes = Arc::new(std::fs::read(path)?);
        if !bytes.as_slice().starts_with(b"%PDF-") {
            return Err(AppError::decode("input does not carry a PDF header"));
        }

        Ok(bytes)
    }

    pub fn open_with_shared_bytes(path: impl AsRef<Path>, bytes: Arc<Vec<u8>>) -> AppResult<Self> {
        let path = path.as_ref();
        if !bytes.as_slice().starts_with(b"%PDF-") {
            return Err(AppError::decode("input does not carry a PDF header"));
        }
        let doc_id = calculate_doc_id(path, bytes.len());
        let shared = Arc::clone(&bytes);
        let pdf = Pdf::new(shared)
            .map_err(|_| AppError::decode("failed to parse PDF with hayro"))?;
        let page_count = pdf.pages().len();

        Ok(Self {
            path: path.to_path_buf(),
            doc_id,
            bytes,
            pdf,
            rotations: Arc::new(RwLock::new(vec![0; page_count])),
        })
    }
}

fn calculate_doc_id(path: &Path, byte_len: usize) -> u64 {
    let mut hasher = DefaultHasher::new();
    path.hash(&mut hasher);
    byte_len.hash(&mut hasher);
    hasher.finish()
}

fn rgba_to_rgb(width: u32, height: u32, rgba: &[u8]) -> RgbFrame {
    let mut pixels = Vec::with_capacity(width as usize * height as usize * 3);
    for chunk in rgba.chunks_exact(4) {
        pixels.extend_from_slice(&chunk[..3]);
    }
    RgbFrame {
        width,
        height,
        stride: width as usize * 3,
        pixels: pixels.into(),
    }
}

/// Rotates a tight RGB8 frame clockwise by a multiple of 90 degrees.
fn rotate_frame(frame: RgbFrame, degrees: i32) -> RgbFrame {
    let degrees = degrees.rem_euclid(360);
    if degrees == 0 {
        return frame;
    }

    let (w, h) = (frame.width as usize, frame.height as usize);
    let src = frame.to_tight_rgb();
    let (out_w, out_h) = match degrees {
        90 | 270 => (h, w),
        _ => (w, h),
    };
    let mut dst = vec![0u8; src.len()];

    for y in 0..h {
        for x in 0..w {
            let (dx, dy) = match degrees {
                90 => (h - 1 - y, x),
                180 => (w - 1 - x, h - 1 - y),
                270 => (y, w - 1 - x),
                _ => (x, y),
            };
            let s = (y * w + x) * 3;
            let d = (dy * out_w + dx) * 3;
            dst[d..d + 3].copy_from_slice(&src[s..s + 3]);
        }
    }

    RgbFrame {
        width: out_w as u32,
        height: out_h as u32,
        stride: out_w * 3,
        pixels: dst.into(),
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;
    use std::process;
    use std::sync::Arc;
    use std::time::{SystemTime, UNIX_EPOCH};

    use super::{PdfDoc, RgbFrame, rotate_frame};
    use crate::backend::DocumentBackend;

    fn unique_temp_path(suffix: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock should be after unix epoch")
            .as_nanos();
        let mut path = std::env::temp_dir();
        path.push(format!("ovp_hayro_{suffix}_{}_{}", process::id(), nanos));
        path
    }

    /// One empty 100x200 page, enough for raster geometry checks.
    fn minimal_pdf() -> Vec<u8> {
        let stream = "BT ET";
        let objects = [
            "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
            "<< /Type /Pages /Kids [3 0 R] /Count 1 >>".to_string(),
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 100 200] /Contents 4 0 R >>".to_string(),
            format!(
                "<< /Length {} >>\nstream\n{stream}\nendstream",
                stream.len()
            ),
        ];

        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"%PDF-1.4\n%\xE2\xE3\xCF\xD3\n");

        let mut offsets = Vec::new();
        for (index, object) in objects.iter().enumerate() {
            offsets.push(bytes.len());
            bytes.extend_from_slice(format!("{} 0 obj\n{object}\nendobj\n", index + 1).as_bytes());
        }

        let xref_start = bytes.len();
        bytes.extend_from_slice(format!("xref\n0 {}\n", objects.len() + 1).as_bytes());
        bytes.extend_from_slice(b"0000000000 65535 f \n");
        for offset in &offsets {
            bytes.extend_from_slice(format!("{offset:010} 00000 n \n").as_bytes());
        }
        bytes.extend_from_slice(
            format!(
                "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{xref_start}\n%%EOF\n",
                objects.len() + 1
            )
            .as_bytes(),
        );
        bytes
    }

    fn open_minimal(suffix: &str) -> (PdfDoc, PathBuf) {
        let file = unique_temp_path(suffix);
        fs::write(&file, minimal_pdf()).expect("test file should be created");
        let doc = PdfDoc::open(&file).expect("pdf should open");
        (doc, file)
    }

    #[test]
    fn open_rejects_bytes_without_pdf_header() {
        let file = unique_temp_path("junk.pdf");
        fs::write(&file, b"not a pdf at all").expect("test file should be created");

        assert!(PdfDoc::open(&file).is_err());

        fs::remove_file(&file).expect("test file should be removed");
    }

    #[test]
    fn rasterize_scales_the_page_box() {
        let (doc, file) = open_minimal("scale.pdf");

        let base = doc.rasterize_page(0, 1.0, 1.0).expect("raster should succeed");
        assert_eq!((base.width, base.height), (100, 200));
        assert_eq!(base.stride, base.width as usize * 3);

        let doubled = doc.rasterize_page(0, 2.0, 2.0).expect("raster should succeed");
        assert_eq!((doubled.width, doubled.height), (200, 400));

        assert!(doc.rasterize_page(0, 0.0, 1.0).is_err());

        fs::remove_file(&file).expect("test file should be removed");
    }

    #[test]
    fn rotation_transposes_raster_and_reaches_forks() {
        let (doc, file) = open_minimal("rotate.pdf");

        assert!(doc.set_page_rotation(0, 45).is_err());
        doc.set_page_rotation(0, 90).expect("rotation should apply");

        let fork = doc.fork_for_render().expect("fork should succeed");
        assert_eq!(fork.page_rotation(0).expect("rotation should read"), 90);

        let frame = fork.rasterize_page(0, 1.0, 1.0).expect("raster should succeed");
        assert_eq!((frame.width, frame.height), (200, 100));

        fs::remove_file(&file).expect("test file should be removed");
    }

    fn frame_2x1(px0: [u8; 3], px1: [u8; 3]) -> RgbFrame {
        let mut pixels = Vec::new();
        pixels.extend_from_slice(&px0);
        pixels.extend_from_slice(&px1);
        RgbFrame {
            width: 2,
            height: 1,
            stride: 6,
            pixels: Arc::from(pixels),
        }
    }

    #[test]
    fn rotate_90_transposes_dimensions() {
        let rotated = rotate_frame(frame_2x1([1, 1, 1], [2, 2, 2]), 90);
        assert_eq!((rotated.width, rotated.height), (1, 2));
        // Clockwise: left pixel ends up at the top.
        assert_eq!(&rotated.pixels[..3], &[1, 1, 1]);
        assert_eq!(&rotated.pixels[3..], &[2, 2, 2]);
    }

    #[test]
    fn rotate_180_reverses_row() {
        let rotated = rotate_frame(frame_2x1([1, 1, 1], [2, 2, 2]), 180);
        assert_eq!((rotated.width, rotated.height), (2, 1));
        assert_eq!(&rotated.pixels[..3], &[2, 2, 2]);
    }

    #[test]
    fn rotate_360_is_identity() {
        let frame = frame_2x1([9, 9, 9], [3, 3, 3]);
        let rotated = rotate_frame(frame.clone(), 360);
        assert_eq!(rotated, frame);
    }
}
