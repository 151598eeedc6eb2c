use std::path::{Path, PathBuf};
use std::process;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

use image::RgbaImage;
use kurbo::{Point, Rect};

use crate::backend::{DocumentBackend, RgbFrame};
use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::present::PresentationSink;

/// Test config: one worker and 72 dpi so raster scale equals zoom and
/// frames stay small.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.render.worker_threads = 1;
    config.render.render_dpi = 72.0;
    config
}

pub fn unique_temp_path(suffix: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock should be after unix epoch")
        .as_nanos();

    let mut path = std::env::temp_dir();
    path.push(format!("ovp_{suffix}_{}_{}", process::id(), nanos));
    path
}

/// Recording presentation double. Every display-side effect lands in a
/// field the tests can assert on.
pub struct TestSink {
    pub viewport: (u32, u32),
    pub presented: usize,
    pub last_frame: Option<RgbaImage>,
    pub opacity_calls: Vec<f64>,
    pub scroll: Option<(i32, i32)>,
    pub maximized: bool,
}

impl TestSink {
    pub fn new(viewport: (u32, u32)) -> Self {
        Self {
            viewport,
            presented: 0,
            last_frame: None,
            opacity_calls: Vec::new(),
            scroll: None,
            maximized: false,
        }
    }

    pub fn last_alpha(&self) -> Option<u8> {
        self.last_frame
            .as_ref()
            .and_then(|frame| frame.pixels().next().map(|px| px.0[3]))
    }
}

impl PresentationSink for TestSink {
    fn present(&mut self, frame: &RgbaImage) -> AppResult<()> {
        self.presented += 1;
        self.last_frame = Some(frame.clone());
        Ok(())
    }

    fn set_window_opacity(&mut self, opacity: f64) {
        self.opacity_calls.push(opacity);
    }

    fn set_scroll_offset(&mut self, x: i32, y: i32) {
        self.scroll = Some((x, y));
    }

    fn set_maximized(&mut self, maximized: bool) {
        self.maximized = maximized;
    }

    fn viewport(&self) -> (u32, u32) {
        self.viewport
    }
}

/// Fake document backend that records burn-in and save calls, with a
/// working rotation table shared across render forks.
pub struct ScriptedBackend {
    path: PathBuf,
    pages: usize,
    page_side: u32,
    pub log: Arc<Mutex<Vec<String>>>,
    pub rotations: Arc<RwLock<Vec<i32>>>,
    fail_draw: bool,
}

impl ScriptedBackend {
    pub fn new(pages: usize, page_side: u32) -> Self {
        Self {
            path: PathBuf::from("scripted.pdf"),
            pages,
            page_side,
            log: Arc::new(Mutex::new(Vec::new())),
            rotations: Arc::new(RwLock::new(vec![0; pages])),
            fail_draw: false,
        }
    }

    pub fn failing_draws(mut self) -> Self {
        self.fail_draw = true;
        self
    }

    fn record(&self, entry: String) {
        self.log
            .lock()
            .expect("log lock should not be poisoned")
            .push(entry);
    }
}

impl DocumentBackend for ScriptedBackend {
    fn path(&self) -> &Path {
        &self.path
    }

    fn doc_id(&self) -> u64 {
        0xfa4e
    }

    fn page_count(&self) -> usize {
        self.pages
    }

    fn page_rotation(&self, page: usize) -> AppResult<i32> {
        self.rotations
            .read()
            .map_err(|_| AppError::invalid_argument("rotation table lock was poisoned"))?
            .get(page)
            .copied()
            .ok_or_else(|| AppError::invalid_argument("page index is out of range"))
    }

    fn set_page_rotation(&self, page: usize, degrees: i32) -> AppResult<()> {
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

    fn rasterize_page(&self, page: usize, scale_x: f32, _scale_y: f32) -> AppResult<RgbFrame> {
        if page >= self.pages {
            return Err(AppError::invalid_argument("page index is out of range"));
        }
        let side = ((self.page_side as f32 * scale_x).round() as u32).max(1);
        Ok(RgbFrame {
            width: side,
            height: side,
            stride: side as usize * 3,
            pixels: Arc::from(vec![0xffu8; side as usize * side as usize * 3]),
        })
    }

    fn fork_for_render(&self) -> AppResult<Box<dyn DocumentBackend>> {
        Ok(Box::new(Self {
            path: self.path.clone(),
            pages: self.pages,
            page_side: self.page_side,
            log: Arc::clone(&self.log),
            rotations: Arc::clone(&self.rotations),
            fail_draw: self.fail_draw,
        }))
    }

    fn draw_rect(&self, page: usize, rect: Rect, rgb: [u8; 3]) -> AppResult<()> {
        if self.fail_draw {
            return Err(AppError::unsupported("draw_rect is scripted to fail"));
        }
        self.record(format!(
            "rect page={page} ({:.0},{:.0})-({:.0},{:.0}) rgb={rgb:?}",
            rect.x0, rect.y0, rect.x1, rect.y1
        ));
        Ok(())
    }

    fn draw_line(&self, page: usize, p0: Point, p1: Point, rgb: [u8; 3]) -> AppResult<()> {
        if self.fail_draw {
            return Err(AppError::unsupported("draw_line is scripted to fail"));
        }
        self.record(format!(
            "line page={page} ({:.0},{:.0})-({:.0},{:.0}) rgb={rgb:?}",
            p0.x, p0.y, p1.x, p1.y
        ));
        Ok(())
    }

    fn insert_text(&self, page: usize, at: Point, text: &str, rgb: [u8; 3]) -> AppResult<()> {
        if self.fail_draw {
            return Err(AppError::unsupported("insert_text is scripted to fail"));
        }
        self.record(format!(
            "text page={page} ({:.0},{:.0}) {text:?} rgb={rgb:?}",
            at.x, at.y
        ));
        Ok(())
    }

    fn save(&self, path: &Path) -> AppResult<()> {
        self.record(format!("save {}", path.display()));
        Ok(())
    }
}

/// Builds a minimal multi-page PDF in memory, one text line per page.
pub fn build_pdf(page_texts: &[&str]) -> Vec<u8> {
    let page_texts = if page_texts.is_empty() {
        vec![""]
    } else {
        page_texts.to_vec()
    };

    let page_count = page_texts.len();
    let page_ids: Vec<usize> = (0..page_count).map(|i| 4 + i * 2).collect();

    let mut objects = Vec::new();
    objects.push("<< /Type /Catalog /Pages 2 0 R >>".to_string());

    let kids = page_ids
        .iter()
        .map(|id| format!("{id} 0 R"))
        .collect::<Vec<_>>()
        .join(" ");
    objects.push(format!(
        "<< /Type /Pages /Kids [{kids}] /Count {page_count} >>"
    ));
    objects.push("<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>".to_string());

    for (index, text) in page_texts.iter().enumerate() {
        let content_id = 5 + index * 2;
        let escaped = escape_literal_string(text);
        let stream = format!("BT /F1 12 Tf 24 170 Td ({escaped}) Tj ET");

        let page_obj = format!(
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 200 200] /Resources << /Font << /F1 3 0 R >> >> /Contents {content_id} 0 R >>"
        );
        let content_obj = format!(
            "<< /Length {} >>\nstream\n{}\nendstream",
            stream.len(),
            stream
        );

        objects.push(page_obj);
        objects.push(content_obj);
    }

    let mut bytes = Vec::new();
    bytes.extend_from_slice(b"%PDF-1.4\n%\xE2\xE3\xCF\xD3\n");

    let mut offsets = Vec::new();
    offsets.push(0_usize);
    for (index, object) in objects.iter().enumerate() {
        let object_id = index + 1;
        offsets.push(bytes.len());
        bytes.extend_from_slice(format!("{object_id} 0 obj\n{object}\nendobj\n").as_bytes());
    }

    let xref_start = bytes.len();
    bytes.extend_from_slice(format!("xref\n0 {}\n", objects.len() + 1).as_bytes());
    bytes.extend_from_slice(b"0000000000 65535 f \n");
    for offset in offsets.iter().skip(1) {
        bytes.extend_from_slice(format!("{offset:010} 00000 n \n").as_bytes());
    }

    bytes.extend_from_slice(
        format!(
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
            objects.len() + 1,
            xref_start
        )
        .as_bytes(),
    );

    bytes
}

fn escape_literal_string(text: &str) -> String {
    let mut out = String::with_capacity(text.len());

    for ch in text.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '(' => out.push_str("\\("),
            ')' => out.push_str("\\)"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => out.push(ch),
        }
    }

    out
}
