use std::path::Path;
use std::sync::Arc;

use ab_glyph::FontVec;
use kurbo::{Point, Rect};
use log::{debug, info, warn};

use crate::annotations::{Annotation, AnnotationKind, AnnotationStore, Color};
use crate::app::constants::{PLACEHOLDER_GRAY, PLACEHOLDER_SIZE, ZOOM_OUT_STEP};
use crate::app::state::{Tool, ViewState};
use crate::backend::{DocumentBackend, RgbFrame, open_default_backend};
use crate::compositor::{self, ComposeParams};
use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::event::{PointerEvent, WheelEvent, WheelModifier};
use crate::present::PresentationSink;
use crate::render::{PageJob, PageRasterCache, RasterEntry, RasterPool};
use crate::transform;

struct Session {
    doc: Box<dyn DocumentBackend>,
    pool: RasterPool,
}

/// Orchestrates one open document: navigation, zoom and opacity,
/// annotation editing, background rasterization, and presentation.
///
/// All methods run on the event thread. Worker results enter through
/// [`ViewController::ingest_raster_results`], which is the only path
/// that writes finished rasters into the cache.
pub struct ViewController<S: PresentationSink> {
    config: Config,
    sink: S,
    cache: PageRasterCache,
    annotations: AnnotationStore,
    state: ViewState,
    session: Option<Session>,
    font: Option<FontVec>,
    drag_origin: Option<Point>,
}

impl<S: PresentationSink> ViewController<S> {
    pub fn new(config: Config, sink: S) -> Self {
        let font = load_preview_font(&config);
        let cache = PageRasterCache::new(
            config.cache.max_entries,
            config.cache.memory_budget_bytes(),
        );
        Self {
            config,
            sink,
            cache,
            annotations: AnnotationStore::default(),
            state: ViewState::default(),
            session: None,
            font,
            drag_origin: None,
        }
    }

    pub fn state(&self) -> &ViewState {
        &self.state
    }

    pub fn annotations(&self) -> &AnnotationStore {
        &self.annotations
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn cache(&self) -> &PageRasterCache {
        &self.cache
    }

    pub fn has_document(&self) -> bool {
        self.session.is_some()
    }

    /// Opens `path` with the default backend. On failure the previous
    /// session, cache contents, and annotations stay untouched.
    pub fn open_document(&mut self, path: impl AsRef<Path>) -> AppResult<()> {
        let doc = open_default_backend(path.as_ref()).inspect_err(|err| {
            warn!("keeping current document; open failed: {err}");
        })?;
        self.install_document(doc)
    }

    /// Replaces the active session with an already-opened backend.
    /// Advances the cache generation first, so rasters still in flight
    /// for the old document are discarded on arrival.
    pub fn install_document(&mut self, doc: Box<dyn DocumentBackend>) -> AppResult<()> {
        let pool = RasterPool::spawn(doc.as_ref(), self.config.render.worker_threads)
            .inspect_err(|err| {
                warn!("keeping current document; raster pool failed to start: {err}");
            })?;

        let generation = self.cache.begin_generation();
        self.annotations.clear();
        self.state.page_count = doc.page_count();
        self.state.current_page = 0;
        self.state.scroll_offset = (0, 0);
        self.drag_origin = None;

        info!(
            "opened {} ({} pages, doc id {:#x})",
            doc.path().display(),
            doc.page_count(),
            doc.doc_id()
        );

        let mut session = Session { doc, pool };
        let scale = raster_scale(&self.config, self.state.zoom());
        session
            .pool
            .enqueue_document(0, self.state.page_count, scale, generation);
        self.session = Some(session);

        self.show_page(0)
    }

    /// Displays `page` (clamped), pinning it against cache eviction.
    /// Falls back to a synchronous raster on a cache miss; when even
    /// that fails, a placeholder frame is shown instead of an error.
    pub fn show_page(&mut self, page: usize) -> AppResult<()> {
        let page = self.state.clamp_page(page);
        self.state.current_page = page;
        self.cache.pin(page);
        self.refresh()
    }

    pub fn next_page(&mut self) -> AppResult<()> {
        if self.state.has_next_page() {
            self.show_page(self.state.current_page + 1)
        } else {
            Ok(())
        }
    }

    pub fn prev_page(&mut self) -> AppResult<()> {
        if self.state.has_prev_page() {
            self.show_page(self.state.current_page - 1)
        } else {
            Ok(())
        }
    }

    /// Routes a wheel event by modifier: Ctrl zooms, Shift adjusts
    /// opacity, unmodified turns pages. Lock mode admits only the
    /// opacity wheel and swallows everything else.
    pub fn handle_wheel(&mut self, event: WheelEvent) -> AppResult<()> {
        if self.state.locked && event.modifier != WheelModifier::Shift {
            return Ok(());
        }
        match event.modifier {
            WheelModifier::Ctrl => self.zoom_step(event),
            WheelModifier::Shift => self.opacity_step(event.delta_y),
            WheelModifier::None => {
                if event.delta_y < 0.0 {
                    self.next_page()
                } else {
                    self.prev_page()
                }
            }
        }
    }

    fn zoom_step(&mut self, event: WheelEvent) -> AppResult<()> {
        let factor = if event.delta_y > 0.0 {
            f64::from(self.config.view.zoom_step)
        } else {
            ZOOM_OUT_STEP
        };
        let old_zoom = self.state.zoom();
        if !self.state.set_zoom(old_zoom * factor) {
            return Ok(());
        }

        if let Some(page_size) = self.current_page_size() {
            let viewport = self.sink.viewport();
            let old_content = transform::display_size(page_size, viewport, old_zoom);
            let new_content = transform::display_size(page_size, viewport, self.state.zoom());
            let anchor = transform::zoom_anchor(event.pointer, old_content, event.over_content);
            let offset = transform::scroll_offset_after_zoom(anchor, new_content, event.pointer);
            self.state.scroll_offset = offset;
            self.sink.set_scroll_offset(offset.0, offset.1);
        }

        // Ask for a sharper raster at the new scale; until it arrives
        // the existing entry is resampled for display. An entry already
        // at or above the wanted scale keeps serving as-is.
        let scale = raster_scale(&self.config, self.state.zoom());
        let generation = self.cache.generation();
        let page = self.state.current_page;
        let sharp_enough = self
            .cache
            .get_cloned(page)
            .is_some_and(|entry| entry.satisfies_scale(scale));
        if !sharp_enough {
            if let Some(session) = self.session.as_mut() {
                session.pool.enqueue(PageJob {
                    page,
                    scale,
                    generation,
                });
            }
        }
        self.refresh()
    }

    fn opacity_step(&mut self, delta_y: f64) -> AppResult<()> {
        let magnitude = f64::from(self.config.view.opacity_step);
        let step = if delta_y > 0.0 { magnitude } else { -magnitude };
        if !self.state.set_opacity(self.state.opacity() + step) {
            return Ok(());
        }
        self.sink.set_window_opacity(self.state.opacity());
        self.refresh()
    }

    /// Lock mode pins the window above other content at a fixed
    /// translucency; unlocking restores full opacity.
    pub fn toggle_lock(&mut self) -> AppResult<()> {
        self.state.locked = !self.state.locked;
        let opacity = if self.state.locked {
            f64::from(self.config.view.lock_opacity)
        } else {
            1.0
        };
        self.state.set_opacity(opacity);
        self.sink.set_window_opacity(self.state.opacity());
        self.refresh()
    }

    pub fn toggle_maximized(&mut self) -> AppResult<()> {
        self.state.maximized = !self.state.maximized;
        self.sink.set_maximized(self.state.maximized);
        self.refresh()
    }

    pub fn set_tool(&mut self, tool: Tool) {
        self.state.tool = tool;
        self.drag_origin = None;
    }

    pub fn set_tool_color(&mut self, color: Color) {
        self.state.tool_color = color;
    }

    /// Press starts a drag for drawing tools; for the select tool it
    /// hit-tests the annotations under the pointer immediately.
    pub fn pointer_press(&mut self, event: PointerEvent) -> AppResult<()> {
        if self.state.locked {
            return Ok(());
        }
        match self.state.tool {
            Tool::Select => {
                let page = self.state.current_page;
                let hit = match self.geometry() {
                    Some((bitmap, display)) => {
                        self.annotations
                            .hit_test(page, event.position, bitmap, display)
                    }
                    None => None,
                };
                match hit {
                    Some(index) => {
                        self.annotations.select(page, index);
                    }
                    None => self.annotations.clear_selection(),
                }
                self.refresh()
            }
            _ => {
                self.drag_origin = Some(event.position);
                Ok(())
            }
        }
    }

    /// Release completes a drag and creates the annotation in document
    /// coordinates, so it stays put under later zoom changes.
    pub fn pointer_release(&mut self, event: PointerEvent) -> AppResult<()> {
        let Some(origin) = self.drag_origin.take() else {
            return Ok(());
        };
        let Some((bitmap, display)) = self.geometry() else {
            return Ok(());
        };

        let kind = match self.state.tool {
            Tool::Rectangle => AnnotationKind::Rectangle,
            Tool::Arrow => AnnotationKind::Arrow,
            Tool::Text => AnnotationKind::Text,
            Tool::Select => return Ok(()),
        };
        let annotation = Annotation {
            kind,
            start: transform::screen_to_document(origin, bitmap, display),
            end: transform::screen_to_document(event.position, bitmap, display),
            color: self.state.tool_color,
            text: None,
        };
        let page = self.state.current_page;
        let index = self.annotations.add(page, annotation);
        self.annotations.select(page, index);
        self.refresh()
    }

    pub fn delete_selected(&mut self) -> AppResult<()> {
        let Some(selection) = self.annotations.selection() else {
            return Ok(());
        };
        self.annotations.delete(selection.page, selection.index);
        self.refresh()
    }

    pub fn edit_selected_text(&mut self, text: impl Into<String>) -> AppResult<()> {
        let Some(selection) = self.annotations.selection() else {
            return Ok(());
        };
        self.annotations
            .edit_text(selection.page, selection.index, text);
        self.refresh()
    }

    pub fn edit_selected_color(&mut self, color: Color) -> AppResult<()> {
        let Some(selection) = self.annotations.selection() else {
            return Ok(());
        };
        self.annotations
            .edit_color(selection.page, selection.index, color);
        self.refresh()
    }

    /// Rotates the current page by `degrees` (a multiple of 90). The
    /// stale raster is dropped and a replacement queued before redraw,
    /// so the next frame already shows the new orientation via the
    /// synchronous fallback if the pool has not caught up.
    pub fn rotate_page(&mut self, degrees: i32) -> AppResult<()> {
        let page = self.state.current_page;
        {
            let session = self
                .session
                .as_ref()
                .ok_or_else(|| AppError::invalid_argument("no document is open"))?;
            let rotation = session.doc.page_rotation(page)?;
            session
                .doc
                .set_page_rotation(page, (rotation + degrees).rem_euclid(360))?;
        }

        self.cache.invalidate(page);
        let scale = raster_scale(&self.config, self.state.zoom());
        let generation = self.cache.generation();
        if let Some(session) = self.session.as_mut() {
            session.pool.enqueue(PageJob {
                page,
                scale,
                generation,
            });
        }
        self.refresh()
    }

    /// Burns every annotation into the document through the backend
    /// primitives, then saves. Pages ascend; within a page, insertion
    /// order is kept. The first backend failure aborts before `save`.
    pub fn save_document(&mut self, path: &Path) -> AppResult<()> {
        let session = self
            .session
            .as_ref()
            .ok_or_else(|| AppError::invalid_argument("no document is open"))?;

        // Annotations and backend primitives share page-point space,
        // so coordinates pass through untouched.
        for page in self.annotations.pages_with_annotations() {
            for annotation in self.annotations.page(page) {
                let start = annotation.start;
                let end = annotation.end;
                let rgb = annotation.color.as_rgb();
                match annotation.kind {
                    AnnotationKind::Rectangle => {
                        let rect = Rect::new(
                            start.x.min(end.x),
                            start.y.min(end.y),
                            start.x.max(end.x),
                            start.y.max(end.y),
                        );
                        session.doc.draw_rect(page, rect, rgb)?;
                    }
                    AnnotationKind::Arrow => {
                        session.doc.draw_line(page, start, end, rgb)?;
                    }
                    AnnotationKind::Text => {
                        let text = annotation.text.as_deref().unwrap_or("");
                        session.doc.insert_text(page, start, text, rgb)?;
                    }
                }
            }
        }

        session.doc.save(path)?;
        info!("saved annotated document to {}", path.display());
        Ok(())
    }

    /// Drains finished pool jobs into the cache. Stale generations are
    /// rejected by the cache; a refreshed current page triggers one
    /// recomposition at the end.
    pub fn ingest_raster_results(&mut self) -> AppResult<usize> {
        let mut ingested = 0;
        let mut current_updated = false;

        loop {
            let done = match self.session.as_mut() {
                Some(session) => session.pool.try_recv_done(),
                None => None,
            };
            let Some(done) = done else { break };

            match done.result {
                Ok(frame) => {
                    let entry = RasterEntry {
                        page: done.page,
                        frame,
                        render_scale: done.render_scale,
                    };
                    if self.cache.put(done.generation, entry) {
                        ingested += 1;
                        if done.page == self.state.current_page {
                            current_updated = true;
                        }
                    } else {
                        debug!(
                            "discarded raster for page {} from generation {}",
                            done.page, done.generation
                        );
                    }
                }
                Err(err) => warn!("background raster of page {} failed: {err}", done.page),
            }
        }

        if current_updated {
            self.refresh()?;
        }
        Ok(ingested)
    }

    /// Waits for in-flight renders before shutdown so worker forks are
    /// not torn down mid-raster.
    pub async fn drain_pool(&mut self) {
        if let Some(session) = self.session.as_mut() {
            session.pool.drain().await;
        }
    }

    /// Recomposes and presents the current page from whatever raster
    /// is available.
    fn refresh(&mut self) -> AppResult<()> {
        if self.session.is_none() {
            return Ok(());
        }
        let page = self.state.current_page;
        let wanted = raster_scale(&self.config, self.state.zoom());

        // Any cached raster is good enough to resample for display; a
        // sharper one arrives via the pool when the scale changed.
        let entry = match self.cache.get_cloned(page) {
            Some(entry) => Some(entry),
            None => self.rasterize_now(page, wanted),
        };

        let entry = entry.unwrap_or_else(|| placeholder_entry(page));
        self.present_entry(&entry)
    }

    fn rasterize_now(&mut self, page: usize, scale: f32) -> Option<RasterEntry> {
        let session = self.session.as_ref()?;
        match session.doc.rasterize_page(page, scale, scale) {
            Ok(frame) => {
                let entry = RasterEntry {
                    page,
                    frame,
                    render_scale: scale,
                };
                let generation = self.cache.generation();
                self.cache.put(generation, entry.clone());
                Some(entry)
            }
            Err(err) => {
                warn!("synchronous raster of page {page} failed: {err}");
                None
            }
        }
    }

    fn present_entry(&mut self, entry: &RasterEntry) -> AppResult<()> {
        let page_size = page_size(entry);
        let viewport = self.sink.viewport();
        let display = transform::display_size(page_size, viewport, self.state.zoom());
        let page = self.state.current_page;
        let selected = self
            .annotations
            .selection()
            .filter(|selection| selection.page == page)
            .map(|selection| selection.index);

        let params = ComposeParams {
            annotations: self.annotations.page(page),
            selected,
            page_size,
            display,
            opacity: self.state.opacity(),
            font: self.font.as_ref(),
            text_px: self.config.view.text_preview_px,
        };
        let image = compositor::compose_page(&entry.frame, &params)?;
        self.sink.present(&image)
    }

    fn current_page_size(&mut self) -> Option<(u32, u32)> {
        let page = self.state.current_page;
        self.cache.get_cloned(page).map(|entry| page_size(&entry))
    }

    fn geometry(&mut self) -> Option<((u32, u32), (u32, u32))> {
        let page_size = self.current_page_size()?;
        let viewport = self.sink.viewport();
        let display = transform::display_size(page_size, viewport, self.state.zoom());
        Some((page_size, display))
    }
}

/// Page size in points, recovered from the raster and its scale. This
/// is the zoom-independent space annotations are stored in.
fn page_size(entry: &RasterEntry) -> (u32, u32) {
    let scale = if entry.render_scale > 0.0 {
        entry.render_scale
    } else {
        1.0
    };
    (
        ((entry.frame.width as f32 / scale).round() as u32).max(1),
        ((entry.frame.height as f32 / scale).round() as u32).max(1),
    )
}

fn raster_scale(config: &Config, zoom: f64) -> f32 {
    (zoom * f64::from(config.render.dpi_scale())) as f32
}

fn placeholder_entry(page: usize) -> RasterEntry {
    let (width, height) = PLACEHOLDER_SIZE;
    RasterEntry {
        page,
        frame: RgbFrame {
            width,
            height,
            stride: width as usize * 3,
            pixels: Arc::from(vec![
                PLACEHOLDER_GRAY;
                width as usize * height as usize * 3
            ]),
        },
        render_scale: 1.0,
    }
}

fn load_preview_font(config: &Config) -> Option<FontVec> {
    let path = config.view.font_path.as_ref()?;
    match std::fs::read(path) {
        Ok(bytes) => match FontVec::try_from_vec(bytes) {
            Ok(font) => Some(font),
            Err(_) => {
                warn!(
                    "ignoring preview font {}: not a parsable font file",
                    path.display()
                );
                None
            }
        },
        Err(err) => {
            warn!("ignoring preview font {}: {err}", path.display());
            None
        }
    }
}
