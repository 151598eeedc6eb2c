use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub render: RenderConfig,
    pub cache: CacheConfig,
    pub view: ViewConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct RenderConfig {
    pub worker_threads: usize,
    pub render_dpi: f32,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            // Two workers bound CPU/memory pressure from concurrent
            // high-DPI rasterization; this is not a throughput knob.
            worker_threads: 2,
            render_dpi: 300.0,
        }
    }
}

impl RenderConfig {
    /// Document-space raster scale: pixels per PDF point at the
    /// configured DPI.
    pub fn dpi_scale(&self) -> f32 {
        self.render_dpi / 72.0
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CacheConfig {
    pub max_entries: usize,
    pub memory_budget_mb: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 256,
            memory_budget_mb: 1024,
        }
    }
}

impl CacheConfig {
    const MEBIBYTE: usize = 1024 * 1024;

    pub fn memory_budget_bytes(&self) -> usize {
        self.memory_budget_mb.saturating_mul(Self::MEBIBYTE).max(1)
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ViewConfig {
    pub zoom_step: f32,
    pub opacity_step: f32,
    pub lock_opacity: f32,
    pub text_preview_px: f32,
    pub font_path: Option<PathBuf>,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            zoom_step: 1.2,
            opacity_step: 0.1,
            lock_opacity: 0.7,
            text_preview_px: 14.0,
            font_path: None,
        }
    }
}

impl Config {
    pub fn load() -> AppResult<Self> {
        let Some(path) = default_config_path() else {
            return Ok(Self::default());
        };
        Self::load_from_path(path)
    }

    pub fn load_from_path(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        if !path.is_file() {
            return Err(AppError::invalid_argument(format!(
                "config path is not a regular file: {}",
                path.display()
            )));
        }

        let raw = fs::read_to_string(path).map_err(|source| {
            AppError::io_with_context(source, format!("failed to read config: {}", path.display()))
        })?;
        let parsed = toml::from_str::<Self>(&raw).map_err(|source| {
            AppError::invalid_argument(format!(
                "failed to parse config {}: {source}",
                path.display()
            ))
        })?;
        Ok(parsed.sanitized())
    }

    fn sanitized(mut self) -> Self {
        self.render.worker_threads = self.render.worker_threads.max(1);
        if !self.render.render_dpi.is_finite() || self.render.render_dpi < 36.0 {
            self.render.render_dpi = RenderConfig::default().render_dpi;
        }
        self.cache.max_entries = self.cache.max_entries.max(1);
        if !self.view.zoom_step.is_finite() || self.view.zoom_step <= 1.0 {
            self.view.zoom_step = ViewConfig::default().zoom_step;
        }
        if !self.view.opacity_step.is_finite() || self.view.opacity_step <= 0.0 {
            self.view.opacity_step = ViewConfig::default().opacity_step;
        }
        if !self.view.lock_opacity.is_finite() {
            self.view.lock_opacity = ViewConfig::default().lock_opacity;
        }
        self.view.lock_opacity = self.view.lock_opacity.clamp(0.1, 1.0);
        if !self.view.text_preview_px.is_finite() || self.view.text_preview_px < 4.0 {
            self.view.text_preview_px = ViewConfig::default().text_preview_px;
        }
        self
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    if let Some(explicit) = std::env::var_os("OVP_CONFIG_PATH")
        && !explicit.is_empty()
    {
        return Some(PathBuf::from(explicit));
    }

    if let Some(xdg) = std::env::var_os("XDG_CONFIG_HOME")
        && !xdg.is_empty()
    {
        return Some(PathBuf::from(xdg).join("ovp").join("config.toml"));
    }
    if let Some(home) = std::env::var_os("HOME")
        && !home.is_empty()
    {
        return Some(
            PathBuf::from(home)
                .join(".config")
                .join("ovp")
                .join("config.toml"),
        );
    }
    if let Some(appdata) = std::env::var_os("APPDATA")
        && !appdata.is_empty()
    {
        return Some(PathBuf::from(appdata).join("ovp").join("config.toml"));
    }
    None
}
