use std::ffi::OsString;
use std::fs::File;
use std::path::PathBuf;

use image::RgbaImage;
use log::{LevelFilter, info};
use simplelog::{Config as LogConfig, WriteLogger};

use ovp::app::ViewController;
use ovp::config::Config;
use ovp::error::{AppError, AppResult};
use ovp::present::PresentationSink;

const DEFAULT_VIEWPORT: (u32, u32) = (1280, 960);

#[tokio::main(flavor = "multi_thread")]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

async fn run() -> AppResult<()> {
    let args = CliArgs::parse(std::env::args_os())?;

    WriteLogger::init(
        LevelFilter::Info,
        LogConfig::default(),
        File::create("ovp.log")?,
    )
    .map_err(|err| AppError::invalid_argument(format!("failed to install logger: {err}")))?;

    let config = match &args.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };
    info!("rendering {} page {}", args.input.display(), args.page);

    let sink = PngSink::new(DEFAULT_VIEWPORT);
    let mut controller = ViewController::new(config, sink);
    controller.open_document(&args.input)?;
    controller.show_page(args.page)?;
    controller.drain_pool().await;
    controller.ingest_raster_results()?;

    let frame = controller
        .sink()
        .last_frame
        .clone()
        .ok_or_else(|| AppError::invalid_argument("no frame was presented"))?;
    frame
        .save(&args.out)
        .map_err(|err| AppError::invalid_argument(format!("failed to write PNG: {err}")))?;
    info!("wrote {}", args.out.display());
    Ok(())
}

/// Headless sink: remembers the last composed frame so it can be
/// written to disk after the page settles.
struct PngSink {
    viewport: (u32, u32),
    last_frame: Option<RgbaImage>,
}

impl PngSink {
    fn new(viewport: (u32, u32)) -> Self {
        Self {
            viewport,
            last_frame: None,
        }
    }
}

impl PresentationSink for PngSink {
    fn present(&mut self, frame: &RgbaImage) -> AppResult<()> {
        self.last_frame = Some(frame.clone());
        Ok(())
    }

    fn set_window_opacity(&mut self, _opacity: f64) {}

    fn set_scroll_offset(&mut self, _x: i32, _y: i32) {}

    fn set_maximized(&mut self, _maximized: bool) {}

    fn viewport(&self) -> (u32, u32) {
        self.viewport
    }
}

#[derive(Debug, PartialEq)]
struct CliArgs {
    input: PathBuf,
    page: usize,
    out: PathBuf,
    config: Option<PathBuf>,
}

impl CliArgs {
    const USAGE: &'static str =
        "usage: ovp <file.pdf> [--page N] [--out FILE.png] [--config FILE.toml]";

    fn parse<I>(mut args: I) -> AppResult<Self>
    where
        I: Iterator<Item = OsString>,
    {
        let _program = args.next();
        let mut input = None;
        let mut page = 0usize;
        let mut out = PathBuf::from("page.png");
        let mut config = None;

        while let Some(arg) = args.next() {
            match arg.to_str() {
                Some("--page") => {
                    let value = args
                        .next()
                        .and_then(|v| v.to_str().and_then(|v| v.parse().ok()));
                    page = value
                        .ok_or_else(|| AppError::invalid_argument("--page expects a number"))?;
                }
                Some("--out") => {
                    out = args
                        .next()
                        .map(PathBuf::from)
                        .ok_or_else(|| AppError::invalid_argument("--out expects a path"))?;
                }
                Some("--config") => {
                    config = Some(args.next().map(PathBuf::from).ok_or_else(|| {
                        AppError::invalid_argument("--config expects a path")
                    })?);
                }
                Some(flag) if flag.starts_with("--") => {
                    return Err(AppError::invalid_argument(Self::USAGE));
                }
                _ => {
                    if input.replace(PathBuf::from(&arg)).is_some() {
                        return Err(AppError::invalid_argument(Self::USAGE));
                    }
                }
            }
        }

        let input = input.ok_or_else(|| AppError::invalid_argument(Self::USAGE))?;
        Ok(Self {
            input,
            page,
            out,
            config,
        })
    }
}
