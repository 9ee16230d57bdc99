//! OCR Recorder
//!
//! Command-line front end: processes a video offline, samples the screen in
//! real time, extracts a calibration preview frame, or charts a recorded
//! session.

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use ocr_recorder::analysis::{self, overlay::draw_region_outlines};
use ocr_recorder::config::{self, AppConfig};
use ocr_recorder::ocr::setup::{ensure_tessdata, find_tesseract_executable};
use ocr_recorder::recorder::csv_writer::format_value;
use ocr_recorder::region::persist::load_region_file;
use ocr_recorder::{logging, paths, Command, Readings, Session, VideoSampler};

#[derive(Parser)]
#[command(name = "ocr-recorder", version, about = "Records numeric readouts from video or screen via OCR")]
struct Cli {
    /// Config file (defaults to config.json next to the executable)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand)]
enum Mode {
    /// Process a video file and record its readouts
    Video {
        video: PathBuf,
        /// Region definitions (JSON)
        #[arg(long)]
        regions: PathBuf,
        /// Samples per second of video (overrides config)
        #[arg(long)]
        rate: Option<f64>,
        /// Output CSV (defaults to a timestamped file in the output dir)
        #[arg(long)]
        out: Option<PathBuf>,
        /// Maximum concurrent OCR workers
        #[arg(long)]
        threads: Option<usize>,
    },
    /// Sample the screen in real time while recording
    Screen {
        #[arg(long)]
        regions: PathBuf,
        #[arg(long)]
        fps: Option<f64>,
        /// Stop after this many seconds
        #[arg(long, default_value_t = 60.0)]
        duration: f64,
        #[arg(long)]
        out: Option<PathBuf>,
        #[arg(long, default_value_t = 0)]
        monitor: usize,
    },
    /// Save the midpoint frame of a video, for picking region areas
    Preview {
        video: PathBuf,
        #[arg(long)]
        out: PathBuf,
        /// Outline the areas of these region definitions on the frame
        #[arg(long)]
        regions: Option<PathBuf>,
    },
    /// Chart a recorded session CSV, one panel per field
    Plot {
        csv: PathBuf,
        /// Output PNG (defaults to the CSV path with a .png extension)
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_notes = config::init_config(cli.config.as_deref())?;
    let config = config::get_config();

    let log_file = config.log_to_file.then(paths::get_log_file);
    logging::init_logging(log_file.as_deref())?;
    logging::install_panic_hook();
    for (level, message) in config_notes {
        log::log!(level, "{}", message);
    }
    log::debug!("Config: {:?}", config);

    match cli.mode {
        Mode::Video {
            video,
            regions,
            rate,
            out,
            threads,
        } => run_video(config, &video, &regions, rate, out, threads),
        Mode::Screen {
            regions,
            fps,
            duration,
            out,
            monitor,
        } => run_screen(config, &regions, fps, duration, out, monitor),
        Mode::Preview {
            video,
            out,
            regions,
        } => run_preview(config, &video, &out, regions.as_deref()),
        Mode::Plot { csv, out } => {
            let chart = analysis::plot_session(&csv, out.as_deref())?;
            println!("Chart saved to {}", chart.display());
            Ok(())
        }
    }
}

/// Warns early when OCR can't work; regions would silently read nothing.
fn check_tesseract(config: &AppConfig) {
    if let Err(e) = find_tesseract_executable(config.tesseract.executable.as_deref()) {
        log::warn!("{:#}", e);
        log::warn!("OCR features may not work correctly.");
    }
    if config.tesseract.tessdata_dir.is_none() {
        if let Err(e) = ensure_tessdata(&config.tesseract.language) {
            log::warn!("Failed to set up tessdata: {:#}", e);
        }
    }
}

fn format_readings(names: &[String], readings: &Readings) -> String {
    names
        .iter()
        .filter(|name| readings.contains_key(*name))
        .map(|name| {
            let value = format_value(readings.get(name).copied().flatten());
            format!("{}={}", name, if value.is_empty() { "-" } else { value.as_str() })
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn open_session(config: &AppConfig, regions: &Path, out: Option<PathBuf>) -> Result<Session> {
    check_tesseract(config);

    let mut session = Session::from_config(config);
    session
        .load_regions(regions)
        .with_context(|| format!("Failed to load regions from {}", regions.display()))?;
    session.recorder_mut().set_output_path(out);
    Ok(session)
}

fn run_video(
    config: &AppConfig,
    video: &Path,
    regions: &Path,
    rate: Option<f64>,
    out: Option<PathBuf>,
    threads: Option<usize>,
) -> Result<()> {
    let mut session = open_session(config, regions, out)?;
    if threads.is_some() {
        session.apply(Command::SetMaxThreads(threads))?;
    }

    let mut sampler = VideoSampler::from_config(config);
    if let Some(rate) = rate {
        sampler.set_sample_rate(rate);
    }
    sampler.open(video, config)?;

    let names = session.recorder().field_names();
    let saved = sampler.process_video(&mut session, |readings, [idx, total]| {
        println!("[{}/{}] {}", idx, total, format_readings(&names, readings));
    })?;

    if let Some(path) = saved {
        println!("Saved {}", path.display());
    }
    Ok(())
}

#[cfg(feature = "screen-capture")]
fn run_screen(
    config: &AppConfig,
    regions: &Path,
    fps: Option<f64>,
    duration: f64,
    out: Option<PathBuf>,
    monitor: usize,
) -> Result<()> {
    use ocr_recorder::capture::ScreenSource;
    use ocr_recorder::RealtimeSampler;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    let mut session = open_session(config, regions, out)?;
    let mut source = ScreenSource::new(monitor)?;

    let mut sampler = RealtimeSampler::from_config(config);
    if let Some(fps) = fps {
        sampler.set_fps(fps);
    }

    let stop = sampler.stop_handle();
    let run_for = Duration::from_secs_f64(duration.max(0.0));
    std::thread::spawn(move || {
        std::thread::sleep(run_for);
        stop.store(true, Ordering::SeqCst);
    });

    let names = session.recorder().field_names();
    session.apply(Command::ToggleRecording(true))?;
    sampler.run(&mut source, &mut session, None, |session, readings| {
        println!(
            "[{:.1}s | {:.1} fps] {}",
            session.recorder().recording_time(),
            session.recorder().get_average_fps(),
            format_readings(&names, readings)
        );
    })?;

    let path = session.recorder_mut().stop_recording()?;
    println!("Saved {}", path.display());
    Ok(())
}

#[cfg(not(feature = "screen-capture"))]
fn run_screen(
    _config: &AppConfig,
    _regions: &Path,
    _fps: Option<f64>,
    _duration: f64,
    _out: Option<PathBuf>,
    _monitor: usize,
) -> Result<()> {
    Err(anyhow!(
        "Screen capture is not available in this build (enable the `screen-capture` feature)"
    ))
}

fn run_preview(config: &AppConfig, video: &Path, out: &Path, regions: Option<&Path>) -> Result<()> {
    let mut sampler = VideoSampler::from_config(config);
    sampler.open(video, config)?;

    let mut frame = sampler
        .preview_frame()
        .cloned()
        .ok_or_else(|| anyhow!("No preview frame available"))?;

    if let Some(path) = regions {
        let file = load_region_file(path)?;
        draw_region_outlines(&mut frame, file.values().map(|entry| (&entry.area, entry.is_enabled)));
        log::info!("Outlined {} regions from {}", file.len(), path.display());
    }

    if let Some(parent) = out.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    frame
        .save(out)
        .with_context(|| format!("Failed to save preview to {}", out.display()))?;

    println!(
        "Preview saved to {} ({}x{})",
        out.display(),
        frame.width(),
        frame.height()
    );
    Ok(())
}
