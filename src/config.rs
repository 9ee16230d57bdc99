//! Application configuration.
//!
//! Loads settings from config.json at startup: sampling rates, worker limits,
//! OCR backend selection and external tool locations. Region definitions live
//! in a separate file (see `region::persist`).

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::ocr::{OcrEngine, TesseractSettings};

/// Global configuration instance, initialized once at startup.
static CONFIG: OnceLock<AppConfig> = OnceLock::new();

/// Complete application configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AppConfig {
    /// Realtime sampling rate (captures per second)
    #[serde(default = "default_fps")]
    pub fps: f64,
    /// Minimum delay between two realtime ticks, even when a cycle overruns (milliseconds)
    #[serde(default = "default_min_interval_ms")]
    pub min_interval_ms: u64,
    /// Maximum number of concurrent OCR workers (null or 0 = unbounded)
    #[serde(default)]
    pub max_threads: Option<usize>,
    /// OCR backend used by every region
    #[serde(default)]
    pub engine: OcrEngine,
    /// Tesseract command-line settings
    #[serde(default)]
    pub tesseract: TesseractSettings,
    /// ffmpeg executable used to decode videos
    #[serde(default = "default_ffmpeg_exe")]
    pub ffmpeg_exe: String,
    /// ffprobe executable used to read video metadata
    #[serde(default = "default_ffprobe_exe")]
    pub ffprobe_exe: String,
    /// Target output rate when processing a video (samples per second of video)
    #[serde(default = "default_video_sample_rate")]
    pub video_sample_rate: f64,
    /// Number of recent timestamps used for the rolling rate estimate
    #[serde(default = "default_rate_window")]
    pub rate_window: usize,
    /// Where recordings go when no explicit path is given (null = scratch dir)
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
    /// Mirror log lines into `<exe_dir>/logs/ocr_recorder.log`
    #[serde(default = "default_log_to_file")]
    pub log_to_file: bool,
}

fn default_fps() -> f64 {
    10.0
}

fn default_min_interval_ms() -> u64 {
    10
}

fn default_ffmpeg_exe() -> String {
    "ffmpeg".to_string()
}

fn default_ffprobe_exe() -> String {
    "ffprobe".to_string()
}

fn default_video_sample_rate() -> f64 {
    1.0
}

fn default_rate_window() -> usize {
    10
}

fn default_log_to_file() -> bool {
    true
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            fps: default_fps(),
            min_interval_ms: default_min_interval_ms(),
            max_threads: None,
            engine: OcrEngine::default(),
            tesseract: TesseractSettings::default(),
            ffmpeg_exe: default_ffmpeg_exe(),
            ffprobe_exe: default_ffprobe_exe(),
            video_sample_rate: default_video_sample_rate(),
            rate_window: default_rate_window(),
            output_dir: None,
            log_to_file: default_log_to_file(),
        }
    }
}

impl AppConfig {
    /// Directory where recordings are written by default.
    pub fn recordings_dir(&self) -> PathBuf {
        self.output_dir
            .clone()
            .unwrap_or_else(crate::paths::get_scratch_dir)
    }
}

/// Config plus the messages gathered while loading it.
///
/// Loading runs before the logger exists; `notes` are replayed once it is.
#[derive(Debug)]
pub struct LoadedConfig {
    pub config: AppConfig,
    pub notes: Vec<(log::Level, String)>,
}

impl LoadedConfig {
    fn fallback(notes: Vec<(log::Level, String)>) -> Self {
        Self {
            config: AppConfig::default(),
            notes,
        }
    }
}

/// Loads configuration from `path`, falling back to defaults on any problem.
pub fn load_config_from(path: &Path) -> LoadedConfig {
    let mut notes = vec![(
        log::Level::Info,
        format!("Looking for config at: {}", path.display()),
    )];

    if !path.exists() {
        notes.push((
            log::Level::Info,
            format!("{} not found. Using default config.", path.display()),
        ));
        return LoadedConfig::fallback(notes);
    }

    match fs::read_to_string(path) {
        Ok(contents) => match serde_json::from_str(&contents) {
            Ok(config) => {
                notes.push((log::Level::Info, format!("Config loaded from {}", path.display())));
                LoadedConfig { config, notes }
            }
            Err(e) => {
                notes.push((
                    log::Level::Warn,
                    format!("Failed to parse {}: {}. Using defaults.", path.display(), e),
                ));
                LoadedConfig::fallback(notes)
            }
        },
        Err(e) => {
            notes.push((
                log::Level::Warn,
                format!("Failed to read {}: {}. Using defaults.", path.display(), e),
            ));
            LoadedConfig::fallback(notes)
        }
    }
}

/// Path of config.json next to the executable.
pub fn default_config_path() -> PathBuf {
    crate::paths::get_exe_dir().join("config.json")
}

/// Resolves and loads the config file.
///
/// An explicitly requested file must exist; the default location may be
/// missing, in which case defaults apply.
pub fn resolve_config(path: Option<&Path>) -> Result<LoadedConfig> {
    match path {
        Some(p) => {
            if !p.exists() {
                bail!("Config file {} does not exist", p.display());
            }
            Ok(load_config_from(p))
        }
        None => Ok(load_config_from(&default_config_path())),
    }
}

/// Initializes the global configuration. Call once at startup.
///
/// Returns the load messages so the caller can log them after the logger is
/// installed.
pub fn init_config(path: Option<&Path>) -> Result<Vec<(log::Level, String)>> {
    let LoadedConfig { config, notes } = resolve_config(path)?;
    let _ = CONFIG.set(config);
    Ok(notes)
}

/// Returns a reference to the global configuration.
/// Panics if called before init_config().
pub fn get_config() -> &'static AppConfig {
    CONFIG
        .get()
        .expect("Config not initialized. Call init_config() first.")
}
