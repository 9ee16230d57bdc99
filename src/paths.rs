use chrono::Local;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

static EXE_DIR: OnceLock<PathBuf> = OnceLock::new();

/// Returns the directory containing the executable.
pub fn get_exe_dir() -> &'static PathBuf {
    EXE_DIR.get_or_init(|| {
        std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
            .unwrap_or_else(|| PathBuf::from("."))
    })
}

/// Returns the logs directory: `<exe_dir>/logs/`
pub fn get_logs_dir() -> PathBuf {
    get_exe_dir().join("logs")
}

/// Returns the default log file: `<exe_dir>/logs/ocr_recorder.log`
pub fn get_log_file() -> PathBuf {
    get_logs_dir().join("ocr_recorder.log")
}

/// Returns the scratch directory used for recordings when no output dir is set:
/// `<tmp>/ocr-recorder/`
pub fn get_scratch_dir() -> PathBuf {
    std::env::temp_dir().join("ocr-recorder")
}

/// Builds a timestamp-derived recording path inside `dir` that no existing
/// file uses, e.g. `recording_20240131_142501_042.csv`, then
/// `recording_20240131_142501_042_1.csv` on a collision.
pub fn timestamped_recording_path(dir: &Path) -> PathBuf {
    let stem = format!("recording_{}", Local::now().format("%Y%m%d_%H%M%S_%3f"));

    let mut path = dir.join(format!("{}.csv", stem));
    let mut n = 1;
    while path.exists() {
        path = dir.join(format!("{}_{}.csv", stem, n));
        n += 1;
    }
    path
}
