//! Locating (and if needed fetching) the Tesseract installation.

use anyhow::{anyhow, bail, Context, Result};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;

const TESSDATA_REPO: &str = "https://github.com/tesseract-ocr/tessdata/raw/main";

#[cfg(windows)]
const COMMON_EXECUTABLES: &[&str] = &[
    r"C:\Program Files\Tesseract-OCR\tesseract.exe",
    r"C:\Program Files (x86)\Tesseract-OCR\tesseract.exe",
];
#[cfg(not(windows))]
const COMMON_EXECUTABLES: &[&str] = &[
    "/usr/bin/tesseract",
    "/usr/local/bin/tesseract",
    "/opt/homebrew/bin/tesseract",
];

#[cfg(windows)]
const COMMON_TESSDATA: &[&str] = &[
    r"C:\Program Files\Tesseract-OCR\tessdata",
    r"C:\Program Files (x86)\Tesseract-OCR\tessdata",
];
#[cfg(not(windows))]
const COMMON_TESSDATA: &[&str] = &[
    "/usr/share/tesseract-ocr/5/tessdata",
    "/usr/share/tesseract-ocr/4.00/tessdata",
    "/usr/share/tessdata",
    "/usr/local/share/tessdata",
    "/opt/homebrew/share/tessdata",
];

/// Returns the per-user directory for Tesseract files.
pub fn get_tesseract_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ocr-recorder")
        .join("tesseract")
}

fn traineddata_name(language: &str) -> String {
    format!("{}.traineddata", language)
}

/// Finds the Tesseract executable.
///
/// An explicit path must exist. Otherwise checks our local dir, then PATH,
/// then the usual install locations.
pub fn find_tesseract_executable(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        if path.exists() {
            return Ok(path.to_path_buf());
        }
        bail!("Configured tesseract executable not found: {}", path.display());
    }

    let exe_name = if cfg!(windows) { "tesseract.exe" } else { "tesseract" };
    let local_exe = get_tesseract_dir().join(exe_name);
    if local_exe.exists() {
        return Ok(local_exe);
    }

    // Check PATH
    if let Ok(output) = Command::new("tesseract").arg("--version").output() {
        if output.status.success() {
            return Ok(PathBuf::from("tesseract"));
        }
    }

    for path in COMMON_EXECUTABLES {
        let p = PathBuf::from(path);
        if p.exists() {
            return Ok(p);
        }
    }

    Err(anyhow!("Tesseract not found. Please install Tesseract-OCR."))
}

/// Finds a tessdata directory containing `<language>.traineddata`.
pub fn find_tessdata_dir(explicit: Option<&Path>, language: &str) -> Result<PathBuf> {
    let data_file = traineddata_name(language);

    if let Some(path) = explicit {
        if path.join(&data_file).exists() {
            return Ok(path.to_path_buf());
        }
        bail!("{} not found in {}", data_file, path.display());
    }

    let local_tessdata = get_tesseract_dir().join("tessdata");
    if local_tessdata.join(&data_file).exists() {
        return Ok(local_tessdata);
    }

    // Check TESSDATA_PREFIX environment variable
    if let Ok(prefix) = std::env::var("TESSDATA_PREFIX") {
        let p = PathBuf::from(&prefix);
        if p.join(&data_file).exists() {
            return Ok(p);
        }
        let p = p.join("tessdata");
        if p.join(&data_file).exists() {
            return Ok(p);
        }
    }

    for path in COMMON_TESSDATA {
        let p = PathBuf::from(path);
        if p.join(&data_file).exists() {
            return Ok(p);
        }
    }

    Err(anyhow!(
        "tessdata directory not found. Please ensure {} is available.",
        data_file
    ))
}

/// Makes sure `<language>.traineddata` is available, downloading it into the
/// local tessdata dir when no installation provides it.
pub fn ensure_tessdata(language: &str) -> Result<PathBuf> {
    if let Ok(dir) = find_tessdata_dir(None, language) {
        log::info!("tessdata found at: {}", dir.display());
        return Ok(dir);
    }

    let tessdata_dir = get_tesseract_dir().join("tessdata");
    fs::create_dir_all(&tessdata_dir)
        .with_context(|| format!("Failed to create {}", tessdata_dir.display()))?;
    download_tessdata(&tessdata_dir, language)?;

    Ok(tessdata_dir)
}

/// Downloads trained data for `language` from the tessdata repository.
fn download_tessdata(tessdata_dir: &Path, language: &str) -> Result<()> {
    let data_file = traineddata_name(language);
    let url = format!("{}/{}", TESSDATA_REPO, data_file);
    let target = tessdata_dir.join(&data_file);

    log::info!("Downloading {}...", data_file);

    let client = reqwest::blocking::Client::builder()
        .timeout(std::time::Duration::from_secs(300))
        .build()?;

    let response = client
        .get(&url)
        .header("User-Agent", "ocr-recorder")
        .send()?;

    if !response.status().is_success() {
        return Err(anyhow!(
            "Failed to download {}: HTTP {}",
            data_file,
            response.status()
        ));
    }

    let bytes = response.bytes()?;
    let mut file = fs::File::create(&target)
        .with_context(|| format!("Failed to create {}", target.display()))?;
    file.write_all(&bytes)?;

    log::info!("Downloaded {} ({} bytes)", data_file, bytes.len());

    Ok(())
}
