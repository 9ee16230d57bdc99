use anyhow::{anyhow, Context, Result};
use image::GrayImage;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::process::Command;
use std::sync::{Arc, OnceLock};
use tempfile::NamedTempFile;

use super::setup::{find_tessdata_dir, find_tesseract_executable};

/// Characters the recognizer is allowed to emit for numeric readouts.
pub const DIGIT_WHITELIST: &str = "-0123456789.";

/// Something that turns a pre-processed image into text.
///
/// Implementations may block. Errors are swallowed by `OcrPipeline` and turned
/// into an empty reading, so they never stop a dispatch cycle.
pub trait Recognizer: Send + Sync {
    /// Recognizes text in `img`, restricted to the characters in `whitelist`.
    fn recognize(&self, img: &GrayImage, whitelist: &str) -> Result<String>;
}

/// Supported OCR backends, selectable at runtime for the whole region set.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OcrEngine {
    /// Tesseract with the LSTM engine (`--oem 1`)
    #[default]
    TesseractLstm,
    /// Tesseract with the legacy pattern-matching engine (`--oem 0`);
    /// needs legacy-capable traineddata
    TesseractLegacy,
}

impl OcrEngine {
    /// Creates the recognizer for this backend.
    pub fn build(self, settings: &TesseractSettings) -> Arc<dyn Recognizer> {
        let oem = match self {
            OcrEngine::TesseractLstm => 1,
            OcrEngine::TesseractLegacy => 0,
        };
        Arc::new(TesseractCli::new(settings.clone(), oem))
    }
}

impl std::fmt::Display for OcrEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OcrEngine::TesseractLstm => write!(f, "Tesseract (LSTM)"),
            OcrEngine::TesseractLegacy => write!(f, "Tesseract (legacy)"),
        }
    }
}

/// Tesseract command-line settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TesseractSettings {
    /// Explicit tesseract executable (null = search PATH and the usual install dirs)
    #[serde(default)]
    pub executable: Option<PathBuf>,
    /// Explicit tessdata directory (null = search, then tesseract's own default)
    #[serde(default)]
    pub tessdata_dir: Option<PathBuf>,
    /// Language code passed to `-l`
    #[serde(default = "default_language")]
    pub language: String,
    /// Page segmentation mode (13 = raw line)
    #[serde(default = "default_psm")]
    pub psm: u32,
    /// Resolution hint for small crops
    #[serde(default = "default_dpi")]
    pub dpi: u32,
}

fn default_language() -> String {
    "eng".to_string()
}

fn default_psm() -> u32 {
    13
}

fn default_dpi() -> u32 {
    20
}

impl Default for TesseractSettings {
    fn default() -> Self {
        Self {
            executable: None,
            tessdata_dir: None,
            language: default_language(),
            psm: default_psm(),
            dpi: default_dpi(),
        }
    }
}

/// Runs the `tesseract` executable once per image.
pub struct TesseractCli {
    settings: TesseractSettings,
    oem: u32,
    /// Resolved once, on first use
    executable: OnceLock<Result<PathBuf, String>>,
    tessdata: OnceLock<Option<PathBuf>>,
}

impl TesseractCli {
    pub fn new(settings: TesseractSettings, oem: u32) -> Self {
        Self {
            settings,
            oem,
            executable: OnceLock::new(),
            tessdata: OnceLock::new(),
        }
    }

    fn executable(&self) -> Result<PathBuf> {
        self.executable
            .get_or_init(|| {
                find_tesseract_executable(self.settings.executable.as_deref())
                    .map_err(|e| e.to_string())
            })
            .clone()
            .map_err(|e| anyhow!(e))
    }

    fn tessdata(&self) -> Option<PathBuf> {
        self.tessdata
            .get_or_init(|| {
                find_tessdata_dir(self.settings.tessdata_dir.as_deref(), &self.settings.language)
                    .ok()
            })
            .clone()
    }

    /// Builds the argument list (after the input path).
    fn args(&self, whitelist: &str) -> Vec<String> {
        let mut args = vec![
            "stdout".to_string(),
            "-l".to_string(),
            self.settings.language.clone(),
            "--oem".to_string(),
            self.oem.to_string(),
            "--psm".to_string(),
            self.settings.psm.to_string(),
            "--dpi".to_string(),
            self.settings.dpi.to_string(),
            "-c".to_string(),
            format!("tessedit_char_whitelist={}", whitelist),
        ];
        if let Some(tessdata) = self.tessdata() {
            args.push("--tessdata-dir".to_string());
            args.push(tessdata.to_string_lossy().to_string());
        }
        args
    }
}

impl Recognizer for TesseractCli {
    fn recognize(&self, img: &GrayImage, whitelist: &str) -> Result<String> {
        let tesseract_exe = self.executable()?;

        // Save image to temporary file
        let temp_input = NamedTempFile::with_suffix(".png")?;
        img.save(temp_input.path())
            .context("Failed to write OCR input image")?;

        let mut command = Command::new(&tesseract_exe);
        command.arg(temp_input.path()).args(self.args(whitelist));

        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            // CREATE_NO_WINDOW
            command.creation_flags(0x08000000);
        }

        let output = command
            .output()
            .with_context(|| format!("Failed to run {}", tesseract_exe.display()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("Tesseract failed: {}", stderr.trim()));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::HashMap;

    /// Returns the same text for every image.
    pub(crate) struct StaticRecognizer(pub String);

    impl Recognizer for StaticRecognizer {
        fn recognize(&self, _img: &GrayImage, _whitelist: &str) -> Result<String> {
            Ok(self.0.clone())
        }
    }

    /// Returns text keyed by the width of the image it receives.
    pub(crate) struct WidthRecognizer(pub HashMap<u32, String>);

    impl Recognizer for WidthRecognizer {
        fn recognize(&self, img: &GrayImage, _whitelist: &str) -> Result<String> {
            Ok(self.0.get(&img.width()).cloned().unwrap_or_default())
        }
    }

    /// Always fails.
    pub(crate) struct FailingRecognizer;

    impl Recognizer for FailingRecognizer {
        fn recognize(&self, _img: &GrayImage, _whitelist: &str) -> Result<String> {
            Err(anyhow!("backend unavailable"))
        }
    }

    #[test]
    fn test_engine_serde_names() {
        assert_eq!(
            serde_json::to_string(&OcrEngine::TesseractLstm).unwrap(),
            "\"tesseract_lstm\""
        );
        let engine: OcrEngine = serde_json::from_str("\"tesseract_legacy\"").unwrap();
        assert_eq!(engine, OcrEngine::TesseractLegacy);
    }

    #[test]
    fn test_tesseract_args() {
        let settings = TesseractSettings {
            tessdata_dir: Some(PathBuf::from("/nonexistent/tessdata")),
            ..Default::default()
        };
        let cli = TesseractCli::new(settings, 1);
        // An explicit tessdata dir that doesn't exist is not used
        let args = cli.args(DIGIT_WHITELIST);

        assert_eq!(args[0], "stdout");
        assert!(args.windows(2).any(|w| w[0] == "--psm" && w[1] == "13"));
        assert!(args.windows(2).any(|w| w[0] == "--oem" && w[1] == "1"));
        assert!(args.contains(&"tessedit_char_whitelist=-0123456789.".to_string()));
        assert!(!args.contains(&"--tessdata-dir".to_string()));
    }

    #[test]
    fn test_existing_tessdata_dir_is_passed() {
        let dir = tempfile::tempdir().unwrap();
        let settings = TesseractSettings {
            tessdata_dir: Some(dir.path().to_path_buf()),
            ..Default::default()
        };
        std::fs::write(dir.path().join(format!("{}.traineddata", settings.language)), b"").unwrap();

        let args = TesseractCli::new(settings, 0).args(DIGIT_WHITELIST);

        let expected = dir.path().to_string_lossy().to_string();
        assert!(args.windows(2).any(|w| w[0] == "--tessdata-dir" && w[1] == expected));
        assert!(args.windows(2).any(|w| w[0] == "--oem" && w[1] == "0"));
    }

    #[test]
    fn test_missing_executable_is_an_error() {
        let settings = TesseractSettings {
            executable: Some(PathBuf::from("/nonexistent/bin/tesseract")),
            ..Default::default()
        };
        let cli = TesseractCli::new(settings, 1);
        let img = GrayImage::new(4, 4);

        assert!(cli.recognize(&img, DIGIT_WHITELIST).is_err());
    }
}
