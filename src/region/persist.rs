//! Region configuration files.
//!
//! A JSON object mapping region name to its settings:
//!
//! ```json
//! {
//!   "temperature": {
//!     "area": [295, 749, 310, 769],
//!     "is_enabled": true,
//!     "show_preview": true,
//!     "ocr": { "invert_img": false, "upscale_ratio": 2.0, "unsharp_kernel_size": 5,
//!              "unsharp_sigma": 1.0, "unsharp_amount": 2.0 },
//!     "min_value": 20.0,
//!     "max_value": 100.0
//!   }
//! }
//! ```

use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use super::{Area, RegionSet};
use crate::ocr::PreProcessConfig;
use crate::recorder::csv_writer::TIME_COLUMN;

/// Stored settings of one region.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RegionEntry {
    pub area: Area,
    #[serde(default = "default_true")]
    pub is_enabled: bool,
    #[serde(default = "default_true")]
    pub show_preview: bool,
    #[serde(default)]
    pub ocr: PreProcessConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_value: Option<f64>,
}

fn default_true() -> bool {
    true
}

/// Region name → settings, in file order.
pub type RegionFile = IndexMap<String, RegionEntry>;

/// Reads a region file.
pub fn load_region_file(path: &Path) -> Result<RegionFile> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read region file {}", path.display()))?;
    serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse region file {}", path.display()))
}

/// Writes a region file (pretty-printed).
pub fn save_region_file(path: &Path, file: &RegionFile) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }
    let json = serde_json::to_string_pretty(file)?;
    fs::write(path, json)
        .with_context(|| format!("Failed to write region file {}", path.display()))
}

impl RegionSet {
    /// Exports every region's settings.
    pub fn to_region_file(&self) -> RegionFile {
        self.iter()
            .map(|region| {
                let (min_value, max_value) = region.bounds();
                (
                    region.name().to_string(),
                    RegionEntry {
                        area: region.area(),
                        is_enabled: region.is_enabled(),
                        show_preview: region.show_preview(),
                        ocr: region.pre_process_config().clone(),
                        min_value,
                        max_value,
                    },
                )
            })
            .collect()
    }

    /// Replaces the whole set with the regions in `file`.
    ///
    /// Edits are locked while the new regions are written, and unlocked after.
    /// An empty file leaves one default region. An entry named like the
    /// recorder's time column is skipped.
    pub fn apply_region_file(&mut self, file: &RegionFile) {
        self.lock_edits();

        let regions = file
            .iter()
            .filter(|(name, _)| {
                let reserved = name.as_str() == TIME_COLUMN;
                if reserved {
                    log::warn!("Region name '{}' is reserved for the time column, skipped", name);
                }
                !reserved
            })
            .map(|(name, entry)| {
                let mut region = self.new_region(name.as_str());
                region.toggle_edit(false);
                region.force_area(entry.area);
                region.set_enabled(entry.is_enabled);
                region.set_show_preview(entry.show_preview);
                region.set_pre_process_config(&entry.ocr);
                region.set_bounds(entry.min_value, entry.max_value);
                region
            })
            .collect();
        self.replace_all(regions);

        self.unlock_edits();
        log::info!("Loaded {} region(s)", self.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocr::engine::tests::StaticRecognizer;
    use crate::ocr::OcrEngine;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn empty_set() -> RegionSet {
        RegionSet::new(OcrEngine::TesseractLstm, Arc::new(StaticRecognizer(String::new())))
    }

    const SAMPLE: &str = r#"{
        "current": {
            "area": [295, 576, 310, 619],
            "is_enabled": false,
            "show_preview": true,
            "ocr": { "invert_img": true, "upscale_ratio": 2.0, "unsharp_kernel_size": 4,
                     "unsharp_sigma": 1.0, "unsharp_amount": 2.0 }
        },
        "temperature": {
            "area": [295, 749, 310, 769],
            "is_enabled": true,
            "show_preview": false,
            "ocr": { "invert_img": false, "upscale_ratio": 1.0, "unsharp_kernel_size": 5,
                     "unsharp_sigma": 1.0, "unsharp_amount": 1.0 },
            "min_value": 20.0,
            "max_value": 100.0
        }
    }"#;

    #[test]
    fn test_apply_region_file() {
        let file: RegionFile = serde_json::from_str(SAMPLE).unwrap();
        let mut set = empty_set();
        set.apply_region_file(&file);

        assert_eq!(set.names(), vec!["current", "temperature"]);
        assert!(!set.any_edit_locked());

        let current = set.get("current").unwrap();
        assert!(!current.is_enabled());
        assert_eq!(current.area(), Area::new(295, 576, 310, 619));
        // Normalized on load
        assert_eq!(current.pre_process_config().unsharp_kernel_size, 5);

        let temperature = set.get("temperature").unwrap();
        assert!(!temperature.show_preview());
        assert_eq!(temperature.bounds(), (Some(20.0), Some(100.0)));
    }

    #[test]
    fn test_file_order_is_kept() {
        let file: RegionFile = serde_json::from_str(
            r#"{ "zeta": { "area": [0, 0, 1, 1] }, "alpha": { "area": [2, 2, 3, 3] } }"#,
        )
        .unwrap();
        let mut set = empty_set();
        set.apply_region_file(&file);
        assert_eq!(set.names(), vec!["zeta", "alpha"]);

        let json = serde_json::to_string(&set.to_region_file()).unwrap();
        assert!(json.find("zeta").unwrap() < json.find("alpha").unwrap());
    }

    #[test]
    fn test_time_column_entry_is_skipped() {
        let file: RegionFile = serde_json::from_str(
            r#"{ "t": { "area": [0, 0, 1, 1] }, "rpm": { "area": [2, 2, 3, 3] } }"#,
        )
        .unwrap();
        let mut set = empty_set();
        set.apply_region_file(&file);
        assert_eq!(set.names(), vec!["rpm"]);
    }

    #[test]
    fn test_empty_file_leaves_default_region() {
        let mut set = empty_set();
        set.add_named("old").unwrap();
        set.apply_region_file(&RegionFile::new());

        assert_eq!(set.names(), vec!["New capture 0"]);
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("regions").join("config.json");

        let mut set = empty_set();
        set.rename("New capture 0", "speed");
        let speed = set.get_mut("speed").unwrap();
        speed.set_area(1, 2, 30, 40);
        speed.set_bounds(Some(0.0), None);
        save_region_file(&path, &set.to_region_file()).unwrap();

        let mut loaded = empty_set();
        loaded.apply_region_file(&load_region_file(&path).unwrap());

        assert_eq!(loaded.names(), vec!["speed"]);
        assert_eq!(loaded.first().area(), Area::new(1, 2, 30, 40));
        assert_eq!(loaded.first().bounds(), (Some(0.0), None));
    }

    #[test]
    fn test_missing_bounds_are_not_written() {
        let set = empty_set();
        let json = serde_json::to_string(&set.to_region_file()).unwrap();

        assert!(json.contains("\"area\":[0,0,0,0]"));
        assert!(!json.contains("min_value"));
    }
}
