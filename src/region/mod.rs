//! Regions: named rectangles of the full frame that are read with OCR.
//!
//! This module provides:
//! - `Area`, the inclusive pixel bounds of a region
//! - `Region`, its geometry, pre-processing, value bounds and display sink
//! - `RegionSet`, the never-empty, uniquely named collection of regions
//! - region file load/save (`persist`)

pub mod area;
pub mod persist;
pub mod set;

pub use area::Area;
pub use set::{DispatchPlan, RegionSet};

use image::{GrayImage, RgbImage};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::ocr::{OcrPipeline, PreProcessConfig, Recognizer};

/// Output of one dispatch cycle: region name → value (`None` = absent).
pub type Readings = HashMap<String, Option<f64>>;

/// Latest result of a region, for display by a UI.
#[derive(Clone, Debug)]
pub struct RegionPreview {
    /// Raw recognizer output
    pub raw_text: String,
    /// Parsed and bounds-checked value
    pub value: Option<f64>,
    /// Binary image sent to the recognizer (only kept when `show_preview` is on)
    pub image: Option<GrayImage>,
}

/// Shared slot the dispatch workers write each region's latest result into.
pub type PreviewSink = Arc<Mutex<Option<RegionPreview>>>;

/// Parses OCR text as a number and applies the optional bounds.
///
/// Returns `None` for unparsable or non-finite text, or when the value falls
/// outside whichever bounds are set.
pub fn post_process(raw_text: &str, min_value: Option<f64>, max_value: Option<f64>) -> Option<f64> {
    let value: f64 = raw_text.trim().parse().ok()?;

    if !value.is_finite() {
        return None;
    }
    if min_value.is_some_and(|min| value < min) {
        return None;
    }
    if max_value.is_some_and(|max| value > max) {
        return None;
    }

    Some(value)
}

/// A named capture area and everything needed to turn it into a number.
pub struct Region {
    name: String,
    area: Area,
    enabled: bool,
    show_preview: bool,
    /// While false, `set_area` is ignored (guards against UI feedback loops
    /// while the program itself updates widgets)
    can_edit: bool,
    pipeline: OcrPipeline,
    min_value: Option<f64>,
    max_value: Option<f64>,
    preview: PreviewSink,
}

impl Region {
    /// Creates an enabled region with a single-pixel area at the origin.
    pub fn new(name: impl Into<String>, recognizer: Arc<dyn Recognizer>) -> Self {
        Self {
            name: name.into(),
            area: Area::default(),
            enabled: true,
            show_preview: true,
            can_edit: true,
            pipeline: OcrPipeline::new(recognizer),
            min_value: None,
            max_value: None,
            preview: Arc::new(Mutex::new(None)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Only `RegionSet` renames, since it owns name uniqueness.
    pub(crate) fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// Replaces the whole area at once.
    ///
    /// Ignored (returns false) while editing is locked.
    pub fn set_area(&mut self, x_min: u32, y_min: u32, x_max: u32, y_max: u32) -> bool {
        if !self.can_edit {
            log::debug!("Region '{}': area edit ignored while locked", self.name);
            return false;
        }
        self.area = Area::new(x_min, y_min, x_max, y_max);
        true
    }

    /// Sets the area regardless of the edit lock. Used by bulk loads.
    pub(crate) fn force_area(&mut self, area: Area) {
        self.area = area;
    }

    pub fn area(&self) -> Area {
        self.area
    }

    /// Enables or disables `set_area`.
    pub fn toggle_edit(&mut self, can_edit: bool) {
        self.can_edit = can_edit;
    }

    pub fn is_edit_locked(&self) -> bool {
        !self.can_edit
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn show_preview(&self) -> bool {
        self.show_preview
    }

    pub fn set_show_preview(&mut self, show: bool) {
        self.show_preview = show;
    }

    /// Stores a normalized copy of `config`.
    pub fn set_pre_process_config(&mut self, config: &PreProcessConfig) {
        self.pipeline.set_config(config);
    }

    pub fn pre_process_config(&self) -> &PreProcessConfig {
        self.pipeline.config()
    }

    pub(crate) fn set_recognizer(&mut self, recognizer: Arc<dyn Recognizer>) {
        self.pipeline.set_recognizer(recognizer);
    }

    /// Sets the accepted value range. Either bound may be absent.
    pub fn set_bounds(&mut self, min_value: Option<f64>, max_value: Option<f64>) {
        self.min_value = min_value;
        self.max_value = max_value;
    }

    pub fn bounds(&self) -> (Option<f64>, Option<f64>) {
        (self.min_value, self.max_value)
    }

    /// Slices this region out of a full frame (`None` when empty).
    pub fn slice(&self, frame: &RgbImage) -> Option<RgbImage> {
        self.area.slice(frame)
    }

    /// Runs pre-processing and OCR on this region of `frame`.
    ///
    /// Returns `(None, None)` if the region is disabled or its slice is empty.
    pub fn run_pipeline(&self, frame: &RgbImage) -> (Option<String>, Option<GrayImage>) {
        self.snapshot().run_pipeline(frame)
    }

    /// Converts raw OCR text into a bounds-checked value.
    pub fn post_process(&self, raw_text: &str) -> Option<f64> {
        post_process(raw_text, self.min_value, self.max_value)
    }

    /// Most recent result pushed by a dispatch cycle.
    pub fn latest_preview(&self) -> Option<RegionPreview> {
        self.preview.lock().ok().and_then(|p| p.clone())
    }

    /// Copies everything a worker needs, so a cycle never sees half-applied edits.
    pub fn snapshot(&self) -> RegionSnapshot {
        RegionSnapshot {
            name: self.name.clone(),
            area: self.area,
            enabled: self.enabled,
            show_preview: self.show_preview,
            pipeline: self.pipeline.clone(),
            min_value: self.min_value,
            max_value: self.max_value,
            preview: Arc::clone(&self.preview),
        }
    }
}

/// Frozen copy of a region taken when a dispatch cycle starts.
#[derive(Clone)]
pub struct RegionSnapshot {
    pub name: String,
    pub area: Area,
    pub enabled: bool,
    pub show_preview: bool,
    pipeline: OcrPipeline,
    min_value: Option<f64>,
    max_value: Option<f64>,
    preview: PreviewSink,
}

impl RegionSnapshot {
    pub fn run_pipeline(&self, frame: &RgbImage) -> (Option<String>, Option<GrayImage>) {
        if !self.enabled {
            return (None, None);
        }
        match self.area.slice(frame) {
            Some(img) => {
                let (text, processed) = self.pipeline.process(&img);
                (Some(text), Some(processed))
            }
            None => {
                log::debug!("Region '{}': empty slice, no output", self.name);
                (None, None)
            }
        }
    }

    /// One dispatch unit: pipeline, post-processing and display sink update.
    pub fn run(&self, frame: &RgbImage) -> Option<f64> {
        let (raw_text, processed) = self.run_pipeline(frame);

        let preview = raw_text.map(|raw_text| {
            let value = post_process(&raw_text, self.min_value, self.max_value);
            RegionPreview {
                raw_text,
                value,
                image: if self.show_preview { processed } else { None },
            }
        });
        let value = preview.as_ref().and_then(|p| p.value);

        if let Ok(mut slot) = self.preview.lock() {
            *slot = preview;
        }

        value
    }
}
