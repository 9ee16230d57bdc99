//! The collection of regions and the per-frame processing pass over it.

use image::RgbImage;
use std::sync::Arc;

use super::{Readings, Region, RegionSnapshot};
use crate::config::AppConfig;
use crate::dispatch::Dispatcher;
use crate::ocr::{OcrEngine, Recognizer, TesseractSettings};
use crate::recorder::csv_writer::TIME_COLUMN;

/// Uniquely named, never-empty set of regions sharing one OCR backend.
pub struct RegionSet {
    regions: Vec<Region>,
    engine: OcrEngine,
    recognizer: Arc<dyn Recognizer>,
    dispatcher: Dispatcher,
}

impl RegionSet {
    /// Creates a set holding one default region.
    pub fn new(engine: OcrEngine, recognizer: Arc<dyn Recognizer>) -> Self {
        let mut set = Self {
            regions: Vec::new(),
            engine,
            recognizer,
            dispatcher: Dispatcher::default(),
        };
        set.add_region();
        set
    }

    /// Creates a set using the backend and worker limit from `config`.
    pub fn from_config(config: &AppConfig) -> Self {
        let mut set = Self::new(config.engine, config.engine.build(&config.tesseract));
        set.set_max_threads(config.max_threads);
        set
    }

    /// Next free default name: "New capture N", N starting at the current size.
    fn default_name(&self) -> String {
        let mut n = self.regions.len();
        loop {
            let name = format!("New capture {}", n);
            if !self.contains(&name) {
                return name;
            }
            n += 1;
        }
    }

    /// Appends a region with a default name and returns it.
    pub fn add_region(&mut self) -> &mut Region {
        let name = self.default_name();
        self.regions
            .push(Region::new(name, Arc::clone(&self.recognizer)));
        self.regions
            .last_mut()
            .expect("region was just pushed")
    }

    /// Appends a region called `name`, unless that name is taken.
    pub fn add_named(&mut self, name: &str) -> Option<&mut Region> {
        if !self.is_name_free(name) {
            return None;
        }
        self.regions
            .push(Region::new(name, Arc::clone(&self.recognizer)));
        self.regions.last_mut()
    }

    /// Removes the region called `name` (no-op if unknown).
    ///
    /// Removing the last region creates a fresh default one.
    pub fn remove_region(&mut self, name: &str) -> bool {
        let Some(idx) = self.regions.iter().position(|r| r.name() == name) else {
            log::warn!("Region '{}' doesn't exist, nothing removed", name);
            return false;
        };
        self.regions.remove(idx);

        if self.regions.is_empty() {
            self.add_region();
        }
        true
    }

    /// Renames `old` to `new`. Fails if `old` is unknown or `new` is taken.
    pub fn rename(&mut self, old: &str, new: &str) -> bool {
        if !self.is_name_free(new) {
            return false;
        }
        match self.get_mut(old) {
            Some(region) => {
                region.set_name(new);
                true
            }
            None => {
                log::warn!("Region '{}' doesn't exist, not renamed", old);
                false
            }
        }
    }

    /// True if a region could be called `name`: unused and not the recorder's time column.
    pub fn is_name_free(&self, name: &str) -> bool {
        if name == TIME_COLUMN {
            log::warn!("Region name '{}' is reserved for the time column", name);
            return false;
        }
        if self.contains(name) {
            log::warn!("Region name '{}' is already taken", name);
            return false;
        }
        true
    }

    pub fn contains(&self, name: &str) -> bool {
        self.regions.iter().any(|r| r.name() == name)
    }

    pub fn get(&self, name: &str) -> Option<&Region> {
        self.regions.iter().find(|r| r.name() == name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Region> {
        self.regions.iter_mut().find(|r| r.name() == name)
    }

    /// First region in listing order. The set is never empty.
    pub fn first(&self) -> &Region {
        self.regions
            .first()
            .expect("region set always holds at least one region")
    }

    /// Names in listing order.
    pub fn names(&self) -> Vec<String> {
        self.regions.iter().map(|r| r.name().to_string()).collect()
    }

    pub fn enabled_names(&self) -> Vec<String> {
        self.regions
            .iter()
            .filter(|r| r.is_enabled())
            .map(|r| r.name().to_string())
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Region> {
        self.regions.iter()
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    /// Always false; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Replaces every region. An empty list leaves one default region.
    pub fn replace_all(&mut self, regions: Vec<Region>) {
        self.regions = regions;
        if self.regions.is_empty() {
            self.add_region();
        }
    }

    /// Creates a region bound to the current backend, without adding it.
    pub fn new_region(&self, name: impl Into<String>) -> Region {
        Region::new(name, Arc::clone(&self.recognizer))
    }

    pub fn engine(&self) -> OcrEngine {
        self.engine
    }

    /// Switches every region to `engine`, keeping their pre-processing settings.
    pub fn set_engine(&mut self, engine: OcrEngine, settings: &TesseractSettings) {
        self.set_recognizer(engine, engine.build(settings));
    }

    /// Like `set_engine`, with an already-built recognizer.
    pub fn set_recognizer(&mut self, engine: OcrEngine, recognizer: Arc<dyn Recognizer>) {
        log::info!("OCR engine set to {}", engine);
        self.engine = engine;
        self.recognizer = recognizer;
        for region in &mut self.regions {
            region.set_recognizer(Arc::clone(&self.recognizer));
        }
    }

    /// Worker limit for dispatch cycles (`None`/0 = unbounded).
    pub fn set_max_threads(&mut self, max_threads: Option<usize>) {
        self.dispatcher.set_max_threads(max_threads);
    }

    pub fn max_threads(&self) -> Option<usize> {
        self.dispatcher.max_threads()
    }

    /// Locks `set_area` on every region (bulk external update in progress).
    pub fn lock_edits(&mut self) {
        for region in &mut self.regions {
            region.toggle_edit(false);
        }
    }

    pub fn unlock_edits(&mut self) {
        for region in &mut self.regions {
            region.toggle_edit(true);
        }
    }

    pub fn any_edit_locked(&self) -> bool {
        self.regions.iter().any(|r| r.is_edit_locked())
    }

    /// Freezes the enabled regions and the worker limit for one cycle.
    ///
    /// The plan owns its data, so the caller can release any lock on the set
    /// before running it.
    pub fn plan(&self) -> DispatchPlan {
        DispatchPlan {
            units: self
                .regions
                .iter()
                .filter(|r| r.is_enabled())
                .map(|r| r.snapshot())
                .collect(),
            dispatcher: self.dispatcher.clone(),
        }
    }

    /// Runs one full processing pass over all enabled regions.
    pub fn process(&self, frame: &RgbImage) -> Readings {
        self.plan().run(frame)
    }
}

/// Snapshot of one dispatch cycle: what to run, and how wide.
pub struct DispatchPlan {
    units: Vec<RegionSnapshot>,
    dispatcher: Dispatcher,
}

impl DispatchPlan {
    /// Names of the regions in this cycle.
    pub fn names(&self) -> Vec<&str> {
        self.units.iter().map(|u| u.name.as_str()).collect()
    }

    /// Runs every unit and returns exactly one reading per unit.
    pub fn run(&self, frame: &RgbImage) -> Readings {
        let results = self.dispatcher.run(&self.units, |unit| unit.run(frame));

        self.units
            .iter()
            .zip(results)
            .map(|(unit, value)| (unit.name.clone(), value.flatten()))
            .collect()
    }
}
