//! A region set and a recorder kept in step.
//!
//! Region names double as recorder field names, so every structural change
//! to the region set (add, remove, rename, bulk load) is mirrored into the
//! recorder here. A UI talks to the session by sending `Command` messages,
//! which the driving loop applies between cycles.

use anyhow::{anyhow, Result};
use image::RgbImage;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Receiver;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::config::AppConfig;
use crate::ocr::{OcrEngine, PreProcessConfig, TesseractSettings};
use crate::recorder::Recorder;
use crate::region::persist::{load_region_file, save_region_file};
use crate::region::{Area, Readings, RegionSet};

/// Mutations a UI can request.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    AddRegion,
    RemoveRegion(String),
    RenameRegion { old: String, new: String },
    SetArea { name: String, area: Area },
    SetEnabled { name: String, enabled: bool },
    SetShowPreview { name: String, show: bool },
    SetPreProcess { name: String, config: PreProcessConfig },
    SetBounds { name: String, min_value: Option<f64>, max_value: Option<f64> },
    SetEngine(OcrEngine),
    SetMaxThreads(Option<usize>),
    /// Blocks area edits and dispatch cycles while an external bulk update runs
    SetEditsLocked(bool),
    LoadRegions(PathBuf),
    SaveRegions(PathBuf),
    ToggleRecording(bool),
}

/// Shared region set plus the recorder fed by the driving loop.
pub struct Session {
    regions: RwLock<RegionSet>,
    recorder: Recorder,
    tesseract: TesseractSettings,
}

impl Session {
    /// Wraps `regions` and registers one recorder field per region.
    pub fn new(regions: RegionSet, mut recorder: Recorder, tesseract: TesseractSettings) -> Self {
        recorder.reset(&regions.names());
        Self {
            regions: RwLock::new(regions),
            recorder,
            tesseract,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        let recorder = Recorder::new(config.recordings_dir()).with_rate_window(config.rate_window);
        Self::new(
            RegionSet::from_config(config),
            recorder,
            config.tesseract.clone(),
        )
    }

    pub fn regions(&self) -> Result<RwLockReadGuard<'_, RegionSet>> {
        self.regions
            .read()
            .map_err(|_| anyhow!("region set lock poisoned"))
    }

    fn regions_mut(&self) -> Result<RwLockWriteGuard<'_, RegionSet>> {
        self.regions
            .write()
            .map_err(|_| anyhow!("region set lock poisoned"))
    }

    pub fn recorder(&self) -> &Recorder {
        &self.recorder
    }

    pub fn recorder_mut(&mut self) -> &mut Recorder {
        &mut self.recorder
    }

    /// Adds/removes recorder fields so they match the region names.
    fn sync_fields(&mut self) -> Result<()> {
        let names = self.regions()?.names();
        for field in self.recorder.field_names() {
            if !names.contains(&field) {
                self.recorder.delete_field(&field);
            }
        }
        for name in &names {
            if self.recorder.samples(name).is_none() {
                self.recorder.add_field(name);
            }
        }
        Ok(())
    }

    /// Adds a default-named region and returns its name.
    pub fn add_region(&mut self) -> Result<String> {
        let name = self.regions_mut()?.add_region().name().to_string();
        self.recorder.add_field(&name);
        Ok(name)
    }

    pub fn remove_region(&mut self, name: &str) -> Result<bool> {
        let removed = self.regions_mut()?.remove_region(name);
        self.sync_fields()?;
        Ok(removed)
    }

    pub fn rename_region(&mut self, old: &str, new: &str) -> Result<bool> {
        let renamed = self.regions_mut()?.rename(old, new);
        if renamed {
            self.recorder.rename_field(old, new);
        }
        Ok(renamed)
    }

    /// Replaces every region from a file and resets the recorder.
    ///
    /// An active recording is written out first.
    pub fn load_regions(&mut self, path: &Path) -> Result<()> {
        let file = load_region_file(path)?;

        if self.recorder.is_recording() {
            let saved = self.recorder.stop_recording()?;
            log::info!("Recording saved before loading regions: {}", saved.display());
        }

        let names = {
            let mut regions = self.regions_mut()?;
            regions.apply_region_file(&file);
            regions.names()
        };
        self.recorder.reset(&names);
        Ok(())
    }

    pub fn save_regions(&self, path: &Path) -> Result<()> {
        let file = self.regions()?.to_region_file();
        save_region_file(path, &file)?;
        log::info!("Regions saved to {}", path.display());
        Ok(())
    }

    /// Runs one dispatch cycle on `frame` and records the result.
    ///
    /// The region set is only read-locked while the cycle is planned; OCR
    /// runs on the snapshot. Returns `None` without recording anything while
    /// region edits are locked.
    pub fn cycle(&mut self, frame: &RgbImage, timestamp: Option<f64>) -> Result<Option<Readings>> {
        let plan = {
            let regions = self.regions()?;
            if regions.any_edit_locked() {
                log::debug!("Region edits locked, skipping cycle");
                return Ok(None);
            }
            regions.plan()
        };
        let readings = plan.run(frame);
        self.recorder.record(&readings, timestamp);
        Ok(Some(readings))
    }

    /// Applies one UI command. Rejections are logged, not returned as errors.
    pub fn apply(&mut self, command: Command) -> Result<()> {
        log::debug!("Applying {:?}", command);

        match command {
            Command::AddRegion => {
                self.add_region()?;
            }
            Command::RemoveRegion(name) => {
                self.remove_region(&name)?;
            }
            Command::RenameRegion { old, new } => {
                self.rename_region(&old, &new)?;
            }
            Command::SetArea { name, area } => {
                self.with_region(&name, |r| {
                    r.set_area(area.x_min, area.y_min, area.x_max, area.y_max);
                })?;
            }
            Command::SetEnabled { name, enabled } => {
                self.with_region(&name, |r| r.set_enabled(enabled))?;
            }
            Command::SetShowPreview { name, show } => {
                self.with_region(&name, |r| r.set_show_preview(show))?;
            }
            Command::SetPreProcess { name, config } => {
                self.with_region(&name, |r| r.set_pre_process_config(&config))?;
            }
            Command::SetBounds { name, min_value, max_value } => {
                self.with_region(&name, |r| r.set_bounds(min_value, max_value))?;
            }
            Command::SetEngine(engine) => {
                let settings = self.tesseract.clone();
                self.regions_mut()?.set_engine(engine, &settings);
            }
            Command::SetMaxThreads(n) => {
                self.regions_mut()?.set_max_threads(n);
            }
            Command::SetEditsLocked(locked) => {
                let mut regions = self.regions_mut()?;
                if locked {
                    regions.lock_edits();
                } else {
                    regions.unlock_edits();
                }
            }
            Command::LoadRegions(path) => self.load_regions(&path)?,
            Command::SaveRegions(path) => self.save_regions(&path)?,
            Command::ToggleRecording(on) => {
                if let Some(path) = self.recorder.toggle_recording(on)? {
                    log::info!("Recording saved to {}", path.display());
                }
            }
        }
        Ok(())
    }

    /// Applies every command waiting in `commands`, logging failures.
    pub fn drain(&mut self, commands: &Receiver<Command>) {
        for command in commands.try_iter() {
            if let Err(e) = self.apply(command) {
                log::warn!("Command failed: {:#}", e);
            }
        }
    }

    fn with_region<F>(&self, name: &str, f: F) -> Result<()>
    where
        F: FnOnce(&mut crate::region::Region),
    {
        match self.regions_mut()?.get_mut(name) {
            Some(region) => f(region),
            None => log::warn!("Region '{}' doesn't exist, command ignored", name),
        }
        Ok(())
    }
}
