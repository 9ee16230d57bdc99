//! Field-keyed time series recording.
//!
//! The recorder keeps one sample sequence per field. While recording, every
//! `record` call appends exactly one sample to every field, so all sequences
//! stay the same length even when fields are added or removed mid-session.
//! Stopping a recording writes the session to CSV.

pub mod csv_writer;

use anyhow::Result;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::time::Instant;

use crate::paths::timestamped_recording_path;
use csv_writer::TIME_COLUMN;
use crate::region::Readings;

/// Default number of recent timestamps used by `get_average_fps`.
pub const DEFAULT_RATE_WINDOW: usize = 10;

/// One recorded value.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Sample {
    /// Seconds (epoch time for live capture, video time for offline processing)
    pub t: f64,
    /// `None` = no valid reading this cycle
    pub value: Option<f64>,
}

#[derive(Debug)]
struct Field {
    name: String,
    samples: Vec<Sample>,
}

/// Current wall-clock time as seconds since the UNIX epoch.
pub fn now_seconds() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

/// Append-only, gap-tolerant time series keyed by field name.
#[derive(Debug)]
pub struct Recorder {
    /// In registration order
    fields: Vec<Field>,
    /// Timestamp of every row of the current (or last) session
    times: Vec<f64>,
    is_recording: bool,
    start_time: Option<Instant>,
    /// Recent `record` timestamps, recording or not
    last_times: VecDeque<f64>,
    rate_window: usize,
    output_dir: PathBuf,
    /// Overrides the timestamp-derived name for the next stop only
    output_path: Option<PathBuf>,
}

impl Default for Recorder {
    fn default() -> Self {
        Self::new(crate::paths::get_scratch_dir())
    }
}

impl Recorder {
    /// Creates an idle recorder that writes sessions into `output_dir`.
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            fields: Vec::new(),
            times: Vec::new(),
            is_recording: false,
            start_time: None,
            last_times: VecDeque::new(),
            rate_window: DEFAULT_RATE_WINDOW,
            output_dir: output_dir.into(),
            output_path: None,
        }
    }

    /// Sets how many recent timestamps the rate estimate uses (at least 2).
    pub fn with_rate_window(mut self, window: usize) -> Self {
        self.rate_window = window.max(2);
        self
    }

    pub fn set_output_dir(&mut self, dir: impl Into<PathBuf>) {
        self.output_dir = dir.into();
    }

    /// Uses `path` for the next session written (instead of a timestamped name).
    pub fn set_output_path(&mut self, path: Option<PathBuf>) {
        self.output_path = path;
    }

    fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// Adds a field, backfilled with absent values for every row already recorded.
    pub fn add_field(&mut self, name: &str) -> bool {
        if name == TIME_COLUMN {
            log::warn!("[Recorder] '{}' is the time column, cancelling", name);
            return false;
        }
        if self.field_index(name).is_some() {
            log::warn!("[Recorder] Adding a field that already exists ({}), cancelling", name);
            return false;
        }

        let samples = self
            .times
            .iter()
            .map(|&t| Sample { t, value: None })
            .collect();
        self.fields.push(Field {
            name: name.to_string(),
            samples,
        });
        true
    }

    /// Moves a field's samples to a new name, keeping its column position.
    pub fn rename_field(&mut self, old_name: &str, new_name: &str) -> bool {
        let Some(idx) = self.field_index(old_name) else {
            log::warn!("[Recorder] Renaming a field that doesn't exist ({}), cancelling", old_name);
            return false;
        };
        if new_name == TIME_COLUMN {
            log::warn!("[Recorder] '{}' is the time column, cancelling", new_name);
            return false;
        }
        if self.field_index(new_name).is_some() {
            log::warn!("[Recorder] Renaming to a field that already exists ({}), cancelling", new_name);
            return false;
        }

        self.fields[idx].name = new_name.to_string();
        true
    }

    /// Removes a field and discards its samples.
    pub fn delete_field(&mut self, name: &str) -> bool {
        let Some(idx) = self.field_index(name) else {
            log::warn!("[Recorder] Removing a field that doesn't exist ({}), cancelling", name);
            return false;
        };

        self.fields.remove(idx);
        true
    }

    /// Replaces all fields and stops recording without writing anything.
    pub fn reset(&mut self, field_names: &[String]) {
        self.fields.clear();
        self.times.clear();
        self.last_times.clear();
        self.is_recording = false;
        self.start_time = None;
        for name in field_names {
            self.add_field(name);
        }
    }

    /// Field names in registration order.
    pub fn field_names(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.name.clone()).collect()
    }

    pub fn samples(&self, name: &str) -> Option<&[Sample]> {
        self.field_index(name).map(|idx| self.fields[idx].samples.as_slice())
    }

    /// Number of rows in the current (or last) session.
    pub fn row_count(&self) -> usize {
        self.times.len()
    }

    pub fn is_recording(&self) -> bool {
        self.is_recording
    }

    /// Starts (`true`) or stops (`false`) recording.
    ///
    /// Starting clears every field and the rate window. Stopping an active
    /// session writes it out and returns the file path.
    pub fn toggle_recording(&mut self, is_recording: bool) -> Result<Option<PathBuf>> {
        if is_recording {
            self.start_recording();
            Ok(None)
        } else if self.is_recording {
            self.stop_recording().map(Some)
        } else {
            log::debug!("[Recorder] Not recording, nothing to stop");
            Ok(None)
        }
    }

    pub fn start_recording(&mut self) {
        for field in &mut self.fields {
            field.samples.clear();
        }
        self.times.clear();
        self.last_times.clear();
        self.start_time = Some(Instant::now());
        self.is_recording = true;
        log::info!("[Recorder] Recording started ({} fields)", self.fields.len());
    }

    /// Stops recording and writes the session to CSV (header-only if empty).
    pub fn stop_recording(&mut self) -> Result<PathBuf> {
        self.is_recording = false;

        let path = self
            .output_path
            .take()
            .unwrap_or_else(|| timestamped_recording_path(&self.output_dir));

        let names: Vec<&str> = self.fields.iter().map(|f| f.name.as_str()).collect();
        let columns: Vec<Vec<Option<f64>>> = self
            .fields
            .iter()
            .map(|f| f.samples.iter().map(|s| s.value).collect())
            .collect();
        csv_writer::write_session(&path, &names, &self.times, &columns)?;

        log::info!(
            "[Recorder] Recording stopped: {} rows written to {}",
            self.times.len(),
            path.display()
        );
        Ok(path)
    }

    /// Records one cycle's readings at `timestamp` (now if `None`).
    ///
    /// The rate window is always updated. While recording, every known field
    /// gets one sample, absent when `readings` has no value for it.
    pub fn record(&mut self, readings: &Readings, timestamp: Option<f64>) {
        let t = timestamp.unwrap_or_else(now_seconds);

        self.last_times.push_back(t);
        while self.last_times.len() > self.rate_window {
            self.last_times.pop_front();
        }

        if !self.is_recording {
            return;
        }

        self.times.push(t);
        for field in &mut self.fields {
            let value = readings.get(&field.name).copied().flatten();
            field.samples.push(Sample { t, value });
        }
    }

    /// Seconds since recording started (0 when not recording).
    pub fn recording_time(&self) -> f64 {
        match (self.is_recording, self.start_time) {
            (true, Some(start)) => start.elapsed().as_secs_f64(),
            _ => 0.0,
        }
    }

    /// Average update rate over the last few `record` calls (0 with fewer than 2).
    pub fn get_average_fps(&self) -> f64 {
        if self.last_times.len() < 2 {
            return 0.0;
        }
        let (Some(first), Some(last)) = (self.last_times.front(), self.last_times.back()) else {
            return 0.0;
        };

        let mean_dt = (last - first) / (self.last_times.len() - 1) as f64;
        if mean_dt > 0.0 { 1.0 / mean_dt } else { 0.0 }
    }
}
