//! Post-session analysis of recorded CSV files.
//!
//! This module provides:
//! - CSV reading for recorded sessions, with absent values carried forward
//! - Stacked per-field line charts against time
//! - Region outlines drawn onto calibration frames

pub mod charts;
pub mod csv_reader;
pub mod overlay;

pub use csv_reader::SessionData;

use anyhow::{anyhow, Result};
use std::path::{Path, PathBuf};

/// Reads a session CSV and renders its chart next to it (or to `output`).
///
/// Returns the path of the written PNG.
pub fn plot_session(csv_path: &Path, output: Option<&Path>) -> Result<PathBuf> {
    let data = SessionData::from_csv(csv_path)?;
    if data.is_empty() {
        return Err(anyhow!("No samples in {}", csv_path.display()));
    }

    log::info!(
        "Loaded {} samples of {} fields from {}",
        data.len(),
        data.fields.len(),
        csv_path.display()
    );

    let chart_path = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| csv_path.with_extension("png"));
    charts::generate_session_chart(&data, &chart_path, charts::ChartLayout::default())?;
    log::info!("Chart saved: {}", chart_path.display());

    Ok(chart_path)
}
