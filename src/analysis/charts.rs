//! Chart generation using plotters.
//!
//! One PNG per session: a panel per field, stacked vertically, all sharing
//! the time axis.

use super::csv_reader::SessionData;
use anyhow::{anyhow, Context, Result};
use plotters::prelude::*;
use std::ops::Range;
use std::path::Path;

/// Line colors, cycled across fields.
const FIELD_COLORS: [RGBColor; 5] = [
    RGBColor(220, 80, 80),
    RGBColor(80, 120, 200),
    RGBColor(80, 180, 80),
    RGBColor(230, 150, 40),
    RGBColor(140, 90, 180),
];

/// Pixel sizes of the rendered chart.
#[derive(Clone, Copy, Debug)]
pub struct ChartLayout {
    pub width: u32,
    /// Height of one field panel
    pub panel_height: u32,
    pub title_height: u32,
}

impl Default for ChartLayout {
    fn default() -> Self {
        Self {
            width: 1200,
            panel_height: 220,
            title_height: 40,
        }
    }
}

/// Axis range covering `values`, padded by 5% of the span.
///
/// A flat series gets ±1 so the line isn't drawn on the border.
/// Returns `None` when there is nothing to draw.
fn value_range(values: &[Option<f64>]) -> Option<Range<f64>> {
    let (min, max) = values
        .iter()
        .flatten()
        .fold(None, |acc: Option<(f64, f64)>, &v| match acc {
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            None => Some((v, v)),
        })?;

    let span = max - min;
    if span == 0.0 {
        return Some(min - 1.0..max + 1.0);
    }
    let pad = span * 0.05;
    Some(min - pad..max + pad)
}

/// Shared x range; a single sample still gets a one second window.
fn time_range(times: &[f64]) -> Range<f64> {
    let first = times.first().copied().unwrap_or(0.0);
    let last = times.last().copied().unwrap_or(first);
    if last > first {
        first..last
    } else {
        first..first + 1.0
    }
}

/// (t, value) pairs for the samples that have a value.
fn line_points(times: &[f64], values: &[Option<f64>]) -> Vec<(f64, f64)> {
    times
        .iter()
        .zip(values)
        .filter_map(|(&t, v)| v.map(|v| (t, v)))
        .collect()
}

/// Render every field of `data` against time into `output_path`.
pub fn generate_session_chart(data: &SessionData, output_path: &Path, layout: ChartLayout) -> Result<()> {
    if data.fields.is_empty() {
        return Err(anyhow!("Session has no fields to plot"));
    }

    let height = layout.title_height + layout.panel_height * data.fields.len() as u32;
    let root = BitMapBackend::new(output_path, (layout.width, height)).into_drawing_area();
    root.fill(&WHITE).context("Failed to fill chart background")?;

    let (title_area, panels_area) = root.split_vertically(layout.title_height);
    let title = format!("Recorded session ({} samples)", data.len());
    let title_font = ("sans-serif", 22).into_font().style(FontStyle::Bold);
    title_area.draw_text(&title, &title_font.color(&BLACK), (20, 10))?;

    let x_range = time_range(&data.times);
    let panels = panels_area.split_evenly((data.fields.len(), 1));
    let last = panels.len() - 1;

    for (idx, (panel, field)) in panels.iter().zip(&data.fields).enumerate() {
        let filled = field.forward_filled();
        let color = FIELD_COLORS[idx % FIELD_COLORS.len()];

        let Some(y_range) = value_range(&filled) else {
            log::warn!("Field '{}' has no values, leaving its panel empty", field.name);
            continue;
        };

        let mut chart = ChartBuilder::on(panel)
            .margin(10)
            .x_label_area_size(if idx == last { 30 } else { 0 })
            .y_label_area_size(70)
            .build_cartesian_2d(x_range.clone(), y_range)
            .with_context(|| format!("Failed to build panel for '{}'", field.name))?;

        let mut mesh = chart.configure_mesh();
        mesh.y_desc(field.name.as_str())
            .light_line_style(RGBColor(230, 230, 230));
        if idx == last {
            mesh.x_desc("Time (s)");
        } else {
            mesh.disable_x_axis();
        }
        mesh.draw().context("Failed to draw mesh")?;

        chart.draw_series(LineSeries::new(
            line_points(&data.times, &filled),
            color.stroke_width(2),
        ))?;
    }

    root.present().context("Failed to save chart")?;
    Ok(())
}
