//! CSV reader for recorded sessions.
//!
//! Parses files written by `recorder::csv_writer`: a quoted header `t,<fields...>`
//! followed by one quoted row per sample, where empty cells are absent values.

use anyhow::{anyhow, Context, Result};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::recorder::csv_writer::TIME_COLUMN;

/// One recorded field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSeries {
    pub name: String,
    /// One entry per sample; `None` where nothing was read
    pub values: Vec<Option<f64>>,
}

impl FieldSeries {
    /// Values with each gap filled by the last value read before it.
    ///
    /// Leading gaps stay `None`; there is nothing to carry into them.
    pub fn forward_filled(&self) -> Vec<Option<f64>> {
        let mut last = None;
        self.values
            .iter()
            .map(|value| {
                if value.is_some() {
                    last = *value;
                }
                last
            })
            .collect()
    }
}

/// All samples loaded from one session CSV.
#[derive(Debug, Clone, Default)]
pub struct SessionData {
    /// Sample timestamps (seconds)
    pub times: Vec<f64>,
    pub fields: Vec<FieldSeries>,
}

/// Splits one line of fully quoted CSV, undoing doubled quotes.
fn split_quoted(line: &str) -> Vec<String> {
    let mut cells = Vec::new();
    let mut cell = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                cell.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => cells.push(std::mem::take(&mut cell)),
            _ => cell.push(c),
        }
    }
    cells.push(cell);
    cells
}

impl SessionData {
    /// Load a session from a CSV file.
    ///
    /// Rows whose timestamp doesn't parse are skipped with a warning. Cells that
    /// don't parse as numbers count as absent.
    pub fn from_csv(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("Failed to open CSV file: {}", path.display()))?;
        let mut lines = BufReader::new(file).lines();

        let header = match lines.next() {
            Some(line) => split_quoted(&line.context("Failed to read CSV header")?),
            None => return Err(anyhow!("{} is empty", path.display())),
        };
        if header.first().map(String::as_str) != Some(TIME_COLUMN) {
            return Err(anyhow!(
                "{} does not start with a '{}' column",
                path.display(),
                TIME_COLUMN
            ));
        }

        let mut data = SessionData {
            times: Vec::new(),
            fields: header[1..]
                .iter()
                .map(|name| FieldSeries {
                    name: name.clone(),
                    values: Vec::new(),
                })
                .collect(),
        };

        for (line_num, line_result) in lines.enumerate() {
            let line = line_result.context("Failed to read line from CSV")?;
            if line.trim().is_empty() {
                continue;
            }

            let cells = split_quoted(&line);
            let t = match cells[0].trim().parse::<f64>() {
                Ok(t) => t,
                Err(e) => {
                    log::warn!("Skipping CSV row {}: bad timestamp: {}", line_num + 2, e);
                    continue;
                }
            };

            data.times.push(t);
            for (idx, field) in data.fields.iter_mut().enumerate() {
                let value = cells
                    .get(idx + 1)
                    .and_then(|cell| cell.trim().parse::<f64>().ok());
                field.values.push(value);
            }
        }

        Ok(data)
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }
}
