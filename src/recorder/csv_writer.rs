//! CSV output for recording sessions.
//!
//! Every cell is double-quoted; absent values are written as `""`.
//! The first column is always the timestamp `t`.

use anyhow::{Context, Result};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

/// Name of the timestamp column. No field may use it.
pub const TIME_COLUMN: &str = "t";

/// Quotes one cell, doubling embedded quotes.
fn quote(cell: &str) -> String {
    format!("\"{}\"", cell.replace('"', "\"\""))
}

fn write_row<W: Write>(out: &mut W, cells: &[String]) -> std::io::Result<()> {
    let line = cells
        .iter()
        .map(|c| quote(c))
        .collect::<Vec<_>>()
        .join(",");
    writeln!(out, "{}", line)
}

/// Formats an optional value; absent becomes an empty cell.
pub fn format_value(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// Writes a whole session: header `t,<fields...>`, then one row per sample index.
///
/// `columns[i][row]` is field `i` at sample `row`; every column must be as long as `times`.
pub fn write_session(
    path: &Path,
    field_names: &[&str],
    times: &[f64],
    columns: &[Vec<Option<f64>>],
) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }

    let file = File::create(path)
        .with_context(|| format!("Failed to create CSV file {}", path.display()))?;
    let mut out = BufWriter::new(file);

    let mut header = vec![TIME_COLUMN.to_string()];
    header.extend(field_names.iter().map(|name| name.to_string()));
    write_row(&mut out, &header).context("Failed to write CSV header")?;

    for (row, t) in times.iter().enumerate() {
        let mut cells = Vec::with_capacity(columns.len() + 1);
        cells.push(t.to_string());
        for column in columns {
            cells.push(format_value(column.get(row).copied().flatten()));
        }
        write_row(&mut out, &cells).context("Failed to write CSV row")?;
    }

    out.flush().context("Failed to flush CSV file")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_header_only() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.csv");

        write_session(&path, &["speed", "temp"], &[], &[vec![], vec![]]).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "\"t\",\"speed\",\"temp\"\n");
    }

    #[test]
    fn test_rows_and_absent_values() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("out.csv");

        write_session(
            &path,
            &["speed", "temp"],
            &[0.5, 1.0],
            &[vec![Some(12.0), None], vec![Some(87.3), Some(-2.5)]],
        )
        .unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1], "\"0.5\",\"12\",\"87.3\"");
        assert_eq!(lines[2], "\"1\",\"\",\"-2.5\"");
    }

    #[test]
    fn test_quotes_are_escaped() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("q.csv");

        write_session(&path, &["say \"hi\""], &[], &[vec![]]).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "\"t\",\"say \"\"hi\"\"\"\n");
    }
}
