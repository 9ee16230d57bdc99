//! Logging setup.
//!
//! Installs `env_logger` with a `[HH:MM:SS.mmm] LEVEL message` line format.
//! Every line goes to stderr and, optionally, is appended to a log file.

use anyhow::{Context, Result};
use chrono::Local;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::Mutex;

/// Writes every line to stderr and mirrors it into a file.
struct Tee {
    file: Mutex<File>,
}

impl Write for Tee {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let _ = io::stderr().write_all(buf);
        if let Ok(mut file) = self.file.lock() {
            let _ = file.write_all(buf);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if let Ok(mut file) = self.file.lock() {
            file.flush()?;
        }
        io::stderr().flush()
    }
}

/// Installs the global logger. Call once at startup.
///
/// The default level is `info`; `RUST_LOG` overrides it. When `log_file` is
/// given, lines are also appended to that file (parent dirs are created).
pub fn init_logging(log_file: Option<&Path>) -> Result<()> {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));

    builder.format(|buf, record| {
        writeln!(
            buf,
            "[{}] {:<5} {}",
            Local::now().format("%H:%M:%S%.3f"),
            record.level(),
            record.args()
        )
    });

    if let Some(path) = log_file {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create log dir {}", parent.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open log file {}", path.display()))?;
        builder.target(env_logger::Target::Pipe(Box::new(Tee {
            file: Mutex::new(file),
        })));
    }

    builder.try_init().context("Logger already initialized")?;
    Ok(())
}

/// Routes panics through the logger so they end up in the log file too.
pub fn install_panic_hook() {
    std::panic::set_hook(Box::new(|panic_info| {
        let msg = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };
        let location = panic_info
            .location()
            .map(|loc| format!(" at {}:{}:{}", loc.file(), loc.line(), loc.column()))
            .unwrap_or_default();
        log::error!("[PANIC]{} {}", location, msg);
    }));
}
