//! Logger initialization.
//!
//! Installs a `tracing-subscriber` `fmt` layer that backs the `log` facade
//! used throughout the rest of the crate, so that both our own `log::info!`
//! calls and environment-callback command 6 (`LOG_MESSAGE`) from the core
//! land in the same stream.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::sync::Mutex;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::MakeWriter;

/// Initializes the global logger.
///
/// Honors the `LOG_FILE` environment variable (redirect to a file instead
/// of stderr) and `LOG_SYNC` (force a flush after every write, so the tail
/// of the log survives a crash).
///
/// # Errors
///
/// Returns an error if `LOG_FILE` names a path that cannot be opened for
/// appending.
pub fn init() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let sync = std::env::var_os("LOG_SYNC").is_some();

    let sink = match std::env::var_os("LOG_FILE") {
        Some(path) => Sink::File(Mutex::new(
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("failed to open log file: {}", path.to_string_lossy()))?,
        )),
        None => Sink::Stderr,
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(LogWriter::new(sink, sync))
        .with_ansi(false)
        .with_target(false)
        .with_level(true)
        .init();

    tracing_log::LogTracer::init().context("failed to bridge `log` into `tracing`")?;

    Ok(())
}

/// Destination for formatted log lines.
enum Sink {
    Stderr,
    File(Mutex<File>),
}

/// A [`MakeWriter`] that optionally flushes after every write.
#[derive(Clone)]
struct LogWriter {
    sink: &'static Sink,
    sync: bool,
}

impl LogWriter {
    fn new(sink: Sink, sync: bool) -> Self {
        Self {
            sink: Box::leak(Box::new(sink)),
            sync,
        }
    }
}

impl<'a> MakeWriter<'a> for LogWriter {
    type Writer = LineWriter;

    fn make_writer(&'a self) -> Self::Writer {
        LineWriter {
            sink: self.sink,
            sync: self.sync,
        }
    }
}

struct LineWriter {
    sink: &'static Sink,
    sync: bool,
}

impl Write for LineWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = match self.sink {
            Sink::Stderr => io::stderr().write(buf)?,
            Sink::File(file) => file.lock().unwrap().write(buf)?,
        };
        if self.sync {
            self.flush()?;
        }
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.sink {
            Sink::Stderr => io::stderr().flush(),
            Sink::File(file) => file.lock().unwrap().flush(),
        }
    }
}
