//! Logging setup
//!
//! Stderr gets a compact fmt layer filtered by `RUST_LOG`; warnings are
//! additionally copied to a log file in the output directory. The file
//! target is only known after the specification resolves, so the file layer
//! writes through a late-bound writer that discards until bound.

use std::fs::File;
use std::io::{self, Write};
use std::sync::{Arc, Mutex, OnceLock};

use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Layer};

/// A `MakeWriter` whose destination file is bound after initialization.
/// Events logged before binding are discarded.
#[derive(Clone, Default)]
pub struct LateFileWriter {
    target: Arc<OnceLock<Mutex<File>>>,
}

impl LateFileWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind the destination file. Only the first bind takes effect.
    pub fn bind(&self, file: File) {
        let _ = self.target.set(Mutex::new(file));
    }
}

pub struct LateFileHandle {
    target: Arc<OnceLock<Mutex<File>>>,
}

impl Write for LateFileHandle {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.target.get() {
            Some(file) => file.lock().expect("log file poisoned").write(buf),
            None => Ok(buf.len()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.target.get() {
            Some(file) => file.lock().expect("log file poisoned").flush(),
            None => Ok(()),
        }
    }
}

impl<'a> MakeWriter<'a> for LateFileWriter {
    type Writer = LateFileHandle;

    fn make_writer(&'a self) -> Self::Writer {
        LateFileHandle {
            target: Arc::clone(&self.target),
        }
    }
}

/// Install the global subscriber: compact stderr output plus a WARN-level
/// file copy through `file_writer`.
pub fn init_logging(file_writer: LateFileWriter) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_writer(io::stderr),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(file_writer)
                .with_filter(LevelFilter::WARN),
        );

    let _ = tracing::dispatcher::set_global_default(tracing::Dispatch::new(subscriber));
}
