//! Record output
//!
//! The [`Recorder`] is the only process-wide shared resource on the capture
//! path. It renders a record outside its lock and then writes the whole block
//! under the lock, so blocks from concurrent exchanges never interleave.

pub mod format;
pub mod sink;

pub use format::RecordFormat;
pub use sink::{FileSink, MemorySink, RecordSink, StderrSink, TracingSink};

use crate::models::{CapturedExchange, Phase};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

pub struct Recorder {
    sink: Mutex<Box<dyn RecordSink>>,
    format: RecordFormat,
    emitted: AtomicU64,
}

impl Recorder {
    pub fn new(sink: Box<dyn RecordSink>, format: RecordFormat) -> Self {
        Self {
            sink: Mutex::new(sink),
            format,
            emitted: AtomicU64::new(0),
        }
    }

    pub fn format(&self) -> RecordFormat {
        self.format
    }

    /// Render and write one record. Sink failures are logged, never returned.
    pub fn emit(&self, exchange: &CapturedExchange, phase: Phase) {
        let block = format::render(self.format, exchange, phase);
        let mut sink = self.sink.lock().unwrap_or_else(PoisonError::into_inner);
        match sink.write_block(&block) {
            Ok(()) => {
                self.emitted.fetch_add(1, Ordering::Relaxed);
            }
            Err(err) => tracing::warn!("Failed to write capture record {}: {}", exchange.id, err),
        }
    }

    /// Number of records successfully written.
    pub fn emitted(&self) -> u64 {
        self.emitted.load(Ordering::Relaxed)
    }
}
