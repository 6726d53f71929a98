//! Record sinks
//!
//! A sink receives one fully rendered block at a time. Serialization of
//! concurrent writers happens in [`Recorder`](super::Recorder), not here.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

/// Tracing target used by [`TracingSink`].
pub const RECORD_TARGET: &str = "httptap::record";

pub trait RecordSink: Send {
    fn write_block(&mut self, block: &str) -> io::Result<()>;
}

/// Writes blocks to standard error.
#[derive(Debug, Default)]
pub struct StderrSink;

impl RecordSink for StderrSink {
    fn write_block(&mut self, block: &str) -> io::Result<()> {
        let mut stderr = io::stderr().lock();
        writeln!(stderr, "{}", block)?;
        stderr.flush()
    }
}

/// Appends blocks to a file.
#[derive(Debug)]
pub struct FileSink {
    path: PathBuf,
    file: File,
}

impl FileSink {
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RecordSink for FileSink {
    fn write_block(&mut self, block: &str) -> io::Result<()> {
        let mut data = String::with_capacity(block.len() + 1);
        data.push_str(block);
        data.push('\n');
        self.file.write_all(data.as_bytes())?;
        self.file.flush()
    }
}

/// Emits each block as a single `tracing` event.
#[derive(Debug, Default)]
pub struct TracingSink;

impl RecordSink for TracingSink {
    fn write_block(&mut self, block: &str) -> io::Result<()> {
        tracing::info!(target: RECORD_TARGET, "\n{}", block);
        Ok(())
    }
}

/// Keeps blocks in memory. Clones share the same storage.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    blocks: Arc<Mutex<Vec<String>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn blocks(&self) -> Vec<String> {
        self.blocks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn clear(&self) {
        self.blocks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl RecordSink for MemorySink {
    fn write_block(&mut self, block: &str) -> io::Result<()> {
        self.blocks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(block.to_string());
        Ok(())
    }
}
