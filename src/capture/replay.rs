//! Stream replay
//!
//! Drains a consume-once reader into memory and hands back an equivalent
//! fresh reader, so the captured bytes can be logged while the application
//! still reads the full stream.

use bytes::Bytes;
use std::io::{self, Cursor, Read};

/// Outcome of draining a reader.
pub enum Replayed<R> {
    /// The whole stream was drained.
    Captured { bytes: Bytes, fresh: ReplayStream<R> },
    /// Draining failed partway. `stream` yields the bytes already drained
    /// followed by the untouched remainder of the original reader.
    Degraded { stream: ReplayStream<R>, error: io::Error },
}

impl<R> Replayed<R> {
    /// Captured bytes, if the drain completed.
    pub fn captured(&self) -> Option<&Bytes> {
        match self {
            Replayed::Captured { bytes, .. } => Some(bytes),
            Replayed::Degraded { .. } => None,
        }
    }

    /// The reader to give back to the application.
    pub fn into_stream(self) -> ReplayStream<R> {
        match self {
            Replayed::Captured { fresh, .. } => fresh,
            Replayed::Degraded { stream, .. } => stream,
        }
    }
}

/// Reader handed to the application in place of the original stream.
pub enum ReplayStream<R> {
    Buffered(Cursor<Bytes>),
    Passthrough(io::Chain<Cursor<Vec<u8>>, R>),
}

impl<R: Read> Read for ReplayStream<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            ReplayStream::Buffered(cursor) => cursor.read(buf),
            ReplayStream::Passthrough(chain) => chain.read(buf),
        }
    }
}

/// Fully drain `source`.
pub fn replay<R: Read>(mut source: R) -> Replayed<R> {
    let mut drained = Vec::new();
    // read_to_end keeps bytes read before an error in `drained`
    match source.read_to_end(&mut drained) {
        Ok(_) => {
            let bytes = Bytes::from(drained);
            Replayed::Captured {
                fresh: ReplayStream::Buffered(Cursor::new(bytes.clone())),
                bytes,
            }
        }
        Err(error) => Replayed::Degraded {
            stream: ReplayStream::Passthrough(Cursor::new(drained).chain(source)),
            error,
        },
    }
}
