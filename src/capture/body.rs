//! Body materialization
//!
//! Turns a body source into inspectable text without consuming it. Any
//! failure along the way collapses to [`CapturedBody::Opaque`].

use crate::error::CaptureError;
use crate::models::{CapturedBody, HeaderList};
use crate::surface::chain::RequestBody;
use bytes::Bytes;
use flate2::read::GzDecoder;
use std::io::{self, Read};

/// Default cap on captured body size (512 KiB).
pub const DEFAULT_MAX_BODY_BYTES: usize = 512 * 1024;

/// Something that can hand out an independent copy of its bytes.
pub trait BodySource {
    fn snapshot(&self) -> io::Result<Bytes>;
}

impl BodySource for [u8] {
    fn snapshot(&self) -> io::Result<Bytes> {
        Ok(Bytes::copy_from_slice(self))
    }
}

impl BodySource for Vec<u8> {
    fn snapshot(&self) -> io::Result<Bytes> {
        Ok(Bytes::copy_from_slice(self))
    }
}

impl BodySource for Bytes {
    fn snapshot(&self) -> io::Result<Bytes> {
        Ok(self.clone())
    }
}

impl BodySource for dyn RequestBody {
    fn snapshot(&self) -> io::Result<Bytes> {
        let mut buf = Vec::new();
        self.write_to(&mut buf)?;
        Ok(Bytes::from(buf))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Materializer {
    max_body_bytes: usize,
}

impl Default for Materializer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_BODY_BYTES)
    }
}

impl Materializer {
    pub fn new(max_body_bytes: usize) -> Self {
        Self { max_body_bytes }
    }

    pub fn max_body_bytes(&self) -> usize {
        self.max_body_bytes
    }

    /// Render `source` as text, gunzipping first when `headers` say so.
    pub fn materialize<S>(&self, source: &S, headers: &HeaderList) -> CapturedBody
    where
        S: BodySource + ?Sized,
    {
        let result = source
            .snapshot()
            .map_err(CaptureError::Snapshot)
            .and_then(|bytes| self.decode(&bytes, headers.is_gzip_encoded()));

        match result {
            Ok(text) => CapturedBody::Text(text),
            Err(err) => {
                tracing::debug!("Body not rendered as text: {}", err);
                CapturedBody::Opaque
            }
        }
    }

    /// Decode already-captured bytes.
    pub fn decode(&self, bytes: &[u8], gzip: bool) -> Result<String, CaptureError> {
        let limit = self.max_body_bytes;
        let raw = if gzip {
            let mut out = Vec::new();
            GzDecoder::new(bytes)
                .take(limit as u64 + 1)
                .read_to_end(&mut out)
                .map_err(CaptureError::Decompress)?;
            out
        } else {
            bytes.to_vec()
        };

        if raw.len() > limit {
            return Err(CaptureError::TooLarge { limit });
        }
        Ok(String::from_utf8(raw)?)
    }
}
