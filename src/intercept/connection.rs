//! Shims for stepwise connection clients
//!
//! [`TappedOpener`] decorates the library's opener once; every connection it
//! hands out is a [`TappedConnection`] that forwards each call unchanged and
//! records what it saw into a [`PendingRequestState`] kept in the registrar's
//! side-table. `connect()` and `input_stream()` each emit a record; neither is
//! guarded against being reached twice on one connection.

use crate::capture::{replay, InstanceHandle, InstanceId, InstanceTable, Materializer, Replayed};
use crate::models::{CapturedBody, CapturedExchange, HeaderList, Phase};
use crate::output::Recorder;
use crate::surface::connection::{ConnectionOpener, HttpConnection};
use std::io::{self, Read, Write};
use std::sync::Arc;
use std::time::Instant;

/// What has been observed on one connection so far.
#[derive(Debug, Default, Clone)]
pub struct PendingRequestState {
    pub url: Option<String>,
    pub method: Option<String>,
    pub headers: HeaderList,
    /// Present once the request output stream has been requested
    pub body: Option<Vec<u8>>,
}

pub type PendingTable = InstanceTable<PendingRequestState>;

/// Shared context for every tapped connection.
pub struct ConnectionTap {
    library: String,
    recorder: Arc<Recorder>,
    materializer: Materializer,
    pending: Arc<PendingTable>,
}

impl ConnectionTap {
    pub fn new(
        library: impl Into<String>,
        recorder: Arc<Recorder>,
        materializer: Materializer,
        pending: Arc<PendingTable>,
    ) -> Self {
        Self {
            library: library.into(),
            recorder,
            materializer,
            pending,
        }
    }

    fn update<F>(&self, instance: &InstanceHandle, apply: F)
    where
        F: FnOnce(&mut PendingRequestState),
    {
        let mut state = self.pending.entry_or_insert_with(instance, Default::default);
        apply(&mut state);
    }

    fn snapshot(&self, instance: &InstanceHandle) -> PendingRequestState {
        self.pending
            .entry_or_insert_with(instance, Default::default)
            .clone()
    }
}

pub struct TappedOpener {
    inner: Arc<dyn ConnectionOpener>,
    tap: Arc<ConnectionTap>,
}

impl TappedOpener {
    pub fn new(inner: Arc<dyn ConnectionOpener>, tap: Arc<ConnectionTap>) -> Self {
        Self { inner, tap }
    }
}

impl ConnectionOpener for TappedOpener {
    fn open(&self, url: &str) -> io::Result<Box<dyn HttpConnection>> {
        let connection = self.inner.open(url)?;
        let tapped = TappedConnection::new(connection, self.tap.clone());
        self.tap
            .update(&tapped.instance, |state| state.url = Some(url.to_string()));
        Ok(Box::new(tapped))
    }
}

pub struct TappedConnection {
    inner: Box<dyn HttpConnection>,
    instance: InstanceHandle,
    tap: Arc<ConnectionTap>,
}

impl TappedConnection {
    pub fn new(inner: Box<dyn HttpConnection>, tap: Arc<ConnectionTap>) -> Self {
        Self {
            inner,
            instance: InstanceHandle::new(),
            tap,
        }
    }

    pub fn instance_id(&self) -> InstanceId {
        self.instance.id()
    }

    /// Build an exchange from whatever has been observed so far.
    fn pending_exchange(&self) -> CapturedExchange {
        let state = self.tap.snapshot(&self.instance);
        let url = state.url.unwrap_or_else(|| self.inner.url());
        let method = state.method.unwrap_or_else(|| self.inner.request_method());
        let mut exchange = CapturedExchange::new(&self.tap.library, &method, &url, state.headers);
        exchange.request_body = match state.body {
            Some(body) if !body.is_empty() => {
                self.tap.materializer.materialize(&body, &exchange.request_headers)
            }
            _ => CapturedBody::None,
        };
        exchange
    }

    fn log_request(&self, phase: Phase) -> CapturedExchange {
        let exchange = self.pending_exchange();
        self.tap.recorder.emit(&exchange, phase);
        exchange
    }
}

impl Drop for TappedConnection {
    fn drop(&mut self) {
        self.tap.pending.remove(self.instance.id());
    }
}

impl HttpConnection for TappedConnection {
    fn url(&self) -> String {
        self.inner.url()
    }

    fn request_method(&self) -> String {
        self.inner.request_method()
    }

    fn set_request_method(&mut self, method: &str) -> io::Result<()> {
        self.inner.set_request_method(method)?;
        self.tap
            .update(&self.instance, |state| state.method = Some(method.to_string()));
        Ok(())
    }

    /// Header names match case-insensitively, as in the connection libraries
    /// themselves: setting `accept` after `Accept` replaces its value.
    fn set_request_property(&mut self, key: &str, value: &str) -> io::Result<()> {
        self.inner.set_request_property(key, value)?;
        self.tap
            .update(&self.instance, |state| state.headers.set(key, value));
        Ok(())
    }

    fn output_stream(&mut self) -> io::Result<Box<dyn Write + Send>> {
        let real = self.inner.output_stream()?;
        self.tap.update(&self.instance, |state| {
            state.body.get_or_insert_with(Vec::new);
        });
        Ok(Box::new(TeeWriter {
            inner: real,
            pending: self.tap.pending.clone(),
            id: self.instance.id(),
            limit: self.tap.materializer.max_body_bytes().saturating_add(1),
        }))
    }

    fn connect(&mut self) -> io::Result<()> {
        self.log_request(Phase::Connect);
        self.inner.connect()
    }

    fn input_stream(&mut self) -> io::Result<Box<dyn Read + Send>> {
        let mut exchange = self.log_request(Phase::InputStream);

        let start = Instant::now();
        let stream = self.inner.input_stream()?;
        let replayed = replay(stream);
        exchange.duration_ms = Some(start.elapsed().as_secs_f64() * 1000.0);

        match replayed {
            Replayed::Captured { bytes, fresh } => {
                if let Some((code, message)) = self.inner.response_status() {
                    exchange.status_code = Some(code);
                    exchange.status_message = Some(message);
                }
                exchange.response_headers = self.inner.response_headers().unwrap_or_default();
                exchange.response_body = self
                    .tap
                    .materializer
                    .materialize(&bytes, &exchange.response_headers);
                self.tap.recorder.emit(&exchange, Phase::Response);
                Ok(Box::new(fresh))
            }
            Replayed::Degraded { stream, error } => {
                tracing::debug!("Response stream for {} not captured: {}", exchange.url, error);
                Ok(Box::new(stream))
            }
        }
    }

    fn response_status(&self) -> Option<(u16, String)> {
        self.inner.response_status()
    }

    fn response_headers(&self) -> Option<HeaderList> {
        self.inner.response_headers()
    }
}

/// Forwards every write to the real stream, then copies the written bytes
/// into the connection's pending body. Dropping it drops (closes) the real
/// stream.
///
/// The copy stops one byte past the capture limit: enough for the body to
/// render as oversized without holding the rest of the upload.
pub struct TeeWriter {
    inner: Box<dyn Write + Send>,
    pending: Arc<PendingTable>,
    id: InstanceId,
    limit: usize,
}

impl TeeWriter {
    fn duplicate(&self, written: &[u8]) {
        let Some(mut state) = self.pending.get_mut(self.id) else {
            return;
        };
        let Some(body) = state.body.as_mut() else {
            return;
        };
        let take = self.limit.saturating_sub(body.len()).min(written.len());
        if take == 0 {
            return;
        }
        if body.try_reserve(take).is_ok() {
            body.extend_from_slice(&written[..take]);
        } else {
            tracing::debug!("Dropping {} captured request bytes", take);
        }
    }
}

impl Write for TeeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.inner.write(buf)?;
        self.duplicate(&buf[..written]);
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
