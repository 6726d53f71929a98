//! Chain-based client surface
//!
//! A client whose pipeline is an ordered list of [`Interceptor`]s ending in a
//! [`Transport`]. Each interceptor sees the request through a [`Chain`] and
//! forwards it with [`Chain::proceed`].
//!
//! The build step of [`ClientBuilder`] is the hook point: a [`BuildHook`]
//! registered on the builder's [`ChainApi`] runs before every `build()`.

use crate::capture::instance::InstanceHandle;
use crate::error::SurfaceError;
use crate::models::HeaderList;
use bytes::{Buf, Bytes, BytesMut};
use http::Method;
use once_cell::sync::Lazy;
use std::fmt;
use std::io::{self, Read, Write};
use std::sync::{Arc, PoisonError, RwLock};

/// Name used in installation diagnostics.
pub const LIBRARY_NAME: &str = "chain client";

const READ_CHUNK: usize = 8 * 1024;

static GLOBAL_API: Lazy<Arc<ChainApi>> = Lazy::new(ChainApi::new);

/// Request payload that can be written any number of times.
pub trait RequestBody: Send + Sync {
    fn content_type(&self) -> Option<&str> {
        None
    }

    /// Write the full body to `sink` without consuming it.
    fn write_to(&self, sink: &mut dyn Write) -> io::Result<()>;
}

impl RequestBody for Bytes {
    fn write_to(&self, sink: &mut dyn Write) -> io::Result<()> {
        sink.write_all(self)
    }
}

impl RequestBody for Vec<u8> {
    fn write_to(&self, sink: &mut dyn Write) -> io::Result<()> {
        sink.write_all(self)
    }
}

impl RequestBody for String {
    fn content_type(&self) -> Option<&str> {
        Some("text/plain; charset=utf-8")
    }

    fn write_to(&self, sink: &mut dyn Write) -> io::Result<()> {
        sink.write_all(self.as_bytes())
    }
}

/// Outgoing request. Cloning shares the body.
#[derive(Clone)]
pub struct Request {
    method: Method,
    url: String,
    headers: HeaderList,
    body: Option<Arc<dyn RequestBody>>,
}

impl Request {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderList::new(),
            body: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: impl Into<String>, body: Arc<dyn RequestBody>) -> Self {
        Self::new(Method::POST, url).with_body(body)
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn with_body(mut self, body: Arc<dyn RequestBody>) -> Self {
        self.body = Some(body);
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn headers(&self) -> &HeaderList {
        &self.headers
    }

    pub fn body(&self) -> Option<&Arc<dyn RequestBody>> {
        self.body.as_ref()
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.method)
            .field("url", &self.url)
            .field("headers", &self.headers)
            .field("has_body", &self.body.is_some())
            .finish()
    }
}

/// Buffered view over a one-shot response stream.
///
/// [`ResponseBody::request`] pulls bytes from the live stream into the buffer;
/// reads drain the buffer before touching the stream again. A stream error hit
/// while buffering is held back until the buffered bytes have been read.
pub struct ResponseBody {
    buffer: BytesMut,
    source: Option<Box<dyn Read + Send>>,
    deferred_error: Option<io::Error>,
}

impl ResponseBody {
    pub fn from_reader<R>(reader: R) -> Self
    where
        R: Read + Send + 'static,
    {
        Self {
            buffer: BytesMut::new(),
            source: Some(Box::new(reader)),
            deferred_error: None,
        }
    }

    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        let bytes: Bytes = bytes.into();
        Self {
            buffer: BytesMut::from(&bytes[..]),
            source: None,
            deferred_error: None,
        }
    }

    /// Buffer at least `byte_count` bytes, or everything left if the stream is
    /// shorter. Returns whether `byte_count` bytes are now buffered.
    pub fn request(&mut self, byte_count: u64) -> io::Result<bool> {
        if let Some(err) = &self.deferred_error {
            return Err(io::Error::new(err.kind(), err.to_string()));
        }
        let mut chunk = [0u8; READ_CHUNK];
        while (self.buffer.len() as u64) < byte_count {
            let Some(source) = self.source.as_mut() else {
                break;
            };
            match source.read(&mut chunk) {
                Ok(0) => self.source = None,
                Ok(n) => self.buffer.extend_from_slice(&chunk[..n]),
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    let reported = io::Error::new(err.kind(), err.to_string());
                    self.deferred_error = Some(err);
                    return Err(reported);
                }
            }
        }
        Ok(self.buffer.len() as u64 >= byte_count)
    }

    /// Copy of the buffered, not yet read bytes.
    pub fn buffer(&self) -> Bytes {
        Bytes::copy_from_slice(&self.buffer)
    }

    /// Whether the live stream has been fully pulled into the buffer.
    pub fn is_exhausted(&self) -> bool {
        self.source.is_none()
    }

    /// Read the remaining body.
    pub fn bytes(&mut self) -> io::Result<Bytes> {
        let mut out = Vec::new();
        self.read_to_end(&mut out)?;
        Ok(Bytes::from(out))
    }

    pub fn string(&mut self) -> io::Result<String> {
        let bytes = self.bytes()?;
        String::from_utf8(bytes.to_vec()).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }
}

impl Read for ResponseBody {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if !self.buffer.is_empty() {
            let n = out.len().min(self.buffer.len());
            out[..n].copy_from_slice(&self.buffer[..n]);
            self.buffer.advance(n);
            return Ok(n);
        }
        if let Some(err) = self.deferred_error.take() {
            return Err(err);
        }
        match self.source.as_mut() {
            Some(source) => {
                let n = source.read(out)?;
                if n == 0 && !out.is_empty() {
                    self.source = None;
                }
                Ok(n)
            }
            None => Ok(0),
        }
    }
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseBody")
            .field("buffered", &self.buffer.len())
            .field("exhausted", &self.source.is_none())
            .finish()
    }
}

#[derive(Debug)]
pub struct Response {
    code: u16,
    message: String,
    headers: HeaderList,
    body: Option<ResponseBody>,
}

impl Response {
    pub fn new(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            headers: HeaderList::new(),
            body: None,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn with_body(mut self, body: ResponseBody) -> Self {
        self.body = Some(body);
        self
    }

    pub fn code(&self) -> u16 {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn headers(&self) -> &HeaderList {
        &self.headers
    }

    pub fn body(&self) -> Option<&ResponseBody> {
        self.body.as_ref()
    }

    pub fn body_mut(&mut self) -> Option<&mut ResponseBody> {
        self.body.as_mut()
    }

    pub fn into_body(self) -> Option<ResponseBody> {
        self.body
    }
}

/// View of one in-flight call as seen by an interceptor.
pub trait Chain {
    fn request(&self) -> &Request;

    /// Forward `request` to the rest of the pipeline.
    fn proceed(&mut self, request: Request) -> io::Result<Response>;
}

pub trait Interceptor: Send + Sync {
    fn intercept(&self, chain: &mut dyn Chain) -> io::Result<Response>;
}

/// Terminal network call.
pub trait Transport: Send + Sync {
    fn execute(&self, request: Request) -> io::Result<Response>;
}

impl<F> Transport for F
where
    F: Fn(Request) -> io::Result<Response> + Send + Sync,
{
    fn execute(&self, request: Request) -> io::Result<Response> {
        self(request)
    }
}

struct RealChain<'a> {
    interceptors: &'a [Arc<dyn Interceptor>],
    index: usize,
    transport: &'a dyn Transport,
    request: Request,
}

impl Chain for RealChain<'_> {
    fn request(&self) -> &Request {
        &self.request
    }

    fn proceed(&mut self, request: Request) -> io::Result<Response> {
        match self.interceptors.get(self.index) {
            Some(interceptor) => {
                let mut next = RealChain {
                    interceptors: self.interceptors,
                    index: self.index + 1,
                    transport: self.transport,
                    request,
                };
                interceptor.intercept(&mut next)
            }
            None => self.transport.execute(request),
        }
    }
}

/// Runs before a builder snapshots its configuration into a client.
pub trait BuildHook: Send + Sync {
    fn before_build(&self, builder: &mut ClientBuilder);
}

/// Process-wide surface of the chain client library.
#[derive(Default)]
pub struct ChainApi {
    build_hook: RwLock<Option<Arc<dyn BuildHook>>>,
}

impl ChainApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn global() -> Arc<Self> {
        GLOBAL_API.clone()
    }

    pub fn builder(self: &Arc<Self>, transport: Arc<dyn Transport>) -> ClientBuilder {
        ClientBuilder {
            api: self.clone(),
            instance: InstanceHandle::new(),
            interceptors: Vec::new(),
            transport,
        }
    }

    /// Wrap the build step. Only one hook may be installed.
    pub fn set_build_hook(&self, hook: Arc<dyn BuildHook>) -> Result<(), SurfaceError> {
        let mut guard = self
            .build_hook
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if guard.is_some() {
            return Err(SurfaceError::AlreadyHooked(LIBRARY_NAME));
        }
        *guard = Some(hook);
        Ok(())
    }

    pub fn is_hooked(&self) -> bool {
        self.build_hook
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    fn build_hook(&self) -> Option<Arc<dyn BuildHook>> {
        self.build_hook
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

pub struct ClientBuilder {
    api: Arc<ChainApi>,
    instance: InstanceHandle,
    interceptors: Vec<Arc<dyn Interceptor>>,
    transport: Arc<dyn Transport>,
}

impl ClientBuilder {
    /// Builder bound to the process-wide [`ChainApi`].
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        ChainApi::global().builder(transport)
    }

    pub fn add_interceptor(&mut self, interceptor: Arc<dyn Interceptor>) -> &mut Self {
        self.interceptors.push(interceptor);
        self
    }

    pub fn interceptors(&self) -> &[Arc<dyn Interceptor>] {
        &self.interceptors
    }

    pub fn instance(&self) -> &InstanceHandle {
        &self.instance
    }

    /// Snapshot the current configuration into a client. May be called
    /// repeatedly on one builder.
    pub fn build(&mut self) -> Client {
        if let Some(hook) = self.api.build_hook() {
            hook.before_build(self);
        }
        Client {
            interceptors: self.interceptors.clone().into(),
            transport: self.transport.clone(),
        }
    }
}

#[derive(Clone)]
pub struct Client {
    interceptors: Arc<[Arc<dyn Interceptor>]>,
    transport: Arc<dyn Transport>,
}

impl Client {
    pub fn interceptor_count(&self) -> usize {
        self.interceptors.len()
    }

    /// Run `request` through every interceptor, then the transport.
    pub fn execute(&self, request: Request) -> io::Result<Response> {
        let mut chain = RealChain {
            interceptors: &self.interceptors,
            index: 0,
            transport: self.transport.as_ref(),
            request: request.clone(),
        };
        chain.proceed(request)
    }
}
