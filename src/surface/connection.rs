//! Stepwise connection surface
//!
//! A request is assembled through discrete calls on one mutable connection
//! object and executed by `connect()` or `input_stream()`. Connections are
//! obtained from the process-wide [`ConnectionApi`], whose opener can be
//! decorated exactly once. The decoration outlives the opener it was applied
//! to: a later registration is wrapped the same way.

use crate::error::SurfaceError;
use crate::models::HeaderList;
use once_cell::sync::Lazy;
use std::io::{self, Read, Write};
use std::sync::{Arc, PoisonError, RwLock};

/// Name used in installation diagnostics.
pub const LIBRARY_NAME: &str = "connection client";

static GLOBAL_API: Lazy<Arc<ConnectionApi>> = Lazy::new(|| Arc::new(ConnectionApi::new()));

/// One connection object. Not meant for concurrent use.
pub trait HttpConnection: Send {
    fn url(&self) -> String;

    /// Method the connection will use; `GET` until set.
    fn request_method(&self) -> String;

    fn set_request_method(&mut self, method: &str) -> io::Result<()>;

    fn set_request_property(&mut self, key: &str, value: &str) -> io::Result<()>;

    fn output_stream(&mut self) -> io::Result<Box<dyn Write + Send>>;

    fn connect(&mut self) -> io::Result<()>;

    fn input_stream(&mut self) -> io::Result<Box<dyn Read + Send>>;

    /// Status code and message once the response has arrived.
    fn response_status(&self) -> Option<(u16, String)> {
        None
    }

    fn response_headers(&self) -> Option<HeaderList> {
        None
    }
}

/// Resolves a URL into a connection.
pub trait ConnectionOpener: Send + Sync {
    fn open(&self, url: &str) -> io::Result<Box<dyn HttpConnection>>;
}

type Decorator = Arc<dyn Fn(Arc<dyn ConnectionOpener>) -> Arc<dyn ConnectionOpener> + Send + Sync>;

#[derive(Default)]
struct OpenerSlot {
    opener: Option<Arc<dyn ConnectionOpener>>,
    decorator: Option<Decorator>,
}

#[derive(Default)]
pub struct ConnectionApi {
    slot: RwLock<OpenerSlot>,
}

impl ConnectionApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn global() -> Arc<Self> {
        GLOBAL_API.clone()
    }

    /// Make the library available, replacing any previous opener. If the
    /// surface is decorated, `opener` is wrapped before it is installed.
    pub fn register_opener(&self, opener: Arc<dyn ConnectionOpener>) {
        let mut slot = self.slot.write().unwrap_or_else(PoisonError::into_inner);
        let opener = match &slot.decorator {
            Some(wrap) => wrap(opener),
            None => opener,
        };
        slot.opener = Some(opener);
    }

    pub fn is_available(&self) -> bool {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .opener
            .is_some()
    }

    pub fn is_decorated(&self) -> bool {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .decorator
            .is_some()
    }

    pub fn open(&self, url: &str) -> io::Result<Box<dyn HttpConnection>> {
        let opener = self
            .slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .opener
            .clone()
            .ok_or_else(|| {
                io::Error::new(io::ErrorKind::NotFound, "no connection opener registered")
            })?;
        opener.open(url)
    }

    /// Replace the opener with `wrap(current)` and keep `wrap` for openers
    /// registered later. Allowed once.
    pub fn decorate<F>(&self, wrap: F) -> Result<(), SurfaceError>
    where
        F: Fn(Arc<dyn ConnectionOpener>) -> Arc<dyn ConnectionOpener> + Send + Sync + 'static,
    {
        let mut slot = self.slot.write().unwrap_or_else(PoisonError::into_inner);
        if slot.decorator.is_some() {
            return Err(SurfaceError::AlreadyHooked(LIBRARY_NAME));
        }
        let current = slot
            .opener
            .clone()
            .ok_or(SurfaceError::LibraryAbsent(LIBRARY_NAME))?;
        slot.opener = Some(wrap(current));
        slot.decorator = Some(Arc::new(wrap));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Refusing;

    impl ConnectionOpener for Refusing {
        fn open(&self, url: &str) -> io::Result<Box<dyn HttpConnection>> {
            Err(io::Error::new(io::ErrorKind::ConnectionRefused, url.to_string()))
        }
    }

    struct Labelled(Arc<dyn ConnectionOpener>);

    impl ConnectionOpener for Labelled {
        fn open(&self, url: &str) -> io::Result<Box<dyn HttpConnection>> {
            self.0.open(&format!("{url}#wrapped"))
        }
    }

    #[test]
    fn open_without_library_is_not_found() {
        let api = ConnectionApi::new();
        let err = api.open("http://a").err().unwrap();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn decorate_requires_library() {
        let api = ConnectionApi::new();
        let result = api.decorate(|inner| inner);
        assert_eq!(result, Err(SurfaceError::LibraryAbsent(LIBRARY_NAME)));
    }

    #[test]
    fn decorate_applies_once() {
        let api = ConnectionApi::new();
        api.register_opener(Arc::new(Refusing));
        api.decorate(|inner| Arc::new(Labelled(inner))).unwrap();
        assert!(api.is_decorated());

        let err = api.open("http://a").err().unwrap();
        assert_eq!(err.to_string(), "http://a#wrapped");

        let again = api.decorate(|inner| Arc::new(Labelled(inner)));
        assert_eq!(again, Err(SurfaceError::AlreadyHooked(LIBRARY_NAME)));
    }

    #[test]
    fn later_registration_keeps_decoration() {
        let api = ConnectionApi::new();
        api.register_opener(Arc::new(Refusing));
        api.decorate(|inner| Arc::new(Labelled(inner))).unwrap();

        api.register_opener(Arc::new(Refusing));
        assert!(api.is_decorated());
        let err = api.open("http://b").err().unwrap();
        assert_eq!(err.to_string(), "http://b#wrapped");
    }
}
