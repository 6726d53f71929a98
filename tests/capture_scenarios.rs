use std::io::{self, Cursor, Read, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use flate2::write::GzEncoder;
use flate2::Compression;
use once_cell::sync::Lazy;
use serial_test::serial;

use httptap::api::{init_core, install_chain_adapter, install_connection_adapter, tap_status};
use httptap::config::{SinkConfig, TapConfig};
use httptap::intercept::Installed;
use httptap::models::HeaderList;
use httptap::surface::chain::{ChainApi, ClientBuilder, Request, Response, ResponseBody, Transport};
use httptap::surface::connection::{ConnectionApi, ConnectionOpener, HttpConnection};

const FOOTER: &str = "└────────────────────────────────────────\n";

static RECORD_DIR: Lazy<tempfile::TempDir> = Lazy::new(|| tempfile::tempdir().unwrap());
static WIRE: Lazy<Arc<Mutex<Vec<u8>>>> = Lazy::new(|| Arc::new(Mutex::new(Vec::new())));

fn record_path() -> PathBuf {
    RECORD_DIR.path().join("records.log")
}

/// Register the connection library and initialize the engine once per process.
fn setup() {
    static READY: Lazy<()> = Lazy::new(|| {
        ConnectionApi::global().register_opener(Arc::new(LoopbackOpener));
        let config = TapConfig {
            sink: SinkConfig::File {
                path: record_path(),
            },
            ..TapConfig::default()
        };
        let report = init_core(config).unwrap();
        assert!(report.all_active(), "{:?}", report);
    });
    Lazy::force(&READY);
}

/// Records whose block mentions `url`, in emission order.
fn records_for(url: &str) -> Vec<String> {
    let written = std::fs::read_to_string(record_path()).unwrap_or_default();
    written
        .split(FOOTER)
        .filter(|block| block.contains(url))
        .map(|block| block.trim_start_matches('\n').to_string())
        .collect()
}

fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

struct LoopbackConnection {
    url: String,
    method: String,
    headers: HeaderList,
}

struct WireWriter;

impl Write for WireWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        WIRE.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl HttpConnection for LoopbackConnection {
    fn url(&self) -> String {
        self.url.clone()
    }

    fn request_method(&self) -> String {
        self.method.clone()
    }

    fn set_request_method(&mut self, method: &str) -> io::Result<()> {
        self.method = method.to_string();
        Ok(())
    }

    fn set_request_property(&mut self, key: &str, value: &str) -> io::Result<()> {
        self.headers.set(key, value);
        Ok(())
    }

    fn output_stream(&mut self) -> io::Result<Box<dyn Write + Send>> {
        Ok(Box::new(WireWriter))
    }

    fn connect(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn input_stream(&mut self) -> io::Result<Box<dyn Read + Send>> {
        Ok(Box::new(Cursor::new(b"pong".to_vec())))
    }

    fn response_status(&self) -> Option<(u16, String)> {
        Some((200, "OK".to_string()))
    }
}

struct LoopbackOpener;

impl ConnectionOpener for LoopbackOpener {
    fn open(&self, url: &str) -> io::Result<Box<dyn HttpConnection>> {
        Ok(Box::new(LoopbackConnection {
            url: url.to_string(),
            method: "GET".to_string(),
            headers: HeaderList::new(),
        }))
    }
}

fn json_transport(payload: &'static str) -> Arc<dyn Transport> {
    Arc::new(move |_req: Request| -> io::Result<Response> {
        Ok(Response::new(200, "OK")
            .with_header("Content-Type", "application/json")
            .with_body(ResponseBody::from_bytes(payload.as_bytes().to_vec())))
    })
}

#[test]
#[serial]
fn chain_get_is_recorded_before_and_after_forwarding() {
    setup();
    let url = "https://api.example.com/v1/items";
    let client = ClientBuilder::new(json_transport(r#"{"items":[]}"#)).build();

    let request = Request::get(url).with_header("Accept", "application/json");
    let mut response = client.execute(request).unwrap();
    assert_eq!(response.body_mut().unwrap().string().unwrap(), r#"{"items":[]}"#);

    let records = records_for(url);
    assert_eq!(records.len(), 2);
    assert_eq!(
        records[0],
        "┌── [HttpClient Request]\n\
         │ GET https://api.example.com/v1/items\n\
         │ Headers:\n\
         Accept: application/json\n\
         │ Body:\n\
         <none>\n"
    );
    assert!(records[1].starts_with("┌── [HttpClient Response]\n│ 200 OK  ("));
    assert!(records[1].contains(" ms)  https://api.example.com/v1/items\n"));
    assert!(records[1].contains("│ Body:\n{\"items\":[]}\n"));
}

#[test]
#[serial]
fn chain_gzip_post_is_logged_decoded() {
    setup();
    let url = "https://api.example.com/v1/gzip-post";
    let client = ClientBuilder::new(json_transport("{}")).build();

    let request = Request::post(url, Arc::new(gzip(br#"{"a":1}"#)))
        .with_header("Content-Encoding", "gzip");
    client.execute(request).unwrap();

    let records = records_for(url);
    assert!(records[0].contains("│ POST https://api.example.com/v1/gzip-post\n"));
    assert!(records[0].contains("│ Body:\n{\"a\":1}\n"));
}

#[test]
#[serial]
fn connection_connect_without_body_records_none() {
    setup();
    let url = "https://api.example.com/v1/connect-only";
    let mut connection = ConnectionApi::global().open(url).unwrap();
    connection.set_request_method("POST").unwrap();
    connection.set_request_property("X-Trace", "abc").unwrap();
    connection.connect().unwrap();

    let records = records_for(url);
    assert_eq!(
        records,
        vec![
            "┌── [HttpConnection connect()]\n\
             │ POST https://api.example.com/v1/connect-only\n\
             │ Headers:\n\
             X-Trace: abc\n\
             │ Body:\n\
             <none>\n"
                .to_string()
        ]
    );
}

#[test]
#[serial]
fn connection_body_reaches_wire_and_response_is_replayed() {
    setup();
    let url = "https://api.example.com/v1/upload";
    WIRE.lock().unwrap().clear();

    let mut connection = ConnectionApi::global().open(url).unwrap();
    connection.set_request_method("PUT").unwrap();
    connection.output_stream().unwrap().write_all(b"hello wire").unwrap();
    let mut body = String::new();
    connection.input_stream().unwrap().read_to_string(&mut body).unwrap();

    assert_eq!(body, "pong");
    assert_eq!(WIRE.lock().unwrap().as_slice(), b"hello wire");

    let records = records_for(url);
    assert_eq!(records.len(), 2);
    assert!(records[0].starts_with("┌── [HttpConnection input_stream()]\n│ PUT "));
    assert!(records[0].contains("│ Body:\nhello wire\n"));
    assert!(records[1].contains("│ 200 OK  ("));
    assert!(records[1].contains("│ Body:\npong\n"));
}

#[test]
#[serial]
fn installation_is_idempotent() {
    setup();
    assert_eq!(install_chain_adapter().unwrap(), Installed::AlreadyInstalled);
    assert_eq!(install_connection_adapter().unwrap(), Installed::AlreadyInstalled);
    assert!(ChainApi::global().is_hooked());

    let mut builder = ClientBuilder::new(json_transport("{}"));
    builder.build();
    builder.build();
    assert_eq!(builder.interceptors().len(), 1);

    let status = tap_status();
    assert!(status.initialized);
    assert!(status.chain_active);
    assert!(status.connection_active);
}
