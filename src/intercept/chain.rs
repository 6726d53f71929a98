//! Interceptor for chain-based clients
//!
//! One [`CaptureInterceptor`] is shared by every client it is injected into.
//! Each call emits a request record before forwarding and a response record
//! after, and hands back the response it received.

use crate::capture::Materializer;
use crate::models::{CapturedBody, CapturedExchange, HeaderList, Phase};
use crate::output::Recorder;
use crate::surface::chain::{Chain, Interceptor, Response, ResponseBody};
use std::io;
use std::sync::Arc;
use std::time::Instant;

pub struct CaptureInterceptor {
    library: String,
    recorder: Arc<Recorder>,
    materializer: Materializer,
}

impl CaptureInterceptor {
    pub fn new(
        library: impl Into<String>,
        recorder: Arc<Recorder>,
        materializer: Materializer,
    ) -> Self {
        Self {
            library: library.into(),
            recorder,
            materializer,
        }
    }

    /// Buffer the response body just past the capture limit and render a copy
    /// of the buffer. The body keeps serving the same bytes to the caller.
    fn capture_response_body(
        &self,
        body: &mut ResponseBody,
        headers: &HeaderList,
    ) -> CapturedBody {
        let wanted = self.materializer.max_body_bytes() as u64 + 1;
        if let Err(err) = body.request(wanted) {
            tracing::debug!("Response body could not be buffered: {}", err);
            return CapturedBody::Opaque;
        }
        self.materializer.materialize(&body.buffer(), headers)
    }
}

impl Interceptor for CaptureInterceptor {
    fn intercept(&self, chain: &mut dyn Chain) -> io::Result<Response> {
        let request = chain.request().clone();
        let mut exchange = CapturedExchange::new(
            &self.library,
            request.method().as_str(),
            request.url(),
            request.headers().clone(),
        );
        if let Some(body) = request.body() {
            exchange.request_body = self
                .materializer
                .materialize(body.as_ref(), request.headers());
        }
        self.recorder.emit(&exchange, Phase::Request);

        let start = Instant::now();
        let mut response = chain.proceed(request)?;
        exchange.duration_ms = Some(start.elapsed().as_secs_f64() * 1000.0);

        exchange.status_code = Some(response.code());
        exchange.status_message = Some(response.message().to_string());
        exchange.response_headers = response.headers().clone();
        let headers = exchange.response_headers.clone();
        if let Some(body) = response.body_mut() {
            exchange.response_body = self.capture_response_body(body, &headers);
        }
        self.recorder.emit(&exchange, Phase::Response);

        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OPAQUE_BODY_SENTINEL;
    use crate::output::{MemorySink, RecordFormat};
    use crate::surface::chain::{ChainApi, Request, Transport};
    use bytes::Bytes;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::{Read, Write};
    use std::sync::Mutex;

    fn client_with_capture(
        transport: Arc<dyn Transport>,
        limit: usize,
    ) -> (crate::surface::chain::Client, MemorySink) {
        let sink = MemorySink::new();
        let recorder = Arc::new(Recorder::new(Box::new(sink.clone()), RecordFormat::Text));
        let interceptor = CaptureInterceptor::new("HttpClient", recorder, Materializer::new(limit));
        let mut builder = ChainApi::new().builder(transport);
        builder.add_interceptor(Arc::new(interceptor));
        (builder.build(), sink)
    }

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    /// Serves `data` a few bytes at a time, like a socket.
    struct Trickle {
        data: Vec<u8>,
        pos: usize,
    }

    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = (self.data.len() - self.pos).min(4).min(buf.len());
            buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
    }

    #[test]
    fn get_emits_request_then_response_and_preserves_body() {
        let payload = br#"{"items":[{"id":1},{"id":2}]}"#.to_vec();
        let served = payload.clone();
        let transport: Arc<dyn Transport> = Arc::new(move |_req: Request| -> io::Result<Response> {
            Ok(Response::new(200, "OK")
                .with_header("Content-Type", "application/json")
                .with_body(ResponseBody::from_reader(Trickle { data: served.clone(), pos: 0 })))
        });
        let (client, sink) = client_with_capture(transport, 1024);

        let request = Request::get("https://api.example.com/v1/items")
            .with_header("Accept", "application/json");
        let mut response = client.execute(request).unwrap();

        assert_eq!(response.body_mut().unwrap().bytes().unwrap(), Bytes::from(payload));

        let blocks = sink.blocks();
        assert_eq!(blocks.len(), 2);
        assert!(blocks[0].starts_with(
            "┌── [HttpClient Request]\n│ GET https://api.example.com/v1/items\n"
        ));
        assert!(blocks[0].contains("│ Headers:\nAccept: application/json\n│ Body:\n<none>\n"));
        assert!(blocks[1].contains("│ 200 OK  ("));
        assert!(blocks[1].contains(" ms)  https://api.example.com/v1/items"));
        assert!(blocks[1].contains(r#"{"items":[{"id":1},{"id":2}]}"#));
    }

    #[test]
    fn gzip_request_body_is_logged_decompressed_and_sent_compressed() {
        let compressed = gzip(br#"{"a":1}"#);
        let sent = Arc::new(Mutex::new(Vec::new()));
        let transport: Arc<dyn Transport> = {
            let sent = sent.clone();
            Arc::new(move |req: Request| -> io::Result<Response> {
                let mut buf = Vec::new();
                req.body().unwrap().write_to(&mut buf)?;
                *sent.lock().unwrap() = buf;
                Ok(Response::new(204, "No Content"))
            })
        };
        let (client, sink) = client_with_capture(transport, 1024);

        let request = Request::post(
            "https://api.example.com/v1/items",
            Arc::new(compressed.clone()),
        )
        .with_header("Content-Encoding", "gzip");
        let response = client.execute(request).unwrap();

        assert_eq!(*sent.lock().unwrap(), compressed);
        assert!(response.body().is_none());
        let blocks = sink.blocks();
        assert!(blocks[0].contains("│ Body:\n{\"a\":1}\n"));
        assert!(blocks[1].contains("│ 204 No Content"));
        assert!(blocks[1].contains("│ Body:\n<none>\n"));
    }

    #[test]
    fn gzip_response_is_decoded_for_the_log_only() {
        let compressed = gzip(b"hello");
        let served = compressed.clone();
        let transport: Arc<dyn Transport> = Arc::new(move |_req: Request| -> io::Result<Response> {
            Ok(Response::new(200, "OK")
                .with_header("Content-Encoding", "gzip")
                .with_body(ResponseBody::from_bytes(served.clone())))
        });
        let (client, sink) = client_with_capture(transport, 1024);

        let mut response = client.execute(Request::get("http://h/")).unwrap();
        assert_eq!(response.body_mut().unwrap().bytes().unwrap().to_vec(), compressed);
        assert!(sink.blocks()[1].contains("│ Body:\nhello\n"));
    }

    #[test]
    fn oversized_response_is_opaque_but_delivered_whole() {
        let payload = vec![b'x'; 100];
        let served = payload.clone();
        let transport: Arc<dyn Transport> = Arc::new(move |_req: Request| -> io::Result<Response> {
            Ok(Response::new(200, "OK").with_body(ResponseBody::from_reader(Trickle {
                data: served.clone(),
                pos: 0,
            })))
        });
        let (client, sink) = client_with_capture(transport, 16);

        let mut response = client.execute(Request::get("http://h/big")).unwrap();
        assert_eq!(response.body_mut().unwrap().bytes().unwrap().to_vec(), payload);
        assert!(sink.blocks()[1].contains(OPAQUE_BODY_SENTINEL));
    }

    /// Yields `data`, then fails on every read.
    struct ResetAfter {
        data: Vec<u8>,
        pos: usize,
    }

    impl Read for ResetAfter {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.pos == self.data.len() {
                return Err(io::Error::new(io::ErrorKind::ConnectionReset, "peer reset"));
            }
            let n = (self.data.len() - self.pos).min(buf.len());
            buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
    }

    #[test]
    fn failed_buffering_logs_sentinel_and_caller_sees_bytes_then_error() {
        let transport: Arc<dyn Transport> = Arc::new(|_req: Request| -> io::Result<Response> {
            let body = ResponseBody::from_reader(ResetAfter {
                data: b"partial".to_vec(),
                pos: 0,
            });
            Ok(Response::new(200, "OK").with_body(body))
        });
        let (client, sink) = client_with_capture(transport, 1024);

        let mut response = client.execute(Request::get("http://h/reset")).unwrap();
        let mut received = Vec::new();
        let err = response
            .body_mut()
            .unwrap()
            .read_to_end(&mut received)
            .unwrap_err();

        assert_eq!(received, b"partial");
        assert_eq!(err.kind(), io::ErrorKind::ConnectionReset);
        assert_eq!(err.to_string(), "peer reset");
        let blocks = sink.blocks();
        assert_eq!(blocks.len(), 2);
        assert!(blocks[1].contains(&format!("│ Body:\n{}\n", OPAQUE_BODY_SENTINEL)));
    }

    #[test]
    fn forwarding_failure_propagates_without_response_record() {
        let transport: Arc<dyn Transport> = Arc::new(|_req: Request| -> io::Result<Response> {
            Err(io::Error::new(io::ErrorKind::TimedOut, "read timed out"))
        });
        let (client, sink) = client_with_capture(transport, 1024);

        let err = client.execute(Request::get("http://h/slow")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
        assert_eq!(err.to_string(), "read timed out");
        let blocks = sink.blocks();
        assert_eq!(blocks.len(), 1);
        assert!(blocks[0].contains("[HttpClient Request]"));
    }
}
