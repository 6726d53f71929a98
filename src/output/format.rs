//! Record rendering
//!
//! ```text
//! ┌── [HttpClient Request]
//! │ GET https://api.example.com/v1/items
//! │ Headers:
//! Accept: application/json
//! │ Body:
//! <none>
//! └────────────────────────────────────────
//! ```

use crate::models::{CapturedExchange, Phase, NONE_MARKER};
use serde::{Deserialize, Serialize};
use std::fmt::Write;

const BLOCK_FOOTER: &str = "└────────────────────────────────────────";

/// How records are rendered before they reach the sink.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for RecordFormat {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(RecordFormat::Text),
            "json" => Ok(RecordFormat::Json),
            _ => Err(()),
        }
    }
}

pub fn render(format: RecordFormat, exchange: &CapturedExchange, phase: Phase) -> String {
    match format {
        RecordFormat::Text => render_text(exchange, phase),
        RecordFormat::Json => render_json(exchange, phase),
    }
}

pub fn render_text(exchange: &CapturedExchange, phase: Phase) -> String {
    let mut out = String::new();
    // writing into a String cannot fail
    let _ = writeln!(out, "┌── [{} {}]", exchange.library, phase.label());

    let (headers, body) = if phase.is_response() {
        let code = exchange
            .status_code
            .map(|c| c.to_string())
            .unwrap_or_else(|| "none".to_string());
        let message = exchange.status_message.as_deref().unwrap_or("none");
        let _ = writeln!(
            out,
            "│ {} {}  ({} ms)  {}",
            code,
            message,
            exchange.duration_str(),
            exchange.url
        );
        (&exchange.response_headers, &exchange.response_body)
    } else {
        let _ = writeln!(out, "│ {} {}", exchange.method, exchange.url);
        (&exchange.request_headers, &exchange.request_body)
    };

    out.push_str("│ Headers:\n");
    if headers.is_empty() {
        out.push_str(NONE_MARKER);
    } else {
        let _ = write!(out, "{}", headers);
    }
    let _ = write!(out, "\n│ Body:\n{}\n{}", body, BLOCK_FOOTER);
    out
}

#[derive(Serialize)]
struct JsonRecord<'a> {
    phase: Phase,
    #[serde(flatten)]
    exchange: &'a CapturedExchange,
}

/// One JSON object per record, falling back to text if serialization fails.
pub fn render_json(exchange: &CapturedExchange, phase: Phase) -> String {
    match serde_json::to_string(&JsonRecord { phase, exchange }) {
        Ok(line) => line,
        Err(err) => {
            tracing::warn!("Failed to serialize capture record: {}", err);
            render_text(exchange, phase)
        }
    }
}
