//! Ordered header multimap
//!
//! Client libraries render headers in their own order and allow repeated
//! names, so captured headers are kept as an insertion-ordered list of pairs.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HeaderList(Vec<(String, String)>);

impl HeaderList {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Append a header, keeping any existing values for the same name.
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.push((name.into(), value.into()));
    }

    /// Replace the first header with a matching name (case-insensitive) or
    /// append a new one. Later duplicates are dropped.
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        let mut updated = false;
        self.0.retain_mut(|(key, val)| {
            if !key.eq_ignore_ascii_case(name) {
                return true;
            }
            if updated {
                return false;
            }
            *val = value.clone();
            updated = true;
            true
        });
        if !updated {
            self.0.push((name.to_string(), value));
        }
    }

    /// First value for `name`, compared case-insensitively.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether `Content-Encoding` names gzip anywhere in its value.
    pub fn is_gzip_encoded(&self) -> bool {
        self.get("content-encoding")
            .map(|v| v.to_ascii_lowercase().contains("gzip"))
            .unwrap_or(false)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for HeaderList {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// One `Name: value` line per header, no trailing newline.
impl fmt::Display for HeaderList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (name, value)) in self.0.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}: {}", name, value)?;
        }
        Ok(())
    }
}
