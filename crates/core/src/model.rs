//! Request and response types shared by the worker, the stores and the host.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::store::RequestKey;

/// Kind of asset a request fetches.
///
/// Derived from the request alone, so identical requests always classify
/// identically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Destination {
    Image,
    Font,
    Style,
    Script,
    /// Documents, API calls and anything unrecognised.
    Other,
}

impl Destination {
    /// Infer a destination from the URL path extension.
    ///
    /// Used when the host does not report the request destination.
    pub fn infer(url: &Url) -> Self {
        let path = url.path();
        let ext = match path.rsplit_once('.') {
            Some((stem, ext)) if !ext.contains('/') && !stem.is_empty() => ext.to_ascii_lowercase(),
            _ => return Destination::Other,
        };

        match ext.as_str() {
            "png" | "jpg" | "jpeg" | "gif" | "webp" | "avif" | "svg" | "ico" | "bmp" => Destination::Image,
            "woff" | "woff2" | "ttf" | "otf" | "eot" => Destination::Font,
            "css" => Destination::Style,
            "js" | "mjs" | "cjs" => Destination::Script,
            _ => Destination::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Destination::Image => "image",
            Destination::Font => "font",
            Destination::Style => "style",
            Destination::Script => "script",
            Destination::Other => "other",
        }
    }
}

impl From<&str> for Destination {
    /// Map a host-reported destination string. Unknown kinds (`document`,
    /// `empty`, ...) are `Other`.
    fn from(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "image" => Destination::Image,
            "font" => Destination::Font,
            "style" => Destination::Style,
            "script" => Destination::Script,
            _ => Destination::Other,
        }
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request delivered to the worker by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub method: String,
    pub url: Url,
    pub destination: Destination,
}

impl FetchRequest {
    pub fn new(method: &str, url: Url, destination: Destination) -> Self {
        Self { method: method.to_ascii_uppercase(), url, destination }
    }

    /// A GET request with the destination inferred from the URL.
    pub fn get(url: Url) -> Self {
        let destination = Destination::infer(&url);
        Self::new("GET", url, destination)
    }

    pub fn with_destination(mut self, destination: Destination) -> Self {
        self.destination = destination;
        self
    }

    /// Storage identity of this request.
    pub fn key(&self) -> RequestKey {
        RequestKey::new(&self.method, &self.url)
    }
}

/// A response captured at write time: status, headers and a body snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapturedResponse {
    /// URL the response was served from (after redirects).
    pub url: String,
    pub status: u16,
    /// Header names are lowercase.
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
    /// RFC 3339 capture timestamp.
    pub captured_at: String,
}

impl CapturedResponse {
    pub fn new(url: impl Into<String>, status: u16, headers: BTreeMap<String, String>, body: Vec<u8>) -> Self {
        let headers = headers.into_iter().map(|(k, v)| (k.to_ascii_lowercase(), v)).collect();
        Self { url: url.into(), status, headers, body, captured_at: chrono::Utc::now().to_rfc3339() }
    }

    /// 2xx status. Only these are written to partitions.
    pub fn is_ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.get("content-type").map(String::as_str)
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}
