//! Per-request strategy selection.

use serde::Serialize;

use larder_core::{Destination, FetchRequest};

/// Delivery strategy for an intercepted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    CacheFirst,
    StaleWhileRevalidate,
    NetworkFirst,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::CacheFirst => "cache_first",
            Strategy::StaleWhileRevalidate => "stale_while_revalidate",
            Strategy::NetworkFirst => "network_first",
        }
    }
}

/// Routing decision for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Not intercepted; the host fetches it as if no worker existed.
    Passthrough,
    Intercept(Strategy),
}

/// Classify a request. First matching rule wins.
pub fn select(request: &FetchRequest) -> Route {
    if request.method != "GET" || !matches!(request.url.scheme(), "http" | "https") {
        return Route::Passthrough;
    }

    let strategy = match request.destination {
        Destination::Image | Destination::Font => Strategy::CacheFirst,
        Destination::Style | Destination::Script => Strategy::StaleWhileRevalidate,
        Destination::Other => Strategy::NetworkFirst,
    };

    Route::Intercept(strategy)
}
