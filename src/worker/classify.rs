//! Request classification.
//!
//! `classify` is pure and synchronous: the strategy for a request is fixed
//! at dispatch time from the request and the injected configuration alone.

use axum::http::{
    HeaderMap, HeaderName, Method, StatusCode,
    header::{IF_MATCH, IF_MODIFIED_SINCE, IF_NONE_MATCH, IF_RANGE, IF_UNMODIFIED_SINCE, RANGE},
};
use bytes::Bytes;
use serde::Serialize;
use url::Url;

use crate::cache::RequestKey;

use super::config::ControllerConfig;

/// What the requesting context intends to do with the response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Destination {
    Document,
    Image,
    Script,
    Style,
    Font,
    #[default]
    Empty,
}

impl Destination {
    /// Map a `Sec-Fetch-Dest` header value.
    pub fn from_fetch_dest(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "document" | "iframe" | "frame" => Self::Document,
            "image" => Self::Image,
            "script" | "worker" | "sharedworker" => Self::Script,
            "style" => Self::Style,
            "font" => Self::Font,
            _ => Self::Empty,
        }
    }
}

/// An intercepted request.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub method: Method,
    pub url: Url,
    pub destination: Destination,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl FetchRequest {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            destination: Destination::Empty,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn with_destination(mut self, destination: Destination) -> Self {
        self.destination = destination;
        self
    }

    pub fn key(&self) -> RequestKey {
        RequestKey::new(&self.method, &self.url)
    }

    /// A copy without validators or range headers, so the network answers
    /// with the full representation stored under the plain key.
    pub fn unconditional(&self) -> Self {
        let mut request = self.clone();
        for name in CONDITIONAL_HEADERS {
            request.headers.remove(name);
        }
        request
    }
}

const CONDITIONAL_HEADERS: [HeaderName; 6] = [
    IF_NONE_MATCH,
    IF_MODIFIED_SINCE,
    IF_MATCH,
    IF_UNMODIFIED_SINCE,
    RANGE,
    IF_RANGE,
];

/// Request classes, listed in precedence order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    /// Not intercepted; the request goes to the network untouched.
    Passthrough,
    StaticAsset,
    ApiPattern,
    Image,
    Other,
}

/// Caching algorithms bound to classifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Serve the cached copy; on miss fetch without storing.
    CacheFirst,
    /// Serve the cached copy; on miss fetch and store a copy.
    CacheFirstPopulate,
    /// Fetch and store a copy of any complete response; on failure serve the cached copy.
    NetworkFirst,
    /// Fetch and store only `200 OK`; on failure serve the cached copy.
    NetworkFirstOk,
}

impl Strategy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CacheFirst => "cache_first",
            Self::CacheFirstPopulate => "cache_first_populate",
            Self::NetworkFirst => "network_first",
            Self::NetworkFirstOk => "network_first_ok",
        }
    }

    /// Whether a network response with `status` is written to the dynamic partition.
    ///
    /// `206` and `304` never carry the full representation and are not stored.
    pub fn stores(self, status: StatusCode) -> bool {
        match self {
            Self::CacheFirst => false,
            Self::CacheFirstPopulate | Self::NetworkFirst => {
                !matches!(status, StatusCode::PARTIAL_CONTENT | StatusCode::NOT_MODIFIED)
            }
            Self::NetworkFirstOk => status == StatusCode::OK,
        }
    }

    /// Whether some network response under this strategy may be stored.
    pub fn may_store(self) -> bool {
        !matches!(self, Self::CacheFirst)
    }
}

impl Classification {
    pub fn strategy(self) -> Option<Strategy> {
        match self {
            Self::Passthrough => None,
            Self::StaticAsset => Some(Strategy::CacheFirst),
            Self::ApiPattern => Some(Strategy::NetworkFirst),
            Self::Image => Some(Strategy::CacheFirstPopulate),
            Self::Other => Some(Strategy::NetworkFirstOk),
        }
    }
}

/// Classify a request; the first matching rule wins.
pub fn classify(config: &ControllerConfig, request: &FetchRequest) -> Classification {
    let pathname = request.url.path();

    if request.method != Method::GET {
        Classification::Passthrough
    } else if config.is_precached(pathname) {
        Classification::StaticAsset
    } else if config.matches_api(pathname) {
        Classification::ApiPattern
    } else if request.destination == Destination::Image {
        Classification::Image
    } else {
        Classification::Other
    }
}
