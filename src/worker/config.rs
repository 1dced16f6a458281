//! Controller configuration.
//!
//! Everything a worker version needs to know is carried here and injected at
//! construction, so several versions can live side by side.

use regex::Regex;
use url::Url;

pub const DEFAULT_STATIC_PARTITION: &str = "static-v1";
pub const DEFAULT_DYNAMIC_PARTITION: &str = "dynamic-v1";
pub const DEFAULT_SYNC_TAG: &str = "background-sync";
pub const DEFAULT_SCOPE: &str = "http://127.0.0.1:3000/";
pub const DEFAULT_PRECACHE: &[&str] = &[
    "/",
    "/boutique",
    "/static/js/bundle.js",
    "/static/css/main.css",
    "/favicon.ico",
    "/logo192.png",
    "/logo512.png",
];
pub const DEFAULT_API_PATTERNS: &[&str] = &[r"/api/products", r"/api/categories"];

const DEFAULT_NOTIFICATION_TITLE: &str = "DentalTech Pro";
const DEFAULT_NOTIFICATION_BODY: &str = "New update available";
const DEFAULT_NOTIFICATION_ICON: &str = "/logo192.png";
const DEFAULT_VIBRATE: &[u32] = &[100, 50, 100];
const DEFAULT_OPEN_URL: &str = "/";

/// Configuration of one worker version.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Origin the worker controls; manifest paths resolve against it.
    pub scope: Url,
    /// Current static partition name.
    pub static_partition: String,
    /// Current dynamic partition name.
    pub dynamic_partition: String,
    /// App-shell paths precached at install and served cache-first.
    pub precache: Vec<String>,
    /// Pathname patterns served network-first with cache population.
    pub api_patterns: Vec<Regex>,
    /// Background sync tag that drains the offline action queue.
    pub sync_tag: String,
    pub notification: NotificationConfig,
}

/// Fixed parts of every push notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationConfig {
    pub title: String,
    pub default_body: String,
    pub icon: String,
    pub badge: String,
    pub vibrate: Vec<u32>,
    pub primary_key: u64,
    /// Opened when the `explore` action is clicked.
    pub open_url: String,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            title: DEFAULT_NOTIFICATION_TITLE.to_string(),
            default_body: DEFAULT_NOTIFICATION_BODY.to_string(),
            icon: DEFAULT_NOTIFICATION_ICON.to_string(),
            badge: DEFAULT_NOTIFICATION_ICON.to_string(),
            vibrate: DEFAULT_VIBRATE.to_vec(),
            primary_key: 1,
            open_url: DEFAULT_OPEN_URL.to_string(),
        }
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            scope: default_scope(),
            static_partition: DEFAULT_STATIC_PARTITION.to_string(),
            dynamic_partition: DEFAULT_DYNAMIC_PARTITION.to_string(),
            precache: DEFAULT_PRECACHE.iter().map(|path| path.to_string()).collect(),
            api_patterns: default_api_patterns(),
            sync_tag: DEFAULT_SYNC_TAG.to_string(),
            notification: NotificationConfig::default(),
        }
    }
}

impl ControllerConfig {
    /// Returns true for the two partitions this version keeps at activation.
    pub fn is_current(&self, partition: &str) -> bool {
        partition == self.static_partition || partition == self.dynamic_partition
    }

    /// Returns true when `pathname` exactly matches a manifest entry.
    pub fn is_precached(&self, pathname: &str) -> bool {
        self.precache.iter().any(|path| path == pathname)
    }

    /// Returns true when any API pattern matches `pathname`.
    pub fn matches_api(&self, pathname: &str) -> bool {
        self.api_patterns
            .iter()
            .any(|pattern| pattern.is_match(pathname))
    }

    /// Resolve a manifest path against the scope.
    pub fn resolve(&self, path: &str) -> Result<Url, url::ParseError> {
        self.scope.join(path)
    }
}

fn default_scope() -> Url {
    Url::parse(DEFAULT_SCOPE).unwrap_or_else(|_| unreachable!("default scope is a valid URL"))
}

fn default_api_patterns() -> Vec<Regex> {
    DEFAULT_API_PATTERNS
        .iter()
        .filter_map(|pattern| Regex::new(pattern).ok())
        .collect()
}
