//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{
    net::SocketAddr,
    num::{NonZeroU64, NonZeroUsize},
    str::FromStr,
    time::Duration,
};

use clap::Parser;
use config::{Config, Environment, File};
use regex::Regex;
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

use crate::infra::{
    clients::DEFAULT_TRACKED_CLIENTS, notifications::DEFAULT_RETAINED_NOTIFICATIONS,
};
use crate::worker::{
    ControllerConfig, DEFAULT_API_PATTERNS, DEFAULT_DYNAMIC_PARTITION, DEFAULT_PRECACHE,
    DEFAULT_STATIC_PARTITION, DEFAULT_SYNC_TAG, NotificationConfig,
};

mod cli;

pub use cli::{CliArgs, Command, PrecacheArgs, ServeArgs, ServeOverrides, UpstreamOverrides};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "storefront-offline";
const ENV_PREFIX: &str = "STOREFRONT_OFFLINE";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_ADMIN_HOST: &str = "127.0.0.1";
const DEFAULT_PUBLIC_PORT: u16 = 3000;
const DEFAULT_ADMIN_PORT: u16 = 3001;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_MAX_BODY_BYTES: u64 = 2 * 1024 * 1024;
const DEFAULT_UPSTREAM_URL: &str = "http://127.0.0.1:5000/";
const DEFAULT_UPSTREAM_TIMEOUT_SECS: u64 = 15;

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub upstream: UpstreamSettings,
    pub worker: ControllerConfig,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub public_addr: SocketAddr,
    pub admin_addr: SocketAddr,
    pub graceful_shutdown: Duration,
    pub max_body_bytes: NonZeroU64,
    /// Distinct clients remembered by the public listener.
    pub tracked_clients: NonZeroUsize,
    /// Displayed notifications and window requests kept for the admin API.
    pub retained_notifications: NonZeroUsize,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct UpstreamSettings {
    /// Origin every intercepted and passed-through request is sent to.
    pub base_url: Url,
    pub timeout: Duration,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Precache(args)) => raw.apply_upstream_overrides(&args.upstream),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    upstream: RawUpstreamSettings,
    worker: RawWorkerSettings,
    notification: RawNotificationSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(host) = overrides.server_admin_host.as_ref() {
            self.server.admin_host = Some(host.clone());
        }
        if let Some(port) = overrides.public_port {
            self.server.public_port = Some(port);
        }
        if let Some(port) = overrides.admin_port {
            self.server.admin_port = Some(port);
        }
        if let Some(seconds) = overrides.server_graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
        }
        if let Some(limit) = overrides.server_max_body_bytes {
            self.server.max_body_bytes = Some(limit);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(scope) = overrides.worker_scope.as_ref() {
            self.worker.scope = Some(scope.clone());
        }
        if let Some(name) = overrides.worker_static_partition.as_ref() {
            self.worker.static_partition = Some(name.clone());
        }
        if let Some(name) = overrides.worker_dynamic_partition.as_ref() {
            self.worker.dynamic_partition = Some(name.clone());
        }

        self.apply_upstream_overrides(&overrides.upstream);
    }

    fn apply_upstream_overrides(&mut self, overrides: &UpstreamOverrides) {
        if let Some(url) = overrides.upstream_url.as_ref() {
            self.upstream.url = Some(url.clone());
        }
        if let Some(seconds) = overrides.upstream_timeout_seconds {
            self.upstream.timeout_seconds = Some(seconds);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            upstream,
            worker,
            notification,
        } = raw;

        let server = build_server_settings(server)?;
        let logging = build_logging_settings(logging)?;
        let upstream = build_upstream_settings(upstream)?;
        let notification = build_notification_config(notification)?;
        let worker = build_worker_config(worker, notification, &server)?;

        Ok(Self {
            server,
            logging,
            upstream,
            worker,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());
    let admin_host = server
        .admin_host
        .unwrap_or_else(|| DEFAULT_ADMIN_HOST.to_string());

    let public_port = server.public_port.unwrap_or(DEFAULT_PUBLIC_PORT);
    if public_port == 0 {
        return Err(LoadError::invalid(
            "server.public_port",
            "port must be greater than zero",
        ));
    }

    let admin_port = server.admin_port.unwrap_or(DEFAULT_ADMIN_PORT);
    if admin_port == 0 {
        return Err(LoadError::invalid(
            "server.admin_port",
            "port must be greater than zero",
        ));
    }

    let public_addr = parse_socket_addr(&host, public_port)
        .map_err(|reason| LoadError::invalid("server.public_addr", reason))?;
    let admin_addr = parse_socket_addr(&admin_host, admin_port)
        .map_err(|reason| LoadError::invalid("server.admin_addr", reason))?;
    if public_addr == admin_addr {
        return Err(LoadError::invalid(
            "server.admin_port",
            "admin listener must not share the public address",
        ));
    }

    let graceful_secs = server
        .graceful_shutdown_seconds
        .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS);
    if graceful_secs == 0 {
        return Err(LoadError::invalid(
            "server.graceful_shutdown_seconds",
            "must be greater than zero",
        ));
    }

    let max_body_value = server.max_body_bytes.unwrap_or(DEFAULT_MAX_BODY_BYTES);
    let max_body_bytes = NonZeroU64::new(max_body_value)
        .ok_or_else(|| LoadError::invalid("server.max_body_bytes", "must be greater than zero"))?;
    usize::try_from(max_body_value).map_err(|_| {
        LoadError::invalid(
            "server.max_body_bytes",
            "value exceeds supported range for usize",
        )
    })?;

    let tracked_clients =
        NonZeroUsize::new(server.tracked_clients.unwrap_or(DEFAULT_TRACKED_CLIENTS))
            .ok_or_else(|| {
                LoadError::invalid("server.tracked_clients", "must be greater than zero")
            })?;
    let retained_notifications = NonZeroUsize::new(
        server
            .retained_notifications
            .unwrap_or(DEFAULT_RETAINED_NOTIFICATIONS),
    )
    .ok_or_else(|| {
        LoadError::invalid("server.retained_notifications", "must be greater than zero")
    })?;

    Ok(ServerSettings {
        public_addr,
        admin_addr,
        graceful_shutdown: Duration::from_secs(graceful_secs),
        max_body_bytes,
        tracked_clients,
        retained_notifications,
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_upstream_settings(upstream: RawUpstreamSettings) -> Result<UpstreamSettings, LoadError> {
    let raw_url = upstream
        .url
        .unwrap_or_else(|| DEFAULT_UPSTREAM_URL.to_string());
    let base_url =
        parse_http_url(&raw_url).map_err(|reason| LoadError::invalid("upstream.url", reason))?;

    let timeout_secs = upstream
        .timeout_seconds
        .unwrap_or(DEFAULT_UPSTREAM_TIMEOUT_SECS);
    if timeout_secs == 0 {
        return Err(LoadError::invalid(
            "upstream.timeout_seconds",
            "must be greater than zero",
        ));
    }

    Ok(UpstreamSettings {
        base_url,
        timeout: Duration::from_secs(timeout_secs),
    })
}

fn build_notification_config(
    notification: RawNotificationSettings,
) -> Result<NotificationConfig, LoadError> {
    let defaults = NotificationConfig::default();

    let open_url = notification.open_url.unwrap_or(defaults.open_url);
    if open_url.trim().is_empty() {
        return Err(LoadError::invalid(
            "notification.open_url",
            "must not be empty",
        ));
    }

    Ok(NotificationConfig {
        title: notification.title.unwrap_or(defaults.title),
        default_body: notification.default_body.unwrap_or(defaults.default_body),
        icon: notification.icon.unwrap_or(defaults.icon),
        badge: notification.badge.unwrap_or(defaults.badge),
        vibrate: notification.vibrate.unwrap_or(defaults.vibrate),
        primary_key: notification.primary_key.unwrap_or(defaults.primary_key),
        open_url,
    })
}

fn build_worker_config(
    worker: RawWorkerSettings,
    notification: NotificationConfig,
    server: &ServerSettings,
) -> Result<ControllerConfig, LoadError> {
    let scope = match worker.scope {
        Some(scope) => scope,
        None => format!("http://{}/", server.public_addr),
    };
    let scope =
        parse_http_url(&scope).map_err(|reason| LoadError::invalid("worker.scope", reason))?;

    let static_partition = partition_name(
        worker.static_partition,
        DEFAULT_STATIC_PARTITION,
        "worker.static_partition",
    )?;
    let dynamic_partition = partition_name(
        worker.dynamic_partition,
        DEFAULT_DYNAMIC_PARTITION,
        "worker.dynamic_partition",
    )?;
    if static_partition == dynamic_partition {
        return Err(LoadError::invalid(
            "worker.dynamic_partition",
            "static and dynamic partitions must have different names",
        ));
    }

    let precache = worker
        .precache
        .unwrap_or_else(|| DEFAULT_PRECACHE.iter().map(|path| path.to_string()).collect());
    if let Some(path) = precache.iter().find(|path| !path.starts_with('/')) {
        return Err(LoadError::invalid(
            "worker.precache",
            format!("path `{path}` must start with `/`"),
        ));
    }

    let api_patterns = worker
        .api_patterns
        .unwrap_or_else(|| DEFAULT_API_PATTERNS.iter().map(|p| p.to_string()).collect())
        .iter()
        .map(|pattern| {
            Regex::new(pattern).map_err(|err| {
                LoadError::invalid(
                    "worker.api_patterns",
                    format!("pattern `{pattern}` does not compile: {err}"),
                )
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let sync_tag = worker
        .sync_tag
        .map(|tag| tag.trim().to_string())
        .unwrap_or_else(|| DEFAULT_SYNC_TAG.to_string());
    if sync_tag.is_empty() {
        return Err(LoadError::invalid("worker.sync_tag", "must not be empty"));
    }

    Ok(ControllerConfig {
        scope,
        static_partition,
        dynamic_partition,
        precache,
        api_patterns,
        sync_tag,
        notification,
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    admin_host: Option<String>,
    public_port: Option<u16>,
    admin_port: Option<u16>,
    graceful_shutdown_seconds: Option<u64>,
    max_body_bytes: Option<u64>,
    tracked_clients: Option<usize>,
    retained_notifications: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawUpstreamSettings {
    url: Option<String>,
    timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawWorkerSettings {
    scope: Option<String>,
    static_partition: Option<String>,
    dynamic_partition: Option<String>,
    precache: Option<Vec<String>>,
    api_patterns: Option<Vec<String>>,
    sync_tag: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawNotificationSettings {
    title: Option<String>,
    default_body: Option<String>,
    icon: Option<String>,
    badge: Option<String>,
    vibrate: Option<Vec<u32>>,
    primary_key: Option<u64>,
    open_url: Option<String>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn parse_http_url(value: &str) -> Result<Url, String> {
    let url = Url::parse(value.trim()).map_err(|err| format!("invalid URL `{value}`: {err}"))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(format!("unsupported scheme `{other}`")),
    }
}

fn partition_name(
    value: Option<String>,
    default: &str,
    key: &'static str,
) -> Result<String, LoadError> {
    let name = value
        .map(|name| name.trim().to_string())
        .unwrap_or_else(|| default.to_string());
    if name.is_empty() {
        return Err(LoadError::invalid(key, "must not be empty"));
    }
    Ok(name)
}

#[cfg(test)]
mod tests;
