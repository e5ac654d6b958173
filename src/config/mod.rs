//! Configuration layer: typed settings with layered precedence (file → env → CLI).

mod cli;

use std::{net::SocketAddr, path::PathBuf, str::FromStr, time::Duration};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

use crate::cache::CacheBackend;
use crate::drive::CloudInstance;

pub use cli::{CacheOverrides, ClearCacheArgs, CliArgs, Command, ServeArgs, ServeOverrides};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "scriptorium";
const ENV_PREFIX: &str = "SCRIPTORIUM";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_CACHE_NAMESPACE: &str = "EFCache:";
const DEFAULT_CACHE_TTL_SECS: u64 = 300;
const DEFAULT_CACHE_DEPENDENCY_TTL_SECS: u64 = 3600;
const MAX_CACHE_TTL_SECS: u64 = 365 * 24 * 3600;
const DEFAULT_DRIVE_TOKEN_CACHE_PATH: &str = "drive_token.json";
const DEFAULT_DRIVE_REFRESH_INTERVAL_SECS: u64 = 3600;
const DEFAULT_DRIVE_REQUEST_TIMEOUT_SECS: u64 = 10;
const DEFAULT_DRIVE_SCOPES: [&str; 2] = ["Files.ReadWrite.All", "offline_access"];

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub cache: CacheSettings,
    pub drive: DriveSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub graceful_shutdown: Duration,
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
pub struct CacheSettings {
    pub enabled: bool,
    pub backend: CacheBackend,
    pub redis_url: Option<String>,
    pub namespace: String,
    pub default_ttl: Duration,
    pub dependency_ttl: Duration,
}

/// Drive (OneDrive / Graph) integration settings, passed explicitly to the token service.
#[derive(Debug, Clone)]
pub struct DriveSettings {
    pub enabled: bool,
    pub client_id: String,
    pub client_secret: String,
    pub base_uri: Option<Url>,
    pub cloud: CloudInstance,
    pub scopes: Vec<String>,
    pub account_name: Option<String>,
    pub proxy: Option<Url>,
    pub token_cache_path: PathBuf,
    pub refresh_interval: Duration,
    pub request_timeout: Duration,
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

    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("drive.scopes")
            .try_parsing(true),
    );

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::ClearCache(args)) => raw.apply_cache_overrides(&args.cache),
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
    cache: RawCacheSettings,
    drive: RawDriveSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(seconds) = overrides.server_graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(enabled) = overrides.cache_enabled {
            self.cache.enabled = Some(enabled);
        }
        if let Some(seconds) = overrides.cache_default_ttl_seconds {
            self.cache.default_ttl_seconds = Some(seconds);
        }
        if let Some(seconds) = overrides.cache_dependency_ttl_seconds {
            self.cache.dependency_ttl_seconds = Some(seconds);
        }
        if let Some(enabled) = overrides.drive_enabled {
            self.drive.enabled = Some(enabled);
        }
        if let Some(seconds) = overrides.drive_refresh_interval_seconds {
            self.drive.refresh_interval_seconds = Some(seconds);
        }

        self.apply_cache_overrides(&overrides.cache);
    }

    fn apply_cache_overrides(&mut self, overrides: &CacheOverrides) {
        if let Some(backend) = overrides.cache_backend {
            self.cache.backend = Some(backend);
        }
        if let Some(url) = overrides.cache_redis_url.as_ref() {
            self.cache.redis_url = Some(url.clone());
        }
        if let Some(namespace) = overrides.cache_namespace.as_ref() {
            self.cache.namespace = Some(namespace.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            cache,
            drive,
        } = raw;

        let server = build_server_settings(server)?;
        let logging = build_logging_settings(logging)?;
        let cache = build_cache_settings(cache)?;
        let drive = build_drive_settings(drive)?;

        Ok(Self {
            server,
            logging,
            cache,
            drive,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());

    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }

    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.addr", reason))?;

    let graceful_secs = server
        .graceful_shutdown_seconds
        .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS);
    let graceful_shutdown = positive_secs(graceful_secs, "server.graceful_shutdown_seconds")?;

    Ok(ServerSettings {
        addr,
        graceful_shutdown,
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

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let backend = cache.backend.unwrap_or(CacheBackend::Memory);
    let redis_url = non_blank(cache.redis_url);

    if let Some(url) = redis_url.as_deref() {
        Url::parse(url)
            .map_err(|err| LoadError::invalid("cache.redis_url", format!("invalid url: {err}")))?;
    }
    if backend == CacheBackend::Redis && redis_url.is_none() {
        return Err(LoadError::invalid(
            "cache.redis_url",
            "required when cache.backend is `redis`",
        ));
    }

    let namespace = cache
        .namespace
        .unwrap_or_else(|| DEFAULT_CACHE_NAMESPACE.to_string());
    if namespace.trim().is_empty() {
        return Err(LoadError::invalid(
            "cache.namespace",
            "namespace must not be empty",
        ));
    }
    if namespace.contains(['*', '?', '[']) {
        return Err(LoadError::invalid(
            "cache.namespace",
            "namespace must not contain glob characters",
        ));
    }

    let default_ttl = cache_ttl(
        cache.default_ttl_seconds.unwrap_or(DEFAULT_CACHE_TTL_SECS),
        "cache.default_ttl_seconds",
    )?;
    let dependency_ttl = cache_ttl(
        cache
            .dependency_ttl_seconds
            .unwrap_or(DEFAULT_CACHE_DEPENDENCY_TTL_SECS),
        "cache.dependency_ttl_seconds",
    )?;

    Ok(CacheSettings {
        enabled: cache.enabled.unwrap_or(true),
        backend,
        redis_url,
        namespace,
        default_ttl,
        dependency_ttl,
    })
}

fn build_drive_settings(drive: RawDriveSettings) -> Result<DriveSettings, LoadError> {
    let enabled = drive.enabled.unwrap_or(false);

    let client_id = non_blank(drive.client_id).unwrap_or_default();
    let client_secret = non_blank(drive.client_secret).unwrap_or_default();
    let base_uri = non_blank(drive.base_uri)
        .map(|value| {
            Url::parse(value.trim_end_matches('/')).map_err(|err| {
                LoadError::invalid("drive.base_uri", format!("invalid url: {err}"))
            })
        })
        .transpose()?;
    let proxy = non_blank(drive.proxy)
        .map(|value| {
            Url::parse(&value)
                .map_err(|err| LoadError::invalid("drive.proxy", format!("invalid url: {err}")))
        })
        .transpose()?;

    if enabled {
        if client_id.is_empty() {
            return Err(LoadError::invalid(
                "drive.client_id",
                "required when the drive integration is enabled",
            ));
        }
        if client_secret.is_empty() {
            return Err(LoadError::invalid(
                "drive.client_secret",
                "required when the drive integration is enabled",
            ));
        }
        if base_uri.is_none() {
            return Err(LoadError::invalid(
                "drive.base_uri",
                "required when the drive integration is enabled",
            ));
        }
    }

    let scopes: Vec<String> = drive
        .scopes
        .unwrap_or_else(|| DEFAULT_DRIVE_SCOPES.iter().map(|s| s.to_string()).collect())
        .into_iter()
        .map(|scope| scope.trim().to_string())
        .filter(|scope| !scope.is_empty())
        .collect();
    if enabled && scopes.is_empty() {
        return Err(LoadError::invalid(
            "drive.scopes",
            "at least one scope is required",
        ));
    }

    let token_cache_path = drive
        .token_cache_path
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DRIVE_TOKEN_CACHE_PATH));
    if token_cache_path.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "drive.token_cache_path",
            "path must not be empty",
        ));
    }

    let refresh_interval = positive_secs(
        drive
            .refresh_interval_seconds
            .unwrap_or(DEFAULT_DRIVE_REFRESH_INTERVAL_SECS),
        "drive.refresh_interval_seconds",
    )?;
    let request_timeout = positive_secs(
        drive
            .request_timeout_seconds
            .unwrap_or(DEFAULT_DRIVE_REQUEST_TIMEOUT_SECS),
        "drive.request_timeout_seconds",
    )?;

    Ok(DriveSettings {
        enabled,
        client_id,
        client_secret,
        base_uri,
        cloud: drive.cloud.unwrap_or(CloudInstance::Global),
        scopes,
        account_name: non_blank(drive.account_name),
        proxy,
        token_cache_path,
        refresh_interval,
        request_timeout,
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    graceful_shutdown_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    enabled: Option<bool>,
    backend: Option<CacheBackend>,
    redis_url: Option<String>,
    namespace: Option<String>,
    default_ttl_seconds: Option<u64>,
    dependency_ttl_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDriveSettings {
    enabled: Option<bool>,
    client_id: Option<String>,
    client_secret: Option<String>,
    base_uri: Option<String>,
    cloud: Option<CloudInstance>,
    scopes: Option<Vec<String>>,
    account_name: Option<String>,
    proxy: Option<String>,
    token_cache_path: Option<PathBuf>,
    refresh_interval_seconds: Option<u64>,
    request_timeout_seconds: Option<u64>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn positive_secs(value: u64, key: &'static str) -> Result<Duration, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    Ok(Duration::from_secs(value))
}

fn cache_ttl(value: u64, key: &'static str) -> Result<Duration, LoadError> {
    if value > MAX_CACHE_TTL_SECS {
        return Err(LoadError::invalid(
            key,
            format!("must not exceed {MAX_CACHE_TTL_SECS} seconds"),
        ));
    }
    positive_secs(value, key)
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}
