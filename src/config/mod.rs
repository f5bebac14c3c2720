//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{net::SocketAddr, path::PathBuf, str::FromStr, time::Duration};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

use crate::application::batch::BatchSettings;
use crate::application::discovery::Capabilities;
use crate::application::types::RDF_TYPE;
use crate::cache::CacheConfig;
use crate::domain::types::PreferredLanguages;

mod cli;

pub use cli::{
    CliArgs, Command, CommonOverrides, ResolveArgs, ResolveKind, ServeArgs, ServeOverrides,
};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "glossa";
const ENV_PREFIX: &str = "GLOSSA";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_REPOSITORY: &str = "default";
const DEFAULT_LANGUAGE: &str = "en";
const DEFAULT_PEER_TIMEOUT_SECS: u64 = 10;

const DEFAULT_LABEL_PROPERTIES: &[&str] = &[
    "http://www.w3.org/2004/02/skos/core#prefLabel",
    "http://www.w3.org/2000/01/rdf-schema#label",
    "http://purl.org/dc/terms/title",
];
const DEFAULT_DESCRIPTION_PROPERTIES: &[&str] = &[
    "http://www.w3.org/2004/02/skos/core#definition",
    "http://www.w3.org/2000/01/rdf-schema#comment",
    "http://purl.org/dc/terms/description",
];

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub resolver: ResolverSettings,
    pub cache: CacheConfig,
    pub remote: RemoteSettings,
    pub data: DataSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
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
pub struct ResolverSettings {
    pub label_properties: Vec<String>,
    pub description_properties: Vec<String>,
    pub type_properties: Vec<String>,
    pub languages: PreferredLanguages,
    pub batch: BatchSettings,
}

#[derive(Debug, Clone, Default)]
pub struct RemoteSettings {
    pub peers: Vec<PeerSettings>,
}

#[derive(Debug, Clone)]
pub struct PeerSettings {
    pub name: String,
    pub base_url: Url,
    pub timeout: Duration,
    pub capabilities: Capabilities,
}

#[derive(Debug, Clone)]
pub struct DataSettings {
    pub dataset: Option<PathBuf>,
    pub default_repository: String,
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
        Some(Command::Resolve(args)) => raw.apply_common_overrides(&args.common),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    resolver: RawResolverSettings,
    cache: RawCacheSettings,
    remote: RawRemoteSettings,
    data: RawDataSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(enabled) = overrides.cache_enabled {
            self.cache.enabled = Some(enabled);
        }

        self.apply_common_overrides(&overrides.common);
    }

    fn apply_common_overrides(&mut self, overrides: &CommonOverrides) {
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(dataset) = overrides.dataset.as_ref() {
            self.data.dataset = Some(dataset.clone());
        }
        if let Some(languages) = overrides.languages.as_ref() {
            self.resolver.languages = Some(languages.clone());
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                addr: SocketAddr::from(([127, 0, 0, 1], DEFAULT_PORT)),
            },
            logging: LoggingSettings {
                level: LevelFilter::INFO,
                format: LogFormat::Compact,
            },
            resolver: ResolverSettings {
                label_properties: properties_or(None, DEFAULT_LABEL_PROPERTIES),
                description_properties: properties_or(None, DEFAULT_DESCRIPTION_PROPERTIES),
                type_properties: properties_or(None, &[RDF_TYPE]),
                languages: PreferredLanguages::single(DEFAULT_LANGUAGE),
                batch: BatchSettings::default(),
            },
            cache: CacheConfig::default(),
            remote: RemoteSettings::default(),
            data: DataSettings {
                dataset: None,
                default_repository: DEFAULT_REPOSITORY.to_string(),
            },
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            resolver,
            cache,
            remote,
            data,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            resolver: build_resolver_settings(resolver)?,
            cache: build_cache_settings(cache)?,
            remote: build_remote_settings(remote)?,
            data: build_data_settings(data)?,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());
    let port = server.port.unwrap_or(DEFAULT_PORT);
    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.addr", reason))?;

    Ok(ServerSettings { addr })
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

fn build_resolver_settings(resolver: RawResolverSettings) -> Result<ResolverSettings, LoadError> {
    let languages = resolver
        .languages
        .unwrap_or_else(|| vec![DEFAULT_LANGUAGE.to_string()]);
    let languages = PreferredLanguages::new(languages.iter().map(String::as_str))
        .map_err(|err| LoadError::invalid("resolver.languages", err.to_string()))?;

    let defaults = BatchSettings::default();
    let batch_size = non_zero(
        resolver.batch_size.unwrap_or(defaults.batch_size as u64),
        "resolver.batch_size",
    )?;
    let workers = non_zero(
        resolver.batch_workers.unwrap_or(defaults.workers as u64),
        "resolver.batch_workers",
    )?;
    let timeout_secs = resolver
        .batch_timeout_seconds
        .unwrap_or(defaults.timeout.as_secs());
    if timeout_secs == 0 {
        return Err(LoadError::invalid(
            "resolver.batch_timeout_seconds",
            "must be greater than zero",
        ));
    }

    Ok(ResolverSettings {
        label_properties: properties_or(resolver.label_properties, DEFAULT_LABEL_PROPERTIES),
        description_properties: properties_or(
            resolver.description_properties,
            DEFAULT_DESCRIPTION_PROPERTIES,
        ),
        type_properties: properties_or(resolver.type_properties, &[RDF_TYPE]),
        languages,
        batch: BatchSettings {
            batch_size,
            workers,
            timeout: Duration::from_secs(timeout_secs),
        },
    })
}

/// Candidate lists are kept as given; they are validated when a query is built.
fn properties_or(configured: Option<Vec<String>>, defaults: &[&str]) -> Vec<String> {
    configured.unwrap_or_else(|| defaults.iter().map(|p| p.to_string()).collect())
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheConfig, LoadError> {
    let defaults = CacheConfig::default();

    Ok(CacheConfig {
        enabled: cache.enabled.unwrap_or(defaults.enabled),
        per_store_limit: non_zero(
            cache.per_store_limit.unwrap_or(defaults.per_store_limit as u64),
            "cache.per_store_limit",
        )?,
        ttl_seconds: cache.ttl_seconds.unwrap_or(defaults.ttl_seconds),
        event_queue_limit: non_zero(
            cache
                .event_queue_limit
                .unwrap_or(defaults.event_queue_limit as u64),
            "cache.event_queue_limit",
        )?,
        auto_consume_interval_ms: non_zero(
            cache
                .auto_consume_interval_ms
                .unwrap_or(defaults.auto_consume_interval_ms),
            "cache.auto_consume_interval_ms",
        )? as u64,
        consume_batch_limit: non_zero(
            cache
                .consume_batch_limit
                .unwrap_or(defaults.consume_batch_limit as u64),
            "cache.consume_batch_limit",
        )?,
    })
}

fn build_remote_settings(remote: RawRemoteSettings) -> Result<RemoteSettings, LoadError> {
    let mut peers = Vec::with_capacity(remote.peers.len());
    for peer in remote.peers {
        let name = peer.name.trim().to_string();
        if name.is_empty() {
            return Err(LoadError::invalid("remote.peers.name", "must not be empty"));
        }
        if peers.iter().any(|existing: &PeerSettings| existing.name == name) {
            return Err(LoadError::invalid(
                "remote.peers.name",
                format!("duplicate peer `{name}`"),
            ));
        }

        let base_url = Url::parse(peer.url.trim()).map_err(|err| {
            LoadError::invalid("remote.peers.url", format!("peer `{name}`: {err}"))
        })?;

        let timeout_secs = peer.timeout_seconds.unwrap_or(DEFAULT_PEER_TIMEOUT_SECS);
        if timeout_secs == 0 {
            return Err(LoadError::invalid(
                "remote.peers.timeout_seconds",
                "must be greater than zero",
            ));
        }

        let capabilities = match peer.capabilities {
            None => Capabilities {
                labels: true,
                descriptions: true,
                types: false,
            },
            Some(values) => parse_peer_capabilities(&name, &values)?,
        };

        peers.push(PeerSettings {
            name,
            base_url,
            timeout: Duration::from_secs(timeout_secs),
            capabilities,
        });
    }

    Ok(RemoteSettings { peers })
}

fn parse_peer_capabilities(name: &str, values: &[String]) -> Result<Capabilities, LoadError> {
    let mut capabilities = Capabilities::default();
    for value in values {
        match value.trim().to_ascii_lowercase().as_str() {
            "label" | "labels" => capabilities.labels = true,
            "description" | "descriptions" => capabilities.descriptions = true,
            other => {
                return Err(LoadError::invalid(
                    "remote.peers.capabilities",
                    format!("peer `{name}`: unsupported capability `{other}`"),
                ));
            }
        }
    }
    Ok(capabilities)
}

fn build_data_settings(data: RawDataSettings) -> Result<DataSettings, LoadError> {
    let default_repository = data
        .default_repository
        .map(|value| value.trim().to_string())
        .unwrap_or_else(|| DEFAULT_REPOSITORY.to_string());
    if default_repository.is_empty() {
        return Err(LoadError::invalid(
            "data.default_repository",
            "must not be empty",
        ));
    }

    let dataset = data.dataset.filter(|path| !path.as_os_str().is_empty());

    Ok(DataSettings {
        dataset,
        default_repository,
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawResolverSettings {
    label_properties: Option<Vec<String>>,
    description_properties: Option<Vec<String>>,
    type_properties: Option<Vec<String>>,
    languages: Option<Vec<String>>,
    batch_size: Option<u64>,
    batch_workers: Option<u64>,
    batch_timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    enabled: Option<bool>,
    per_store_limit: Option<u64>,
    ttl_seconds: Option<u64>,
    event_queue_limit: Option<u64>,
    auto_consume_interval_ms: Option<u64>,
    consume_batch_limit: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRemoteSettings {
    peers: Vec<RawPeerSettings>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawPeerSettings {
    name: String,
    url: String,
    timeout_seconds: Option<u64>,
    capabilities: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDataSettings {
    dataset: Option<PathBuf>,
    default_repository: Option<String>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn non_zero(value: u64, key: &'static str) -> Result<usize, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    usize::try_from(value)
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for usize"))
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[cfg(test)]
mod tests;
