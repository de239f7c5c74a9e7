//! Configuration layer: typed settings with layered precedence (file → env → CLI).

mod cli;

use std::{
    collections::HashSet,
    net::SocketAddr,
    num::{NonZeroU32, NonZeroU64},
    str::FromStr,
    time::Duration,
};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::application::api_keys::MIN_TOKEN_LEN;
use crate::application::pagination::{DEFAULT_LIMIT, DEFAULT_MAX_LIMIT};
use crate::application::resources::UnknownAuthorPolicy;
use crate::domain::api_keys::Role;

pub use cli::{CliArgs, Command, ServeArgs, ServeOverrides};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "bookshelf";
const ENV_PREFIX: &str = "BOOKSHELF";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 8;
const DEFAULT_CACHE_PRODUCER_TIMEOUT_MS: u64 = 5000;

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub cache: CacheSettings,
    pub pagination: PaginationSettings,
    pub books: BooksSettings,
    pub auth: AuthSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub graceful_shutdown: Duration,
    /// Scheme and authority prepended to `Location` headers, without a trailing slash.
    pub public_base_url: String,
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
pub struct DatabaseSettings {
    /// Postgres URL. `None` selects the in-memory store.
    pub url: Option<String>,
    pub max_connections: NonZeroU32,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub enabled: bool,
    pub producer_timeout_ms: NonZeroU64,
}

#[derive(Debug, Clone)]
pub struct PaginationSettings {
    pub default_limit: NonZeroU32,
    pub max_limit: NonZeroU32,
}

#[derive(Debug, Clone, Default)]
pub struct BooksSettings {
    pub unknown_author: UnknownAuthorPolicy,
}

#[derive(Debug, Clone, Default)]
pub struct AuthSettings {
    /// Let callers without a key use read endpoints.
    pub public_reads: bool,
    pub keys: Vec<ApiKeySettings>,
}

#[derive(Debug, Clone)]
pub struct ApiKeySettings {
    pub name: String,
    pub token: String,
    pub role: Role,
}

impl Default for Settings {
    fn default() -> Self {
        let addr = SocketAddr::from(([127, 0, 0, 1], DEFAULT_PORT));
        Self {
            server: ServerSettings {
                addr,
                graceful_shutdown: Duration::from_secs(DEFAULT_GRACEFUL_SHUTDOWN_SECS),
                public_base_url: format!("http://{addr}"),
            },
            logging: LoggingSettings {
                level: LevelFilter::INFO,
                format: LogFormat::Compact,
            },
            database: DatabaseSettings {
                url: None,
                max_connections: NonZeroU32::new(DEFAULT_DB_MAX_CONNECTIONS)
                    .unwrap_or(NonZeroU32::MIN),
            },
            cache: CacheSettings {
                enabled: true,
                producer_timeout_ms: NonZeroU64::new(DEFAULT_CACHE_PRODUCER_TIMEOUT_MS)
                    .unwrap_or(NonZeroU64::MIN),
            },
            pagination: PaginationSettings {
                default_limit: DEFAULT_LIMIT,
                max_limit: DEFAULT_MAX_LIMIT,
            },
            books: BooksSettings::default(),
            auth: AuthSettings::default(),
        }
    }
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
    database: RawDatabaseSettings,
    cache: RawCacheSettings,
    pagination: RawPaginationSettings,
    books: RawBooksSettings,
    auth: RawAuthSettings,
}

impl RawSettings {
    /// CLI values win over every file and environment layer.
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        fn take<T: Clone>(slot: &mut Option<T>, value: &Option<T>) {
            if value.is_some() {
                slot.clone_from(value);
            }
        }

        take(&mut self.server.host, &overrides.server_host);
        take(&mut self.server.port, &overrides.server_port);
        take(
            &mut self.server.graceful_shutdown_seconds,
            &overrides.server_graceful_shutdown_seconds,
        );
        take(&mut self.server.public_base_url, &overrides.public_base_url);
        take(&mut self.logging.level, &overrides.log_level);
        take(&mut self.logging.json, &overrides.log_json);
        take(&mut self.database.url, &overrides.database_url);
        take(
            &mut self.database.max_connections,
            &overrides.database_max_connections,
        );
        take(&mut self.cache.enabled, &overrides.cache_enabled);
        take(
            &mut self.cache.producer_timeout_ms,
            &overrides.cache_producer_timeout_ms,
        );
        take(&mut self.auth.public_reads, &overrides.auth_public_reads);
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            database,
            cache,
            pagination,
            books,
            auth,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            database: build_database_settings(database)?,
            cache: build_cache_settings(cache)?,
            pagination: build_pagination_settings(pagination)?,
            books: build_books_settings(books)?,
            auth: build_auth_settings(auth)?,
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
    if graceful_secs == 0 {
        return Err(LoadError::invalid(
            "server.graceful_shutdown_seconds",
            "must be greater than zero",
        ));
    }

    let public_base_url = match server.public_base_url {
        Some(url) => {
            let trimmed = url.trim().trim_end_matches('/');
            if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
                return Err(LoadError::invalid(
                    "server.public_base_url",
                    format!("`{url}` must start with http:// or https://"),
                ));
            }
            trimmed.to_string()
        }
        None => format!("http://{addr}"),
    };

    Ok(ServerSettings {
        addr,
        graceful_shutdown: Duration::from_secs(graceful_secs),
        public_base_url,
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

fn build_database_settings(database: RawDatabaseSettings) -> Result<DatabaseSettings, LoadError> {
    let url = database.url.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    });

    let max_connections = non_zero_u32(
        database
            .max_connections
            .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS)
            .into(),
        "database.max_connections",
    )?;

    Ok(DatabaseSettings {
        url,
        max_connections,
    })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let timeout = cache
        .producer_timeout_ms
        .unwrap_or(DEFAULT_CACHE_PRODUCER_TIMEOUT_MS);
    let producer_timeout_ms = NonZeroU64::new(timeout).ok_or_else(|| {
        LoadError::invalid("cache.producer_timeout_ms", "must be greater than zero")
    })?;

    Ok(CacheSettings {
        enabled: cache.enabled.unwrap_or(true),
        producer_timeout_ms,
    })
}

fn build_pagination_settings(
    pagination: RawPaginationSettings,
) -> Result<PaginationSettings, LoadError> {
    let default_limit = match pagination.default_limit {
        Some(value) => non_zero_u32(value, "pagination.default_limit")?,
        None => DEFAULT_LIMIT,
    };
    let max_limit = match pagination.max_limit {
        Some(value) => non_zero_u32(value, "pagination.max_limit")?,
        None => DEFAULT_MAX_LIMIT,
    };

    if default_limit > max_limit {
        return Err(LoadError::invalid(
            "pagination.default_limit",
            format!("{default_limit} exceeds pagination.max_limit ({max_limit})"),
        ));
    }

    Ok(PaginationSettings {
        default_limit,
        max_limit,
    })
}

fn build_books_settings(books: RawBooksSettings) -> Result<BooksSettings, LoadError> {
    let unknown_author = match books.unknown_author.as_deref().map(str::trim) {
        None => UnknownAuthorPolicy::default(),
        Some("detach") => UnknownAuthorPolicy::Detach,
        Some("reject") => UnknownAuthorPolicy::Reject,
        Some(other) => {
            return Err(LoadError::invalid(
                "books.unknown_author",
                format!("expected `detach` or `reject`, got `{other}`"),
            ));
        }
    };

    Ok(BooksSettings { unknown_author })
}

fn build_auth_settings(auth: RawAuthSettings) -> Result<AuthSettings, LoadError> {
    let mut names = HashSet::new();
    let mut keys = Vec::with_capacity(auth.keys.len());

    for raw in auth.keys {
        let name = raw
            .name
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .ok_or_else(|| LoadError::invalid("auth.keys.name", "every key needs a name"))?;

        if !names.insert(name.clone()) {
            return Err(LoadError::invalid(
                "auth.keys.name",
                format!("duplicate key name `{name}`"),
            ));
        }

        let token = raw.token.unwrap_or_default();
        if token.len() < MIN_TOKEN_LEN {
            return Err(LoadError::invalid(
                "auth.keys.token",
                format!("token for `{name}` must be at least {MIN_TOKEN_LEN} characters"),
            ));
        }

        let role = match raw.role.as_deref() {
            None => Role::User,
            Some(value) => Role::from_str(value.trim()).map_err(|_| {
                LoadError::invalid(
                    "auth.keys.role",
                    format!("unknown role `{value}` for `{name}`"),
                )
            })?,
        };

        keys.push(ApiKeySettings { name, token, role });
    }

    Ok(AuthSettings {
        public_reads: auth.public_reads.unwrap_or(false),
        keys,
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    graceful_shutdown_seconds: Option<u64>,
    public_base_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDatabaseSettings {
    url: Option<String>,
    max_connections: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    enabled: Option<bool>,
    producer_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawPaginationSettings {
    default_limit: Option<u64>,
    max_limit: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawBooksSettings {
    unknown_author: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawAuthSettings {
    public_reads: Option<bool>,
    keys: Vec<RawApiKeySettings>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawApiKeySettings {
    name: Option<String>,
    token: Option<String>,
    role: Option<String>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}
