//! Configuration types and loading
//!
//! Everything the server needs is resolved once at startup into an
//! [`AppConfig`] and passed down explicitly.

use serde::{Deserialize, Serialize};

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// Server configuration
    pub server: ServerConfig,

    /// Blob storage configuration
    pub storage: StorageConfig,

    /// Metadata database; in-memory stores are used when absent
    pub database: Option<DatabaseSettings>,

    /// Thumbnail specs and placeholder
    pub thumbnails: ThumbnailConfig,

    /// Client cache policy for attachment content
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub max_body_size_bytes: usize,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum BlobBackend {
    #[default]
    Memory,
    Local,
}

impl BlobBackend {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Some(Self::Memory),
            "local" | "fs" => Some(Self::Local),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    pub backend: BlobBackend,
    /// Root directory for the local backend
    pub local_path: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseSettings {
    pub url: String,
    pub max_connections: u32,
}

/// One configured thumbnail variant
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct ThumbnailSpecConfig {
    pub name: String,
    /// 0 means "derive from aspect ratio"
    pub width: u32,
    /// 0 means "derive from aspect ratio"
    pub height: u32,
    #[serde(default)]
    pub crop_to_square: bool,
}

impl ThumbnailSpecConfig {
    /// Parse `name:WxH` or `name:WxH:crop`
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let invalid = |message: &str| ConfigError::InvalidValue {
            key: "ATTIC_THUMBNAIL_SPECS".to_string(),
            message: format!("{}: {:?}", message, raw),
        };

        let mut parts = raw.trim().split(':');
        let name = parts.next().unwrap_or_default().trim();
        if name.is_empty() {
            return Err(invalid("missing spec name"));
        }

        let size = parts.next().ok_or_else(|| invalid("missing WxH"))?;
        let (w, h) = size
            .split_once(['x', 'X'])
            .ok_or_else(|| invalid("size must look like WxH"))?;
        let width = w.trim().parse().map_err(|_| invalid("bad width"))?;
        let height = h.trim().parse().map_err(|_| invalid("bad height"))?;

        let crop_to_square = match parts.next() {
            None => false,
            Some("crop") => true,
            Some(_) => return Err(invalid("only `crop` is accepted after the size")),
        };

        Ok(Self {
            name: name.to_string(),
            width,
            height,
            crop_to_square,
        })
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ThumbnailConfig {
    pub specs: Vec<ThumbnailSpecConfig>,
    /// Image served when a thumbnail can't be produced; a generated
    /// neutral image is used when unset
    pub placeholder_path: Option<String>,
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        Self {
            specs: vec![
                ThumbnailSpecConfig {
                    name: "icon".to_string(),
                    width: 100,
                    height: 0,
                    crop_to_square: false,
                },
                ThumbnailSpecConfig {
                    name: "square".to_string(),
                    width: 128,
                    height: 128,
                    crop_to_square: true,
                },
                ThumbnailSpecConfig {
                    name: "preview".to_string(),
                    width: 800,
                    height: 600,
                    crop_to_square: false,
                },
            ],
            placeholder_path: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    pub max_age_days: u32,
}

impl CacheConfig {
    pub fn max_age_seconds(&self) -> u64 {
        u64::from(self.max_age_days) * 24 * 60 * 60
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
                max_body_size_bytes: 100 * 1024 * 1024, // 100MB
            },
            storage: StorageConfig {
                backend: BlobBackend::Memory,
                local_path: "/var/attic/blobs".to_string(),
            },
            database: None,
            thumbnails: ThumbnailConfig::default(),
            cache: CacheConfig { max_age_days: 30 },
        }
    }
}

/// Configuration error
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        // Server
        if let Some(host) = lookup("HOST") {
            config.server.host = host;
        }
        if let Some(port) = lookup("PORT") {
            config.server.port = parse_value("PORT", &port)?;
        }
        if let Some(size) = lookup("MAX_BODY_SIZE_BYTES") {
            config.server.max_body_size_bytes = parse_value("MAX_BODY_SIZE_BYTES", &size)?;
        }

        // Blob storage
        if let Some(backend) = lookup("ATTIC_BLOB_BACKEND") {
            config.storage.backend =
                BlobBackend::parse(&backend).ok_or_else(|| ConfigError::InvalidValue {
                    key: "ATTIC_BLOB_BACKEND".to_string(),
                    message: format!("unknown backend {:?}", backend),
                })?;
        }
        if let Some(path) = lookup("ATTIC_STORAGE_PATH") {
            config.storage.local_path = path;
        }

        // Metadata database
        if let Some(url) = lookup("DATABASE_URL") {
            let max_connections = match lookup("DB_MAX_CONNECTIONS") {
                Some(v) => parse_value("DB_MAX_CONNECTIONS", &v)?,
                None => 10,
            };
            config.database = Some(DatabaseSettings {
                url,
                max_connections,
            });
        }

        // Thumbnails
        if let Some(specs) = lookup("ATTIC_THUMBNAIL_SPECS") {
            config.thumbnails.specs = specs
                .split(',')
                .filter(|s| !s.trim().is_empty())
                .map(ThumbnailSpecConfig::parse)
                .collect::<Result<_, _>>()?;
        }
        if let Some(path) = lookup("ATTIC_PLACEHOLDER_PATH") {
            config.thumbnails.placeholder_path = Some(path);
        }

        // Cache policy
        if let Some(days) = lookup("ATTIC_CACHE_MAX_AGE_DAYS") {
            config.cache.max_age_days = parse_value("ATTIC_CACHE_MAX_AGE_DAYS", &days)?;
        }

        Ok(config)
    }

    /// Get the server address
    pub fn server_addr(&self) -> std::net::SocketAddr {
        use std::net::SocketAddr;
        let ip: std::net::IpAddr = self.server.host.parse().unwrap_or([0, 0, 0, 0].into());
        SocketAddr::new(ip, self.server.port)
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("can't parse {:?}", value),
    })
}
