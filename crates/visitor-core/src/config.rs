use crate::error::VisitorError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level application configuration, loaded from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub user: UserConfig,
    pub data: DataConfig,
    pub filters: FilterConfig,
    pub export: ExportConfig,
    pub feed: FeedConfig,
    pub server: ServerConfig,
}

impl AppConfig {
    /// Load configuration from default path (~/.config/visitor-intel/config.toml),
    /// falling back to defaults if the file doesn't exist.
    pub fn load() -> anyhow::Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the engine cannot work with.
    pub fn validate(&self) -> Result<(), VisitorError> {
        if self.user.id.trim().is_empty() {
            return Err(VisitorError::Config("user.id must not be empty".into()));
        }
        if matches!(self.export.delimiter, '"' | '\n' | '\r') {
            return Err(VisitorError::Config(format!(
                "export.delimiter {:?} collides with quoting or row breaks",
                self.export.delimiter
            )));
        }
        if self.feed.capacity == 0 {
            return Err(VisitorError::Config("feed.capacity must be positive".into()));
        }
        Ok(())
    }

    /// Write current configuration to the default path.
    pub fn save(&self) -> anyhow::Result<()> {
        self.save_to(&Self::default_path())
    }

    /// Write current configuration to a specific path.
    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Default config file path.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("visitor-intel")
            .join("config.toml")
    }

    /// Data directory for event and label files.
    pub fn data_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("visitor-intel")
    }

    /// Resolved data directory: the configured one, else [`AppConfig::data_dir`].
    pub fn resolved_data_dir(&self) -> PathBuf {
        self.data.dir.clone().unwrap_or_else(Self::data_dir)
    }
}

/// The identity every query is scoped to.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UserConfig {
    /// Opaque current-user id.
    pub id: String,
}

impl Default for UserConfig {
    fn default() -> Self {
        Self {
            id: "local".into(),
        }
    }
}

/// Where the local event store reads from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Directory holding the JSON files (None = platform data dir).
    pub dir: Option<PathBuf>,
    /// Events file name, relative to `dir`.
    pub events_file: String,
    /// Labels file name, relative to `dir`.
    pub labels_file: String,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            dir: None,
            events_file: "events.json".into(),
            labels_file: "labels.json".into(),
        }
    }
}

/// Which weekday a calendar week starts on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeekStart {
    #[default]
    Sunday,
    Monday,
}

/// Filter defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub week_start: WeekStart,
    /// Range applied when a request names none (e.g. "all", "thisWeek").
    pub default_range: String,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            week_start: WeekStart::Sunday,
            default_range: "all".into(),
        }
    }
}

/// Delimited-text export settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub delimiter: char,
    /// Suggested file name handed to the save-as collaborator.
    pub file_name: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            delimiter: ',',
            file_name: "leads_export.csv".into(),
        }
    }
}

/// Realtime feed settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// Broadcast channel capacity; slower subscribers lag past this.
    pub capacity: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self { capacity: 1024 }
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address.
    pub host: String,
    /// Port.
    pub port: u16,
    /// Bearer token for authentication (None = no auth).
    pub auth_token: Option<String>,
    /// Enable CORS.
    pub cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8080,
            auth_token: None,
            cors: true,
        }
    }
}
