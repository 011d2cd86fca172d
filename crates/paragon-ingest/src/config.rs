//! # Ingest Configuration
//!
//! Where the database lives, which folders receipts flow through, and how
//! the upload server binds.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     PARAGON_DATABASE_PATH=/srv/paragon/paragon.db                      │
//! │     PARAGON_INBOX=/srv/paragon/to_check                                │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/paragon/paragon.toml (Linux)                             │
//! │     ~/Library/Application Support/com.paragon.paragon/paragon.toml     │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     data/paragon.db, data/to_check → data/parsed | data/rejected       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # paragon.toml
//! [database]
//! path = "data/paragon.db"
//! max_connections = 5
//!
//! [folders]
//! inbox = "data/to_check"
//! processed = "data/parsed"
//! rejected = "data/rejected"
//!
//! [server]
//! bind_addr = "127.0.0.1"
//! port = 8080
//! max_upload_files = 500
//!
//! [ingest]
//! interactive = false
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info, warn};

use crate::error::{IngestError, IngestResult};

// =============================================================================
// Database Settings
// =============================================================================

/// SQLite location and pool size.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    #[serde(default = "default_database_path")]
    pub path: PathBuf,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_database_path() -> PathBuf {
    PathBuf::from("data/paragon.db")
}

fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: default_database_path(),
            max_connections: default_max_connections(),
        }
    }
}

// =============================================================================
// Folder Settings
// =============================================================================

/// The three directories a receipt file passes through.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FolderSettings {
    /// New exports are dropped here.
    #[serde(default = "default_inbox")]
    pub inbox: PathBuf,

    /// Stored and skipped files end up here.
    #[serde(default = "default_processed")]
    pub processed: PathBuf,

    /// Files that failed to parse or persist.
    #[serde(default = "default_rejected")]
    pub rejected: PathBuf,
}

fn default_inbox() -> PathBuf {
    PathBuf::from("data/to_check")
}

fn default_processed() -> PathBuf {
    PathBuf::from("data/parsed")
}

fn default_rejected() -> PathBuf {
    PathBuf::from("data/rejected")
}

impl Default for FolderSettings {
    fn default() -> Self {
        FolderSettings {
            inbox: default_inbox(),
            processed: default_processed(),
            rejected: default_rejected(),
        }
    }
}

// =============================================================================
// Server Settings
// =============================================================================

/// HTTP upload server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Files accepted by one `POST /upload`.
    #[serde(default = "default_max_upload_files")]
    pub max_upload_files: usize,
}

fn default_bind_addr() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_max_upload_files() -> usize {
    500
}

impl Default for ServerSettings {
    fn default() -> Self {
        ServerSettings {
            bind_addr: default_bind_addr(),
            port: default_port(),
            max_upload_files: default_max_upload_files(),
        }
    }
}

impl ServerSettings {
    /// Returns the full bind address (e.g., "127.0.0.1:8080").
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }
}

// =============================================================================
// Ingest Settings
// =============================================================================

/// Batch behaviour.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestSettings {
    /// Ask the operator who owns unknown payment labels.
    #[serde(default)]
    pub interactive: bool,
}

// =============================================================================
// Main Configuration
// =============================================================================

/// Complete Paragon configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestConfig {
    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub folders: FolderSettings,

    #[serde(default)]
    pub server: ServerSettings,

    #[serde(default)]
    pub ingest: IngestSettings,
}

impl IngestConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (paragon.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> IngestResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading config from file");
                let contents = std::fs::read_to_string(&path)
                    .map_err(|e| IngestError::ConfigLoadFailed(e.to_string()))?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> IngestResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| IngestError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| IngestError::ConfigSaveFailed(e.to_string()))?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)
            .map_err(|e| IngestError::ConfigSaveFailed(e.to_string()))?;

        info!(?path, "Config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> IngestResult<()> {
        if self.database.path.as_os_str().is_empty() {
            return Err(IngestError::InvalidConfig("database.path is empty".into()));
        }

        if self.database.max_connections == 0 {
            return Err(IngestError::InvalidConfig(
                "database.max_connections must be greater than 0".into(),
            ));
        }

        // Routing into the inbox would re-ingest the file on the next run.
        let folders = &self.folders;
        if folders.processed == folders.inbox || folders.rejected == folders.inbox {
            return Err(IngestError::InvalidConfig(
                "processed and rejected folders must differ from the inbox".into(),
            ));
        }

        if self.server.max_upload_files == 0 {
            return Err(IngestError::InvalidConfig(
                "server.max_upload_files must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("PARAGON_DATABASE_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = PathBuf::from(path);
        }

        if let Ok(max) = std::env::var("PARAGON_MAX_CONNECTIONS") {
            if let Ok(m) = max.parse::<u32>() {
                self.database.max_connections = m;
            }
        }

        if let Ok(dir) = std::env::var("PARAGON_INBOX") {
            debug!(dir = %dir, "Overriding inbox from environment");
            self.folders.inbox = PathBuf::from(dir);
        }

        if let Ok(dir) = std::env::var("PARAGON_PROCESSED_DIR") {
            self.folders.processed = PathBuf::from(dir);
        }

        if let Ok(dir) = std::env::var("PARAGON_REJECTED_DIR") {
            self.folders.rejected = PathBuf::from(dir);
        }

        if let Ok(addr) = std::env::var("PARAGON_BIND_ADDR") {
            self.server.bind_addr = addr;
        }

        if let Ok(port) = std::env::var("PARAGON_PORT") {
            if let Ok(p) = port.parse::<u16>() {
                debug!(port = p, "Overriding server port from environment");
                self.server.port = p;
            }
        }

        if let Ok(flag) = std::env::var("PARAGON_INTERACTIVE") {
            match flag.to_lowercase().as_str() {
                "1" | "true" | "yes" => self.ingest.interactive = true,
                "0" | "false" | "no" => self.ingest.interactive = false,
                _ => warn!(value = %flag, "Unknown PARAGON_INTERACTIVE value in environment"),
            }
        }
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "paragon", "paragon")
            .map(|dirs| dirs.config_dir().join("paragon.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = IngestConfig::default();
        assert_eq!(config.database.path, PathBuf::from("data/paragon.db"));
        assert_eq!(config.folders.inbox, PathBuf::from("data/to_check"));
        assert_eq!(config.folders.processed, PathBuf::from("data/parsed"));
        assert_eq!(config.folders.rejected, PathBuf::from("data/rejected"));
        assert_eq!(config.server.max_upload_files, 500);
        assert!(!config.ingest.interactive);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_bind_address() {
        let server = ServerSettings {
            bind_addr: "0.0.0.0".into(),
            port: 9000,
            ..Default::default()
        };
        assert_eq!(server.bind_address(), "0.0.0.0:9000");
    }

    #[test]
    fn test_config_validation() {
        let mut config = IngestConfig::default();

        config.folders.processed = config.folders.inbox.clone();
        assert!(matches!(config.validate(), Err(IngestError::InvalidConfig(_))));

        config.folders.processed = default_processed();
        config.database.max_connections = 0;
        assert!(config.validate().is_err());

        config.database.max_connections = 1;
        config.server.max_upload_files = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: IngestConfig = toml::from_str(
            r#"
            [folders]
            inbox = "/tmp/in"

            [server]
            port = 9999
            "#,
        )
        .unwrap();

        assert_eq!(config.folders.inbox, PathBuf::from("/tmp/in"));
        assert_eq!(config.folders.processed, PathBuf::from("data/parsed"));
        assert_eq!(config.server.port, 9999);
        assert_eq!(config.server.bind_addr, "127.0.0.1");
        assert_eq!(config.database.max_connections, 5);
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("paragon.toml");

        let mut config = IngestConfig::default();
        config.database.path = PathBuf::from("/var/lib/paragon.db");
        config.ingest.interactive = true;
        config.save(Some(path.clone())).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("[database]"));
        assert!(contents.contains("[folders]"));

        let loaded: IngestConfig = toml::from_str(&contents).unwrap();
        assert_eq!(loaded.database.path, PathBuf::from("/var/lib/paragon.db"));
        assert!(loaded.ingest.interactive);
    }

    #[test]
    fn test_broken_file_is_a_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("paragon.toml");
        std::fs::write(&path, "[server\nport = ").unwrap();

        let err = IngestConfig::load(Some(path.clone())).unwrap_err();
        assert!(err.is_config_error());

        // load_or_default swallows it.
        let config = IngestConfig::load_or_default(Some(path));
        assert_eq!(config.server.port, 8080);
    }
}
