//! Configuration store — `.mcwarden.json` in the server directory.
//!
//! One `ConfigStore` is created at startup and handed to the supervisor,
//! installer and backup manager as a shared handle. The file is
//! read-modify-written without locking; running two mcwarden invocations
//! against the same server directory is unsupported.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

pub const CONFIG_FILENAME: &str = ".mcwarden.json";

/// Commands remembered for console history recall.
pub const HISTORY_CAP: usize = 20;

pub const RAM_RANGE: std::ops::RangeInclusive<u32> = 1..=64;
pub const MAX_BACKUPS_RANGE: std::ops::RangeInclusive<usize> = 1..=100;

/// Handle shared between the supervisor, installer and backup manager.
/// Critical sections are short and never held across an await.
pub type SharedConfig = Arc<Mutex<ConfigStore>>;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be between {1} and {2}")]
    OutOfRange(&'static str, u64, u64),

    #[error("Failed to write config: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerType {
    Vanilla,
    Paper,
}

impl std::fmt::Display for ServerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServerType::Vanilla => write!(f, "vanilla"),
            ServerType::Paper => write!(f, "paper"),
        }
    }
}

/// Persisted settings. Unknown keys in the file are ignored; missing keys
/// take the per-field defaults below.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WardenConfig {
    #[serde(default = "default_server_dir")]
    pub server_dir: PathBuf,
    #[serde(default = "default_ram_gb")]
    pub ram_gb: u32,
    #[serde(default)]
    pub current_version: Option<String>,
    #[serde(default = "default_server_type")]
    pub server_type: ServerType,
    #[serde(default = "default_auto_backup")]
    pub auto_backup: bool,
    #[serde(default = "default_max_backups")]
    pub max_backups: usize,
    #[serde(default)]
    pub command_history: Vec<String>,
}

pub fn default_server_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("minecraft")
}

fn default_ram_gb() -> u32 {
    4
}

fn default_server_type() -> ServerType {
    ServerType::Vanilla
}

fn default_auto_backup() -> bool {
    true
}

fn default_max_backups() -> usize {
    5
}

impl Default for WardenConfig {
    fn default() -> Self {
        Self {
            server_dir: default_server_dir(),
            ram_gb: default_ram_gb(),
            current_version: None,
            server_type: default_server_type(),
            auto_backup: default_auto_backup(),
            max_backups: default_max_backups(),
            command_history: Vec::new(),
        }
    }
}

/// Owns the config file path and the in-memory data.
pub struct ConfigStore {
    path: PathBuf,
    pub data: WardenConfig,
}

impl ConfigStore {
    /// Load the config from `<server_dir>/.mcwarden.json`. A missing or
    /// unparsable file falls back to defaults wholesale.
    pub fn load(server_dir: &Path) -> Self {
        let path = server_dir.join(CONFIG_FILENAME);
        let mut data = match fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<WardenConfig>(&content) {
                Ok(data) => data,
                Err(e) => {
                    tracing::warn!(
                        "Config file {} is malformed ({}), using defaults",
                        path.display(),
                        e
                    );
                    WardenConfig::default()
                }
            },
            Err(_) => WardenConfig::default(),
        };
        // The directory the store lives in is authoritative.
        data.server_dir = server_dir.to_path_buf();
        data.command_history.truncate(HISTORY_CAP);
        Self { path, data }
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(&self.data)?;
        fs::write(&self.path, content)?;
        Ok(())
    }

    pub fn server_dir(&self) -> &Path {
        &self.data.server_dir
    }

    pub fn set_ram_gb(&mut self, ram_gb: u32) -> Result<(), ConfigError> {
        if !RAM_RANGE.contains(&ram_gb) {
            return Err(ConfigError::OutOfRange(
                "ram_gb",
                *RAM_RANGE.start() as u64,
                *RAM_RANGE.end() as u64,
            ));
        }
        self.data.ram_gb = ram_gb;
        self.save()
    }

    pub fn set_max_backups(&mut self, max_backups: usize) -> Result<(), ConfigError> {
        if !MAX_BACKUPS_RANGE.contains(&max_backups) {
            return Err(ConfigError::OutOfRange(
                "max_backups",
                *MAX_BACKUPS_RANGE.start() as u64,
                *MAX_BACKUPS_RANGE.end() as u64,
            ));
        }
        self.data.max_backups = max_backups;
        self.save()
    }

    pub fn set_auto_backup(&mut self, enabled: bool) -> Result<(), ConfigError> {
        self.data.auto_backup = enabled;
        self.save()
    }

    /// Record a successful install or version switch.
    pub fn set_install(
        &mut self,
        version: &str,
        ram_gb: u32,
        server_type: ServerType,
    ) -> Result<(), ConfigError> {
        if !RAM_RANGE.contains(&ram_gb) {
            return Err(ConfigError::OutOfRange(
                "ram_gb",
                *RAM_RANGE.start() as u64,
                *RAM_RANGE.end() as u64,
            ));
        }
        self.data.current_version = Some(version.to_string());
        self.data.ram_gb = ram_gb;
        self.data.server_type = server_type;
        self.save()
    }

    /// Move-to-front-or-insert, capped at `HISTORY_CAP`, persisted.
    /// Only called after a confirmed send.
    pub fn remember_command(&mut self, command: &str) -> Result<(), ConfigError> {
        remember(&mut self.data.command_history, command);
        self.save()
    }
}

/// History invariant: no duplicates, most-recent-first, length ≤ `HISTORY_CAP`.
pub fn remember(history: &mut Vec<String>, command: &str) {
    if let Some(pos) = history.iter().position(|c| c == command) {
        history.remove(pos);
    }
    history.insert(0, command.to_string());
    history.truncate(HISTORY_CAP);
}

pub fn shared(store: ConfigStore) -> SharedConfig {
    Arc::new(Mutex::new(store))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_when_missing() {
        let dir = TempDir::new().unwrap();
        let store = ConfigStore::load(dir.path());
        assert_eq!(store.data.ram_gb, 4);
        assert_eq!(store.data.max_backups, 5);
        assert!(store.data.auto_backup);
        assert_eq!(store.data.server_type, ServerType::Vanilla);
        assert!(store.data.current_version.is_none());
        assert!(store.data.command_history.is_empty());
        assert_eq!(store.server_dir(), dir.path());
    }

    #[test]
    fn round_trip() {
        let dir = TempDir::new().unwrap();
        {
            let mut store = ConfigStore::load(dir.path());
            store.set_ram_gb(8).unwrap();
            store.set_install("1.21.1", 8, ServerType::Paper).unwrap();
        }
        let store = ConfigStore::load(dir.path());
        assert_eq!(store.data.ram_gb, 8);
        assert_eq!(store.data.current_version.as_deref(), Some("1.21.1"));
        assert_eq!(store.data.server_type, ServerType::Paper);
    }

    #[test]
    fn malformed_file_falls_back_wholesale() {
        let dir = TempDir::new().unwrap();
        {
            let mut store = ConfigStore::load(dir.path());
            store.set_ram_gb(16).unwrap();
        }
        std::fs::write(dir.path().join(CONFIG_FILENAME), "{ not json").unwrap();
        let store = ConfigStore::load(dir.path());
        // A completely unparsable file loses all prior sets.
        assert_eq!(store.data.ram_gb, 4);
    }

    #[test]
    fn unknown_keys_ignored_missing_keys_defaulted() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILENAME),
            r#"{"ram_gb": 12, "shiny_new_key": true}"#,
        )
        .unwrap();
        let store = ConfigStore::load(dir.path());
        assert_eq!(store.data.ram_gb, 12);
        assert_eq!(store.data.max_backups, 5);
    }

    #[test]
    fn ram_validation_rejects_without_mutation() {
        let dir = TempDir::new().unwrap();
        let mut store = ConfigStore::load(dir.path());
        assert!(store.set_ram_gb(0).is_err());
        assert!(store.set_ram_gb(65).is_err());
        assert_eq!(store.data.ram_gb, 4);
        assert!(store.set_ram_gb(1).is_ok());
        assert!(store.set_ram_gb(64).is_ok());
    }

    #[test]
    fn max_backups_validation() {
        let dir = TempDir::new().unwrap();
        let mut store = ConfigStore::load(dir.path());
        assert!(store.set_max_backups(0).is_err());
        assert!(store.set_max_backups(101).is_err());
        assert_eq!(store.data.max_backups, 5);
        assert!(store.set_max_backups(100).is_ok());
    }

    #[test]
    fn auto_backup_toggle_round_trips() {
        let dir = TempDir::new().unwrap();
        {
            let mut store = ConfigStore::load(dir.path());
            store.set_auto_backup(false).unwrap();
        }
        let store = ConfigStore::load(dir.path());
        assert!(!store.data.auto_backup);

        {
            let mut store = ConfigStore::load(dir.path());
            store.set_auto_backup(true).unwrap();
        }
        let store = ConfigStore::load(dir.path());
        assert!(store.data.auto_backup);
    }

    #[test]
    fn history_dedup_moves_to_front() {
        let mut history = vec!["list".to_string(), "say hi".to_string()];
        remember(&mut history, "say hi");
        assert_eq!(history, vec!["say hi".to_string(), "list".to_string()]);
        remember(&mut history, "say hi");
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn history_capped_at_twenty() {
        let mut history = Vec::new();
        for i in 0..30 {
            remember(&mut history, &format!("cmd {}", i));
        }
        assert_eq!(history.len(), HISTORY_CAP);
        assert_eq!(history[0], "cmd 29");
        assert_eq!(history[HISTORY_CAP - 1], "cmd 10");
    }

    #[test]
    fn oversized_history_truncated_on_load() {
        let dir = TempDir::new().unwrap();
        let history: Vec<String> = (0..40).map(|i| format!("cmd {}", i)).collect();
        let json = serde_json::json!({ "command_history": history });
        std::fs::write(dir.path().join(CONFIG_FILENAME), json.to_string()).unwrap();
        let store = ConfigStore::load(dir.path());
        assert_eq!(store.data.command_history.len(), HISTORY_CAP);
    }
}
