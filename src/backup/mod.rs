//! World backups — tar.gz archives with count-based retention.
//!
//! The backups directory listing is the source of truth; there is no index.
//! Archive writing is not atomic: a failure mid-write leaves a partial
//! `.tar.gz` behind that later listings will count.

use std::fs;
use std::io;
use std::path::PathBuf;
use std::time::SystemTime;

use flate2::write::GzEncoder;
use flate2::Compression;

use crate::config::SharedConfig;

pub const BACKUP_DIR_NAME: &str = "backups";
/// A directory is a world iff this file sits at its root.
pub const WORLD_MARKER: &str = "level.dat";
const ARCHIVE_SUFFIX: &str = ".tar.gz";

#[derive(Debug, thiserror::Error)]
pub enum BackupError {
    #[error("No world folders found to backup")]
    NoWorlds,

    #[error("Backup failed: {0}")]
    Archive(#[from] io::Error),
}

/// One retained archive file on disk.
#[derive(Debug, Clone)]
pub struct BackupArchive {
    pub name: String,
    pub path: PathBuf,
    pub size_bytes: u64,
    pub modified: SystemTime,
}

pub struct BackupManager {
    cfg: SharedConfig,
}

impl BackupManager {
    pub fn new(cfg: SharedConfig) -> Self {
        Self { cfg }
    }

    fn server_dir(&self) -> PathBuf {
        self.cfg.lock().unwrap().server_dir().to_path_buf()
    }

    fn backup_dir(&self) -> PathBuf {
        self.server_dir().join(BACKUP_DIR_NAME)
    }

    /// Immediate subdirectories of the server dir carrying the world marker,
    /// in filesystem listing order.
    pub fn world_folders(&self) -> Vec<String> {
        let server_dir = self.server_dir();
        let entries = match fs::read_dir(&server_dir) {
            Ok(entries) => entries,
            Err(_) => return Vec::new(),
        };
        entries
            .flatten()
            .filter(|e| e.path().is_dir() && e.path().join(WORLD_MARKER).exists())
            .filter_map(|e| e.file_name().into_string().ok())
            .collect()
    }

    /// Archive every world folder into one timestamped tar.gz, then prune.
    /// Returns the archive file name.
    pub fn create_backup(&self) -> Result<String, BackupError> {
        let worlds = self.world_folders();
        if worlds.is_empty() {
            return Err(BackupError::NoWorlds);
        }

        let server_dir = self.server_dir();
        let backup_dir = self.backup_dir();
        fs::create_dir_all(&backup_dir)?;

        let (version, max_backups) = {
            let cfg = self.cfg.lock().unwrap();
            (
                cfg.data.current_version.clone().unwrap_or_else(|| "unknown".into()),
                cfg.data.max_backups,
            )
        };

        let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let name = format!("backup_{}_{}{}", version, timestamp, ARCHIVE_SUFFIX);
        let path = backup_dir.join(&name);

        tracing::info!("Creating backup {} ({} worlds)", name, worlds.len());
        let file = fs::File::create(&path)?;
        let encoder = GzEncoder::new(file, Compression::default());
        let mut builder = tar::Builder::new(encoder);
        for world in &worlds {
            builder.append_dir_all(world, server_dir.join(world))?;
        }
        builder.into_inner()?.finish()?;

        self.prune(max_backups)?;
        Ok(name)
    }

    /// Delete every archive beyond the `keep` most recently modified.
    pub fn prune(&self, keep: usize) -> Result<(), BackupError> {
        let mut backups = self.list_backups();
        for old in backups.split_off(keep.min(backups.len())) {
            tracing::info!("Pruning old backup {}", old.name);
            fs::remove_file(&old.path)?;
        }
        Ok(())
    }

    /// All archives, most recently modified first. Ties keep listing order.
    pub fn list_backups(&self) -> Vec<BackupArchive> {
        let entries = match fs::read_dir(self.backup_dir()) {
            Ok(entries) => entries,
            Err(_) => return Vec::new(),
        };
        let mut backups: Vec<BackupArchive> = entries
            .flatten()
            .filter(|e| e.file_name().to_string_lossy().ends_with(ARCHIVE_SUFFIX))
            .filter_map(|e| {
                let meta = e.metadata().ok()?;
                Some(BackupArchive {
                    name: e.file_name().to_string_lossy().into_owned(),
                    path: e.path(),
                    size_bytes: meta.len(),
                    modified: meta.modified().ok()?,
                })
            })
            .collect();
        backups.sort_by(|a, b| b.modified.cmp(&a.modified));
        backups
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{self, ConfigStore};
    use std::io::Read;
    use std::time::Duration;
    use tempfile::TempDir;

    fn manager(dir: &TempDir) -> BackupManager {
        BackupManager::new(config::shared(ConfigStore::load(dir.path())))
    }

    fn make_world(dir: &TempDir, name: &str) {
        let world = dir.path().join(name);
        fs::create_dir_all(&world).unwrap();
        fs::write(world.join(WORLD_MARKER), b"\x0a\x00").unwrap();
        fs::write(world.join("region.mca"), b"chunk data").unwrap();
    }

    #[test]
    fn no_worlds_fails_without_creating_backup_dir() {
        let dir = TempDir::new().unwrap();
        let mgr = manager(&dir);
        assert!(matches!(mgr.create_backup(), Err(BackupError::NoWorlds)));
        assert!(!dir.path().join(BACKUP_DIR_NAME).exists());
    }

    #[test]
    fn folder_without_marker_is_not_a_world() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("plugins")).unwrap();
        make_world(&dir, "world");
        let mgr = manager(&dir);
        assert_eq!(mgr.world_folders(), vec!["world".to_string()]);
    }

    #[test]
    fn archive_contains_worlds_with_relative_paths() {
        let dir = TempDir::new().unwrap();
        make_world(&dir, "world");
        make_world(&dir, "world_nether");
        let mgr = manager(&dir);

        let name = mgr.create_backup().unwrap();
        assert!(name.starts_with("backup_unknown_"));
        assert!(name.ends_with(ARCHIVE_SUFFIX));

        let file = fs::File::open(dir.path().join(BACKUP_DIR_NAME).join(&name)).unwrap();
        let mut archive = tar::Archive::new(flate2::read::GzDecoder::new(file));
        let mut paths = Vec::new();
        for entry in archive.entries().unwrap() {
            let mut entry = entry.unwrap();
            paths.push(entry.path().unwrap().to_string_lossy().into_owned());
            let mut content = Vec::new();
            entry.read_to_end(&mut content).unwrap();
        }
        assert!(paths.iter().any(|p| p == "world/level.dat"));
        assert!(paths.iter().any(|p| p == "world_nether/region.mca"));
        assert!(paths.iter().all(|p| !p.starts_with('/')));
    }

    #[test]
    fn archive_name_carries_version() {
        let dir = TempDir::new().unwrap();
        make_world(&dir, "world");
        let cfg = config::shared(ConfigStore::load(dir.path()));
        cfg.lock()
            .unwrap()
            .set_install("1.20.4", 4, crate::config::ServerType::Vanilla)
            .unwrap();
        let mgr = BackupManager::new(cfg);
        let name = mgr.create_backup().unwrap();
        assert!(name.starts_with("backup_1.20.4_"));
    }

    #[test]
    fn prune_keeps_newest_n() {
        let dir = TempDir::new().unwrap();
        let backup_dir = dir.path().join(BACKUP_DIR_NAME);
        fs::create_dir_all(&backup_dir).unwrap();

        let base = SystemTime::now() - Duration::from_secs(600);
        for i in 0..5 {
            let path = backup_dir.join(format!("backup_x_{}.tar.gz", i));
            fs::write(&path, b"stub").unwrap();
            let file = fs::File::options().write(true).open(&path).unwrap();
            file.set_modified(base + Duration::from_secs(i * 60)).unwrap();
        }

        let mgr = manager(&dir);
        mgr.prune(2).unwrap();

        let remaining = mgr.list_backups();
        assert_eq!(remaining.len(), 2);
        // The two most recently modified survive, newest first.
        assert_eq!(remaining[0].name, "backup_x_4.tar.gz");
        assert_eq!(remaining[1].name, "backup_x_3.tar.gz");
    }

    #[test]
    fn list_backups_sorted_by_mtime_descending() {
        let dir = TempDir::new().unwrap();
        let backup_dir = dir.path().join(BACKUP_DIR_NAME);
        fs::create_dir_all(&backup_dir).unwrap();
        fs::write(backup_dir.join("not_a_backup.txt"), b"x").unwrap();

        let base = SystemTime::now() - Duration::from_secs(600);
        for (i, name) in ["old.tar.gz", "mid.tar.gz", "new.tar.gz"].iter().enumerate() {
            let path = backup_dir.join(name);
            fs::write(&path, b"stub").unwrap();
            let file = fs::File::options().write(true).open(&path).unwrap();
            file.set_modified(base + Duration::from_secs(i as u64 * 60)).unwrap();
        }

        let mgr = manager(&dir);
        let listed = mgr.list_backups();
        assert_eq!(listed.len(), 3);
        assert_eq!(listed[0].name, "new.tar.gz");
        assert_eq!(listed[2].name, "old.tar.gz");
    }

    #[test]
    fn retention_applied_by_create_backup() {
        let dir = TempDir::new().unwrap();
        make_world(&dir, "world");
        let cfg = config::shared(ConfigStore::load(dir.path()));
        cfg.lock().unwrap().set_max_backups(1).unwrap();
        let mgr = BackupManager::new(cfg);

        // Seed an older archive, then create a fresh one.
        let backup_dir = dir.path().join(BACKUP_DIR_NAME);
        fs::create_dir_all(&backup_dir).unwrap();
        let old = backup_dir.join("backup_old_19990101_000000.tar.gz");
        fs::write(&old, b"stub").unwrap();
        let file = fs::File::options().write(true).open(&old).unwrap();
        file.set_modified(SystemTime::now() - Duration::from_secs(3600)).unwrap();

        let name = mgr.create_backup().unwrap();
        let remaining = mgr.list_backups();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].name, name);
    }
}
