//! Server installation and version switching.
//!
//! Progress is reported over an event channel so the core logic stays
//! decoupled from whatever surface renders it (CLI today).

use std::path::Path;

use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

use crate::backup::{BackupError, BackupManager};
use crate::catalog::{CatalogClient, VersionEntry};
use crate::config::{ConfigError, ServerType, SharedConfig, RAM_RANGE};
use crate::supervisor::error::StopError;
use crate::supervisor::{Supervisor, SERVER_JAR};

const EULA_FILENAME: &str = "eula.txt";

/// Progress ticks emitted while an install runs.
#[derive(Debug, Clone)]
pub enum InstallEvent {
    Status(String),
    Progress { downloaded: u64, total: u64 },
}

pub type EventSink = UnboundedSender<InstallEvent>;

#[derive(Debug, thiserror::Error)]
pub enum InstallError {
    #[error("Invalid RAM value (1-64 GB)")]
    InvalidRam,

    #[error("No Paper builds available for {0}")]
    NoPaperBuilds(String),

    #[error("Failed to resolve the server.jar download URL. Check your internet connection.")]
    NoDownloadUrl,

    #[error("Download failed: {0}")]
    Download(String),

    #[error("Failed to write server files: {0}")]
    Io(#[from] std::io::Error),

    #[error("Backup before version switch failed: {0}")]
    Backup(#[from] BackupError),

    #[error("Failed to stop running server: {0}")]
    Stop(#[from] StopError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub struct Installer {
    cfg: SharedConfig,
    catalog: CatalogClient,
    http: reqwest::Client,
}

impl Installer {
    pub fn new(cfg: SharedConfig, catalog: CatalogClient) -> Self {
        // No overall timeout here: jar downloads can legitimately take
        // minutes on slow links.
        let http = reqwest::Client::builder()
            .user_agent(concat!("mcwarden/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(std::time::Duration::from_secs(10))
            .build()
            .expect("Failed to build HTTP client");
        Self { cfg, catalog, http }
    }

    /// Install an official (vanilla) server from a manifest entry.
    pub async fn install_vanilla(
        &self,
        entry: &VersionEntry,
        ram_gb: u32,
        events: &EventSink,
    ) -> Result<(), InstallError> {
        if !RAM_RANGE.contains(&ram_gb) {
            return Err(InstallError::InvalidRam);
        }

        let server_dir = self.server_dir();
        std::fs::create_dir_all(&server_dir)?;

        status(events, "Fetching version metadata...");
        let jar_url = self
            .catalog
            .server_jar_url(&entry.url)
            .await
            .ok_or(InstallError::NoDownloadUrl)?;

        status(events, "Downloading server.jar...");
        self.download(&jar_url, &server_dir.join(SERVER_JAR), events).await?;

        status(events, "Accepting EULA...");
        write_eula(&server_dir)?;

        self.cfg
            .lock()
            .unwrap()
            .set_install(&entry.id, ram_gb, ServerType::Vanilla)?;
        tracing::info!("Installed vanilla {}", entry.id);
        Ok(())
    }

    /// Install the latest Paper build for a version.
    pub async fn install_paper(
        &self,
        version: &str,
        ram_gb: u32,
        events: &EventSink,
    ) -> Result<(), InstallError> {
        if !RAM_RANGE.contains(&ram_gb) {
            return Err(InstallError::InvalidRam);
        }

        let server_dir = self.server_dir();
        std::fs::create_dir_all(&server_dir)?;

        status(events, "Fetching latest Paper build...");
        let build = self
            .catalog
            .latest_paper_build(version)
            .await
            .ok_or_else(|| InstallError::NoPaperBuilds(version.to_string()))?;

        let jar_url = self
            .catalog
            .paper_download_url(version, build)
            .await
            .ok_or(InstallError::NoDownloadUrl)?;

        status(events, &format!("Downloading Paper {} build {}...", version, build));
        self.download(&jar_url, &server_dir.join(SERVER_JAR), events).await?;

        status(events, "Accepting EULA...");
        write_eula(&server_dir)?;

        self.cfg
            .lock()
            .unwrap()
            .set_install(version, ram_gb, ServerType::Paper)?;
        tracing::info!("Installed Paper {} build {}", version, build);
        Ok(())
    }

    /// Make the directory safe to overwrite with a different version:
    /// gracefully stop a running server, then auto-backup the worlds when
    /// that is enabled. A missing world set is tolerated; any other backup
    /// failure aborts the switch.
    pub async fn prepare_version_switch(
        &self,
        supervisor: &Supervisor,
        backups: &BackupManager,
        events: &EventSink,
        cancel: &CancellationToken,
    ) -> Result<(), InstallError> {
        if supervisor.is_running().await {
            status(events, "Stopping server...");
            supervisor.stop(true, cancel).await?;
        }

        let auto_backup = self.cfg.lock().unwrap().data.auto_backup;
        if auto_backup {
            status(events, "Creating backup...");
            match backups.create_backup() {
                Ok(name) => status(events, &format!("Backup created: {}", name)),
                Err(BackupError::NoWorlds) => {
                    tracing::warn!("No worlds to back up before version switch");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    fn server_dir(&self) -> std::path::PathBuf {
        self.cfg.lock().unwrap().server_dir().to_path_buf()
    }

    async fn download(
        &self,
        url: &str,
        dest: &Path,
        events: &EventSink,
    ) -> Result<(), InstallError> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| InstallError::Download(e.to_string()))?;

        let total = response.content_length().unwrap_or(0);
        let mut file = tokio::fs::File::create(dest).await?;
        let mut stream = response.bytes_stream();
        let mut downloaded: u64 = 0;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| InstallError::Download(e.to_string()))?;
            file.write_all(&chunk).await?;
            downloaded += chunk.len() as u64;
            if total > 0 {
                let _ = events.send(InstallEvent::Progress { downloaded, total });
            }
        }
        file.flush().await?;
        Ok(())
    }
}

fn status(events: &EventSink, message: &str) {
    let _ = events.send(InstallEvent::Status(message.to_string()));
}

fn write_eula(server_dir: &Path) -> std::io::Result<()> {
    std::fs::write(
        server_dir.join(EULA_FILENAME),
        "# Auto-accepted by mcwarden\neula=true\n",
    )
}
