//! mcwarden — Minecraft server supervisor.
//!
//! Flag-driven one-shot operations for scripting; with no flags it opens
//! the interactive live console.

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use mcwarden::backup::BackupManager;
use mcwarden::catalog::CatalogClient;
use mcwarden::config::{self, ConfigStore};
use mcwarden::console;
use mcwarden::install::{InstallEvent, Installer};
use mcwarden::session::{ScreenSession, DEFAULT_SESSION_NAME};
use mcwarden::supervisor::Supervisor;

#[derive(Parser, Debug)]
#[command(name = "mcwarden", version, about = "Minecraft server supervisor")]
struct Cli {
    /// Show server status as JSON
    #[arg(long)]
    status: bool,

    /// Start the server
    #[arg(long)]
    start: bool,

    /// Stop the server gracefully
    #[arg(long)]
    stop: bool,

    /// With --stop: terminate the session instead of waiting for a clean exit
    #[arg(long, requires = "stop")]
    force: bool,

    /// Create a world backup now
    #[arg(long)]
    backup: bool,

    /// Enable or disable the automatic backup before a version switch
    #[arg(long, value_name = "BOOL")]
    auto_backup: Option<bool>,

    /// Send a command to the running server
    #[arg(short = 'c', long, value_name = "CMD")]
    command: Option<String>,

    /// Install a server version
    #[arg(long, value_name = "VERSION")]
    install: Option<String>,

    /// With --install or --versions: use Paper instead of vanilla
    #[arg(long)]
    paper: bool,

    /// With --install: RAM allocation in GB (1-64)
    #[arg(long, value_name = "GB")]
    ram: Option<u32>,

    /// List installable versions
    #[arg(long)]
    versions: bool,

    /// Server directory (default: ~/minecraft)
    #[arg(long, value_name = "DIR")]
    dir: Option<PathBuf>,

    /// Skip the screen/java dependency check
    #[arg(long)]
    skip_checks: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let server_dir = cli.dir.clone().unwrap_or_else(config::default_server_dir);
    let cfg = config::shared(ConfigStore::load(&server_dir));
    let supervisor = Supervisor::new(cfg.clone(), ScreenSession::new(DEFAULT_SESSION_NAME));
    let backups = BackupManager::new(cfg.clone());

    // A user-initiated abort (Ctrl-C) cancels the graceful-stop wait
    // instead of killing the process mid-poll.
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            let _ = tokio::signal::ctrl_c().await;
            cancel.cancel();
        });
    }

    if !cli.skip_checks && !cli.status {
        check_requirements().await?;
    }

    if cli.status {
        let status = supervisor.status().await;
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    if let Some(enabled) = cli.auto_backup {
        cfg.lock().unwrap().set_auto_backup(enabled)?;
        println!(
            "Automatic pre-switch backup {}",
            if enabled { "enabled" } else { "disabled" }
        );
        return Ok(());
    }

    if let Some(version) = &cli.install {
        return run_install(version, &cli, &cfg, &supervisor, &backups, &cancel).await;
    }

    if cli.versions {
        return run_versions(cli.paper).await;
    }

    if cli.start {
        supervisor.start().await?;
        println!("Server started successfully!");
        return Ok(());
    }

    if cli.stop {
        supervisor.stop(!cli.force, &cancel).await?;
        println!(
            "{}",
            if cli.force { "Server terminated" } else { "Server stopped gracefully" }
        );
        return Ok(());
    }

    if let Some(command) = &cli.command {
        supervisor.send_command(command).await?;
        println!("Command sent: {}", command);
        return Ok(());
    }

    if cli.backup {
        let name = backups.create_backup()?;
        println!("Backup created: {}", name);
        return Ok(());
    }

    // No flags: interactive console.
    console::run(&supervisor).await
}

async fn run_versions(paper: bool) -> anyhow::Result<()> {
    let catalog = CatalogClient::new();
    if paper {
        let mut versions = catalog.fetch_paper_versions().await;
        if versions.is_empty() {
            bail!("Failed to fetch Paper versions. Check your internet connection.");
        }
        versions.reverse(); // newest first
        for v in versions {
            println!("{}", v);
        }
    } else {
        let versions = catalog.fetch_versions(100).await;
        if versions.is_empty() {
            bail!("Failed to fetch versions. Check your internet connection.");
        }
        for v in versions {
            if v.is_release() {
                println!("{}", v.id);
            } else {
                println!("{} ({})", v.id, v.release_type);
            }
        }
    }
    Ok(())
}

async fn run_install(
    version: &str,
    cli: &Cli,
    cfg: &config::SharedConfig,
    supervisor: &Supervisor,
    backups: &BackupManager,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    let (current, default_ram) = {
        let cfg = cfg.lock().unwrap();
        (cfg.data.current_version.clone(), cfg.data.ram_gb)
    };
    let ram_gb = cli.ram.unwrap_or(default_ram);

    let catalog = CatalogClient::new();
    let entry = if cli.paper {
        None
    } else {
        Some(
            catalog
                .fetch_versions(500)
                .await
                .into_iter()
                .find(|v| v.id == version)
                .with_context(|| format!("Version '{}' not found in the version manifest", version))?,
        )
    };

    let installer = Installer::new(cfg.clone(), catalog);
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let printer = tokio::spawn(async move {
        let mut last_pct = u64::MAX;
        while let Some(event) = rx.recv().await {
            match event {
                InstallEvent::Status(message) => println!("  {}", message),
                InstallEvent::Progress { downloaded, total } => {
                    let pct = downloaded * 100 / total;
                    if pct != last_pct {
                        last_pct = pct;
                        print!("\r  {}%", pct);
                        let _ = std::io::stdout().flush();
                        if pct == 100 {
                            println!();
                        }
                    }
                }
            }
        }
    });

    // Version switch: stop a running server and honor auto-backup before
    // the jar is replaced. A fresh install skips both.
    let is_switch = current.as_deref().is_some_and(|v| v != version);
    if is_switch {
        installer
            .prepare_version_switch(supervisor, backups, &tx, cancel)
            .await?;
    }

    let result = match entry {
        Some(entry) => installer.install_vanilla(&entry, ram_gb, &tx).await,
        None => installer.install_paper(version, ram_gb, &tx).await,
    };
    drop(tx);
    let _ = printer.await;
    result?;

    let kind = if cli.paper { "Paper" } else { "Minecraft" };
    println!("{} {} installed successfully!", kind, version);
    Ok(())
}

/// The supervisor is useless without its external collaborators; name the
/// missing one with an actionable hint instead of failing later.
async fn check_requirements() -> anyhow::Result<()> {
    let mut missing = Vec::new();
    if !binary_works("screen", &["--version"]).await {
        missing.push(("screen", "sudo apt install screen"));
    }
    if !binary_works("java", &["-version"]).await {
        missing.push(("java", "sudo apt install openjdk-21-jre-headless"));
    }
    if missing.is_empty() {
        return Ok(());
    }

    let mut message = String::from("Missing required dependencies:\n");
    for (name, hint) in &missing {
        message.push_str(&format!("  • {} — install with: {}\n", name, hint));
    }
    message.push_str("Install them and try again, or pass --skip-checks to bypass.");
    bail!(message);
}

async fn binary_works(program: &str, args: &[&str]) -> bool {
    tokio::process::Command::new(program)
        .args(args)
        .output()
        .await
        .map(|output| output.status.success())
        .unwrap_or(false)
}
