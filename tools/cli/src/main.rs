//! drivegate CLI - terminal client for a drivegate server.
//!
//! Browses the served Drive folder, creates and renames folders, and runs
//! uploads and downloads in the background while the listing refreshes
//! itself.

mod shell;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use drivegate_navigator::{DownloadOutcome, HttpBackend, Navigator, NavigatorConfig};
use shell::{render_listing, spawn_notice_printer, Shell};

#[derive(Parser)]
#[command(name = "drivegate")]
#[command(about = "drivegate - browse and transfer files through a drivegate server")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Server URL.
    #[arg(long, env = "DRIVEGATE_SERVER", default_value = "http://localhost:3000", global = true)]
    server: String,

    /// Session id shown on the server's start page after signing in.
    #[arg(long, env = "DRIVEGATE_SESSION", global = true, hide_env_values = true)]
    session: Option<String>,

    /// Seconds between background reloads of the current folder.
    #[arg(long, default_value_t = 10, global = true)]
    refresh_secs: u64,

    /// Directory downloads are saved to.
    #[arg(long, default_value = ".", global = true)]
    downloads: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive shell (the default).
    Shell,

    /// Print the sign-in URL and open it in a browser.
    Login,

    /// List a folder.
    Ls {
        /// Folder id (default: root).
        folder: Option<String>,
    },

    /// Upload a file.
    Put {
        /// Local file.
        path: PathBuf,

        /// Target folder id (default: root).
        #[arg(short, long)]
        folder: Option<String>,
    },

    /// Download a file from a folder.
    Get {
        /// File name or id.
        file: String,

        /// Folder holding the file (default: root).
        #[arg(short, long)]
        folder: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::WARN
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let backend = Arc::new(HttpBackend::new(&cli.server).context("Invalid server URL")?);
    if let Some(session) = cli.session.as_deref() {
        backend.set_session(session);
    }

    let (navigator, notices) = Navigator::new(
        backend.clone(),
        NavigatorConfig {
            refresh_interval: Duration::from_secs(cli.refresh_secs.max(1)),
            downloads_dir: cli.downloads.clone(),
        },
    );
    spawn_notice_printer(notices);

    match cli.command.unwrap_or(Commands::Shell) {
        Commands::Shell => Shell::new(navigator, backend).run().await,
        Commands::Login => cmd_login(&navigator).await,
        Commands::Ls { folder } => cmd_ls(&navigator, folder.as_deref()).await,
        Commands::Put { path, folder } => cmd_put(&navigator, &path, folder.as_deref()).await,
        Commands::Get { file, folder } => cmd_get(&navigator, &file, folder.as_deref()).await,
    }
}

/// Load a folder for a one-shot command, failing when not signed in.
async fn open(navigator: &Navigator, folder: Option<&str>) -> Result<()> {
    if !navigator.ensure_authenticated().await {
        anyhow::bail!("Not signed in. Run `drivegate login`, then pass --session <id>");
    }

    navigator
        .load_folder(
            folder,
            drivegate_navigator::LoadOptions {
                silent: false,
                skip_auto_refresh: true,
            },
        )
        .await;

    if navigator.current_folder_id().is_none() {
        anyhow::bail!("Failed to load folder");
    }
    Ok(())
}

/// Print the sign-in URL.
async fn cmd_login(navigator: &Navigator) -> Result<()> {
    let url = navigator
        .login_url()
        .await
        .context("Failed to get the sign-in URL")?;

    println!("Sign in at:\n  {}", url);
    println!("The server's start page then shows the session id for --session.");
    if open::that(&url).is_err() {
        println!("(Could not open a browser.)");
    }
    Ok(())
}

/// List a folder.
async fn cmd_ls(navigator: &Navigator, folder: Option<&str>) -> Result<()> {
    open(navigator, folder).await?;
    print!("{}", render_listing(&navigator.snapshot()));
    Ok(())
}

/// Upload a file and wait for it.
async fn cmd_put(navigator: &Navigator, path: &PathBuf, folder: Option<&str>) -> Result<()> {
    open(navigator, folder).await?;

    let body = shell::upload_body(path).await?;
    let file = navigator
        .upload(body)
        .await
        .context("Upload failed")?;

    println!("Uploaded {} ({})", file.name, file.id);
    Ok(())
}

/// Download a file and wait for it.
async fn cmd_get(navigator: &Navigator, key: &str, folder: Option<&str>) -> Result<()> {
    open(navigator, folder).await?;

    let file = navigator
        .find_file(key)
        .with_context(|| format!("No file {} in this folder", key))?;

    match navigator.download(&file).await.context("Download failed")? {
        DownloadOutcome::Saved(path) => println!("Saved {}", path.display()),
        DownloadOutcome::Fallback { url } => println!("Download it from {}", url),
    }
    Ok(())
}
