//! Interactive shell over a navigator.

use anyhow::{Context, Result};
use chrono::{DateTime, Local, Utc};
use futures::StreamExt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::io::ReaderStream;
use tracing::debug;

use drivegate_common::Error;
use drivegate_navigator::{
    DownloadOutcome, HttpBackend, Navigator, Notice, NoticeLevel, Transfer, TransferKind,
    TransferStatus, UploadBody, ViewState,
};

const HELP: &str = "\
Commands:
  ls                    show the current folder
  cd <folder|id|..>     open a subfolder, a folder id, or go up
  up                    go to the previous folder
  crumb <n>             jump to breadcrumb n (0 is the first)
  refresh               reload the current folder
  mkdir <name>          create a folder here
  rename <folder> <new> rename a subfolder
  rm <file>             delete a file
  put <path>            upload a local file here
  get <file>            download a file
  transfers             list uploads and downloads
  clear                 remove finished transfers
  login                 open the sign-in page
  session <id>          use a session id from the server's start page
  whoami                show the signed-in user
  logout                end the session
  quit                  leave
Names with spaces go in double quotes.";

/// A parsed shell line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    List,
    Open(String),
    Up,
    Breadcrumb(usize),
    Refresh,
    Mkdir(String),
    Rename { folder: String, name: String },
    Remove(String),
    Put(PathBuf),
    Get(String),
    Transfers,
    Clear,
    Login,
    Session(String),
    WhoAmI,
    Logout,
    Help,
    Quit,
}

/// Split a line into words, keeping double-quoted runs together.
pub fn tokenize(line: &str) -> std::result::Result<Vec<String>, String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut quoted = false;

    for c in line.chars() {
        match c {
            '"' => {
                quoted = !quoted;
                in_word = true;
            }
            c if c.is_whitespace() && !quoted => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            c => {
                current.push(c);
                in_word = true;
            }
        }
    }

    if quoted {
        return Err("Unterminated quote".to_string());
    }
    if in_word {
        words.push(current);
    }
    Ok(words)
}

/// Parse one line. Blank lines yield `None`.
pub fn parse(line: &str) -> std::result::Result<Option<Command>, String> {
    let words = tokenize(line)?;
    let Some((verb, args)) = words.split_first() else {
        return Ok(None);
    };

    let one = |usage: &str| -> std::result::Result<String, String> {
        match args {
            [arg] => Ok(arg.clone()),
            _ => Err(format!("Usage: {}", usage)),
        }
    };

    let command = match verb.as_str() {
        "ls" => Command::List,
        "cd" => match one("cd <folder|id|..>")?.as_str() {
            ".." => Command::Up,
            target => Command::Open(target.to_string()),
        },
        "up" => Command::Up,
        "crumb" => {
            let index = one("crumb <n>")?;
            Command::Breadcrumb(
                index
                    .parse()
                    .map_err(|_| format!("Not a breadcrumb number: {}", index))?,
            )
        }
        "refresh" => Command::Refresh,
        "mkdir" => Command::Mkdir(one("mkdir <name>")?),
        "rename" => match args {
            [folder, name] => Command::Rename {
                folder: folder.clone(),
                name: name.clone(),
            },
            _ => return Err("Usage: rename <folder> <new name>".to_string()),
        },
        "rm" => Command::Remove(one("rm <file>")?),
        "put" => Command::Put(PathBuf::from(one("put <path>")?)),
        "get" => Command::Get(one("get <file>")?),
        "transfers" => Command::Transfers,
        "clear" => Command::Clear,
        "login" => Command::Login,
        "session" => Command::Session(one("session <id>")?),
        "whoami" => Command::WhoAmI,
        "logout" => Command::Logout,
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        other => return Err(format!("Unknown command: {} (try help)", other)),
    };

    Ok(Some(command))
}

/// Human-readable size.
pub fn format_size(bytes: Option<u64>) -> String {
    const UNITS: [&str; 4] = ["KB", "MB", "GB", "TB"];

    let Some(bytes) = bytes else {
        return "-".to_string();
    };
    if bytes < 1024 {
        return format!("{} B", bytes);
    }

    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", value, UNITS[unit])
}

fn format_time(time: Option<DateTime<Utc>>) -> String {
    time.map(|t| t.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string())
}

/// The current folder as text.
pub fn render_listing(view: &ViewState) -> String {
    let mut out = format!("/ {}\n", view.breadcrumbs.path());

    if view.folders.is_empty() && view.files.is_empty() {
        out.push_str("  (empty)\n");
        return out;
    }

    for folder in &view.folders {
        out.push_str(&format!(
            "  [DIR]  {:<32} {:>10}  {:<20} {}\n",
            folder.name,
            "",
            folder.owner(),
            format_time(folder.updated_at())
        ));
    }
    for file in &view.files {
        out.push_str(&format!(
            "  [FILE] {:<32} {:>10}  {:<20} {}\n",
            file.name,
            format_size(file.size),
            file.last_modifier(),
            format_time(file.updated_at())
        ));
    }
    out
}

/// Transfers as text, newest first.
pub fn render_transfers(transfers: &[Transfer]) -> String {
    if transfers.is_empty() {
        return "No transfers.\n".to_string();
    }

    transfers
        .iter()
        .map(|t| {
            let direction = match t.kind {
                TransferKind::Upload => "up  ",
                TransferKind::Download => "down",
            };
            let progress = t
                .progress
                .map(|p| format!("{:>3}%", p))
                .unwrap_or_else(|| "  - ".to_string());
            let status = match t.status {
                TransferStatus::Running => "running".to_string(),
                TransferStatus::Completed => "done".to_string(),
                TransferStatus::Error => {
                    format!("failed: {}", t.message.as_deref().unwrap_or("unknown error"))
                }
            };
            format!("  {} {} {:<32} {}\n", direction, progress, t.name, status)
        })
        .collect()
}

/// Print notices as they arrive.
pub fn spawn_notice_printer(mut notices: UnboundedReceiver<Notice>) {
    tokio::spawn(async move {
        while let Some(notice) = notices.recv().await {
            match notice.level {
                NoticeLevel::Success => println!("[ok] {}", notice.message),
                NoticeLevel::Error => eprintln!("[error] {}", notice.message),
            }
        }
    });
}

/// Content type guessed from the file extension.
pub fn mime_type_for(name: &str) -> String {
    mime_guess::from_path(name)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}

/// Upload body streaming a local file.
pub async fn upload_body(path: &Path) -> Result<UploadBody> {
    let file = tokio::fs::File::open(path)
        .await
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let size = file
        .metadata()
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?
        .len();
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .context("Path has no file name")?
        .to_string();

    let stream = ReaderStream::new(file).map(|chunk| chunk.map_err(Error::from));
    Ok(UploadBody {
        mime_type: mime_type_for(&name),
        name,
        size: Some(size),
        stream: Box::pin(stream),
    })
}

/// Read-eval loop bound to one server.
pub struct Shell {
    navigator: Navigator,
    backend: Arc<HttpBackend>,
}

impl Shell {
    pub fn new(navigator: Navigator, backend: Arc<HttpBackend>) -> Self {
        Self { navigator, backend }
    }

    /// Run until `quit` or end of input.
    pub async fn run(&self) -> Result<()> {
        println!("drivegate client for {}", self.backend.base_url());
        self.navigator.refresh().await;
        match self.navigator.user() {
            Some(user) => {
                println!("Signed in as {}.", user.display());
                print!("{}", render_listing(&self.navigator.snapshot()));
            }
            None => println!("Not signed in. Use `login`, then `session <id>`."),
        }

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            self.prompt()?;
            let line = match lines.next_line().await.context("Failed to read input")? {
                Some(line) => line,
                None => break,
            };

            match parse(&line) {
                Ok(Some(Command::Quit)) => break,
                Ok(Some(command)) => self.execute(command).await?,
                Ok(None) => {}
                Err(message) => eprintln!("{}", message),
            }
        }

        Ok(())
    }

    fn prompt(&self) -> Result<()> {
        let location = self.navigator.snapshot().breadcrumbs.path();
        print!("drivegate:/{}> ", location);
        std::io::stdout().flush().context("Failed to write prompt")
    }

    async fn execute(&self, command: Command) -> Result<()> {
        let nav = &self.navigator;

        match command {
            Command::List => print!("{}", render_listing(&nav.snapshot())),
            Command::Open(target) => {
                let id = nav.find_folder(&target).map(|f| f.id).unwrap_or(target);
                nav.open_folder(&id).await;
                print!("{}", render_listing(&nav.snapshot()));
            }
            Command::Up => {
                if nav.go_up().await {
                    print!("{}", render_listing(&nav.snapshot()));
                } else {
                    println!("Already at the first folder.");
                }
            }
            Command::Breadcrumb(index) => {
                if nav.open_breadcrumb(index).await.is_err() {
                    println!("No breadcrumb {}.", index);
                } else {
                    print!("{}", render_listing(&nav.snapshot()));
                }
            }
            Command::Refresh => {
                nav.refresh().await;
                print!("{}", render_listing(&nav.snapshot()));
            }
            Command::Mkdir(name) => {
                if let Err(e) = nav.create_folder(&name).await {
                    debug!("Create folder failed: {}", e);
                }
            }
            Command::Rename { folder, name } => match nav.find_folder(&folder) {
                Some(node) => match nav.rename_folder(&node, &name).await {
                    Ok(None) => println!("Name unchanged."),
                    Ok(Some(_)) => {}
                    Err(e) => debug!("Rename failed: {}", e),
                },
                None => println!("No folder {} here.", folder),
            },
            Command::Remove(key) => match nav.find_file(&key) {
                Some(file) => {
                    if let Err(e) = nav.delete_file(&file).await {
                        debug!("Delete failed: {}", e);
                    }
                }
                None => println!("No file {} here.", key),
            },
            Command::Put(path) => match upload_body(&path).await {
                Ok(body) => {
                    let nav = nav.clone();
                    println!("Uploading {} in the background.", body.name);
                    tokio::spawn(async move {
                        if let Err(e) = nav.upload(body).await {
                            debug!("Upload failed: {}", e);
                        }
                    });
                }
                Err(e) => eprintln!("{:#}", e),
            },
            Command::Get(key) => match nav.find_file(&key) {
                Some(file) => {
                    let nav = nav.clone();
                    println!("Downloading {} in the background.", file.name);
                    tokio::spawn(async move {
                        match nav.download(&file).await {
                            Ok(DownloadOutcome::Fallback { url }) => {
                                println!("[ok] Download it from {}", url)
                            }
                            Ok(DownloadOutcome::Saved(_)) => {}
                            Err(e) => debug!("Download failed: {}", e),
                        }
                    });
                }
                None => println!("No file {} here.", key),
            },
            Command::Transfers => print!("{}", render_transfers(&nav.transfers())),
            Command::Clear => nav.clear_transfers(),
            Command::Login => match nav.login_url().await.context("Failed to get the sign-in URL") {
                Ok(url) => {
                    println!("Sign in at:\n  {}", url);
                    println!("Then run `session <id>` with the id shown on the server's start page.");
                    if let Err(e) = open::that(&url) {
                        debug!("Could not open a browser: {}", e);
                    }
                }
                Err(e) => eprintln!("{:#}", e),
            },
            Command::Session(id) => {
                self.backend.set_session(&id);
                nav.refresh().await;
                match nav.user() {
                    Some(user) => {
                        println!("Signed in as {}.", user.display());
                        print!("{}", render_listing(&nav.snapshot()));
                    }
                    None => println!("The server did not accept that session."),
                }
            }
            Command::WhoAmI => match nav.user() {
                Some(user) => println!("{}", user.display()),
                None => println!("Not signed in."),
            },
            Command::Logout => nav.logout().await,
            Command::Help => println!("{}", HELP),
            Command::Quit => {}
        }

        Ok(())
    }
}
