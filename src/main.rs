//! Splat Proxy - cached resolver and embed renderer for Splat assets
//!
//! Serves page renders over a Unix socket and provides administrative
//! commands for managing splats on the GreenView API.

mod admin;
mod api;
mod cache;
mod config;
mod embed;
mod ipc;
mod resolver;
mod settings;
#[cfg(test)]
mod testing;

use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use admin::{NewSplat, SplatManager};
use api::{Envelope, SplatClient, UpdateSplatRequest};
use cache::{MemoryCacheStore, MirrorStore};
use config::SplatConfig;
use ipc::{IpcServer, ServerState};
use resolver::SplatResolver;
use settings::Settings;

/// CLI command
#[derive(Debug)]
enum Command {
    /// Run IPC server mode (default)
    Serve,
    /// Render an embed directive to stdout
    Render { directive: String },
    /// Fetch one splat record
    Get { id: u64 },
    /// List a page of splats
    List { page: u32 },
    /// Upload files and create a splat
    Upload(NewSplat),
    /// Update a splat's metadata
    Update { id: u64, request: UpdateSplatRequest },
    /// Delete a splat
    Delete { id: u64 },
    /// Clear cached state for one splat or all of them
    ClearCache { id: Option<u64> },
    /// Persist the API token
    SetToken { token: String },
    /// Validate the API token
    Whoami,
    /// Show help
    Help,
}

fn print_help() {
    eprintln!(
        r#"Splat Proxy - cached resolver and embed renderer for Splat assets

USAGE:
    splat-proxy                                   # Run IPC server (default)
    splat-proxy render "<directive>"
    splat-proxy get <id>
    splat-proxy list [page]
    splat-proxy upload <file.splat> <title> [--thumbnail <image>] [--description <text>] [--animated]
    splat-proxy update <id> [--title <text>] [--description <text>] [--animated <true|false>]
    splat-proxy delete <id>
    splat-proxy clear-cache [id]
    splat-proxy set-token <token>
    splat-proxy whoami
    splat-proxy help

EXAMPLES:
    splat-proxy render "[splat id='12' animate class='hero']"
    splat-proxy upload garden.splat "Garden" --thumbnail garden.png --animated

ENVIRONMENT:
    SPLAT_API_URL                 API base URL
    SPLAT_API_TOKEN               Bearer token (overrides set-token)
    SPLAT_CACHE_DIR               Mirror directory
    SPLAT_PUBLIC_URL              URL the mirror directory is served under
    SPLAT_METADATA_TTL_SECS       Metadata cache TTL (default 3600)
    SPLAT_MIRROR_TTL_SECS         Mirror entry TTL (default 86400)
    SPLAT_REQUEST_TIMEOUT_SECS    API request timeout (default 30)
    SPLAT_DOWNLOAD_TIMEOUT_SECS   Asset download timeout (default 300)
    SPLAT_SOCKET                  IPC socket path
    RUST_LOG                      Log filter (trace, debug, info, warn, error)
"#
    );
}

fn parse_id(arg: Option<&String>) -> Result<u64> {
    let arg = arg.ok_or_else(|| anyhow!("Missing splat ID"))?;
    match arg.parse::<u64>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(anyhow!("Invalid splat ID: {}", arg)),
    }
}

/// Value following a `--flag`
fn flag_value(args: &[String], flag: &str) -> Option<String> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .cloned()
}

fn parse_args() -> Result<Command> {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        return Ok(Command::Serve);
    }

    match args[1].as_str() {
        "serve" => Ok(Command::Serve),
        "render" => {
            let directive = args
                .get(2)
                .cloned()
                .ok_or_else(|| anyhow!("Usage: splat-proxy render \"<directive>\""))?;
            Ok(Command::Render { directive })
        }
        "get" => Ok(Command::Get {
            id: parse_id(args.get(2))?,
        }),
        "list" => {
            let page = match args.get(2) {
                Some(p) => p.parse().with_context(|| format!("Invalid page: {}", p))?,
                None => 1,
            };
            Ok(Command::List { page })
        }
        "upload" => {
            if args.len() < 4 {
                return Err(anyhow!(
                    "Usage: splat-proxy upload <file.splat> <title> [--thumbnail <image>] [--description <text>] [--animated]"
                ));
            }
            Ok(Command::Upload(NewSplat {
                splat_file: PathBuf::from(&args[2]),
                thumbnail_file: flag_value(&args, "--thumbnail").map(PathBuf::from),
                title: args[3].clone(),
                description: flag_value(&args, "--description").unwrap_or_default(),
                is_animated: args.iter().any(|a| a == "--animated"),
            }))
        }
        "update" => {
            let id = parse_id(args.get(2))?;
            let is_animated = match flag_value(&args, "--animated") {
                Some(v) => Some(
                    v.parse::<bool>()
                        .with_context(|| format!("Invalid --animated value: {}", v))?,
                ),
                None => None,
            };
            Ok(Command::Update {
                id,
                request: UpdateSplatRequest {
                    title: flag_value(&args, "--title"),
                    description: flag_value(&args, "--description"),
                    thumbnail_id: None,
                    is_animated,
                },
            })
        }
        "delete" => Ok(Command::Delete {
            id: parse_id(args.get(2))?,
        }),
        "clear-cache" => {
            let id = match args.get(2) {
                Some(_) => Some(parse_id(args.get(2))?),
                None => None,
            };
            Ok(Command::ClearCache { id })
        }
        "set-token" => {
            let token = args
                .get(2)
                .cloned()
                .ok_or_else(|| anyhow!("Usage: splat-proxy set-token <token>"))?;
            Ok(Command::SetToken { token })
        }
        "whoami" => Ok(Command::Whoami),
        "help" | "--help" | "-h" => Ok(Command::Help),
        _ => {
            eprintln!("Unknown command: {}", args[1]);
            Ok(Command::Help)
        }
    }
}

/// Wired-up client, cache and resolver
struct App {
    client: Arc<SplatClient>,
    store: Arc<MemoryCacheStore>,
    resolver: Arc<SplatResolver>,
}

impl App {
    fn build(config: &SplatConfig) -> Result<Self> {
        let client = Arc::new(SplatClient::new(&config.api)?);
        let store = Arc::new(MemoryCacheStore::new());
        let mirror = MirrorStore::new(config.cache.mirror_dir.clone(), &config.cache.public_url)?;
        let resolver = Arc::new(SplatResolver::new(
            client.clone(),
            store.clone(),
            mirror,
            &config.cache,
        ));
        Ok(Self {
            client,
            store,
            resolver,
        })
    }

    fn manager(&self) -> SplatManager {
        SplatManager::new(self.client.clone(), self.resolver.clone())
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("Failed to serialize output")?
    );
    Ok(())
}

/// Forward an invalidation to a running daemon, if there is one
async fn notify_daemon(socket_path: &Path, command: &ipc::Command) {
    if !socket_path.exists() {
        return;
    }
    match send_command(socket_path, command).await {
        Ok(reply) => debug!(reply = %reply.trim(), "Daemon acknowledged"),
        Err(e) => error!(error = %e, "Failed to notify daemon"),
    }
}

async fn send_command(socket_path: &Path, command: &ipc::Command) -> Result<String> {
    let mut stream = UnixStream::connect(socket_path)
        .await
        .context("Failed to connect to daemon")?;
    let mut line = serde_json::to_vec(command)?;
    line.push(b'\n');
    stream.write_all(&line).await?;

    let mut reply = String::new();
    BufReader::new(stream).read_line(&mut reply).await?;
    Ok(reply)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging on stderr so rendered output stays clean on stdout
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let command = match parse_args() {
        Ok(cmd) => cmd,
        Err(e) => {
            eprintln!("Error: {}", e);
            print_help();
            std::process::exit(1);
        }
    };

    let settings_path = Settings::default_path();
    let mut settings = Settings::load(&settings_path)?;

    if let Command::SetToken { token } = &command {
        settings.set_token(token)?;
        settings.save(&settings_path)?;
        println!("Token saved.");
        return Ok(());
    }
    if let Command::Help = command {
        print_help();
        return Ok(());
    }

    let config = SplatConfig::from_env(&settings);
    let app = App::build(&config)?;

    match command {
        Command::Serve => {
            info!("Starting splat-proxy in IPC server mode");

            let state = ServerState {
                resolver: app.resolver.clone(),
                store: app.store.clone(),
            };
            let mut ipc_server = IpcServer::new(state, &config.socket_path);
            if let Err(e) = ipc_server.start().await {
                error!(error = %e, "Failed to start IPC server");
                return Err(e);
            }

            info!("Daemon ready. Waiting for render requests...");

            tokio::select! {
                result = ipc_server.run() => {
                    if let Err(e) = result {
                        error!(error = %e, "IPC server error");
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Received shutdown signal");
                }
            }

            ipc_server.stop()?;
            info!("Shutdown complete.");
        }
        Command::Render { directive } => {
            println!("{}", embed::render_directive(&app.resolver, &directive).await);
        }
        Command::Get { id } => {
            let envelope: Envelope<_> = app.client.get_splat(id).await.into();
            print_json(&envelope)?;
        }
        Command::List { page } => {
            let listing = app.manager().list(page).await?;
            if listing.splats.is_empty() {
                println!("No Splats available.");
            } else {
                for splat in &listing.splats {
                    println!(
                        "{:>6}  {:<32}  {:<16}  {}",
                        splat.id,
                        splat.title,
                        splat.created_display(),
                        splat.embed_snippet()
                    );
                }
            }
            if listing.total_pages > 1 {
                let prev = if listing.has_prev() { "  [prev]" } else { "" };
                let next = if listing.has_next() { "  [next]" } else { "" };
                println!(
                    "Page {} of {}{}{}",
                    listing.page, listing.total_pages, prev, next
                );
            }
        }
        Command::Upload(new) => {
            let envelope = app.manager().create(&new).await?;
            print_json(&envelope)?;
            println!("Splat created successfully!");
        }
        Command::Update { id, request } => {
            let envelope = app.manager().update(id, &request).await?;
            notify_daemon(&config.socket_path, &ipc::Command::Invalidate { id }).await;
            print_json(&envelope)?;
        }
        Command::Delete { id } => {
            let envelope = app.manager().delete(id).await?;
            notify_daemon(&config.socket_path, &ipc::Command::Invalidate { id }).await;
            print_json(&envelope)?;
        }
        Command::ClearCache { id: Some(id) } => {
            app.resolver.invalidate(id);
            notify_daemon(&config.socket_path, &ipc::Command::Invalidate { id }).await;
            println!("Cleared cache for splat {}.", id);
        }
        Command::ClearCache { id: None } => {
            let stats = app.resolver.invalidate_all();
            notify_daemon(&config.socket_path, &ipc::Command::InvalidateAll).await;
            println!("Cleared cache: {} mirrored files removed.", stats.files);
        }
        Command::Whoami => {
            let envelope = app.manager().whoami().await?;
            print_json(&envelope)?;
        }
        Command::SetToken { .. } | Command::Help => {}
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_flag_value() {
        let a = args(&["splat-proxy", "upload", "a.splat", "T", "--thumbnail", "t.png"]);
        assert_eq!(flag_value(&a, "--thumbnail").as_deref(), Some("t.png"));
        assert_eq!(flag_value(&a, "--description"), None);
    }

    #[test]
    fn test_parse_id() {
        assert_eq!(parse_id(Some(&"12".to_string())).unwrap(), 12);
        assert!(parse_id(Some(&"0".to_string())).is_err());
        assert!(parse_id(Some(&"abc".to_string())).is_err());
        assert!(parse_id(None).is_err());
    }
}
