//! IPC Server - Unix socket server for page renders
//!
//! Each connection carries newline-delimited JSON requests. Every request is
//! handled sequentially within its connection; connections run concurrently.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::RwLock;
use tracing::{debug, error, info};

use crate::cache::MemoryCacheStore;
use crate::embed;
use crate::ipc::protocol::{parse_command, serialize_response, Command, Response, PROTOCOL_VERSION};
use crate::resolver::SplatResolver;

/// Shared state handed to every connection
#[derive(Clone)]
pub struct ServerState {
    pub resolver: Arc<SplatResolver>,
    /// Concrete store, for statistics
    pub store: Arc<MemoryCacheStore>,
}

/// IPC Server that listens for render requests
pub struct IpcServer {
    state: ServerState,
    /// Socket path
    socket_path: PathBuf,
    /// Socket listener
    listener: Option<UnixListener>,
    /// Active connections counter
    connection_count: Arc<RwLock<u32>>,
}

impl IpcServer {
    /// Create a new IPC server
    pub fn new(state: ServerState, socket_path: &Path) -> Self {
        Self {
            state,
            socket_path: socket_path.to_path_buf(),
            listener: None,
            connection_count: Arc::new(RwLock::new(0)),
        }
    }

    /// Start the IPC server
    pub async fn start(&mut self) -> Result<()> {
        // Clean up any existing socket file
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path)
                .context("Failed to remove existing socket file")?;
        }

        let listener = UnixListener::bind(&self.socket_path)
            .with_context(|| format!("Failed to bind Unix socket {:?}", self.socket_path))?;

        info!(socket_path = %self.socket_path.display(), "IPC server started");

        self.listener = Some(listener);
        Ok(())
    }

    /// Run the server loop, accepting connections
    pub async fn run(&self) -> Result<()> {
        let listener = self.listener.as_ref().context("Server not started")?;

        loop {
            match listener.accept().await {
                Ok((stream, _)) => {
                    let state = self.state.clone();
                    let connection_count = Arc::clone(&self.connection_count);

                    // Spawn a new task to handle this connection
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, state, connection_count).await {
                            error!(error = %e, "Connection handler error");
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }

    /// Stop the IPC server and clean up
    pub fn stop(&self) -> Result<()> {
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path).context("Failed to remove socket file")?;
        }
        info!("IPC server stopped");
        Ok(())
    }
}

/// Handle a single client connection
async fn handle_connection(
    stream: UnixStream,
    state: ServerState,
    connection_count: Arc<RwLock<u32>>,
) -> Result<()> {
    {
        let mut count = connection_count.write().await;
        *count += 1;
        debug!(count = *count, "New connection");
    }

    let (reader, mut writer) = stream.into_split();
    let mut buf_reader = BufReader::new(reader);
    let mut line = String::new();

    loop {
        line.clear();
        match buf_reader.read_line(&mut line).await {
            Ok(0) => {
                debug!("Connection closed by client");
                break;
            }
            Ok(_) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }

                debug!(command = %trimmed, "Received command");

                let response = match parse_command(trimmed.as_bytes()) {
                    Ok(command) => process_command(command, &state).await,
                    Err(e) => {
                        error!(error = %e, command = %trimmed, "Failed to parse command");
                        Response::Error {
                            error: format!("Invalid command: {}", e),
                        }
                    }
                };

                match serialize_response(&response) {
                    Ok(json) => {
                        if let Err(e) = writer.write_all(&json).await {
                            error!(error = %e, "Failed to write response");
                            break;
                        }
                    }
                    Err(e) => error!(error = %e, "Failed to serialize response"),
                }
            }
            Err(e) => {
                error!(error = %e, "Failed to read from socket");
                break;
            }
        }
    }

    {
        let mut count = connection_count.write().await;
        *count = count.saturating_sub(1);
        debug!(count = *count, "Connection ended");
    }

    Ok(())
}

/// Process a command and return a response
pub async fn process_command(command: Command, state: &ServerState) -> Response {
    match command {
        Command::Render { directive } => Response::Html {
            html: embed::render_directive(&state.resolver, &directive).await,
        },

        Command::Resolve { id, animate } => match state.resolver.resolve(id, animate).await {
            Ok(descriptor) => Response::Descriptor { descriptor },
            Err(e) => Response::Error {
                error: e.to_string(),
            },
        },

        Command::Invalidate { id } => {
            info!(id = id, "Processing invalidate command");
            state.resolver.invalidate(id);
            Response::Success {
                message: Some(format!("Invalidated splat {}", id)),
            }
        }

        Command::InvalidateAll => {
            info!("Processing invalidateAll command");
            Response::Cleared {
                cleared: state.resolver.invalidate_all(),
            }
        }

        Command::GetStatus => {
            debug!("Processing getStatus command");
            state.store.log_metrics();
            let (hits, misses, _) = state.store.stats();
            Response::Status {
                version: PROTOCOL_VERSION,
                cache_entries: state.store.entry_count(),
                hits,
                misses,
                mirror_dir: state.resolver.mirror().mirror_dir().display().to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MirrorStore;
    use crate::config::CacheConfig;
    use crate::testing::{record, FakeBackend};
    use std::time::Duration;
    use tokio::io::AsyncReadExt;

    fn state_in(dir: &Path, backend: Arc<FakeBackend>) -> ServerState {
        let config = CacheConfig {
            mirror_dir: dir.join("splats"),
            public_url: "https://site.example/splats".to_string(),
            metadata_ttl: Duration::from_secs(60),
            mirror_ttl: Duration::from_secs(60),
        };
        let store = Arc::new(MemoryCacheStore::new());
        let mirror = MirrorStore::new(config.mirror_dir.clone(), &config.public_url).unwrap();
        let resolver = Arc::new(SplatResolver::new(backend, store.clone(), mirror, &config));
        ServerState { resolver, store }
    }

    #[tokio::test]
    async fn test_resolve_then_invalidate() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(FakeBackend::new());
        backend.add_splat(record(1), b"scene-1");
        let state = state_in(dir.path(), backend.clone());

        let response = process_command(Command::Resolve { id: 1, animate: true }, &state).await;
        match response {
            Response::Descriptor { descriptor } => {
                assert!(descriptor.src.ends_with("splat_1.splat"));
                assert!(descriptor.animate);
            }
            other => panic!("Expected Descriptor, got {:?}", other),
        }

        process_command(Command::Invalidate { id: 1 }, &state).await;
        process_command(Command::Resolve { id: 1, animate: false }, &state).await;
        assert_eq!(backend.fetch_calls(), 2);
    }

    #[tokio::test]
    async fn test_resolve_error_is_a_response() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_in(dir.path(), Arc::new(FakeBackend::new()));

        match process_command(Command::Resolve { id: 0, animate: false }, &state).await {
            Response::Error { error } => assert_eq!(error, "No valid Splat ID provided."),
            other => panic!("Expected Error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_socket_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(FakeBackend::new());
        backend.add_splat(record(2), b"scene-2");
        let state = state_in(dir.path(), backend);
        let socket_path = dir.path().join("splat.sock");

        let mut server = IpcServer::new(state, &socket_path);
        server.start().await.unwrap();
        let handle = tokio::spawn(async move {
            let _ = server.run().await;
        });

        let mut stream = UnixStream::connect(&socket_path).await.unwrap();
        stream
            .write_all(b"{\"type\":\"render\",\"directive\":\"[splat id=2]\"}\n")
            .await
            .unwrap();
        stream.shutdown().await.unwrap();

        let mut reply = String::new();
        stream.read_to_string(&mut reply).await.unwrap();
        assert!(reply.starts_with(r#"{"type":"html""#));
        assert!(reply.contains("gv-splat-viewer"));

        handle.abort();
    }
}
