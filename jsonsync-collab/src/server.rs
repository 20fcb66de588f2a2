//! WebSocket sync server with room-based document routing.
//!
//! Architecture:
//! ```text
//! Client A ──┐  ws://host/ws/<room>
//!             ├── handshake: 404 unless the gateway holds <room>
//! Client B ──┘        │
//!                     ▼
//!               connection task (one per socket)
//!                 ├── inbound frame ──► CollabHub::submit ──► gateway
//!                 └── session outbox ◄── Fanout ◄────────────┘
//! ```
//!
//! A connection ends on close, read error, write error, or when the fanout
//! drops its session (the outbox closes once the registry lets go of it).
//!
//! The document API (`POST /upload`, `GET /json/{id}`, see [`crate::api`])
//! is served on `http_addr` by the same process, over the same hub.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::RwLock;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::Message;

use crate::api;
use crate::error::SyncError;
use crate::hub::CollabHub;
use crate::protocol::{ProtocolError, RejectionNotice};
use crate::registry::RoomId;
use crate::session::{Session, SessionHandle, SessionState};
use crate::storage::{DocumentGateway, MemoryStore, RocksStore, StoreConfig};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the WebSocket listener to
    pub bind_addr: String,
    /// Address to bind the document API to
    pub http_addr: String,
    /// Outbox capacity per session; a session this far behind is dropped.
    /// A connection does not drain its outbox while its own update waits
    /// for the room lock, so a room with more concurrent writers than this
    /// can evict a writer that is merely queued. Size it above the expected
    /// writers per room.
    pub session_buffer: usize,
    /// RocksDB path (None = in-memory only)
    pub storage_path: Option<PathBuf>,
    /// Send a rejection notice to the sender of a rejected update
    pub notify_rejections: bool,
    /// Interval between expired-document sweeps (0 = never)
    pub sweep_interval_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            http_addr: "127.0.0.1:8081".to_string(),
            session_buffer: 256,
            storage_path: None,
            notify_rejections: false,
            sweep_interval_secs: 3600,
        }
    }
}

impl ServerConfig {
    /// Defaults overridden by `JSONSYNC_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(addr) = lookup("JSONSYNC_BIND_ADDR") {
            config.bind_addr = addr;
        }
        if let Some(addr) = lookup("JSONSYNC_HTTP_ADDR") {
            config.http_addr = addr;
        }
        if let Some(buffer) = parse_var(&lookup, "JSONSYNC_SESSION_BUFFER") {
            config.session_buffer = buffer;
        }
        if let Some(path) = lookup("JSONSYNC_STORAGE_PATH").filter(|p| !p.is_empty()) {
            config.storage_path = Some(PathBuf::from(path));
        }
        if let Some(notify) = parse_var(&lookup, "JSONSYNC_NOTIFY_REJECTIONS") {
            config.notify_rejections = notify;
        }
        if let Some(secs) = parse_var(&lookup, "JSONSYNC_SWEEP_INTERVAL_SECS") {
            config.sweep_interval_secs = secs;
        }
        config
    }

    /// Base URL of the document API, for clients on this host.
    pub fn api_url(&self) -> String {
        match self.http_addr.strip_prefix("0.0.0.0:") {
            Some(port) => format!("http://127.0.0.1:{port}"),
            None => format!("http://{}", self.http_addr),
        }
    }
}

fn parse_var<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            log::warn!("Ignoring {key}={raw:?}: not a valid value");
            None
        }
    }
}

/// Server statistics.
#[derive(Debug, Clone, Default)]
pub struct ServerStats {
    pub total_connections: u64,
    pub active_connections: u64,
    pub refused_connections: u64,
    pub total_messages: u64,
    pub applied_updates: u64,
    pub rejected_updates: u64,
}

/// Extract the room id from `/ws/<room>` or `/<room>`.
fn room_from_path(path: &str) -> Option<RoomId> {
    let rest = path.strip_prefix('/')?;
    let room = rest.strip_prefix("ws/").unwrap_or(rest);
    (!room.is_empty() && !room.contains('/')).then(|| room.to_string())
}

fn error_response(status: StatusCode, body: &str) -> ErrorResponse {
    let mut response = ErrorResponse::new(Some(body.to_string()));
    *response.status_mut() = status;
    response
}

/// The sync server.
pub struct SyncServer {
    config: ServerConfig,
    hub: Arc<CollabHub>,
    stats: Arc<RwLock<ServerStats>>,
}

impl SyncServer {
    /// Create a server, opening RocksDB if a storage path is configured.
    pub fn new(config: ServerConfig) -> Result<Self, SyncError> {
        let gateway: Arc<dyn DocumentGateway> = match &config.storage_path {
            Some(path) => Arc::new(RocksStore::open(StoreConfig {
                path: path.clone(),
                ..StoreConfig::default()
            })?),
            None => Arc::new(MemoryStore::new()),
        };
        Ok(Self::with_gateway(config, gateway))
    }

    pub fn with_gateway(config: ServerConfig, gateway: Arc<dyn DocumentGateway>) -> Self {
        Self {
            config,
            hub: Arc::new(CollabHub::new(gateway)),
            stats: Arc::new(RwLock::new(ServerStats::default())),
        }
    }

    /// Bind both configured addresses and serve forever.
    pub async fn run(&self) -> Result<(), SyncError> {
        let ws_listener = TcpListener::bind(&self.config.bind_addr).await?;
        let http_listener = TcpListener::bind(&self.config.http_addr).await?;
        tokio::try_join!(self.serve(ws_listener), self.serve_http(http_listener))?;
        Ok(())
    }

    /// Serve the document API from an already bound listener.
    pub async fn serve_http(&self, listener: TcpListener) -> Result<(), SyncError> {
        log::info!("Document API listening on {}", listener.local_addr()?);
        axum::serve(listener, api::router(self.hub.clone())).await?;
        Ok(())
    }

    /// Serve connections from an already bound listener.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), SyncError> {
        log::info!("Sync server listening on {}", listener.local_addr()?);
        let sweeper = self.spawn_sweeper();

        let result = loop {
            let (stream, addr) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => break Err(SyncError::from(e)),
            };
            log::debug!("New TCP connection from {addr}");

            let hub = self.hub.clone();
            let stats = self.stats.clone();
            let config = self.config.clone();
            tokio::spawn(async move {
                if let Err(e) = Self::handle_connection(stream, addr, hub, stats, config).await {
                    log::error!("Connection error from {addr}: {e}");
                }
            });
        };

        if let Some(sweeper) = sweeper {
            sweeper.abort();
        }
        result
    }

    fn spawn_sweeper(&self) -> Option<tokio::task::JoinHandle<()>> {
        if self.config.sweep_interval_secs == 0 {
            return None;
        }
        let hub = self.hub.clone();
        let period = Duration::from_secs(self.config.sweep_interval_secs);
        Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await;
            loop {
                interval.tick().await;
                if let Err(e) = hub.gateway().purge_expired() {
                    log::error!("Expired document sweep failed: {e}");
                }
            }
        }))
    }

    /// Handle a single WebSocket connection.
    async fn handle_connection(
        stream: TcpStream,
        addr: SocketAddr,
        hub: Arc<CollabHub>,
        stats: Arc<RwLock<ServerStats>>,
        config: ServerConfig,
    ) -> Result<(), SyncError> {
        let mut room: Option<RoomId> = None;
        let callback = |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
            let Some(id) = room_from_path(request.uri().path()) else {
                return Err(error_response(StatusCode::NOT_FOUND, "Unknown route"));
            };
            match hub.ensure_room(&id) {
                Ok(()) => {
                    room = Some(id);
                    Ok(response)
                }
                Err(SyncError::RoomNotFound(_)) => {
                    Err(error_response(StatusCode::NOT_FOUND, "UUID not found"))
                }
                Err(e) => {
                    log::error!("Room lookup for {id} failed: {e}");
                    Err(error_response(StatusCode::INTERNAL_SERVER_ERROR, "Storage error"))
                }
            }
        };

        let handshake = tokio_tungstenite::accept_hdr_async(stream, callback).await;
        let (ws_stream, room) = match (handshake, room) {
            (Ok(ws_stream), Some(room)) => (ws_stream, room),
            (result, _) => {
                if let Err(e) = result {
                    log::info!("Refused WebSocket handshake from {addr}: {e}");
                }
                stats.write().await.refused_connections += 1;
                return Ok(());
            }
        };
        let (mut ws_sender, mut ws_receiver) = ws_stream.split();

        let (handle, mut outbox) = SessionHandle::channel(config.session_buffer);
        let mut session = Session::new(handle.id(), &room);
        if let Err(e) = hub.join(&room, handle).await {
            log::warn!("Join of {addr} to room {room} failed: {e}");
            let _ = ws_sender.send(Message::Close(None)).await;
            stats.write().await.refused_connections += 1;
            return Ok(());
        }
        session.advance(SessionState::Joined);
        log::info!("WebSocket connection from {addr} joined room {room} as {}", session.id());

        {
            let mut s = stats.write().await;
            s.total_connections += 1;
            s.active_connections += 1;
        }

        let outcome = loop {
            tokio::select! {
                msg = ws_receiver.next() => {
                    let frame = match msg {
                        Some(Ok(Message::Text(text))) => Ok(text.as_str().to_string()),
                        Some(Ok(Message::Binary(data))) => String::from_utf8(data.to_vec())
                            .map_err(|_| ProtocolError::InvalidEncoding),
                        Some(Ok(Message::Ping(data))) => {
                            if let Err(e) = ws_sender.send(Message::Pong(data)).await {
                                break Err(SyncError::from(e));
                            }
                            continue;
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            log::info!("Connection closed from {addr}");
                            break Ok(());
                        }
                        Some(Err(e)) => {
                            log::warn!("WebSocket read failed from {addr}: {e}");
                            break Ok(());
                        }
                        Some(Ok(_)) => continue,
                    };

                    session.advance(SessionState::Active);
                    stats.write().await.total_messages += 1;

                    let result = match frame {
                        Ok(text) => hub.submit(&room, &text).await,
                        Err(e) => Err(SyncError::from(e)),
                    };
                    match result {
                        Ok(report) => {
                            stats.write().await.applied_updates += 1;
                            log::debug!(
                                "Room {room}: update from {} reached {} session(s)",
                                session.id(),
                                report.delivered
                            );
                        }
                        Err(e) => {
                            log::warn!("Room {room}: rejected update from {}: {e}", session.id());
                            stats.write().await.rejected_updates += 1;
                            if config.notify_rejections && e.is_rejection() {
                                let notice = RejectionNotice::new(e.kind(), e.to_string());
                                if let Ok(encoded) = notice.encode() {
                                    if let Err(e) = ws_sender.send(Message::Text(encoded.into())).await {
                                        break Err(SyncError::from(e));
                                    }
                                }
                            }
                        }
                    }
                }

                outgoing = outbox.recv() => {
                    match outgoing {
                        Some(payload) => {
                            if let Err(e) = ws_sender.send(Message::Text(payload.to_string().into())).await {
                                log::warn!("Write to {addr} failed: {e}");
                                break Ok(());
                            }
                        }
                        None => {
                            log::info!("Session {} dropped from room {room}", session.id());
                            let _ = ws_sender.send(Message::Close(None)).await;
                            break Ok(());
                        }
                    }
                }
            }
        };

        session.advance(SessionState::Left);
        hub.leave(&room, &session.id()).await;
        {
            let mut s = stats.write().await;
            s.active_connections = s.active_connections.saturating_sub(1);
        }

        outcome
    }

    /// Get server statistics.
    pub async fn stats(&self) -> ServerStats {
        self.stats.read().await.clone()
    }

    pub fn hub(&self) -> &Arc<CollabHub> {
        &self.hub
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn bind_addr(&self) -> &str {
        &self.config.bind_addr
    }
}
