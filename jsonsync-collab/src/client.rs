//! WebSocket client for a shared document room.
//!
//! Provides:
//! - Connection lifecycle (connect, close)
//! - Sending path updates
//! - Events for remote updates and rejection notices

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::{mpsc, RwLock};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

use crate::error::SyncError;
use crate::protocol::{RejectionNotice, ServerFrame, UpdateMessage};
use crate::registry::RoomId;

/// Client connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Events emitted by the sync client.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    Connected,
    Disconnected,
    /// An accepted update broadcast to the room (own updates included)
    RemoteUpdate(UpdateMessage),
    /// The server rejected one of our updates
    Rejected(RejectionNotice),
}

pub struct SyncClient {
    room: RoomId,
    server_url: String,
    state: Arc<RwLock<ConnectionState>>,
    outgoing_tx: Option<mpsc::Sender<Message>>,
    event_tx: mpsc::Sender<SyncEvent>,
    event_rx: Option<mpsc::Receiver<SyncEvent>>,
}

impl SyncClient {
    /// `server_url` is the base, e.g. `ws://127.0.0.1:8080`.
    pub fn new(room: impl Into<RoomId>, server_url: impl Into<String>) -> Self {
        let (event_tx, event_rx) = mpsc::channel(256);
        Self {
            room: room.into(),
            server_url: server_url.into(),
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            outgoing_tx: None,
            event_tx,
            event_rx: Some(event_rx),
        }
    }

    /// Take the event receiver (can only be called once).
    pub fn take_event_rx(&mut self) -> Option<mpsc::Receiver<SyncEvent>> {
        self.event_rx.take()
    }

    pub fn url(&self) -> String {
        format!("{}/ws/{}", self.server_url.trim_end_matches('/'), self.room)
    }

    /// Connect and spawn the reader and writer tasks.
    pub async fn connect(&mut self) -> Result<(), SyncError> {
        *self.state.write().await = ConnectionState::Connecting;

        let ws_stream = match tokio_tungstenite::connect_async(self.url()).await {
            Ok((ws_stream, _)) => ws_stream,
            Err(e) => {
                *self.state.write().await = ConnectionState::Disconnected;
                return Err(match e {
                    WsError::Http(response) if response.status() == StatusCode::NOT_FOUND => {
                        SyncError::RoomNotFound(self.room.clone())
                    }
                    other => SyncError::from(other),
                });
            }
        };
        let (mut ws_writer, mut ws_reader) = ws_stream.split();

        let (out_tx, mut out_rx) = mpsc::channel::<Message>(256);
        self.outgoing_tx = Some(out_tx);

        tokio::spawn(async move {
            while let Some(msg) = out_rx.recv().await {
                let closing = matches!(msg, Message::Close(_));
                if ws_writer.send(msg).await.is_err() || closing {
                    break;
                }
            }
        });

        *self.state.write().await = ConnectionState::Connected;
        let _ = self.event_tx.send(SyncEvent::Connected).await;

        let event_tx = self.event_tx.clone();
        let state = self.state.clone();
        tokio::spawn(async move {
            while let Some(msg) = ws_reader.next().await {
                let text = match msg {
                    Ok(Message::Text(text)) => text.as_str().to_string(),
                    Ok(Message::Binary(data)) => match String::from_utf8(data.to_vec()) {
                        Ok(text) => text,
                        Err(_) => continue,
                    },
                    Ok(Message::Close(_)) | Err(_) => break,
                    Ok(_) => continue,
                };
                let event = match ServerFrame::decode(&text) {
                    Ok(ServerFrame::Update(update)) => SyncEvent::RemoteUpdate(update),
                    Ok(ServerFrame::Rejected(notice)) => SyncEvent::Rejected(notice),
                    Err(e) => {
                        log::debug!("Ignoring undecodable frame: {e}");
                        continue;
                    }
                };
                if event_tx.send(event).await.is_err() {
                    break;
                }
            }

            *state.write().await = ConnectionState::Disconnected;
            let _ = event_tx.send(SyncEvent::Disconnected).await;
        });

        Ok(())
    }

    /// Send a `{path, value}` update.
    pub async fn send_update(&self, path: &str, value: Value) -> Result<(), SyncError> {
        let encoded = UpdateMessage::new(path, value).encode()?;
        self.send_raw(encoded).await
    }

    /// Send an arbitrary text frame.
    pub async fn send_raw(&self, text: impl Into<String>) -> Result<(), SyncError> {
        self.send(Message::Text(text.into().into())).await
    }

    /// Ask the server to close the connection.
    pub async fn close(&self) -> Result<(), SyncError> {
        self.send(Message::Close(None)).await
    }

    async fn send(&self, msg: Message) -> Result<(), SyncError> {
        if *self.state.read().await != ConnectionState::Connected {
            return Err(SyncError::ConnectionClosed);
        }
        let tx = self.outgoing_tx.as_ref().ok_or(SyncError::ConnectionClosed)?;
        tx.send(msg).await.map_err(|_| SyncError::ConnectionClosed)
    }

    pub async fn connection_state(&self) -> ConnectionState {
        *self.state.read().await
    }

    pub fn room(&self) -> &str {
        &self.room
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }
}
