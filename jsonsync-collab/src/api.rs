//! HTTP document API, served next to the WebSocket listener.
//!
//! ```text
//! POST /upload     <any JSON>  ──► 200 {"uuid": "<room id>"}   | 400 {"error": "Invalid JSON"}
//! GET  /json/{id}              ──► 200 <current document>      | 404 {"error": "UUID not found"}
//! ```
//!
//! The router shares the server's [`CollabHub`], so a document uploaded here
//! is immediately joinable over `/ws/<id>`. [`ApiClient`] is the matching
//! client, used by the `create` and `get` commands of the binary.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::SyncError;
use crate::hub::CollabHub;
use crate::registry::RoomId;

/// Body of a successful upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Created {
    pub uuid: RoomId,
}

/// Body of every API error response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiError {
    pub error: String,
}

/// Routes of the document API.
pub fn router(hub: Arc<CollabHub>) -> Router {
    Router::new()
        .route("/upload", post(upload))
        .route("/json/{id}", get(fetch))
        .with_state(hub)
}

fn error_body(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

async fn upload(State(hub): State<Arc<CollabHub>>, body: Bytes) -> Response {
    let value: Value = match serde_json::from_slice(&body) {
        Ok(value) => value,
        Err(e) => {
            log::debug!("Upload rejected: {e}");
            return error_body(StatusCode::BAD_REQUEST, "Invalid JSON");
        }
    };

    match hub.create_document(&value) {
        Ok(uuid) => Json(Created { uuid }).into_response(),
        Err(e) => {
            log::error!("Upload failed: {e}");
            error_body(StatusCode::INTERNAL_SERVER_ERROR, "Storage error")
        }
    }
}

async fn fetch(State(hub): State<Arc<CollabHub>>, Path(id): Path<String>) -> Response {
    match hub.fetch_document(&id) {
        Ok(value) => Json(value).into_response(),
        Err(SyncError::RoomNotFound(_)) => error_body(StatusCode::NOT_FOUND, "UUID not found"),
        Err(e) => {
            log::error!("Fetch of {id} failed: {e}");
            error_body(StatusCode::INTERNAL_SERVER_ERROR, "Storage error")
        }
    }
}

/// Client for the document API of a running server.
pub struct ApiClient {
    base_url: String,
    http: reqwest::Client,
}

impl ApiClient {
    /// `base_url` is e.g. `http://127.0.0.1:8081`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    /// Upload a document, returning the room id it is reachable under.
    pub async fn upload(&self, document: &Value) -> Result<RoomId, SyncError> {
        let response = self
            .http
            .post(format!("{}/upload", self.base_url))
            .json(document)
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => Ok(response.json::<Created>().await?.uuid),
            StatusCode::BAD_REQUEST => Err(SyncError::MalformedMessage(error_text(response).await)),
            status => Err(unexpected(status, response).await),
        }
    }

    /// Current document of a room.
    pub async fn fetch(&self, id: &str) -> Result<Value, SyncError> {
        let response = self
            .http
            .get(format!("{}/json/{id}", self.base_url))
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => Ok(response.json().await?),
            StatusCode::NOT_FOUND => Err(SyncError::RoomNotFound(id.to_string())),
            status => Err(unexpected(status, response).await),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

async fn error_text(response: reqwest::Response) -> String {
    match response.json::<ApiError>().await {
        Ok(body) => body.error,
        Err(e) => e.to_string(),
    }
}

async fn unexpected(status: StatusCode, response: reqwest::Response) -> SyncError {
    SyncError::Transport(format!("server returned {status}: {}", error_text(response).await))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use tokio::net::TcpListener;

    /// Serve the API on an ephemeral port, returning the hub and a client.
    async fn start_api() -> (Arc<CollabHub>, ApiClient) {
        let hub = Arc::new(CollabHub::new(Arc::new(MemoryStore::new())));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = router(hub.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (hub, ApiClient::new(format!("http://{addr}/")))
    }

    #[tokio::test]
    async fn test_upload_then_fetch() {
        let (hub, client) = start_api().await;
        let doc = json!({"character": {"name": "Aragorn", "age": 87}});

        let id = client.upload(&doc).await.unwrap();
        assert!(hub.ensure_room(&id).is_ok());
        assert_eq!(client.fetch(&id).await.unwrap(), doc);
    }

    #[tokio::test]
    async fn test_fetch_sees_updates() {
        let (hub, client) = start_api().await;
        let id = client.upload(&json!({"items": ["ring", "cloak"]})).await.unwrap();

        hub.submit(&id, r#"{"path":"items.1","value":"sword"}"#).await.unwrap();
        assert_eq!(
            client.fetch(&id).await.unwrap(),
            json!({"items": ["ring", "sword"]})
        );
    }

    #[tokio::test]
    async fn test_fetch_unknown_is_not_found() {
        let (_hub, client) = start_api().await;
        let err = client.fetch("missing").await.unwrap_err();
        assert_eq!(err.kind(), "RoomNotFound");
    }

    #[tokio::test]
    async fn test_upload_invalid_json() {
        let (_hub, client) = start_api().await;
        let response = reqwest::Client::new()
            .post(format!("{}/upload", client.base_url()))
            .body("{not json")
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: ApiError = response.json().await.unwrap();
        assert_eq!(body.error, "Invalid JSON");
    }

    #[test]
    fn test_base_url_trimmed() {
        assert_eq!(ApiClient::new("http://h:1/").base_url(), "http://h:1");
    }
}
