//! Error taxonomy of the update path.
//!
//! Every variant except `Io`/`Transport` is recoverable per message: the
//! update is rejected, the document stays untouched and the sender's
//! connection stays open.

use crate::path::MutationError;
use crate::registry::RoomId;
use crate::session::SessionId;
use crate::storage::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Path navigation or final-segment write failed.
    #[error(transparent)]
    Mutation(#[from] MutationError),
    #[error("malformed message: {0}")]
    MalformedMessage(String),
    #[error("room not found: {0}")]
    RoomNotFound(RoomId),
    #[error("persistence unavailable: {0}")]
    PersistenceUnavailable(#[from] StoreError),
    /// Per recipient; only that session is dropped.
    #[error("delivery to session {0} failed")]
    DeliveryFailure(SessionId),
    #[error("transport error: {0}")]
    Transport(String),
    /// The client is not connected, or its connection has gone away.
    #[error("connection closed")]
    ConnectionClosed,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SyncError {
    /// Taxonomy name, used in logs and rejection notices.
    pub fn kind(&self) -> &'static str {
        match self {
            SyncError::Mutation(e) => e.kind(),
            SyncError::MalformedMessage(_) => "MalformedMessage",
            SyncError::RoomNotFound(_) => "RoomNotFound",
            SyncError::PersistenceUnavailable(_) => "PersistenceUnavailable",
            SyncError::DeliveryFailure(_) => "DeliveryFailure",
            SyncError::Transport(_) => "Transport",
            SyncError::ConnectionClosed => "ConnectionClosed",
            SyncError::Io(_) => "Io",
        }
    }

    /// Whether the error rejects a single update without affecting the
    /// connection that sent it.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            SyncError::Mutation(_)
                | SyncError::MalformedMessage(_)
                | SyncError::RoomNotFound(_)
                | SyncError::PersistenceUnavailable(_)
        )
    }
}

impl From<crate::protocol::ProtocolError> for SyncError {
    fn from(e: crate::protocol::ProtocolError) -> Self {
        SyncError::MalformedMessage(e.to_string())
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(e: reqwest::Error) -> Self {
        SyncError::Transport(e.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for SyncError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        SyncError::Transport(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ProtocolError;

    #[test]
    fn test_kind_names() {
        let e: SyncError = MutationError::KeyNotFound("x".into()).into();
        assert_eq!(e.kind(), "KeyNotFound");
        assert_eq!(e.to_string(), "key `x` not found");

        let e: SyncError = ProtocolError::DeserializationError("eof".into()).into();
        assert_eq!(e.kind(), "MalformedMessage");

        let e: SyncError = ProtocolError::InvalidEncoding.into();
        assert_eq!(e.kind(), "MalformedMessage");
        assert_eq!(e.to_string(), "malformed message: Frame is not valid UTF-8");

        let e: SyncError = StoreError::DatabaseError("down".into()).into();
        assert_eq!(e.kind(), "PersistenceUnavailable");

        assert_eq!(SyncError::RoomNotFound("abc".into()).to_string(), "room not found: abc");
    }

    #[test]
    fn test_rejections() {
        assert!(SyncError::MalformedMessage("x".into()).is_rejection());
        assert!(SyncError::from(MutationError::InvalidPath).is_rejection());
        assert!(!SyncError::Transport("reset".into()).is_rejection());
        assert!(!SyncError::ConnectionClosed.is_rejection());
        assert!(!SyncError::DeliveryFailure(uuid::Uuid::nil()).is_rejection());
    }
}
