//! Shared error type across tablesync crates.

use thiserror::Error;

/// Client-facing error codes (stable API).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientCode {
    /// Frame could not be decoded into an envelope.
    MalformedEnvelope,
    /// No handler is registered for the message name.
    UnhandledMessage,
    /// Payload did not match the message's payload type.
    BadRequest,
    /// Caller is not logged in, not in the session, or not its owner.
    NotAuthorized,
    /// Referenced entity does not exist.
    NotFound,
    /// Entity already exists.
    AlreadyExists,
    /// Key is not held by the garbage buffer.
    NotMarked,
    /// A configured limit would be exceeded.
    LimitExceeded,
    /// The remote side answered a request with an error.
    Rejected,
    /// Connection closed before the operation completed.
    ConnectionClosed,
    /// Internal server error.
    Internal,
}

impl ClientCode {
    /// String representation used in logs and JSON responses.
    pub fn as_str(self) -> &'static str {
        match self {
            ClientCode::MalformedEnvelope => "MALFORMED_ENVELOPE",
            ClientCode::UnhandledMessage => "UNHANDLED_MESSAGE",
            ClientCode::BadRequest => "BAD_REQUEST",
            ClientCode::NotAuthorized => "NOT_AUTHORIZED",
            ClientCode::NotFound => "NOT_FOUND",
            ClientCode::AlreadyExists => "ALREADY_EXISTS",
            ClientCode::NotMarked => "NOT_MARKED",
            ClientCode::LimitExceeded => "LIMIT_EXCEEDED",
            ClientCode::Rejected => "REJECTED",
            ClientCode::ConnectionClosed => "CONNECTION_CLOSED",
            ClientCode::Internal => "INTERNAL",
        }
    }
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, TableSyncError>;

/// Unified error type used by core, gateway and client.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TableSyncError {
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),
    #[error("unhandled message: {0}")]
    UnhandledMessage(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("not authorized: {0}")]
    NotAuthorized(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("already exists: {0}")]
    AlreadyExists(String),
    #[error("not marked for deletion: {0}")]
    NotMarked(String),
    #[error("limit exceeded: {0}")]
    LimitExceeded(String),
    #[error("{0}")]
    Rejected(String),
    #[error("connection closed")]
    ConnectionClosed,
    #[error("internal: {0}")]
    Internal(String),
}

impl TableSyncError {
    /// Map internal error to a stable client-facing code.
    pub fn client_code(&self) -> ClientCode {
        match self {
            TableSyncError::MalformedEnvelope(_) => ClientCode::MalformedEnvelope,
            TableSyncError::UnhandledMessage(_) => ClientCode::UnhandledMessage,
            TableSyncError::BadRequest(_) => ClientCode::BadRequest,
            TableSyncError::NotAuthorized(_) => ClientCode::NotAuthorized,
            TableSyncError::NotFound(_) => ClientCode::NotFound,
            TableSyncError::AlreadyExists(_) => ClientCode::AlreadyExists,
            TableSyncError::NotMarked(_) => ClientCode::NotMarked,
            TableSyncError::LimitExceeded(_) => ClientCode::LimitExceeded,
            TableSyncError::Rejected(_) => ClientCode::Rejected,
            TableSyncError::ConnectionClosed => ClientCode::ConnectionClosed,
            TableSyncError::Internal(_) => ClientCode::Internal,
        }
    }

    /// Only decode and transport failures end a connection; handler-level
    /// errors travel back to the caller inside a Response envelope.
    pub fn is_connection_fatal(&self) -> bool {
        matches!(
            self,
            TableSyncError::MalformedEnvelope(_) | TableSyncError::ConnectionClosed
        )
    }
}
