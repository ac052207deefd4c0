//! Error types for the manager session.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to connect to manager at {addr}: {source}")]
    Connection {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to log in with username {username}: {message}")]
    Auth { username: String, message: String },

    #[error(transparent)]
    Credential(#[from] CredentialError),

    #[error("manager protocol error: {0}")]
    Protocol(String),

    #[error("timed out waiting for {0}")]
    Timeout(&'static str),

    #[error(transparent)]
    Codec(#[from] CodecError),
}

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("no username provided (use -u flag)")]
    MissingUsername,

    #[error("no password specified, and password discovery is only attempted for local connections (host {0})")]
    RemoteHost(String),

    #[error("no password specified, and failed to read {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no password specified, and no secret for user {username} in {path}")]
    NotFound { username: String, path: PathBuf },
}

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("manager message exceeds {0} bytes")]
    TooLarge(usize),

    #[error("manager io error: {0}")]
    Io(#[from] std::io::Error),
}
