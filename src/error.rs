//! Error types for the add-track core

use std::time::Duration;
use thiserror::Error;

/// Failure talking to the music service
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },
    #[error("Spotify API error: {0}")]
    Client(#[from] rspotify::ClientError),
    #[error("invalid Spotify id: {0}")]
    InvalidId(#[from] rspotify::model::IdError),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("request rejected: {0}")]
    Rejected(String),
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("no target playlist configured")]
    ConfigMissing,
    #[error("nothing is currently playing")]
    NotPlaying,
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error("cache I/O failed: {0}")]
    CacheIo(#[from] std::io::Error),
    #[error("cache snapshot could not be encoded: {0}")]
    CacheFormat(#[from] serde_json::Error),
    #[error("sync of playlist {playlist_id} aborted: {source}")]
    SyncAborted {
        playlist_id: String,
        #[source]
        source: RemoteError,
    },
}

/// Failure starting the global key listener
#[derive(Debug, Error)]
pub enum HotkeyError {
    #[error("global key state unavailable: {0}")]
    Unavailable(&'static str),
    #[error("hotkey listener exited during startup")]
    ListenerExited,
}

/// Run a remote call with an upper bound on how long it may take.
pub async fn with_timeout<T, F>(
    operation: &'static str,
    after: Duration,
    call: F,
) -> Result<T, RemoteError>
where
    F: std::future::Future<Output = Result<T, RemoteError>>,
{
    match tokio::time::timeout(after, call).await {
        Ok(result) => result,
        Err(_) => Err(RemoteError::Timeout { operation, after }),
    }
}
