use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::definitions::{BackendKind, StartOptions};

#[derive(Error, Debug)]
pub enum PlayerError {
    #[error("Failed to spawn player process: {0}")]
    Spawn(#[source] io::Error),

    #[error("Player control channel did not become reachable")]
    ChannelUnavailable,

    #[error("Player I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Player rejected command: {0}")]
    Protocol(String),

    #[error("No player process is running")]
    NotRunning,

    #[error("Feature not supported")]
    FeatureNotSupported,
}

/// Capability contract every external player technology implements.
///
/// All operations are best effort against a process that may die at any time. Each control
/// exchange carries its own short timeout; "channel not ready yet" is retried until a bounded
/// deadline instead of failing straight away.
#[async_trait]
pub trait PlayerBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Tears down any previous session (tracked child, stray same-kind processes, stale control
    /// artifacts), spawns the player on `file` and waits a bounded time for the control channel.
    ///
    /// An `Err(ChannelUnavailable)` leaves the process tracked but possibly unusable; callers
    /// stop such a session and start again.
    async fn start(&self, file: &Path, options: StartOptions) -> Result<(), PlayerError>;

    async fn set_playing(&self, playing: bool) -> Result<(), PlayerError>;

    /// Forces position zero, paused, with the first frame visible.
    async fn show_first_frame_paused(&self) -> Result<(), PlayerError>;

    /// Non-blocking end-of-stream query. Errors and missing answers read as "not yet".
    async fn poll_end_of_stream(&self) -> bool;

    async fn is_running(&self) -> bool;

    /// Graceful quit, bounded wait, then force kill. Safe on an already stopped session.
    async fn stop(&self) -> Result<(), PlayerError>;

    async fn loaded_file(&self) -> Option<PathBuf> {
        None
    }
}

/// Cloneable handle to the single live backend.
#[derive(Clone)]
pub struct Player {
    backend: Arc<dyn PlayerBackend>,
}

impl Player {
    pub fn new(backend: Arc<dyn PlayerBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl PlayerBackend for Player {
    fn kind(&self) -> BackendKind {
        self.backend.kind()
    }
    async fn start(&self, file: &Path, options: StartOptions) -> Result<(), PlayerError> {
        self.backend.start(file, options).await
    }
    async fn set_playing(&self, playing: bool) -> Result<(), PlayerError> {
        self.backend.set_playing(playing).await
    }
    async fn show_first_frame_paused(&self) -> Result<(), PlayerError> {
        self.backend.show_first_frame_paused().await
    }
    async fn poll_end_of_stream(&self) -> bool {
        self.backend.poll_end_of_stream().await
    }
    async fn is_running(&self) -> bool {
        self.backend.is_running().await
    }
    async fn stop(&self) -> Result<(), PlayerError> {
        self.backend.stop().await
    }
    async fn loaded_file(&self) -> Option<PathBuf> {
        self.backend.loaded_file().await
    }
}
