use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use kiosk_core::definitions::{BackendKind, StartOptions};
use kiosk_core::player::{PlayerBackend, PlayerError};
use kiosk_core::process_supervisor::{remove_artifact, ProcessSupervisor};
use log::{debug, info, warn};
use serde_json::json;
use tokio::process::Command;
use tokio::sync::Mutex;

use crate::ipc::{IpcTimings, MpvIpc};

#[derive(Debug, Clone)]
pub struct MpvConfig {
    pub program: PathBuf,
    /// Arguments placed before the IPC server option and the file.
    pub base_args: Vec<String>,
    pub socket_path: PathBuf,
    /// Process names swept before every start.
    pub stray_names: Vec<String>,
    pub ipc: IpcTimings,
    pub ready_attempts: u32,
    pub ready_interval: Duration,
    pub quit_grace: Duration,
    pub terminate_grace: Duration,
}

impl Default for MpvConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from("mpv"),
            base_args: [
                "--fs",
                "--pause",
                "--keep-open=always",
                "--idle=yes",
                "--no-osd-bar",
                "--really-quiet",
            ]
            .iter()
            .map(|arg| arg.to_string())
            .collect(),
            socket_path: PathBuf::from("/tmp/mpv-video-sock"),
            stray_names: vec!["mpv".to_string()],
            ipc: IpcTimings::default(),
            ready_attempts: 50,
            ready_interval: Duration::from_millis(50),
            quit_grace: Duration::from_millis(200),
            terminate_grace: Duration::from_secs(1),
        }
    }
}

struct MpvSession {
    supervisor: ProcessSupervisor,
    loaded: Option<PathBuf>,
}

/// mpv kept alive across previews; the paused first frame stays on screen between plays.
pub struct MpvIpcPlayer {
    config: MpvConfig,
    ipc: MpvIpc,
    session: Mutex<MpvSession>,
}

impl MpvIpcPlayer {
    pub fn new(config: MpvConfig) -> Self {
        let ipc = MpvIpc::new(config.socket_path.clone(), config.ipc.clone());
        let supervisor = ProcessSupervisor::new("mpv", config.stray_names.clone());
        Self {
            config,
            ipc,
            session: Mutex::new(MpvSession { supervisor, loaded: None }),
        }
    }

    fn command_for(&self, file: &Path, options: StartOptions) -> Command {
        let mut command = Command::new(&self.config.program);
        command
            .args(&self.config.base_args)
            .arg(format!("--input-ipc-server={}", self.config.socket_path.display()));
        if options.looping {
            command.arg("--loop-file=inf");
        }
        command.arg(file).stdin(Stdio::null());
        command
    }

    /// Waits for the socket file to show up. Gives up early when the process died.
    async fn wait_for_socket(&self, session: &mut MpvSession) -> Result<(), PlayerError> {
        for _ in 0..self.config.ready_attempts {
            if self.config.socket_path.exists() {
                return Ok(());
            }
            if !session.supervisor.is_alive() {
                break;
            }
            tokio::time::sleep(self.config.ready_interval).await;
        }
        Err(PlayerError::ChannelUnavailable)
    }

    async fn ensure_running(&self) -> Result<(), PlayerError> {
        if self.session.lock().await.supervisor.is_alive() {
            Ok(())
        } else {
            Err(PlayerError::NotRunning)
        }
    }
}

#[async_trait]
impl PlayerBackend for MpvIpcPlayer {
    fn kind(&self) -> BackendKind {
        BackendKind::Mpv
    }

    async fn start(&self, file: &Path, options: StartOptions) -> Result<(), PlayerError> {
        let mut session = self.session.lock().await;
        session.loaded = None;
        session
            .supervisor
            .prepare_for_start(&[&self.config.socket_path], self.config.terminate_grace)
            .await;

        info!("Starting mpv on {}", file.display());
        let mut command = self.command_for(file, options);
        session.supervisor.spawn(&mut command, self.config.terminate_grace).await?;
        session.loaded = Some(file.to_path_buf());

        let ready = self.wait_for_socket(&mut session).await;
        if options.paused {
            return ready;
        }
        // mpv was spawned with --pause; a late socket still gets the unpause within the
        // command deadline.
        if ready.is_err() {
            debug!("mpv socket not up yet, retrying unpause");
        }
        self.ipc.command(json!(["set_property", "pause", false])).await
    }

    async fn set_playing(&self, playing: bool) -> Result<(), PlayerError> {
        self.ensure_running().await?;
        self.ipc.command(json!(["set_property", "pause", !playing])).await
    }

    async fn show_first_frame_paused(&self) -> Result<(), PlayerError> {
        self.ensure_running().await?;
        self.ipc.command(json!(["set_property", "pause", true])).await?;
        self.ipc.command(json!(["seek", 0, "absolute", "exact"])).await?;
        self.ipc.command(json!(["frame-step"])).await
    }

    async fn poll_end_of_stream(&self) -> bool {
        self.ipc.get_bool_property("eof-reached").await.unwrap_or(false)
    }

    async fn is_running(&self) -> bool {
        self.session.lock().await.supervisor.is_alive()
    }

    async fn stop(&self) -> Result<(), PlayerError> {
        let mut session = self.session.lock().await;
        if session.supervisor.is_alive() {
            if let Err(e) = self.ipc.command(json!(["quit"])).await {
                debug!("mpv quit command failed: {}", e);
            }
            if !session.supervisor.wait_exit(self.config.quit_grace).await {
                warn!("mpv did not quit in time, terminating");
            }
        }
        session.supervisor.terminate(self.config.terminate_grace).await;
        session.loaded = None;
        remove_artifact(self.ipc.socket_path());
        Ok(())
    }

    async fn loaded_file(&self) -> Option<PathBuf> {
        self.session.lock().await.loaded.clone()
    }
}
