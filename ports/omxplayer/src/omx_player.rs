use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use kiosk_core::definitions::{BackendKind, StartOptions};
use kiosk_core::player::{PlayerBackend, PlayerError};
use kiosk_core::process_supervisor::ProcessSupervisor;
use log::{debug, info};
use tokio::process::Command;
use tokio::sync::Mutex;

#[derive(Debug, Clone)]
pub struct OmxConfig {
    pub program: PathBuf,
    pub base_args: Vec<String>,
    pub stray_names: Vec<String>,
    pub pause_key: u8,
    pub quit_key: u8,
    /// omxplayer ignores keys until its decoder is up; the start-paused key waits this long.
    pub settle_delay: Duration,
    pub quit_grace: Duration,
    pub terminate_grace: Duration,
}

impl Default for OmxConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from("omxplayer"),
            base_args: vec!["--no-osd".to_string(), "-b".to_string()],
            stray_names: vec!["omxplayer".to_string(), "omxplayer.bin".to_string()],
            pause_key: b'p',
            quit_key: b'q',
            settle_delay: Duration::from_millis(500),
            quit_grace: Duration::from_millis(200),
            terminate_grace: Duration::from_secs(1),
        }
    }
}

#[derive(Default)]
struct OmxSession {
    loaded: Option<PathBuf>,
    looping: bool,
    /// omxplayer only knows "toggle", so the current state is tracked here.
    playing: bool,
    /// Started paused and not played since, so the first frame is already on screen.
    fresh_paused: bool,
}

/// omxplayer driven by single key presses on its stdin. Seeking is not available, so the
/// first frame is reached by restarting the process paused, unless it has not played since
/// a paused start.
pub struct OmxKeyPlayer {
    config: OmxConfig,
    supervisor: Mutex<ProcessSupervisor>,
    session: Mutex<OmxSession>,
}

impl OmxKeyPlayer {
    pub fn new(config: OmxConfig) -> Self {
        let supervisor = ProcessSupervisor::new("omxplayer", config.stray_names.clone());
        Self {
            config,
            supervisor: Mutex::new(supervisor),
            session: Mutex::new(OmxSession::default()),
        }
    }

    fn command_for(&self, file: &Path, options: StartOptions) -> Command {
        let mut command = Command::new(&self.config.program);
        command.args(&self.config.base_args);
        if options.looping {
            command.arg("--loop");
        }
        command.arg(file).stdin(Stdio::piped());
        command
    }

    async fn send_key(supervisor: &mut ProcessSupervisor, key: u8) -> Result<(), PlayerError> {
        supervisor.send_input(&[key]).await.map_err(|e| {
            debug!("omxplayer key {:?} not delivered: {}", key as char, e);
            PlayerError::ChannelUnavailable
        })
    }
}

#[async_trait]
impl PlayerBackend for OmxKeyPlayer {
    fn kind(&self) -> BackendKind {
        BackendKind::Omxplayer
    }

    async fn start(&self, file: &Path, options: StartOptions) -> Result<(), PlayerError> {
        let mut session = self.session.lock().await;
        let mut supervisor = self.supervisor.lock().await;
        *session = OmxSession::default();
        supervisor.prepare_for_start(&[], self.config.terminate_grace).await;

        info!("Starting omxplayer on {}", file.display());
        let mut command = self.command_for(file, options);
        supervisor.spawn(&mut command, self.config.terminate_grace).await?;
        session.loaded = Some(file.to_path_buf());
        session.looping = options.looping;
        session.playing = true;

        if options.paused {
            tokio::time::sleep(self.config.settle_delay).await;
            Self::send_key(&mut supervisor, self.config.pause_key).await?;
            session.playing = false;
            session.fresh_paused = true;
        }
        Ok(())
    }

    async fn set_playing(&self, playing: bool) -> Result<(), PlayerError> {
        let mut session = self.session.lock().await;
        let mut supervisor = self.supervisor.lock().await;
        if !supervisor.is_alive() {
            return Err(PlayerError::NotRunning);
        }
        if session.playing != playing {
            Self::send_key(&mut supervisor, self.config.pause_key).await?;
            session.playing = playing;
        }
        if playing {
            session.fresh_paused = false;
        }
        Ok(())
    }

    async fn show_first_frame_paused(&self) -> Result<(), PlayerError> {
        let (file, looping) = {
            let session = self.session.lock().await;
            let file = session.loaded.clone().ok_or(PlayerError::NotRunning)?;
            if session.fresh_paused && self.supervisor.lock().await.is_alive() {
                return Ok(());
            }
            (file, session.looping)
        };
        self.start(&file, StartOptions { paused: true, looping }).await
    }

    /// The process exit is the only end signal this player gives.
    async fn poll_end_of_stream(&self) -> bool {
        let loaded = self.session.lock().await.loaded.is_some();
        loaded && !self.supervisor.lock().await.is_alive()
    }

    async fn is_running(&self) -> bool {
        self.supervisor.lock().await.is_alive()
    }

    async fn stop(&self) -> Result<(), PlayerError> {
        let mut session = self.session.lock().await;
        let mut supervisor = self.supervisor.lock().await;
        if supervisor.is_alive() {
            if Self::send_key(&mut supervisor, self.config.quit_key).await.is_ok() {
                supervisor.wait_exit(self.config.quit_grace).await;
            }
        }
        supervisor.terminate(self.config.terminate_grace).await;
        *session = OmxSession::default();
        Ok(())
    }

    async fn loaded_file(&self) -> Option<PathBuf> {
        self.session.lock().await.loaded.clone()
    }
}
