// Copyright 2025 HEM Sp. z o.o.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Loop mode: one file repeats forever, a trigger plays another file once.
//!
//! The watchdog, the button forwarder and the HTTP handlers all reach the player through
//! [`LoopController`], whose session mutex serializes every start and stop.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use serde::Serialize;
use thiserror::Error;
use tokio::select;
use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;

use crate::button::ButtonInput;
use crate::definitions::StartOptions;
use crate::media_store::{MediaStore, StoreError};
use crate::player::{Player, PlayerBackend, PlayerError};
use crate::service::StopHandle;
use crate::usb::RemovableSync;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackMode {
    Loop,
    Triggered,
    Custom,
}

/// Current mode and the name of the file inside the store, if anything was started.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoopStatus {
    pub mode: PlaybackMode,
    pub file: Option<String>,
}

#[derive(Error, Debug)]
pub enum ControlError {
    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Path outside media store: {0}")]
    OutsideStore(String),

    #[error(transparent)]
    Player(#[from] PlayerError),
}

impl From<StoreError> for ControlError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::OutsideStore(name) => ControlError::OutsideStore(name),
            StoreError::FileNotFound(name) => ControlError::FileNotFound(name),
        }
    }
}

/// Names of the two well-known files, resolved inside the store on every switch.
#[derive(Debug, Clone)]
pub struct LoopTargets {
    pub loop_file: String,
    pub triggered_file: String,
}

impl Default for LoopTargets {
    fn default() -> Self {
        Self {
            loop_file: "loop.mp4".to_string(),
            triggered_file: "triggered.mp4".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct WatchdogConfig {
    pub poll_interval: Duration,
    pub sync_interval: Duration,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(250),
            sync_interval: Duration::from_secs(5),
        }
    }
}

struct LoopSession {
    mode: PlaybackMode,
    file: Option<PathBuf>,
}

pub struct LoopController {
    player: Player,
    store: MediaStore,
    sync: Option<Arc<RemovableSync>>,
    targets: LoopTargets,
    session: Mutex<LoopSession>,
}

impl LoopController {
    pub fn new(
        player: Player,
        store: MediaStore,
        sync: Option<Arc<RemovableSync>>,
        targets: LoopTargets,
    ) -> Self {
        Self {
            player,
            store,
            sync,
            targets,
            session: Mutex::new(LoopSession { mode: PlaybackMode::Loop, file: None }),
        }
    }

    pub async fn status(&self) -> LoopStatus {
        let session = self.session.lock().await;
        Self::status_of(&session)
    }

    fn status_of(session: &LoopSession) -> LoopStatus {
        LoopStatus {
            mode: session.mode,
            file: session.file.as_deref()
                .and_then(Path::file_name)
                .map(|name| name.to_string_lossy().into_owned()),
        }
    }

    pub async fn play_loop(&self) -> Result<LoopStatus, ControlError> {
        let mut session = self.session.lock().await;
        self.start_loop(&mut session).await
    }

    pub async fn play_triggered(&self) -> Result<LoopStatus, ControlError> {
        let path = self.store.resolve(&self.targets.triggered_file)?;
        let mut session = self.session.lock().await;
        self.switch(&mut session, PlaybackMode::Triggered, path, StartOptions::playing()).await
    }

    /// Plays an arbitrary file from the store once, then the watchdog falls back to the loop.
    pub async fn play_custom(&self, name: &str) -> Result<LoopStatus, ControlError> {
        let path = self.store.resolve(name)?;
        let mut session = self.session.lock().await;
        self.switch(&mut session, PlaybackMode::Custom, path, StartOptions::playing()).await
    }

    /// Stops the player for good; used on shutdown.
    pub async fn stop(&self) {
        let mut session = self.session.lock().await;
        if let Err(e) = self.player.stop().await {
            warn!("Failed to stop player: {}", e);
        }
        session.file = None;
    }

    async fn start_loop(&self, session: &mut LoopSession) -> Result<LoopStatus, ControlError> {
        let path = self.store.resolve(&self.targets.loop_file)?;
        self.switch(session, PlaybackMode::Loop, path, StartOptions::looping()).await
    }

    async fn switch(
        &self,
        session: &mut LoopSession,
        mode: PlaybackMode,
        path: PathBuf,
        options: StartOptions,
    ) -> Result<LoopStatus, ControlError> {
        info!("Switching to {:?}: {}", mode, path.display());
        if let Err(e) = self.player.start(&path, options).await {
            warn!("Player start for {} failed: {}", path.display(), e);
            // The watchdog restarts the loop from a clean session.
            if let Err(e) = self.player.stop().await {
                warn!("Failed to stop player: {}", e);
            }
            session.mode = PlaybackMode::Loop;
            session.file = None;
            return Err(e.into());
        }
        session.mode = mode;
        session.file = Some(path);
        Ok(Self::status_of(session))
    }

    /// One watchdog poll. Returns true when it had to restart or fall back.
    pub async fn watchdog_tick(&self) -> bool {
        let mut session = self.session.lock().await;
        let running = self.player.is_running().await;
        let fall_back = match session.mode {
            PlaybackMode::Loop => !running,
            PlaybackMode::Triggered | PlaybackMode::Custom => {
                !running || self.player.poll_end_of_stream().await
            }
        };
        if !fall_back {
            return false;
        }

        if session.mode == PlaybackMode::Loop {
            debug!("Loop player not running; restarting");
        } else {
            info!("{:?} playback finished; back to loop", session.mode);
        }
        if let Err(e) = self.start_loop(&mut session).await {
            debug!("Cannot start loop playback: {}", e);
            session.mode = PlaybackMode::Loop;
            session.file = None;
        }
        true
    }

    /// Applies removable media updates, stopping the player for the copy and resuming the
    /// loop afterwards. Returns true when anything was copied.
    pub async fn sync_tick(&self) -> bool {
        let Some(sync) = self.sync.clone() else { return false; };

        let probe = sync.clone();
        let decisions = match tokio::task::spawn_blocking(move || probe.check_for_updates()).await {
            Ok(decisions) => decisions,
            Err(e) => {
                error!("Removable media probe failed: {}", e);
                return false;
            }
        };
        if decisions.is_empty() {
            return false;
        }

        let mut session = self.session.lock().await;
        info!("Removable media update found; stopping player before copy");
        if let Err(e) = self.player.stop().await {
            warn!("Failed to stop player before copy: {}", e);
        }
        session.file = None;

        let copied = match tokio::task::spawn_blocking(move || sync.apply(&decisions)).await {
            Ok(copied) => copied,
            Err(e) => {
                error!("Removable media copy failed: {}", e);
                false
            }
        };
        if let Err(e) = self.start_loop(&mut session).await {
            warn!("Cannot resume loop playback after sync: {}", e);
            session.mode = PlaybackMode::Loop;
        }
        copied
    }
}

/// Polls the player and removable media until shutdown, then stops the player.
pub async fn run_watchdog(controller: Arc<LoopController>, config: WatchdogConfig, mut stop: StopHandle) {
    let mut poll = tokio::time::interval(config.poll_interval);
    poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut sync = tokio::time::interval(config.sync_interval);
    sync.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!("Watchdog started");
    loop {
        select! {
            biased;
            _ = stop.signaled() => break,
            _ = poll.tick() => {
                controller.watchdog_tick().await;
            }
            _ = sync.tick() => {
                controller.sync_tick().await;
            }
        }
    }
    info!("Watchdog stopping");
    controller.stop().await;
}

/// Turns button presses into triggered playback.
pub async fn run_button_forwarder<B: ButtonInput>(
    controller: Arc<LoopController>,
    mut button: B,
    mut stop: StopHandle,
) {
    loop {
        select! {
            _ = stop.signaled() => break,
            pressed = button.wait_for_press() => match pressed {
                Ok(()) => {
                    if let Err(e) = controller.play_triggered().await {
                        warn!("Button trigger failed: {}", e);
                    }
                }
                Err(e) => {
                    error!("Button input ended: {}", e);
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::button::ChannelButton;
    use crate::service::spawn_service;
    use crate::testing::{BackendCall, MockBackend};
    use crate::usb::sync::tests::{write_file, FakeProbe};
    use crate::usb::SyncConfig;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn store_with_targets() -> TempDir {
        let store = TempDir::new().unwrap();
        write_file(store.path(), "loop.mp4", b"loop", 1_000);
        write_file(store.path(), "triggered.mp4", b"triggered", 1_000);
        write_file(store.path(), "other.mkv", b"other", 1_000);
        store
    }

    fn controller(store: &TempDir, backend: &Arc<MockBackend>) -> LoopController {
        LoopController::new(
            backend.player(),
            MediaStore::new(store.path()),
            None,
            LoopTargets::default(),
        )
    }

    fn status(mode: PlaybackMode, file: &str) -> LoopStatus {
        LoopStatus { mode, file: Some(file.to_string()) }
    }

    #[tokio::test]
    async fn trigger_falls_back_to_loop_at_end_of_stream() {
        let store = store_with_targets();
        let backend = MockBackend::new(2);
        let controller = controller(&store, &backend);

        assert_eq!(controller.play_loop().await.unwrap(), status(PlaybackMode::Loop, "loop.mp4"));
        assert!(!controller.watchdog_tick().await);

        controller.play_triggered().await.unwrap();
        assert_eq!(controller.status().await, status(PlaybackMode::Triggered, "triggered.mp4"));
        assert!(!controller.watchdog_tick().await);
        assert!(controller.watchdog_tick().await);
        assert_eq!(controller.status().await, status(PlaybackMode::Loop, "loop.mp4"));

        let loop_path = store.path().join("loop.mp4");
        assert_eq!(
            backend.take_calls(),
            vec![
                BackendCall::Start(loop_path.clone(), StartOptions::looping()),
                BackendCall::Start(store.path().join("triggered.mp4"), StartOptions::playing()),
                BackendCall::Start(loop_path, StartOptions::looping()),
            ]
        );
    }

    #[tokio::test]
    async fn failed_trigger_start_leaves_loop_for_the_watchdog() {
        let store = store_with_targets();
        let backend = MockBackend::new(2);
        let controller = controller(&store, &backend);
        controller.play_loop().await.unwrap();

        backend.fail_next_start();
        let result = controller.play_triggered().await;
        assert!(matches!(result, Err(ControlError::Player(PlayerError::ChannelUnavailable))));
        assert_eq!(controller.status().await, LoopStatus { mode: PlaybackMode::Loop, file: None });
        assert!(!backend.is_running().await);

        assert!(controller.watchdog_tick().await);
        assert_eq!(controller.status().await, status(PlaybackMode::Loop, "loop.mp4"));
        let loop_path = store.path().join("loop.mp4");
        assert_eq!(
            backend.take_calls(),
            vec![
                BackendCall::Start(loop_path.clone(), StartOptions::looping()),
                BackendCall::Start(store.path().join("triggered.mp4"), StartOptions::playing()),
                BackendCall::Stop,
                BackendCall::Start(loop_path, StartOptions::looping()),
            ]
        );
    }

    #[tokio::test]
    async fn dead_loop_player_is_restarted() {
        let store = store_with_targets();
        let backend = MockBackend::new(1);
        let controller = controller(&store, &backend);

        controller.play_loop().await.unwrap();
        backend.crash();
        assert!(controller.watchdog_tick().await);
        assert_eq!(backend.starts(), 2);
        assert!(backend.is_running().await);
    }

    #[tokio::test]
    async fn custom_file_must_live_in_the_store() {
        let store = store_with_targets();
        let backend = MockBackend::new(1);
        let controller = controller(&store, &backend);
        controller.play_loop().await.unwrap();

        assert!(matches!(
            controller.play_custom("../etc/passwd").await,
            Err(ControlError::OutsideStore(_))
        ));
        assert!(matches!(
            controller.play_custom("missing.mp4").await,
            Err(ControlError::FileNotFound(_))
        ));
        assert_eq!(controller.status().await, status(PlaybackMode::Loop, "loop.mp4"));

        assert_eq!(
            controller.play_custom("other.mkv").await.unwrap(),
            status(PlaybackMode::Custom, "other.mkv")
        );
    }

    #[tokio::test]
    async fn missing_loop_file_leaves_nothing_playing() {
        let store = TempDir::new().unwrap();
        let backend = MockBackend::new(1);
        let controller = controller(&store, &backend);

        assert!(matches!(controller.play_loop().await, Err(ControlError::FileNotFound(_))));
        assert!(controller.watchdog_tick().await);
        assert_eq!(controller.status().await, LoopStatus { mode: PlaybackMode::Loop, file: None });
        assert_eq!(backend.starts(), 0);
    }

    #[tokio::test]
    async fn sync_update_restarts_loop_with_new_content() {
        let store = store_with_targets();
        let usb = TempDir::new().unwrap();
        write_file(usb.path(), "loop.mp4", b"new loop content", 2_000);
        let probe = FakeProbe {
            devices: vec![PathBuf::from("/dev/sdb1")],
            premounted: HashMap::from([(PathBuf::from("/dev/sdb1"), usb.path().to_path_buf())]),
            ..Default::default()
        };
        let sync = Arc::new(RemovableSync::new(Box::new(probe), store.path(), SyncConfig::default()));
        let backend = MockBackend::new(1);
        let controller = LoopController::new(
            backend.player(),
            MediaStore::new(store.path()),
            Some(sync),
            LoopTargets::default(),
        );
        controller.play_loop().await.unwrap();
        backend.take_calls();

        assert!(controller.sync_tick().await);
        assert_eq!(
            backend.take_calls(),
            vec![
                BackendCall::Stop,
                BackendCall::Start(store.path().join("loop.mp4"), StartOptions::looping()),
            ]
        );
        assert_eq!(std::fs::read(store.path().join("loop.mp4")).unwrap(), b"new loop content");

        // Second probe finds nothing new.
        assert!(!controller.sync_tick().await);
        assert!(backend.take_calls().is_empty());
    }

    #[tokio::test]
    async fn button_press_and_watchdog_return_to_loop() {
        let store = store_with_targets();
        let backend = MockBackend::new(3);
        let controller = Arc::new(controller(&store, &backend));
        controller.play_loop().await.unwrap();

        let (presser, button) = ChannelButton::new();
        let forwarder = {
            let controller = controller.clone();
            spawn_service("button", move |stop| run_button_forwarder(controller, button, stop))
        };
        let config = WatchdogConfig {
            poll_interval: Duration::from_millis(2),
            sync_interval: Duration::from_secs(60),
        };
        let watchdog = {
            let controller = controller.clone();
            spawn_service("watchdog", move |stop| run_watchdog(controller, config, stop))
        };

        assert!(presser.press());
        let triggered = store.path().join("triggered.mp4");
        let loop_path = store.path().join("loop.mp4");
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let calls = backend.calls();
                let trigger_at = calls.iter().position(|c| matches!(c, BackendCall::Start(p, _) if p == &triggered));
                if let Some(at) = trigger_at {
                    if calls[at..].iter().any(|c| matches!(c, BackendCall::Start(p, _) if p == &loop_path)) {
                        break;
                    }
                }
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(controller.status().await.mode, PlaybackMode::Loop);

        forwarder.shutdown().await.unwrap();
        watchdog.shutdown().await.unwrap();
        assert!(!backend.is_running().await);
    }
}
