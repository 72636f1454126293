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

//! Button mode playback state machine.
//!
//! One loop owns the player session. Every cycle starts with a removable media probe, so an
//! update that arrived during playback is honoured before the next preview.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::select;
use tokio::sync::watch;

use crate::button::{ButtonError, ButtonInput};
use crate::definitions::StartOptions;
use crate::media_store::MediaStore;
use crate::player::{Player, PlayerBackend};
use crate::service::StopHandle;
use crate::usb::{RemovableSync, SyncDecision};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrchestratorState {
    Idle,
    PausedAtFirstFrame(PathBuf),
    AwaitingButton(PathBuf),
    Playing(PathBuf),
    SyncInProgress,
}

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Sleep between polls while the store holds nothing playable.
    pub idle_retry: Duration,
    /// End-of-stream polling interval during playback.
    pub end_poll_interval: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            idle_retry: Duration::from_secs(2),
            end_poll_interval: Duration::from_millis(100),
        }
    }
}

/// How a single cycle ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    NoPlayableFile,
    PlayedUpdate(PathBuf),
    PlayedOnButton(PathBuf),
    /// The session did not come up or did not take the play command; it was torn down.
    PlayerUnavailable,
    ButtonClosed,
}

pub struct Orchestrator<B: ButtonInput> {
    player: Player,
    sync: Arc<RemovableSync>,
    store: MediaStore,
    button: B,
    config: OrchestratorConfig,
    last_loaded: Option<PathBuf>,
    state_tx: watch::Sender<OrchestratorState>,
}

impl<B: ButtonInput> Orchestrator<B> {
    pub fn new(
        player: Player,
        sync: Arc<RemovableSync>,
        store: MediaStore,
        button: B,
        config: OrchestratorConfig,
    ) -> Self {
        let (state_tx, _) = watch::channel(OrchestratorState::Idle);
        Self { player, sync, store, button, config, last_loaded: None, state_tx }
    }

    pub fn state(&self) -> OrchestratorState {
        self.state_tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<OrchestratorState> {
        self.state_tx.subscribe()
    }

    fn set_state(&self, state: OrchestratorState) {
        debug!("Orchestrator state: {:?}", state);
        self.state_tx.send_replace(state);
    }

    /// Runs cycles until shutdown is requested, then stops the player.
    pub async fn run(mut self, mut stop: StopHandle) {
        info!("Orchestrator started");
        loop {
            select! {
                biased;
                _ = stop.signaled() => {
                    info!("Orchestrator shutdown requested");
                    break;
                }
                outcome = self.run_cycle() => {
                    if outcome == CycleOutcome::ButtonClosed {
                        error!("Button input closed; stopping orchestrator");
                        break;
                    }
                    debug!("Cycle finished: {:?}", outcome);
                }
            }
        }
        if let Err(e) = self.player.stop().await {
            warn!("Failed to stop player on shutdown: {}", e);
        }
        self.set_state(OrchestratorState::Idle);
    }

    /// One pass through sync check, preview, button wait and playback.
    pub async fn run_cycle(&mut self) -> CycleOutcome {
        let decisions = self.probe_updates().await;
        if !decisions.is_empty() {
            if let Some(file) = self.apply_updates(decisions).await {
                self.play_to_end(file.clone()).await;
                return CycleOutcome::PlayedUpdate(file);
            }
        }

        let Some(newest) = self.store.pick_newest() else {
            debug!("No playable file in {}", self.store.root().display());
            self.set_state(OrchestratorState::Idle);
            tokio::time::sleep(self.config.idle_retry).await;
            return CycleOutcome::NoPlayableFile;
        };
        let file = newest.path;

        let reload = self.last_loaded.as_ref() != Some(&file) || !self.player.is_running().await;
        if reload {
            info!("Loading {}", file.display());
            if let Err(e) = self.player.start(&file, StartOptions::paused()).await {
                warn!("Player start for {} failed: {}", file.display(), e);
                return self.abandon_session().await;
            }
            self.last_loaded = Some(file.clone());
        }
        if let Err(e) = self.player.show_first_frame_paused().await {
            warn!("Failed to show first frame: {}", e);
        }
        self.set_state(OrchestratorState::PausedAtFirstFrame(file.clone()));

        self.button.discard_pending();
        self.set_state(OrchestratorState::AwaitingButton(file.clone()));
        info!("Waiting for button");
        match self.button.wait_for_press().await {
            Ok(()) => {}
            Err(ButtonError::Closed) => return CycleOutcome::ButtonClosed,
            Err(e) => {
                error!("Button failure: {}", e);
                return CycleOutcome::ButtonClosed;
            }
        }

        info!("Button pressed, playing {}", file.display());
        if let Err(e) = self.player.set_playing(true).await {
            warn!("Failed to start playback: {}", e);
            return self.abandon_session().await;
        }
        self.play_to_end(file.clone()).await;
        CycleOutcome::PlayedOnButton(file)
    }

    async fn probe_updates(&mut self) -> Vec<SyncDecision> {
        let sync = self.sync.clone();
        match tokio::task::spawn_blocking(move || sync.check_for_updates()).await {
            Ok(decisions) => decisions,
            Err(e) => {
                error!("Removable media probe failed: {}", e);
                Vec::new()
            }
        }
    }

    /// Stops the session, copies, and starts the newest file unpaused when anything changed.
    async fn apply_updates(&mut self, decisions: Vec<SyncDecision>) -> Option<PathBuf> {
        self.set_state(OrchestratorState::SyncInProgress);
        info!("Removable media update found; stopping player before copy");
        if let Err(e) = self.player.stop().await {
            warn!("Failed to stop player before copy: {}", e);
        }
        self.last_loaded = None;

        let sync = self.sync.clone();
        let copied = match tokio::task::spawn_blocking(move || sync.apply(&decisions)).await {
            Ok(copied) => copied,
            Err(e) => {
                error!("Removable media copy failed: {}", e);
                false
            }
        };
        if !copied {
            info!("Nothing was copied");
            self.set_state(OrchestratorState::Idle);
            return None;
        }

        let file = self.store.pick_newest()?.path;
        info!("Playing updated {}", file.display());
        if let Err(e) = self.player.start(&file, StartOptions::playing()).await {
            warn!("Player start for {} failed: {}", file.display(), e);
            self.stop_session().await;
            return None;
        }
        self.last_loaded = Some(file.clone());
        Some(file)
    }

    /// Tears down a session that cannot be driven, so the next cycle starts a fresh one
    /// instead of polling a player that will never reach its end.
    async fn abandon_session(&mut self) -> CycleOutcome {
        self.stop_session().await;
        tokio::time::sleep(self.config.idle_retry).await;
        CycleOutcome::PlayerUnavailable
    }

    async fn stop_session(&mut self) {
        if let Err(e) = self.player.stop().await {
            warn!("Failed to stop player: {}", e);
        }
        self.last_loaded = None;
        self.set_state(OrchestratorState::Idle);
    }

    /// Polls until end-of-stream or process death, then returns to the sync check.
    async fn play_to_end(&mut self, file: PathBuf) {
        self.set_state(OrchestratorState::Playing(file));
        loop {
            if self.player.poll_end_of_stream().await {
                info!("End of file");
                break;
            }
            if !self.player.is_running().await {
                warn!("Player process exited during playback");
                break;
            }
            tokio::time::sleep(self.config.end_poll_interval).await;
        }
        self.set_state(OrchestratorState::Idle);
    }
}
