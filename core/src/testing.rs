//! Recording backend shared by the orchestrator and loop mode tests.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::definitions::{BackendKind, StartOptions};
use crate::player::{Player, PlayerBackend, PlayerError};

#[derive(Debug, Clone, PartialEq)]
pub enum BackendCall {
    Start(PathBuf, StartOptions),
    SetPlaying(bool),
    ShowFirstFrame,
    Stop,
}

#[derive(Default)]
struct MockState {
    calls: Vec<BackendCall>,
    running: bool,
    looping: bool,
    playing: bool,
    polls_while_playing: usize,
    loaded: Option<PathBuf>,
    fail_next_start: bool,
}

/// Reaches end-of-stream after `eos_after_polls` polls of unpaused, non-looping playback.
pub struct MockBackend {
    eos_after_polls: usize,
    state: Mutex<MockState>,
}

impl MockBackend {
    pub fn new(eos_after_polls: usize) -> Arc<Self> {
        Arc::new(Self { eos_after_polls, state: Mutex::new(MockState::default()) })
    }

    pub fn player(self: &Arc<Self>) -> Player {
        Player::new(self.clone())
    }

    pub fn take_calls(&self) -> Vec<BackendCall> {
        std::mem::take(&mut self.state.lock().unwrap().calls)
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn starts(&self) -> usize {
        self.state.lock().unwrap().calls.iter()
            .filter(|c| matches!(c, BackendCall::Start(..)))
            .count()
    }

    /// The next start spawns a process whose control channel never comes up.
    pub fn fail_next_start(&self) {
        self.state.lock().unwrap().fail_next_start = true;
    }

    /// Simulates the player process dying.
    pub fn crash(&self) {
        self.state.lock().unwrap().running = false;
    }
}

#[async_trait]
impl PlayerBackend for MockBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Mpv
    }

    async fn start(&self, file: &Path, options: StartOptions) -> Result<(), PlayerError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(BackendCall::Start(file.to_path_buf(), options));
        state.running = true;
        if std::mem::take(&mut state.fail_next_start) {
            state.playing = false;
            state.loaded = Some(file.to_path_buf());
            return Err(PlayerError::ChannelUnavailable);
        }
        state.looping = options.looping;
        state.playing = !options.paused;
        state.polls_while_playing = 0;
        state.loaded = Some(file.to_path_buf());
        Ok(())
    }

    async fn set_playing(&self, playing: bool) -> Result<(), PlayerError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(BackendCall::SetPlaying(playing));
        if !state.running {
            return Err(PlayerError::NotRunning);
        }
        state.playing = playing;
        Ok(())
    }

    async fn show_first_frame_paused(&self) -> Result<(), PlayerError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(BackendCall::ShowFirstFrame);
        state.playing = false;
        state.polls_while_playing = 0;
        Ok(())
    }

    async fn poll_end_of_stream(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        if !state.running || !state.playing || state.looping {
            return false;
        }
        state.polls_while_playing += 1;
        state.polls_while_playing >= self.eos_after_polls
    }

    async fn is_running(&self) -> bool {
        self.state.lock().unwrap().running
    }

    async fn stop(&self) -> Result<(), PlayerError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(BackendCall::Stop);
        state.running = false;
        state.playing = false;
        state.loaded = None;
        Ok(())
    }

    async fn loaded_file(&self) -> Option<PathBuf> {
        self.state.lock().unwrap().loaded.clone()
    }
}
