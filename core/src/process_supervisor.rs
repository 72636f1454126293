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

//! Ownership of the one externally spawned player process.

use std::ffi::OsStr;
use std::io;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use log::{debug, info, warn};
use sysinfo::{ProcessesToUpdate, Signal, System};
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, Command};

use crate::player::PlayerError;

/// Time given to swept stray processes to go away after SIGTERM.
const STRAY_SWEEP_SETTLE: Duration = Duration::from_millis(100);

/// Tracks at most one child process for a backend instance.
///
/// The tracked handle is the primary teardown mechanism. A name-based sweep over the OS
/// process table runs afterwards to catch players left behind by a previous, crashed run of
/// this service, which no handle exists for.
pub struct ProcessSupervisor {
    label: String,
    stray_names: Vec<String>,
    child: Option<Child>,
}

impl ProcessSupervisor {
    pub fn new(label: impl Into<String>, stray_names: Vec<String>) -> Self {
        Self { label: label.into(), stray_names, child: None }
    }

    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().and_then(|child| child.id())
    }

    pub fn is_alive(&mut self) -> bool {
        let Some(child) = self.child.as_mut() else { return false; };
        match child.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                debug!("{} process exited: {}", self.label, status);
                false
            }
            Err(e) => {
                warn!("Failed to query {} process state: {}", self.label, e);
                false
            }
        }
    }

    /// Exhaustive teardown before a new start: tracked child, stray same-name processes and
    /// stale control artifacts.
    pub async fn prepare_for_start(&mut self, artifacts: &[&Path], grace: Duration) {
        self.terminate(grace).await;

        let swept = kill_processes_by_name(&self.stray_names);
        if swept > 0 {
            info!("Terminated {} stray {} process(es)", swept, self.label);
            tokio::time::sleep(STRAY_SWEEP_SETTLE).await;
        }

        for artifact in artifacts {
            remove_artifact(artifact);
        }
    }

    /// Spawns `command` as the tracked child. Any previously tracked child is terminated first.
    pub async fn spawn(&mut self, command: &mut Command, grace: Duration) -> Result<u32, PlayerError> {
        if self.child.is_some() {
            self.terminate(grace).await;
        }

        let child = command
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(PlayerError::Spawn)?;
        let pid = child.id().unwrap_or_default();
        debug!("Spawned {} process with pid {}", self.label, pid);
        self.child = Some(child);
        Ok(pid)
    }

    /// Waits up to `timeout` for the tracked child to exit on its own.
    pub async fn wait_exit(&mut self, timeout: Duration) -> bool {
        let Some(child) = self.child.as_mut() else { return true; };
        matches!(tokio::time::timeout(timeout, child.wait()).await, Ok(Ok(_)))
    }

    /// SIGTERM, bounded wait, then SIGKILL. Forgets the child afterwards.
    pub async fn terminate(&mut self, grace: Duration) {
        let Some(mut child) = self.child.take() else { return; };
        if let Ok(Some(_)) = child.try_wait() {
            return;
        }

        if let Some(pid) = child.id() {
            // SAFETY: plain signal delivery to a pid we spawned and have not reaped yet.
            unsafe {
                libc::kill(pid as libc::pid_t, libc::SIGTERM);
            }
        }
        if tokio::time::timeout(grace, child.wait()).await.is_ok() {
            return;
        }

        warn!("{} process ignored SIGTERM, killing", self.label);
        if let Err(e) = child.start_kill() {
            warn!("Failed to kill {} process: {}", self.label, e);
        }
        let _ = child.wait().await;
    }

    /// Writes raw bytes into the child's stdin, if it was spawned with a piped stdin.
    pub async fn send_input(&mut self, bytes: &[u8]) -> io::Result<()> {
        let stdin = self.child.as_mut()
            .and_then(|child| child.stdin.as_mut())
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotConnected))?;
        stdin.write_all(bytes).await?;
        stdin.flush().await
    }
}

/// Sends SIGTERM to every process whose name matches one of `names`, except this process.
pub fn kill_processes_by_name(names: &[String]) -> usize {
    if names.is_empty() {
        return 0;
    }
    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::All, true);
    let own_pid = sysinfo::get_current_pid().ok();

    let mut killed = 0;
    for name in names {
        for process in system.processes_by_exact_name(OsStr::new(name)) {
            if Some(process.pid()) == own_pid {
                continue;
            }
            debug!("Sweeping stray process {} ({})", name, process.pid());
            if process.kill_with(Signal::Term).unwrap_or_else(|| process.kill()) {
                killed += 1;
            }
        }
    }
    killed
}

pub fn remove_artifact(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => debug!("Removed stale control artifact {}", path.display()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
    }
}
