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

use std::env;
use std::ffi::OsStr;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;

use anyhow::anyhow;
use kiosk_core::{BackendKind, Player};
use kiosk_mpv_port::{create_mpv_player, MpvConfig};
use kiosk_omxplayer_port::{create_omxplayer_player, OmxConfig};

use crate::cli::BackendChoice;

/// Looks `name` up in the directories of a `PATH`-style list.
pub fn find_in_path(name: &str, path_list: &OsStr) -> Option<PathBuf> {
    env::split_paths(path_list)
        .map(|dir| dir.join(name))
        .find(|candidate| {
            candidate
                .metadata()
                .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
                .unwrap_or(false)
        })
}

pub fn find_program(name: &str) -> Option<PathBuf> {
    env::var_os("PATH").and_then(|path_list| find_in_path(name, &path_list))
}

/// Picks the player technology. Having neither installed is fatal.
pub fn select_backend(
    choice: BackendChoice,
    lookup: impl Fn(&str) -> Option<PathBuf>,
) -> anyhow::Result<(BackendKind, PathBuf)> {
    let candidates: &[BackendKind] = match choice {
        BackendChoice::Auto => &[BackendKind::Mpv, BackendKind::Omxplayer],
        BackendChoice::Mpv => &[BackendKind::Mpv],
        BackendChoice::Omxplayer => &[BackendKind::Omxplayer],
    };
    candidates
        .iter()
        .find_map(|kind| lookup(&kind.to_string()).map(|program| (*kind, program)))
        .ok_or_else(|| {
            let names: Vec<String> = candidates.iter().map(ToString::to_string).collect();
            anyhow!("No supported video player found on PATH (install {})", names.join(" or "))
        })
}

pub fn create_player(kind: BackendKind, program: PathBuf) -> Player {
    match kind {
        BackendKind::Mpv => create_mpv_player(MpvConfig { program, ..MpvConfig::default() }),
        BackendKind::Omxplayer => create_omxplayer_player(OmxConfig { program, ..OmxConfig::default() }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn only(installed: &'static [&'static str]) -> impl Fn(&str) -> Option<PathBuf> {
        move |name| installed.contains(&name).then(|| PathBuf::from("/usr/bin").join(name))
    }

    #[test]
    fn auto_prefers_mpv() {
        let (kind, program) = select_backend(BackendChoice::Auto, only(&["omxplayer", "mpv"])).unwrap();
        assert_eq!(kind, BackendKind::Mpv);
        assert_eq!(program, PathBuf::from("/usr/bin/mpv"));

        let (kind, _) = select_backend(BackendChoice::Auto, only(&["omxplayer"])).unwrap();
        assert_eq!(kind, BackendKind::Omxplayer);
    }

    #[test]
    fn missing_players_are_named_in_the_error() {
        let err = select_backend(BackendChoice::Auto, only(&[])).unwrap_err().to_string();
        assert!(err.contains("mpv or omxplayer"), "{}", err);

        let err = select_backend(BackendChoice::Omxplayer, only(&["mpv"])).unwrap_err().to_string();
        assert!(err.contains("omxplayer") && !err.contains("mpv"), "{}", err);
    }

    #[test]
    fn path_lookup_requires_an_executable_file() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        fs::write(first.path().join("mpv"), b"").unwrap();
        let executable = second.path().join("mpv");
        fs::write(&executable, b"#!/bin/sh\n").unwrap();
        fs::set_permissions(&executable, fs::Permissions::from_mode(0o755)).unwrap();

        let path_list = env::join_paths([first.path(), second.path()]).unwrap();
        assert_eq!(find_in_path("mpv", &path_list), Some(executable));
        assert_eq!(find_in_path("omxplayer", &path_list), None);
    }
}
