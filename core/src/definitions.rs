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

use std::fmt;
use std::path::Path;

use serde::Serialize;

/// File extensions (lowercase, without the dot) accepted as playable video.
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "mkv", "avi", "m4v"];

/// Returns true when `path` carries one of [`VIDEO_EXTENSIONS`], compared case-insensitively.
pub fn is_video_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| VIDEO_EXTENSIONS.iter().any(|allowed| ext.eq_ignore_ascii_case(allowed)))
        .unwrap_or(false)
}

/// External player technology behind a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Long-lived process controlled through a JSON IPC socket.
    Mpv,
    /// Process controlled by single key presses written to its stdin.
    Omxplayer,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mpv => write!(f, "mpv"),
            Self::Omxplayer => write!(f, "omxplayer"),
        }
    }
}

/// How a freshly spawned player should come up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StartOptions {
    /// Keep the player paused once the control channel is reachable.
    pub paused: bool,
    /// Repeat the file forever instead of stopping at its end.
    pub looping: bool,
}

impl StartOptions {
    pub fn paused() -> Self {
        Self { paused: true, looping: false }
    }

    pub fn playing() -> Self {
        Self { paused: false, looping: false }
    }

    pub fn looping() -> Self {
        Self { paused: false, looping: true }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn video_extension_match_ignores_case() {
        assert!(is_video_file(Path::new("/videos/a.mp4")));
        assert!(is_video_file(Path::new("/videos/B.MKV")));
        assert!(is_video_file(Path::new("clip.M4v")));
        assert!(!is_video_file(Path::new("/videos/notes.txt")));
        assert!(!is_video_file(Path::new("/videos/mp4")));
    }
}
