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

//! Local directory holding the canonical set of playable files.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;

use log::debug;
use thiserror::Error;

use crate::definitions::is_video_file;

/// Snapshot of a playable file taken at query time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaFile {
    pub path: PathBuf,
    pub size: u64,
    pub modified: SystemTime,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum StoreError {
    #[error("\"{0}\" is not a plain file name inside the media store")]
    OutsideStore(String),

    #[error("\"{0}\" does not exist in the media store")]
    FileNotFound(String),
}

#[derive(Debug, Clone)]
pub struct MediaStore {
    root: PathBuf,
}

impl MediaStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn ensure_exists(&self) -> io::Result<()> {
        fs::create_dir_all(&self.root)
    }

    /// Lists playable files directly inside the store. Entries that cannot be read are skipped.
    pub fn list(&self) -> Vec<MediaFile> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) => {
                debug!("Media store {} not readable: {}", self.root.display(), e);
                return Vec::new();
            }
        };

        entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let path = entry.path();
                if !is_video_file(&path) {
                    return None;
                }
                let metadata = entry.metadata().ok()?;
                if !metadata.is_file() {
                    return None;
                }
                Some(MediaFile {
                    path,
                    size: metadata.len(),
                    modified: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
                })
            })
            .collect()
    }

    /// The most recently modified playable file. Equal timestamps are broken by file name so
    /// the choice stays stable between polls.
    pub fn pick_newest(&self) -> Option<MediaFile> {
        self.list()
            .into_iter()
            .max_by(|a, b| a.modified.cmp(&b.modified).then_with(|| a.path.cmp(&b.path)))
    }

    /// Resolves a bare file name to a path inside the store.
    ///
    /// Anything that is not a single normal path component (separators, `..`, absolute paths)
    /// is rejected, and so is a symlink whose target leaves the store.
    pub fn resolve(&self, name: &str) -> Result<PathBuf, StoreError> {
        let candidate = Path::new(name);
        let mut components = candidate.components();
        let is_plain_name = matches!(
            (components.next(), components.next()),
            (Some(Component::Normal(_)), None)
        );
        if !is_plain_name {
            return Err(StoreError::OutsideStore(name.to_string()));
        }

        let path = self.root.join(candidate);
        if !path.is_file() {
            return Err(StoreError::FileNotFound(name.to_string()));
        }

        let canonical_root = fs::canonicalize(&self.root)
            .map_err(|_| StoreError::FileNotFound(name.to_string()))?;
        let canonical_path = fs::canonicalize(&path)
            .map_err(|_| StoreError::FileNotFound(name.to_string()))?;
        if !canonical_path.starts_with(&canonical_root) {
            return Err(StoreError::OutsideStore(name.to_string()));
        }
        Ok(path)
    }
}
