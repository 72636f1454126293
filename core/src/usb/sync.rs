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

use std::fs::{self, File, FileTimes, Metadata};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use log::{debug, info, warn};
use walkdir::WalkDir;

use crate::definitions::is_video_file;
use crate::usb::volumes::{RemovableVolume, VolumeProbe};

#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Where volumes that are not mounted system-wide get mounted read-only.
    pub default_mount: PathBuf,
    /// Folders below a volume root that are scanned in addition to the root itself.
    pub subfolders: Vec<String>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            default_mount: PathBuf::from("/media/usb"),
            subfolders: vec!["videos".into(), "Videos".into(), "media".into()],
        }
    }
}

/// Per-volume verdict of one probe cycle. Never cached between cycles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncDecision {
    pub device: PathBuf,
    pub needs_copy: bool,
    pub mountpoint: PathBuf,
    pub mounted_by_us: bool,
}

/// Seconds since the epoch, truncated. Files only compare at whole-second precision since
/// FAT-formatted sticks do not keep anything finer.
fn mtime_secs(metadata: &Metadata) -> Option<i64> {
    let modified = metadata.modified().ok()?;
    Some(match modified.duration_since(UNIX_EPOCH) {
        Ok(after) => after.as_secs() as i64,
        Err(before) => -(before.duration().as_secs() as i64),
    })
}

/// Whether `source` is missing from the store or differs by size or truncated mtime.
/// Anything that cannot be compared counts as different.
fn differs_from_store(source: &Metadata, destination: &Path) -> bool {
    match fs::metadata(destination) {
        Ok(existing) => {
            source.len() != existing.len()
                || mtime_secs(source).is_none()
                || mtime_secs(source) != mtime_secs(&existing)
        }
        Err(_) => true,
    }
}

/// Playable files below `dir`, recursively, with their metadata.
fn video_files(dir: &Path) -> impl Iterator<Item = (PathBuf, Option<Metadata>)> {
    WalkDir::new(dir)
        .follow_links(false)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file() && is_video_file(entry.path()))
        .map(|entry| {
            let metadata = entry.metadata().ok();
            (entry.into_path(), metadata)
        })
}

fn store_destination(store: &Path, source: &Path) -> Option<PathBuf> {
    source.file_name().map(|name| store.join(name))
}

/// Read-only probe: does any candidate directory hold a video missing from `store` or
/// differing from the store copy?
pub fn would_update(candidate_dirs: &[PathBuf], store: &Path) -> bool {
    candidate_dirs.iter().filter(|dir| dir.is_dir()).any(|dir| {
        video_files(dir).any(|(source, metadata)| {
            let Some(destination) = store_destination(store, &source) else { return false; };
            match metadata {
                Some(metadata) => differs_from_store(&metadata, &destination),
                None => true,
            }
        })
    })
}

fn copy_preserving_times(source: &Path, source_metadata: &Metadata, destination: &Path) -> io::Result<()> {
    fs::copy(source, destination)?;
    let mut times = FileTimes::new().set_modified(source_metadata.modified()?);
    if let Ok(accessed) = source_metadata.accessed() {
        times = times.set_accessed(accessed);
    }
    File::options().write(true).open(destination)?.set_times(times)
}

/// Copies every video that is missing from `store` or differs from the store copy, preserving
/// timestamps. Per-file failures are logged and skipped. Returns whether anything was copied.
pub fn copy_updates(candidate_dirs: &[PathBuf], store: &Path) -> bool {
    if let Err(e) = fs::create_dir_all(store) {
        warn!("Cannot create media store {}: {}", store.display(), e);
        return false;
    }

    let mut copied_any = false;
    for dir in candidate_dirs.iter().filter(|dir| dir.is_dir()) {
        for (source, metadata) in video_files(dir) {
            let Some(destination) = store_destination(store, &source) else { continue; };
            let Some(metadata) = metadata else {
                debug!("Skipping unreadable {}", source.display());
                continue;
            };
            if !differs_from_store(&metadata, &destination) {
                continue;
            }
            match copy_preserving_times(&source, &metadata, &destination) {
                Ok(()) => {
                    info!("Copied {} -> {}", source.display(), destination.display());
                    copied_any = true;
                }
                Err(e) => warn!("Failed to copy {}: {}", source.display(), e),
            }
        }
    }
    copied_any
}

/// Detects attached volumes with new content and applies their updates to the media store.
pub struct RemovableSync {
    probe: Box<dyn VolumeProbe>,
    store: PathBuf,
    config: SyncConfig,
}

impl RemovableSync {
    pub fn new(probe: Box<dyn VolumeProbe>, store: impl Into<PathBuf>, config: SyncConfig) -> Self {
        Self { probe, store: store.into(), config }
    }

    pub fn enumerate_volumes(&self) -> Vec<RemovableVolume> {
        self.probe
            .enumerate()
            .into_iter()
            .map(RemovableVolume::new)
            .collect()
    }

    /// Uses an existing system mount when there is one, otherwise mounts read-only at the
    /// default path. A failed mount leaves the volume without a mountpoint.
    pub fn ensure_mounted(&self, volume: &mut RemovableVolume) -> (Option<PathBuf>, bool) {
        if let Some(existing) = self.probe.mountpoint_of(&volume.device) {
            volume.mountpoint = Some(existing.clone());
            volume.mounted_by_us = false;
            return (Some(existing), false);
        }

        let at = &self.config.default_mount;
        if let Err(e) = self.probe.mount_read_only(&volume.device, at) {
            debug!("Skipping {} this cycle: {}", volume.device.display(), e);
            return (None, false);
        }
        match self.probe.mountpoint_of(&volume.device) {
            Some(mounted) => {
                volume.mountpoint = Some(mounted.clone());
                volume.mounted_by_us = true;
                (Some(mounted), true)
            }
            None => (None, false),
        }
    }

    /// Unmounts only what this process mounted.
    pub fn release(&self, mountpoint: &Path, mounted_by_us: bool) {
        if !mounted_by_us {
            return;
        }
        if let Err(e) = self.probe.unmount(mountpoint) {
            warn!("{}", e);
        }
    }

    pub fn candidate_dirs(&self, mountpoint: &Path) -> Vec<PathBuf> {
        std::iter::once(mountpoint.to_path_buf())
            .chain(self.config.subfolders.iter().map(|sub| mountpoint.join(sub)))
            .collect()
    }

    /// Probes every attached volume without writing anything. Volumes that need no copy are
    /// released right away; the returned decisions are the ones that do.
    ///
    /// Once a volume mounted at the shared default path needs a copy, further unmounted
    /// devices are left for the next cycle so they do not stack on the same mountpoint.
    pub fn check_for_updates(&self) -> Vec<SyncDecision> {
        let mut needs = Vec::new();
        let mut default_mount_busy = false;

        for mut volume in self.enumerate_volumes() {
            if default_mount_busy && self.probe.mountpoint_of(&volume.device).is_none() {
                debug!("Deferring {} until the default mountpoint is free", volume.device.display());
                continue;
            }
            let (Some(mountpoint), mounted_by_us) = self.ensure_mounted(&mut volume) else { continue; };

            let needs_copy = would_update(&self.candidate_dirs(&mountpoint), &self.store);
            if needs_copy {
                info!("{} has new media", volume.device.display());
                default_mount_busy |= mounted_by_us;
                needs.push(SyncDecision { device: volume.device, needs_copy, mountpoint, mounted_by_us });
            } else {
                self.release(&mountpoint, mounted_by_us);
            }
        }
        needs
    }

    /// Copies from every volume that needs it, releasing our own mounts afterwards.
    pub fn apply(&self, decisions: &[SyncDecision]) -> bool {
        let mut copied_any = false;
        for decision in decisions {
            if decision.needs_copy {
                copied_any |= copy_updates(&self.candidate_dirs(&decision.mountpoint), &self.store);
            }
            self.release(&decision.mountpoint, decision.mounted_by_us);
        }
        copied_any
    }
}
