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

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use log::debug;

use crate::usb::errors::UsbError;

/// An attached removable partition as seen during one poll cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemovableVolume {
    /// Device node, e.g. `/dev/sda1`.
    pub device: PathBuf,
    pub mountpoint: Option<PathBuf>,
    /// Set when this process mounted the volume and therefore owns unmounting it.
    pub mounted_by_us: bool,
}

impl RemovableVolume {
    pub fn new(device: impl Into<PathBuf>) -> Self {
        Self { device: device.into(), mountpoint: None, mounted_by_us: false }
    }
}

/// Host system access needed by the sync policy.
pub trait VolumeProbe: Send + Sync {
    /// Device nodes of attached removable partitions.
    fn enumerate(&self) -> Vec<PathBuf>;

    /// Current system-wide mountpoint of `device`, if mounted.
    fn mountpoint_of(&self, device: &Path) -> Option<PathBuf>;

    fn mount_read_only(&self, device: &Path, at: &Path) -> Result<(), UsbError>;

    fn unmount(&self, at: &Path) -> Result<(), UsbError>;
}

/// [`VolumeProbe`] backed by procfs and the `mount`/`umount` tools.
#[derive(Debug, Clone)]
pub struct SystemVolumeProbe {
    partitions_path: PathBuf,
    mounts_path: PathBuf,
}

impl Default for SystemVolumeProbe {
    fn default() -> Self {
        Self {
            partitions_path: PathBuf::from("/proc/partitions"),
            mounts_path: PathBuf::from("/proc/mounts"),
        }
    }
}

impl SystemVolumeProbe {
    pub fn new() -> Self {
        Self::default()
    }
}

impl VolumeProbe for SystemVolumeProbe {
    fn enumerate(&self) -> Vec<PathBuf> {
        match fs::read_to_string(&self.partitions_path) {
            Ok(content) => parse_partitions(&content),
            Err(e) => {
                debug!("Cannot read {}: {}", self.partitions_path.display(), e);
                Vec::new()
            }
        }
    }

    fn mountpoint_of(&self, device: &Path) -> Option<PathBuf> {
        let content = fs::read_to_string(&self.mounts_path).ok()?;
        find_mountpoint(&content, device)
    }

    fn mount_read_only(&self, device: &Path, at: &Path) -> Result<(), UsbError> {
        fs::create_dir_all(at)?;
        let output = Command::new("mount")
            .arg("-o")
            .arg("ro")
            .arg(device)
            .arg(at)
            .output()?;
        if !output.status.success() {
            return Err(UsbError::MountFailed(format!(
                "{} at {}: {}",
                device.display(),
                at.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }

    fn unmount(&self, at: &Path) -> Result<(), UsbError> {
        let output = Command::new("umount").arg(at).output()?;
        if !output.status.success() {
            return Err(UsbError::UnmountFailed(format!(
                "{}: {}",
                at.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }
}

/// USB mass storage partitions (`sdXN`) listed in `/proc/partitions`, sorted by name.
/// Whole disks without a partition number are ignored.
fn parse_partitions(content: &str) -> Vec<PathBuf> {
    let mut devices: Vec<PathBuf> = content
        .lines()
        .filter_map(|line| line.split_whitespace().nth(3))
        .filter(|name| name.starts_with("sd"))
        .filter(|name| name.chars().last().is_some_and(|c| c.is_ascii_digit()))
        .map(|name| PathBuf::from(format!("/dev/{}", name)))
        .collect();
    devices.sort();
    devices
}

fn find_mountpoint(mounts: &str, device: &Path) -> Option<PathBuf> {
    let device = device.to_string_lossy();
    mounts.lines().find_map(|line| {
        let mut fields = line.split_whitespace();
        let source = fields.next()?;
        let target = fields.next()?;
        (source == device).then(|| PathBuf::from(unescape_mount_field(target)))
    })
}

/// `/proc/mounts` encodes space, tab, newline and backslash as three-digit octal escapes.
fn unescape_mount_field(field: &str) -> String {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 3 < bytes.len() && bytes[i + 1..i + 4].iter().all(|b| (b'0'..=b'7').contains(b)) {
            let value = bytes[i + 1..i + 4]
                .iter()
                .fold(0u32, |acc, b| acc * 8 + u32::from(b - b'0'));
            out.push(value as u8);
            i += 4;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PARTITIONS: &str = "major minor  #blocks  name

 179        0   31166976 mmcblk0
 179        1     262144 mmcblk0p1
   8        0   15633408 sda
   8        1   15632384 sda1
   8       16    7816704 sdb
   8       18    7815680 sdb2
   7        0      65536 loop0
";

    #[test]
    fn lists_only_sd_partitions() {
        assert_eq!(
            parse_partitions(PARTITIONS),
            vec![PathBuf::from("/dev/sda1"), PathBuf::from("/dev/sdb2")]
        );
    }

    #[test]
    fn finds_mountpoint_with_escaped_spaces() {
        let mounts = "/dev/mmcblk0p2 / ext4 rw,noatime 0 0
/dev/sda1 /media/pi/MY\\040STICK vfat ro,relatime 0 0
";
        assert_eq!(
            find_mountpoint(mounts, Path::new("/dev/sda1")),
            Some(PathBuf::from("/media/pi/MY STICK"))
        );
        assert_eq!(find_mountpoint(mounts, Path::new("/dev/sdb1")), None);
    }

    #[test]
    fn unescape_leaves_plain_text_alone() {
        assert_eq!(unescape_mount_field("/media/usb"), "/media/usb");
        assert_eq!(unescape_mount_field("a\\011b"), "a\tb");
        assert_eq!(unescape_mount_field("trailing\\04"), "trailing\\04");
    }

    #[test]
    fn missing_procfs_yields_no_devices() {
        let probe = SystemVolumeProbe {
            partitions_path: PathBuf::from("/nonexistent/partitions"),
            mounts_path: PathBuf::from("/nonexistent/mounts"),
        };
        assert!(probe.enumerate().is_empty());
        assert_eq!(probe.mountpoint_of(Path::new("/dev/sda1")), None);
    }
}
