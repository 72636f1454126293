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

//! Removable media detection, mounting and content sync into the media store.
//!
//! Block devices are discovered from `/proc/partitions`, mount status comes from
//! `/proc/mounts`, and mounting goes through the system `mount`/`umount` tools. The
//! [`VolumeProbe`] trait is the seam between this policy code and the host system.

pub mod errors;
pub mod sync;
pub mod volumes;

pub use sync::{copy_updates, would_update, RemovableSync, SyncConfig, SyncDecision};
pub use volumes::{RemovableVolume, SystemVolumeProbe, VolumeProbe};
