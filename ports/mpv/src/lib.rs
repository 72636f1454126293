use std::sync::Arc;

use kiosk_core::Player;

mod ipc;
mod mpv_player;

pub use ipc::IpcTimings;
pub use mpv_player::{MpvConfig, MpvIpcPlayer};

pub fn create_mpv_player(config: MpvConfig) -> Player {
    Player::new(Arc::new(MpvIpcPlayer::new(config)))
}
