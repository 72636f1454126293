use std::sync::Arc;

use kiosk_core::Player;

mod omx_player;

pub use omx_player::{OmxConfig, OmxKeyPlayer};

pub fn create_omxplayer_player(config: OmxConfig) -> Player {
    Player::new(Arc::new(OmxKeyPlayer::new(config)))
}
