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
use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use log::LevelFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn to_level_filter(&self) -> LevelFilter {
        match self {
            LogLevel::Trace => LevelFilter::Trace,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Error => LevelFilter::Error,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Trace => write!(f, "trace"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Error => write!(f, "error"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BackendChoice {
    /// mpv when installed, omxplayer otherwise
    Auto,
    Mpv,
    Omxplayer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    /// Show the newest file paused, play it once per button press
    Button,
    /// Repeat the loop file, play the triggered file on button or HTTP request
    Loop,
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Directory holding the playable files [default: $HOME/videos]
    #[arg(long, env = "KIOSK_MEDIA_DIR")]
    pub media_dir: Option<PathBuf>,

    /// Mountpoint used for USB volumes the system did not mount
    #[arg(long, env = "KIOSK_USB_MOUNT", default_value = "/media/usb")]
    pub usb_mount: PathBuf,

    /// Button input pin, BCM numbering
    #[arg(long, env = "KIOSK_BUTTON_PIN", default_value_t = 24)]
    pub button_pin: u8,

    #[arg(long, env = "KIOSK_DEBOUNCE_MS", default_value_t = 50)]
    pub debounce_ms: u64,

    #[arg(long, env = "KIOSK_BACKEND", value_enum, default_value_t = BackendChoice::Auto)]
    pub backend: BackendChoice,

    #[arg(long, env = "KIOSK_MODE", value_enum, default_value_t = Mode::Button)]
    pub mode: Mode,

    /// Loop mode: file repeated while idle
    #[arg(long, env = "KIOSK_LOOP_FILE", default_value = "loop.mp4")]
    pub loop_file: String,

    /// Loop mode: file played once per trigger
    #[arg(long, env = "KIOSK_TRIGGERED_FILE", default_value = "triggered.mp4")]
    pub triggered_file: String,

    /// Loop mode: HTTP control surface address
    #[arg(long, env = "KIOSK_LISTEN", default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// Loop mode: do not start the HTTP control surface
    #[arg(long, env = "KIOSK_NO_HTTP")]
    pub no_http: bool,

    /// Set the log level
    #[arg(short, long, env = "KIOSK_LOG_LEVEL", value_enum, default_value_t = LogLevel::Info)]
    pub log_level: LogLevel,

    /// Also log to this file
    #[arg(long, env = "KIOSK_LOG_FILE")]
    pub log_file: Option<PathBuf>,
}

impl Cli {
    pub fn media_dir(&self) -> PathBuf {
        self.media_dir.clone().unwrap_or_else(|| {
            std::env::var_os("HOME")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("/"))
                .join("videos")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn loop_mode_arguments() {
        let cli = Cli::try_parse_from([
            "kiosk-player",
            "--mode", "loop",
            "--media-dir", "/srv/videos",
            "--backend", "omxplayer",
            "--listen", "127.0.0.1:9000",
            "--log-level", "debug",
        ])
        .unwrap();
        assert_eq!(cli.mode, Mode::Loop);
        assert_eq!(cli.backend, BackendChoice::Omxplayer);
        assert_eq!(cli.media_dir(), PathBuf::from("/srv/videos"));
        assert_eq!(cli.listen, "127.0.0.1:9000".parse().unwrap());
        assert_eq!(cli.log_level, LogLevel::Debug);
        assert_eq!(cli.loop_file, "loop.mp4");
    }

    #[test]
    fn rejects_unknown_backend() {
        assert!(Cli::try_parse_from(["kiosk-player", "--backend", "vlc"]).is_err());
    }
}
