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

mod backend;
mod cli;
mod logger;
mod runner;

use anyhow::bail;
use clap::Parser;
use log::{debug, info};
use tokio::runtime::Runtime;

use crate::cli::Cli;
use crate::logger::init_logger;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    if let Err(e) = init_logger(cli.log_level, cli.log_file.as_deref()) {
        eprintln!("Failed to initialize logger: {}", e);
        bail!("Failed to initialize logger: {}", e);
    }
    info!("Kiosk player starting with log level: {}", cli.log_level);

    debug!("Creating Tokio runtime");
    let rt = Runtime::new()?;
    rt.block_on(runner::run(cli))
}
