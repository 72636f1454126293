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

use std::sync::Arc;
#[cfg(feature = "gpio")]
use std::time::Duration;

use anyhow::Context;
use kiosk_core::control_server;
use kiosk_core::usb::{RemovableSync, SyncConfig, SystemVolumeProbe};
use kiosk_core::{
    run_watchdog, spawn_service, LoopController, LoopTargets, MediaStore, MultiServiceHandle,
    Player, WatchdogConfig,
};
#[cfg(feature = "gpio")]
use kiosk_core::{run_button_forwarder, GpioButton, Orchestrator, OrchestratorConfig};
use log::{debug, info, warn};
use tokio::net::TcpListener;
use tokio::signal::unix::{signal, SignalKind};

use crate::backend::{create_player, find_program, select_backend};
use crate::cli::{Cli, Mode};

async fn shutdown_signal() {
    debug!("Press Ctrl+C or send SIGTERM to exit");
    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(terminate) => terminate,
        Err(e) => {
            warn!("Cannot listen for SIGTERM: {}", e);
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C signal, exiting...");
        }
        _ = terminate.recv() => {
            info!("Received SIGTERM, exiting...");
        }
    }
}

#[cfg(feature = "gpio")]
fn open_button(cli: &Cli) -> anyhow::Result<GpioButton> {
    GpioButton::open(cli.button_pin, Duration::from_millis(cli.debounce_ms))
        .with_context(|| format!("Failed to open button on BCM pin {}", cli.button_pin))
}

#[cfg(feature = "gpio")]
fn start_button_mode(
    cli: &Cli,
    player: Player,
    sync: Arc<RemovableSync>,
    store: MediaStore,
    services: &mut MultiServiceHandle,
) -> anyhow::Result<()> {
    let button = open_button(cli)?;
    let orchestrator = Orchestrator::new(player, sync, store, button, OrchestratorConfig::default());
    services.add(spawn_service("orchestrator", move |stop| orchestrator.run(stop)));
    Ok(())
}

#[cfg(not(feature = "gpio"))]
fn start_button_mode(
    _cli: &Cli,
    _player: Player,
    _sync: Arc<RemovableSync>,
    _store: MediaStore,
    _services: &mut MultiServiceHandle,
) -> anyhow::Result<()> {
    anyhow::bail!("Button mode needs GPIO support; rebuild with the `gpio` feature or use --mode loop")
}

async fn start_loop_mode(
    cli: &Cli,
    player: Player,
    sync: Arc<RemovableSync>,
    store: MediaStore,
    services: &mut MultiServiceHandle,
) -> anyhow::Result<()> {
    let targets = LoopTargets {
        loop_file: cli.loop_file.clone(),
        triggered_file: cli.triggered_file.clone(),
    };
    let controller = Arc::new(LoopController::new(player, store, Some(sync), targets));
    if let Err(e) = controller.play_loop().await {
        warn!("Loop file not playable yet: {}", e);
    }

    let watchdog = controller.clone();
    services.add(spawn_service("watchdog", move |stop| {
        run_watchdog(watchdog, WatchdogConfig::default(), stop)
    }));

    #[cfg(feature = "gpio")]
    {
        match open_button(cli) {
            Ok(button) => {
                let forwarder = controller.clone();
                services.add(spawn_service("button", move |stop| {
                    run_button_forwarder(forwarder, button, stop)
                }));
            }
            Err(e) => warn!("Running without button: {:#}", e),
        }
    }
    #[cfg(not(feature = "gpio"))]
    {
        info!("Built without GPIO support; triggers only over HTTP");
    }

    if !cli.no_http {
        let listener = TcpListener::bind(cli.listen)
            .await
            .with_context(|| format!("Failed to bind control surface on {}", cli.listen))?;
        services.add(spawn_service("control", move |stop| {
            control_server::serve(listener, controller, stop)
        }));
    }
    Ok(())
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let store = MediaStore::new(cli.media_dir());
    store
        .ensure_exists()
        .with_context(|| format!("Failed to create media directory {}", store.root().display()))?;

    let (kind, program) = select_backend(cli.backend, find_program)?;
    info!("Using {} at {}", kind, program.display());
    let player = create_player(kind, program);

    let sync_config = SyncConfig {
        default_mount: cli.usb_mount.clone(),
        ..SyncConfig::default()
    };
    let sync = Arc::new(RemovableSync::new(
        Box::new(SystemVolumeProbe::default()),
        store.root(),
        sync_config,
    ));

    let mut services = MultiServiceHandle::new();
    match cli.mode {
        Mode::Button => start_button_mode(&cli, player, sync, store, &mut services)?,
        Mode::Loop => start_loop_mode(&cli, player, sync, store, &mut services).await?,
    }
    info!("Started {} service(s) in {:?} mode", services.len(), cli.mode);

    shutdown_signal().await;

    debug!("Shutting down services");
    services.shutdown().await?;
    info!("Kiosk player stopped");
    Ok(())
}
