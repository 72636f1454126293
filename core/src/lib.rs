pub mod button;
pub mod control_server;
pub mod definitions;
pub mod loop_controller;
pub mod media_store;
pub mod orchestrator;
pub mod player;
pub mod process_supervisor;
pub mod service;
pub mod usb;

#[cfg(test)]
mod testing;

pub use button::{ButtonError, ButtonInput, ButtonPresser, ChannelButton};
#[cfg(feature = "gpio")]
pub use button::GpioButton;
pub use definitions::{BackendKind, StartOptions};
pub use loop_controller::{
    run_button_forwarder, run_watchdog, ControlError, LoopController, LoopStatus, LoopTargets,
    PlaybackMode, WatchdogConfig,
};
pub use media_store::{MediaFile, MediaStore, StoreError};
pub use orchestrator::{CycleOutcome, Orchestrator, OrchestratorConfig, OrchestratorState};
pub use player::{Player, PlayerBackend, PlayerError};
pub use process_supervisor::ProcessSupervisor;
pub use service::{spawn_service, MultiServiceHandle, ServiceHandle, StopHandle};
