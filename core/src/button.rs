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

//! Hardware button input.
//!
//! Interrupt callbacks run on a notification thread owned by the GPIO driver. They never touch
//! the player: every press is forwarded into a channel and consumed by whichever task owns the
//! playback session.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Error, Debug)]
pub enum ButtonError {
    #[error("Button input closed")]
    Closed,

    #[error("GPIO error: {0}")]
    Gpio(String),
}

#[async_trait]
pub trait ButtonInput: Send {
    /// Blocks until the next press. This is the intended unbounded idle wait.
    async fn wait_for_press(&mut self) -> Result<(), ButtonError>;

    /// Drops presses that arrived while nobody was waiting, so a press during playback does
    /// not immediately start the next one.
    fn discard_pending(&mut self);
}

/// Sender side of a [`ChannelButton`].
#[derive(Clone)]
pub struct ButtonPresser {
    tx: mpsc::UnboundedSender<()>,
}

impl ButtonPresser {
    pub fn press(&self) -> bool {
        self.tx.send(()).is_ok()
    }
}

/// Button fed from an in-process channel.
pub struct ChannelButton {
    rx: mpsc::UnboundedReceiver<()>,
}

impl ChannelButton {
    pub fn new() -> (ButtonPresser, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ButtonPresser { tx }, Self { rx })
    }
}

#[async_trait]
impl ButtonInput for ChannelButton {
    async fn wait_for_press(&mut self) -> Result<(), ButtonError> {
        self.rx.recv().await.ok_or(ButtonError::Closed)
    }

    fn discard_pending(&mut self) {
        while self.rx.try_recv().is_ok() {}
    }
}

#[cfg(feature = "gpio")]
pub use gpio::GpioButton;

#[cfg(feature = "gpio")]
mod gpio {
    use std::time::Duration;

    use async_trait::async_trait;
    use log::{debug, info};
    use rppal::gpio::{Gpio, InputPin, Trigger};

    use super::{ButtonError, ButtonInput, ButtonPresser, ChannelButton};

    /// Active-low push button on a BCM-numbered pin with the internal pull-up enabled.
    pub struct GpioButton {
        // Dropping the pin cancels the interrupt.
        _pin: InputPin,
        inner: ChannelButton,
    }

    impl GpioButton {
        pub fn open(bcm_pin: u8, debounce: Duration) -> Result<Self, ButtonError> {
            let gpio = Gpio::new().map_err(|e| ButtonError::Gpio(e.to_string()))?;
            let mut pin = gpio
                .get(bcm_pin)
                .map_err(|e| ButtonError::Gpio(e.to_string()))?
                .into_input_pullup();

            let (presser, inner): (ButtonPresser, ChannelButton) = ChannelButton::new();
            pin.set_async_interrupt(Trigger::FallingEdge, Some(debounce), move |_event| {
                debug!("Button edge detected");
                presser.press();
            })
            .map_err(|e| ButtonError::Gpio(e.to_string()))?;

            info!("Listening for button presses on BCM pin {}", bcm_pin);
            Ok(Self { _pin: pin, inner })
        }
    }

    #[async_trait]
    impl ButtonInput for GpioButton {
        async fn wait_for_press(&mut self) -> Result<(), ButtonError> {
            self.inner.wait_for_press().await
        }

        fn discard_pending(&mut self) {
            self.inner.discard_pending();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn press_wakes_waiter() {
        let (presser, mut button) = ChannelButton::new();
        let waiter = tokio::spawn(async move { button.wait_for_press().await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(presser.press());
        assert!(waiter.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn stale_presses_are_discarded() {
        let (presser, mut button) = ChannelButton::new();
        presser.press();
        presser.press();
        button.discard_pending();
        let waited = tokio::time::timeout(Duration::from_millis(50), button.wait_for_press()).await;
        assert!(waited.is_err());
    }

    #[tokio::test]
    async fn dropped_presser_closes_input() {
        let (presser, mut button) = ChannelButton::new();
        drop(presser);
        assert!(matches!(button.wait_for_press().await, Err(ButtonError::Closed)));
    }
}
