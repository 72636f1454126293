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

//! Background task handles with cooperative shutdown.

use std::future::Future;

use log::warn;
use tokio::sync::oneshot;
use tokio::task::{JoinError, JoinHandle};

/// Given to a background task so it can notice a shutdown request inside `select!`.
pub struct StopHandle {
    shutdown_rx: oneshot::Receiver<()>,
}

impl StopHandle {
    /// Resolves once shutdown is requested or the owning [`ServiceHandle`] is dropped.
    pub async fn signaled(&mut self) {
        let _ = (&mut self.shutdown_rx).await;
    }
}

/// Owner side of a task started with [`spawn_service`].
pub struct ServiceHandle {
    name: &'static str,
    join: JoinHandle<()>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl ServiceHandle {
    pub fn request_shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }

    pub async fn shutdown(mut self) -> Result<(), JoinError> {
        self.request_shutdown();
        self.join.await
    }

    pub fn abort(self) {
        self.join.abort();
    }
}

/// Spawns `f` on the Tokio runtime, handing it a [`StopHandle`].
pub fn spawn_service<Fut, Func>(name: &'static str, f: Func) -> ServiceHandle
where
    Fut: Future<Output = ()> + Send + 'static,
    Func: FnOnce(StopHandle) -> Fut + Send + 'static,
{
    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let join = tokio::spawn(f(StopHandle { shutdown_rx }));
    ServiceHandle { name, join, shutdown_tx: Some(shutdown_tx) }
}

/// A group of services stopped together.
#[derive(Default)]
pub struct MultiServiceHandle {
    handles: Vec<ServiceHandle>,
}

impl MultiServiceHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, handle: ServiceHandle) {
        self.handles.push(handle);
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Signals every service first, then awaits them in insertion order.
    /// Returns the first join error, after all services have been awaited.
    pub async fn shutdown(mut self) -> Result<(), JoinError> {
        for handle in &mut self.handles {
            handle.request_shutdown();
        }
        let mut first_err = None;
        for handle in self.handles {
            let name = handle.name;
            if let Err(e) = handle.join.await {
                warn!("Service {} ended abnormally: {}", name, e);
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}
