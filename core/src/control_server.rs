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

//! HTTP control surface for loop mode.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;

use crate::loop_controller::{ControlError, LoopController, LoopStatus, PlaybackMode};
use crate::service::StopHandle;

#[derive(Debug, Clone, Serialize)]
pub struct ControlResponse {
    pub ok: bool,
    pub mode: PlaybackMode,
    pub file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ControlResponse {
    fn success(status: LoopStatus) -> Self {
        Self { ok: true, mode: status.mode, file: status.file, error: None }
    }

    fn failure(status: LoopStatus, error: String) -> Self {
        Self { ok: false, mode: status.mode, file: status.file, error: Some(error) }
    }
}

#[derive(Debug, Deserialize)]
pub struct PlayRequest {
    pub file: String,
}

type ControlReply = (StatusCode, Json<ControlResponse>);

pub fn control_routes() -> Router<Arc<LoopController>> {
    Router::new()
        .route("/api/status", get(get_status))
        .route("/api/trigger", post(post_trigger))
        .route("/api/loop", post(post_loop))
        .route("/api/play", post(post_play))
}

pub fn router(controller: Arc<LoopController>) -> Router {
    control_routes().with_state(controller)
}

async fn get_status(State(controller): State<Arc<LoopController>>) -> Json<ControlResponse> {
    Json(ControlResponse::success(controller.status().await))
}

async fn post_trigger(State(controller): State<Arc<LoopController>>) -> ControlReply {
    let result = controller.play_triggered().await;
    reply(&controller, result).await
}

async fn post_loop(State(controller): State<Arc<LoopController>>) -> ControlReply {
    let result = controller.play_loop().await;
    reply(&controller, result).await
}

async fn post_play(
    State(controller): State<Arc<LoopController>>,
    request: Result<Json<PlayRequest>, JsonRejection>,
) -> ControlReply {
    let request = match request {
        Ok(Json(request)) => request,
        Err(rejection) => {
            warn!("Malformed play request: {}", rejection.body_text());
            let current = controller.status().await;
            return (rejection.status(), Json(ControlResponse::failure(current, rejection.body_text())));
        }
    };
    let result = controller.play_custom(&request.file).await;
    reply(&controller, result).await
}

async fn reply(controller: &LoopController, result: Result<LoopStatus, ControlError>) -> ControlReply {
    match result {
        Ok(status) => (StatusCode::OK, Json(ControlResponse::success(status))),
        Err(e) => {
            let code = match &e {
                ControlError::OutsideStore(_) => StatusCode::BAD_REQUEST,
                ControlError::FileNotFound(_) => StatusCode::NOT_FOUND,
                ControlError::Player(_) => StatusCode::INTERNAL_SERVER_ERROR,
            };
            warn!("Control request failed: {}", e);
            let current = controller.status().await;
            (code, Json(ControlResponse::failure(current, e.to_string())))
        }
    }
}

/// Serves the control routes on `listener` until shutdown is requested.
pub async fn serve(listener: TcpListener, controller: Arc<LoopController>, mut stop: StopHandle) {
    if let Ok(addr) = listener.local_addr() {
        info!("Control surface listening on http://{}", addr);
    }
    let result = axum::serve(listener, router(controller))
        .with_graceful_shutdown(async move { stop.signaled().await })
        .await;
    if let Err(e) = result {
        error!("Control surface failed: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loop_controller::LoopTargets;
    use crate::media_store::MediaStore;
    use crate::service::spawn_service;
    use crate::testing::MockBackend;
    use crate::usb::sync::tests::write_file;
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::{json, Value};
    use tempfile::TempDir;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tower::ServiceExt;

    fn setup() -> (TempDir, Arc<MockBackend>, Arc<LoopController>) {
        let store = TempDir::new().unwrap();
        write_file(store.path(), "loop.mp4", b"loop", 1_000);
        write_file(store.path(), "triggered.mp4", b"triggered", 1_000);
        write_file(store.path(), "promo.mov", b"promo", 1_000);
        let backend = MockBackend::new(1);
        let controller = Arc::new(LoopController::new(
            backend.player(),
            MediaStore::new(store.path()),
            None,
            LoopTargets::default(),
        ));
        (store, backend, controller)
    }

    async fn call(controller: &Arc<LoopController>, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                request = request.header("content-type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        let response = router(controller.clone())
            .oneshot(request.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn status_before_anything_started() {
        let (_store, _backend, controller) = setup();
        let (code, body) = call(&controller, "GET", "/api/status", None).await;
        assert_eq!(code, StatusCode::OK);
        assert_eq!(body, json!({"ok": true, "mode": "loop", "file": null}));
    }

    #[tokio::test]
    async fn trigger_and_loop_switch_files() {
        let (_store, backend, controller) = setup();

        let (code, body) = call(&controller, "POST", "/api/trigger", None).await;
        assert_eq!(code, StatusCode::OK);
        assert_eq!(body, json!({"ok": true, "mode": "triggered", "file": "triggered.mp4"}));

        let (code, body) = call(&controller, "POST", "/api/loop", None).await;
        assert_eq!(code, StatusCode::OK);
        assert_eq!(body, json!({"ok": true, "mode": "loop", "file": "loop.mp4"}));
        assert_eq!(backend.starts(), 2);
    }

    #[tokio::test]
    async fn play_named_file() {
        let (_store, _backend, controller) = setup();
        let (code, body) = call(&controller, "POST", "/api/play", Some(json!({"file": "promo.mov"}))).await;
        assert_eq!(code, StatusCode::OK);
        assert_eq!(body, json!({"ok": true, "mode": "custom", "file": "promo.mov"}));
    }

    #[tokio::test]
    async fn play_rejects_traversal_and_missing_files() {
        let (_store, backend, controller) = setup();
        controller.play_loop().await.unwrap();

        let (code, body) = call(&controller, "POST", "/api/play", Some(json!({"file": "../../etc/passwd"}))).await;
        assert_eq!(code, StatusCode::BAD_REQUEST);
        assert_eq!(body["ok"], json!(false));
        assert_eq!(body["mode"], json!("loop"));
        assert_eq!(body["file"], json!("loop.mp4"));
        assert!(body["error"].is_string());

        let (code, body) = call(&controller, "POST", "/api/play", Some(json!({"file": "gone.mp4"}))).await;
        assert_eq!(code, StatusCode::NOT_FOUND);
        assert_eq!(body["ok"], json!(false));
        assert_eq!(backend.starts(), 1);
    }

    #[tokio::test]
    async fn malformed_play_body_gets_a_json_failure() {
        let (_store, backend, controller) = setup();
        let (code, body) = call(&controller, "POST", "/api/play", Some(json!({"file": 1}))).await;
        assert!(code.is_client_error());
        assert_eq!(body["ok"], json!(false));
        assert_eq!(body["mode"], json!("loop"));
        assert!(body["error"].is_string());
        assert_eq!(backend.starts(), 0);
    }

    #[tokio::test]
    async fn serve_answers_until_shutdown() {
        let (_store, _backend, controller) = setup();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = spawn_service("control", move |stop| serve(listener, controller, stop));

        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET /api/status HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.contains("\"mode\":\"loop\""));

        handle.shutdown().await.unwrap();
    }
}
