#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::net::TcpListener;

pub const WORKFLOW: &str = r#"{
    "56": {"class_type": "LoadImage", "inputs": {"image": "example.png"}},
    "85": {"class_type": "LoadImage", "inputs": {"image": "example.png"}},
    "87": {"class_type": "LoadImage", "inputs": {"image": "example.png"}},
    "82": {"class_type": "LoadImage", "inputs": {"image": "example.png"}},
    "67": {"class_type": "SaveGLB", "inputs": {"filename_prefix": "mesh/ComfyUI"}}
}"#;

/// In-process stand-in for the rendering engine's submission endpoint.
#[derive(Clone)]
pub struct FakeEngine {
    pub addr: SocketAddr,
    received: Arc<Mutex<Vec<Value>>>,
}

#[derive(Clone)]
struct EngineState {
    received: Arc<Mutex<Vec<Value>>>,
    status: StatusCode,
}

async fn accept_prompt(
    State(state): State<EngineState>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let id = {
        let mut received = state.received.lock();
        received.push(body);
        received.len()
    };
    if state.status.is_success() {
        (state.status, Json(json!({ "prompt_id": format!("job-{id}"), "number": id })))
    } else {
        (state.status, Json(json!({ "error": "engine busy" })))
    }
}

impl FakeEngine {
    pub async fn start(status: StatusCode) -> Self {
        let received = Arc::new(Mutex::new(Vec::new()));
        let app = Router::new()
            .route("/prompt", post(accept_prompt))
            .with_state(EngineState {
                received: Arc::clone(&received),
                status,
            });

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, received }
    }

    pub fn endpoint(&self) -> String {
        format!("http://{}/prompt", self.addr)
    }

    pub fn received(&self) -> Vec<Value> {
        self.received.lock().clone()
    }
}

pub fn write_files(dir: &Path, names: &[&str]) -> PathBuf {
    std::fs::create_dir_all(dir).unwrap();
    for name in names {
        std::fs::write(dir.join(name), name.as_bytes()).unwrap();
    }
    dir.to_path_buf()
}
