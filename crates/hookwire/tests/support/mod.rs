//! Mock agent for end-to-end tests
//!
//! Serves the agent's command API over HTTP and answers traced commands by
//! pushing a response frame to the controller's event listener, the way a
//! hooked agent does.

#![allow(dead_code)]

use axum::extract::{Path, State};
use axum::routing::post;
use axum::{Json, Router};
use hookwire::proto::{decode_body, inbound_frame};
use hookwire::{Command, Envelope};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// Commands the mock agent received, with the client id they were sent to
#[derive(Clone, Default)]
pub struct MockAgent {
    received: Arc<Mutex<Vec<(u64, Command)>>>,
    callback: Arc<Mutex<Option<SocketAddr>>>,
}

impl MockAgent {
    /// Start serving on an ephemeral port
    pub async fn start() -> (Self, SocketAddr) {
        let agent = Self::default();
        let app = Router::new()
            .route("/api/client/{client_id}", post(client_command))
            .route("/api/get_wechat_version", post(|| async { Json(json!({"version": "3.9.2.23"})) }))
            .route("/api/open", post(|| async { Json(json!({"code": 1})) }))
            .route("/api/inject/{pid}", post(|Path(pid): Path<u32>| async move { Json(json!({"pid": pid})) }))
            .route("/api/destory", post(|| async { Json(json!({})) }))
            .with_state(agent.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        (agent, addr)
    }

    /// Point response frames at the controller's listener
    pub fn set_callback(&self, addr: SocketAddr) {
        *self.callback.lock().unwrap() = Some(addr);
    }

    /// Commands received so far
    pub fn received(&self) -> Vec<(u64, Command)> {
        self.received.lock().unwrap().clone()
    }

    /// Push an unsolicited event to the controller
    pub async fn push_event(&self, client_id: u64, payload: Value) {
        let addr = self.callback.lock().unwrap().expect("callback not set");
        push_frame(addr, &inbound_frame(client_id, &payload).unwrap()).await;
    }
}

/// Write one frame and wait for the listener's acknowledgement
pub async fn push_frame(addr: SocketAddr, frame: &[u8]) -> Vec<u8> {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(frame).await.unwrap();
    let _ = stream.shutdown().await;
    let mut ack = Vec::new();
    stream.read_to_end(&mut ack).await.unwrap();
    ack
}

/// Answers traced commands after `data.delay_ms`, unless `data.silent` is set
///
/// `data.ack_delay_ms` holds back the HTTP acknowledgement itself.
async fn client_command(State(agent): State<MockAgent>, Path(client_id): Path<u64>, body: String) -> Json<Value> {
    let envelope: Envelope = decode_body(body.as_bytes()).unwrap();
    let command = Command {
        code: envelope.kind.map(|kind| kind.code()).unwrap_or_default(),
        trace: envelope.trace.clone(),
        data: envelope.data.clone(),
    };
    agent.received.lock().unwrap().push((client_id, command.clone()));

    let silent = command.data.get("silent").and_then(Value::as_bool).unwrap_or(false);
    let delay = command.data.get("delay_ms").and_then(Value::as_u64).unwrap_or(0);
    let ack_delay = command.data.get("ack_delay_ms").and_then(Value::as_u64).unwrap_or(0);
    let callback = *agent.callback.lock().unwrap();

    if let (Some(trace), Some(addr), false) = (command.trace.clone(), callback, silent) {
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(delay)).await;
            let response = json!({
                "type": command.code,
                "trace": trace,
                "data": {"echo": command.data},
            });
            push_frame(addr, &inbound_frame(client_id, &response).unwrap()).await;
        });
    }

    tokio::time::sleep(Duration::from_millis(ack_delay)).await;
    Json(json!({"data": {}}))
}
