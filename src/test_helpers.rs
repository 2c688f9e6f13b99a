//! Shared fixtures for unit tests.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::Notify;

use crate::api::{ApiError, YardBackend};
use crate::coil::{AssignTask, Coil, CoilRecord, CoilStatus, NewCoil, TaskRecord};

pub fn coil(id: &str, location: &str, weight: Option<f64>) -> Coil {
    Coil {
        coil_id: id.to_owned(),
        location: location.to_owned(),
        timestamp: "2025-01-01 00:00:00".to_owned(),
        status: CoilStatus::CoilYard,
        weight,
    }
}

pub fn record(id: &str, location: &str, status: &str, weight: Option<f64>) -> CoilRecord {
    CoilRecord {
        coil_id: id.to_owned(),
        current_location: Some(location.to_owned()),
        timestamp: Some("2025-01-01 00:00:00".to_owned()),
        status: Some(status.to_owned()),
        weight,
        crane: Some(1),
        placed_location: Some(location.to_owned()),
    }
}

fn server_error() -> ApiError {
    ApiError::Status { status: 500, body: "boom".to_owned() }
}

/// In-memory backend recording every call.
#[derive(Default)]
pub struct MockBackend {
    pub coils: Vec<CoilRecord>,
    pub tasks: Vec<TaskRecord>,
    pub fail_fetch: bool,
    pub fail_assign: bool,
    /// When set, `fetch_coils` waits for a permit before answering.
    pub fetch_gate: Option<Notify>,
    pub fetch_calls: AtomicUsize,
    pub assigned: Mutex<Vec<AssignTask>>,
    pub added: Mutex<Vec<NewCoil>>,
}

impl MockBackend {
    pub fn with_coils(coils: Vec<CoilRecord>) -> Self {
        Self { coils, ..Self::default() }
    }

    pub fn failing() -> Self {
        Self { fail_fetch: true, fail_assign: true, ..Self::default() }
    }

    pub fn assign_calls(&self) -> Vec<AssignTask> {
        self.assigned.lock().expect("mock mutex should lock").clone()
    }

    pub fn add_calls(&self) -> Vec<NewCoil> {
        self.added.lock().expect("mock mutex should lock").clone()
    }
}

#[async_trait]
impl YardBackend for MockBackend {
    async fn fetch_coils(&self) -> Result<Vec<CoilRecord>, ApiError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.fetch_gate {
            gate.notified().await;
        }
        if self.fail_fetch { Err(server_error()) } else { Ok(self.coils.clone()) }
    }

    async fn assign_task(&self, task: &AssignTask) -> Result<Value, ApiError> {
        self.assigned.lock().expect("mock mutex should lock").push(task.clone());
        if self.fail_assign { Err(server_error()) } else { Ok(json!({"status": "task assigned"})) }
    }

    async fn fetch_tasks(&self) -> Result<Vec<TaskRecord>, ApiError> {
        if self.fail_fetch { Err(server_error()) } else { Ok(self.tasks.clone()) }
    }

    async fn add_coil(&self, coil: &NewCoil) -> Result<Value, ApiError> {
        self.added.lock().expect("mock mutex should lock").push(coil.clone());
        Ok(json!({"status": "coil added"}))
    }
}

/// Serve `router` on an ephemeral local port and return its origin.
pub async fn spawn_server(router: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind test listener");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    format!("http://{addr}")
}
