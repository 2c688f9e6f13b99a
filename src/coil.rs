//! Coil records and the backend wire shapes they are built from.
//!
//! DESIGN
//! ======
//! `Coil` is the client-side shape every surface renders. The backend speaks
//! two richer shapes: `CoilRecord` rows from `GET /coils` and `CoilEvent`
//! payloads from the `new_coil` push event. Both normalize into `Coil`
//! through `From` so callers never map fields by hand.

use serde::{Deserialize, Serialize};

use crate::location::{DropLocation, SaddleLocation};

/// Backend status string that maps to [`CoilStatus::Dispatched`].
pub const BACKEND_DISPATCHED: &str = "Dispatched";

// =============================================================================
// COIL
// =============================================================================

/// Two-valued yard status. Moves `CoilYard` → `Dispatched` and never back.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoilStatus {
    #[default]
    CoilYard,
    Dispatched,
}

impl CoilStatus {
    /// Map a backend status string. Only the exact `"Dispatched"` counts.
    #[must_use]
    pub fn from_backend(raw: Option<&str>) -> Self {
        if raw == Some(BACKEND_DISPATCHED) { Self::Dispatched } else { Self::CoilYard }
    }

    /// Human label used by the table's status column.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::CoilYard => "Coil Yard",
            Self::Dispatched => "Dispatched",
        }
    }
}

/// A coil as held by the store and rendered by every surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coil {
    pub coil_id: String,
    pub location: String,
    /// Display-only; never parsed.
    pub timestamp: String,
    pub status: CoilStatus,
    /// Tonnes. `None` renders as `N/A`.
    pub weight: Option<f64>,
}

impl Coil {
    #[must_use]
    pub fn is_dispatched(&self) -> bool {
        self.status == CoilStatus::Dispatched
    }
}

// =============================================================================
// BACKEND SHAPES
// =============================================================================

/// One row of `GET /coils`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoilRecord {
    pub coil_id: String,
    #[serde(default)]
    pub current_location: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub weight: Option<f64>,
    #[serde(default)]
    pub crane: Option<i64>,
    #[serde(default)]
    pub placed_location: Option<String>,
}

impl From<CoilRecord> for Coil {
    fn from(record: CoilRecord) -> Self {
        Self {
            status: CoilStatus::from_backend(record.status.as_deref()),
            coil_id: record.coil_id,
            location: record.current_location.unwrap_or_default(),
            timestamp: record.timestamp.unwrap_or_default(),
            weight: record.weight,
        }
    }
}

/// Payload of the `new_coil` push event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoilEvent {
    pub coil_id: String,
    pub location: String,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub weight: Option<f64>,
}

/// Events announce new production, so the status is always `CoilYard`
/// regardless of what the backend attached.
impl From<CoilEvent> for Coil {
    fn from(event: CoilEvent) -> Self {
        Self {
            coil_id: event.coil_id,
            location: event.location,
            timestamp: event.timestamp,
            status: CoilStatus::CoilYard,
            weight: event.weight,
        }
    }
}

/// Crane every `POST /assign_task` targets. There is no crane selection.
pub const ASSIGN_CRANE_ID: u32 = 1;

/// Body of `POST /assign_task`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignTask {
    pub coil_id: String,
    pub crane_id: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_location: Option<String>,
    pub to_location: DropLocation,
    /// `1` when the operator marked the task urgent, otherwise `0`.
    pub important: u8,
}

/// One row of `GET /tasks`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub task_id: i64,
    pub coil_id: String,
    #[serde(default)]
    pub crane_assigned: Option<i64>,
    #[serde(default)]
    pub pick_location: Option<String>,
    #[serde(default)]
    pub drop_location: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub important: i64,
}

impl TaskRecord {
    #[must_use]
    pub fn is_urgent(&self) -> bool {
        self.important != 0
    }
}

/// Display format of backend timestamps.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Local wall-clock time in [`TIMESTAMP_FORMAT`], for coils registered here.
#[must_use]
pub fn timestamp_now() -> String {
    chrono::Local::now().format(TIMESTAMP_FORMAT).to_string()
}

/// Body of `POST /add_coil`, a manually registered coil.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewCoil {
    pub coil_id: String,
    pub location: SaddleLocation,
    /// `YYYY-MM-DD HH:MM:SS`, passed through to the backend.
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crane_id: Option<u32>,
}

#[cfg(test)]
#[path = "coil_test.rs"]
mod tests;
