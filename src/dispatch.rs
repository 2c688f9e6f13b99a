//! Command dispatcher: crane task assignment and manual coil registration.
//!
//! DESIGN
//! ======
//! Validation happens before any network call. The store is mutated only
//! after the backend acknowledges, so a failure never needs a rollback. Each
//! submission gets a client-side request id that tags its log span.
//!
//! Status flow for a coil: `CoilYard` → `Dispatched` on a confirmed
//! assignment. Nothing moves it back.

use std::sync::Arc;

use serde_json::Value;
use tracing::{Instrument, info, info_span, warn};
use uuid::Uuid;

use crate::api::{ApiError, YardBackend};
use crate::coil::{ASSIGN_CRANE_ID, AssignTask, NewCoil};
use crate::location::{DropLocation, LocationError, SaddleLocation};
use crate::notify::Notifier;
use crate::store::SharedStore;

pub const MISSING_INPUT: &str = "Please enter coil ID and select drop location";
pub const ASSIGN_FAILED: &str = "Failed to assign task to crane.";
pub const ADD_FAILED: &str = "Failed to add coil.";

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("coil id and drop location are required")]
    MissingInput,
    #[error("coil id is required")]
    MissingCoilId,
    #[error("invalid saddle location: {0}")]
    InvalidLocation(#[from] LocationError),
    #[error(transparent)]
    Backend(#[from] ApiError),
}

// =============================================================================
// FORM
// =============================================================================

/// Operator input for a crane task. Urgency lives here only; it is never
/// stored on a coil.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssignForm {
    coil_id: String,
    drop_location: Option<DropLocation>,
    urgent: bool,
}

impl AssignForm {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Coil ids are uppercased as they are typed.
    pub fn set_coil_id(&mut self, raw: &str) {
        self.coil_id = raw.to_uppercase();
    }

    pub fn select_drop(&mut self, drop: Option<DropLocation>) {
        self.drop_location = drop;
    }

    pub fn toggle_urgent(&mut self) {
        self.urgent = !self.urgent;
    }

    pub fn set_urgent(&mut self, urgent: bool) {
        self.urgent = urgent;
    }

    #[must_use]
    pub fn coil_id(&self) -> &str {
        &self.coil_id
    }

    #[must_use]
    pub fn drop_location(&self) -> Option<DropLocation> {
        self.drop_location
    }

    #[must_use]
    pub fn is_urgent(&self) -> bool {
        self.urgent
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// A confirmed assignment.
#[derive(Debug, Clone)]
pub struct Assignment {
    pub request_id: Uuid,
    pub task: AssignTask,
    /// Whether a coil in view was updated.
    pub applied: bool,
    pub ack: Value,
}

// =============================================================================
// DISPATCHER
// =============================================================================

#[derive(Clone)]
pub struct CommandDispatcher {
    backend: Arc<dyn YardBackend>,
    store: SharedStore,
    notifier: Notifier,
    /// Crane credited on registrations. Assignments always use
    /// [`ASSIGN_CRANE_ID`].
    crane_id: u32,
}

impl CommandDispatcher {
    #[must_use]
    pub fn new(backend: Arc<dyn YardBackend>, store: SharedStore, notifier: Notifier, crane_id: u32) -> Self {
        Self { backend, store, notifier, crane_id }
    }

    /// Submit the form as a crane task. On acknowledgment the matching coil
    /// becomes `Dispatched` at the drop location and the form is reset.
    ///
    /// # Errors
    ///
    /// [`DispatchError::MissingInput`] without a network call when the coil id
    /// or drop location is missing; [`DispatchError::Backend`] when the
    /// backend rejects the task. Both notify the operator first.
    pub async fn assign(&self, form: &mut AssignForm) -> Result<Assignment, DispatchError> {
        let coil_id = form.coil_id.trim().to_owned();
        let (false, Some(drop)) = (coil_id.is_empty(), form.drop_location) else {
            self.notifier.error("Error", MISSING_INPUT);
            return Err(DispatchError::MissingInput);
        };

        let request_id = Uuid::new_v4();
        let task = AssignTask {
            from_location: self.store.location_of(&coil_id).await,
            coil_id,
            crane_id: ASSIGN_CRANE_ID,
            to_location: drop,
            important: u8::from(form.urgent),
        };

        let span = info_span!("assign", %request_id, coil_id = %task.coil_id, to = %drop);
        async {
            info!(from = ?task.from_location, important = task.important, "dispatch: submitting task");
            let ack = match self.backend.assign_task(&task).await {
                Ok(ack) => ack,
                Err(e) => {
                    warn!(error = %e, "dispatch: assignment failed");
                    self.notifier.error("Error", ASSIGN_FAILED);
                    return Err(DispatchError::from(e));
                }
            };

            let applied = self.store.mark_dispatched(&task.coil_id, drop).await;
            if !applied {
                info!("dispatch: coil not in view, nothing to update");
            }
            form.reset();
            self.notifier.info("Task Assigned", format!("Crane assigned to move {} to {drop}", task.coil_id));

            Ok(Assignment { request_id, task, applied, ack })
        }
        .instrument(span)
        .await
    }

    /// Register a coil by hand. The coil reaches the store through the
    /// backend's `new_coil` event, not locally.
    ///
    /// # Errors
    ///
    /// [`DispatchError::MissingCoilId`] or [`DispatchError::InvalidLocation`]
    /// before any network call; [`DispatchError::Backend`] when the backend
    /// rejects the coil.
    pub async fn register_coil(
        &self,
        coil_id: &str,
        location: &str,
        timestamp: String,
        weight: Option<f64>,
    ) -> Result<Value, DispatchError> {
        let coil_id = coil_id.trim().to_uppercase();
        if coil_id.is_empty() {
            self.notifier.error("Error", "Please enter coil ID");
            return Err(DispatchError::MissingCoilId);
        }
        let location = match location.trim().to_uppercase().parse::<SaddleLocation>() {
            Ok(location) => location,
            Err(e) => {
                self.notifier.error("Invalid saddle location", e.to_string());
                return Err(e.into());
            }
        };

        let coil = NewCoil { coil_id, location, timestamp, weight, crane_id: Some(self.crane_id) };
        match self.backend.add_coil(&coil).await {
            Ok(ack) => {
                info!(coil_id = %coil.coil_id, %location, "dispatch: coil registered");
                self.notifier.info("Coil Added", format!("{} registered at {location}", coil.coil_id));
                Ok(ack)
            }
            Err(e) => {
                warn!(coil_id = %coil.coil_id, error = %e, "dispatch: registration failed");
                self.notifier.error("Error", ADD_FAILED);
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
#[path = "dispatch_test.rs"]
mod tests;
