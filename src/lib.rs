//! Live coil-yard client.
//!
//! Keeps one bounded view of coils consistent across the dashboard and the
//! coil table: a snapshot from `GET /coils` on mount, incremental `new_coil`
//! records from the Socket.IO channel, and local status transitions after the
//! backend acknowledges a crane task.

pub mod api;
pub mod channel;
pub mod coil;
pub mod config;
pub mod dispatch;
pub mod location;
pub mod notify;
pub mod snapshot;
pub mod store;
pub mod surface;
pub mod view;

#[cfg(test)]
mod test_helpers;
