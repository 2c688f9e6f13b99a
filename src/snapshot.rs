//! Snapshot loader: one-shot `GET /coils` merged into the store on mount.
//!
//! ERROR HANDLING
//! ==============
//! A failed fetch leaves the store untouched and raises an error toast.
//! There is no automatic retry; the next mount loads again.

use tracing::{info, warn};

use crate::api::{ApiError, YardBackend};
use crate::coil::Coil;
use crate::notify::Notifier;
use crate::store::{MergeSummary, SharedStore};

pub const FETCH_FAILED: &str = "Failed to fetch coil data from backend.";

/// Fetch the full coil list and merge it into `store`.
///
/// The store watermark is read before the request goes out, so records that
/// change while the fetch is in flight are kept over the snapshot.
///
/// # Errors
///
/// Returns the backend error after notifying the operator.
pub async fn load_snapshot(
    backend: &dyn YardBackend,
    store: &SharedStore,
    notifier: &Notifier,
) -> Result<MergeSummary, ApiError> {
    let watermark = store.watermark().await;

    let records = match backend.fetch_coils().await {
        Ok(records) => records,
        Err(e) => {
            warn!(error = %e, "snapshot: fetch failed");
            notifier.error("Error", FETCH_FAILED);
            return Err(e);
        }
    };

    let coils: Vec<Coil> = records.into_iter().map(Coil::from).collect();
    let summary = store.merge_snapshot(coils, watermark).await;
    info!(
        applied = summary.applied,
        kept_local = summary.kept_local,
        skipped = summary.skipped,
        dropped = summary.dropped,
        "snapshot: merged"
    );
    Ok(summary)
}

#[cfg(test)]
#[path = "snapshot_test.rs"]
mod tests;
