//! Background tasks for the callbridge server.
//!
//! Includes:
//! - Sweeping call sessions that stopped receiving events.

use callbridge_calls::EventRouter;
use std::sync::Arc;
use tokio::time::{sleep, Duration};

/// Starts the stale-session sweeper.
///
/// Calls whose provider never sent a terminal webhook would otherwise stay
/// in the registry forever. Every `interval_secs` the sweeper terminates
/// sessions that are not streaming and have seen no event for
/// `stale_after_secs`.
pub async fn start_session_sweeper(
    router: Arc<EventRouter>,
    stale_after_secs: u64,
    interval_secs: u64,
) {
    if stale_after_secs == 0 {
        tracing::warn!("session sweeper disabled (stale_after_secs=0)");
        return;
    }

    let interval = Duration::from_secs(interval_secs.max(1));
    let stale_after = Duration::from_secs(stale_after_secs);

    tracing::info!(
        stale_after_secs,
        interval_secs = interval.as_secs(),
        "starting session sweeper"
    );

    loop {
        sleep(interval).await;

        let swept = router.sweep_stale(stale_after);
        if !swept.is_empty() {
            tracing::info!(count = swept.len(), calls = ?swept, "swept stale call sessions");
        }
    }
}
