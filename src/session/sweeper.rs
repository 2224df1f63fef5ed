use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::session::service::sweep_ledger;
use crate::store::TokenLedger;

/// Periodically purge sessions past their expiry.
///
/// A failed pass is logged and retried on the next tick.
pub fn spawn_sweeper(ledger: Arc<dyn TokenLedger>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // first tick completes immediately
        interval.tick().await;

        loop {
            interval.tick().await;
            if let Err(e) = sweep_ledger(ledger.as_ref()).await {
                tracing::error!(error = %e, "Session sweep failed");
            }
        }
    })
}
