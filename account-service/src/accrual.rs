//! Recurring interest accrual task
//!
//! One process-wide task runs the sweep on a fixed delay. Shutdown goes
//! through a single cancellation token.
//!
//! ```ignore
//! let cancel = CancellationToken::new();
//! let handle = spawn_accrual_task(ledger.clone(), Duration::from_secs(60), cancel.clone());
//!
//! // On shutdown:
//! cancel.cancel();
//! handle.await?;
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::ledger::Ledger;

/// Spawn the accrual task on the current runtime
pub fn spawn_accrual_task(
    ledger: Arc<Ledger>,
    period: Duration,
    cancellation_token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(run_accrual_task(ledger, period, cancellation_token))
}

/// Run the sweep every `period` until the token is cancelled.
///
/// The first sweep happens one full period after start.
pub async fn run_accrual_task(
    ledger: Arc<Ledger>,
    period: Duration,
    cancellation_token: CancellationToken,
) {
    if period.is_zero() {
        error!("Interest accrual period must be positive; accrual task not started");
        return;
    }

    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!("Interest accrual task started with period {:?}", period);

    loop {
        tokio::select! {
            () = cancellation_token.cancelled() => {
                info!("Interest accrual task shutting down");
                break;
            }
            _ = interval.tick() => {
                match ledger.accrue_interest().await {
                    Ok(report) => debug!("Accrual tick finished: {:?}", report),
                    Err(e) => warn!("Interest accrual sweep failed: {}", e),
                }
            }
        }
    }
}
