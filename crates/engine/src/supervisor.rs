//! Worker startup.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{info, warn};

use common::{ExchangeConnector, Result};
use store::Store;

use crate::cycle::CycleWorker;
use crate::sweeper::Sweeper;

/// Gap between spawning successive pair workers, so their first
/// requests don't hit the exchange simultaneously.
pub const STARTUP_STAGGER: Duration = Duration::from_secs(10);

/// Spawns one cycle worker per active pair plus the reconciliation
/// sweeper. Workers are self-healing loops; nothing here watches or
/// restarts them.
pub struct Supervisor {
    store: Store,
    connector: Arc<dyn ExchangeConnector>,
}

impl Supervisor {
    pub fn new(store: Store, connector: Arc<dyn ExchangeConnector>) -> Self {
        Self { store, connector }
    }

    /// Spawn all workers. Returns once everything is running.
    pub async fn start(self) -> Result<()> {
        let pairs = self.store.active_pairs().await?;
        if pairs.is_empty() {
            warn!("No active buy-then-sell pairs in settings, only the sweeper will run");
        }

        let total = pairs.len();
        for (i, settings) in pairs.into_iter().enumerate() {
            if i > 0 {
                sleep(STARTUP_STAGGER).await;
            }
            let client = self.connector.connect(&settings.credentials());
            info!(symbol = %settings.symbol, worker = i + 1, total, "Starting cycle worker");
            tokio::spawn(CycleWorker::new(settings, client, self.store.clone()).run());
        }

        tokio::spawn(Sweeper::new(self.store.clone(), self.connector.clone()).run());
        Ok(())
    }
}
