//! View Controller
//!
//! Drives snapshot fetches for whatever the operator is looking at. Results
//! are handed to the [`SyncEngine`], which decides whether they still apply.

use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};

use tokenwise_core::format::format_address;

use crate::sync_engine::{Subject, SyncEngine};

#[derive(Debug, Clone)]
pub struct ViewController {
    engine: SyncEngine,
}

impl ViewController {
    pub fn new(engine: SyncEngine) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &SyncEngine {
        &self.engine
    }

    /// Fetch holders and dashboard concurrently
    ///
    /// The loading flag clears only after both calls finish, whatever
    /// their outcome.
    #[instrument(skip(self))]
    pub async fn initial_load(&self) {
        info!("[Controller] Initial load");
        self.engine.set_loading(true);

        let source = self.engine.source();
        let contract = self.engine.config().contract.clone();
        let holders_ticket = self.engine.begin_holders_fetch();
        let dashboard_seq = self.engine.next_sequence();

        tokio::join!(
            async {
                let result = source.fetch_holders(&contract).await;
                self.engine.apply_holders(holders_ticket, result);
            },
            async {
                let result = source.fetch_dashboard().await;
                self.engine.apply_polled_dashboard(dashboard_seq, result);
            }
        );

        self.engine.set_loading(false);
    }

    /// Re-fetch the holder list; the active subject is left alone
    pub async fn refresh_holders(&self) -> bool {
        let ticket = self.engine.begin_holders_fetch();
        let result = self
            .engine
            .source()
            .fetch_holders(&self.engine.config().contract)
            .await;
        self.engine.apply_holders(ticket, result)
    }

    pub async fn refresh_dashboard(&self) -> bool {
        self.engine.refresh_dashboard().await
    }

    /// Select `owner`, switch to the wallet subject and load its history
    ///
    /// Returns `false` if the result was superseded by a later selection
    /// or the fetch failed.
    pub async fn select_wallet(&self, owner: &str) -> bool {
        let generation = self.engine.begin_wallet_selection(owner);
        let result = self.engine.source().fetch_wallet_history(owner).await;
        self.engine.apply_wallet_history(generation, owner, result)
    }

    /// Like [`select_wallet`](Self::select_wallet), without waiting for the
    /// fetch
    pub fn spawn_select_wallet(&self, owner: String) -> JoinHandle<bool> {
        let generation = self.engine.begin_wallet_selection(&owner);
        let engine = self.engine.clone();
        tokio::spawn(async move {
            let result = engine.source().fetch_wallet_history(&owner).await;
            engine.apply_wallet_history(generation, &owner, result)
        })
    }

    /// Select the holder at `index` (0-based) of the current list
    pub fn spawn_select_holder(&self, index: usize) -> Option<JoinHandle<bool>> {
        let owner = self
            .engine
            .view()
            .holders
            .get(index)
            .map(|holder| holder.owner.clone());

        match owner {
            Some(owner) => {
                info!(
                    "[Controller] Selecting holder #{} ({})",
                    index + 1,
                    format_address(&owner)
                );
                Some(self.spawn_select_wallet(owner))
            }
            None => {
                warn!("[Controller] No holder at position {}", index + 1);
                None
            }
        }
    }

    /// Switch subject; the wallet subject needs a selected wallet
    pub fn set_subject(&self, subject: Subject) -> bool {
        if subject == Subject::Wallet && self.engine.view().selected_wallet.is_none() {
            warn!("[Controller] No wallet selected");
            return false;
        }
        self.engine.set_subject(subject);
        true
    }

    pub async fn start_monitoring(&self) -> bool {
        let result = self.engine.source().start_monitoring().await;
        self.engine.apply_monitoring_result(true, result)
    }

    pub async fn stop_monitoring(&self) -> bool {
        let result = self.engine.source().stop_monitoring().await;
        self.engine.apply_monitoring_result(false, result)
    }

    /// Called after each render cycle
    pub fn acknowledge_render(&self) -> usize {
        self.engine.acknowledge_render()
    }
}
