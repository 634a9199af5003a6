use std::sync::Arc;

use chainjack_engine::amount::Amount;
use thiserror::Error;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::{ClientConfig, ConfigError};
use crate::ledger::{BetLimits, LedgerConnector, LedgerError};
use crate::orchestrator::{ActionError, Orchestrator};
use crate::reconcile::Reconciler;
use crate::store::GameStore;
use crate::view::{GameView, PlayerId};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// One player's session against the ledger.
///
/// Owns the store, the orchestrator, and the background reconciliation
/// task; dropping the client stops reconciliation. All reads go through
/// [`view`](Self::view) or [`subscribe`](Self::subscribe) snapshots.
pub struct GameClient {
    store: GameStore,
    orchestrator: Orchestrator,
    refresh_now: Arc<Notify>,
    reconciler: JoinHandle<()>,
}

impl GameClient {
    /// Binds a session to `player` over the given connector and starts
    /// the reconciliation loop. Table limits come from the config
    /// override, then the ledger, then the deployment defaults.
    pub async fn connect(
        ledger: Arc<dyn LedgerConnector>,
        player: impl Into<PlayerId>,
        config: ClientConfig,
    ) -> Result<Self, ClientError> {
        config.validate()?;
        let player = player.into();

        let limits = match config.bet_limits {
            Some(limits) => limits,
            None => match ledger.read_bet_limits().await {
                Ok(limits) => limits,
                Err(err) => {
                    tracing::warn!(error = %err, "bet limit read failed, using defaults");
                    BetLimits::default()
                }
            },
        };

        let store = GameStore::new();
        let refresh_now = Arc::new(Notify::new());

        let orchestrator = Orchestrator::new(
            store.clone(),
            ledger.clone(),
            player.clone(),
            limits,
            config.submission_timeout,
            config.history_limit,
            refresh_now.clone(),
        );

        let reconciler = Reconciler::new(
            store.clone(),
            ledger,
            player.clone(),
            config.poll_interval,
            config.history_limit,
            refresh_now.clone(),
        );
        let reconciler = tokio::spawn(reconciler.run());

        tracing::info!(player = %player, "session connected");
        Ok(Self {
            store,
            orchestrator,
            refresh_now,
            reconciler,
        })
    }

    /// Snapshot of the current reconciled view.
    pub fn view(&self) -> GameView {
        self.store.current()
    }

    /// Change-notified receiver over the view, for UI loops.
    pub fn subscribe(&self) -> watch::Receiver<GameView> {
        self.store.subscribe()
    }

    pub fn limits(&self) -> BetLimits {
        self.orchestrator.limits()
    }

    pub fn player(&self) -> &PlayerId {
        self.orchestrator.player()
    }

    pub async fn start(&self, bet: Amount) -> Result<Uuid, ActionError> {
        self.orchestrator.start(bet).await
    }

    pub async fn hit(&self) -> Result<Uuid, ActionError> {
        self.orchestrator.hit().await
    }

    pub async fn stand(&self) -> Result<Uuid, ActionError> {
        self.orchestrator.stand().await
    }

    pub async fn double(&self) -> Result<Uuid, ActionError> {
        self.orchestrator.double().await
    }

    pub async fn forfeit(&self) -> Result<Uuid, ActionError> {
        self.orchestrator.forfeit().await
    }

    /// Dismisses a resolved round, returning the table to idle.
    pub fn acknowledge(&self) -> Result<(), ActionError> {
        self.orchestrator.acknowledge()
    }

    pub fn dismiss_error(&self) {
        self.orchestrator.dismiss_error()
    }

    /// Asks the reconciler for an immediate authoritative reload instead
    /// of waiting out the poll interval.
    pub fn refresh(&self) {
        self.refresh_now.notify_one();
    }
}

impl Drop for GameClient {
    fn drop(&mut self) {
        self.reconciler.abort();
    }
}
