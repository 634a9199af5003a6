use async_trait::async_trait;
use chainjack_engine::amount::{Amount, DEFAULT_MAX_BET, DEFAULT_MIN_BET};
use chainjack_engine::cards::Card;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use crate::view::{Game, GameId, PlayerId, PlayerStats, RoundResult};

/// Buffer for per-player event subscriptions; slow consumers lose events,
/// which the polling fallback repairs.
pub const EVENT_CHANNEL_BUFFER: usize = 256;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Ledger transport unavailable: {0}")]
    TransportUnavailable(String),
    #[error("Rejected by ledger: {0}")]
    Rejected(String),
    #[error("Ledger call timed out")]
    Timeout,
}

/// Table limits as the ledger reports them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BetLimits {
    pub min: Amount,
    pub max: Amount,
}

impl Default for BetLimits {
    fn default() -> Self {
        Self {
            min: DEFAULT_MIN_BET,
            max: DEFAULT_MAX_BET,
        }
    }
}

impl BetLimits {
    pub fn contains(&self, bet: Amount) -> bool {
        (self.min..=self.max).contains(&bet)
    }
}

/// Full round state as returned by an authoritative read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerGameState {
    pub player: PlayerId,
    pub game_id: GameId,
    pub player_cards: Vec<Card>,
    pub dealer_cards: Vec<Card>,
    pub bet: Amount,
    pub result: RoundResult,
    pub is_active: bool,
    pub dealer_turn: bool,
    pub payout: Amount,
    pub timestamp: DateTime<Utc>,
}

impl From<LedgerGameState> for Game {
    fn from(s: LedgerGameState) -> Game {
        Game {
            game_id: s.game_id,
            player_hand: s.player_cards,
            dealer_hand: s.dealer_cards,
            bet: s.bet,
            result: s.result,
            is_active: s.is_active,
            dealer_turn: s.dealer_turn,
            payout: s.payout,
            timestamp: s.timestamp,
            projected_draws: 0,
        }
    }
}

/// Notifications emitted by the ledger. Delivery is at-least-once and
/// ordered per player only; duplicates and gaps are expected, so these
/// never serve as the sole source of truth.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerEvent {
    Started {
        player: PlayerId,
        game_id: GameId,
        bet: Amount,
        timestamp: DateTime<Utc>,
    },
    CardDealt {
        player: PlayerId,
        game_id: GameId,
        card: Card,
        is_dealer: bool,
        timestamp: DateTime<Utc>,
    },
    Ended {
        player: PlayerId,
        game_id: GameId,
        result: RoundResult,
        payout: Amount,
        timestamp: DateTime<Utc>,
    },
    StatsUpdated {
        player: PlayerId,
        total_games: u64,
        wins: u64,
        losses: u64,
    },
}

/// Terminal outcome of one submitted action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionOutcome {
    /// The ledger accepted the action; the attached state is authoritative.
    Confirmed(LedgerGameState),
    Rejected(String),
}

/// Returned immediately by every `submit_*` call; resolves once the ledger
/// commits or refuses the action.
#[derive(Debug)]
pub struct SubmissionHandle {
    pub tx_id: Uuid,
    outcome: oneshot::Receiver<SubmissionOutcome>,
}

impl SubmissionHandle {
    /// Creates a handle plus the resolver the connector keeps.
    pub fn channel() -> (SubmissionHandle, SubmissionResolver) {
        let (tx, rx) = oneshot::channel();
        let tx_id = Uuid::new_v4();
        (SubmissionHandle { tx_id, outcome: rx }, SubmissionResolver(tx))
    }

    /// Waits for the ledger's verdict. A dropped resolver reads as a
    /// transport failure.
    pub async fn outcome(self) -> Result<SubmissionOutcome, LedgerError> {
        self.outcome
            .await
            .map_err(|_| LedgerError::TransportUnavailable("submission channel closed".into()))
    }
}

/// Connector-side end of a [`SubmissionHandle`].
#[derive(Debug)]
pub struct SubmissionResolver(oneshot::Sender<SubmissionOutcome>);

impl SubmissionResolver {
    pub fn confirm(self, state: LedgerGameState) {
        let _ = self.0.send(SubmissionOutcome::Confirmed(state));
    }

    pub fn reject(self, reason: impl Into<String>) {
        let _ = self.0.send(SubmissionOutcome::Rejected(reason.into()));
    }
}

/// Transport-agnostic surface of the remote ledger.
///
/// Submissions act on behalf of the identity the connector was bound to
/// at construction and return without blocking; reads are idempotent and
/// side-effect-free. Implementations wrap whatever transport reaches the
/// actual ledger; tests use [`crate::mock::MockLedger`].
#[async_trait]
pub trait LedgerConnector: Send + Sync {
    async fn submit_start(&self, bet: Amount) -> Result<SubmissionHandle, LedgerError>;
    async fn submit_hit(&self) -> Result<SubmissionHandle, LedgerError>;
    async fn submit_stand(&self) -> Result<SubmissionHandle, LedgerError>;
    async fn submit_double(&self, bet: Amount) -> Result<SubmissionHandle, LedgerError>;
    async fn submit_forfeit(&self) -> Result<SubmissionHandle, LedgerError>;

    /// Reads the player's current (or most recent) round; `None` when the
    /// player has never started one.
    async fn read_game_state(
        &self,
        player: &PlayerId,
    ) -> Result<Option<LedgerGameState>, LedgerError>;

    async fn read_player_stats(&self, player: &PlayerId) -> Result<PlayerStats, LedgerError>;

    /// Table limits; connectors that cannot report them fall back to the
    /// deployment defaults.
    async fn read_bet_limits(&self) -> Result<BetLimits, LedgerError> {
        Ok(BetLimits::default())
    }

    /// Opens the per-player event stream. At-least-once delivery; the
    /// receiver closing is not an error for the ledger.
    async fn subscribe(
        &self,
        player: &PlayerId,
    ) -> Result<mpsc::Receiver<LedgerEvent>, LedgerError>;
}
