use chainjack_engine::amount::Amount;
use chainjack_engine::cards::Card;
use chainjack_engine::hand;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque player identity as the ledger reports it (an address-like string).
pub type PlayerId = String;

/// Ledger-assigned round identity, unique once a round starts.
pub type GameId = u64;

/// Client-side lifecycle of a round, derived from the reconciled state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// No round on the table; a start action is the only legal one.
    #[default]
    Idle,
    /// A start action was submitted and awaits ledger confirmation.
    AwaitingStart,
    /// The player may act.
    PlayerTurn,
    /// A player action was submitted and awaits ledger confirmation.
    AwaitingAction,
    /// The ledger is auto-playing the dealer hand.
    DealerTurn,
    /// The round reached a terminal result and awaits acknowledgement.
    Resolved,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Start,
    Hit,
    Stand,
    Double,
    Forfeit,
}

/// Round outcome as encoded on the wire (0 = in progress .. 3 = push).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum RoundResult {
    InProgress = 0,
    PlayerWin = 1,
    DealerWin = 2,
    Push = 3,
}

impl From<RoundResult> for u8 {
    fn from(r: RoundResult) -> u8 {
        r as u8
    }
}

impl TryFrom<u8> for RoundResult {
    type Error = String;

    fn try_from(v: u8) -> Result<RoundResult, Self::Error> {
        match v {
            0 => Ok(RoundResult::InProgress),
            1 => Ok(RoundResult::PlayerWin),
            2 => Ok(RoundResult::DealerWin),
            3 => Ok(RoundResult::Push),
            other => Err(format!("invalid result encoding: {other}")),
        }
    }
}

/// One round of play as the client sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Game {
    pub game_id: GameId,
    pub player_hand: Vec<Card>,
    pub dealer_hand: Vec<Card>,
    /// Wager in ledger base units; doubled by a confirmed double-down.
    pub bet: Amount,
    pub result: RoundResult,
    pub is_active: bool,
    pub dealer_turn: bool,
    /// Amount returned by the ledger when the round ended (0 while active).
    pub payout: Amount,
    pub timestamp: DateTime<Utc>,
    /// Face-down cards projected optimistically for an unconfirmed draw.
    /// Never part of the score; wiped by any authoritative state.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub projected_draws: u8,
}

fn is_zero(v: &u8) -> bool {
    *v == 0
}

impl Game {
    pub fn player_score(&self) -> u32 {
        hand::score(&self.player_hand)
    }

    pub fn dealer_score(&self) -> u32 {
        hand::score(&self.dealer_hand)
    }

    /// The dealer hole card is shown once the dealer plays or the round ends.
    pub fn dealer_hole_revealed(&self) -> bool {
        self.dealer_turn || !self.is_active
    }
}

/// Monotonic counters mirrored from the ledger; never authoritative here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerStats {
    pub total_games: u64,
    pub wins: u64,
    pub losses: u64,
    pub pushes: u64,
    pub total_wagered: Amount,
    pub total_won: Amount,
    pub current_streak: u64,
    pub best_streak: u64,
}

/// User-facing failure surfaced on [`GameView::last_error`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ErrorKind {
    /// Caught locally before any submission; the ledger never saw it.
    Validation { message: String },
    /// A second submission was attempted while one was outstanding.
    ActionInFlight,
    /// The ledger was unreachable; no state changed.
    Transport { message: String },
    /// The ledger refused the action; the optimistic update was rolled back.
    RejectedByLedger { reason: String },
    /// The local watchdog expired. The remote action may still have landed;
    /// the next reconciliation poll discovers the real outcome.
    Timeout,
}

/// The single outstanding submission, if any.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingAction {
    pub kind: ActionKind,
    /// Client-side submission id, used to match the confirmation watcher
    /// against the pending slot it opened.
    pub tx_id: Uuid,
    pub submitted_at: DateTime<Utc>,
    /// Pre-submission game snapshot restored on rejection or timeout.
    pub rollback: Option<Game>,
}

/// The client-visible projection of the whole session.
///
/// Exactly one instance exists per session, owned by the
/// [`crate::store::GameStore`] and replaced atomically on every
/// reconciliation; UI code never mutates it in place.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameView {
    pub game: Option<Game>,
    pub phase: Phase,
    pub pending: Option<PendingAction>,
    pub last_error: Option<ErrorKind>,
    pub stats: PlayerStats,
    /// Completed rounds of this session, most recent last, bounded by the
    /// configured history limit.
    pub history: Vec<Game>,
    /// Round already dismissed via acknowledge; reloading it from the
    /// ledger maps to `Idle` instead of resurrecting `Resolved`.
    pub acknowledged_game_id: Option<GameId>,
}

impl GameView {
    pub fn can_start(&self) -> bool {
        self.phase == Phase::Idle
    }

    pub fn can_hit(&self) -> bool {
        self.phase == Phase::PlayerTurn
    }

    pub fn can_stand(&self) -> bool {
        self.phase == Phase::PlayerTurn
    }

    pub fn can_double(&self) -> bool {
        self.phase == Phase::PlayerTurn
            && self
                .game
                .as_ref()
                .is_some_and(|g| g.player_hand.len() == 2)
    }

    pub fn can_forfeit(&self) -> bool {
        self.phase == Phase::PlayerTurn
    }

    /// Recomputes the phase from the reconciled parts. Every write path
    /// runs through this so no two components can disagree about phase.
    pub(crate) fn rederive_phase(&mut self) {
        self.phase = derive_phase(
            self.game.as_ref(),
            self.pending.as_ref(),
            self.acknowledged_game_id,
        );
    }

    /// Appends a finished round to the session history, once per round.
    pub(crate) fn record_completed(&mut self, game: &Game, limit: usize) {
        if self.history.last().map(|g| g.game_id) == Some(game.game_id) {
            return;
        }
        self.history.push(game.clone());
        while self.history.len() > limit {
            self.history.remove(0);
        }
    }
}

/// The single phase-derivation rule shared by every write path.
pub fn derive_phase(
    game: Option<&Game>,
    pending: Option<&PendingAction>,
    acknowledged: Option<GameId>,
) -> Phase {
    if let Some(p) = pending {
        return match p.kind {
            ActionKind::Start => Phase::AwaitingStart,
            _ => Phase::AwaitingAction,
        };
    }
    match game {
        None => Phase::Idle,
        Some(g) if !g.is_active => {
            if acknowledged == Some(g.game_id) {
                Phase::Idle
            } else {
                Phase::Resolved
            }
        }
        Some(g) if g.dealer_turn => Phase::DealerTurn,
        Some(_) => Phase::PlayerTurn,
    }
}
