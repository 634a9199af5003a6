use std::sync::Arc;
use std::time::Duration;

use chainjack_engine::amount::{format_amount, Amount};
use chrono::Utc;
use thiserror::Error;
use tokio::sync::Notify;
use uuid::Uuid;

use crate::ledger::{BetLimits, LedgerConnector, LedgerError, SubmissionHandle, SubmissionOutcome};
use crate::store::GameStore;
use crate::view::{ActionKind, ErrorKind, Game, GameView, PendingAction, Phase, PlayerId};

#[derive(Debug, Error)]
pub enum ActionError {
    #[error("Bet {} outside table limits [{}, {}]", format_amount(*.bet), format_amount(*.min), format_amount(*.max))]
    InvalidBet {
        bet: Amount,
        min: Amount,
        max: Amount,
    },
    #[error("Action {action:?} is not legal in phase {phase:?}")]
    NotLegal { action: ActionKind, phase: Phase },
    #[error("Double down is only available on the initial two cards")]
    DoubleAfterDraw,
    #[error("Another action is already awaiting ledger confirmation")]
    ActionInFlight,
    #[error("No resolved round to acknowledge")]
    NothingToAcknowledge,
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Outcome of the synchronous guard-and-project step of a submission.
struct BeginTicket {
    tx_id: Uuid,
    /// Wager to put on the wire; relevant for start and double.
    submit_bet: Amount,
}

/// The state machine driving every state-changing request.
///
/// Validates intents against the current phase, enforces the
/// one-action-in-flight rule, applies the optimistic projection, and
/// resolves each submission through a spawned confirmation watcher. The
/// ledger-returned state always wins over the optimistic guess.
pub struct Orchestrator {
    store: GameStore,
    ledger: Arc<dyn LedgerConnector>,
    player: PlayerId,
    limits: BetLimits,
    submission_timeout: Duration,
    history_limit: usize,
    refresh_now: Arc<Notify>,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        store: GameStore,
        ledger: Arc<dyn LedgerConnector>,
        player: PlayerId,
        limits: BetLimits,
        submission_timeout: Duration,
        history_limit: usize,
        refresh_now: Arc<Notify>,
    ) -> Self {
        Self {
            store,
            ledger,
            player,
            limits,
            submission_timeout,
            history_limit,
            refresh_now,
        }
    }

    pub fn limits(&self) -> BetLimits {
        self.limits
    }

    pub fn player(&self) -> &PlayerId {
        &self.player
    }

    /// `Idle -> AwaitingStart`. Bets outside the table limits are refused
    /// locally and never reach the ledger.
    pub async fn start(&self, bet: Amount) -> Result<Uuid, ActionError> {
        let ticket = self.begin(ActionKind::Start, Some(bet))?;
        let handle = match self.ledger.submit_start(ticket.submit_bet).await {
            Ok(handle) => handle,
            Err(err) => return Err(self.abort_submission(ticket.tx_id, err)),
        };
        Ok(self.watch_submission(ActionKind::Start, ticket.tx_id, handle))
    }

    /// `PlayerTurn -> AwaitingAction`, optimistically projecting one
    /// face-down draw.
    pub async fn hit(&self) -> Result<Uuid, ActionError> {
        let ticket = self.begin(ActionKind::Hit, None)?;
        let handle = match self.ledger.submit_hit().await {
            Ok(handle) => handle,
            Err(err) => return Err(self.abort_submission(ticket.tx_id, err)),
        };
        Ok(self.watch_submission(ActionKind::Hit, ticket.tx_id, handle))
    }

    pub async fn stand(&self) -> Result<Uuid, ActionError> {
        let ticket = self.begin(ActionKind::Stand, None)?;
        let handle = match self.ledger.submit_stand().await {
            Ok(handle) => handle,
            Err(err) => return Err(self.abort_submission(ticket.tx_id, err)),
        };
        Ok(self.watch_submission(ActionKind::Stand, ticket.tx_id, handle))
    }

    /// Double-down: legal only on the initial two cards; the matching
    /// wager goes on the wire while the view optimistically doubles.
    pub async fn double(&self) -> Result<Uuid, ActionError> {
        let ticket = self.begin(ActionKind::Double, None)?;
        let handle = match self.ledger.submit_double(ticket.submit_bet).await {
            Ok(handle) => handle,
            Err(err) => return Err(self.abort_submission(ticket.tx_id, err)),
        };
        Ok(self.watch_submission(ActionKind::Double, ticket.tx_id, handle))
    }

    pub async fn forfeit(&self) -> Result<Uuid, ActionError> {
        let ticket = self.begin(ActionKind::Forfeit, None)?;
        let handle = match self.ledger.submit_forfeit().await {
            Ok(handle) => handle,
            Err(err) => return Err(self.abort_submission(ticket.tx_id, err)),
        };
        Ok(self.watch_submission(ActionKind::Forfeit, ticket.tx_id, handle))
    }

    /// `Resolved -> Idle`. Purely local: clears the table for the next
    /// round without contacting the ledger, and remembers the round id so
    /// a later authoritative reload does not resurrect the result screen.
    pub fn acknowledge(&self) -> Result<(), ActionError> {
        self.store.update(|view| {
            if view.phase != Phase::Resolved {
                return Err(ActionError::NothingToAcknowledge);
            }
            if let Some(game) = view.game.take() {
                view.acknowledged_game_id = Some(game.game_id);
            }
            view.last_error = None;
            view.rederive_phase();
            Ok(())
        })
    }

    /// Clears the surfaced error; display and dismissal are UI concerns.
    pub fn dismiss_error(&self) {
        self.store.update(|view| view.last_error = None);
    }

    /// Synchronous guard-and-project step, atomic on the view cell.
    ///
    /// A second submission while one is outstanding returns
    /// `ActionInFlight` and leaves the view untouched; other validation
    /// failures surface on `last_error`. On success the pending slot is
    /// filled (with the rollback snapshot) and the optimistic projection
    /// is applied.
    fn begin(&self, kind: ActionKind, bet: Option<Amount>) -> Result<BeginTicket, ActionError> {
        let limits = self.limits;
        let result = self.store.update(|view| {
            if view.pending.is_some() {
                return Err(ActionError::ActionInFlight);
            }

            let submit_bet = match kind {
                ActionKind::Start => {
                    let bet = bet.unwrap_or(0);
                    if view.phase != Phase::Idle {
                        return Err(fail_validation(view, kind));
                    }
                    if !limits.contains(bet) {
                        let err = ActionError::InvalidBet {
                            bet,
                            min: limits.min,
                            max: limits.max,
                        };
                        view.last_error = Some(ErrorKind::Validation {
                            message: err.to_string(),
                        });
                        return Err(err);
                    }
                    bet
                }
                ActionKind::Hit | ActionKind::Stand | ActionKind::Forfeit => {
                    if view.phase != Phase::PlayerTurn {
                        return Err(fail_validation(view, kind));
                    }
                    0
                }
                ActionKind::Double => {
                    if view.phase != Phase::PlayerTurn {
                        return Err(fail_validation(view, kind));
                    }
                    match view.game.as_ref() {
                        Some(game) if game.player_hand.len() == 2 => game.bet,
                        Some(_) => {
                            let err = ActionError::DoubleAfterDraw;
                            view.last_error = Some(ErrorKind::Validation {
                                message: err.to_string(),
                            });
                            return Err(err);
                        }
                        None => return Err(fail_validation(view, kind)),
                    }
                }
            };

            let pending = PendingAction {
                kind,
                tx_id: Uuid::new_v4(),
                submitted_at: Utc::now(),
                rollback: view.game.clone(),
            };
            let tx_id = pending.tx_id;

            // Optimistic projection; replaced by the authoritative state
            // on confirmation, restored from the rollback otherwise.
            if let Some(game) = view.game.as_mut() {
                match kind {
                    ActionKind::Hit => game.projected_draws += 1,
                    ActionKind::Double => {
                        game.bet = game.bet.saturating_mul(2);
                        game.projected_draws += 1;
                    }
                    _ => {}
                }
            }

            view.pending = Some(pending);
            view.last_error = None;
            view.rederive_phase();
            Ok(BeginTicket { tx_id, submit_bet })
        });

        if let Ok(ticket) = &result {
            tracing::info!(
                player = %self.player,
                tx_id = %ticket.tx_id,
                action = ?kind,
                "submitting action"
            );
        }
        result
    }

    /// Rolls back a submission whose transport failed before a handle
    /// existed; nothing remote can be outstanding.
    fn abort_submission(&self, tx_id: Uuid, err: LedgerError) -> ActionError {
        tracing::warn!(tx_id = %tx_id, error = %err, "submission failed before reaching the ledger");
        self.store.update(|view| {
            if view.pending.as_ref().map(|p| p.tx_id) != Some(tx_id) {
                return;
            }
            let pending = view.pending.take();
            view.game = pending.and_then(|p| p.rollback);
            view.last_error = Some(match &err {
                LedgerError::Rejected(reason) => ErrorKind::RejectedByLedger {
                    reason: reason.clone(),
                },
                LedgerError::Timeout => ErrorKind::Timeout,
                LedgerError::TransportUnavailable(message) => ErrorKind::Transport {
                    message: message.clone(),
                },
            });
            view.rederive_phase();
        });
        err.into()
    }

    /// Spawns the confirmation watcher resolving the pending slot on
    /// confirmation, rejection, or watchdog expiry. An expired watchdog
    /// does not imply the remote action failed: the pending slot is
    /// cleared so new actions are possible, and the next authoritative
    /// reload discovers the real outcome. Nothing is ever resubmitted.
    fn watch_submission(&self, kind: ActionKind, tx_id: Uuid, handle: SubmissionHandle) -> Uuid {
        let store = self.store.clone();
        let refresh_now = self.refresh_now.clone();
        let timeout = self.submission_timeout;
        let history_limit = self.history_limit;

        tokio::spawn(async move {
            match tokio::time::timeout(timeout, handle.outcome()).await {
                Ok(Ok(SubmissionOutcome::Confirmed(state))) => {
                    tracing::info!(tx_id = %tx_id, action = ?kind, "submission confirmed");
                    store.update(|view| {
                        if view.pending.as_ref().map(|p| p.tx_id) != Some(tx_id) {
                            return;
                        }
                        view.pending = None;
                        let game = Game::from(state);
                        if !game.is_active {
                            view.record_completed(&game, history_limit);
                        }
                        view.game = Some(game);
                        view.rederive_phase();
                    });
                }
                Ok(Ok(SubmissionOutcome::Rejected(reason))) => {
                    tracing::warn!(tx_id = %tx_id, action = ?kind, reason = %reason, "submission rejected");
                    rollback(&store, tx_id, ErrorKind::RejectedByLedger { reason });
                }
                Ok(Err(err)) => {
                    tracing::warn!(tx_id = %tx_id, action = ?kind, error = %err, "submission failed");
                    let kind = match err {
                        LedgerError::Rejected(reason) => ErrorKind::RejectedByLedger { reason },
                        LedgerError::Timeout => ErrorKind::Timeout,
                        LedgerError::TransportUnavailable(message) => {
                            ErrorKind::Transport { message }
                        }
                    };
                    rollback(&store, tx_id, kind);
                }
                Err(_) => {
                    tracing::warn!(tx_id = %tx_id, action = ?kind, "submission watchdog expired");
                    rollback(&store, tx_id, ErrorKind::Timeout);
                }
            }
            // Reconcile against the authoritative state either way.
            refresh_now.notify_one();
        });

        tx_id
    }
}

/// Restores the pre-submission snapshot and surfaces the error, provided
/// the pending slot still belongs to this submission.
fn rollback(store: &GameStore, tx_id: Uuid, error: ErrorKind) {
    store.update(|view| {
        if view.pending.as_ref().map(|p| p.tx_id) != Some(tx_id) {
            return;
        }
        let pending = view.pending.take();
        view.game = pending.and_then(|p| p.rollback);
        view.last_error = Some(error);
        view.rederive_phase();
    });
}

fn fail_validation(view: &mut GameView, kind: ActionKind) -> ActionError {
    let err = ActionError::NotLegal {
        action: kind,
        phase: view.phase,
    };
    view.last_error = Some(ErrorKind::Validation {
        message: err.to_string(),
    });
    err
}
