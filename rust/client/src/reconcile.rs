use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Notify};
use tokio::time::MissedTickBehavior;

use crate::ledger::{LedgerConnector, LedgerEvent};
use crate::store::GameStore;
use crate::view::{ActionKind, Game, PlayerId, RoundResult};

/// Folds ledger events and periodic authoritative reloads into the store.
///
/// Events are an optimization only; the poll is the source of truth and
/// repairs anything a dropped or reordered event left behind, so the view
/// is never stale longer than one poll interval. Every event application
/// is idempotent, because confirmations and redeliveries race with the
/// stream.
pub struct Reconciler {
    store: GameStore,
    ledger: Arc<dyn LedgerConnector>,
    player: PlayerId,
    poll_interval: Duration,
    history_limit: usize,
    refresh_now: Arc<Notify>,
}

impl Reconciler {
    pub(crate) fn new(
        store: GameStore,
        ledger: Arc<dyn LedgerConnector>,
        player: PlayerId,
        poll_interval: Duration,
        history_limit: usize,
        refresh_now: Arc<Notify>,
    ) -> Self {
        Self {
            store,
            ledger,
            player,
            poll_interval,
            history_limit,
            refresh_now,
        }
    }

    /// Drives reconciliation until the owning client aborts the task.
    /// Runs one immediate refresh so a reconnecting session shows its
    /// mid-round state before the first tick.
    pub async fn run(mut self) {
        let mut events = match self.ledger.subscribe(&self.player).await {
            Ok(rx) => Some(rx),
            Err(err) => {
                tracing::warn!(player = %self.player, error = %err, "event subscription failed, polling only");
                None
            }
        };

        self.refresh().await;

        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await; // first tick completes immediately

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.refresh().await;
                }
                _ = self.refresh_now.notified() => {
                    self.refresh().await;
                }
                event = recv_event(&mut events), if events.is_some() => {
                    match event {
                        Some(event) => self.apply_event(event),
                        None => {
                            tracing::warn!(player = %self.player, "event stream closed, polling only");
                            events = None;
                        }
                    }
                }
            }
        }
    }

    /// Authoritative full reload. Replaces game and stats wholesale while
    /// preserving the locally owned parts of the view (pending submission,
    /// surfaced error, history, acknowledgement).
    async fn refresh(&mut self) {
        let state = match self.ledger.read_game_state(&self.player).await {
            Ok(state) => state,
            Err(err) => {
                tracing::warn!(player = %self.player, error = %err, "state poll failed");
                return;
            }
        };
        let stats = match self.ledger.read_player_stats(&self.player).await {
            Ok(stats) => stats,
            Err(err) => {
                tracing::warn!(player = %self.player, error = %err, "stats poll failed");
                return;
            }
        };

        let history_limit = self.history_limit;
        self.store.update(|view| {
            // The projection is a local overlay tied to the pending
            // submission; carry it across the reload of the same round.
            let projected = match (&view.pending, &view.game) {
                (Some(_), Some(g)) => Some((g.game_id, g.projected_draws)),
                _ => None,
            };
            view.game = state.map(Game::from);
            view.stats = stats;
            if let (Some((id, draws)), Some(game)) = (projected, view.game.as_mut()) {
                if game.game_id == id && game.is_active {
                    game.projected_draws = draws;
                }
            }
            if let Some(game) = view.game.clone() {
                if !game.is_active {
                    view.record_completed(&game, history_limit);
                    // The poll resolved the round a submission acted on;
                    // the watcher's verdict is moot. A pending Start acts
                    // on a round the ledger has not named yet, and an
                    // acknowledged finished round lingers on the ledger,
                    // so anything else must survive the reload.
                    let settled_pending = view.pending.as_ref().is_some_and(|p| {
                        p.kind != ActionKind::Start
                            && p.rollback.as_ref().map(|g| g.game_id) == Some(game.game_id)
                    });
                    if settled_pending {
                        view.pending = None;
                    }
                }
            }
            view.rederive_phase();
        });
    }

    /// Folds one ledger event into the view. Events for a round other
    /// than the one on the table are dropped rather than stitched into
    /// partial state; the poll catches the client up instead.
    fn apply_event(&self, event: LedgerEvent) {
        match event {
            LedgerEvent::Started {
                player,
                game_id,
                bet,
                timestamp,
            } => {
                if player != self.player {
                    return;
                }
                self.store.update(|view| {
                    if view.game.as_ref().is_some_and(|g| g.game_id >= game_id) {
                        return; // already known, from a confirmation or redelivery
                    }
                    tracing::debug!(game_id, "round started");
                    view.game = Some(Game {
                        game_id,
                        player_hand: Vec::new(),
                        dealer_hand: Vec::new(),
                        bet,
                        result: RoundResult::InProgress,
                        is_active: true,
                        dealer_turn: false,
                        payout: 0,
                        timestamp,
                        projected_draws: 0,
                    });
                    view.rederive_phase();
                });
            }
            LedgerEvent::CardDealt {
                player,
                game_id,
                card,
                is_dealer,
                timestamp,
            } => {
                if player != self.player {
                    return;
                }
                self.store.update(|view| {
                    let Some(game) = view.game.as_mut() else {
                        return;
                    };
                    if game.game_id != game_id {
                        tracing::debug!(
                            game_id,
                            current = game.game_id,
                            "deal for another round dropped"
                        );
                        return;
                    }
                    let hand = if is_dealer {
                        &mut game.dealer_hand
                    } else {
                        &mut game.player_hand
                    };
                    // A physical card appears once per shoe pass, so
                    // membership identifies a deal already applied by a
                    // redelivery or a confirmation. A reshuffled repeat is
                    // wrongly dropped here and repaired by the next poll.
                    if hand.contains(&card) {
                        tracing::debug!(game_id, card = %card, "duplicate deal ignored");
                        return;
                    }
                    hand.push(card);
                    if !is_dealer {
                        // The real card supersedes one projected face-down draw.
                        game.projected_draws = game.projected_draws.saturating_sub(1);
                    }
                    game.timestamp = timestamp;
                    view.rederive_phase();
                });
            }
            LedgerEvent::Ended {
                player,
                game_id,
                result,
                payout,
                timestamp,
            } => {
                if player != self.player {
                    return;
                }
                let history_limit = self.history_limit;
                self.store.update(|view| {
                    let Some(game) = view.game.as_mut() else {
                        return;
                    };
                    if game.game_id != game_id {
                        return;
                    }
                    tracing::info!(game_id, result = ?result, "round ended");
                    game.is_active = false;
                    game.dealer_turn = false;
                    game.result = result;
                    game.payout = payout;
                    game.timestamp = timestamp;
                    game.projected_draws = 0;
                    let done = game.clone();
                    view.record_completed(&done, history_limit);
                    // Any outstanding submission is settled by the terminal
                    // result; the watcher's late verdict is moot.
                    view.pending = None;
                    view.rederive_phase();
                });
                // The dealer hand and counters changed remotely; pick them
                // up now instead of waiting out the interval.
                self.refresh_now.notify_one();
            }
            LedgerEvent::StatsUpdated {
                player,
                total_games,
                wins,
                losses,
            } => {
                if player != self.player {
                    return;
                }
                self.store.update(|view| {
                    // Counters are monotonic on the ledger; never regress
                    // them from a stale event.
                    if total_games >= view.stats.total_games {
                        view.stats.total_games = total_games;
                        view.stats.wins = wins;
                        view.stats.losses = losses;
                    }
                });
            }
        }
    }
}

async fn recv_event(events: &mut Option<mpsc::Receiver<LedgerEvent>>) -> Option<LedgerEvent> {
    match events {
        Some(rx) => rx.recv().await,
        // Guarded by `if events.is_some()` in the select arm.
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockLedger;
    use crate::view::{GameId, PendingAction, Phase};
    use chainjack_engine::cards::{Card, Rank, Suit};
    use chrono::Utc;
    use uuid::Uuid;

    fn reconciler(store: &GameStore) -> Reconciler {
        Reconciler::new(
            store.clone(),
            Arc::new(MockLedger::new("alice", 1)),
            "alice".to_string(),
            Duration::from_secs(5),
            8,
            Arc::new(Notify::new()),
        )
    }

    fn card(suit: Suit, rank: Rank) -> Card {
        Card { suit, rank }
    }

    fn active_game(id: GameId, cards: Vec<Card>) -> Game {
        Game {
            game_id: id,
            player_hand: cards,
            dealer_hand: vec![card(Suit::Spades, Rank::King)],
            bet: 1,
            result: RoundResult::InProgress,
            is_active: true,
            dealer_turn: false,
            payout: 0,
            timestamp: Utc::now(),
            projected_draws: 0,
        }
    }

    fn dealt(game_id: GameId, c: Card) -> LedgerEvent {
        LedgerEvent::CardDealt {
            player: "alice".to_string(),
            game_id,
            card: c,
            is_dealer: false,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn redelivered_deal_is_a_no_op() {
        let store = GameStore::new();
        let reconciler = reconciler(&store);
        let five = card(Suit::Hearts, Rank::Five);
        store.update(|view| {
            view.game = Some(active_game(1, vec![five]));
            view.rederive_phase();
        });

        reconciler.apply_event(dealt(1, five));
        assert_eq!(store.current().game.unwrap().player_hand, vec![five]);

        let nine = card(Suit::Clubs, Rank::Nine);
        reconciler.apply_event(dealt(1, nine));
        assert_eq!(
            store.current().game.unwrap().player_hand,
            vec![five, nine],
            "a fresh card still lands"
        );
    }

    #[tokio::test]
    async fn deal_for_another_round_is_dropped() {
        let store = GameStore::new();
        let reconciler = reconciler(&store);
        let five = card(Suit::Hearts, Rank::Five);
        store.update(|view| {
            view.game = Some(active_game(2, vec![five]));
            view.rederive_phase();
        });

        reconciler.apply_event(dealt(1, card(Suit::Clubs, Rank::Nine)));
        assert_eq!(store.current().game.unwrap().player_hand, vec![five]);
    }

    #[tokio::test]
    async fn refresh_preserves_a_pending_start_over_a_finished_round() {
        use crate::ledger::LedgerConnector;
        use chainjack_engine::amount::DEFAULT_MIN_BET;

        // Put a finished round on the ledger; polls will keep reloading it.
        let ledger = Arc::new(MockLedger::new("alice", 3));
        let handle = ledger.submit_start(DEFAULT_MIN_BET).await.expect("start");
        handle.outcome().await.expect("confirm");
        if ledger.game_state().expect("round").is_active {
            let handle = ledger.submit_forfeit().await.expect("forfeit");
            handle.outcome().await.expect("confirm");
        }
        let finished_id = ledger.game_state().expect("round").game_id;

        let store = GameStore::new();
        store.update(|view| {
            view.acknowledged_game_id = Some(finished_id);
            view.pending = Some(PendingAction {
                kind: ActionKind::Start,
                tx_id: Uuid::new_v4(),
                submitted_at: Utc::now(),
                rollback: None,
            });
            view.rederive_phase();
        });

        let mut reconciler = Reconciler::new(
            store.clone(),
            ledger,
            "alice".to_string(),
            Duration::from_secs(5),
            8,
            Arc::new(Notify::new()),
        );
        reconciler.refresh().await;

        // The reloaded round is not the one the start acts on.
        let view = store.current();
        assert_eq!(
            view.pending.as_ref().map(|p| p.kind),
            Some(ActionKind::Start)
        );
        assert_eq!(view.phase, Phase::AwaitingStart);

        // A start whose rollback snapshot is the resurrected finished
        // round survives too: it acts on a round the ledger has not
        // named yet.
        store.update(|view| {
            view.pending = Some(PendingAction {
                kind: ActionKind::Start,
                tx_id: Uuid::new_v4(),
                submitted_at: Utc::now(),
                rollback: view.game.clone(),
            });
            view.rederive_phase();
        });
        reconciler.refresh().await;
        assert!(store.current().pending.is_some());

        // A pending action on the reloaded round itself is settled by it.
        store.update(|view| {
            view.pending = Some(PendingAction {
                kind: ActionKind::Hit,
                tx_id: Uuid::new_v4(),
                submitted_at: Utc::now(),
                rollback: view.game.clone(),
            });
            view.rederive_phase();
        });
        reconciler.refresh().await;
        assert!(store.current().pending.is_none());
    }

    #[tokio::test]
    async fn stale_deal_drop_is_logged() {
        use crate::logging::LogCapture;
        use tracing_subscriber::layer::SubscriberExt;
        use tracing_subscriber::Registry;

        let store = GameStore::new();
        let reconciler = reconciler(&store);
        let five = card(Suit::Hearts, Rank::Five);
        store.update(|view| {
            view.game = Some(active_game(2, vec![five]));
            view.rederive_phase();
        });

        let capture = LogCapture::new();
        let registry = Registry::default().with(capture.clone().into_layer::<Registry>());
        tracing::subscriber::with_default(registry, || {
            reconciler.apply_event(dealt(1, card(Suit::Clubs, Rank::Nine)));
        });

        assert_eq!(store.current().game.unwrap().player_hand, vec![five]);
        assert!(capture.records().iter().any(|rec| {
            rec.message.contains("another round")
                && rec
                    .fields
                    .iter()
                    .any(|(k, v)| k == "current" && v.contains('2'))
        }));
    }

    #[tokio::test]
    async fn ended_settles_round_and_clears_pending() {
        let store = GameStore::new();
        let reconciler = reconciler(&store);
        store.update(|view| {
            view.game = Some(active_game(1, vec![card(Suit::Hearts, Rank::Ten)]));
            view.pending = Some(PendingAction {
                kind: crate::view::ActionKind::Stand,
                tx_id: Uuid::new_v4(),
                submitted_at: Utc::now(),
                rollback: None,
            });
            view.rederive_phase();
        });

        reconciler.apply_event(LedgerEvent::Ended {
            player: "alice".to_string(),
            game_id: 1,
            result: RoundResult::PlayerWin,
            payout: 2,
            timestamp: Utc::now(),
        });

        let view = store.current();
        assert_eq!(view.phase, Phase::Resolved);
        assert!(view.pending.is_none());
        let game = view.game.unwrap();
        assert!(!game.is_active);
        assert_eq!(game.result, RoundResult::PlayerWin);
        assert_eq!(game.payout, 2);
        assert_eq!(view.history.len(), 1);
    }

    #[tokio::test]
    async fn started_does_not_clobber_a_known_round() {
        let store = GameStore::new();
        let reconciler = reconciler(&store);
        let five = card(Suit::Hearts, Rank::Five);
        store.update(|view| {
            view.game = Some(active_game(3, vec![five]));
            view.rederive_phase();
        });

        reconciler.apply_event(LedgerEvent::Started {
            player: "alice".to_string(),
            game_id: 3,
            bet: 1,
            timestamp: Utc::now(),
        });
        assert_eq!(store.current().game.unwrap().player_hand, vec![five]);

        // A newer round replaces the table.
        reconciler.apply_event(LedgerEvent::Started {
            player: "alice".to_string(),
            game_id: 4,
            bet: 2,
            timestamp: Utc::now(),
        });
        let game = store.current().game.unwrap();
        assert_eq!(game.game_id, 4);
        assert!(game.player_hand.is_empty());
    }

    #[tokio::test]
    async fn stale_stats_never_regress_counters() {
        let store = GameStore::new();
        let reconciler = reconciler(&store);
        store.update(|view| view.stats.total_games = 10);

        reconciler.apply_event(LedgerEvent::StatsUpdated {
            player: "alice".to_string(),
            total_games: 4,
            wins: 2,
            losses: 2,
        });
        assert_eq!(store.current().stats.total_games, 10);

        reconciler.apply_event(LedgerEvent::StatsUpdated {
            player: "alice".to_string(),
            total_games: 11,
            wins: 6,
            losses: 5,
        });
        assert_eq!(store.current().stats.total_games, 11);
        assert_eq!(store.current().stats.wins, 6);
    }

    #[tokio::test]
    async fn events_for_other_players_are_ignored() {
        let store = GameStore::new();
        let reconciler = reconciler(&store);

        reconciler.apply_event(LedgerEvent::Started {
            player: "mallory".to_string(),
            game_id: 9,
            bet: 1,
            timestamp: Utc::now(),
        });
        assert!(store.current().game.is_none());
    }
}
