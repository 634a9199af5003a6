//! In-process ledger used by the test suites and demos.
//!
//! Plays real rounds from a seeded shoe with the same rules the remote
//! ledger enforces, and exposes fault controls (scripted rejections, held
//! submissions, transport outages, dropped events) so reconciliation
//! paths can be exercised deterministically.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use chainjack_engine::amount::Amount;
use chainjack_engine::hand;
use chainjack_engine::shoe::Shoe;
use chrono::Utc;
use tokio::sync::mpsc;

use crate::ledger::{
    BetLimits, LedgerConnector, LedgerError, LedgerEvent, LedgerGameState, SubmissionHandle,
    SubmissionResolver, EVENT_CHANNEL_BUFFER,
};
use crate::view::{ActionKind, PlayerId, PlayerStats, RoundResult};

pub struct MockLedger {
    player: PlayerId,
    limits: BetLimits,
    inner: Mutex<Inner>,
}

struct Inner {
    shoe: Shoe,
    game: Option<LedgerGameState>,
    stats: PlayerStats,
    next_game_id: u64,
    subscribers: Vec<mpsc::Sender<LedgerEvent>>,
    rejections: VecDeque<String>,
    transport_down: bool,
    drop_events: bool,
    holding: bool,
    held: Vec<HeldSubmission>,
}

struct HeldSubmission {
    kind: ActionKind,
    bet: Amount,
    resolver: SubmissionResolver,
}

impl MockLedger {
    pub fn new(player: impl Into<PlayerId>, seed: u64) -> Self {
        Self {
            player: player.into(),
            limits: BetLimits::default(),
            inner: Mutex::new(Inner {
                shoe: Shoe::new_with_seed(seed),
                game: None,
                stats: PlayerStats::default(),
                next_game_id: 1,
                subscribers: Vec::new(),
                rejections: VecDeque::new(),
                transport_down: false,
                drop_events: false,
                holding: false,
                held: Vec::new(),
            }),
        }
    }

    pub fn with_limits(player: impl Into<PlayerId>, seed: u64, limits: BetLimits) -> Self {
        let mut this = Self::new(player, seed);
        this.limits = limits;
        this
    }

    /// Refuse the next submission with the given reason, without touching
    /// table state.
    pub fn reject_next(&self, reason: impl Into<String>) {
        self.lock().rejections.push_back(reason.into());
    }

    /// While holding, submissions are accepted but neither applied nor
    /// resolved until [`release_held`](Self::release_held); drives the
    /// submission watchdog in tests.
    pub fn hold_submissions(&self, hold: bool) {
        self.lock().holding = hold;
    }

    /// Applies and resolves everything held, in submission order.
    pub fn release_held(&self) {
        let held = {
            let mut inner = self.lock();
            inner.holding = false;
            std::mem::take(&mut inner.held)
        };
        for submission in held {
            let outcome = {
                let mut inner = self.lock();
                inner.apply(&self.player, submission.kind, submission.bet, self.limits)
            };
            match outcome {
                Ok(state) => submission.resolver.confirm(state),
                Err(reason) => submission.resolver.reject(reason),
            }
        }
    }

    /// Simulates the transport going away; every call fails until restored.
    pub fn set_transport_down(&self, down: bool) {
        self.lock().transport_down = down;
    }

    /// Stops emitting events, leaving the polling fallback as the only way
    /// the client learns of changes.
    pub fn set_drop_events(&self, drop: bool) {
        self.lock().drop_events = drop;
    }

    /// Pushes an arbitrary event to every subscriber; lets tests replay
    /// duplicates and stale notifications.
    pub fn inject_event(&self, event: LedgerEvent) {
        self.lock().emit(event);
    }

    /// Current authoritative round state, for direct assertions.
    pub fn game_state(&self) -> Option<LedgerGameState> {
        self.lock().game.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn submit(&self, kind: ActionKind, bet: Amount) -> Result<SubmissionHandle, LedgerError> {
        let mut inner = self.lock();
        if inner.transport_down {
            return Err(LedgerError::TransportUnavailable("transport down".into()));
        }
        let (handle, resolver) = SubmissionHandle::channel();
        if let Some(reason) = inner.rejections.pop_front() {
            resolver.reject(reason);
            return Ok(handle);
        }
        if inner.holding {
            inner.held.push(HeldSubmission {
                kind,
                bet,
                resolver,
            });
            return Ok(handle);
        }
        match inner.apply(&self.player, kind, bet, self.limits) {
            Ok(state) => resolver.confirm(state),
            Err(reason) => resolver.reject(reason),
        }
        Ok(handle)
    }
}

impl Inner {
    fn emit(&mut self, event: LedgerEvent) {
        if self.drop_events {
            return;
        }
        self.subscribers
            .retain(|tx| tx.try_send(event.clone()).is_ok());
    }

    /// Applies one action to the table, emitting events along the way, and
    /// returns the resulting authoritative state.
    fn apply(
        &mut self,
        player: &PlayerId,
        kind: ActionKind,
        bet: Amount,
        limits: BetLimits,
    ) -> Result<LedgerGameState, String> {
        match kind {
            ActionKind::Start => self.start_round(player, bet, limits),
            ActionKind::Hit => self.hit(player),
            ActionKind::Stand => self.stand(player),
            ActionKind::Double => self.double(player, bet),
            ActionKind::Forfeit => self.forfeit(player),
        }
    }

    fn start_round(
        &mut self,
        player: &PlayerId,
        bet: Amount,
        limits: BetLimits,
    ) -> Result<LedgerGameState, String> {
        if self.game.as_ref().is_some_and(|g| g.is_active) {
            return Err("round already in progress".into());
        }
        if !limits.contains(bet) {
            return Err("bet outside table limits".into());
        }

        let game_id = self.next_game_id;
        self.next_game_id += 1;
        let now = Utc::now();
        let mut state = LedgerGameState {
            player: player.clone(),
            game_id,
            player_cards: Vec::new(),
            dealer_cards: Vec::new(),
            bet,
            result: RoundResult::InProgress,
            is_active: true,
            dealer_turn: false,
            payout: 0,
            timestamp: now,
        };
        self.emit(LedgerEvent::Started {
            player: player.clone(),
            game_id,
            bet,
            timestamp: now,
        });

        for is_dealer in [false, true, false] {
            let card = self.shoe.draw();
            if is_dealer {
                state.dealer_cards.push(card);
            } else {
                state.player_cards.push(card);
            }
            self.emit(LedgerEvent::CardDealt {
                player: player.clone(),
                game_id,
                card,
                is_dealer,
                timestamp: now,
            });
        }

        if hand::is_natural(&state.player_cards) {
            self.play_dealer(&mut state);
            self.settle(&mut state, player);
        }

        self.game = Some(state.clone());
        Ok(state)
    }

    fn hit(&mut self, player: &PlayerId) -> Result<LedgerGameState, String> {
        let mut state = self.active_game()?;
        let card = self.shoe.draw();
        state.player_cards.push(card);
        state.timestamp = Utc::now();
        self.emit(LedgerEvent::CardDealt {
            player: player.clone(),
            game_id: state.game_id,
            card,
            is_dealer: false,
            timestamp: state.timestamp,
        });

        if hand::is_bust(&state.player_cards) {
            self.settle(&mut state, player);
        }
        self.game = Some(state.clone());
        Ok(state)
    }

    fn stand(&mut self, player: &PlayerId) -> Result<LedgerGameState, String> {
        let mut state = self.active_game()?;
        self.play_dealer(&mut state);
        self.settle(&mut state, player);
        self.game = Some(state.clone());
        Ok(state)
    }

    fn double(&mut self, player: &PlayerId, extra: Amount) -> Result<LedgerGameState, String> {
        let mut state = self.active_game()?;
        if state.player_cards.len() != 2 {
            return Err("double down only on the initial two cards".into());
        }
        if extra != state.bet {
            return Err("double down wager must match the original bet".into());
        }
        state.bet += extra;
        let card = self.shoe.draw();
        state.player_cards.push(card);
        state.timestamp = Utc::now();
        self.emit(LedgerEvent::CardDealt {
            player: player.clone(),
            game_id: state.game_id,
            card,
            is_dealer: false,
            timestamp: state.timestamp,
        });

        if !hand::is_bust(&state.player_cards) {
            self.play_dealer(&mut state);
        }
        self.settle(&mut state, player);
        self.game = Some(state.clone());
        Ok(state)
    }

    fn forfeit(&mut self, player: &PlayerId) -> Result<LedgerGameState, String> {
        let mut state = self.active_game()?;
        state.is_active = false;
        state.dealer_turn = false;
        state.result = RoundResult::DealerWin;
        state.payout = 0;
        state.timestamp = Utc::now();
        self.record_result(&state);
        self.emit(LedgerEvent::Ended {
            player: player.clone(),
            game_id: state.game_id,
            result: state.result,
            payout: state.payout,
            timestamp: state.timestamp,
        });
        self.emit_stats(player);
        self.game = Some(state.clone());
        Ok(state)
    }

    fn active_game(&self) -> Result<LedgerGameState, String> {
        match &self.game {
            Some(game) if game.is_active => Ok(game.clone()),
            _ => Err("no active round".into()),
        }
    }

    /// Dealer reveals and draws to at least 17, standing on soft 17.
    fn play_dealer(&mut self, state: &mut LedgerGameState) {
        state.dealer_turn = true;
        let now = Utc::now();
        while hand::dealer_should_draw(&state.dealer_cards) {
            let card = self.shoe.draw();
            state.dealer_cards.push(card);
            self.emit(LedgerEvent::CardDealt {
                player: state.player.clone(),
                game_id: state.game_id,
                card,
                is_dealer: true,
                timestamp: now,
            });
        }
    }

    /// Terminal bookkeeping: decide the result, pay out (win 2x, push 1x),
    /// update the counters, emit `Ended` and `StatsUpdated`.
    fn settle(&mut self, state: &mut LedgerGameState, player: &PlayerId) {
        let player_score = hand::score(&state.player_cards);
        let dealer_score = hand::score(&state.dealer_cards);

        state.result = if hand::is_bust(&state.player_cards) {
            RoundResult::DealerWin
        } else if hand::is_bust(&state.dealer_cards) {
            RoundResult::PlayerWin
        } else if player_score > dealer_score {
            RoundResult::PlayerWin
        } else if player_score < dealer_score {
            RoundResult::DealerWin
        } else {
            RoundResult::Push
        };
        state.payout = match state.result {
            RoundResult::PlayerWin => state.bet * 2,
            RoundResult::Push => state.bet,
            _ => 0,
        };
        state.is_active = false;
        state.dealer_turn = false;
        state.timestamp = Utc::now();

        self.record_result(state);
        self.emit(LedgerEvent::Ended {
            player: player.clone(),
            game_id: state.game_id,
            result: state.result,
            payout: state.payout,
            timestamp: state.timestamp,
        });
        self.emit_stats(player);
    }

    fn record_result(&mut self, state: &LedgerGameState) {
        let stats = &mut self.stats;
        stats.total_games += 1;
        stats.total_wagered += state.bet;
        stats.total_won += state.payout;
        match state.result {
            RoundResult::PlayerWin => {
                stats.wins += 1;
                stats.current_streak += 1;
                stats.best_streak = stats.best_streak.max(stats.current_streak);
            }
            RoundResult::DealerWin => {
                stats.losses += 1;
                stats.current_streak = 0;
            }
            RoundResult::Push => stats.pushes += 1,
            RoundResult::InProgress => {}
        }
    }

    fn emit_stats(&mut self, player: &PlayerId) {
        let event = LedgerEvent::StatsUpdated {
            player: player.clone(),
            total_games: self.stats.total_games,
            wins: self.stats.wins,
            losses: self.stats.losses,
        };
        self.emit(event);
    }
}

#[async_trait]
impl LedgerConnector for MockLedger {
    async fn submit_start(&self, bet: Amount) -> Result<SubmissionHandle, LedgerError> {
        self.submit(ActionKind::Start, bet)
    }

    async fn submit_hit(&self) -> Result<SubmissionHandle, LedgerError> {
        self.submit(ActionKind::Hit, 0)
    }

    async fn submit_stand(&self) -> Result<SubmissionHandle, LedgerError> {
        self.submit(ActionKind::Stand, 0)
    }

    async fn submit_double(&self, bet: Amount) -> Result<SubmissionHandle, LedgerError> {
        self.submit(ActionKind::Double, bet)
    }

    async fn submit_forfeit(&self) -> Result<SubmissionHandle, LedgerError> {
        self.submit(ActionKind::Forfeit, 0)
    }

    async fn read_game_state(
        &self,
        player: &PlayerId,
    ) -> Result<Option<LedgerGameState>, LedgerError> {
        let inner = self.lock();
        if inner.transport_down {
            return Err(LedgerError::TransportUnavailable("transport down".into()));
        }
        Ok(inner.game.clone().filter(|g| &g.player == player))
    }

    async fn read_player_stats(&self, player: &PlayerId) -> Result<PlayerStats, LedgerError> {
        let inner = self.lock();
        if inner.transport_down {
            return Err(LedgerError::TransportUnavailable("transport down".into()));
        }
        if player == &self.player {
            Ok(inner.stats.clone())
        } else {
            Ok(PlayerStats::default())
        }
    }

    async fn read_bet_limits(&self) -> Result<BetLimits, LedgerError> {
        Ok(self.limits)
    }

    async fn subscribe(
        &self,
        _player: &PlayerId,
    ) -> Result<mpsc::Receiver<LedgerEvent>, LedgerError> {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_BUFFER);
        self.lock().subscribers.push(tx);
        Ok(rx)
    }
}
