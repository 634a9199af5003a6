//! Reconciliation behavior observed through full client sessions: the
//! polling fallback, duplicate and stale event delivery, and session
//! resumption.

use std::sync::Arc;
use std::time::Duration;

use chainjack_client::client::GameClient;
use chainjack_client::config::ClientConfig;
use chainjack_client::ledger::{LedgerConnector, LedgerEvent, SubmissionOutcome};
use chainjack_client::mock::MockLedger;
use chainjack_client::view::{GameView, Phase};
use chainjack_engine::amount::DEFAULT_MIN_BET;
use chrono::Utc;

const PLAYER: &str = "alice";

/// First seed whose opening deal leaves the player with a decision, so
/// the round stays open mid-test.
async fn live_seed() -> u64 {
    for seed in 0..64 {
        let probe = MockLedger::new(PLAYER, seed);
        let handle = probe.submit_start(DEFAULT_MIN_BET).await.expect("probe");
        if let Ok(SubmissionOutcome::Confirmed(state)) = handle.outcome().await {
            if state.is_active {
                return seed;
            }
        }
    }
    panic!("every seed dealt a natural");
}

async fn wait_for(
    client: &GameClient,
    mut cond: impl FnMut(&GameView) -> bool,
) -> GameView {
    let mut rx = client.subscribe();
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let view = rx.borrow_and_update().clone();
            if cond(&view) {
                return view;
            }
            rx.changed().await.expect("store alive");
        }
    })
    .await
    .expect("view never reached the expected state")
}

async fn start_mid_round(ledger: &Arc<MockLedger>) -> GameClient {
    let client = GameClient::connect(ledger.clone(), PLAYER, ClientConfig::for_tests())
        .await
        .expect("connect");
    client.start(DEFAULT_MIN_BET).await.expect("start");
    wait_for(&client, |v| v.pending.is_none() && v.game.is_some()).await;
    client
}

#[tokio::test]
async fn poll_repairs_a_session_that_receives_no_events() {
    let ledger = Arc::new(MockLedger::new(PLAYER, live_seed().await));
    ledger.set_drop_events(true);

    // The observer shares the player identity but never acts; with events
    // suppressed, only the poll can bring it up to date.
    let observer = GameClient::connect(ledger.clone(), PLAYER, ClientConfig::for_tests())
        .await
        .expect("connect observer");
    let actor = start_mid_round(&ledger).await;

    let expected = ledger.game_state().expect("round on the table");
    let view = wait_for(&observer, |v| {
        v.game.as_ref().is_some_and(|g| g.game_id == expected.game_id)
    })
    .await;
    let game = view.game.expect("synced via poll");
    assert_eq!(game.player_hand, expected.player_cards);
    assert_eq!(game.bet, expected.bet);

    drop(actor);
}

#[tokio::test]
async fn redelivered_deal_events_do_not_corrupt_the_hand() {
    let ledger = Arc::new(MockLedger::new(PLAYER, live_seed().await));
    let client = start_mid_round(&ledger).await;

    let game = client.view().game.expect("active game");
    for card in &game.player_hand {
        ledger.inject_event(LedgerEvent::CardDealt {
            player: PLAYER.to_string(),
            game_id: game.game_id,
            card: *card,
            is_dealer: false,
            timestamp: game.timestamp,
        });
    }
    tokio::time::sleep(Duration::from_millis(100)).await;

    let after = client.view().game.expect("game");
    assert_eq!(after.player_hand, game.player_hand, "duplicates ignored");
}

#[tokio::test]
async fn events_for_a_stale_round_are_dropped() {
    let ledger = Arc::new(MockLedger::new(PLAYER, live_seed().await));
    let client = start_mid_round(&ledger).await;

    let game = client.view().game.expect("active game");
    ledger.inject_event(LedgerEvent::CardDealt {
        player: PLAYER.to_string(),
        game_id: game.game_id + 100,
        card: game.player_hand[0],
        is_dealer: true,
        timestamp: Utc::now(),
    });
    tokio::time::sleep(Duration::from_millis(100)).await;

    let after = client.view().game.expect("game");
    assert_eq!(after.dealer_hand, game.dealer_hand);
}

#[tokio::test]
async fn reconnecting_resumes_the_round_in_progress() {
    let ledger = Arc::new(MockLedger::new(PLAYER, live_seed().await));
    let first = start_mid_round(&ledger).await;
    let expected = first.view().game.expect("active game");
    drop(first);

    let second = GameClient::connect(ledger.clone(), PLAYER, ClientConfig::for_tests())
        .await
        .expect("reconnect");
    let view = wait_for(&second, |v| v.game.is_some()).await;
    assert_eq!(view.phase, Phase::PlayerTurn);
    let game = view.game.expect("resumed game");
    assert_eq!(game.game_id, expected.game_id);
    assert_eq!(game.player_hand, expected.player_hand);

    // The resumed session can finish the round.
    second.stand().await.expect("stand");
    let view = wait_for(&second, |v| v.phase == Phase::Resolved).await;
    assert!(!view.game.expect("resolved").is_active);
}

#[tokio::test]
async fn transport_outage_keeps_the_last_good_view() {
    let ledger = Arc::new(MockLedger::new(PLAYER, live_seed().await));
    let client = start_mid_round(&ledger).await;
    let before = client.view().game.expect("active game");

    ledger.set_transport_down(true);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(
        client.view().game.expect("view kept"),
        before,
        "failed polls never blank the view"
    );

    ledger.set_transport_down(false);
    let view = wait_for(&client, |v| v.game.is_some()).await;
    assert_eq!(view.game.expect("game").game_id, before.game_id);
}
