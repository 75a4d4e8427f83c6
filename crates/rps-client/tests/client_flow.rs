//! # Client Flow Integration Tests
//!
//! Drive [`GameClient`] end to end over the in-memory store: sessions, saves,
//! push events from other players, the poll timer and resource release.

use std::sync::Arc;
use std::time::Duration;

use rps_client::{
    Choice, ClientSettings, GameClient, GameClientApi, GameResult, InMemoryStore,
    LeaderboardMode, LeaderboardSettings, Outcome, RowId, TableStoreExt, UserId,
    GAME_RESULTS_TABLE, HISTORY_LIMIT,
};
use tokio::time::timeout;
use tokio_test::{assert_err, assert_ok};

fn settings(mode: LeaderboardMode) -> ClientSettings {
    ClientSettings {
        leaderboard: LeaderboardSettings {
            mode,
            ..LeaderboardSettings::default()
        },
        poll_interval: Duration::from_secs(30),
    }
}

async fn eventually<F: Fn() -> bool>(check: F) {
    timeout(Duration::from_secs(2), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

/// A round played by someone other than the signed-in user.
async fn foreign_round(store: &InMemoryStore, name: &str, result: Outcome) {
    let (player, computer) = match result {
        Outcome::Win => (Choice::Rock, Choice::Scissors),
        Outcome::Loss => (Choice::Rock, Choice::Paper),
        Outcome::Draw => (Choice::Rock, Choice::Rock),
    };
    let game = GameResult::new(
        UserId::new(format!("id-{name}")),
        name,
        player,
        computer,
        result,
    );
    store
        .insert_one::<_, GameResult>(GAME_RESULTS_TABLE, &game)
        .await
        .expect("insert");
}

#[tokio::test]
async fn test_other_player_push_refreshes_leaderboard_only() {
    let store = Arc::new(InMemoryStore::new());
    let client = GameClient::new(store.clone(), settings(LeaderboardMode::Raw));
    client.sign_up("alice@x.io", "secret1", "alice").await.unwrap();
    assert!(client.start_live_updates().await.unwrap());

    let before = client.refresh_count();
    foreign_round(&store, "bob", Outcome::Win).await;

    eventually(|| client.refresh_count() > before).await;
    eventually(|| client.leaderboard().iter().any(|e| e.username == "bob")).await;
    assert!(client.history().is_empty());

    client.stop_live_updates().await;
}

#[tokio::test]
async fn test_own_save_echo_is_not_duplicated() {
    let store = Arc::new(InMemoryStore::new());
    let client = GameClient::new(store.clone(), settings(LeaderboardMode::Raw));
    client.sign_up("alice@x.io", "secret1", "alice").await.unwrap();
    client.start_live_updates().await.unwrap();

    let saved = client.play_round(Choice::Scissors).await.unwrap();
    // One refresh from the save, one from the pushed echo.
    eventually(|| client.refresh_count() >= 2).await;

    assert_eq!(client.history(), vec![saved]);
    client.stop_live_updates().await;
}

#[tokio::test]
async fn test_uuid_keyed_rows_flow_through_push_and_fetch() {
    let store = Arc::new(InMemoryStore::new().with_uuid_row_ids());
    let client = GameClient::new(store.clone(), settings(LeaderboardMode::Raw));
    let session = client.sign_up("alice@x.io", "secret1", "alice").await.unwrap();
    client.start_live_updates().await.unwrap();

    let saved = client.play_round(Choice::Paper).await.unwrap();
    assert!(matches!(saved.id, Some(RowId::Text(_))));
    foreign_round(&store, "bob", Outcome::Win).await;

    eventually(|| client.leaderboard().iter().any(|e| e.username == "bob")).await;
    assert_eq!(client.history(), vec![saved.clone()]);
    assert_ok!(client.fetch_user_history(&session.user_id).await);
    assert_eq!(client.history(), vec![saved]);
    client.stop_live_updates().await;
}

#[tokio::test]
async fn test_stats_trigger_update_refreshes_precomputed_board() {
    let store = Arc::new(InMemoryStore::with_stats_trigger());
    let client = GameClient::new(store.clone(), settings(LeaderboardMode::Stats));
    client.sign_up("alice@x.io", "secret1", "alice").await.unwrap();
    client.start_live_updates().await.unwrap();

    foreign_round(&store, "bob", Outcome::Win).await;
    foreign_round(&store, "bob", Outcome::Loss).await;

    eventually(|| {
        client
            .leaderboard()
            .iter()
            .any(|e| e.username == "bob" && e.total == 2 && e.win_rate == "50.0")
    })
    .await;
    // alice has played nothing and must not be ranked.
    assert!(client.leaderboard().iter().all(|e| e.username != "alice"));
    client.stop_live_updates().await;
}

#[tokio::test]
async fn test_stop_releases_channel_and_silences_callbacks() {
    let store = Arc::new(InMemoryStore::new());
    let client = GameClient::new(store.clone(), settings(LeaderboardMode::Raw));
    client.sign_up("alice@x.io", "secret1", "alice").await.unwrap();
    client.start_live_updates().await.unwrap();
    assert_eq!(store.active_subscriptions(), 1);

    client.stop_live_updates().await;
    eventually(|| store.active_subscriptions() == 0).await;

    let before = client.refresh_count();
    foreign_round(&store, "bob", Outcome::Win).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(client.refresh_count(), before);
}

#[tokio::test]
async fn test_restart_replaces_previous_subscription() {
    let store = Arc::new(InMemoryStore::new());
    let client = GameClient::new(store.clone(), settings(LeaderboardMode::Raw));
    client.sign_up("alice@x.io", "secret1", "alice").await.unwrap();

    client.start_live_updates().await.unwrap();
    client.start_live_updates().await.unwrap();
    eventually(|| store.active_subscriptions() == 1).await;

    client.sign_out().await.unwrap();
    eventually(|| store.active_subscriptions() == 0).await;
}

#[tokio::test(start_paused = true)]
async fn test_poll_timer_picks_up_missed_rounds() {
    let store = Arc::new(InMemoryStore::new());
    let client = GameClient::new(store.clone(), settings(LeaderboardMode::Raw));
    let session = client.sign_up("alice@x.io", "secret1", "alice").await.unwrap();
    let poller = client.start_auto_refresh();

    let game = GameResult::new(
        session.user_id.clone(),
        "alice",
        Choice::Paper,
        Choice::Rock,
        Outcome::Win,
    );
    store
        .insert_one::<_, GameResult>(GAME_RESULTS_TABLE, &game)
        .await
        .unwrap();
    assert!(client.history().is_empty());

    tokio::time::sleep(Duration::from_secs(31)).await;
    assert_eq!(client.history().len(), 1);
    assert_eq!(client.leaderboard()[0].username, "alice");

    poller.stop().await;
}

#[tokio::test]
async fn test_history_window_and_refetch() {
    let store = Arc::new(InMemoryStore::new());
    let client = GameClient::new(store.clone(), settings(LeaderboardMode::Raw));
    let session = client.sign_up("alice@x.io", "secret1", "alice").await.unwrap();

    for _ in 0..HISTORY_LIMIT + 3 {
        client.play_round(Choice::Rock).await.unwrap();
    }
    assert_eq!(client.history().len(), HISTORY_LIMIT);
    assert_eq!(client.refresh_count(), (HISTORY_LIMIT + 3) as u64);

    assert_ok!(client.sign_out().await);
    assert!(client.history().is_empty());
    assert_err!(client.play_round(Choice::Rock).await);

    assert_ok!(client.sign_in("alice@x.io", "secret1").await);
    let fetched = client.fetch_user_history(&session.user_id).await.unwrap();
    assert_eq!(fetched.len(), HISTORY_LIMIT);
    assert_eq!(client.history(), fetched);
}

#[tokio::test]
async fn test_ensure_user_stats_keeps_counters() {
    let store = Arc::new(InMemoryStore::with_stats_trigger());
    let client = GameClient::new(store.clone(), settings(LeaderboardMode::Stats));
    let session = client.sign_up("alice@x.io", "secret1", "alice").await.unwrap();

    client
        .save_game_result(
            &session.user_id,
            &session.username,
            Choice::Paper,
            Choice::Rock,
            Outcome::Win,
        )
        .await
        .unwrap();

    let first = client
        .ensure_user_stats(&session.user_id, "alice")
        .await
        .unwrap();
    let second = client
        .ensure_user_stats(&session.user_id, "alice")
        .await
        .unwrap();
    assert_eq!(first.wins, 1);
    assert_eq!(first, second);
    assert_eq!(
        client.fetch_user_stats(&session.user_id).await.unwrap(),
        Some(first)
    );
}
