//! Committed jumps far from the playback position: cache waits, deferred
//! buffering, restore and natural progress.

use std::time::Duration;

use lyra::{
    events::SeekEvent,
    seek::{DecodeEngine, SeekOutcome},
};
use rstest::rstest;

use crate::common::{Player, eventually, executed, seek_config};

#[rstest]
#[timeout(Duration::from_secs(15))]
#[tokio::test]
async fn long_seek_commits_once_target_is_cached() {
    let mut player = Player::open(seek_config()).await;
    player.engine.play();

    let version = player.seek.request_seek(60.0, false);
    player.seek.wait_idle().await;

    assert_eq!(player.engine.jumps(), vec![player.bytes_for(60.0)]);
    assert!(player.cache().ready(player.bytes_for(60.0)));
    assert_eq!(player.seek.last_outcome(), Some(SeekOutcome::Succeeded));
    assert_eq!(executed(&player.seek_events()), vec![(version, true)]);
}

#[rstest]
#[timeout(Duration::from_secs(15))]
#[tokio::test]
async fn rapid_requests_commit_only_the_last_target() {
    let mut player = Player::open(seek_config().with_debounce(Duration::from_millis(50))).await;

    let first = player.seek.request_seek(30.0, false);
    tokio::time::sleep(Duration::from_millis(10)).await;
    let second = player.seek.request_seek(45.0, false);
    player.seek.wait_idle().await;

    assert!(second > first);
    assert_eq!(player.engine.jumps(), vec![player.bytes_for(45.0)]);
    assert_eq!(executed(&player.seek_events()), vec![(second, true)]);
}

#[rstest]
#[timeout(Duration::from_secs(15))]
#[tokio::test]
async fn stalled_long_seek_defers_then_resumes_on_arrival() {
    let mut player = Player::open(seek_config()).await;
    player.engine.play();
    player.fixture.hold();

    let version = player.seek.request_seek(60.0, false);
    eventually(|| player.engine.is_paused()).await;

    assert!(player.engine.jumps().is_empty());
    assert!(player.seek.is_seeking());
    assert!(
        player
            .seek_events()
            .contains(&SeekEvent::Deferred { version })
    );

    player.fixture.release();
    player.seek.wait_idle().await;

    assert_eq!(player.engine.jumps(), vec![player.bytes_for(60.0)]);
    assert!(player.engine.is_playing());
    assert_eq!(player.seek.last_outcome(), Some(SeekOutcome::Succeeded));
    assert_eq!(executed(&player.seek_events()), vec![(version, true)]);
}

#[rstest]
#[timeout(Duration::from_secs(15))]
#[tokio::test]
async fn cancelling_mid_deferral_restores_origin() {
    let mut player = Player::open(seek_config()).await;
    let origin = player.bytes_for(5.0);
    player.engine.place(origin);
    player.engine.play();
    player.fixture.hold();

    let version = player.seek.request_seek(60.0, false);
    eventually(|| player.engine.is_paused()).await;

    assert!(player.seek.cancel_pending_seek_and_restore());
    player.seek.wait_idle().await;

    assert_eq!(player.engine.position(), origin);
    assert!(player.engine.is_playing());
    assert!(!player.engine.jumps().contains(&player.bytes_for(60.0)));
    assert_eq!(player.seek.last_outcome(), Some(SeekOutcome::Restored));
    assert_eq!(executed(&player.seek_events()), vec![(version, false)]);
    player.fixture.release();
}

#[rstest]
#[timeout(Duration::from_secs(15))]
#[tokio::test]
async fn restoring_a_paused_player_keeps_it_paused() {
    let player = Player::open(seek_config()).await;
    let origin = player.bytes_for(5.0);
    player.engine.place(origin);
    player.engine.pause();
    player.fixture.hold();

    player.seek.request_seek(60.0, false);
    eventually(|| player.seek.pending_request().is_none() && player.seek.is_seeking()).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(player.seek.cancel_pending_seek_and_restore());
    player.seek.wait_idle().await;

    assert_eq!(player.engine.position(), origin);
    assert!(player.engine.is_paused());
    assert!(!player.engine.is_playing());
    player.fixture.release();
}

#[rstest]
#[timeout(Duration::from_secs(15))]
#[tokio::test]
async fn deferred_seek_gives_up_and_restores_origin() {
    let config = seek_config().with_long_waits(Duration::from_millis(100), Duration::from_millis(300));
    let mut player = Player::open(config).await;
    let origin = player.bytes_for(5.0);
    player.engine.place(origin);
    player.engine.play();
    player.fixture.hold();

    let version = player.seek.request_seek(60.0, false);
    player.seek.wait_idle().await;

    assert_eq!(player.engine.position(), origin);
    assert!(player.engine.is_playing());
    assert_eq!(player.seek.last_outcome(), Some(SeekOutcome::Failed));
    assert_eq!(player.seek.consecutive_failures(), 1);
    let events = player.seek_events();
    assert!(events.contains(&SeekEvent::Deferred { version }));
    assert_eq!(executed(&events), vec![(version, false)]);
    player.fixture.release();
}

#[rstest]
#[timeout(Duration::from_secs(15))]
#[tokio::test]
async fn abandoning_a_long_seek_keeps_position_and_restores_play_state() {
    let player = Player::open(seek_config()).await;
    let origin = player.bytes_for(5.0);
    player.engine.place(origin);
    player.engine.play();
    player.fixture.hold();

    player.seek.request_seek(60.0, false);
    eventually(|| player.engine.is_paused()).await;

    assert!(player.seek.cancel_pending_long_seek());
    player.seek.wait_idle().await;

    assert!(player.engine.jumps().is_empty());
    assert!(player.engine.is_playing());
    assert_eq!(player.seek.last_outcome(), Some(SeekOutcome::Abandoned));
    player.fixture.release();
}

#[rstest]
#[timeout(Duration::from_secs(15))]
#[tokio::test]
async fn newer_request_supersedes_a_deferred_seek() {
    let mut player = Player::open(seek_config()).await;
    player.engine.play();
    player.fixture.hold();

    let first = player.seek.request_seek(60.0, false);
    eventually(|| player.engine.is_paused()).await;
    let second = player.seek.request_seek(20.0, false);
    assert!(player.engine.is_playing());

    player.fixture.release();
    player.seek.wait_idle().await;

    assert_eq!(player.engine.jumps(), vec![player.bytes_for(20.0)]);
    assert!(player.engine.is_playing());
    let events = player.seek_events();
    assert!(events.contains(&SeekEvent::Deferred { version: first }));
    assert_eq!(executed(&events), vec![(second, true)]);
}

#[rstest]
#[timeout(Duration::from_secs(15))]
#[tokio::test]
async fn natural_progress_makes_the_jump_moot() {
    let config = seek_config().with_long_waits(Duration::from_secs(5), Duration::from_secs(5));
    let mut player = Player::open(config).await;
    player.engine.place(player.bytes_for(10.0));
    player.engine.play();
    player.fixture.hold();

    let version = player.seek.request_seek(12.0, false);
    tokio::time::sleep(Duration::from_millis(80)).await;
    player.engine.advance(player.bytes_for(2.0));
    player.seek.wait_idle().await;

    assert!(player.engine.jumps().is_empty());
    assert_eq!(player.seek.last_outcome(), Some(SeekOutcome::NaturalProgress));
    assert_eq!(player.seek.consecutive_failures(), 0);
    assert_eq!(executed(&player.seek_events()), vec![(version, true)]);
    player.fixture.release();
}

#[rstest]
#[timeout(Duration::from_secs(15))]
#[tokio::test]
async fn backward_drift_does_not_cancel_a_long_seek() {
    let player = Player::open(seek_config()).await;
    player.engine.place(player.bytes_for(10.0));
    player.engine.play();
    player.fixture.hold();

    player.seek.request_seek(40.0, false);
    tokio::time::sleep(Duration::from_millis(60)).await;
    player.engine.place(player.bytes_for(8.0));
    eventually(|| player.engine.is_paused()).await;

    player.fixture.release();
    player.seek.wait_idle().await;

    assert_eq!(player.engine.jumps(), vec![player.bytes_for(40.0)]);
    assert_eq!(player.seek.last_outcome(), Some(SeekOutcome::Succeeded));
}
