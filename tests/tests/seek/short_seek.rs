//! Previews and short jumps move the engine first and fetch afterwards. Ending
//! a scrub gesture stops whatever is still debouncing.

use std::time::Duration;

use lyra::{events::SeekEvent, seek::SeekOutcome};
use rstest::rstest;

use crate::common::{Player, eventually, executed, seek_config};

#[rstest]
#[timeout(Duration::from_secs(15))]
#[tokio::test]
async fn preview_jumps_without_waiting_for_the_cache() {
    let player = Player::open(seek_config()).await;
    player.fixture.hold();

    player.seek.request_seek(70.0, true);
    player.seek.wait_idle().await;

    let target = player.bytes_for(70.0);
    assert_eq!(player.engine.jumps(), vec![target]);
    assert!(!player.cache().ready(target));
    assert!(!player.cache().has_seek_boost());

    player.fixture.release();
    let cache = player.cache();
    eventually(|| cache.ready(target)).await;
}

#[rstest]
#[timeout(Duration::from_secs(15))]
#[tokio::test]
async fn short_jump_boosts_until_prefetched() {
    let player = Player::open(seek_config()).await;
    let origin = player.bytes_for(30.0);
    player.engine.place(origin);
    player.fixture.hold();

    player.seek.request_seek(31.0, false);
    player.seek.wait_idle().await;

    let target = player.bytes_for(31.0);
    assert_eq!(player.engine.jumps(), vec![target]);
    assert_eq!(player.cache().playback_position(), target);
    assert!(player.cache().has_seek_boost());

    player.fixture.release();
    let cache = player.cache();
    eventually(|| cache.ready(target) && !cache.has_seek_boost()).await;
}

#[rstest]
#[timeout(Duration::from_secs(15))]
#[tokio::test]
async fn finishing_a_scrub_drops_the_debounced_target() {
    let mut player = Player::open(seek_config().with_debounce(Duration::from_secs(10))).await;

    for step in 0..30 {
        player.seek.request_seek(40.0 + f64::from(step) * 0.5, true);
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    player.seek.request_seek(55.0, false);
    player.seek.finish_seek();

    assert!(!player.seek.is_seeking());
    let events = player.seek_events();
    assert!(executed(&events).is_empty());
    assert_eq!(completions(&events), vec![&SeekEvent::Completed { success: true }]);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(player.engine.jumps().is_empty());
    assert!(player.seek_events().is_empty());
}

#[rstest]
#[timeout(Duration::from_secs(15))]
#[tokio::test]
async fn finish_waits_for_the_executing_seek() {
    let mut player = Player::open(seek_config()).await;
    player.engine.play();
    player.fixture.hold();

    let version = player.seek.request_seek(60.0, false);
    eventually(|| player.seek.pending_request().is_none() && player.seek.is_seeking()).await;
    player.seek.finish_seek();
    assert!(completions(&player.seek_events()).is_empty());

    player.fixture.release();
    player.seek.wait_idle().await;

    assert_eq!(player.engine.jumps(), vec![player.bytes_for(60.0)]);
    assert_eq!(player.seek.last_outcome(), Some(SeekOutcome::Succeeded));
    let events = player.seek_events();
    assert_eq!(executed(&events), vec![(version, true)]);
    assert_eq!(completions(&events), vec![&SeekEvent::Completed { success: true }]);
    let executed_at = events
        .iter()
        .position(|event| matches!(event, SeekEvent::Executed { .. }));
    let completed_at = events
        .iter()
        .position(|event| matches!(event, SeekEvent::Completed { .. }));
    assert!(completed_at > executed_at);
}

#[rstest]
#[timeout(Duration::from_secs(15))]
#[tokio::test]
async fn requests_are_dropped_after_switching_tracks() {
    let player = Player::open(seek_config().with_debounce(Duration::from_millis(200))).await;

    player.seek.request_seek(50.0, false);
    player.slot.clear();
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert!(player.engine.jumps().is_empty());
    assert!(!player.seek.is_seeking());
}

fn completions(events: &[SeekEvent]) -> Vec<&SeekEvent> {
    events
        .iter()
        .filter(|event| matches!(event, SeekEvent::Completed { .. }))
        .collect()
}
