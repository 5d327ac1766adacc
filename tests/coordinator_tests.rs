use std::time::{Duration, Instant};

use nostr_pow_rs::miner::algorithm::{leading_zero_bits, nip13};
use nostr_pow_rs::types::UnsignedNote;
use nostr_pow_rs::{
    CoordinatorSettings, MinedResult, MinerError, MiningCoordinator, MiningRequest, MiningState,
    SnapshotStore,
};

const PUBKEY: &str = "e771af0b05c8e95fcdf6feb3500544d2fb1ccd384788e9f490bb3ee28e8ed66f";

fn fast_settings() -> CoordinatorSettings {
    CoordinatorSettings {
        progress_interval: Duration::from_millis(20),
        hash_rate_refresh: Duration::ZERO,
        ..CoordinatorSettings::default()
    }
}

fn request(difficulty: u32, workers: usize) -> MiningRequest {
    MiningRequest::new(PUBKEY, "hello world", difficulty)
        .with_workers(workers)
        .with_created_at(1_668_680_774)
}

fn verify(result: &MinedResult, difficulty: u32) {
    let note = UnsignedNote {
        pubkey: result.note.pubkey.clone(),
        created_at: result.note.created_at,
        kind: result.note.kind,
        tags: result.note.tags.clone(),
        content: result.note.content.clone(),
    };
    let id = nip13::stamped_id(&note, result.nonce, difficulty).unwrap();
    assert_eq!(hex::encode(id), result.hash);
    assert_eq!(result.note.id, result.hash);
    assert!(leading_zero_bits(&id) >= difficulty);
    assert_eq!(leading_zero_bits(&id), result.score);
}

fn pump_for(coordinator: &mut MiningCoordinator, duration: Duration) {
    let until = Instant::now() + duration;
    while Instant::now() < until {
        coordinator.pump(Duration::from_millis(10));
    }
}

#[test]
fn difficulty_zero_succeeds_on_first_nonce() {
    let mut coordinator = MiningCoordinator::with_threads(fast_settings());
    let mut future = coordinator.start(request(0, 3)).unwrap();

    let result = coordinator
        .wait(Instant::now() + Duration::from_secs(10))
        .unwrap()
        .expect("difficulty 0 must finish");

    assert_eq!(coordinator.state(), MiningState::Succeeded);
    assert!(result.nonce < 3, "first nonce of some worker, got {}", result.nonce);
    verify(&result, 0);
    assert_eq!(future.try_result().unwrap().unwrap(), result);
}

#[tokio::test]
async fn low_difficulty_is_mined_and_verifiable() {
    let mut coordinator = MiningCoordinator::with_threads(fast_settings());
    let future = coordinator.start(request(8, 2)).unwrap();

    let result = coordinator
        .wait(Instant::now() + Duration::from_secs(30))
        .unwrap()
        .expect("8 bits should be found quickly");
    verify(&result, 8);
    assert!(result
        .note
        .tags
        .contains(&vec!["nonce".to_string(), result.nonce.to_string(), "8".to_string()]));
    assert!(result.note.tags.contains(&vec!["miner".to_string(), "nostr-pow".to_string()]));

    assert_eq!(future.await.unwrap(), result);
}

#[test]
fn cancelled_attempt_ignores_late_messages() {
    let mut coordinator = MiningCoordinator::with_threads(fast_settings());
    let mut future = coordinator.start(request(250, 2)).unwrap();
    pump_for(&mut coordinator, Duration::from_millis(100));

    coordinator.cancel();
    let best = coordinator.best().cloned();
    let applied = coordinator.stats().messages_applied;

    pump_for(&mut coordinator, Duration::from_millis(100));
    assert_eq!(coordinator.best().cloned(), best);
    assert_eq!(coordinator.stats().messages_applied, applied);
    assert_eq!(coordinator.state(), MiningState::Cancelled);
    assert!(matches!(future.try_result(), Some(Err(MinerError::Cancelled))));

    coordinator.cancel();
    assert_eq!(coordinator.state(), MiningState::Cancelled);
}

#[test]
fn snapshot_survives_restart_with_fewer_workers() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("snapshot.json");

    let mut first = MiningCoordinator::with_threads(fast_settings());
    first.start(request(250, 4)).unwrap();
    pump_for(&mut first, Duration::from_millis(300));
    let snapshot = first.pause().unwrap();
    drop(first);

    assert!(snapshot.has_progress());
    assert_eq!(snapshot.worker_count, 4);
    assert_eq!(snapshot.worker_nonces.len(), 4);
    let saved_best = snapshot.best.clone().unwrap();

    let mut store = SnapshotStore::new(&path, Duration::from_secs(60));
    store.save(&snapshot).unwrap();
    let loaded = store.load().unwrap().unwrap();
    assert_eq!(loaded, snapshot);

    let mut second = MiningCoordinator::with_threads(fast_settings());
    second.set_worker_count(2).unwrap();
    second.resume(Some(loaded)).unwrap();
    assert_eq!(second.worker_count(), Some(2));
    assert!(second.best().unwrap().score >= saved_best.score);

    pump_for(&mut second, Duration::from_millis(200));
    let resumed = second.snapshot().unwrap();
    assert_eq!(resumed.worker_nonces.len(), 4);
    // Worker 0 took saved cursors 0 and 2 as lanes, worker 1 took 1 and 3.
    for (lane, saved_index) in [0, 2, 1, 3].into_iter().enumerate() {
        let saved = snapshot.worker_nonces[saved_index];
        let now = resumed.worker_nonces[lane];
        assert!(now >= saved, "cursor went backwards: {} -> {}", saved, now);
        assert_eq!((now - saved) % 2, 0, "lane left its residue class");
    }
    assert!(resumed.best.unwrap().score >= saved_best.score);
    second.cancel();
}

#[test]
fn in_place_resume_continues_the_same_attempt() {
    let mut coordinator = MiningCoordinator::with_threads(fast_settings());
    let mut first = coordinator.start(request(250, 2)).unwrap();
    pump_for(&mut coordinator, Duration::from_millis(150));

    let token = coordinator.live_token();
    let paused = coordinator.pause().unwrap();
    assert_eq!(coordinator.live_token(), token);
    assert!(first.try_result().is_none());

    let mut second = coordinator.resume(None).unwrap();
    assert_eq!(coordinator.live_token(), token);
    pump_for(&mut coordinator, Duration::from_millis(150));

    let later = coordinator.snapshot().unwrap();
    assert!(later.best.unwrap().score >= paused.best.unwrap().score);
    coordinator.cancel();
    assert!(matches!(first.try_result(), Some(Err(MinerError::Cancelled))));
    assert!(matches!(second.try_result(), Some(Err(MinerError::Cancelled))));
}

#[test]
fn request_without_content_is_rejected() {
    let mut coordinator = MiningCoordinator::with_threads(fast_settings());
    let err = coordinator
        .start(MiningRequest::new(PUBKEY, "", 10))
        .unwrap_err();
    assert!(matches!(err, MinerError::InvalidRequest(_)));
    assert_eq!(coordinator.state(), MiningState::Idle);
    assert!(matches!(coordinator.pause(), Err(MinerError::InvalidState { .. })));
    assert!(matches!(coordinator.resume(None), Err(MinerError::InvalidState { .. })));
}
