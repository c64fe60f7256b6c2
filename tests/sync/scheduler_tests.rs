// Tests for the background sync scheduler
// Time is paused, so sleeps advance instantly once every task is idle

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

use ferry::error::{ConfigError, TickError};
use ferry::sync::{
    ConfigSource, SchedulerHooks, SchedulerState, SyncConfig, SyncEngine, SyncMode, SyncScheduler,
    TickOutcome,
};

use crate::common::{config, MemoryLocal, MemoryRemote};

const HOUR: Duration = Duration::from_secs(3600);

struct Harness {
    local: Arc<MemoryLocal>,
    remote: Arc<MemoryRemote>,
    scheduler: SyncScheduler,
    ticks: mpsc::UnboundedReceiver<()>,
}

fn harness(source: Arc<dyn ConfigSource>, hooks: SchedulerHooks) -> Harness {
    let local = Arc::new(MemoryLocal::new());
    let remote = Arc::new(MemoryRemote::new());
    let engine = SyncEngine::new(local.clone(), remote.clone());

    let (tx, ticks) = mpsc::unbounded_channel();
    let hooks = hooks.on_sync_end(move || {
        let _ = tx.send(());
    });

    Harness {
        local,
        remote,
        scheduler: SyncScheduler::new(engine, source, hooks),
        ticks,
    }
}

fn hourly() -> Arc<dyn ConfigSource> {
    Arc::new(SyncConfig {
        poll_interval: HOUR,
        ..config(SyncMode::RemoteToLocal)
    })
}

#[tokio::test(start_paused = true)]
async fn test_sync_now_skips_the_remaining_wait() {
    let mut h = harness(hourly(), SchedulerHooks::new());
    h.remote.put("/a.gcode", b"G28");
    let started = Instant::now();

    h.scheduler.start();
    tokio::task::yield_now().await;
    h.scheduler.sync_now();
    h.ticks.recv().await.unwrap();

    assert!(started.elapsed() < HOUR);
    assert!(h.local.contains("cloud/a.gcode"));

    h.scheduler.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_ticks_follow_the_poll_interval() {
    let source: Arc<dyn ConfigSource> = Arc::new(SyncConfig {
        poll_interval: Duration::from_secs(60),
        ..config(SyncMode::RemoteToLocal)
    });
    let mut h = harness(source, SchedulerHooks::new());
    let started = Instant::now();

    h.scheduler.start();
    h.ticks.recv().await.unwrap();
    assert!(started.elapsed() >= Duration::from_secs(60));

    h.ticks.recv().await.unwrap();
    assert!(started.elapsed() >= Duration::from_secs(120));

    h.scheduler.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_disallowed_sync_is_skipped() {
    let asked = Arc::new(AtomicUsize::new(0));
    let starts = Arc::new(AtomicUsize::new(0));
    let hooks = {
        let asked = asked.clone();
        let starts = starts.clone();
        SchedulerHooks::new()
            .sync_allowed(move || {
                asked.fetch_add(1, Ordering::SeqCst);
                false
            })
            .on_sync_start(move || {
                starts.fetch_add(1, Ordering::SeqCst);
            })
    };
    let h = harness(hourly(), hooks);

    h.scheduler.start();
    h.scheduler.sync_now();
    tokio::time::sleep(HOUR * 2 + Duration::from_secs(1)).await;

    assert!(asked.load(Ordering::SeqCst) >= 2);
    assert_eq!(starts.load(Ordering::SeqCst), 0);
    assert_eq!(h.local.list_calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.scheduler.state(), SchedulerState::Idle);

    h.scheduler.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_stop_is_prompt_and_idempotent() {
    let h = harness(hourly(), SchedulerHooks::new());
    let started = Instant::now();

    h.scheduler.start();
    tokio::task::yield_now().await;
    h.scheduler.stop().await;

    assert!(started.elapsed() < HOUR);
    assert_eq!(h.scheduler.state(), SchedulerState::Stopped);
    assert_eq!(h.local.list_calls.load(Ordering::SeqCst), 0);

    h.scheduler.stop().await;
    h.scheduler.start();
    h.scheduler.sync_now();
    tokio::time::sleep(HOUR * 2).await;

    assert_eq!(h.scheduler.state(), SchedulerState::Stopped);
    assert_eq!(h.local.list_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_stop_without_start() {
    let h = harness(hourly(), SchedulerHooks::new());

    h.scheduler.stop().await;

    assert_eq!(h.scheduler.state(), SchedulerState::Stopped);
    assert!(matches!(h.scheduler.run_once().await, TickOutcome::Skipped));
}

#[tokio::test(start_paused = true)]
async fn test_state_goes_through_syncing() {
    let mut h = harness(hourly(), SchedulerHooks::new());
    // Keeps the tick parked long enough to observe it
    *h.remote.list_delay.lock().unwrap() = Some(Duration::from_secs(10));
    let mut states = h.scheduler.subscribe();
    assert_eq!(*states.borrow(), SchedulerState::Idle);

    h.scheduler.start();
    h.scheduler.sync_now();

    states.changed().await.unwrap();
    assert_eq!(*states.borrow_and_update(), SchedulerState::Syncing);
    h.ticks.recv().await.unwrap();
    states.changed().await.unwrap();
    assert_eq!(*states.borrow_and_update(), SchedulerState::Idle);

    h.scheduler.stop().await;
    assert_eq!(*states.borrow(), SchedulerState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn test_stop_during_tick_lets_it_finish() {
    let mut h = harness(hourly(), SchedulerHooks::new());
    h.remote.put("/a.gcode", b"G28");
    *h.remote.list_delay.lock().unwrap() = Some(Duration::from_secs(10));
    let mut states = h.scheduler.subscribe();

    h.scheduler.start();
    h.scheduler.sync_now();
    states.changed().await.unwrap();
    assert_eq!(*states.borrow_and_update(), SchedulerState::Syncing);

    h.scheduler.stop().await;

    assert!(h.ticks.try_recv().is_ok());
    assert!(h.local.contains("cloud/a.gcode"));
    assert_eq!(h.scheduler.state(), SchedulerState::Stopped);
    let listed = h.remote.list_calls.load(Ordering::SeqCst);
    assert_eq!(listed, 1);

    h.scheduler.sync_now();
    tokio::time::sleep(HOUR * 2).await;
    assert_eq!(h.remote.list_calls.load(Ordering::SeqCst), listed);
    assert_eq!(h.scheduler.state(), SchedulerState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn test_sync_now_during_tick_is_absorbed() {
    let mut h = harness(hourly(), SchedulerHooks::new());
    *h.remote.list_delay.lock().unwrap() = Some(Duration::from_secs(10));
    let mut states = h.scheduler.subscribe();

    h.scheduler.start();
    h.scheduler.sync_now();
    states.changed().await.unwrap();
    assert_eq!(*states.borrow_and_update(), SchedulerState::Syncing);

    // Arrives while the tick is parked in the remote listing
    h.scheduler.sync_now();
    h.ticks.recv().await.unwrap();
    let first_tick_done = Instant::now();
    assert_eq!(h.remote.list_calls.load(Ordering::SeqCst), 1);

    // The next tick waits for the full interval
    h.ticks.recv().await.unwrap();
    assert!(first_tick_done.elapsed() >= HOUR);
    assert_eq!(h.remote.list_calls.load(Ordering::SeqCst), 2);

    h.scheduler.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_config_error_skips_tick_then_recovers() {
    let broken = Arc::new(AtomicBool::new(true));
    let source: Arc<dyn ConfigSource> = {
        let broken = broken.clone();
        Arc::new(move || -> Result<SyncConfig, ConfigError> {
            if broken.load(Ordering::SeqCst) {
                Err(ConfigError::UnknownMode("sideways".to_string()))
            } else {
                Ok(SyncConfig {
                    poll_interval: HOUR,
                    ..config(SyncMode::RemoteToLocal)
                })
            }
        })
    };
    let mut h = harness(source, SchedulerHooks::new());
    h.remote.put("/a.gcode", b"G28");

    h.scheduler.start();
    h.scheduler.sync_now();
    h.ticks.recv().await.unwrap();
    assert_eq!(h.local.list_calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.scheduler.state(), SchedulerState::Idle);

    broken.store(false, Ordering::SeqCst);
    h.scheduler.sync_now();
    h.ticks.recv().await.unwrap();
    assert_eq!(h.local.list_calls.load(Ordering::SeqCst), 1);
    assert!(h.local.contains("cloud/a.gcode"));

    h.scheduler.stop().await;
}

#[tokio::test]
async fn test_config_error_still_runs_hooks() {
    let starts = Arc::new(AtomicUsize::new(0));
    let hooks = {
        let starts = starts.clone();
        SchedulerHooks::new().on_sync_start(move || {
            starts.fetch_add(1, Ordering::SeqCst);
        })
    };
    let source: Arc<dyn ConfigSource> = Arc::new(|| -> Result<SyncConfig, ConfigError> {
        Err(ConfigError::InvalidInterval("soon".to_string()))
    });
    let mut h = harness(source, hooks);
    let mut states = h.scheduler.subscribe();

    let outcome = h.scheduler.run_once().await;

    assert!(matches!(outcome, TickOutcome::Aborted(TickError::Config(_))));
    assert_eq!(starts.load(Ordering::SeqCst), 1);
    assert!(h.ticks.try_recv().is_ok());
    assert_eq!(h.local.list_calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.remote.list_calls.load(Ordering::SeqCst), 0);
    // Went through Syncing and back
    assert!(states.has_changed().unwrap());
    assert_eq!(*states.borrow_and_update(), SchedulerState::Idle);
}

#[tokio::test]
async fn test_run_once_reports_outcome() {
    let h = harness(hourly(), SchedulerHooks::new());
    h.remote.put("/a.gcode", b"G28");

    match h.scheduler.run_once().await {
        TickOutcome::Completed(report) => {
            assert_eq!(report.mode, SyncMode::RemoteToLocal);
            assert_eq!(report.stats.downloaded, 1);
        }
        other => panic!("unexpected outcome: {:?}", other),
    }

    h.remote.fail_listing.store(true, Ordering::SeqCst);
    assert!(matches!(h.scheduler.run_once().await, TickOutcome::Aborted(_)));
}
