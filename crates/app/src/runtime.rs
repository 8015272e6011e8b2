use pester_core::config::TriggerConfig;
use pester_core::engine::{EngineSnapshot, TriggerEngine};
use pester_core::events::{ActionKind, Event};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::{Duration, Instant, interval_at};
use tracing::{info, warn};

/// Runs the trigger engine until the event channel closes.
///
/// The engine holds script values that cannot cross threads, so it is built
/// here and the loop blocks on the channel. Spawn with
/// `tokio::task::spawn_blocking`.
///
/// This task:
/// - Receives events from the event channel.
/// - Applies them to the TriggerEngine.
/// - Publishes fired actions, the updated snapshot and the tick period.
/// - Exits after a panic event or when the event channel closes.
pub fn run_engine_task(
    config: TriggerConfig,
    seed: Option<u64>,
    mut event_rx: mpsc::Receiver<Event>,
    action_tx: broadcast::Sender<ActionKind>,
    state_tx: watch::Sender<EngineSnapshot>,
    period_tx: watch::Sender<Duration>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut engine = TriggerEngine::new(config, seed)?;
    state_tx.send(engine.get_snapshot())?;
    publish_period(&period_tx, &engine);
    info!("Engine task started");

    while let Some(event) = event_rx.blocking_recv() {
        for kind in engine.apply(event) {
            // No subscribers is not an error; the dispatcher may not be up yet
            let _ = action_tx.send(kind);
        }
        state_tx.send(engine.get_snapshot())?;
        publish_period(&period_tx, &engine);

        if engine.is_panicked() {
            info!("Engine panicked, exiting engine task");
            return Ok(());
        }
    }

    info!("Event channel closed, exiting engine task");
    Ok(())
}

/// Pushes the engine's tick period to the tick task when a reload changed it.
fn publish_period(period_tx: &watch::Sender<Duration>, engine: &TriggerEngine) {
    let period = Duration::from_millis(engine.config().delay_ms);
    period_tx.send_if_modified(|current| {
        if *current == period {
            return false;
        }
        *current = period;
        true
    });
}

/// Starts the tick sender task that periodically sends Tick events.
///
/// This task:
/// - Waits one full period before the first tick.
/// - Computes the time delta (dt) since the last tick.
/// - Sends Event::Tick to the event channel.
/// - Restarts its timer whenever a new period arrives on `period_rx`.
pub async fn start_tick_task(
    event_tx: mpsc::Sender<Event>,
    mut period_rx: watch::Receiver<Duration>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut period = *period_rx.borrow_and_update();
    let mut interval = interval_at(Instant::now() + period, period);
    let mut last_time = Instant::now();
    let mut watching = true;
    info!("Tick task started with period {:.3}s", period.as_secs_f64());

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let now = Instant::now();
                let dt = now.duration_since(last_time).as_secs_f64();
                last_time = now;

                if event_tx.send(Event::Tick { dt }).await.is_err() {
                    info!("Event channel closed, stopping tick task");
                    break;
                }
            }
            changed = period_rx.changed(), if watching => {
                if changed.is_err() {
                    // Engine is gone; keep the current period
                    watching = false;
                    continue;
                }
                period = *period_rx.borrow_and_update();
                interval = interval_at(Instant::now() + period, period);
                info!("Tick period changed to {:.3}s", period.as_secs_f64());
            }
        }
    }

    Ok(())
}

/// Hands fired actions to the desktop host.
///
/// Showing popups, playing media and setting wallpapers happen outside this
/// process; here each action is logged for the host to pick up.
pub async fn start_dispatch_task(
    mut action_rx: broadcast::Receiver<ActionKind>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    info!("Dispatch task started");

    loop {
        match action_rx.recv().await {
            Ok(kind) => info!(action = %kind, "Dispatching action"),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!("Dispatcher lagged, dropped {} actions", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => {
                info!("Action channel closed, stopping dispatch task");
                break;
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::task::JoinHandle;
    use tokio::time::timeout;

    type TaskResult = Result<(), String>;

    struct EngineHarness {
        event_tx: mpsc::Sender<Event>,
        action_rx: broadcast::Receiver<ActionKind>,
        state_rx: watch::Receiver<EngineSnapshot>,
        period_rx: watch::Receiver<Duration>,
        handle: JoinHandle<TaskResult>,
    }

    fn spawn_engine(config: TriggerConfig) -> EngineHarness {
        let (event_tx, event_rx) = mpsc::channel(10);
        let (action_tx, action_rx) = broadcast::channel(64);
        let placeholder = TriggerEngine::new(TriggerConfig::default(), Some(0))
            .unwrap()
            .get_snapshot();
        let (state_tx, state_rx) = watch::channel(placeholder);
        let (period_tx, period_rx) =
            watch::channel(Duration::from_millis(config.delay_ms));

        let handle = tokio::task::spawn_blocking(move || {
            run_engine_task(config, Some(1), event_rx, action_tx, state_tx, period_tx)
                .map_err(|e| e.to_string())
        });

        EngineHarness {
            event_tx,
            action_rx,
            state_rx,
            period_rx,
            handle,
        }
    }

    #[tokio::test]
    async fn test_tick_task_sends_events() {
        let (event_tx, mut event_rx) = mpsc::channel(10);
        let (_period_tx, period_rx) = watch::channel(Duration::from_millis(100));
        let handle = tokio::spawn(start_tick_task(event_tx, period_rx));

        let mut count = 0;
        while count < 3 {
            match timeout(Duration::from_millis(300), event_rx.recv()).await {
                Ok(Some(Event::Tick { dt })) => {
                    assert!((0.0..0.3).contains(&dt));
                    count += 1;
                }
                _ => break,
            }
        }

        handle.abort();
        let _ = handle.await;
        assert_eq!(count, 3);
    }

    #[tokio::test]
    async fn test_tick_task_waits_a_full_period_first() {
        let (event_tx, mut event_rx) = mpsc::channel(10);
        let (_period_tx, period_rx) = watch::channel(Duration::from_millis(400));
        let handle = tokio::spawn(start_tick_task(event_tx, period_rx));

        assert!(
            timeout(Duration::from_millis(150), event_rx.recv())
                .await
                .is_err()
        );
        assert!(matches!(
            timeout(Duration::from_millis(600), event_rx.recv()).await,
            Ok(Some(Event::Tick { .. }))
        ));

        handle.abort();
        let _ = handle.await;
    }

    #[tokio::test]
    async fn test_tick_task_follows_period_change() {
        let (event_tx, mut event_rx) = mpsc::channel(100);
        let (period_tx, period_rx) = watch::channel(Duration::from_secs(10));
        let handle = tokio::spawn(start_tick_task(event_tx, period_rx));

        period_tx.send(Duration::from_millis(50)).unwrap();
        let mut count = 0;
        let deadline = Instant::now() + Duration::from_millis(600);
        while let Ok(Some(_)) = tokio::time::timeout_at(deadline, event_rx.recv()).await {
            count += 1;
        }

        handle.abort();
        let _ = handle.await;
        assert!(count >= 5, "only {count} ticks after period change");
    }

    #[tokio::test]
    async fn test_engine_task_publishes_actions_and_snapshots() {
        let mut harness = spawn_engine(TriggerConfig::default());

        harness.event_tx.send(Event::Tick { dt: 1.0 }).await.unwrap();
        harness
            .event_tx
            .send(Event::Trigger {
                kind: ActionKind::Video,
            })
            .await
            .unwrap();
        drop(harness.event_tx);

        assert_eq!(harness.action_rx.recv().await.unwrap(), ActionKind::Popup);
        assert_eq!(harness.action_rx.recv().await.unwrap(), ActionKind::Video);
        assert!(harness.handle.await.unwrap().is_ok());

        let snapshot = harness.state_rx.borrow().clone();
        assert_eq!(snapshot.ticks, 1);
        assert_eq!(snapshot.fired.get("video"), Some(&1));
    }

    #[tokio::test]
    async fn test_engine_task_publishes_reloaded_period() {
        let mut harness = spawn_engine(TriggerConfig::default());

        harness
            .event_tx
            .send(Event::Reload(TriggerConfig {
                delay_ms: 50,
                ..TriggerConfig::default()
            }))
            .await
            .unwrap();

        timeout(Duration::from_secs(2), harness.period_rx.changed())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(*harness.period_rx.borrow(), Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_reload_speeds_up_running_ticks() {
        let mut harness = spawn_engine(TriggerConfig {
            delay_ms: 10_000,
            ..TriggerConfig::default()
        });
        let ticker = tokio::spawn(start_tick_task(
            harness.event_tx.clone(),
            harness.period_rx.clone(),
        ));

        harness
            .event_tx
            .send(Event::Reload(TriggerConfig {
                delay_ms: 50,
                ..TriggerConfig::default()
            }))
            .await
            .unwrap();

        let mut actions = 0;
        let deadline = Instant::now() + Duration::from_millis(600);
        while let Ok(Ok(_)) = tokio::time::timeout_at(deadline, harness.action_rx.recv()).await {
            actions += 1;
        }

        ticker.abort();
        let _ = ticker.await;
        assert!(actions >= 5, "only {actions} actions after reload");
    }

    #[tokio::test]
    async fn test_engine_task_exits_on_panic() {
        let harness = spawn_engine(TriggerConfig::default());

        harness.event_tx.send(Event::Panic).await.unwrap();
        let result = timeout(Duration::from_secs(2), harness.handle).await;
        assert!(matches!(result, Ok(Ok(Ok(())))));
        assert!(harness.state_rx.borrow().panicked);
        // Engine is gone, further events are refused
        assert!(harness.event_tx.send(Event::Tick { dt: 1.0 }).await.is_err());
    }

    #[tokio::test]
    async fn test_dispatch_task_stops_when_channel_closes() {
        let (action_tx, action_rx) = broadcast::channel(4);
        let handle = tokio::spawn(start_dispatch_task(action_rx));
        action_tx.send(ActionKind::Audio).unwrap();
        drop(action_tx);

        let result = timeout(Duration::from_secs(1), handle).await;
        assert!(matches!(result, Ok(Ok(Ok(())))));
    }
}
