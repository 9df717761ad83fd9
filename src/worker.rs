use std::{future::Future, time::Duration};

use tokio::{sync::watch, task::JoinHandle, time::sleep};
use tracing::{info, warn};

/// A periodically-reawakened background task: sleep for the current delay,
/// run one tick, repeat. Cancellation is cooperative through a watch channel
/// and is observed no later than the next sleep boundary; an in-flight tick
/// is allowed to finish. A failing tick is logged and the loop continues at
/// the next interval.
pub struct PollingWorker {
    name: &'static str,
    stop_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl PollingWorker {
    pub fn spawn<F, Fut>(
        name: &'static str,
        initial_delay: Duration,
        interval: Duration,
        tick: F,
    ) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self::spawn_with_cleanup(name, initial_delay, interval, tick, || {})
    }

    /// Like [`PollingWorker::spawn`] with a cleanup closure that runs once
    /// after the loop exits, before the task finishes.
    pub fn spawn_with_cleanup<F, Fut, C>(
        name: &'static str,
        initial_delay: Duration,
        interval: Duration,
        mut tick: F,
        cleanup: C,
    ) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
        C: FnOnce() + Send + 'static,
    {
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let handle = tokio::spawn(async move {
            let mut delay = initial_delay;
            loop {
                tokio::select! {
                    _ = sleep(delay) => {}
                    _ = stop_rx.changed() => break,
                }
                // A stop raised mid-sleep may lose the select race; the flag
                // check keeps the boundary guarantee.
                if *stop_rx.borrow() {
                    break;
                }
                if let Err(err) = tick().await {
                    warn!(worker = name, ?err, "tick failed; retrying at the next interval");
                }
                delay = interval;
            }
            cleanup();
            info!(worker = name, "worker stopped");
        });
        Self {
            name,
            stop_tx,
            handle,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Requests termination. Idempotent; after this returns no new tick
    /// begins, though a tick already running completes.
    pub fn stop(&self) {
        let _ = self.stop_tx.send(true);
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Stops the worker and waits for the loop to wind down.
    pub async fn join(self) {
        self.stop();
        let _ = self.handle.await;
    }
}

#[cfg(test)]
mod tests {
    use super::PollingWorker;
    use std::{
        sync::{
            atomic::{AtomicBool, AtomicUsize, Ordering},
            Arc,
        },
        time::Duration,
    };

    #[tokio::test(start_paused = true)]
    async fn ticks_repeat_until_stopped() {
        let (tick_tx, mut tick_rx) = tokio::sync::mpsc::unbounded_channel();
        let worker = PollingWorker::spawn(
            "test",
            Duration::from_secs(1),
            Duration::from_secs(5),
            move || {
                let tick_tx = tick_tx.clone();
                async move {
                    tick_tx.send(()).ok();
                    Ok(())
                }
            },
        );

        tick_rx.recv().await.expect("first tick should fire");
        tick_rx.recv().await.expect("second tick should fire");
        worker.join().await;
    }

    #[tokio::test(start_paused = true)]
    async fn stop_before_the_first_tick_prevents_any_tick() {
        let count = Arc::new(AtomicUsize::new(0));
        let tick_count = Arc::clone(&count);
        let worker = PollingWorker::spawn(
            "test",
            Duration::from_secs(3600),
            Duration::from_secs(3600),
            move || {
                let tick_count = Arc::clone(&tick_count);
                async move {
                    tick_count.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            },
        );

        worker.stop();
        worker.join().await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_is_idempotent() {
        let worker = PollingWorker::spawn(
            "test",
            Duration::from_secs(60),
            Duration::from_secs(60),
            || async { Ok(()) },
        );
        worker.stop();
        worker.stop();
        worker.join().await;
    }

    #[tokio::test(start_paused = true)]
    async fn a_failing_tick_keeps_the_loop_alive() {
        let (tick_tx, mut tick_rx) = tokio::sync::mpsc::unbounded_channel();
        let worker = PollingWorker::spawn(
            "test",
            Duration::from_secs(1),
            Duration::from_secs(1),
            move || {
                let tick_tx = tick_tx.clone();
                async move {
                    tick_tx.send(()).ok();
                    Err(anyhow::anyhow!("tick exploded"))
                }
            },
        );

        tick_rx.recv().await.expect("first tick should fire");
        tick_rx
            .recv()
            .await
            .expect("loop should survive the failed tick");
        worker.join().await;
    }

    #[tokio::test(start_paused = true)]
    async fn cleanup_runs_once_the_loop_exits() {
        let cleaned = Arc::new(AtomicBool::new(false));
        let cleanup_flag = Arc::clone(&cleaned);
        let worker = PollingWorker::spawn_with_cleanup(
            "test",
            Duration::from_secs(60),
            Duration::from_secs(60),
            || async { Ok(()) },
            move || cleanup_flag.store(true, Ordering::SeqCst),
        );

        worker.join().await;
        assert!(cleaned.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn name_is_reported() {
        let worker = PollingWorker::spawn(
            "territory",
            Duration::from_secs(60),
            Duration::from_secs(60),
            || async { Ok(()) },
        );
        assert_eq!(worker.name(), "territory");
        assert!(!worker.is_finished());
        worker.join().await;
    }
}
