//! Background task that drains the retry queue on a fixed interval.

use crate::engine::{Engine, RetryReport};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

pub struct RetryWorker {
    shutdown_tx: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

impl RetryWorker {
    /// Must be called from within a tokio runtime.
    pub fn spawn(engine: Arc<Engine>, interval: Duration) -> Self {
        let (shutdown_tx, mut rx) = mpsc::channel::<()>(1);
        let handle = tokio::spawn(async move {
            info!(target: "gradewise.retry", interval_ms = interval.as_millis() as u64, "retry worker started");
            loop {
                tokio::select! {
                    _ = rx.recv() => {
                        info!(target: "gradewise.retry", "retry worker stopping");
                        break;
                    }
                    _ = tokio::time::sleep(interval) => {
                        let reports = engine.drain_ready().await;
                        if !reports.is_empty() {
                            let completed = reports.iter().filter(|r| matches!(r, RetryReport::Completed { .. })).count();
                            let exhausted = reports.iter().filter(|r| matches!(r, RetryReport::Exhausted { .. })).count();
                            debug!(
                                target: "gradewise.retry",
                                drained = reports.len(),
                                completed,
                                exhausted,
                                pending = engine.pending_retries(),
                                "retry pass"
                            );
                        }
                    }
                }
            }
        });
        Self { shutdown_tx, handle }
    }

    /// Polls at the engine's configured `retry_poll_interval`.
    pub fn from_config(engine: Arc<Engine>) -> Self {
        let interval = engine.config().retry_poll_interval();
        Self::spawn(engine, interval)
    }

    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        let _ = self.handle.await;
    }
}

/// Spawns a worker polling at `poll_interval`.
pub fn spawn_retry_worker(engine: Arc<Engine>, poll_interval: Duration) -> RetryWorker {
    RetryWorker::spawn(engine, poll_interval)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use gradewise_domain::entities::{Priority, TargetLevel};
    use gradewise_providers::ScriptedRewriter;

    #[tokio::test(start_paused = true)]
    async fn worker_completes_queued_request() {
        let passage = "Our family went to the lake last summer and we swam in the water every morning before lunch.";
        let rewriter = Arc::new(ScriptedRewriter::new([Err("flaky".to_string())]).with_fallback(passage));
        let engine = Arc::new(Engine::new(rewriter.clone(), EngineConfig::default()));

        assert!(engine
            .rewrite_for_grade_level("A long and winding passage.", TargetLevel::MiddleSchool, Priority::Normal)
            .await
            .is_err());
        assert_eq!(engine.pending_retries(), 1);

        let worker = spawn_retry_worker(engine.clone(), Duration::from_millis(250));
        tokio::time::sleep(Duration::from_secs(2)).await;
        worker.shutdown().await;

        assert_eq!(engine.pending_retries(), 0);
        assert_eq!(engine.metrics().retries_succeeded, 1);
        assert_eq!(rewriter.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn configured_poll_interval_drives_the_worker() {
        let passage = "Our family went to the lake last summer and we swam in the water every morning before lunch.";
        let rewriter = Arc::new(ScriptedRewriter::new([Err("flaky".to_string())]).with_fallback(passage));
        let config = EngineConfig { retry_poll_interval_ms: 10_000, ..Default::default() };
        let engine = Arc::new(Engine::new(rewriter.clone(), config));
        engine
            .rewrite_for_grade_level("A long and winding passage.", TargetLevel::MiddleSchool, Priority::Normal)
            .await
            .unwrap_err();

        let worker = RetryWorker::from_config(engine.clone());
        // due after 1s, but the first poll only happens at 10s
        tokio::time::sleep(Duration::from_secs(9)).await;
        assert_eq!(engine.pending_retries(), 1);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(engine.pending_retries(), 0);
        worker.shutdown().await;
        assert_eq!(rewriter.calls(), 2);
    }
}
