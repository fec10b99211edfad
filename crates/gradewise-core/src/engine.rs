use crate::cache::{cache_key, AdaptiveCache, CacheStats};
use crate::config::EngineConfig;
use crate::convergence::{self, now_ms, ConvergenceOutcome};
use crate::profiles;
use crate::rate_limit::RateLimiter;
use crate::retry::{RetryDisposition, RetryItem, RetryPolicy, RetryQueue};
use gradewise_domain::entities::{Priority, RewriteResult, TargetLevel, TraceEvent};
use gradewise_domain::errors::RewriteError;
use gradewise_domain::ports::{MetricsSink, Rewriter, TelemetrySink};
use gradewise_metrics::PerformanceMetrics;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

/// What happened to one due retry item during a drain pass.
#[derive(Debug, Clone)]
pub enum RetryReport {
    Completed { item_id: Uuid, result: Arc<RewriteResult> },
    Rescheduled { item_id: Uuid, retry_count: u32, retry_in: Duration },
    Exhausted { item_id: Uuid, error: RewriteError },
}

/// Items handed out by `RetryQueue::ready` that have no recorded outcome yet.
struct InFlight<'a> {
    queue: &'a Mutex<RetryQueue>,
    ids: Vec<Uuid>,
}

impl InFlight<'_> {
    fn settle(&mut self, id: Uuid) {
        self.ids.retain(|i| *i != id);
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if self.ids.is_empty() {
            return;
        }
        let mut queue = self.queue.lock();
        for id in self.ids.drain(..) {
            queue.release(id);
        }
        warn!(target: "gradewise", "retry drain interrupted, unsettled items released");
    }
}

/// Composition-root context owning every piece of shared rewrite state.
///
/// No lock is held across an `.await`: each mutation of the cache, the
/// rate-limit window, the retry queue or the counters is one synchronous step.
pub struct Engine {
    rewriter: Arc<dyn Rewriter>,
    config: EngineConfig,
    cache: Mutex<AdaptiveCache>,
    limiter: Mutex<RateLimiter>,
    retries: Mutex<RetryQueue>,
    perf: Mutex<PerformanceMetrics>,
    metrics: Option<Arc<dyn MetricsSink>>,
    telemetry: Option<Arc<dyn TelemetrySink>>,
}

impl Engine {
    pub fn new(rewriter: Arc<dyn Rewriter>, config: EngineConfig) -> Self {
        let policy = RetryPolicy {
            base_delay: Duration::from_millis(config.retry_base_delay_ms),
            max_delay: Duration::from_millis(config.retry_max_delay_ms),
            max_retries: config.max_retries,
        };
        Self {
            rewriter,
            cache: Mutex::new(AdaptiveCache::new(config.cache_capacity, config.cache_ttl())),
            limiter: Mutex::new(RateLimiter::new(config.max_requests_per_minute)),
            retries: Mutex::new(RetryQueue::new(policy)),
            perf: Mutex::new(PerformanceMetrics::default()),
            metrics: None,
            telemetry: None,
            config,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn with_telemetry(mut self, telemetry: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    pub fn config(&self) -> &EngineConfig { &self.config }

    fn count(&self, name: &str) {
        if let Some(m) = &self.metrics { m.inc_counter(name, 1.0); }
    }

    /// Rewrites `text` toward `level`.
    ///
    /// Cache hits return the stored result (same id) without consuming rate
    /// limit quota. A refusal from the rate limiter queues the request for a
    /// later retry and reports `RateLimited`; a first-call provider failure
    /// is queued as well and reported as `RewriteFailed`.
    pub async fn rewrite_for_grade_level(
        &self,
        text: &str,
        level: TargetLevel,
        priority: Priority,
    ) -> Result<Arc<RewriteResult>, RewriteError> {
        self.perf.lock().request_count += 1;
        self.count("gradewise.requests");
        info!(target: "gradewise", level = %level, ?priority, chars = text.len(), "rewrite requested");

        if text.trim().is_empty() {
            return Err(RewriteError::RewriteFailed("empty input text".into()));
        }

        let key = cache_key(text, level);
        let cached = self.cache.lock().get(&key);
        if let Some(hit) = cached {
            self.perf.lock().cache_hits += 1;
            self.count("gradewise.cache.hits");
            return Ok(hit);
        }
        self.perf.lock().cache_misses += 1;
        self.count("gradewise.cache.misses");

        let permitted = self.limiter.lock().try_acquire();
        if !permitted {
            let retry_after = self.limiter.lock().retry_after();
            let queued = self.retries.lock().enqueue(text, level, priority, Some("rate limited".into()));
            self.perf.lock().rate_limit_hits += 1;
            self.count("gradewise.rate_limited");
            warn!(target: "gradewise", level = %level, queued, retry_after_ms = retry_after.as_millis() as u64, "rate limited");
            return Err(RewriteError::RateLimited { retry_after_ms: retry_after.as_millis() as u64, queued });
        }

        match self.run(text, level, &key).await {
            Ok(result) => Ok(result),
            Err(e) => {
                self.retries.lock().enqueue(text, level, priority, Some(e.to_string()));
                Err(e)
            }
        }
    }

    /// Lenient entry point for free-form labels; unknown labels use the
    /// high-school profile.
    pub async fn rewrite_for_label(
        &self,
        text: &str,
        label: &str,
        priority: Priority,
    ) -> Result<Arc<RewriteResult>, RewriteError> {
        let level = profiles::resolve_label(label).level;
        self.rewrite_for_grade_level(text, level, priority).await
    }

    /// Convergence plus bookkeeping; the result is cached on success.
    async fn run(&self, text: &str, level: TargetLevel, key: &str) -> Result<Arc<RewriteResult>, RewriteError> {
        let start = Instant::now();
        let outcome = convergence::converge(self.rewriter.as_ref(), text, level, self.config.max_iterations).await;
        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;

        match outcome {
            Ok(ConvergenceOutcome { result, calls, tokens }) => {
                let result = Arc::new(result);
                self.cache.lock().put(key.to_string(), result.clone());
                {
                    let mut perf = self.perf.lock();
                    perf.record_response_time(elapsed_ms);
                    perf.record_tokens(tokens);
                }
                if let Some(m) = &self.metrics {
                    m.observe_histogram("gradewise.latency_ms", elapsed_ms);
                    m.observe_histogram("gradewise.tokens.total", tokens as f64);
                    m.observe_histogram("gradewise.iterations", calls as f64);
                }
                if let Some(sink) = &self.telemetry {
                    sink.record(TraceEvent {
                        name: "rewrite".into(),
                        message: format!("{} -> {}", result.metrics_before.grade_level, result.metrics_after.grade_level),
                        timestamp_ms: now_ms(),
                        attributes: serde_json::json!({
                            "level": level,
                            "method": result.method,
                            "iterations": calls,
                            "provider": result.provider,
                        }),
                    });
                }
                info!(
                    target: "gradewise",
                    level = %level,
                    calls,
                    method = ?result.method,
                    grade_before = result.metrics_before.grade_level,
                    grade_after = result.metrics_after.grade_level,
                    elapsed_ms,
                    "rewrite complete"
                );
                Ok(result)
            }
            Err(e) => {
                self.perf.lock().rewrite_failures += 1;
                self.count("gradewise.rewrite.failures");
                warn!(target: "gradewise", level = %level, error = %e, "rewrite failed");
                Err(e)
            }
        }
    }

    /// Re-dispatches every due retry item through the rate limiter and the
    /// convergence loop. Exhausted items only surface here and in metrics.
    ///
    /// Dropping the returned future part way through hands every unsettled
    /// item back to the queue at its existing due time.
    pub async fn drain_ready(&self) -> Vec<RetryReport> {
        let due = self.retries.lock().ready();
        let mut in_flight = InFlight { queue: &self.retries, ids: due.iter().map(|i| i.id).collect() };
        let mut reports = Vec::with_capacity(due.len());
        for item in due {
            let report = self.retry_one(&item).await;
            in_flight.settle(item.id);
            reports.push(report);
        }
        reports
    }

    async fn retry_one(&self, item: &RetryItem) -> RetryReport {
        let key = cache_key(&item.text, item.target_level);
        let cached = self.cache.lock().get(&key);
        let attempt = match cached {
            Some(hit) => Ok(hit),
            None => {
                let permitted = self.limiter.lock().try_acquire();
                if permitted {
                    self.run(&item.text, item.target_level, &key).await
                } else {
                    self.perf.lock().rate_limit_hits += 1;
                    self.count("gradewise.rate_limited");
                    Err(RewriteError::RateLimited { retry_after_ms: self.limiter.lock().retry_after().as_millis() as u64, queued: true })
                }
            }
        };

        match attempt {
            Ok(result) => {
                self.retries.lock().record_success(item.id);
                self.perf.lock().retries_succeeded += 1;
                self.count("gradewise.retry.succeeded");
                info!(target: "gradewise", item = %item.id, "retry succeeded");
                RetryReport::Completed { item_id: item.id, result }
            }
            Err(e) => {
                let disposition = self.retries.lock().record_failure(item.id, e.to_string());
                match disposition {
                    Some(RetryDisposition::Rescheduled { retry_count, next_retry_at }) => {
                        let retry_in = next_retry_at.saturating_duration_since(Instant::now());
                        info!(target: "gradewise", item = %item.id, retry_count, retry_in_ms = retry_in.as_millis() as u64, "retry rescheduled");
                        RetryReport::Rescheduled { item_id: item.id, retry_count, retry_in }
                    }
                    Some(RetryDisposition::Exhausted { attempts, last_error }) => {
                        self.perf.lock().retries_exhausted += 1;
                        self.count("gradewise.retry.exhausted");
                        warn!(target: "gradewise", item = %item.id, attempts, error = %last_error, "retry budget exhausted, dropping request");
                        RetryReport::Exhausted { item_id: item.id, error: RewriteError::RetryExhausted { attempts, last_error } }
                    }
                    None => RetryReport::Exhausted {
                        item_id: item.id,
                        error: RewriteError::RetryExhausted { attempts: item.retry_count, last_error: e.to_string() },
                    },
                }
            }
        }
    }

    pub fn metrics(&self) -> PerformanceMetrics { self.perf.lock().clone() }

    /// Operator reset of the process-lifetime counters.
    pub fn reset_metrics(&self) {
        *self.perf.lock() = PerformanceMetrics::default();
        info!(target: "gradewise", "performance metrics reset");
    }

    pub fn cache_stats(&self) -> CacheStats { self.cache.lock().stats() }
    pub fn pending_retries(&self) -> usize { self.retries.lock().len() }
    pub fn rate_limit_remaining(&self) -> usize { self.limiter.lock().remaining() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gradewise_domain::entities::{Completion, RewritePrompt};
    use gradewise_metrics::InMemoryMetrics;
    use gradewise_providers::ScriptedRewriter;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const HARD: &str = "Researchers examined how regional climate patterns influence agricultural productivity across several neighboring provinces during the decade.";
    const MIDDLE: &str = "Our family went to the lake last summer and we swam in the water every morning before lunch.";

    fn engine_with(rewriter: Arc<ScriptedRewriter>, config: EngineConfig) -> Engine {
        Engine::new(rewriter, config)
    }

    #[tokio::test(start_paused = true)]
    async fn second_call_is_served_from_cache() {
        let r = Arc::new(ScriptedRewriter::repeating(MIDDLE));
        let sink = Arc::new(InMemoryMetrics::default());
        let engine = engine_with(r.clone(), EngineConfig::default()).with_metrics(sink.clone());

        let first = engine.rewrite_for_grade_level(HARD, TargetLevel::MiddleSchool, Priority::Normal).await.unwrap();
        let before = engine.metrics();
        let second = engine.rewrite_for_grade_level(HARD, TargetLevel::MiddleSchool, Priority::Normal).await.unwrap();
        let after = engine.metrics();

        assert_eq!(first.id, second.id);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(after.cache_hits, before.cache_hits + 1);
        assert_eq!(after.request_count, 2);
        assert_eq!(after.cache_misses, 1);
        assert_eq!(r.calls(), 1);
        assert_eq!(engine.rate_limit_remaining(), 9);
        assert_eq!(sink.counter_value("gradewise.cache.hits"), 1.0);
        assert!(after.total_tokens_consumed > 0);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limited_request_is_queued_once() {
        let r = Arc::new(ScriptedRewriter::repeating(MIDDLE));
        let config = EngineConfig { max_requests_per_minute: 1, ..Default::default() };
        let engine = engine_with(r.clone(), config);

        engine.rewrite_for_grade_level("First passage here.", TargetLevel::MiddleSchool, Priority::Normal).await.unwrap();
        let err = engine.rewrite_for_grade_level(HARD, TargetLevel::MiddleSchool, Priority::High).await.unwrap_err();
        assert!(matches!(err, RewriteError::RateLimited { queued: true, .. }));
        let err = engine.rewrite_for_grade_level(HARD, TargetLevel::MiddleSchool, Priority::High).await.unwrap_err();
        assert!(matches!(err, RewriteError::RateLimited { queued: false, .. }));

        assert_eq!(engine.pending_retries(), 1);
        assert_eq!(engine.metrics().rate_limit_hits, 2);
        assert_eq!(r.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn drained_retry_completes_and_populates_cache() {
        let r = Arc::new(ScriptedRewriter::repeating(MIDDLE));
        let config = EngineConfig { max_requests_per_minute: 1, ..Default::default() };
        let engine = engine_with(r.clone(), config);

        engine.rewrite_for_grade_level("First passage here.", TargetLevel::MiddleSchool, Priority::Normal).await.unwrap();
        engine.rewrite_for_grade_level(HARD, TargetLevel::MiddleSchool, Priority::Normal).await.unwrap_err();

        // not yet due
        assert!(engine.drain_ready().await.is_empty());

        tokio::time::advance(Duration::from_secs(61)).await;
        let reports = engine.drain_ready().await;
        assert_eq!(reports.len(), 1);
        assert!(matches!(reports[0], RetryReport::Completed { .. }));
        assert_eq!(engine.pending_retries(), 0);
        assert_eq!(engine.metrics().retries_succeeded, 1);

        let hit = engine.rewrite_for_grade_level(HARD, TargetLevel::MiddleSchool, Priority::Normal).await.unwrap();
        assert_eq!(hit.rewritten_text, MIDDLE);
        assert_eq!(r.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn failing_retries_back_off_then_exhaust_silently() {
        let r = Arc::new(ScriptedRewriter::new(std::iter::repeat(Err("provider down".to_string())).take(8)));
        let engine = engine_with(r.clone(), EngineConfig::default());

        let err = engine.rewrite_for_grade_level(HARD, TargetLevel::College, Priority::Normal).await.unwrap_err();
        assert!(matches!(err, RewriteError::RewriteFailed(_)));
        assert_eq!(engine.pending_retries(), 1);

        let mut waits = Vec::new();
        let mut exhausted = 0;
        for step in [1_000u64, 2_000, 4_000] {
            tokio::time::advance(Duration::from_millis(step)).await;
            for report in engine.drain_ready().await {
                match report {
                    RetryReport::Rescheduled { retry_in, .. } => waits.push(retry_in.as_millis()),
                    RetryReport::Exhausted { error, .. } => {
                        assert!(matches!(error, RewriteError::RetryExhausted { attempts: 3, .. }));
                        exhausted += 1;
                    }
                    RetryReport::Completed { .. } => panic!("provider never succeeds"),
                }
            }
        }
        assert_eq!(waits, vec![2_000, 4_000]);
        assert_eq!(exhausted, 1);
        assert_eq!(engine.pending_retries(), 0);
        let m = engine.metrics();
        assert_eq!(m.retries_exhausted, 1);
        assert_eq!(m.rewrite_failures, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_label_uses_high_school_profile() {
        let r = Arc::new(ScriptedRewriter::repeating(MIDDLE));
        let engine = engine_with(r.clone(), EngineConfig::default());
        let out = engine.rewrite_for_label(HARD, "phd", Priority::Normal).await.unwrap();
        assert_eq!(out.target_level, TargetLevel::HighSchool);
    }

    #[tokio::test(start_paused = true)]
    async fn reset_clears_counters() {
        let r = Arc::new(ScriptedRewriter::repeating(MIDDLE));
        let engine = engine_with(r, EngineConfig::default());
        engine.rewrite_for_grade_level(HARD, TargetLevel::MiddleSchool, Priority::Low).await.unwrap();
        assert_eq!(engine.metrics().request_count, 1);
        engine.reset_metrics();
        assert_eq!(engine.metrics(), PerformanceMetrics::default());
        // cache survives a metrics reset
        assert_eq!(engine.cache_stats().entries, 1);
    }

    /// Fails once, then never answers, then succeeds.
    struct Stalling {
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl Rewriter for Stalling {
        async fn rewrite(&self, _prompt: &RewritePrompt) -> anyhow::Result<Completion> {
            match self.calls.fetch_add(1, Ordering::SeqCst) {
                0 => Err(anyhow::anyhow!("provider down")),
                1 => std::future::pending().await,
                _ => Ok(Completion { text: MIDDLE.into(), model: None }),
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_drain_leaves_item_retryable() {
        let r = Arc::new(Stalling { calls: AtomicUsize::new(0) });
        let engine = Engine::new(r.clone(), EngineConfig::default());
        engine.rewrite_for_grade_level(HARD, TargetLevel::MiddleSchool, Priority::Normal).await.unwrap_err();

        tokio::time::advance(Duration::from_millis(1_000)).await;
        let cancelled = tokio::time::timeout(Duration::from_secs(5), engine.drain_ready()).await;
        assert!(cancelled.is_err());
        assert_eq!(engine.pending_retries(), 1);

        let reports = engine.drain_ready().await;
        assert_eq!(reports.len(), 1);
        assert!(matches!(reports[0], RetryReport::Completed { .. }));
        assert_eq!(engine.pending_retries(), 0);
        assert_eq!(r.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn empty_input_fails_without_calling_provider() {
        let r = Arc::new(ScriptedRewriter::repeating(MIDDLE));
        let engine = engine_with(r.clone(), EngineConfig::default());
        let err = engine.rewrite_for_grade_level("  ", TargetLevel::College, Priority::Normal).await.unwrap_err();
        assert!(matches!(err, RewriteError::RewriteFailed(_)));
        assert_eq!(r.calls(), 0);
        assert_eq!(engine.pending_retries(), 0);
    }
}
