//! Readability-targeted rewrite engine: scoring-driven convergence over a
//! pluggable rewriter, with caching, rate limiting, retries and debounce.

pub mod cache;
pub mod config;
pub mod convergence;
pub mod debounce;
pub mod engine;
pub mod profiles;
pub mod rate_limit;
pub mod retry;
pub mod worker;

pub use cache::{AdaptiveCache, CacheStats};
pub use config::EngineConfig;
pub use convergence::{converge, ConvergenceOutcome};
pub use debounce::{DebounceRequest, DebounceScheduler, DebouncedOutcome};
pub use engine::{Engine, RetryReport};
pub use profiles::TargetProfile;
pub use rate_limit::RateLimiter;
pub use retry::{RetryPolicy, RetryQueue};
pub use worker::{spawn_retry_worker, RetryWorker};
