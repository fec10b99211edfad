//! Gradewise aggregator crate.
//! Re-exports the workspace crates behind one dependency.

pub mod prelude {
    pub use gradewise_core::{
        DebounceRequest, DebounceScheduler, DebouncedOutcome, Engine, EngineConfig, RetryReport, RetryWorker,
    };
    pub use gradewise_domain::entities::*;
    pub use gradewise_domain::errors::RewriteError;
    pub use gradewise_domain::ports::*;
}

pub mod readability {
    pub use gradewise_readability::{grade_level, reading_ease, score, ReadingEaseBand};
}

pub mod profiles {
    pub use gradewise_core::profiles::{all, resolve, resolve_label};
    pub use gradewise_core::TargetProfile;
}

pub mod metrics {
    pub use gradewise_metrics::{token_count, InMemoryMetrics, PerformanceMetrics};
}

/// Common re-exports for convenience
pub mod providers {
    pub use gradewise_providers::{EchoRewriter, ProviderFactory, ScriptedRewriter};
}

pub mod observability {
    pub use gradewise_observability::{init_logging, LogSink};
}
