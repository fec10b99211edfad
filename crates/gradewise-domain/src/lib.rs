pub mod entities {
    use serde::{Deserialize, Serialize};
    use std::fmt;
    use std::str::FromStr;
    use uuid::Uuid;

    use crate::errors::RewriteError;

    /// Reading grade band a rewrite is aimed at.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(rename_all = "kebab-case")]
    pub enum TargetLevel {
        Elementary,
        MiddleSchool,
        #[default]
        HighSchool,
        College,
        Graduate,
    }

    impl TargetLevel {
        pub const ALL: [TargetLevel; 5] = [
            TargetLevel::Elementary,
            TargetLevel::MiddleSchool,
            TargetLevel::HighSchool,
            TargetLevel::College,
            TargetLevel::Graduate,
        ];

        pub fn label(&self) -> &'static str {
            match self {
                TargetLevel::Elementary => "elementary",
                TargetLevel::MiddleSchool => "middle-school",
                TargetLevel::HighSchool => "high-school",
                TargetLevel::College => "college",
                TargetLevel::Graduate => "graduate",
            }
        }
    }

    impl fmt::Display for TargetLevel {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(self.label())
        }
    }

    impl FromStr for TargetLevel {
        type Err = RewriteError;

        fn from_str(s: &str) -> Result<Self, Self::Err> {
            let norm = s.trim().to_ascii_lowercase().replace(['_', ' '], "-");
            TargetLevel::ALL
                .into_iter()
                .find(|l| l.label() == norm)
                .ok_or_else(|| RewriteError::InvalidGradeLevel(s.to_string()))
        }
    }

    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
    #[serde(rename_all = "lowercase")]
    pub enum Priority {
        High,
        #[default]
        Normal,
        Low,
    }

    #[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
    pub struct ReadabilityMetrics {
        pub grade_level: f64,
        pub reading_ease: f64,
        pub average_words_per_sentence: f64,
        pub average_syllables_per_word: f64,
        pub sentence_count: usize,
        pub word_count: usize,
        pub syllable_count: usize,
    }

    /// How the returned text relates to the target profile.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(tag = "type", rename_all = "snake_case")]
    pub enum RewriteMethod {
        /// Final candidate landed inside both target ranges.
        Converged,
        /// Closest candidate by grade-level distance; target not reached.
        BestEffort,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct RewriteResult {
        pub id: Uuid,
        pub original_text: String,
        pub rewritten_text: String,
        pub target_level: TargetLevel,
        pub created_at_ms: i64,
        pub metrics_before: ReadabilityMetrics,
        pub metrics_after: ReadabilityMetrics,
        pub changed: bool,
        pub method: RewriteMethod,
        pub iterations: u32,
        pub provider: String,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct RewritePrompt {
        pub text: String,
        pub guidance: String,
        pub temperature: f64,
        pub target_level: TargetLevel,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Completion {
        pub text: String,
        pub model: Option<String>,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct TraceEvent {
        pub name: String,
        pub message: String,
        pub timestamp_ms: i64,
        pub attributes: serde_json::Value,
    }
}

pub mod ports {
    use crate::entities::{Completion, RewritePrompt, TraceEvent};
    use async_trait::async_trait;

    /// External text-rewriting capability, consumed as a black box.
    #[async_trait]
    pub trait Rewriter: Send + Sync {
        async fn rewrite(&self, prompt: &RewritePrompt) -> anyhow::Result<Completion>;
        fn name(&self) -> &'static str { "unknown" }
    }

    pub trait TelemetrySink: Send + Sync {
        fn record(&self, event: TraceEvent);
    }

    pub trait MetricsSink: Send + Sync {
        fn inc_counter(&self, name: &str, value: f64);
        fn observe_histogram(&self, name: &str, value: f64);
    }
}

pub mod errors {
    use thiserror::Error;

    #[derive(Debug, Clone, PartialEq, Eq, Error)]
    pub enum RewriteError {
        #[error("invalid grade level: {0}")]
        InvalidGradeLevel(String),
        #[error("rewrite failed: {0}")]
        RewriteFailed(String),
        #[error("rate limited, retry after {retry_after_ms} ms (queued: {queued})")]
        RateLimited { retry_after_ms: u64, queued: bool },
        #[error("retry budget exhausted after {attempts} attempts: {last_error}")]
        RetryExhausted { attempts: u32, last_error: String },
    }
}
