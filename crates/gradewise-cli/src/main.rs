use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use gradewise_core::{profiles, Engine, EngineConfig, RetryWorker};
use gradewise_domain::entities::{Priority, RewriteResult};
use gradewise_domain::errors::RewriteError;
use gradewise_observability::{init_logging, LogSink};
use gradewise_providers::ProviderFactory;
use gradewise_readability::ReadingEaseBand;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "gradewise-cli", version, author, about = "Readability scoring and grade-targeted rewriting")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Score a passage
    Score {
        text: String,
        /// Print the raw metrics as JSON
        #[arg(long)]
        json: bool,
    },
    /// List the target reading-level profiles
    Profiles,
    /// Rewrite a passage toward a reading level using the configured provider
    Rewrite {
        text: String,
        /// elementary, middle-school, high-school, college or graduate;
        /// anything else is treated as high-school
        #[arg(short, long, default_value = "high-school")]
        level: String,
        #[arg(short, long, value_enum, default_value_t = PriorityArg::Normal)]
        priority: PriorityArg,
        /// Engine config JSON; GRADEWISE_* variables override it
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Keep running the retry worker until a queued request settles
        #[arg(short, long)]
        wait: bool,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum PriorityArg {
    High,
    Normal,
    Low,
}

impl From<PriorityArg> for Priority {
    fn from(p: PriorityArg) -> Self {
        match p {
            PriorityArg::High => Priority::High,
            PriorityArg::Normal => Priority::Normal,
            PriorityArg::Low => Priority::Low,
        }
    }
}

fn load_config(path: Option<PathBuf>) -> Result<EngineConfig> {
    match path {
        Some(p) => {
            let raw = std::fs::read_to_string(&p).with_context(|| format!("reading {}", p.display()))?;
            EngineConfig::from_json_str(&raw)?.with_env_overrides()
        }
        None => EngineConfig::from_env(),
    }
}

/// Rewrites through the engine. With `wait`, a request queued for retry is
/// followed until the retry worker settles it, then served from the cache.
async fn run_rewrite(
    engine: Arc<Engine>,
    text: &str,
    label: &str,
    priority: Priority,
    wait: bool,
) -> Result<Arc<RewriteResult>, RewriteError> {
    let first = engine.rewrite_for_label(text, label, priority).await;
    if !wait || first.is_ok() || engine.pending_retries() == 0 {
        return first;
    }
    if let Err(e) = &first {
        tracing::warn!(target: "gradewise", error = %e, "request queued, waiting for retries");
    }
    let exhausted_before = engine.metrics().retries_exhausted;
    let worker = RetryWorker::from_config(engine.clone());
    while engine.pending_retries() > 0 {
        tokio::time::sleep(engine.config().retry_poll_interval()).await;
    }
    worker.shutdown().await;
    if engine.metrics().retries_exhausted > exhausted_before {
        return first;
    }
    engine.rewrite_for_label(text, label, priority).await
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Score { text, json } => {
            let m = gradewise_readability::score(&text);
            if json {
                println!("{}", serde_json::to_string_pretty(&m)?);
            } else {
                println!(
                    "grade {:>5.1} | ease {:>6.1} ({}) | {} words, {} sentences, {} syllables",
                    m.grade_level,
                    m.reading_ease,
                    ReadingEaseBand::from_score(m.reading_ease).describe(),
                    m.word_count,
                    m.sentence_count,
                    m.syllable_count
                );
            }
        }
        Commands::Profiles => {
            println!("{:<14} {:>9} {:>9} {:>5}", "level", "grade", "ease", "temp");
            for p in profiles::all() {
                println!(
                    "{:<14} {:>4}-{:<4} {:>4}-{:<4} {:>5.1}",
                    p.level.label(),
                    p.grade_level_range.0,
                    p.grade_level_range.1,
                    p.reading_ease_range.0,
                    p.reading_ease_range.1,
                    p.temperature
                );
            }
        }
        Commands::Rewrite { text, level, priority, config, wait } => {
            let config = load_config(config)?;
            let rewriter = ProviderFactory::from_env()?;
            tracing::info!(target: "gradewise", provider = rewriter.name(), "provider selected");
            let engine = Arc::new(Engine::new(rewriter, config).with_telemetry(Arc::new(LogSink)));

            match run_rewrite(engine, &text, &level, priority.into(), wait).await {
                Ok(result) => {
                    println!("{}", serde_json::to_string_pretty(result.as_ref())?);
                    println!(
                        "\ngrade {:.1} -> {:.1} | ease {:.1} -> {:.1} | {:?} after {} call(s)",
                        result.metrics_before.grade_level,
                        result.metrics_after.grade_level,
                        result.metrics_before.reading_ease,
                        result.metrics_after.reading_ease,
                        result.method,
                        result.iterations
                    );
                }
                Err(RewriteError::RateLimited { retry_after_ms, .. }) => {
                    eprintln!("Rate limited; try again in {} ms.", retry_after_ms);
                    std::process::exit(2);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use gradewise_domain::entities::TargetLevel;
    use gradewise_providers::ScriptedRewriter;

    const IN_RANGE: &str = "Our family went to the lake last summer and we swam in the water every morning before lunch.";
    const HARD: &str = "Researchers examined how regional climate patterns influence agricultural productivity across several neighboring provinces during the decade.";

    #[tokio::test(start_paused = true)]
    async fn unknown_level_label_falls_back_to_high_school() {
        let engine = Arc::new(Engine::new(Arc::new(ScriptedRewriter::repeating(IN_RANGE)), EngineConfig::default()));
        let out = run_rewrite(engine, HARD, "phd", Priority::Normal, false).await.unwrap();
        assert_eq!(out.target_level, TargetLevel::HighSchool);
    }

    #[tokio::test(start_paused = true)]
    async fn wait_follows_a_queued_request_to_completion() {
        let rewriter = Arc::new(ScriptedRewriter::new([Err("flaky".to_string())]).with_fallback(IN_RANGE));
        let engine = Arc::new(Engine::new(rewriter.clone(), EngineConfig::default()));
        let out = run_rewrite(engine.clone(), HARD, "middle-school", Priority::Normal, true).await.unwrap();
        assert_eq!(out.rewritten_text, IN_RANGE);
        assert_eq!(engine.pending_retries(), 0);
        assert_eq!(engine.metrics().cache_hits, 1);
        assert_eq!(rewriter.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn without_wait_the_failure_is_reported() {
        let rewriter = Arc::new(ScriptedRewriter::new([Err("flaky".to_string())]).with_fallback(IN_RANGE));
        let engine = Arc::new(Engine::new(rewriter, EngineConfig::default()));
        let err = run_rewrite(engine.clone(), HARD, "middle-school", Priority::Normal, false).await.unwrap_err();
        assert!(matches!(err, RewriteError::RewriteFailed(_)));
        assert_eq!(engine.pending_retries(), 1);
    }
}
