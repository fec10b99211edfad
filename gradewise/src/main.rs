use gradewise::observability::{init_logging, LogSink};
use gradewise::prelude::*;
use gradewise::providers::EchoRewriter;
use gradewise::readability;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Init logging for quick manual runs
    init_logging();

    let text = "The committee deliberated extensively regarding the implementation of the proposal.";
    let before = readability::score(text);
    println!("grade {:.1}, ease {:.1}", before.grade_level, before.reading_ease);

    let rewriter: Arc<dyn Rewriter> = Arc::new(EchoRewriter);
    let engine = Engine::new(rewriter, EngineConfig::from_env()?).with_telemetry(Arc::new(LogSink));
    let out = engine.rewrite_for_grade_level(text, TargetLevel::MiddleSchool, Priority::Normal).await?;
    println!("{:?}: {}", out.method, out.rewritten_text);
    Ok(())
}
