//! Iterative rewrite toward a target profile.
//!
//! Each iteration asks the rewriter for a candidate, scores it, and keeps the
//! candidate whose grade level sits closest to the profile midpoint. The loop
//! stops early once a candidate lands inside both target ranges.

use crate::profiles::{self, TargetProfile};
use gradewise_domain::entities::{
    ReadabilityMetrics, RewriteMethod, RewritePrompt, RewriteResult, TargetLevel,
};
use gradewise_domain::errors::RewriteError;
use gradewise_domain::ports::Rewriter;
use gradewise_metrics::token_count;
use tracing::{debug, warn};
use uuid::Uuid;

pub const MAX_ITERATIONS: u32 = 3;
const GRADE_TOLERANCE: f64 = 2.0;
const EASE_TOLERANCE: f64 = 10.0;
const MIN_TEMPERATURE: f64 = 0.1;

#[derive(Debug, Clone)]
pub struct ConvergenceOutcome {
    pub result: RewriteResult,
    /// External calls made, including a failed final one.
    pub calls: u32,
    pub tokens: u64,
}

pub(crate) fn now_ms() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as i64
}

pub fn temperature_for(profile: &TargetProfile, iteration: u32) -> f64 {
    let t = profile.temperature - 0.1 * iteration.saturating_sub(1) as f64;
    t.max(MIN_TEMPERATURE)
}

/// Guidance for iterations after the first, built from how far the previous
/// candidate missed the range midpoints.
pub fn corrective_guidance(profile: &TargetProfile, previous: &ReadabilityMetrics) -> String {
    let grade_delta = previous.grade_level - profile.grade_midpoint();
    let ease_delta = previous.reading_ease - profile.ease_midpoint();
    let mut notes: Vec<String> = Vec::new();

    if grade_delta > GRADE_TOLERANCE {
        notes.push(format!(
            "The last version reads about {:.1} grades too high: simplify vocabulary and shorten sentences.",
            grade_delta
        ));
    } else if grade_delta < -GRADE_TOLERANCE {
        notes.push(format!(
            "The last version reads about {:.1} grades too low: use more sophisticated vocabulary and combine short sentences.",
            -grade_delta
        ));
    }
    if ease_delta < -EASE_TOLERANCE {
        notes.push("It is still hard to read: prefer common one- and two-syllable words and one idea per sentence.".into());
    } else if ease_delta > EASE_TOLERANCE {
        notes.push("It reads too easily: allow longer sentences and more precise, multi-syllable terms.".into());
    }
    if notes.is_empty() {
        notes.push(format!(
            "The last version is close; fine-tune it toward grade {:.1} without changing its meaning.",
            profile.grade_midpoint()
        ));
    }
    format!("{} {}", profile.guidance, notes.join(" "))
}

/// Removes one layer of matching wrapping quotes.
pub fn strip_wrapping_quotes(s: &str) -> &str {
    let t = s.trim();
    for (open, close) in [('"', '"'), ('\'', '\''), ('\u{201c}', '\u{201d}')] {
        if t.chars().count() >= 2 && t.starts_with(open) && t.ends_with(close) {
            return t[open.len_utf8()..t.len() - close.len_utf8()].trim();
        }
    }
    t
}

struct Candidate {
    text: String,
    metrics: ReadabilityMetrics,
    distance: f64,
    accepted: bool,
}

pub async fn converge(
    rewriter: &dyn Rewriter,
    text: &str,
    level: TargetLevel,
    max_iterations: u32,
) -> Result<ConvergenceOutcome, RewriteError> {
    let profile = profiles::resolve(level);
    let metrics_before = gradewise_readability::score(text);
    let mut current = text.to_string();
    let mut previous: Option<ReadabilityMetrics> = None;
    let mut best: Option<Candidate> = None;
    let mut calls = 0u32;
    let mut tokens = 0u64;

    for iteration in 1..=max_iterations.max(1) {
        let guidance = match &previous {
            None => profile.guidance.to_string(),
            Some(m) => corrective_guidance(profile, m),
        };
        let prompt = RewritePrompt {
            text: current.clone(),
            guidance,
            temperature: temperature_for(profile, iteration),
            target_level: level,
        };

        calls += 1;
        let reply = match rewriter.rewrite(&prompt).await {
            Ok(c) => c.text,
            Err(e) if iteration == 1 => {
                return Err(RewriteError::RewriteFailed(format!("{}: {}", rewriter.name(), e)));
            }
            Err(e) => {
                warn!(target: "gradewise", iteration, error = %e, "rewrite call failed, keeping best candidate");
                break;
            }
        };
        tokens += (token_count(&prompt.text) + token_count(&prompt.guidance) + token_count(&reply)) as u64;

        if reply.trim().is_empty() {
            if iteration == 1 {
                return Err(RewriteError::RewriteFailed(format!("{}: empty rewrite", rewriter.name())));
            }
            warn!(target: "gradewise", iteration, "empty rewrite, keeping best candidate");
            break;
        }

        let candidate = strip_wrapping_quotes(&reply).to_string();
        let metrics = gradewise_readability::score(&candidate);
        let distance = (metrics.grade_level - profile.grade_midpoint()).abs();
        let accepted = profile.accepts(&metrics);
        debug!(
            target: "gradewise",
            iteration,
            grade = metrics.grade_level,
            ease = metrics.reading_ease,
            distance,
            accepted,
            "scored candidate"
        );

        if accepted {
            best = Some(Candidate { text: candidate, metrics, distance, accepted });
            break;
        }
        if best.as_ref().map_or(true, |b| distance < b.distance) {
            best = Some(Candidate { text: candidate.clone(), metrics, distance, accepted });
        }
        previous = Some(metrics);
        current = candidate;
    }

    let best = best.ok_or_else(|| RewriteError::RewriteFailed("no candidate produced".into()))?;
    let result = RewriteResult {
        id: Uuid::new_v4(),
        original_text: text.to_string(),
        changed: best.text.trim() != text.trim(),
        rewritten_text: best.text,
        target_level: level,
        created_at_ms: now_ms(),
        metrics_before,
        metrics_after: best.metrics,
        method: if best.accepted { RewriteMethod::Converged } else { RewriteMethod::BestEffort },
        iterations: calls,
        provider: rewriter.name().to_string(),
    };
    Ok(ConvergenceOutcome { result, calls, tokens })
}
