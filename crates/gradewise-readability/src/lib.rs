//! Readability scoring: Flesch-Kincaid grade level and Flesch reading ease.

use gradewise_domain::entities::ReadabilityMetrics;
use serde::{Deserialize, Serialize};

pub mod syllables;

pub use syllables::count_syllables;

fn round1(x: f64) -> f64 { (x * 10.0).round() / 10.0 }

fn sentences(text: &str) -> Vec<&str> {
    text.split(['.', '!', '?'])
        .filter(|s| !s.trim().is_empty())
        .collect()
}

fn words(text: &str) -> Vec<&str> { text.split_whitespace().collect() }

pub fn grade_level(words_per_sentence: f64, syllables_per_word: f64) -> f64 {
    0.39 * words_per_sentence + 11.8 * syllables_per_word - 15.59
}

pub fn reading_ease(words_per_sentence: f64, syllables_per_word: f64) -> f64 {
    206.835 - 1.015 * words_per_sentence - 84.6 * syllables_per_word
}

/// Scores a block of text. Empty input yields all-zero metrics.
///
/// Scores are rounded to one decimal and never clamped: negative grade levels
/// and reading ease above 100 are legitimate for very simple text.
pub fn score(text: &str) -> ReadabilityMetrics {
    let w = words(text);
    if w.is_empty() {
        return ReadabilityMetrics::default();
    }
    let sentence_count = sentences(text).len();
    let syllable_count: usize = w.iter().map(|t| count_syllables(t)).sum();

    let aws = w.len() as f64 / sentence_count.max(1) as f64;
    let asw = syllable_count as f64 / w.len().max(1) as f64;

    ReadabilityMetrics {
        grade_level: round1(grade_level(aws, asw)),
        reading_ease: round1(reading_ease(aws, asw)),
        average_words_per_sentence: aws,
        average_syllables_per_word: asw,
        sentence_count,
        word_count: w.len(),
        syllable_count,
    }
}

/// Conventional interpretation bands for a reading-ease score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadingEaseBand {
    VeryEasy,
    Easy,
    FairlyEasy,
    Standard,
    FairlyDifficult,
    Difficult,
    VeryDifficult,
}

impl ReadingEaseBand {
    pub fn from_score(ease: f64) -> Self {
        match ease {
            e if e >= 90.0 => ReadingEaseBand::VeryEasy,
            e if e >= 80.0 => ReadingEaseBand::Easy,
            e if e >= 70.0 => ReadingEaseBand::FairlyEasy,
            e if e >= 60.0 => ReadingEaseBand::Standard,
            e if e >= 50.0 => ReadingEaseBand::FairlyDifficult,
            e if e >= 30.0 => ReadingEaseBand::Difficult,
            _ => ReadingEaseBand::VeryDifficult,
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            ReadingEaseBand::VeryEasy => "very easy",
            ReadingEaseBand::Easy => "easy",
            ReadingEaseBand::FairlyEasy => "fairly easy",
            ReadingEaseBand::Standard => "standard",
            ReadingEaseBand::FairlyDifficult => "fairly difficult",
            ReadingEaseBand::Difficult => "difficult",
            ReadingEaseBand::VeryDifficult => "very difficult",
        }
    }
}
