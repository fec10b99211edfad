//! Static target profiles, one per grade-level label.

use gradewise_domain::entities::{ReadabilityMetrics, TargetLevel};
use tracing::warn;

#[derive(Debug, Clone, PartialEq)]
pub struct TargetProfile {
    pub level: TargetLevel,
    pub grade_level_range: (f64, f64),
    /// Ordered `(low, high)`; higher ease means easier text.
    pub reading_ease_range: (f64, f64),
    pub guidance: &'static str,
    pub temperature: f64,
}

impl TargetProfile {
    pub fn grade_midpoint(&self) -> f64 {
        (self.grade_level_range.0 + self.grade_level_range.1) / 2.0
    }

    pub fn ease_midpoint(&self) -> f64 {
        (self.reading_ease_range.0 + self.reading_ease_range.1) / 2.0
    }

    /// Both scores inside their ranges, bounds inclusive.
    pub fn accepts(&self, m: &ReadabilityMetrics) -> bool {
        let (gmin, gmax) = self.grade_level_range;
        let (emin, emax) = self.reading_ease_range;
        (gmin..=gmax).contains(&m.grade_level) && (emin..=emax).contains(&m.reading_ease)
    }
}

static PROFILES: [TargetProfile; 5] = [
    TargetProfile {
        level: TargetLevel::Elementary,
        grade_level_range: (3.0, 5.0),
        reading_ease_range: (80.0, 90.0),
        guidance: "Write for a young reader aged eight to ten. Use short sentences of about ten words, \
                   everyday one- and two-syllable words, and explain any unfamiliar idea with a simple example.",
        temperature: 0.3,
    },
    TargetProfile {
        level: TargetLevel::MiddleSchool,
        grade_level_range: (6.0, 8.0),
        reading_ease_range: (70.0, 80.0),
        guidance: "Write for a reader aged eleven to thirteen. Keep sentences to around fifteen words, \
                   prefer familiar vocabulary, and introduce technical terms only with a short definition.",
        temperature: 0.4,
    },
    TargetProfile {
        level: TargetLevel::HighSchool,
        grade_level_range: (9.0, 12.0),
        reading_ease_range: (60.0, 70.0),
        guidance: "Write for a high-school reader. Use clear, varied sentences of moderate length \
                   and standard vocabulary; subject terms are fine when context makes them clear.",
        temperature: 0.5,
    },
    TargetProfile {
        level: TargetLevel::College,
        grade_level_range: (13.0, 16.0),
        reading_ease_range: (50.0, 60.0),
        guidance: "Write for an undergraduate reader. Use precise academic vocabulary, \
                   longer sentences with subordinate clauses, and a formal register.",
        temperature: 0.6,
    },
    TargetProfile {
        level: TargetLevel::Graduate,
        grade_level_range: (17.0, 20.0),
        reading_ease_range: (30.0, 50.0),
        guidance: "Write for a specialist reader. Use dense, technical prose with discipline-specific \
                   terminology and complex sentence structures; do not simplify concepts.",
        temperature: 0.7,
    },
];

pub fn all() -> &'static [TargetProfile] { &PROFILES }

pub fn resolve(level: TargetLevel) -> &'static TargetProfile {
    match level {
        TargetLevel::Elementary => &PROFILES[0],
        TargetLevel::MiddleSchool => &PROFILES[1],
        TargetLevel::HighSchool => &PROFILES[2],
        TargetLevel::College => &PROFILES[3],
        TargetLevel::Graduate => &PROFILES[4],
    }
}

/// Resolves a free-form label; unknown labels fall back to high school.
pub fn resolve_label(label: &str) -> &'static TargetProfile {
    match label.parse::<TargetLevel>() {
        Ok(level) => resolve(level),
        Err(e) => {
            warn!(target: "gradewise", label, error = %e, "unknown target level, using high-school");
            resolve(TargetLevel::HighSchool)
        }
    }
}
