use serde::Serialize;

use crate::game::judgment::JudgeGrade;
use crate::game::timing_windows::{SCORE_GOOD, SCORE_PERFECT, score_delta};

/// Judgement tallies, combo and score for one round.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ScoreState {
    pub perfect: u32,
    pub good: u32,
    pub miss: u32,
    pub mines_hit: u32,
    pub combo: u32,
    pub max_combo: u32,
    pub score: i64,
    /// Set once the round ends; a frozen score ignores further judgements.
    pub finalized: bool,
}

impl ScoreState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one judgement. Returns false when the score is already frozen.
    pub fn apply_judgement(&mut self, grade: JudgeGrade) -> bool {
        if self.finalized {
            return false;
        }
        match grade {
            JudgeGrade::Perfect => self.perfect = self.perfect.saturating_add(1),
            JudgeGrade::Good => self.good = self.good.saturating_add(1),
            JudgeGrade::Miss => self.miss = self.miss.saturating_add(1),
            JudgeGrade::MineHit => self.mines_hit = self.mines_hit.saturating_add(1),
        }
        self.score += score_delta(grade);
        if grade.is_success() {
            self.combo = self.combo.saturating_add(1);
            self.max_combo = self.max_combo.max(self.combo);
        } else {
            self.combo = 0;
        }
        true
    }

    pub fn finalize(&mut self) {
        self.finalized = true;
    }

    pub const fn judged_count(&self) -> u32 {
        self.perfect + self.good + self.miss
    }

    /// Accuracy in 0.00..=100.00 against `total_notes` scorable notes (mines excluded).
    ///
    /// Truncates to two decimals so the displayed percent never rounds up past
    /// what was earned, same as the ITG percent display.
    pub fn accuracy_percent(&self, total_notes: u32) -> f64 {
        if total_notes == 0 {
            return 0.0;
        }
        let earned = self.perfect as f64 * SCORE_PERFECT as f64 + self.good as f64 * SCORE_GOOD as f64;
        let possible = total_notes as f64 * SCORE_PERFECT as f64;
        let percent = (earned / possible * 100.0).clamp(0.0, 100.0);
        // Small boost to avoid truncating 99.99999 down a step.
        ((percent + 0.000_001) * 100.0).floor() / 100.0
    }

    pub const fn is_full_combo(&self) -> bool {
        self.miss == 0 && self.mines_hit == 0 && self.judged_count() > 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum Grade {
    SPlus,
    S,
    A,
    B,
    C,
    D,
}

pub fn grade_for(percent: f64) -> Grade {
    if percent >= 100.0 { Grade::SPlus }
    else if percent >= 95.0 { Grade::S }
    else if percent >= 90.0 { Grade::A }
    else if percent >= 80.0 { Grade::B }
    else if percent >= 70.0 { Grade::C }
    else { Grade::D }
}
