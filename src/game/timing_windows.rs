// Shared hit window definitions so input judging and passive misses agree.

use crate::game::judgment::JudgeGrade;

// All windows are in milliseconds of song time, measured on |note_time - song_time|.
pub const WINDOW_PERFECT_MS: f64 = 90.0;
pub const WINDOW_GOOD_MS: f64 = 150.0;
// Outer bound for a note to be a press candidate at all. Also the passive miss cutoff.
pub const WINDOW_MISS_MS: f64 = 200.0;

// Notes of the SyncTap kind within this distance of a primary hit resolve with it.
pub const SYNC_RADIUS_MS: f64 = 50.0;

pub const SCORE_PERFECT: i64 = 100;
pub const SCORE_GOOD: i64 = 50;
pub const SCORE_MISS: i64 = -30;
pub const SCORE_MINE: i64 = -100;

/// Result of classifying a signed press offset against the tap windows.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum WindowClass {
    Perfect,
    Good,
    /// Inside the candidate window but outside the good band. A press here is a
    /// non-event; only the passive rule turns a note into a miss.
    Miss,
    OutOfRange,
}

impl WindowClass {
    #[inline(always)]
    pub const fn grade(self) -> Option<JudgeGrade> {
        match self {
            Self::Perfect => Some(JudgeGrade::Perfect),
            Self::Good => Some(JudgeGrade::Good),
            Self::Miss | Self::OutOfRange => None,
        }
    }
}

/// Classify a signed offset (ms). Sign does not matter; early and late share windows.
#[inline(always)]
pub fn classify(offset_ms: f64) -> WindowClass {
    let abs = offset_ms.abs();
    if abs <= WINDOW_PERFECT_MS {
        WindowClass::Perfect
    } else if abs <= WINDOW_GOOD_MS {
        WindowClass::Good
    } else if abs <= WINDOW_MISS_MS {
        WindowClass::Miss
    } else {
        WindowClass::OutOfRange
    }
}

#[inline(always)]
pub const fn score_delta(grade: JudgeGrade) -> i64 {
    match grade {
        JudgeGrade::Perfect => SCORE_PERFECT,
        JudgeGrade::Good => SCORE_GOOD,
        JudgeGrade::Miss => SCORE_MISS,
        JudgeGrade::MineHit => SCORE_MINE,
    }
}
