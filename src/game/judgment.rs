use serde::Serialize;

use crate::game::note::{NoteId, NoteKind};

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum JudgeGrade {
    Perfect,
    Good,
    Miss,
    MineHit,
}

impl JudgeGrade {
    /// Grades that keep the combo alive.
    #[inline(always)]
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Perfect | Self::Good)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub enum Outcome {
    Judged(JudgeGrade),
    /// A hold was grabbed inside the good band. Scoring waits for its end.
    HoldStarted(JudgeGrade),
    /// A mine scrolled past untouched.
    Dodged,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
pub enum JudgeCause {
    Press,
    /// Resolved together with a primary press inside the sync radius.
    Sync,
    Release,
    HoldComplete,
    /// Resolved by the clock without input.
    Passive,
}

/// What happened to a note, in the order the round produced it.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct JudgementEvent {
    pub note_id: NoteId,
    pub kind: NoteKind,
    pub outcome: Outcome,
    pub cause: JudgeCause,
    /// Signed song-time error (song_time - target_time) when the judgement came from input.
    pub offset_ms: Option<f64>,
    pub song_time_ms: f64,
}

impl JudgementEvent {
    #[inline(always)]
    pub const fn grade(&self) -> Option<JudgeGrade> {
        match self.outcome {
            Outcome::Judged(grade) => Some(grade),
            Outcome::HoldStarted(_) | Outcome::Dodged => None,
        }
    }
}
