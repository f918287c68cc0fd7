use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::game::note::{MAX_MUTATION_COUNT, NoteId, NoteKind, NoteTemplate};
use crate::game::timeline::EventTemplate;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum BeatmapError {
    #[error("note {id} has negative time {time}ms")]
    NegativeNoteTime { id: NoteId, time: f64 },
    #[error("event {id} has negative time {time}ms")]
    NegativeEventTime { id: u64, time: f64 },
    #[error("event {id} has negative duration {duration}ms")]
    NegativeEventDuration { id: u64, duration: f64 },
    #[error("{what} {id} has a non-finite value")]
    NonFiniteTime { what: &'static str, id: u64 },
    #[error("hold {id} needs a positive holdDurationMs, got {duration:?}")]
    InvalidHoldDuration { id: NoteId, duration: Option<f64> },
    #[error("note {id} is a {kind:?} but carries hold fields")]
    HoldFieldsOnNonHold { id: NoteId, kind: NoteKind },
    #[error("note {id} has mutationCount {count}, expected 1..={}", MAX_MUTATION_COUNT)]
    MutationCountOutOfRange { id: NoteId, count: u32 },
    #[error("note {id} has a mutationCount but no mutationKind")]
    MutationCountWithoutKind { id: NoteId },
    #[error("note {id} has speedMultiplier {multiplier}, expected a positive number")]
    InvalidSpeedMultiplier { id: NoteId, multiplier: f64 },
    #[error("note id {id} is used more than once")]
    DuplicateNoteId { id: NoteId },
    #[error("beatmap duration {0}ms is invalid")]
    InvalidDuration(f64),
}

/// Everything a round needs from the authoring side. Read-only once a round starts.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Beatmap {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub bpm: f64,
    #[serde(default)]
    pub offset_ms: f64,
    pub duration_ms: f64,
    #[serde(default)]
    pub notes: Vec<NoteTemplate>,
    #[serde(default)]
    pub events: Vec<EventTemplate>,
}

impl Beatmap {
    pub fn new(duration_ms: f64, notes: Vec<NoteTemplate>, events: Vec<EventTemplate>) -> Self {
        Self {
            duration_ms,
            notes,
            events,
            ..Self::default()
        }
    }

    /// Reject authoring mistakes before a round starts. Nothing is coerced.
    pub fn validate(&self) -> Result<(), BeatmapError> {
        if !self.duration_ms.is_finite() || self.duration_ms < 0.0 {
            return Err(BeatmapError::InvalidDuration(self.duration_ms));
        }
        let mut seen: FxHashSet<NoteId> = FxHashSet::default();
        for note in &self.notes {
            validate_note(note)?;
            if !seen.insert(note.id) {
                return Err(BeatmapError::DuplicateNoteId { id: note.id });
            }
        }
        for event in &self.events {
            validate_event(event)?;
        }
        Ok(())
    }

    /// Notes that can produce a perfect/good judgement at round start. Mines only cost points.
    pub fn total_scorable_notes(&self) -> u32 {
        let n = self.notes.iter().filter(|n| n.kind != NoteKind::Mine).count();
        u32::try_from(n).unwrap_or(u32::MAX)
    }
}

fn validate_note(note: &NoteTemplate) -> Result<(), BeatmapError> {
    let id = note.id;
    if !note.time.is_finite() {
        return Err(BeatmapError::NonFiniteTime { what: "note", id });
    }
    if note.time < 0.0 {
        return Err(BeatmapError::NegativeNoteTime { id, time: note.time });
    }
    if note.kind == NoteKind::Hold {
        match note.hold_duration_ms {
            Some(d) if d.is_finite() && d > 0.0 => {}
            duration => return Err(BeatmapError::InvalidHoldDuration { id, duration }),
        }
    } else if note.hold_duration_ms.is_some() || note.require_release.is_some() {
        return Err(BeatmapError::HoldFieldsOnNonHold { id, kind: note.kind });
    }
    if let Some(multiplier) = note.speed_multiplier
        && !(multiplier.is_finite() && multiplier > 0.0)
    {
        return Err(BeatmapError::InvalidSpeedMultiplier { id, multiplier });
    }
    match (note.mutation_kind, note.mutation_count) {
        (None, Some(_)) => Err(BeatmapError::MutationCountWithoutKind { id }),
        (Some(_), Some(count)) if !(1..=MAX_MUTATION_COUNT).contains(&count) => {
            Err(BeatmapError::MutationCountOutOfRange { id, count })
        }
        _ => Ok(()),
    }
}

fn validate_event(event: &EventTemplate) -> Result<(), BeatmapError> {
    let id = event.id;
    if !(event.time.is_finite() && event.duration.is_finite() && event.target_value.is_finite()) {
        return Err(BeatmapError::NonFiniteTime { what: "event", id });
    }
    if event.time < 0.0 {
        return Err(BeatmapError::NegativeEventTime { id, time: event.time });
    }
    if event.duration < 0.0 {
        return Err(BeatmapError::NegativeEventDuration {
            id,
            duration: event.duration,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{Beatmap, BeatmapError};
    use crate::game::easing::Easing;
    use crate::game::note::{NoteKind, NoteTemplate};
    use crate::game::timeline::{EventEffect, EventTemplate};

    fn with_notes(notes: Vec<NoteTemplate>) -> Beatmap {
        Beatmap::new(10_000.0, notes, Vec::new())
    }

    #[test]
    fn valid_map_passes() {
        let map = Beatmap::new(
            10_000.0,
            vec![
                NoteTemplate::new(1, 0.0, NoteKind::Tap, 0).with_speed(1.5),
                NoteTemplate::hold(2, 1000.0, 1, 500.0, false),
                NoteTemplate::new(3, 2000.0, NoteKind::Mine, 2),
                NoteTemplate::new(4, 3000.0, NoteKind::SyncTap, 3).with_mutation(NoteKind::Tap, 16),
            ],
            vec![EventTemplate::new(1, 0.0, 0.0, 1.0, Easing::Linear, EventEffect::NotesSpeed)],
        );
        assert_eq!(map.validate(), Ok(()));
        assert_eq!(map.total_scorable_notes(), 3);
    }

    #[test]
    fn rejects_bad_notes() {
        let cases = [
            (
                NoteTemplate::new(1, -1.0, NoteKind::Tap, 0),
                BeatmapError::NegativeNoteTime { id: 1, time: -1.0 },
            ),
            (
                NoteTemplate::hold(2, 0.0, 0, 0.0, true),
                BeatmapError::InvalidHoldDuration { id: 2, duration: Some(0.0) },
            ),
            (
                NoteTemplate::new(3, 0.0, NoteKind::Hold, 0),
                BeatmapError::InvalidHoldDuration { id: 3, duration: None },
            ),
            (
                NoteTemplate::new(4, 0.0, NoteKind::Tap, 0).with_mutation(NoteKind::Tap, 0),
                BeatmapError::MutationCountOutOfRange { id: 4, count: 0 },
            ),
            (
                NoteTemplate::new(5, 0.0, NoteKind::Tap, 0).with_mutation(NoteKind::Mine, 17),
                BeatmapError::MutationCountOutOfRange { id: 5, count: 17 },
            ),
            (
                NoteTemplate::new(6, 0.0, NoteKind::Tap, 0).with_speed(0.0),
                BeatmapError::InvalidSpeedMultiplier { id: 6, multiplier: 0.0 },
            ),
        ];
        for (note, expected) in cases {
            assert_eq!(with_notes(vec![note]).validate(), Err(expected));
        }
    }

    #[test]
    fn rejects_inconsistent_fields() {
        let mut tap = NoteTemplate::new(1, 0.0, NoteKind::Tap, 0);
        tap.require_release = Some(false);
        assert_eq!(
            with_notes(vec![tap]).validate(),
            Err(BeatmapError::HoldFieldsOnNonHold { id: 1, kind: NoteKind::Tap })
        );

        let mut orphan = NoteTemplate::new(2, 0.0, NoteKind::Tap, 0);
        orphan.mutation_count = Some(2);
        assert_eq!(
            with_notes(vec![orphan]).validate(),
            Err(BeatmapError::MutationCountWithoutKind { id: 2 })
        );

        let dup = vec![
            NoteTemplate::new(9, 0.0, NoteKind::Tap, 0),
            NoteTemplate::new(9, 100.0, NoteKind::Tap, 1),
        ];
        assert_eq!(with_notes(dup).validate(), Err(BeatmapError::DuplicateNoteId { id: 9 }));
    }

    #[test]
    fn rejects_bad_events_and_duration() {
        let ev = |time, duration| {
            Beatmap::new(
                1000.0,
                Vec::new(),
                vec![EventTemplate::new(7, time, duration, 1.0, Easing::Linear, EventEffect::CameraZoom)],
            )
        };
        assert_eq!(
            ev(-5.0, 10.0).validate(),
            Err(BeatmapError::NegativeEventTime { id: 7, time: -5.0 })
        );
        assert_eq!(
            ev(5.0, -10.0).validate(),
            Err(BeatmapError::NegativeEventDuration { id: 7, duration: -10.0 })
        );
        assert_eq!(
            ev(f64::NAN, 10.0).validate(),
            Err(BeatmapError::NonFiniteTime { what: "event", id: 7 })
        );
        assert_eq!(
            Beatmap::new(f64::INFINITY, Vec::new(), Vec::new()).validate(),
            Err(BeatmapError::InvalidDuration(f64::INFINITY))
        );
    }

    #[test]
    fn parses_camel_case_json() {
        let json = r#"{
            "title": "demo", "bpm": 120, "offsetMs": 0, "durationMs": 4000,
            "notes": [
                {"id": 1, "time": 1000, "kind": "Tap", "lane": 0, "mutationKind": "Tap", "mutationCount": 2},
                {"id": 2, "time": 2000, "kind": "Hold", "lane": 1, "holdDurationMs": 500, "requireRelease": false}
            ],
            "events": []
        }"#;
        let map: Beatmap = serde_json::from_str(json).expect("beatmap should parse");
        assert_eq!(map.validate(), Ok(()));
        assert_eq!(map.notes[0].mutation_count, Some(2));
        assert_eq!(map.notes[1].hold_duration_ms, Some(500.0));
        assert!(!map.notes[1].requires_release());
    }
}
