use std::str::FromStr;

use log::trace;
use rustc_hash::FxHashSet;
use smallvec::SmallVec;

use crate::game::judgment::{JudgeCause, JudgeGrade, JudgementEvent};
use crate::game::note::{NUM_LANES, NoteKind, Playfield, RuntimeNote};
use crate::game::stage_stats::ScoreState;
use crate::game::timing_windows::{self, SYNC_RADIUS_MS, WINDOW_MISS_MS};

/// Caller-assigned identity of a physical key, button or pointer.
pub type InputId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyMode {
    /// Any input may hit any lane.
    #[default]
    Unrestricted,
    /// Inputs must resolve to a lane through the key binding table.
    Bound,
}

impl KeyMode {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Unrestricted => "Unrestricted",
            Self::Bound => "Bound",
        }
    }
}

impl FromStr for KeyMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "unrestricted" | "free" => Ok(Self::Unrestricted),
            "bound" | "restricted" => Ok(Self::Bound),
            _ => Err(()),
        }
    }
}

/// Four key identifiers, one per lane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyBindings(pub [String; NUM_LANES as usize]);

impl Default for KeyBindings {
    fn default() -> Self {
        Self(["KeyD", "KeyF", "KeyJ", "KeyK"].map(str::to_string))
    }
}

impl KeyBindings {
    pub fn lane_for_key(&self, key: &str) -> Option<u8> {
        self.0
            .iter()
            .position(|k| k.eq_ignore_ascii_case(key))
            .map(|lane| lane as u8)
    }

    /// Parse "KeyD,KeyF,KeyJ,KeyK". Exactly four non-empty entries.
    pub fn parse(s: &str) -> Option<Self> {
        let keys: SmallVec<[&str; 4]> = s.split(',').map(str::trim).collect();
        if keys.len() != NUM_LANES as usize || keys.iter().any(|k| k.is_empty()) {
            return None;
        }
        Some(Self([0, 1, 2, 3].map(|i| keys[i].to_string())))
    }

    pub fn to_ini_value(&self) -> String {
        self.0.join(",")
    }
}

/// Held inputs plus lane targeting. Turns discrete press/release calls into
/// note judgements.
#[derive(Debug, Clone, Default)]
pub struct InputResolver {
    held: FxHashSet<InputId>,
    pub mode: KeyMode,
    pub bindings: KeyBindings,
}

impl InputResolver {
    pub fn new(mode: KeyMode, bindings: KeyBindings) -> Self {
        Self {
            held: FxHashSet::default(),
            mode,
            bindings,
        }
    }

    #[inline(always)]
    pub fn is_held(&self, input: InputId) -> bool {
        self.held.contains(&input)
    }

    #[inline(always)]
    pub fn any_held(&self) -> bool {
        !self.held.is_empty()
    }

    #[inline(always)]
    pub fn held_count(&self) -> usize {
        self.held.len()
    }

    pub fn clear(&mut self) {
        self.held.clear();
    }

    /// Drop `input` from the held set without judging anything.
    pub fn forget(&mut self, input: InputId) -> bool {
        self.held.remove(&input)
    }

    /// Lane filter for a press. `Some(None)` means any lane, `None` means the
    /// input does not map to a lane and must be ignored.
    pub fn resolve_lane(&self, lane_hint: Option<u8>, key_hint: Option<&str>) -> Option<Option<u8>> {
        match self.mode {
            KeyMode::Unrestricted => Some(None),
            KeyMode::Bound => match key_hint {
                Some(key) => self.bindings.lane_for_key(key).map(Some),
                None => lane_hint.filter(|&l| l < NUM_LANES).map(Some),
            },
        }
    }

    /// Handle a press at `song_time_ms`. Every judgement produced (including
    /// sync-resolved partners) is appended to `events`; the primary one is returned.
    #[allow(clippy::too_many_arguments)]
    pub fn press(
        &mut self,
        input: InputId,
        lane_hint: Option<u8>,
        key_hint: Option<&str>,
        song_time_ms: f64,
        playfield: &mut Playfield,
        score: &mut ScoreState,
        events: &mut Vec<JudgementEvent>,
    ) -> Option<JudgementEvent> {
        if self.held.contains(&input) {
            trace!("press ignored: input {input} already held");
            return None;
        }
        let Some(lane) = self.resolve_lane(lane_hint, key_hint) else {
            trace!("press ignored: input {input} key {key_hint:?} is not bound");
            return None;
        };
        self.held.insert(input);

        let start = playfield.window_start(song_time_ms);
        let (index, offset_ms) = select_candidate(playfield.notes(), start, song_time_ms, lane)?;
        let note = playfield.note(index);
        let (kind, note_time) = (note.kind(), note.time());

        let first_event = events.len();
        if kind == NoteKind::Mine {
            playfield.hit_mine(index, offset_ms, song_time_ms, score, events);
            return events.get(first_event).cloned();
        }

        let grade = timing_windows::classify(offset_ms).grade()?;
        let accepted = if kind == NoteKind::Hold {
            playfield.start_hold(index, grade, offset_ms, song_time_ms, events)
        } else {
            playfield.resolve_hit(
                index,
                grade,
                JudgeCause::Press,
                Some(offset_ms),
                song_time_ms,
                score,
                events,
            )
        };
        if !accepted {
            return None;
        }
        let primary = events.get(first_event).cloned();
        resolve_sync_partners(playfield, index, note_time, song_time_ms, score, events);
        primary
    }

    /// Handle a release. Only the release of the last held input judges holds.
    pub fn release(
        &mut self,
        input: InputId,
        song_time_ms: f64,
        playfield: &mut Playfield,
        score: &mut ScoreState,
        events: &mut Vec<JudgementEvent>,
    ) -> Vec<JudgementEvent> {
        if !self.held.remove(&input) {
            return Vec::new();
        }
        if self.any_held() || !playfield.has_active_holds() {
            return Vec::new();
        }
        let first_event = events.len();
        playfield.release_holds(song_time_ms, score, events);
        events[first_event..].to_vec()
    }
}

/// Best pending note for a press: non-mines before mines, then smallest
/// absolute offset. Returns the note index and signed offset (song - note).
pub fn select_candidate(
    notes: &[RuntimeNote],
    start: usize,
    song_time_ms: f64,
    lane: Option<u8>,
) -> Option<(usize, f64)> {
    let mut candidates: SmallVec<[(usize, f64, bool); 8]> = SmallVec::new();
    for (i, note) in notes.iter().enumerate().skip(start) {
        let offset = song_time_ms - note.time();
        // Sorted by time: once a note is too far ahead, the rest are too.
        if -offset > WINDOW_MISS_MS {
            break;
        }
        if !note.is_pending() || offset.abs() > WINDOW_MISS_MS {
            continue;
        }
        if lane.is_some_and(|l| note.template.lane != l) {
            continue;
        }
        candidates.push((i, offset, note.kind() == NoteKind::Mine));
    }
    candidates.sort_by(|a, b| a.2.cmp(&b.2).then(a.1.abs().total_cmp(&b.1.abs())));
    candidates.first().map(|&(i, offset, _)| (i, offset))
}

fn resolve_sync_partners(
    playfield: &mut Playfield,
    primary: usize,
    primary_time: f64,
    song_time_ms: f64,
    score: &mut ScoreState,
    events: &mut Vec<JudgementEvent>,
) {
    let lo = primary_time - SYNC_RADIUS_MS;
    let hi = primary_time + SYNC_RADIUS_MS;
    let notes = playfield.notes();
    let start = notes.partition_point(|n| n.time() < lo);
    let partners: SmallVec<[usize; 4]> = notes[start..]
        .iter()
        .enumerate()
        .take_while(|(_, n)| n.time() <= hi)
        .filter(|(_, n)| n.is_pending() && n.kind() == NoteKind::SyncTap)
        .map(|(i, _)| start + i)
        .filter(|&i| i != primary)
        .collect();
    for index in partners {
        playfield.resolve_hit(
            index,
            JudgeGrade::Perfect,
            JudgeCause::Sync,
            None,
            song_time_ms,
            score,
            events,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::{InputResolver, KeyBindings, KeyMode, select_candidate};
    use crate::game::judgment::{JudgeCause, JudgeGrade, Outcome};
    use crate::game::note::{NoteKind, NoteState, NoteTemplate, Playfield, RuntimeNote};
    use crate::game::stage_stats::ScoreState;

    fn runtime(templates: &[NoteTemplate]) -> Vec<RuntimeNote> {
        Playfield::new(templates).notes().to_vec()
    }

    #[test]
    fn non_mine_beats_mine_even_when_farther() {
        let notes = runtime(&[
            NoteTemplate::new(1, 5000.0, NoteKind::Mine, 0),
            NoteTemplate::new(2, 5100.0, NoteKind::Tap, 1),
        ]);
        assert_eq!(select_candidate(&notes, 0, 5000.0, None), Some((1, -100.0)));
    }

    #[test]
    fn closest_note_wins_and_lane_filters() {
        let notes = runtime(&[
            NoteTemplate::new(1, 900.0, NoteKind::Tap, 0),
            NoteTemplate::new(2, 1050.0, NoteKind::Tap, 1),
            NoteTemplate::new(3, 1500.0, NoteKind::Tap, 0),
        ]);
        assert_eq!(select_candidate(&notes, 0, 1000.0, None), Some((1, -50.0)));
        assert_eq!(select_candidate(&notes, 0, 1000.0, Some(0)), Some((0, 100.0)));
        assert_eq!(select_candidate(&notes, 0, 1000.0, Some(3)), None);
        assert_eq!(select_candidate(&notes, 0, 1260.0, None), None, "nothing within 200ms");
    }

    #[test]
    fn bindings_parse_and_map() {
        let b = KeyBindings::parse("KeyA, KeyS ,KeyK,KeyL").expect("four keys");
        assert_eq!(b.lane_for_key("keys"), Some(1));
        assert_eq!(b.lane_for_key("KeyZ"), None);
        assert!(KeyBindings::parse("KeyA,KeyS").is_none());
        assert!(KeyBindings::parse("KeyA,,KeyK,KeyL").is_none());
        assert_eq!(KeyBindings::default().to_ini_value(), "KeyD,KeyF,KeyJ,KeyK");
        assert_eq!("BOUND".parse::<KeyMode>(), Ok(KeyMode::Bound));
    }

    #[test]
    fn unbound_key_is_ignored_entirely() {
        let mut pf = Playfield::new(&[NoteTemplate::new(1, 1000.0, NoteKind::Tap, 0)]);
        let mut score = ScoreState::new();
        let mut events = Vec::new();
        let mut input = InputResolver::new(KeyMode::Bound, KeyBindings::default());
        assert!(input.press(7, None, Some("KeyQ"), 1000.0, &mut pf, &mut score, &mut events).is_none());
        assert!(!input.is_held(7), "unmapped key must not enter the held set");
        assert_eq!(pf.note(0).judgement, NoteState::Pending);
        let ev = input
            .press(8, None, Some("KeyD"), 1000.0, &mut pf, &mut score, &mut events)
            .expect("bound key hits lane 0");
        assert_eq!(ev.outcome, Outcome::Judged(JudgeGrade::Perfect));
    }

    #[test]
    fn bound_key_only_reaches_its_lane() {
        let mut pf = Playfield::new(&[NoteTemplate::new(1, 1000.0, NoteKind::Tap, 2)]);
        let mut score = ScoreState::new();
        let mut events = Vec::new();
        let mut input = InputResolver::new(KeyMode::Bound, KeyBindings::default());
        assert!(input.press(1, None, Some("KeyD"), 1000.0, &mut pf, &mut score, &mut events).is_none());
        assert!(input.is_held(1));
        assert!(input.press(2, Some(2), None, 1000.0, &mut pf, &mut score, &mut events).is_some());
    }

    #[test]
    fn miss_band_press_is_a_non_event() {
        let mut pf = Playfield::new(&[NoteTemplate::new(1, 1000.0, NoteKind::Tap, 0)]);
        let mut score = ScoreState::new();
        let mut events = Vec::new();
        let mut input = InputResolver::default();
        assert!(input.press(1, None, None, 830.0, &mut pf, &mut score, &mut events).is_none());
        assert_eq!(pf.note(0).judgement, NoteState::Pending);
        assert_eq!(score, ScoreState::new());
        assert!(events.is_empty());
    }

    #[test]
    fn sync_partners_resolve_with_primary() {
        let mut pf = Playfield::new(&[
            NoteTemplate::new(1, 2000.0, NoteKind::Tap, 0),
            NoteTemplate::new(2, 2040.0, NoteKind::SyncTap, 1),
            NoteTemplate::new(3, 2030.0, NoteKind::Tap, 2),
            NoteTemplate::new(4, 2070.0, NoteKind::SyncTap, 3),
        ]);
        let mut score = ScoreState::new();
        let mut events = Vec::new();
        let mut input = InputResolver::default();
        let primary = input
            .press(1, None, None, 1990.0, &mut pf, &mut score, &mut events)
            .expect("tap at 2000 is closest");
        assert_eq!(primary.note_id, 1);
        let synced: Vec<_> = events
            .iter()
            .filter(|e| e.cause == JudgeCause::Sync)
            .map(|e| e.note_id)
            .collect();
        assert_eq!(synced, vec![2], "only SyncTap notes within 50ms of the primary");
        assert_eq!(score.perfect, 2);
        assert_eq!(score.combo, 2);
    }

    #[test]
    fn release_of_non_last_input_does_nothing() {
        let mut pf = Playfield::new(&[NoteTemplate::hold(1, 1000.0, 0, 500.0, true)]);
        let mut score = ScoreState::new();
        let mut events = Vec::new();
        let mut input = InputResolver::default();
        input.press(1, None, None, 1000.0, &mut pf, &mut score, &mut events);
        input.press(2, None, None, 1010.0, &mut pf, &mut score, &mut events);
        assert!(input.release(1, 1100.0, &mut pf, &mut score, &mut events).is_empty());
        assert_eq!(pf.note(0).judgement, NoteState::Holding);
        assert!(input.release(99, 1100.0, &mut pf, &mut score, &mut events).is_empty());
        let resolved = input.release(2, 1520.0, &mut pf, &mut score, &mut events);
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].outcome, Outcome::Judged(JudgeGrade::Perfect));
        assert_eq!(pf.note(0).judgement, NoteState::Hit);
    }
}
