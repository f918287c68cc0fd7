use log::{debug, trace};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::game::judgment::{JudgeCause, JudgeGrade, JudgementEvent, Outcome};
use crate::game::stage_stats::ScoreState;
use crate::game::timing_windows::{WINDOW_GOOD_MS, WINDOW_MISS_MS};

pub type NoteId = u64;

pub const NUM_LANES: u8 = 4;

// Mutation spawns: first child lands this far after the hit, then every step after that.
pub const MUTATION_SPACING_MS: f64 = 200.0;
pub const MAX_MUTATION_COUNT: u32 = 16;
pub const SPAWNED_HOLD_DURATION_MS: f64 = 400.0;

const LOOKAHEAD_MS: f64 = 3000.0;
const MISS_LINGER_MS: f64 = 500.0;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NoteKind {
    Tap,
    Hold,
    Mine,
    SyncTap,
}

/// An authored note. Never changes during a round.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteTemplate {
    pub id: NoteId,
    /// Milliseconds from song start.
    pub time: f64,
    pub kind: NoteKind,
    #[serde(default)]
    pub lane: u8,
    #[serde(default)]
    pub hold_duration_ms: Option<f64>,
    #[serde(default)]
    pub speed_multiplier: Option<f64>,
    #[serde(default)]
    pub require_release: Option<bool>,
    #[serde(default)]
    pub mutation_kind: Option<NoteKind>,
    #[serde(default)]
    pub mutation_count: Option<u32>,
}

impl NoteTemplate {
    pub fn new(id: NoteId, time: f64, kind: NoteKind, lane: u8) -> Self {
        Self {
            id,
            time,
            kind,
            lane,
            hold_duration_ms: None,
            speed_multiplier: None,
            require_release: None,
            mutation_kind: None,
            mutation_count: None,
        }
    }

    pub fn hold(id: NoteId, time: f64, lane: u8, duration_ms: f64, require_release: bool) -> Self {
        Self {
            hold_duration_ms: Some(duration_ms),
            require_release: Some(require_release),
            ..Self::new(id, time, NoteKind::Hold, lane)
        }
    }

    pub fn with_mutation(mut self, kind: NoteKind, count: u32) -> Self {
        self.mutation_kind = Some(kind);
        self.mutation_count = Some(count);
        self
    }

    pub fn with_speed(mut self, multiplier: f64) -> Self {
        self.speed_multiplier = Some(multiplier);
        self
    }

    #[inline(always)]
    pub fn requires_release(&self) -> bool {
        self.require_release.unwrap_or(true)
    }

    /// End of the hold body; the note time itself for every other kind.
    #[inline(always)]
    pub fn end_time(&self) -> f64 {
        match (self.kind, self.hold_duration_ms) {
            (NoteKind::Hold, Some(d)) => self.time + d,
            _ => self.time,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
pub enum NoteState {
    Pending,
    Hit,
    Holding,
    Missed,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RuntimeNote {
    pub template: NoteTemplate,
    pub judgement: NoteState,
    pub visible: bool,
    /// Press error for notes judged by input.
    pub offset_ms: Option<f64>,
    pub spawned: bool,
}

impl RuntimeNote {
    pub fn from_template(template: NoteTemplate) -> Self {
        Self {
            template,
            judgement: NoteState::Pending,
            visible: false,
            offset_ms: None,
            spawned: false,
        }
    }

    #[inline(always)]
    pub fn id(&self) -> NoteId {
        self.template.id
    }

    #[inline(always)]
    pub fn time(&self) -> f64 {
        self.template.time
    }

    #[inline(always)]
    pub fn kind(&self) -> NoteKind {
        self.template.kind
    }

    #[inline(always)]
    pub fn is_pending(&self) -> bool {
        self.judgement == NoteState::Pending
    }

    /// Pending -> {Hit, Missed, Holding}, Holding -> {Hit, Missed}. Anything else is refused.
    fn transition(&mut self, to: NoteState) -> bool {
        let allowed = match (self.judgement, to) {
            (NoteState::Pending, NoteState::Hit | NoteState::Missed) => true,
            (NoteState::Pending, NoteState::Holding) => self.kind() == NoteKind::Hold,
            (NoteState::Holding, NoteState::Hit | NoteState::Missed) => true,
            _ => false,
        };
        if allowed {
            self.judgement = to;
        } else {
            trace!(
                "refused note transition: id={}, {:?} -> {:?}",
                self.id(),
                self.judgement,
                to
            );
        }
        allowed
    }
}

#[derive(Copy, Clone, Debug)]
struct ActiveHold {
    note_id: NoteId,
    start_time: f64,
    end_time: f64,
}

/// The runtime note list of one round plus the lifecycle rules that move notes
/// between states. Notes stay sorted by time; spawned notes are buffered and
/// merged by `flush_spawns` so nothing is inserted while a scan is running.
#[derive(Clone, Debug)]
pub struct Playfield {
    notes: Vec<RuntimeNote>,
    spawn_buffer: SmallVec<[RuntimeNote; 8]>,
    active_holds: SmallVec<[ActiveHold; 4]>,
    next_spawn_id: NoteId,
    miss_cursor: usize,
}

impl Playfield {
    pub fn new(templates: &[NoteTemplate]) -> Self {
        let mut notes: Vec<RuntimeNote> = templates
            .iter()
            .cloned()
            .map(RuntimeNote::from_template)
            .collect();
        notes.sort_by(|a, b| a.time().total_cmp(&b.time()));
        let next_spawn_id = templates.iter().map(|t| t.id).max().map_or(0, |id| id + 1);
        Self {
            notes,
            spawn_buffer: SmallVec::new(),
            active_holds: SmallVec::new(),
            next_spawn_id,
            miss_cursor: 0,
        }
    }

    #[inline(always)]
    pub fn notes(&self) -> &[RuntimeNote] {
        &self.notes
    }

    #[inline(always)]
    pub fn note(&self, index: usize) -> &RuntimeNote {
        &self.notes[index]
    }

    #[inline(always)]
    pub fn has_active_holds(&self) -> bool {
        !self.active_holds.is_empty()
    }

    #[inline(always)]
    pub fn pending_spawns(&self) -> usize {
        self.spawn_buffer.len()
    }

    fn index_of(&self, id: NoteId, time: f64) -> Option<usize> {
        let start = self.notes.partition_point(|n| n.time() < time);
        self.notes[start..]
            .iter()
            .take_while(|n| n.time() <= time)
            .position(|n| n.id() == id)
            .map(|i| start + i)
    }

    /// Pending/Holding -> Hit with `grade`, scoring it and queueing mutation children.
    pub fn resolve_hit(
        &mut self,
        index: usize,
        grade: JudgeGrade,
        cause: JudgeCause,
        offset_ms: Option<f64>,
        song_time_ms: f64,
        score: &mut ScoreState,
        events: &mut Vec<JudgementEvent>,
    ) -> bool {
        let note = &mut self.notes[index];
        let was_holding = note.judgement == NoteState::Holding;
        if !note.transition(NoteState::Hit) {
            return false;
        }
        if offset_ms.is_some() && !was_holding {
            note.offset_ms = offset_ms;
        }
        let template = note.template.clone();
        if was_holding {
            self.active_holds.retain(|h| h.note_id != template.id);
        }
        score.apply_judgement(grade);
        debug!(
            "JUDGE HIT: id={}, kind={:?}, grade={:?}, cause={:?}, note_time={:.1}ms, song_time={:.1}ms, offset_ms={:?}",
            template.id, template.kind, grade, cause, template.time, song_time_ms, offset_ms
        );
        events.push(JudgementEvent {
            note_id: template.id,
            kind: template.kind,
            outcome: Outcome::Judged(grade),
            cause,
            offset_ms,
            song_time_ms,
        });
        if grade.is_success() {
            self.queue_mutation(&template, song_time_ms);
        }
        true
    }

    pub fn resolve_miss(
        &mut self,
        index: usize,
        cause: JudgeCause,
        song_time_ms: f64,
        score: &mut ScoreState,
        events: &mut Vec<JudgementEvent>,
    ) -> bool {
        let note = &mut self.notes[index];
        let was_holding = note.judgement == NoteState::Holding;
        if !note.transition(NoteState::Missed) {
            return false;
        }
        let (id, kind, time) = (note.id(), note.kind(), note.time());
        if was_holding {
            self.active_holds.retain(|h| h.note_id != id);
        }
        score.apply_judgement(JudgeGrade::Miss);
        debug!("MISSED: id={id}, kind={kind:?}, cause={cause:?}, note_time={time:.1}ms, song_time={song_time_ms:.1}ms");
        events.push(JudgementEvent {
            note_id: id,
            kind,
            outcome: Outcome::Judged(JudgeGrade::Miss),
            cause,
            offset_ms: None,
            song_time_ms,
        });
        true
    }

    pub fn start_hold(
        &mut self,
        index: usize,
        grade: JudgeGrade,
        offset_ms: f64,
        song_time_ms: f64,
        events: &mut Vec<JudgementEvent>,
    ) -> bool {
        let note = &mut self.notes[index];
        if !note.transition(NoteState::Holding) {
            return false;
        }
        note.offset_ms = Some(offset_ms);
        let hold = ActiveHold {
            note_id: note.id(),
            start_time: note.time(),
            end_time: note.template.end_time(),
        };
        self.active_holds.push(hold);
        debug!(
            "HOLD START: id={}, grade={:?}, end_time={:.1}ms, offset_ms={:.2}",
            hold.note_id, grade, hold.end_time, offset_ms
        );
        events.push(JudgementEvent {
            note_id: hold.note_id,
            kind: NoteKind::Hold,
            outcome: Outcome::HoldStarted(grade),
            cause: JudgeCause::Press,
            offset_ms: Some(offset_ms),
            song_time_ms,
        });
        true
    }

    /// A pressed mine: penalty and combo break no matter how far off the press was.
    pub fn hit_mine(
        &mut self,
        index: usize,
        offset_ms: f64,
        song_time_ms: f64,
        score: &mut ScoreState,
        events: &mut Vec<JudgementEvent>,
    ) -> bool {
        let note = &mut self.notes[index];
        if note.kind() != NoteKind::Mine || !note.transition(NoteState::Hit) {
            return false;
        }
        note.offset_ms = Some(offset_ms);
        let id = note.id();
        score.apply_judgement(JudgeGrade::MineHit);
        debug!("JUDGE MINE HIT: id={id}, song_time={song_time_ms:.1}ms, offset_ms={offset_ms:.2}");
        events.push(JudgementEvent {
            note_id: id,
            kind: NoteKind::Mine,
            outcome: Outcome::Judged(JudgeGrade::MineHit),
            cause: JudgeCause::Press,
            offset_ms: Some(offset_ms),
            song_time_ms,
        });
        true
    }

    /// Passive rules, run every tick: notes more than the miss window behind
    /// song time are resolved (mines dodged, everything else missed), and
    /// holds that reached their end are completed or force-missed.
    pub fn auto_resolve(
        &mut self,
        song_time_ms: f64,
        any_input_held: bool,
        score: &mut ScoreState,
        events: &mut Vec<JudgementEvent>,
    ) {
        let cutoff = song_time_ms - WINDOW_MISS_MS;
        let mut cursor = self.miss_cursor.min(self.notes.len());
        while cursor < self.notes.len() {
            if self.notes[cursor].time() >= cutoff {
                break;
            }
            if self.notes[cursor].is_pending() {
                if self.notes[cursor].kind() == NoteKind::Mine {
                    let note = &mut self.notes[cursor];
                    note.transition(NoteState::Hit);
                    debug!("MINE DODGED: id={}, song_time={song_time_ms:.1}ms", note.id());
                    events.push(JudgementEvent {
                        note_id: note.id(),
                        kind: NoteKind::Mine,
                        outcome: Outcome::Dodged,
                        cause: JudgeCause::Passive,
                        offset_ms: None,
                        song_time_ms,
                    });
                } else {
                    self.resolve_miss(cursor, JudgeCause::Passive, song_time_ms, score, events);
                }
            }
            cursor += 1;
        }
        self.miss_cursor = cursor;

        let holds: SmallVec<[ActiveHold; 4]> = self.active_holds.clone();
        for hold in holds {
            let Some(index) = self.index_of(hold.note_id, hold.start_time) else {
                self.active_holds.retain(|h| h.note_id != hold.note_id);
                continue;
            };
            let requires_release = self.notes[index].template.requires_release();
            if !requires_release {
                if hold.end_time <= song_time_ms {
                    self.resolve_hit(
                        index,
                        JudgeGrade::Perfect,
                        JudgeCause::HoldComplete,
                        None,
                        song_time_ms,
                        score,
                        events,
                    );
                } else if !any_input_held {
                    self.evaluate_release(index, hold.end_time, song_time_ms, score, events);
                }
                continue;
            }
            if song_time_ms > hold.end_time + WINDOW_GOOD_MS {
                debug!("HOLD LET GO (held past end): id={}", hold.note_id);
                self.resolve_miss(index, JudgeCause::HoldComplete, song_time_ms, score, events);
            } else if !any_input_held {
                // All input went away without a release call (released while paused).
                self.evaluate_release(index, hold.end_time, song_time_ms, score, events);
            }
        }
    }

    /// Every input is up: judge all holds against their end times.
    pub fn release_holds(
        &mut self,
        song_time_ms: f64,
        score: &mut ScoreState,
        events: &mut Vec<JudgementEvent>,
    ) {
        let holds: SmallVec<[ActiveHold; 4]> = self.active_holds.clone();
        for hold in holds {
            if let Some(index) = self.index_of(hold.note_id, hold.start_time) {
                self.evaluate_release(index, hold.end_time, song_time_ms, score, events);
            }
        }
    }

    fn evaluate_release(
        &mut self,
        index: usize,
        end_time: f64,
        song_time_ms: f64,
        score: &mut ScoreState,
        events: &mut Vec<JudgementEvent>,
    ) {
        let delta = song_time_ms - end_time;
        let requires_release = self.notes[index].template.requires_release();
        // Early release past the good window is an immediate miss. Late release
        // only counts when the hold insists on a timed release.
        let ok = if requires_release {
            delta.abs() <= WINDOW_GOOD_MS
        } else {
            delta >= -WINDOW_GOOD_MS
        };
        if ok {
            self.resolve_hit(
                index,
                JudgeGrade::Perfect,
                JudgeCause::Release,
                None,
                song_time_ms,
                score,
                events,
            );
        } else {
            debug!(
                "HOLD LET GO: id={}, release_delta_ms={delta:.1}",
                self.notes[index].id()
            );
            self.resolve_miss(index, JudgeCause::Release, song_time_ms, score, events);
        }
    }

    fn queue_mutation(&mut self, parent: &NoteTemplate, song_time_ms: f64) {
        let Some(kind) = parent.mutation_kind else {
            return;
        };
        let count = parent.mutation_count.unwrap_or(1);
        for i in 0..count {
            let time = song_time_ms + MUTATION_SPACING_MS * f64::from(i + 1);
            let lane = ((u32::from(parent.lane) + i + 1) % u32::from(NUM_LANES)) as u8;
            let mut template = NoteTemplate::new(self.next_spawn_id, time, kind, lane);
            if kind == NoteKind::Hold {
                template.hold_duration_ms = Some(SPAWNED_HOLD_DURATION_MS);
                template.require_release = Some(true);
            }
            self.next_spawn_id += 1;
            let mut note = RuntimeNote::from_template(template);
            note.spawned = true;
            self.spawn_buffer.push(note);
        }
        debug!(
            "MUTATION: id={} spawned {count} {kind:?} note(s) from {:.1}ms",
            parent.id,
            song_time_ms + MUTATION_SPACING_MS
        );
    }

    /// Merge buffered spawns into the note list and restore time order.
    /// Returns how many notes were added.
    pub fn flush_spawns(&mut self) -> usize {
        let added = self.spawn_buffer.len();
        if added == 0 {
            return 0;
        }
        self.notes.extend(self.spawn_buffer.drain(..));
        // Stable: equal times keep authored notes ahead of spawned ones.
        self.notes.sort_by(|a, b| a.time().total_cmp(&b.time()));
        // Everything behind the miss cursor is older than any spawn, but stay safe
        // against a clock snap that moved song time backwards.
        let first_spawn = self
            .notes
            .iter()
            .position(|n| n.spawned && n.is_pending())
            .unwrap_or(self.notes.len());
        self.miss_cursor = self.miss_cursor.min(first_spawn);
        added
    }

    pub fn update_visibility(&mut self, song_time_ms: f64, speed_multiplier: f64) {
        let lookahead = LOOKAHEAD_MS / speed_multiplier.max(0.1);
        for note in &mut self.notes {
            note.visible = match note.judgement {
                NoteState::Hit => false,
                NoteState::Pending | NoteState::Holding => {
                    note.template.time - song_time_ms <= lookahead
                }
                NoteState::Missed => song_time_ms - note.template.end_time() <= MISS_LINGER_MS,
            };
        }
    }

    /// Candidate-window scan entry point: index of the first note that could
    /// still be inside the miss window at `song_time_ms`.
    #[inline(always)]
    pub fn window_start(&self, song_time_ms: f64) -> usize {
        let start_t = song_time_ms - WINDOW_MISS_MS;
        self.notes.partition_point(|n| n.time() < start_t)
    }

    pub fn is_time_sorted(&self) -> bool {
        self.notes.windows(2).all(|w| w[0].time() <= w[1].time())
    }
}
