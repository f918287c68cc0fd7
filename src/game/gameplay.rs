use std::collections::VecDeque;
use std::sync::Arc;

use log::{debug, info, trace, warn};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::config::Config;
use crate::game::chart::{Beatmap, BeatmapError};
use crate::game::input::{InputId, InputResolver};
use crate::game::judgment::JudgementEvent;
use crate::game::note::{NoteKind, Playfield, RuntimeNote};
use crate::game::speed::crossed_speed_trigger;
use crate::game::stage_stats::ScoreState;
use crate::game::timeline::{ActiveText, ChannelValues, Timeline};
use crate::game::timing::{ClockState, beat_for_time};
use crate::game::timing_stats::{self, TimingStats};

// The round ends this long after the beatmap's nominal duration.
pub const END_GRACE_MS: f64 = 2000.0;
const LOG_INTERVAL_MS: f64 = 1000.0;
// Undrained judgements kept per round; the oldest go first past this.
pub const MAX_BUFFERED_EVENTS: usize = 4096;

/// A press or release delivered between ticks. Applied in arrival order at
/// the next `update`; a stamped edge is judged at its own song time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputEdge {
    pub input: InputId,
    pub pressed: bool,
    #[serde(default)]
    pub lane_hint: Option<u8>,
    #[serde(default)]
    pub key_hint: Option<String>,
    #[serde(default)]
    pub at_song_ms: Option<f64>,
}

impl InputEdge {
    pub fn press(input: InputId) -> Self {
        Self {
            input,
            pressed: true,
            lane_hint: None,
            key_hint: None,
            at_song_ms: None,
        }
    }

    pub fn release(input: InputId) -> Self {
        Self {
            pressed: false,
            ..Self::press(input)
        }
    }
}

/// What the caller hands in every tick.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct FrameInput {
    pub frame_delta_ms: f64,
    /// Audio clock sample for this frame, if playback is running.
    pub audio_position_ms: Option<f64>,
    pub audio_ended: bool,
}

impl FrameInput {
    pub fn new(frame_delta_ms: f64) -> Self {
        Self {
            frame_delta_ms,
            ..Self::default()
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum RoundAction {
    None,
    Ended(ScoreState),
}

/// Everything one round owns. Built by `init`, driven by `update` and the
/// input calls, thrown away (or rebuilt by `restart`) when the round is over.
pub struct State {
    pub beatmap: Arc<Beatmap>,
    pub config: Config,
    pub clock: ClockState,
    pub playfield: Playfield,
    pub timeline: Timeline,
    pub input: InputResolver,
    pub score: ScoreState,
    pub channel_values: ChannelValues,
    pub current_beat: f64,
    pending_edges: VecDeque<InputEdge>,
    /// Judgements since the last `drain_events`, capped at `MAX_BUFFERED_EVENTS`.
    events: Vec<JudgementEvent>,
    last_trigger_ms: f64,
    ended: bool,
    log_timer: f64,
}

fn fresh_state(beatmap: Arc<Beatmap>, config: &Config) -> State {
    let clock = ClockState::new(config.pre_roll_ms, config.playback_rate());
    let playfield = Playfield::new(&beatmap.notes);
    let timeline = Timeline::new(&beatmap.events);
    let channel_values = timeline.values(clock.song_time_ms);
    let current_beat = beat_for_time(clock.song_time_ms, beatmap.bpm, beatmap.offset_ms);
    State {
        clock,
        playfield,
        timeline,
        input: InputResolver::new(config.key_mode, config.key_bindings.clone()),
        score: ScoreState::new(),
        channel_values,
        current_beat,
        pending_edges: VecDeque::new(),
        events: Vec::new(),
        last_trigger_ms: f64::NEG_INFINITY,
        ended: false,
        log_timer: 0.0,
        config: config.clone(),
        beatmap,
    }
}

/// Validate the beatmap and set up a round. Song time starts at `-pre_roll`.
pub fn init(beatmap: Arc<Beatmap>, config: &Config) -> Result<State, BeatmapError> {
    beatmap.validate()?;
    let state = fresh_state(beatmap, config);
    info!(
        "Round start: '{}', {} notes, {} events, duration {:.0}ms, pre-roll {:.0}ms, rate {:.2}, key mode {}",
        state.beatmap.title,
        state.playfield.notes().len(),
        state.beatmap.events.len(),
        state.beatmap.duration_ms,
        state.config.pre_roll_ms,
        state.clock.rate(),
        state.input.mode.as_str()
    );
    Ok(state)
}

/// Discard all runtime state and start over from the same beatmap and config.
pub fn restart(state: &mut State) {
    let beatmap = Arc::clone(&state.beatmap);
    let config = state.config.clone();
    *state = fresh_state(beatmap, &config);
    info!("Round restarted: '{}'", state.beatmap.title);
}

pub fn pause(state: &mut State) {
    if !state.ended {
        state.clock.pause();
    }
}

pub fn resume(state: &mut State) {
    if !state.ended {
        state.clock.resume();
    }
}

/// Press at the current song time. Returns the primary judgement, if any.
pub fn press(state: &mut State, input: InputId, lane_hint: Option<u8>, key_hint: Option<&str>) -> Option<JudgementEvent> {
    let song_time_ms = state.clock.song_time_ms;
    press_at(state, input, lane_hint, key_hint, song_time_ms)
}

/// Release at the current song time. Returns the hold judgements it caused.
pub fn release(state: &mut State, input: InputId) -> Vec<JudgementEvent> {
    let song_time_ms = state.clock.song_time_ms;
    release_at(state, input, song_time_ms)
}

pub fn queue_input_edge(state: &mut State, edge: InputEdge) {
    if state.ended {
        trace!("input edge dropped after round end: {edge:?}");
        return;
    }
    state.pending_edges.push_back(edge);
}

fn press_at(
    state: &mut State,
    input: InputId,
    lane_hint: Option<u8>,
    key_hint: Option<&str>,
    song_time_ms: f64,
) -> Option<JudgementEvent> {
    if state.ended {
        return None;
    }
    if state.clock.is_paused {
        trace!("press ignored while paused: input {input}");
        return None;
    }
    let judged = state.input.press(
        input,
        lane_hint,
        key_hint,
        song_time_ms,
        &mut state.playfield,
        &mut state.score,
        &mut state.events,
    );
    state.playfield.flush_spawns();
    judged
}

fn release_at(state: &mut State, input: InputId, song_time_ms: f64) -> Vec<JudgementEvent> {
    if state.ended {
        return Vec::new();
    }
    if state.clock.is_paused {
        // Keep the held set truthful; holds are judged once the clock runs again.
        state.input.forget(input);
        return Vec::new();
    }
    let judged = state.input.release(
        input,
        song_time_ms,
        &mut state.playfield,
        &mut state.score,
        &mut state.events,
    );
    state.playfield.flush_spawns();
    judged
}

fn process_input_edges(state: &mut State, tick_song_ms: f64) {
    while let Some(edge) = state.pending_edges.pop_front() {
        let at = edge.at_song_ms.filter(|t| t.is_finite()).unwrap_or(tick_song_ms);
        if edge.pressed {
            press_at(state, edge.input, edge.lane_hint, edge.key_hint.as_deref(), at);
        } else {
            release_at(state, edge.input, at);
        }
    }
}

fn apply_speed_triggers(state: &mut State, song_time_ms: f64) {
    if let Some((multiplier, note_time_ms)) =
        crossed_speed_trigger(state.playfield.notes(), state.last_trigger_ms, song_time_ms)
    {
        debug!("SPEED TRIGGER: target {multiplier:.2} from note at {note_time_ms:.1}ms, song_time={song_time_ms:.1}ms");
        state.clock.speed.trigger(multiplier, note_time_ms);
    }
    if state.clock.speed.expire(song_time_ms) {
        debug!("SPEED TRIGGER lapsed at song_time={song_time_ms:.1}ms; easing back to base speed");
    }
    state.last_trigger_ms = song_time_ms;
}

fn trim_event_buffer(state: &mut State) {
    let excess = state.events.len().saturating_sub(MAX_BUFFERED_EVENTS);
    if excess > 0 {
        warn!("Judgement buffer over {MAX_BUFFERED_EVENTS}; dropping {excess} undrained event(s)");
        state.events.drain(..excess);
    }
}

fn end_round(state: &mut State, reason: &str) -> RoundAction {
    state.ended = true;
    state.pending_edges.clear();
    state.score.finalize();
    let total = scorable_notes(state);
    info!(
        "Round ended ({reason}) at song_time={:.1}ms. Score: {}, Perfect: {}, Good: {}, Miss: {}, Mines: {}, Max combo: {}, Accuracy: {:.2}%",
        state.clock.song_time_ms,
        state.score.score,
        state.score.perfect,
        state.score.good,
        state.score.miss,
        state.score.mines_hit,
        state.score.max_combo,
        state.score.accuracy_percent(total)
    );
    RoundAction::Ended(state.score)
}

/// One simulation tick.
pub fn update(state: &mut State, frame: &FrameInput) -> RoundAction {
    if state.ended {
        return RoundAction::Ended(state.score);
    }

    let song_time_ms = state.clock.advance(frame.frame_delta_ms, frame.audio_position_ms);
    if state.clock.is_paused {
        process_input_edges(state, song_time_ms);
        return RoundAction::None;
    }

    apply_speed_triggers(state, song_time_ms);
    let any_held = state.input.any_held();
    state
        .playfield
        .auto_resolve(song_time_ms, any_held, &mut state.score, &mut state.events);

    state.channel_values = state.timeline.values(song_time_ms);
    state.current_beat = beat_for_time(song_time_ms, state.beatmap.bpm, state.beatmap.offset_ms);

    process_input_edges(state, song_time_ms);
    let spawned = state.playfield.flush_spawns();
    if spawned > 0 {
        trace!("merged {spawned} spawned note(s) at song_time={song_time_ms:.1}ms");
    }
    state
        .playfield
        .update_visibility(song_time_ms, state.clock.current_speed_multiplier());
    trim_event_buffer(state);

    if frame.audio_ended && !state.clock.in_pre_roll() {
        return end_round(state, "audio ended");
    }
    if song_time_ms > state.beatmap.duration_ms + END_GRACE_MS {
        return end_round(state, "duration elapsed");
    }

    state.log_timer += frame.frame_delta_ms.max(0.0);
    if state.log_timer >= LOG_INTERVAL_MS {
        info!(
            "Beat: {:.2}, Time: {:.1}ms, Combo: {}, Score: {}, Speed: {:.2}, Held: {}",
            state.current_beat,
            song_time_ms,
            state.score.combo,
            state.score.score,
            state.clock.current_speed_multiplier(),
            state.input.held_count()
        );
        state.log_timer -= LOG_INTERVAL_MS;
    }
    RoundAction::None
}

#[inline(always)]
pub fn is_ended(state: &State) -> bool {
    state.ended
}

#[inline(always)]
pub fn song_time_ms(state: &State) -> f64 {
    state.clock.song_time_ms
}

#[inline(always)]
pub fn current_speed_multiplier(state: &State) -> f64 {
    state.clock.current_speed_multiplier()
}

#[inline(always)]
pub fn current_beat(state: &State) -> f64 {
    state.current_beat
}

#[inline(always)]
pub fn notes(state: &State) -> &[RuntimeNote] {
    state.playfield.notes()
}

#[inline(always)]
pub fn score(state: &State) -> &ScoreState {
    &state.score
}

#[inline(always)]
pub fn channel_values(state: &State) -> ChannelValues {
    state.channel_values
}

pub fn active_text(state: &State) -> SmallVec<[ActiveText<'_>; 2]> {
    state.timeline.active_text(state.clock.song_time_ms)
}

/// Judgements produced since the last drain, oldest first. The buffer is
/// only emptied here; callers that never drain keep at most the newest
/// `MAX_BUFFERED_EVENTS`, so drain once per tick to see every judgement.
pub fn drain_events(state: &mut State) -> Vec<JudgementEvent> {
    std::mem::take(&mut state.events)
}

/// Non-mine notes in the round so far, spawned ones included.
pub fn scorable_notes(state: &State) -> u32 {
    let n = state
        .playfield
        .notes()
        .iter()
        .filter(|n| n.kind() != NoteKind::Mine)
        .count();
    u32::try_from(n).unwrap_or(u32::MAX)
}

pub fn accuracy_percent(state: &State) -> f64 {
    state.score.accuracy_percent(scorable_notes(state))
}

pub fn timing_stats(state: &State) -> TimingStats {
    timing_stats::compute(state.playfield.notes())
}
