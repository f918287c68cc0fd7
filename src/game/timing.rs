use log::{debug, info};

use crate::game::speed::SpeedModulator;

pub const DEFAULT_PRE_ROLL_MS: f64 = 2000.0;
// External clock drift beyond this is treated as a seek or stall and snapped.
pub const DRIFT_SNAP_MS: f64 = 300.0;
// Share of the drift folded back in per tick while in tolerance.
pub const DRIFT_CORRECTION: f64 = 0.1;

/// Song clock for one round. Song time is negative during the pre-roll and
/// then follows either the external audio position or accumulated frame time.
#[derive(Clone, Debug)]
pub struct ClockState {
    pub song_time_ms: f64,
    pub is_paused: bool,
    pub accumulated_pause_ms: f64,
    pub speed: SpeedModulator,
    pre_roll_ms: f64,
    /// Playback rate (practice factor). Scales frame time into song time
    /// together with the current speed multiplier.
    rate: f64,
    wall_elapsed_ms: f64,
    paused_at_wall_ms: f64,
    pre_roll_done: bool,
}

impl ClockState {
    pub fn new(pre_roll_ms: f64, rate: f64) -> Self {
        let pre_roll_ms = if pre_roll_ms.is_finite() { pre_roll_ms.max(0.0) } else { DEFAULT_PRE_ROLL_MS };
        let rate = if rate.is_finite() && rate > 0.0 { rate } else { 1.0 };
        Self {
            song_time_ms: -pre_roll_ms,
            is_paused: false,
            accumulated_pause_ms: 0.0,
            speed: SpeedModulator::default(),
            pre_roll_ms,
            rate,
            wall_elapsed_ms: 0.0,
            paused_at_wall_ms: 0.0,
            pre_roll_done: pre_roll_ms <= 0.0,
        }
    }

    #[inline(always)]
    pub const fn rate(&self) -> f64 {
        self.rate
    }

    #[inline(always)]
    pub const fn target_speed_multiplier(&self) -> f64 {
        self.speed.target
    }

    #[inline(always)]
    pub const fn current_speed_multiplier(&self) -> f64 {
        self.speed.current
    }

    #[inline(always)]
    pub const fn in_pre_roll(&self) -> bool {
        !self.pre_roll_done
    }

    /// Wall time that counted toward the round, pauses excluded.
    #[inline(always)]
    fn active_elapsed_ms(&self) -> f64 {
        self.wall_elapsed_ms - self.accumulated_pause_ms
    }

    /// Advance by one frame. `external_position_ms` is the audio clock sample
    /// for this frame, if the caller has one.
    pub fn advance(&mut self, frame_delta_ms: f64, external_position_ms: Option<f64>) -> f64 {
        let frame_delta_ms = if frame_delta_ms.is_finite() { frame_delta_ms.max(0.0) } else { 0.0 };
        self.wall_elapsed_ms += frame_delta_ms;
        if self.is_paused {
            return self.song_time_ms;
        }

        if !self.pre_roll_done {
            let elapsed = self.active_elapsed_ms();
            if elapsed < self.pre_roll_ms {
                self.song_time_ms = elapsed - self.pre_roll_ms;
                self.speed.step();
                return self.song_time_ms;
            }
            self.pre_roll_done = true;
            // Carry the part of this frame that landed past the pre-roll.
            self.song_time_ms = (elapsed - self.pre_roll_ms) * self.rate;
            debug!("Pre-roll complete at song_time={:.1}ms", self.song_time_ms);
            self.speed.step();
            return self.song_time_ms;
        }

        // Practice rate and speed-note multiplier compose.
        let step = frame_delta_ms * self.rate * self.speed.current;
        match external_position_ms.filter(|p| p.is_finite()) {
            Some(external) => {
                let drift = external - self.song_time_ms;
                if drift.abs() > DRIFT_SNAP_MS {
                    info!(
                        "Clock drift {drift:.1}ms exceeds {DRIFT_SNAP_MS}ms; snapping to external position {external:.1}ms"
                    );
                    self.song_time_ms = external;
                } else {
                    self.song_time_ms += drift.mul_add(DRIFT_CORRECTION, step);
                }
            }
            None => self.song_time_ms += step,
        }
        self.speed.step();
        self.song_time_ms
    }

    pub fn pause(&mut self) {
        if self.is_paused {
            return;
        }
        self.is_paused = true;
        self.paused_at_wall_ms = self.wall_elapsed_ms;
        info!("Paused at song_time={:.1}ms", self.song_time_ms);
    }

    pub fn resume(&mut self) {
        if !self.is_paused {
            return;
        }
        let paused_for = self.wall_elapsed_ms - self.paused_at_wall_ms;
        self.accumulated_pause_ms += paused_for;
        self.is_paused = false;
        info!(
            "Resumed at song_time={:.1}ms after {paused_for:.1}ms paused",
            self.song_time_ms
        );
    }
}

/// Song time to beats from tempo metadata.
#[inline(always)]
pub fn beat_for_time(song_time_ms: f64, bpm: f64, offset_ms: f64) -> f64 {
    if !(bpm.is_finite() && bpm > 0.0) {
        return 0.0;
    }
    (song_time_ms - offset_ms) * bpm / 60_000.0
}
