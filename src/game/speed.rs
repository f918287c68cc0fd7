use crate::game::note::RuntimeNote;
use crate::game::timing_windows::WINDOW_MISS_MS;

// Fraction of the remaining gap closed per tick.
pub const SPEED_APPROACH_RATE: f64 = 0.05;
pub const BASE_SPEED: f64 = 1.0;
// A speed note stays in force until its own hit window has closed.
pub const SPEED_TRIGGER_LIFETIME_MS: f64 = WINDOW_MISS_MS;
const SNAP_EPSILON: f64 = 1e-6;

/// Global speed multiplier. Eases toward the target set by the active speed
/// note, and back toward 1.0 once that note's trigger runs out.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SpeedModulator {
    pub target: f64,
    pub current: f64,
    /// Song time after which the active trigger lapses.
    pub expires_at_ms: Option<f64>,
}

impl Default for SpeedModulator {
    fn default() -> Self {
        Self {
            target: BASE_SPEED,
            current: BASE_SPEED,
            expires_at_ms: None,
        }
    }
}

impl SpeedModulator {
    /// Set a target with no expiry.
    pub fn set_target(&mut self, target: f64) {
        self.target = target;
        self.expires_at_ms = None;
    }

    /// Start a speed note's trigger. A newer trigger replaces the active one.
    pub fn trigger(&mut self, multiplier: f64, note_time_ms: f64) {
        self.target = multiplier;
        self.expires_at_ms = Some(note_time_ms + SPEED_TRIGGER_LIFETIME_MS);
    }

    /// Drop the active trigger once song time is past its expiry and aim back
    /// at the base speed. Returns true when a trigger lapsed.
    pub fn expire(&mut self, song_time_ms: f64) -> bool {
        let Some(expires_at) = self.expires_at_ms else {
            return false;
        };
        if song_time_ms <= expires_at {
            return false;
        }
        self.target = BASE_SPEED;
        self.expires_at_ms = None;
        true
    }

    /// One tick of exponential approach. Returns the new current value.
    pub fn step(&mut self) -> f64 {
        let gap = self.target - self.current;
        if gap.abs() <= SNAP_EPSILON {
            self.current = self.target;
        } else {
            self.current = gap.mul_add(SPEED_APPROACH_RATE, self.current);
        }
        self.current
    }
}

/// `(multiplier, note time)` of the last speed note whose time lies in
/// `(prev_ms, now_ms]`. Notes must be sorted by time.
pub fn crossed_speed_trigger(notes: &[RuntimeNote], prev_ms: f64, now_ms: f64) -> Option<(f64, f64)> {
    if now_ms <= prev_ms {
        return None;
    }
    let start = notes.partition_point(|n| n.time() <= prev_ms);
    notes[start..]
        .iter()
        .take_while(|n| n.time() <= now_ms)
        .filter_map(|n| n.template.speed_multiplier.map(|m| (m, n.time())))
        .last()
}

#[cfg(test)]
mod tests {
    use super::{SpeedModulator, crossed_speed_trigger};
    use crate::game::note::{NoteKind, NoteTemplate, RuntimeNote};

    #[test]
    fn approaches_target_exponentially() {
        let mut m = SpeedModulator::default();
        m.set_target(2.0);
        assert!((m.step() - 1.05).abs() < 1e-12);
        assert!((m.step() - 1.0975).abs() < 1e-12);
        for _ in 0..1000 {
            m.step();
        }
        assert_eq!(m.current, 2.0, "settles exactly once within epsilon");
    }

    #[test]
    fn trigger_fires_once_per_crossing() {
        let notes: Vec<RuntimeNote> = [
            NoteTemplate::new(1, 1000.0, NoteKind::Tap, 0).with_speed(1.5),
            NoteTemplate::new(2, 1500.0, NoteKind::Tap, 0),
            NoteTemplate::new(3, 2000.0, NoteKind::Tap, 0).with_speed(0.5),
        ]
        .into_iter()
        .map(RuntimeNote::from_template)
        .collect();
        assert_eq!(crossed_speed_trigger(&notes, 0.0, 999.0), None);
        assert_eq!(crossed_speed_trigger(&notes, 999.0, 1000.0), Some((1.5, 1000.0)));
        assert_eq!(crossed_speed_trigger(&notes, 1000.0, 1900.0), None);
        assert_eq!(crossed_speed_trigger(&notes, 0.0, 2500.0), Some((0.5, 2000.0)), "latest crossing wins");
        assert_eq!(crossed_speed_trigger(&notes, 2500.0, 0.0), None);
    }

    #[test]
    fn trigger_lapses_after_its_window_and_eases_back() {
        let mut m = SpeedModulator::default();
        m.trigger(2.0, 1000.0);
        assert_eq!(m.expires_at_ms, Some(1200.0));
        for _ in 0..10 {
            m.step();
        }
        assert!(!m.expire(1200.0), "still inside the window");
        assert_eq!(m.target, 2.0);
        let peak = m.current;
        assert!(m.expire(1200.5));
        assert_eq!(m.target, 1.0);
        assert_eq!(m.expires_at_ms, None);
        assert!(m.step() < peak, "ramps down instead of snapping");
        assert!(m.current > 1.0);
        assert!(!m.expire(5000.0), "nothing left to expire");
    }

    #[test]
    fn newer_trigger_replaces_active_one() {
        let mut m = SpeedModulator::default();
        m.trigger(2.0, 1000.0);
        m.trigger(0.5, 1100.0);
        assert!(!m.expire(1250.0), "first trigger's expiry no longer applies");
        assert_eq!(m.target, 0.5);
        assert!(m.expire(1301.0));
        assert_eq!(m.target, 1.0);
    }
}
