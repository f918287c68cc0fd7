use serde::Serialize;

use crate::game::note::{NoteKind, NoteState, RuntimeNote};

#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize)]
pub struct TimingStats {
    pub mean_abs_ms: f64,
    pub mean_ms: f64,
    pub stddev_ms: f64,
    pub max_abs_ms: f64,
    pub count: usize,
}

#[inline(always)]
fn press_offset(n: &RuntimeNote) -> Option<f64> {
    if n.kind() == NoteKind::Mine || n.judgement == NoteState::Missed {
        return None;
    }
    n.offset_ms
}

/// Offset statistics over every note judged by a press (hits and hold starts).
/// Mines and misses are left out.
pub fn compute(notes: &[RuntimeNote]) -> TimingStats {
    // First pass: sums and maxima
    let mut sum_abs = 0.0_f64;
    let mut sum_signed = 0.0_f64;
    let mut max_abs = 0.0_f64;
    let mut count: usize = 0;

    for e in notes.iter().filter_map(press_offset) {
        let a = e.abs();
        sum_abs += a;
        sum_signed += e;
        if a > max_abs {
            max_abs = a;
        }
        count += 1;
    }

    if count == 0 {
        return TimingStats::default();
    }

    let mean_ms = sum_signed / (count as f64);
    let mean_abs_ms = sum_abs / (count as f64);

    // Second pass: sample standard deviation of signed offsets
    let stddev_ms = if count > 1 {
        let sum_diff_sq: f64 = notes
            .iter()
            .filter_map(press_offset)
            .map(|e| (e - mean_ms) * (e - mean_ms))
            .sum();
        (sum_diff_sq / ((count as f64) - 1.0)).sqrt()
    } else {
        0.0
    };

    TimingStats {
        mean_abs_ms,
        mean_ms,
        stddev_ms,
        max_abs_ms: max_abs,
        count,
    }
}

#[cfg(test)]
mod tests {
    use super::compute;
    use crate::game::note::{NoteKind, NoteState, NoteTemplate, RuntimeNote};

    fn judged(kind: NoteKind, state: NoteState, offset: Option<f64>) -> RuntimeNote {
        let mut n = RuntimeNote::from_template(NoteTemplate::new(0, 0.0, kind, 0));
        n.judgement = state;
        n.offset_ms = offset;
        n
    }

    #[test]
    fn empty_is_zeroed() {
        assert_eq!(compute(&[]).count, 0);
        assert_eq!(compute(&[judged(NoteKind::Tap, NoteState::Pending, None)]).mean_ms, 0.0);
    }

    #[test]
    fn mean_and_spread() {
        let notes = [
            judged(NoteKind::Tap, NoteState::Hit, Some(-10.0)),
            judged(NoteKind::Tap, NoteState::Hit, Some(30.0)),
            judged(NoteKind::Mine, NoteState::Hit, Some(100.0)),
            judged(NoteKind::Tap, NoteState::Missed, None),
        ];
        let s = compute(&notes);
        assert_eq!(s.count, 2, "mines and misses are excluded");
        assert!((s.mean_ms - 10.0).abs() < 1e-9);
        assert!((s.mean_abs_ms - 20.0).abs() < 1e-9);
        assert_eq!(s.max_abs_ms, 30.0);
        // sample stddev of {-10, 30}: sqrt(800)
        assert!((s.stddev_ms - 800.0_f64.sqrt()).abs() < 1e-9);
    }
}
