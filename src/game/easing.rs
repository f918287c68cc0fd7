use serde::{Deserialize, Serialize};

const BACK_C1: f64 = 1.70158;
const BACK_C3: f64 = BACK_C1 + 1.0;
const ELASTIC_C4: f64 = std::f64::consts::TAU / 3.0;
const BOUNCE_N1: f64 = 7.5625;
const BOUNCE_D1: f64 = 2.75;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Easing {
    #[default]
    Linear,
    EaseIn,
    EaseOut,
    EaseInOut,
    EaseOutBack,
    Elastic,
    Bounce,
}

impl Easing {
    /// Map progress in [0, 1] onto the curve. Input is clamped; output may
    /// overshoot 1 for Back and Elastic.
    pub fn ease(self, progress: f64) -> f64 {
        let t = progress.clamp(0.0, 1.0);
        match self {
            Self::Linear => t,
            Self::EaseIn => t * t,
            Self::EaseOut => t * (2.0 - t),
            Self::EaseInOut => {
                if t < 0.5 {
                    2.0 * t * t
                } else {
                    (4.0 - 2.0 * t).mul_add(t, -1.0)
                }
            }
            Self::EaseOutBack => {
                let u = t - 1.0;
                BACK_C1.mul_add(u * u, BACK_C3.mul_add(u * u * u, 1.0))
            }
            Self::Elastic => {
                if t <= 0.0 {
                    0.0
                } else if t >= 1.0 {
                    1.0
                } else {
                    2f64.powf(-10.0 * t) * ((t * 10.0 - 0.75) * ELASTIC_C4).sin() + 1.0
                }
            }
            Self::Bounce => bounce_out(t),
        }
    }
}

fn bounce_out(t: f64) -> f64 {
    if t < 1.0 / BOUNCE_D1 {
        BOUNCE_N1 * t * t
    } else if t < 2.0 / BOUNCE_D1 {
        let u = t - 1.5 / BOUNCE_D1;
        BOUNCE_N1 * u * u + 0.75
    } else if t < 2.5 / BOUNCE_D1 {
        let u = t - 2.25 / BOUNCE_D1;
        BOUNCE_N1 * u * u + 0.9375
    } else {
        let u = t - 2.625 / BOUNCE_D1;
        BOUNCE_N1 * u * u + 0.984375
    }
}

#[cfg(test)]
mod tests {
    use super::Easing;

    fn round3(v: f64) -> f64 {
        (v * 1000.0).round() / 1000.0
    }

    #[test]
    fn canonical_checkpoints_match_to_three_decimals() {
        let cases = [
            (Easing::Linear, 0.3, 0.3),
            (Easing::EaseIn, 0.5, 0.25),
            (Easing::EaseOut, 0.5, 0.75),
            (Easing::EaseInOut, 0.25, 0.125),
            (Easing::EaseInOut, 0.75, 0.875),
            (Easing::EaseOutBack, 0.5, 1.088),
            (Easing::Elastic, 0.5, 1.016),
            (Easing::Bounce, 0.1, 0.076),
            (Easing::Bounce, 0.5, 0.766),
            (Easing::Bounce, 0.8, 0.94),
        ];
        for (easing, t, expected) in cases {
            let got = round3(easing.ease(t));
            assert!(
                (got - expected).abs() < 1e-9,
                "{easing:?}({t}) = {got}, expected {expected}"
            );
        }
    }

    #[test]
    fn every_curve_starts_at_zero_and_ends_at_one() {
        for easing in [
            Easing::Linear,
            Easing::EaseIn,
            Easing::EaseOut,
            Easing::EaseInOut,
            Easing::EaseOutBack,
            Easing::Elastic,
            Easing::Bounce,
        ] {
            assert!(easing.ease(0.0).abs() < 1e-9, "{easing:?} at 0");
            assert!((easing.ease(1.0) - 1.0).abs() < 1e-9, "{easing:?} at 1");
            assert!((easing.ease(7.0) - 1.0).abs() < 1e-9, "{easing:?} clamps above 1");
        }
    }
}
