use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::game::easing::Easing;

pub const NUM_CHANNELS: usize = 5;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Channel {
    CameraZoom,
    CameraRotation,
    NotesOpacity,
    NotesSpeed,
    TextEffect,
}

impl Channel {
    pub const ALL: [Self; NUM_CHANNELS] = [
        Self::CameraZoom,
        Self::CameraRotation,
        Self::NotesOpacity,
        Self::NotesSpeed,
        Self::TextEffect,
    ];

    #[inline(always)]
    pub const fn index(self) -> usize {
        match self {
            Self::CameraZoom => 0,
            Self::CameraRotation => 1,
            Self::NotesOpacity => 2,
            Self::NotesSpeed => 3,
            Self::TextEffect => 4,
        }
    }

    /// Resting value of a channel before any event touched it.
    #[inline(always)]
    pub const fn default_value(self) -> f64 {
        match self {
            Self::CameraZoom | Self::NotesOpacity | Self::NotesSpeed => 1.0,
            Self::CameraRotation | Self::TextEffect => 0.0,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TextAppearance {
    #[default]
    Fade,
    Typewriter,
    Pop,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextStyle {
    pub text: String,
    #[serde(default)]
    pub appearance: TextAppearance,
    /// Length of the appear (and for Fade, disappear) animation inside the event window.
    #[serde(default)]
    pub sub_animation_ms: f64,
    #[serde(default = "default_font_size")]
    pub font_size: f64,
    #[serde(default = "default_font_weight")]
    pub font_weight: u16,
    #[serde(default)]
    pub letter_spacing: f64,
    #[serde(default = "default_color")]
    pub color: String,
    #[serde(default)]
    pub stroke_color: Option<String>,
    #[serde(default)]
    pub stroke_width: f64,
    #[serde(default)]
    pub glow_color: Option<String>,
    #[serde(default)]
    pub glow_radius: f64,
}

fn default_font_size() -> f64 {
    48.0
}

fn default_font_weight() -> u16 {
    700
}

fn default_color() -> String {
    "#FFFFFF".to_string()
}

impl TextStyle {
    pub fn plain(text: &str) -> Self {
        Self {
            text: text.to_string(),
            appearance: TextAppearance::Fade,
            sub_animation_ms: 0.0,
            font_size: default_font_size(),
            font_weight: default_font_weight(),
            letter_spacing: 0.0,
            color: default_color(),
            stroke_color: None,
            stroke_width: 0.0,
            glow_color: None,
            glow_radius: 0.0,
        }
    }
}

/// Channel-specific payload. Only text carries styling; the rest are bare scalars.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "channel")]
pub enum EventEffect {
    CameraZoom,
    CameraRotation,
    NotesOpacity,
    NotesSpeed,
    TextEffect(TextStyle),
}

impl EventEffect {
    #[inline(always)]
    pub const fn channel(&self) -> Channel {
        match self {
            Self::CameraZoom => Channel::CameraZoom,
            Self::CameraRotation => Channel::CameraRotation,
            Self::NotesOpacity => Channel::NotesOpacity,
            Self::NotesSpeed => Channel::NotesSpeed,
            Self::TextEffect(_) => Channel::TextEffect,
        }
    }
}

/// A timed keyframe: from `time` to `time + duration` the channel eases
/// from wherever it was toward `target_value`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventTemplate {
    pub id: u64,
    pub time: f64,
    #[serde(default)]
    pub duration: f64,
    pub target_value: f64,
    #[serde(default)]
    pub easing: Easing,
    #[serde(flatten)]
    pub effect: EventEffect,
}

impl EventTemplate {
    pub fn new(id: u64, time: f64, duration: f64, target_value: f64, easing: Easing, effect: EventEffect) -> Self {
        Self { id, time, duration, target_value, easing, effect }
    }

    #[inline(always)]
    pub fn channel(&self) -> Channel {
        self.effect.channel()
    }

    #[inline(always)]
    pub fn end_time(&self) -> f64 {
        self.time + self.duration
    }
}

/// Evaluated channel values for one tick.
#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub struct ChannelValues {
    pub camera_zoom: f64,
    pub camera_rotation: f64,
    pub notes_opacity: f64,
    pub notes_speed: f64,
}

impl Default for ChannelValues {
    fn default() -> Self {
        Self {
            camera_zoom: Channel::CameraZoom.default_value(),
            camera_rotation: Channel::CameraRotation.default_value(),
            notes_opacity: Channel::NotesOpacity.default_value(),
            notes_speed: Channel::NotesSpeed.default_value(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ActiveText<'a> {
    pub event_id: u64,
    pub style: &'a TextStyle,
    /// Eased progress of the whole event window.
    pub progress: f64,
    pub opacity: f64,
    pub scale: f64,
    pub visible_chars: usize,
}

/// Read-only event lists, split per channel and sorted by time.
#[derive(Clone, Debug, Default)]
pub struct Timeline {
    channels: [Vec<EventTemplate>; NUM_CHANNELS],
}

impl Timeline {
    pub fn new(events: &[EventTemplate]) -> Self {
        let mut channels: [Vec<EventTemplate>; NUM_CHANNELS] = Default::default();
        for ev in events {
            channels[ev.channel().index()].push(ev.clone());
        }
        for list in &mut channels {
            list.sort_by(|a, b| a.time.total_cmp(&b.time));
        }
        Self { channels }
    }

    #[inline(always)]
    pub fn events(&self, channel: Channel) -> &[EventTemplate] {
        &self.channels[channel.index()]
    }

    pub fn value_of(&self, channel: Channel, song_time_ms: f64, default: f64) -> f64 {
        value_of(self.events(channel), song_time_ms, default)
    }

    pub fn values(&self, song_time_ms: f64) -> ChannelValues {
        let v = |c: Channel| self.value_of(c, song_time_ms, c.default_value());
        ChannelValues {
            camera_zoom: v(Channel::CameraZoom),
            camera_rotation: v(Channel::CameraRotation),
            notes_opacity: v(Channel::NotesOpacity),
            notes_speed: v(Channel::NotesSpeed),
        }
    }

    /// Text effects whose window contains `song_time_ms`.
    pub fn active_text(&self, song_time_ms: f64) -> SmallVec<[ActiveText<'_>; 2]> {
        let mut out = SmallVec::new();
        for ev in self.events(Channel::TextEffect) {
            if ev.time > song_time_ms {
                break;
            }
            if song_time_ms >= ev.end_time() {
                continue;
            }
            let EventEffect::TextEffect(style) = &ev.effect else {
                continue;
            };
            out.push(text_state(ev, style, song_time_ms));
        }
        out
    }
}

/// Keyframe evaluation over one channel's events (ascending by time).
///
/// The baseline snaps to each event's target once its window has fully
/// elapsed. Inside a window the value eases from the baseline toward the
/// target. The first active event wins if windows overlap.
pub fn value_of(events: &[EventTemplate], song_time_ms: f64, default: f64) -> f64 {
    let mut baseline = default;
    for ev in events {
        if song_time_ms < ev.time {
            break;
        }
        if song_time_ms >= ev.end_time() {
            baseline = ev.target_value;
            continue;
        }
        let progress = ((song_time_ms - ev.time) / ev.duration).clamp(0.0, 1.0);
        let eased = ev.easing.ease(progress);
        return (ev.target_value - baseline).mul_add(eased, baseline);
    }
    baseline
}

fn text_state<'a>(ev: &EventTemplate, style: &'a TextStyle, song_time_ms: f64) -> ActiveText<'a> {
    let elapsed = song_time_ms - ev.time;
    let progress = ev.easing.ease(elapsed / ev.duration);
    let appear = if style.sub_animation_ms > 0.0 {
        (elapsed / style.sub_animation_ms).clamp(0.0, 1.0)
    } else {
        1.0
    };
    let char_count = style.text.chars().count();
    let (opacity, scale, visible_chars) = match style.appearance {
        TextAppearance::Fade => {
            let remaining = ev.end_time() - song_time_ms;
            let disappear = if style.sub_animation_ms > 0.0 {
                (remaining / style.sub_animation_ms).clamp(0.0, 1.0)
            } else {
                1.0
            };
            (appear.min(disappear), 1.0, char_count)
        }
        TextAppearance::Typewriter => {
            let shown = (char_count as f64 * appear).ceil() as usize;
            (1.0, 1.0, shown.min(char_count))
        }
        TextAppearance::Pop => (1.0, Easing::EaseOutBack.ease(appear), char_count),
    };
    ActiveText {
        event_id: ev.id,
        style,
        progress,
        opacity,
        scale,
        visible_chars,
    }
}

#[cfg(test)]
mod tests {
    use super::{Channel, EventEffect, EventTemplate, TextAppearance, TextStyle, Timeline, value_of};
    use crate::game::easing::Easing;

    fn zoom(id: u64, time: f64, duration: f64, target: f64, easing: Easing) -> EventTemplate {
        EventTemplate::new(id, time, duration, target, easing, EventEffect::CameraZoom)
    }

    #[test]
    fn baseline_before_during_and_after() {
        let events = [zoom(1, 1000.0, 1000.0, 2.0, Easing::Linear)];
        assert_eq!(value_of(&events, 0.0, 1.0), 1.0);
        assert!((value_of(&events, 1500.0, 1.0) - 1.5).abs() < 1e-9);
        assert_eq!(value_of(&events, 2000.0, 1.0), 2.0);
        assert_eq!(value_of(&events, 99_999.0, 1.0), 2.0);
    }

    #[test]
    fn second_event_eases_from_first_target() {
        let events = [
            zoom(1, 0.0, 100.0, 2.0, Easing::Linear),
            zoom(2, 500.0, 100.0, 4.0, Easing::EaseIn),
        ];
        // baseline 2.0, EaseIn(0.5)=0.25 -> 2.5
        assert!((value_of(&events, 550.0, 1.0) - 2.5).abs() < 1e-9);
        assert_eq!(value_of(&events, 300.0, 1.0), 2.0, "gap holds the last target");
    }

    #[test]
    fn overlapping_windows_honor_earliest_start() {
        let events = [
            zoom(1, 0.0, 1000.0, 3.0, Easing::Linear),
            zoom(2, 200.0, 100.0, 10.0, Easing::Linear),
        ];
        // at 250 both windows are open; the first one found wins
        assert!((value_of(&events, 250.0, 1.0) - 1.5).abs() < 1e-9);
    }

    #[test]
    fn zero_duration_snaps() {
        let events = [zoom(1, 100.0, 0.0, 0.5, Easing::Bounce)];
        assert_eq!(value_of(&events, 99.0, 1.0), 1.0);
        assert_eq!(value_of(&events, 100.0, 1.0), 0.5);
    }

    #[test]
    fn timeline_splits_and_sorts_by_channel() {
        let tl = Timeline::new(&[
            EventTemplate::new(3, 900.0, 100.0, 0.0, Easing::Linear, EventEffect::NotesOpacity),
            zoom(1, 500.0, 100.0, 2.0, Easing::Linear),
            EventTemplate::new(2, 100.0, 0.0, 90.0, Easing::Linear, EventEffect::CameraRotation),
            zoom(4, 0.0, 100.0, 1.5, Easing::Linear),
        ]);
        let ids: Vec<_> = tl.events(Channel::CameraZoom).iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![4, 1]);
        let v = tl.values(1000.0);
        assert_eq!(v.camera_zoom, 2.0);
        assert_eq!(v.camera_rotation, 90.0);
        assert_eq!(v.notes_opacity, 0.0);
        assert_eq!(v.notes_speed, 1.0);
    }

    #[test]
    fn typewriter_reveals_characters() {
        let mut style = TextStyle::plain("READY");
        style.appearance = TextAppearance::Typewriter;
        style.sub_animation_ms = 500.0;
        let tl = Timeline::new(&[EventTemplate::new(
            7,
            1000.0,
            2000.0,
            1.0,
            Easing::Linear,
            EventEffect::TextEffect(style),
        )]);
        assert!(tl.active_text(999.0).is_empty());
        let active = tl.active_text(1200.0);
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].visible_chars, 2, "0.4 of 5 chars rounds up");
        assert_eq!(tl.active_text(1600.0)[0].visible_chars, 5);
        assert!(tl.active_text(3000.0).is_empty());
    }

    #[test]
    fn event_json_is_tagged_by_channel() {
        let json = r#"[
            {"id": 1, "time": 0, "duration": 250, "targetValue": 1.2, "easing": "EaseOut", "channel": "CameraZoom"},
            {"id": 2, "time": 10, "duration": 900, "targetValue": 1, "channel": "TextEffect", "text": "GO", "appearance": "Pop"}
        ]"#;
        let events: Vec<EventTemplate> = serde_json::from_str(json).expect("events should parse");
        assert_eq!(events[0].channel(), Channel::CameraZoom);
        assert_eq!(events[0].easing, Easing::EaseOut);
        let EventEffect::TextEffect(style) = &events[1].effect else {
            panic!("expected a text effect");
        };
        assert_eq!(style.text, "GO");
        assert_eq!(style.appearance, TextAppearance::Pop);
        assert_eq!(style.color, "#FFFFFF");
    }
}
