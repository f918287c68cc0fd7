pub mod chart;
pub mod easing;
pub mod gameplay;
pub mod input;
pub mod judgment;
pub mod note;
pub mod speed;
pub mod stage_stats;
pub mod timeline;
pub mod timing;
pub mod timing_stats;
pub mod timing_windows;
