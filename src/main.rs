use std::error::Error;
use std::path::Path;
use std::sync::Arc;

use beatcore::config;
use beatcore::game::chart::Beatmap;
use beatcore::game::gameplay::{self, FrameInput, InputEdge, RoundAction};
use beatcore::game::judgment::JudgementEvent;
use beatcore::game::stage_stats::{Grade, ScoreState, grade_for};
use beatcore::game::timing_stats::TimingStats;
use log::{info, warn};
use serde::{Deserialize, Serialize};

const FRAME_MS: f64 = 1000.0 / 60.0;

/// One recorded input edge, stamped with wall time since the round started.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TraceEntry {
    wall_ms: f64,
    #[serde(flatten)]
    edge: InputEdge,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ReplayReport {
    title: String,
    score: ScoreState,
    accuracy_percent: f64,
    grade: Grade,
    full_combo: bool,
    timing: TimingStats,
    judgements: Vec<JudgementEvent>,
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, Box<dyn Error>> {
    let text = std::fs::read_to_string(path).map_err(|e| format!("reading '{}': {e}", path.display()))?;
    Ok(serde_json::from_str(&text).map_err(|e| format!("parsing '{}': {e}", path.display()))?)
}

fn main() -> Result<(), Box<dyn Error>> {
    // Install logger immediately, then set runtime max level from config after loading it.
    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::Trace)
        .try_init();
    // Startup default when config is missing or malformed.
    log::set_max_level(log::LevelFilter::Warn);

    let args: Vec<String> = std::env::args().collect();
    let (Some(beatmap_path), Some(trace_path)) = (args.get(1), args.get(2)) else {
        let program = args.first().map_or("beatcore", String::as_str);
        return Err(format!("usage: {program} <beatmap.json> <trace.json> [config.ini]").into());
    };
    let config_path = args.get(3).map_or(config::CONFIG_PATH, String::as_str);

    let cfg = config::load(config_path);
    log::set_max_level(cfg.log_level.as_level_filter());

    let beatmap: Beatmap = read_json(Path::new(beatmap_path))?;
    let mut trace: Vec<TraceEntry> = read_json(Path::new(trace_path))?;
    trace.retain(|e| {
        let ok = e.wall_ms.is_finite();
        if !ok {
            warn!("Skipping trace entry with non-finite wall time: {:?}", e.edge);
        }
        ok
    });
    trace.sort_by(|a, b| a.wall_ms.total_cmp(&b.wall_ms));

    let mut state = gameplay::init(Arc::new(beatmap), &cfg)?;
    let mut judgements = Vec::new();
    let mut wall_ms = 0.0;
    let mut next = 0;
    let frame = FrameInput::new(FRAME_MS);

    let final_score = loop {
        wall_ms += FRAME_MS;
        while let Some(entry) = trace.get(next)
            && entry.wall_ms <= wall_ms
        {
            gameplay::queue_input_edge(&mut state, entry.edge.clone());
            next += 1;
        }
        let action = gameplay::update(&mut state, &frame);
        judgements.extend(gameplay::drain_events(&mut state));
        if let RoundAction::Ended(score) = action {
            break score;
        }
    };
    if next < trace.len() {
        info!("{} trace entries arrived after the round ended.", trace.len() - next);
    }

    let accuracy_percent = gameplay::accuracy_percent(&state);
    let report = ReplayReport {
        title: state.beatmap.title.clone(),
        score: final_score,
        accuracy_percent,
        grade: grade_for(accuracy_percent),
        full_combo: final_score.is_full_combo(),
        timing: gameplay::timing_stats(&state),
        judgements,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
