use crate::game::input::{KeyBindings, KeyMode};
use crate::game::timing::DEFAULT_PRE_ROLL_MS;
use log::{info, warn};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;

pub const CONFIG_PATH: &str = "beatcore.ini";
const SECTION: &str = "Gameplay";

// --- Minimal INI reader ---
#[derive(Debug, Default)]
pub struct SimpleIni {
    sections: HashMap<String, HashMap<String, String>>,
}

impl SimpleIni {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load<P: AsRef<Path>>(&mut self, path: P) -> Result<(), std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        self.load_str(&content);
        Ok(())
    }

    pub fn load_str(&mut self, content: &str) {
        self.sections.clear();
        let mut current_section: Option<String> = None;

        for raw_line in content.lines() {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
                continue;
            }

            // Section header: [SectionName]
            if line.starts_with('[') && line.ends_with(']') && line.len() >= 2 {
                let section = line[1..line.len() - 1].trim().to_string();
                current_section = Some(section.clone());
                self.sections.entry(section).or_default();
                continue;
            }

            if let Some((key_raw, value_raw)) = line.split_once('=') {
                let key = key_raw.trim();
                if key.is_empty() {
                    continue;
                }
                let section = current_section.clone().unwrap_or_default();
                self.sections
                    .entry(section)
                    .or_default()
                    .insert(key.to_string(), value_raw.trim().to_string());
            }
        }
    }

    pub fn get(&self, section: &str, key: &str) -> Option<String> {
        self.sections.get(section).and_then(|s| s.get(key)).cloned()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Off => "Off",
            Self::Error => "Error",
            Self::Warn => "Warn",
            Self::Info => "Info",
            Self::Debug => "Debug",
            Self::Trace => "Trace",
        }
    }

    pub const fn as_level_filter(self) -> log::LevelFilter {
        match self {
            Self::Off => log::LevelFilter::Off,
            Self::Error => log::LevelFilter::Error,
            Self::Warn => log::LevelFilter::Warn,
            Self::Info => log::LevelFilter::Info,
            Self::Debug => log::LevelFilter::Debug,
            Self::Trace => log::LevelFilter::Trace,
        }
    }
}

impl FromStr for LogLevel {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" | "none" => Ok(Self::Off),
            "error" => Ok(Self::Error),
            "warn" | "warning" => Ok(Self::Warn),
            "info" => Ok(Self::Info),
            "debug" => Ok(Self::Debug),
            "trace" => Ok(Self::Trace),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub pre_roll_ms: f64,
    pub practice_mode: bool,
    /// Clock rate while practicing. Hit windows stay in song time and do not scale.
    pub practice_speed_factor: f64,
    pub key_mode: KeyMode,
    pub key_bindings: KeyBindings,
    pub log_level: LogLevel,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pre_roll_ms: DEFAULT_PRE_ROLL_MS,
            practice_mode: false,
            practice_speed_factor: 0.5,
            key_mode: KeyMode::Unrestricted,
            key_bindings: KeyBindings::default(),
            log_level: LogLevel::Warn,
        }
    }
}

impl Config {
    pub fn playback_rate(&self) -> f64 {
        if self.practice_mode {
            self.practice_speed_factor
        } else {
            1.0
        }
    }

    pub fn from_ini(conf: &SimpleIni) -> Self {
        let default = Self::default();
        Self {
            pre_roll_ms: conf
                .get(SECTION, "PreRollMs")
                .and_then(|v| v.parse::<f64>().ok())
                .filter(|v| v.is_finite())
                .map_or(default.pre_roll_ms, |v| v.max(0.0)),
            practice_mode: conf
                .get(SECTION, "PracticeMode")
                .and_then(|v| parse_bool(&v))
                .unwrap_or(default.practice_mode),
            practice_speed_factor: conf
                .get(SECTION, "PracticeSpeedFactor")
                .and_then(|v| v.parse::<f64>().ok())
                .filter(|v| v.is_finite() && *v > 0.0)
                .map_or(default.practice_speed_factor, |v| v.min(1.0)),
            key_mode: conf
                .get(SECTION, "KeyMode")
                .and_then(|v| KeyMode::from_str(&v).ok())
                .unwrap_or(default.key_mode),
            key_bindings: conf
                .get(SECTION, "KeyBindings")
                .and_then(|v| KeyBindings::parse(&v))
                .unwrap_or(default.key_bindings),
            log_level: conf
                .get(SECTION, "LogLevel")
                .and_then(|v| LogLevel::from_str(&v).ok())
                .unwrap_or(default.log_level),
        }
    }

    pub fn to_ini_string(&self) -> String {
        let mut content = String::new();
        content.push_str(&format!("[{SECTION}]\n"));
        content.push_str(&format!("PreRollMs={}\n", self.pre_roll_ms));
        content.push_str(&format!("PracticeMode={}\n", u8::from(self.practice_mode)));
        content.push_str(&format!("PracticeSpeedFactor={}\n", self.practice_speed_factor));
        content.push_str(&format!("KeyMode={}\n", self.key_mode.as_str()));
        content.push_str(&format!("KeyBindings={}\n", self.key_bindings.to_ini_value()));
        content.push_str(&format!("LogLevel={}\n", self.log_level.as_str()));
        content
    }
}

fn parse_bool(v: &str) -> Option<bool> {
    let v = v.trim();
    if v.eq_ignore_ascii_case("true") || v.eq_ignore_ascii_case("yes") || v.eq_ignore_ascii_case("on") {
        Some(true)
    } else if v.eq_ignore_ascii_case("false") || v.eq_ignore_ascii_case("no") || v.eq_ignore_ascii_case("off") {
        Some(false)
    } else {
        v.parse::<u8>().ok().map(|n| n != 0)
    }
}

fn create_default_config_file(path: &Path) -> Result<(), std::io::Error> {
    info!("'{}' not found, creating with default values.", path.display());
    std::fs::write(path, Config::default().to_ini_string())
}

/// Load the config at `path`, writing defaults first if the file is missing.
/// Unreadable files and bad keys fall back to defaults.
pub fn load<P: AsRef<Path>>(path: P) -> Config {
    let path = path.as_ref();
    if !path.exists()
        && let Err(e) = create_default_config_file(path)
    {
        warn!("Failed to create default config file: {e}");
    }

    let mut conf = SimpleIni::new();
    match conf.load(path) {
        Ok(()) => {
            let cfg = Config::from_ini(&conf);
            info!("Configuration loaded from '{}'.", path.display());
            cfg
        }
        Err(e) => {
            warn!("Failed to load '{}': {e}. Using default values.", path.display());
            Config::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Config, LogLevel, SimpleIni};
    use crate::game::input::{KeyBindings, KeyMode};

    fn parse(content: &str) -> Config {
        let mut ini = SimpleIni::new();
        ini.load_str(content);
        Config::from_ini(&ini)
    }

    #[test]
    fn defaults_round_trip_through_ini() {
        let default = Config::default();
        assert_eq!(parse(&default.to_ini_string()), default);
    }

    #[test]
    fn reads_gameplay_section() {
        let cfg = parse(
            "; comment\n[Gameplay]\nPreRollMs = 1500\nPracticeMode=yes\nPracticeSpeedFactor=0.75\n\
             KeyMode=bound\nKeyBindings=KeyA,KeyS,KeyK,KeyL\nLogLevel=debug\n",
        );
        assert_eq!(cfg.pre_roll_ms, 1500.0);
        assert!(cfg.practice_mode);
        assert_eq!(cfg.playback_rate(), 0.75);
        assert_eq!(cfg.key_mode, KeyMode::Bound);
        assert_eq!(cfg.key_bindings.lane_for_key("KeyL"), Some(3));
        assert_eq!(cfg.log_level, LogLevel::Debug);
    }

    #[test]
    fn malformed_keys_fall_back_per_key() {
        let cfg = parse("[Gameplay]\nPreRollMs=soon\nPracticeSpeedFactor=-2\nKeyBindings=KeyA\nKeyMode=psychic\n");
        let default = Config::default();
        assert_eq!(cfg.pre_roll_ms, default.pre_roll_ms);
        assert_eq!(cfg.practice_speed_factor, default.practice_speed_factor);
        assert_eq!(cfg.key_bindings, KeyBindings::default());
        assert_eq!(cfg.key_mode, KeyMode::Unrestricted);
        assert_eq!(cfg.playback_rate(), 1.0, "practice is off unless enabled");
    }
}
