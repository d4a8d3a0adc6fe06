//! Gameplay tunables, with an optional JSON override file for event staff.

use std::path::Path;

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    /// Normalized loudness above which the participant counts as screaming.
    pub scream_threshold: f32,
    /// Gauge points added per gauge tick while screaming.
    pub fill_step: f32,
    /// Gauge points removed per gauge tick while quiet.
    pub drain_step: f32,
    /// Gauge tick period in milliseconds.
    pub gauge_tick_ms: u64,
    /// Round length in seconds.
    pub round_seconds: u32,
    /// Pause between the round ending and the score screen, in milliseconds.
    pub end_delay_ms: u64,
    pub audio_enabled: bool,
    pub master_volume: f32,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            scream_threshold: 0.30,
            fill_step: 2.5,
            drain_step: 0.3,
            gauge_tick_ms: 50,
            round_seconds: 5,
            end_delay_ms: 1000,
            audio_enabled: true,
            master_volume: 0.6,
        }
    }
}

impl GameConfig {
    /// Load overrides from `path` if it exists, falling back to defaults.
    /// A broken file is logged and ignored; the show must go on.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(raw) => match serde_json::from_str::<GameConfig>(&raw) {
                Ok(cfg) => {
                    log::info!("loaded config overrides from {}", path.display());
                    cfg
                }
                Err(err) => {
                    log::warn!("ignoring unreadable config {}: {err}", path.display());
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }

    pub fn gauge_tick_secs(&self) -> f32 {
        self.gauge_tick_ms as f32 / 1000.0
    }

    pub fn end_delay_secs(&self) -> f32 {
        self.end_delay_ms as f32 / 1000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_tuned_gameplay() {
        let cfg = GameConfig::default();
        assert_eq!(cfg.scream_threshold, 0.30);
        assert_eq!(cfg.fill_step, 2.5);
        assert_eq!(cfg.drain_step, 0.3);
        assert_eq!(cfg.gauge_tick_ms, 50);
        assert_eq!(cfg.round_seconds, 5);
        assert_eq!(cfg.end_delay_ms, 1000);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let cfg = GameConfig::load_or_default("/definitely/not/here.json");
        assert_eq!(cfg.round_seconds, GameConfig::default().round_seconds);
    }

    #[test]
    fn partial_override_keeps_other_defaults() {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("scream-cfg-{}.json", std::process::id()));
        std::fs::write(&path, r#"{ "round_seconds": 30 }"#).unwrap();
        let cfg = GameConfig::load_or_default(&path);
        std::fs::remove_file(&path).ok();
        assert_eq!(cfg.round_seconds, 30);
        assert_eq!(cfg.fill_step, 2.5);
    }
}
