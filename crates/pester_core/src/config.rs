//! Trigger configuration loaded from a flat JSON file.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};
use crate::events::ActionKind;
use crate::roll::{Chance, RollMode};

/// How often and how likely each action fires.
///
/// Chances are whole percentages. Missing fields take their defaults, so an
/// empty object is a valid config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerConfig {
    /// Milliseconds between ticks.
    pub delay_ms: u64,
    /// Fire at most one action per tick.
    pub single_mode: bool,
    pub popup_chance: u32,
    pub video_chance: u32,
    pub audio_chance: u32,
    pub prompt_chance: u32,
    pub web_chance: u32,
    pub subliminal_chance: u32,
    pub wallpaper_chance: u32,
    pub pack_name: String,
    pub mood: String,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            delay_ms: 10_000,
            single_mode: false,
            popup_chance: 100,
            video_chance: 0,
            audio_chance: 0,
            prompt_chance: 0,
            web_chance: 0,
            subliminal_chance: 0,
            wallpaper_chance: 0,
            pack_name: "default".to_string(),
            mood: "default".to_string(),
        }
    }
}

impl TriggerConfig {
    /// Reads and validates a config file.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.delay_ms == 0 {
            return Err(ConfigError::Invalid("delay_ms must be positive".to_string()));
        }
        for (kind, chance) in self.raw_chances() {
            if chance > 100 {
                return Err(ConfigError::Invalid(format!(
                    "{kind}_chance {chance} outside 0..=100"
                )));
            }
        }
        Ok(())
    }

    pub fn mode(&self) -> RollMode {
        if self.single_mode {
            RollMode::Exclusive
        } else {
            RollMode::Independent
        }
    }

    /// Chance for each action, in [`ActionKind::ALL`] order.
    pub fn targets(&self) -> ConfigResult<Vec<(ActionKind, Chance)>> {
        self.raw_chances()
            .into_iter()
            .map(|(kind, chance)| {
                Chance::percent(chance)
                    .map(|c| (kind, c))
                    .map_err(|e| ConfigError::Invalid(format!("{kind}_chance: {e}")))
            })
            .collect()
    }

    fn raw_chances(&self) -> [(ActionKind, u32); 7] {
        [
            (ActionKind::Popup, self.popup_chance),
            (ActionKind::Video, self.video_chance),
            (ActionKind::Audio, self.audio_chance),
            (ActionKind::Prompt, self.prompt_chance),
            (ActionKind::Web, self.web_chance),
            (ActionKind::Subliminal, self.subliminal_chance),
            (ActionKind::Wallpaper, self.wallpaper_chance),
        ]
    }
}
