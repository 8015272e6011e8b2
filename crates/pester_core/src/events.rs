//! Defines the events the trigger engine reacts to.

use crate::config::TriggerConfig;

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Event {
    Tick { dt: f64 },
    Trigger { kind: ActionKind },
    Reload(TriggerConfig),
    Panic,
}

/// Something the desktop host knows how to show or play.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Popup,
    Video,
    Audio,
    Prompt,
    Web,
    Subliminal,
    Wallpaper,
}

impl ActionKind {
    pub const ALL: [ActionKind; 7] = [
        ActionKind::Popup,
        ActionKind::Video,
        ActionKind::Audio,
        ActionKind::Prompt,
        ActionKind::Web,
        ActionKind::Subliminal,
        ActionKind::Wallpaper,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ActionKind::Popup => "popup",
            ActionKind::Video => "video",
            ActionKind::Audio => "audio",
            ActionKind::Prompt => "prompt",
            ActionKind::Web => "web",
            ActionKind::Subliminal => "subliminal",
            ActionKind::Wallpaper => "wallpaper",
        }
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
