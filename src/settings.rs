use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::synthesis::HoldOverrides;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Settings {
    /// Chord that triggers the copy-item flow. `"Not Set"` disables it.
    #[serde(default = "default_copy_item_hotkey")]
    pub copy_item_hotkey: String,
    /// Chord that toggles overlay visibility.
    #[serde(default = "default_toggle_overlay_hotkey")]
    pub toggle_overlay_hotkey: String,
    /// Include Alt in the synthesized copy chord. Some keyboard layouts
    /// need plain Ctrl+C instead.
    #[serde(default = "default_include_alt")]
    pub include_alt: bool,
    /// Synthetic-input timing overrides; unset fields use crate defaults.
    #[serde(default)]
    pub hold: HoldOverrides,
    /// Wildcard patterns for enabled data categories. Empty means all.
    #[serde(default)]
    pub enabled_categories: Vec<String>,
    /// When enabled the application initialises the logger at debug level.
    #[serde(default)]
    pub debug_logging: bool,
    /// Directory holding the category JSON files. If `None`, a platform
    /// default next to the settings file is used.
    pub data_dir: Option<String>,
}

fn default_copy_item_hotkey() -> String {
    "Ctrl+D".into()
}

fn default_toggle_overlay_hotkey() -> String {
    "F9".into()
}

fn default_include_alt() -> bool {
    true
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            copy_item_hotkey: default_copy_item_hotkey(),
            toggle_overlay_hotkey: default_toggle_overlay_hotkey(),
            include_alt: default_include_alt(),
            hold: HoldOverrides::default(),
            enabled_categories: Vec::new(),
            debug_logging: false,
            data_dir: None,
        }
    }
}

impl Settings {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path).unwrap_or_default();
        if content.is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let settings = Settings::load(&dir.path().join("settings.json")).expect("load");
        assert_eq!(settings.copy_item_hotkey, "Ctrl+D");
        assert!(settings.include_alt);
        assert!(settings.enabled_categories.is_empty());
    }

    #[test]
    fn save_and_reload_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("settings.json");
        let mut settings = Settings::default();
        settings.toggle_overlay_hotkey = "Ctrl+F12".into();
        settings.hold.key_hold = Some(60);
        settings.enabled_categories = vec!["maps-*".into()];
        settings.save(&path).expect("save");

        let reloaded = Settings::load(&path).expect("reload");
        assert_eq!(reloaded.toggle_overlay_hotkey, "Ctrl+F12");
        assert_eq!(reloaded.hold.key_hold, Some(60));
        assert_eq!(reloaded.enabled_categories, vec!["maps-*".to_string()]);
    }

    #[test]
    fn unknown_hold_fields_stay_default() {
        let parsed: Settings = serde_json::from_str(r#"{"hold":{"key_hold":5}}"#).expect("parse");
        assert_eq!(parsed.hold.key_hold, Some(5));
        assert_eq!(parsed.hold.unwind_delay, None);
    }
}
