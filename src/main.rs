use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use exile_hud::data::DataIndex;
use exile_hud::gate::FeatureGate;
use exile_hud::hook;
use exile_hud::hotkey::HotkeyRegistry;
use exile_hud::logging;
use exile_hud::settings::Settings;
use exile_hud::synthesis::{SynthesisEngine, SystemKeySink, TriggerOptions};

fn settings_path() -> PathBuf {
    dirs_next::config_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("exile-hud")
        .join("settings.json")
}

fn main() -> anyhow::Result<()> {
    let settings_path = settings_path();
    let settings = Settings::load(&settings_path)?;
    logging::init(settings.debug_logging);
    tracing::info!(path = %settings_path.display(), "settings loaded");

    let hook = hook::global();
    if !hook.ensure_started() {
        tracing::warn!("global input hook unavailable; hotkeys are disabled");
    }

    let registry = HotkeyRegistry::new();
    registry.attach(&hook);

    let engine = Arc::new(SynthesisEngine::new(hook.clone(), SystemKeySink));
    let trigger_options = TriggerOptions {
        include_alt: settings.include_alt,
        hold: settings.hold,
    };
    registry.register("copy_item", &settings.copy_item_hotkey, move || {
        // the sequence sleeps between key transitions; run it on its own
        // thread so event dispatch keeps flowing meanwhile
        let engine = Arc::clone(&engine);
        let options = trigger_options.clone();
        std::thread::spawn(move || {
            if !engine.send_copy_chord(&options) {
                tracing::warn!("copy-item trigger did not complete");
            }
        });
        Ok(())
    });

    let visible = Arc::new(AtomicBool::new(true));
    let toggle_flag = Arc::clone(&visible);
    registry.register("toggle_overlay", &settings.toggle_overlay_hotkey, move || {
        let now = !toggle_flag.fetch_xor(true, Ordering::SeqCst);
        tracing::debug!(visible = now, "overlay visibility toggled");
        Ok(())
    });

    let data_dir = settings
        .data_dir
        .clone()
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            settings_path
                .parent()
                .map(|p| p.join("data"))
                .unwrap_or_else(|| PathBuf::from("data"))
        });
    let index = DataIndex::new(
        data_dir,
        FeatureGate::new(settings.enabled_categories.clone()),
    );
    index.prime(&["mods", "bases", "uniques", "gems", "maps"]);

    loop {
        std::thread::sleep(std::time::Duration::from_millis(500));
    }
}
