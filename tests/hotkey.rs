use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use exile_hud::hook::{InputHookService, KeyDirection, KeyEvent, Modifiers};
use exile_hud::hotkey::{parse_chord, Chord, HotkeyRegistry, UNSET_CHORD};
use exile_hud::keys;
use rdev::{EventType, Key};

fn key_down(vk: u16, modifiers: Modifiers) -> KeyEvent {
    KeyEvent {
        direction: KeyDirection::Down,
        vk,
        modifiers,
    }
}

#[test]
fn parse_simple_f_key() {
    let chord = parse_chord("F2").expect("parse").expect("chord");
    assert_eq!(chord.vk, 0x71);
    assert!(!chord.ctrl && !chord.alt && !chord.shift);
}

#[test]
fn parse_combo_with_whitespace_and_case() {
    let chord = parse_chord(" ctrl + SHIFT + Space ")
        .expect("parse")
        .expect("chord");
    assert_eq!(chord.vk, keys::VK_SPACE);
    assert!(chord.ctrl && chord.shift && !chord.alt);
}

#[test]
fn empty_and_sentinel_mean_no_hotkey() {
    assert_eq!(parse_chord("").expect("parse"), None);
    assert_eq!(parse_chord("   ").expect("parse"), None);
    assert_eq!(parse_chord(UNSET_CHORD).expect("parse"), None);
    assert_eq!(parse_chord("not set").expect("parse"), None);
}

#[test]
fn unknown_key_and_modifier_only_chords_are_errors() {
    assert!(parse_chord("Ctrl+Foo").is_err());
    assert!(parse_chord("Ctrl+Shift").is_err());
}

#[test]
fn more_than_one_primary_key_is_an_error() {
    assert!(parse_chord("Ctrl+A+B").is_err());
    assert!(parse_chord("A+B").is_err());
    assert!(parse_chord("F5+F6").is_err());
}

#[test]
fn format_parse_round_trip_over_whole_key_table() {
    for &(name, vk) in keys::NAMED_KEYS {
        for bits in 0u8..8 {
            let chord = Chord {
                ctrl: bits & 1 != 0,
                alt: bits & 2 != 0,
                shift: bits & 4 != 0,
                vk,
                key_name: name,
            };
            let reparsed = parse_chord(&chord.to_string())
                .unwrap_or_else(|e| panic!("reparse {chord}: {e}"))
                .unwrap_or_else(|| panic!("{chord} parsed as unset"));
            assert_eq!(reparsed, chord, "round trip for {chord}");
        }
    }
}

#[test]
fn register_rejects_unset_and_invalid_chords() {
    let registry = HotkeyRegistry::new();
    assert!(!registry.register("a", "", || Ok(())));
    assert!(!registry.register("b", UNSET_CHORD, || Ok(())));
    assert!(!registry.register("c", "Ctrl+Bogus", || Ok(())));
    assert!(registry.is_empty());
}

#[test]
fn first_registered_wins_on_duplicate_chords() {
    let registry = HotkeyRegistry::new();
    let first = Arc::new(AtomicUsize::new(0));
    let second = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&first);
    registry.register("first", "Ctrl+G", move || {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });
    let counter = Arc::clone(&second);
    registry.register("second", "Ctrl+G", move || {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    registry.handle_event(&key_down(
        0x47,
        Modifiers {
            ctrl: true,
            alt: false,
            shift: false,
        },
    ));

    assert_eq!(first.load(Ordering::SeqCst), 1);
    assert_eq!(second.load(Ordering::SeqCst), 0);
}

#[test]
fn modifiers_must_match_exactly() {
    let registry = HotkeyRegistry::new();
    let fired = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&fired);
    registry.register("copy", "C", move || {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    // extra held modifier means no match
    registry.handle_event(&key_down(
        keys::VK_C,
        Modifiers {
            ctrl: true,
            alt: false,
            shift: false,
        },
    ));
    assert_eq!(fired.load(Ordering::SeqCst), 0);

    registry.handle_event(&key_down(keys::VK_C, Modifiers::default()));
    assert_eq!(fired.load(Ordering::SeqCst), 1);
}

#[test]
fn reregistering_replaces_in_place_and_keeps_order() {
    let registry = HotkeyRegistry::new();
    let log = Arc::new(std::sync::Mutex::new(Vec::new()));

    for (name, chord) in [("one", "F5"), ("two", "F6"), ("three", "F7")] {
        let log = Arc::clone(&log);
        registry.register(name, chord, move || {
            log.lock().unwrap().push(name);
            Ok(())
        });
    }
    // rebind the middle entry to a chord the first entry also claims;
    // its position (after "one") must be preserved
    let relog = Arc::clone(&log);
    registry.register("two", "F5", move || {
        relog.lock().unwrap().push("two-rebound");
        Ok(())
    });
    assert_eq!(registry.len(), 3);

    registry.handle_event(&key_down(0x74, Modifiers::default()));
    assert_eq!(log.lock().unwrap().as_slice(), &["one"]);
}

#[test]
fn callback_error_does_not_poison_later_events() {
    let registry = HotkeyRegistry::new();
    let fired = Arc::new(AtomicUsize::new(0));

    registry.register("broken", "F5", || anyhow::bail!("callback exploded"));
    let counter = Arc::clone(&fired);
    registry.register("ok", "F6", move || {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    registry.handle_event(&key_down(0x74, Modifiers::default()));
    registry.handle_event(&key_down(0x75, Modifiers::default()));
    assert_eq!(fired.load(Ordering::SeqCst), 1);
}

#[test]
fn key_up_never_fires_callbacks() {
    let registry = HotkeyRegistry::new();
    let fired = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&fired);
    registry.register("copy", "C", move || {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    registry.handle_event(&KeyEvent {
        direction: KeyDirection::Up,
        vk: keys::VK_C,
        modifiers: Modifiers::default(),
    });
    assert_eq!(fired.load(Ordering::SeqCst), 0);
}

#[test]
fn registry_attached_to_hook_fires_through_event_stream() {
    let hook = InputHookService::stub_running();
    let registry = HotkeyRegistry::new();
    registry.attach(&hook);

    let fired = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&fired);
    registry.register("copy", "Ctrl+C", move || {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    hook.process_event(&EventType::KeyPress(Key::ControlLeft));
    hook.process_event(&EventType::KeyPress(Key::KeyC));
    hook.process_event(&EventType::KeyRelease(Key::KeyC));
    hook.process_event(&EventType::KeyRelease(Key::ControlLeft));

    assert_eq!(fired.load(Ordering::SeqCst), 1);
}

#[test]
fn unregister_and_unregister_all() {
    let registry = HotkeyRegistry::new();
    registry.register("a", "F5", || Ok(()));
    registry.register("b", "F6", || Ok(()));
    registry.unregister("a");
    assert_eq!(registry.len(), 1);
    registry.unregister_all();
    assert!(registry.is_empty());
}
