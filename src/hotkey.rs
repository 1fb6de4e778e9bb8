use std::fmt;
use std::sync::{Arc, Mutex};

use anyhow::anyhow;

use crate::hook::{InputHookService, KeyDirection, KeyEvent};
use crate::keys;

/// Settings value meaning "this feature has no hotkey". Parses to
/// `Ok(None)` rather than an error.
pub const UNSET_CHORD: &str = "Not Set";

/// A parsed modifier-key combination, e.g. `Ctrl+Alt+C`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chord {
    pub ctrl: bool,
    pub alt: bool,
    pub shift: bool,
    pub vk: u16,
    pub key_name: &'static str,
}

impl fmt::Display for Chord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.ctrl {
            write!(f, "Ctrl+")?;
        }
        if self.alt {
            write!(f, "Alt+")?;
        }
        if self.shift {
            write!(f, "Shift+")?;
        }
        write!(f, "{}", self.key_name)
    }
}

/// Parse a chord string like `"Ctrl+Shift+F2"`.
///
/// The empty string and the [`UNSET_CHORD`] sentinel mean "no hotkey" and
/// parse to `Ok(None)`. An unknown primary key name, a string with
/// modifiers but no primary key, and more than one primary key are all
/// errors.
pub fn parse_chord(s: &str) -> anyhow::Result<Option<Chord>> {
    let trimmed = s.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case(UNSET_CHORD) {
        return Ok(None);
    }

    let mut ctrl = false;
    let mut alt = false;
    let mut shift = false;
    let mut primary: Option<(u16, &'static str)> = None;

    for part in trimmed.split('+') {
        let token = part.trim();
        if token.is_empty() {
            continue;
        }
        if token.eq_ignore_ascii_case("ctrl") || token.eq_ignore_ascii_case("control") {
            ctrl = true;
        } else if token.eq_ignore_ascii_case("alt") {
            alt = true;
        } else if token.eq_ignore_ascii_case("shift") {
            shift = true;
        } else {
            let (vk, name) = keys::virtual_key_from_name(token)
                .ok_or_else(|| anyhow!("unknown key '{token}' in hotkey '{s}'"))?;
            if primary.is_some() {
                return Err(anyhow!("hotkey '{s}' has more than one primary key"));
            }
            primary = Some((vk, name));
        }
    }

    let (vk, key_name) = primary.ok_or_else(|| anyhow!("hotkey '{s}' has no primary key"))?;
    Ok(Some(Chord {
        ctrl,
        alt,
        shift,
        vk,
        key_name,
    }))
}

pub type HotkeyCallback = Arc<dyn Fn() -> anyhow::Result<()> + Send + Sync>;

struct Registration {
    name: String,
    chord: Chord,
    callback: HotkeyCallback,
}

/// Ordered table of named hotkeys. Matching is first-registered-wins:
/// for each physical key-down, the earliest registration whose modifier
/// bits and key code equal the event's fires, and nothing else does.
#[derive(Clone, Default)]
pub struct HotkeyRegistry {
    entries: Arc<Mutex<Vec<Registration>>>,
}

impl HotkeyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe this registry to a hook's event stream.
    pub fn attach(&self, hook: &InputHookService) {
        let registry = self.clone();
        hook.subscribe(Arc::new(move |event| registry.handle_event(event)));
    }

    /// Register `chord` under `name`. Re-registering an existing name
    /// replaces its chord and callback in place without disturbing the
    /// order of other entries.
    ///
    /// Returns `false` (and logs) for an empty/unset/unparseable chord.
    pub fn register<F>(&self, name: &str, chord: &str, callback: F) -> bool
    where
        F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let parsed = match parse_chord(chord) {
            Ok(Some(parsed)) => parsed,
            Ok(None) => {
                tracing::warn!(name, "no hotkey configured; not registering");
                return false;
            }
            Err(e) => {
                tracing::warn!(name, error = %e, "invalid hotkey; not registering");
                return false;
            }
        };

        let mut entries = self.entries.lock().unwrap();
        if let Some(existing) = entries.iter().find(|r| r.name != name && r.chord == parsed) {
            // permitted, but the earlier registration will shadow this one
            tracing::debug!(
                chord = %parsed,
                first = %existing.name,
                shadowed = name,
                "hotkey chord registered twice"
            );
        }
        let registration = Registration {
            name: name.to_string(),
            chord: parsed,
            callback: Arc::new(callback),
        };
        if let Some(slot) = entries.iter_mut().find(|r| r.name == name) {
            *slot = registration;
        } else {
            entries.push(registration);
        }
        tracing::debug!(name, chord = %parsed, "hotkey registered");
        true
    }

    pub fn unregister(&self, name: &str) {
        self.entries.lock().unwrap().retain(|r| r.name != name);
    }

    pub fn unregister_all(&self) {
        self.entries.lock().unwrap().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().unwrap().is_empty()
    }

    /// Match one hook event against the table. Only key-down events can
    /// fire, modifier bits must be exactly equal (not "at least"), and at
    /// most one callback runs per event.
    pub fn handle_event(&self, event: &KeyEvent) {
        if event.direction != KeyDirection::Down {
            return;
        }

        let matched = {
            let entries = self.entries.lock().unwrap();
            entries
                .iter()
                .find(|r| {
                    r.chord.vk == event.vk
                        && r.chord.ctrl == event.modifiers.ctrl
                        && r.chord.alt == event.modifiers.alt
                        && r.chord.shift == event.modifiers.shift
                })
                .map(|r| (r.name.clone(), Arc::clone(&r.callback)))
        };

        // invoke outside the table lock so a callback may re-register
        if let Some((name, callback)) = matched {
            tracing::debug!(name = %name, "hotkey fired");
            if let Err(e) = callback() {
                tracing::warn!(name = %name, error = %e, "hotkey callback failed");
            }
        }
    }
}
