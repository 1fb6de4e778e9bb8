use std::collections::HashSet;
use std::sync::{mpsc, Arc, Condvar, Mutex};
use std::thread;
use std::time::Duration;

use once_cell::sync::Lazy;
use rdev::EventType;

use crate::keys;

/// How long `ensure_started` waits for the spawned listener to report an
/// attach failure before assuming the hook is running. `rdev::listen`
/// returns immediately when the OS refuses the hook, so this only delays
/// the error path.
const ATTACH_GRACE: Duration = Duration::from_millis(150);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookLifecycle {
    Uninitialized,
    Starting,
    Running,
    Stopped,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyDirection {
    Down,
    Up,
}

/// Modifier state derived from the physically-pressed set, excluding the
/// key the event itself is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Modifiers {
    pub ctrl: bool,
    pub alt: bool,
    pub shift: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct KeyEvent {
    pub direction: KeyDirection,
    pub vk: u16,
    pub modifiers: Modifiers,
}

pub type Subscriber = Arc<dyn Fn(&KeyEvent) + Send + Sync>;

struct HookShared {
    lifecycle: Mutex<HookLifecycle>,
    lifecycle_changed: Condvar,
    pressed: Mutex<HashSet<u16>>,
    subscribers: Mutex<Vec<Subscriber>>,
}

/// Process-wide low-level keyboard hook. Tracks which keys the hardware
/// currently reports as held and fans events out to subscribers (the
/// hotkey registry). Cheap to clone; clones share one hook.
#[derive(Clone)]
pub struct InputHookService {
    shared: Arc<HookShared>,
}

static GLOBAL_HOOK: Lazy<InputHookService> = Lazy::new(InputHookService::new);

/// The one hook instance the process attaches. Tests build their own
/// detached instances instead.
pub fn global() -> InputHookService {
    GLOBAL_HOOK.clone()
}

impl InputHookService {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(HookShared {
                lifecycle: Mutex::new(HookLifecycle::Uninitialized),
                lifecycle_changed: Condvar::new(),
                pressed: Mutex::new(HashSet::new()),
                subscribers: Mutex::new(Vec::new()),
            }),
        }
    }

    /// A service pinned to `Running` that never attaches an OS hook.
    /// Drive it with [`process_event`](Self::process_event).
    pub fn stub_running() -> Self {
        let service = Self::new();
        *service.shared.lifecycle.lock().unwrap() = HookLifecycle::Running;
        service
    }

    /// Attach and start the OS hook if it is not already running. Safe to
    /// call repeatedly and from several threads; concurrent first callers
    /// share one attach attempt.
    ///
    /// Returns `false` when the OS refuses the hook (missing permissions,
    /// no display). A failed attempt is not cached: the lifecycle resets
    /// to `Uninitialized` and the next call retries from scratch.
    pub fn ensure_started(&self) -> bool {
        let mut lifecycle = self.shared.lifecycle.lock().unwrap();
        loop {
            match *lifecycle {
                HookLifecycle::Running => return true,
                HookLifecycle::Stopped => {
                    // listener thread is still attached, just muted
                    *lifecycle = HookLifecycle::Running;
                    return true;
                }
                HookLifecycle::Failed => {
                    *lifecycle = HookLifecycle::Uninitialized;
                    return false;
                }
                HookLifecycle::Starting => {
                    let (guard, timeout) = self
                        .shared
                        .lifecycle_changed
                        .wait_timeout(lifecycle, ATTACH_GRACE)
                        .unwrap();
                    lifecycle = guard;
                    if timeout.timed_out() && *lifecycle == HookLifecycle::Starting {
                        // no failure surfaced inside the grace window;
                        // treat the hook as running
                        *lifecycle = HookLifecycle::Running;
                        return true;
                    }
                }
                HookLifecycle::Uninitialized => {
                    *lifecycle = HookLifecycle::Starting;
                    let shared = Arc::clone(&self.shared);
                    tracing::debug!("attaching global keyboard hook");
                    thread::spawn(move || listener_main(shared));
                }
            }
        }
    }

    /// Mute the hook and forget all physically-held keys. The OS hook
    /// itself cannot be detached once installed; a later `ensure_started`
    /// re-arms dispatch.
    pub fn stop(&self) {
        let mut lifecycle = self.shared.lifecycle.lock().unwrap();
        if *lifecycle == HookLifecycle::Running {
            *lifecycle = HookLifecycle::Stopped;
        }
        self.shared.pressed.lock().unwrap().clear();
        tracing::debug!("keyboard hook stopped");
    }

    pub fn lifecycle(&self) -> HookLifecycle {
        *self.shared.lifecycle.lock().unwrap()
    }

    pub fn is_physically_down(&self, vk: u16) -> bool {
        self.shared.pressed.lock().unwrap().contains(&vk)
    }

    pub fn any_physically_down(&self, codes: &[u16]) -> bool {
        let pressed = self.shared.pressed.lock().unwrap();
        codes.iter().any(|vk| pressed.contains(vk))
    }

    /// Register an event subscriber. Subscribers run on the hook's
    /// dispatcher thread, never on the OS hook callback itself, and may
    /// re-enter the service (e.g. subscribe from inside a callback).
    pub fn subscribe(&self, subscriber: Subscriber) {
        self.shared.subscribers.lock().unwrap().push(subscriber);
    }

    /// Feed one event through the same tracking and notification steps
    /// the OS listener uses, synchronously. This is the seam tests drive
    /// instead of real hardware.
    pub fn process_event(&self, event: &EventType) {
        if let Some(key_event) = track(&self.shared, event) {
            notify(&self.shared, &key_event);
        }
    }
}

impl Default for InputHookService {
    fn default() -> Self {
        Self::new()
    }
}

fn listener_main(shared: Arc<HookShared>) {
    // The OS hook callback must return quickly, so it only updates the
    // pressed set and hands the typed event to a dispatcher thread; a
    // slow subscriber can never stall the hook or pressed-set tracking.
    let (queue, events) = mpsc::channel::<KeyEvent>();
    let notify_shared = Arc::clone(&shared);
    thread::spawn(move || {
        while let Ok(event) = events.recv() {
            notify(&notify_shared, &event);
        }
    });

    let track_shared = Arc::clone(&shared);
    let result = rdev::listen(move |event| {
        let lifecycle = *track_shared.lifecycle.lock().unwrap();
        if lifecycle != HookLifecycle::Running && lifecycle != HookLifecycle::Starting {
            return;
        }
        if let Some(key_event) = track(&track_shared, &event.event_type) {
            let _ = queue.send(key_event);
        }
    });

    // listen blocks for the life of the hook; reaching this point means
    // the attach failed or the hook was torn down by the OS
    if let Err(e) = result {
        tracing::warn!("global keyboard hook unavailable: {:?}", e);
    } else {
        tracing::warn!("global keyboard hook exited");
    }
    *shared.lifecycle.lock().unwrap() = HookLifecycle::Failed;
    shared.pressed.lock().unwrap().clear();
    shared.lifecycle_changed.notify_all();
}

/// Update the pressed set for one raw event and type it. Non-key events
/// and unmapped keys yield `None`.
fn track(shared: &HookShared, event_type: &EventType) -> Option<KeyEvent> {
    let (direction, key) = match event_type {
        EventType::KeyPress(k) => (KeyDirection::Down, *k),
        EventType::KeyRelease(k) => (KeyDirection::Up, *k),
        _ => return None,
    };
    let vk = keys::virtual_key_from_rdev(key)?;

    let modifiers = {
        let mut pressed = shared.pressed.lock().unwrap();
        match direction {
            KeyDirection::Down => {
                pressed.insert(vk);
            }
            KeyDirection::Up => {
                pressed.remove(&vk);
            }
        }
        modifiers_excluding(&pressed, vk)
    };

    Some(KeyEvent {
        direction,
        vk,
        modifiers,
    })
}

fn notify(shared: &HookShared, event: &KeyEvent) {
    // snapshot the list so a callback may subscribe without deadlocking
    // on the table lock
    let subscribers: Vec<Subscriber> = shared.subscribers.lock().unwrap().clone();
    for subscriber in &subscribers {
        subscriber(event);
    }
}

fn modifiers_excluding(pressed: &HashSet<u16>, except: u16) -> Modifiers {
    let mut modifiers = Modifiers::default();
    for &vk in pressed {
        if vk == except {
            continue;
        }
        modifiers.ctrl |= keys::is_control_code(vk);
        modifiers.alt |= keys::is_alt_code(vk);
        modifiers.shift |= keys::is_shift_code(vk);
    }
    modifiers
}
