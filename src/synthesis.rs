use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::hook::InputHookService;
use crate::keys;
use crate::keys::{VK_ALT, VK_C, VK_CONTROL};

/// Timing for synthetic key sequences, in milliseconds. The foreign
/// application polls its input queue; events fired back-to-back collapse
/// into one observed state, so each transition gets settling time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HoldDurations {
    /// Pause after each synthetic modifier transition.
    pub modifier_down_delay: u64,
    /// How long the primary key stays down when it was not already held.
    pub key_hold: u64,
    /// Pause before releasing modifiers, so the chord registers first.
    pub unwind_delay: u64,
}

impl Default for HoldDurations {
    fn default() -> Self {
        Self {
            modifier_down_delay: 10,
            key_hold: 30,
            unwind_delay: 50,
        }
    }
}

/// Per-call overrides merged onto [`HoldDurations`]; unset fields keep
/// the default.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct HoldOverrides {
    pub modifier_down_delay: Option<u64>,
    pub key_hold: Option<u64>,
    pub unwind_delay: Option<u64>,
}

impl HoldOverrides {
    pub fn apply_to(&self, base: HoldDurations) -> HoldDurations {
        HoldDurations {
            modifier_down_delay: self.modifier_down_delay.unwrap_or(base.modifier_down_delay),
            key_hold: self.key_hold.unwrap_or(base.key_hold),
            unwind_delay: self.unwind_delay.unwrap_or(base.unwind_delay),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TriggerOptions {
    pub include_alt: bool,
    pub hold: HoldOverrides,
}

impl Default for TriggerOptions {
    fn default() -> Self {
        Self {
            include_alt: true,
            hold: HoldOverrides::default(),
        }
    }
}

/// Where synthetic events go. The system sink injects real OS input;
/// tests substitute a recorder.
pub trait KeySink {
    fn key_down(&self, vk: u16) -> anyhow::Result<()>;
    fn key_up(&self, vk: u16) -> anyhow::Result<()>;
}

pub struct SystemKeySink;

#[cfg(target_os = "windows")]
impl KeySink for SystemKeySink {
    fn key_down(&self, vk: u16) -> anyhow::Result<()> {
        send_input(vk, false)
    }

    fn key_up(&self, vk: u16) -> anyhow::Result<()> {
        send_input(vk, true)
    }
}

#[cfg(target_os = "windows")]
fn send_input(vk: u16, up: bool) -> anyhow::Result<()> {
    use windows::Win32::UI::Input::KeyboardAndMouse::{
        SendInput, INPUT, INPUT_0, INPUT_KEYBOARD, KEYBDINPUT, KEYBD_EVENT_FLAGS, KEYEVENTF_KEYUP,
        VIRTUAL_KEY,
    };

    let flags = if up {
        KEYEVENTF_KEYUP
    } else {
        KEYBD_EVENT_FLAGS(0)
    };
    unsafe {
        let input = INPUT {
            r#type: INPUT_KEYBOARD,
            Anonymous: INPUT_0 {
                ki: KEYBDINPUT {
                    wVk: VIRTUAL_KEY(vk),
                    wScan: 0,
                    dwFlags: flags,
                    time: 0,
                    dwExtraInfo: 0,
                },
            },
        };
        let sent = SendInput(&[input], std::mem::size_of::<INPUT>() as i32);
        if sent == 0 {
            anyhow::bail!("SendInput returned 0 for vk 0x{vk:02X}");
        }
    }
    Ok(())
}

#[cfg(not(target_os = "windows"))]
impl KeySink for SystemKeySink {
    fn key_down(&self, vk: u16) -> anyhow::Result<()> {
        simulate_rdev(vk, false)
    }

    fn key_up(&self, vk: u16) -> anyhow::Result<()> {
        simulate_rdev(vk, true)
    }
}

#[cfg(not(target_os = "windows"))]
fn simulate_rdev(vk: u16, up: bool) -> anyhow::Result<()> {
    let key = keys::rdev_key_from_virtual(vk)
        .ok_or_else(|| anyhow::anyhow!("no simulatable key for vk 0x{vk:02X}"))?;
    let event = if up {
        rdev::EventType::KeyRelease(key)
    } else {
        rdev::EventType::KeyPress(key)
    };
    rdev::simulate(&event).map_err(|e| anyhow::anyhow!("simulate failed: {e:?}"))
}

/// Produces a synthetic modifier chord (default Ctrl+Alt+C) without
/// disturbing keys the user is physically holding and without leaving
/// anything stuck down on failure.
pub struct SynthesisEngine<S: KeySink> {
    hook: InputHookService,
    sink: S,
    defaults: HoldDurations,
}

impl<S: KeySink> SynthesisEngine<S> {
    pub fn new(hook: InputHookService, sink: S) -> Self {
        Self {
            hook,
            sink,
            defaults: HoldDurations::default(),
        }
    }

    pub fn with_defaults(mut self, defaults: HoldDurations) -> Self {
        self.defaults = defaults;
        self
    }

    /// Fire the copy chord the foreign application binds to
    /// clipboard-copy: Ctrl+C, with Alt unless the options exclude it.
    pub fn send_copy_chord(&self, options: &TriggerOptions) -> bool {
        self.send_chord(VK_C, options)
    }

    /// Run the minimal-perturbation protocol for `vk`:
    ///
    /// 1. skip any modifier the user already holds physically
    /// 2. press the missing modifiers, recording each in a ledger
    /// 3. edge-trigger the primary key (up+down if the user holds it,
    ///    down/hold/up otherwise)
    /// 4. wait out the unwind delay, then release ledger entries in
    ///    reverse order
    ///
    /// Returns `false` without emitting anything when the hook cannot be
    /// started. On a mid-sequence error every ledger entry not yet
    /// released is released best-effort before `false` is returned, so a
    /// modifier this call pressed is never left down and a modifier the
    /// user holds is never released.
    pub fn send_chord(&self, vk: u16, options: &TriggerOptions) -> bool {
        if !self.hook.ensure_started() {
            tracing::warn!("input hook unavailable; chord not synthesized");
            return false;
        }

        let hold = options.hold.apply_to(self.defaults);
        let mut ledger: Vec<u16> = Vec::new();
        match self.run_sequence(vk, options, hold, &mut ledger) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, "chord synthesis failed; unwinding");
                for &modifier in ledger.iter().rev() {
                    if let Err(release_err) = self.sink.key_up(modifier) {
                        tracing::debug!(
                            vk = modifier,
                            error = %release_err,
                            "modifier release failed during unwind"
                        );
                    }
                }
                false
            }
        }
    }

    fn run_sequence(
        &self,
        vk: u16,
        options: &TriggerOptions,
        hold: HoldDurations,
        ledger: &mut Vec<u16>,
    ) -> anyhow::Result<()> {
        if !self.hook.any_physically_down(keys::CONTROL_CODES) {
            self.sink.key_down(VK_CONTROL)?;
            ledger.push(VK_CONTROL);
            pause(hold.modifier_down_delay);
        }

        if options.include_alt && !self.hook.any_physically_down(keys::ALT_CODES) {
            self.sink.key_down(VK_ALT)?;
            ledger.push(VK_ALT);
            pause(hold.modifier_down_delay);
        }

        if self.hook.is_physically_down(vk) {
            // the user is holding the key; force a fresh edge so the
            // foreign app sees a new chord activation
            self.sink.key_up(vk)?;
            pause(hold.modifier_down_delay);
            self.sink.key_down(vk)?;
            pause(hold.modifier_down_delay);
        } else {
            self.sink.key_down(vk)?;
            pause(hold.key_hold);
            self.sink.key_up(vk)?;
        }

        pause(hold.unwind_delay);

        while let Some(&modifier) = ledger.last() {
            self.sink.key_up(modifier)?;
            ledger.pop();
            pause(hold.modifier_down_delay);
        }
        Ok(())
    }
}

fn pause(ms: u64) {
    if ms > 0 {
        thread::sleep(Duration::from_millis(ms));
    }
}
