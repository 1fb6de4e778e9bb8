use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Two levels of always-on-top priority. Every tracked overlay window
/// sits at `Baseline`; at most one is `Elevated` at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Baseline,
    Elevated,
}

/// Opaque native window handle (HWND on Windows).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowHandle(pub isize);

/// Applies a tier to a native window. The coordinator always applies the
/// elevated window last, so a backend that simply raises within the
/// topmost band preserves the ordering.
pub trait ZOrderBackend {
    fn apply(&self, handle: WindowHandle, tier: Tier) -> anyhow::Result<()>;
}

pub struct SystemZOrder;

#[cfg(target_os = "windows")]
impl ZOrderBackend for SystemZOrder {
    fn apply(&self, handle: WindowHandle, _tier: Tier) -> anyhow::Result<()> {
        use windows::Win32::Foundation::HWND;
        use windows::Win32::UI::WindowsAndMessaging::{
            SetWindowPos, HWND_TOPMOST, SWP_NOACTIVATE, SWP_NOMOVE, SWP_NOSIZE,
        };

        unsafe {
            SetWindowPos(
                HWND(handle.0 as *mut core::ffi::c_void),
                HWND_TOPMOST,
                0,
                0,
                0,
                0,
                SWP_NOMOVE | SWP_NOSIZE | SWP_NOACTIVATE,
            )?;
        }
        Ok(())
    }
}

#[cfg(not(target_os = "windows"))]
impl ZOrderBackend for SystemZOrder {
    fn apply(&self, _handle: WindowHandle, _tier: Tier) -> anyhow::Result<()> {
        Ok(())
    }
}

struct ZState {
    windows: Vec<(String, WindowHandle)>,
    active: Option<String>,
    dragging: Option<String>,
    settle_until: Option<Instant>,
}

/// Keeps a set of named always-on-top overlay windows ordered against a
/// foreign fullscreen application: every window asserts the baseline
/// tier, the active one is elevated above its siblings, and all z-order
/// churn is suppressed while the user drags a window around.
pub struct ZOrderCoordinator<B: ZOrderBackend> {
    backend: B,
    settle: Duration,
    state: Mutex<ZState>,
}

impl<B: ZOrderBackend> ZOrderCoordinator<B> {
    pub fn new(backend: B) -> Self {
        Self::with_settle(backend, Duration::from_millis(250))
    }

    /// `settle` is how long z-order changes stay suppressed after a drag
    /// ends, so the final drop does not jitter.
    pub fn with_settle(backend: B, settle: Duration) -> Self {
        Self {
            backend,
            settle,
            state: Mutex::new(ZState {
                windows: Vec::new(),
                active: None,
                dragging: None,
                settle_until: None,
            }),
        }
    }

    /// Track a window and assert its baseline tier. Re-registering a
    /// name replaces its handle.
    pub fn register_window(&self, name: &str, handle: WindowHandle) {
        {
            let mut state = self.state.lock().unwrap();
            if let Some(slot) = state.windows.iter_mut().find(|(n, _)| n == name) {
                slot.1 = handle;
            } else {
                state.windows.push((name.to_string(), handle));
            }
        }
        self.apply(name, handle, Tier::Baseline);
    }

    pub fn unregister_window(&self, name: &str) {
        let mut state = self.state.lock().unwrap();
        state.windows.retain(|(n, _)| n != name);
        if state.active.as_deref() == Some(name) {
            state.active = None;
        }
        if state.dragging.as_deref() == Some(name) {
            state.dragging = None;
        }
    }

    /// Make `name` the elevated window: all siblings drop to baseline,
    /// then the target is raised. Returns `false` when the window is
    /// unknown or a drag is holding z-order changes back.
    pub fn set_active(&self, name: &str) -> bool {
        let plan = {
            let mut state = self.state.lock().unwrap();
            if suppressed(&state) {
                tracing::debug!(name, "drag in progress; z-order change suppressed");
                return false;
            }
            let Some(&(_, target)) = state.windows.iter().find(|(n, _)| n == name) else {
                tracing::debug!(name, "unknown overlay window");
                return false;
            };
            let siblings: Vec<(String, WindowHandle)> = state
                .windows
                .iter()
                .filter(|(n, _)| n != name)
                .cloned()
                .collect();
            state.active = Some(name.to_string());
            (siblings, target)
        };

        for (sibling, handle) in &plan.0 {
            self.apply(sibling, *handle, Tier::Baseline);
        }
        self.apply(name, plan.1, Tier::Elevated);
        true
    }

    /// Explicit front-request, e.g. the user pointer-downed the window.
    pub fn bring_to_front(&self, name: &str) -> bool {
        tracing::debug!(name, "bring-to-front requested");
        self.set_active(name)
    }

    pub fn begin_drag(&self, name: &str) {
        let mut state = self.state.lock().unwrap();
        if !state.windows.iter().any(|(n, _)| n == name) {
            tracing::debug!(name, "unknown overlay window; drag ignored");
            return;
        }
        state.dragging = Some(name.to_string());
    }

    pub fn end_drag(&self) {
        let mut state = self.state.lock().unwrap();
        state.dragging = None;
        state.settle_until = Some(Instant::now() + self.settle);
    }

    pub fn active(&self) -> Option<String> {
        self.state.lock().unwrap().active.clone()
    }

    /// Re-assert topmost status for every window after the foreign
    /// application reclaimed it (some platforms let a fullscreen app
    /// climb above all topmost windows when it takes foreground focus).
    pub fn reassert(&self) {
        let plan = {
            let state = self.state.lock().unwrap();
            if suppressed(&state) {
                return;
            }
            let windows = state.windows.clone();
            let active = state.active.clone();
            (windows, active)
        };

        for (name, handle) in &plan.0 {
            if Some(name) != plan.1.as_ref() {
                self.apply(name, *handle, Tier::Baseline);
            }
        }
        if let Some(active) = &plan.1 {
            if let Some(&(_, handle)) = plan.0.iter().find(|(n, _)| n == active) {
                self.apply(active, handle, Tier::Elevated);
            }
        }
    }

    fn apply(&self, name: &str, handle: WindowHandle, tier: Tier) {
        if let Err(e) = self.backend.apply(handle, tier) {
            tracing::warn!(name, ?tier, error = %e, "failed to apply z-order tier");
        }
    }
}

fn suppressed(state: &ZState) -> bool {
    if state.dragging.is_some() {
        return true;
    }
    match state.settle_until {
        Some(deadline) => Instant::now() < deadline,
        None => false,
    }
}
