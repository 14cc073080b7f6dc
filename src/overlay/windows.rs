//! Overlay window seam.
//!
//! The overlay consists of two platform windows: a small handle docked to
//! the screen edge and a full-screen panel. Only the control thread may
//! call into an `OverlayWindows` implementation.

use std::sync::{Arc, Mutex};

pub trait OverlayWindows: Send {
    fn attach_handle(&mut self) -> Result<(), WindowError>;
    fn set_handle_visible(&mut self, visible: bool);
    fn attach_panel(&mut self) -> Result<(), WindowError>;
    fn detach_panel(&mut self);
    fn set_panel_visible(&mut self, visible: bool);
    fn set_panel_focusable(&mut self, focusable: bool);
    fn remove_all(&mut self);
}

#[derive(Debug, thiserror::Error)]
pub enum WindowError {
    #[error("Overlay window could not be added: {0}")]
    AttachFailed(String),
}

/// What is currently on screen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WindowSnapshot {
    pub handle_attached: bool,
    pub handle_visible: bool,
    pub panel_attached: bool,
    pub panel_visible: bool,
    pub panel_focusable: bool,
}

impl WindowSnapshot {
    /// True when nothing of the overlay can end up in a capture.
    pub fn nothing_on_screen(&self) -> bool {
        !(self.handle_attached && self.handle_visible) && !(self.panel_attached && self.panel_visible)
    }
}

/// Read-only view of a `HeadlessWindows`' state, usable from any thread.
#[derive(Debug, Clone, Default)]
pub struct WindowProbe {
    snapshot: Arc<Mutex<WindowSnapshot>>,
}

impl WindowProbe {
    pub fn snapshot(&self) -> WindowSnapshot {
        match self.snapshot.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

/// Window implementation without a display server: keeps the state in
/// memory and logs every change.
#[derive(Debug, Default)]
pub struct HeadlessWindows {
    probe: WindowProbe,
}

impl HeadlessWindows {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn probe(&self) -> WindowProbe {
        self.probe.clone()
    }

    fn update(&self, change: impl FnOnce(&mut WindowSnapshot)) {
        let mut guard = match self.probe.snapshot.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        change(&mut *guard);
        log::debug!("[OVERLAY] Windows now {:?}", *guard);
    }
}

impl OverlayWindows for HeadlessWindows {
    fn attach_handle(&mut self) -> Result<(), WindowError> {
        self.update(|s| {
            if !s.handle_attached {
                s.handle_attached = true;
                s.handle_visible = true;
            }
        });
        Ok(())
    }

    fn set_handle_visible(&mut self, visible: bool) {
        self.update(|s| s.handle_visible = visible);
    }

    fn attach_panel(&mut self) -> Result<(), WindowError> {
        self.update(|s| {
            s.panel_attached = true;
            s.panel_visible = true;
            s.panel_focusable = false;
        });
        Ok(())
    }

    fn detach_panel(&mut self) {
        self.update(|s| {
            s.panel_attached = false;
            s.panel_visible = false;
            s.panel_focusable = false;
        });
    }

    fn set_panel_visible(&mut self, visible: bool) {
        self.update(|s| s.panel_visible = visible);
    }

    fn set_panel_focusable(&mut self, focusable: bool) {
        self.update(|s| {
            if s.panel_attached {
                s.panel_focusable = focusable;
            }
        });
    }

    fn remove_all(&mut self) {
        self.update(|s| *s = WindowSnapshot::default());
    }
}
