//! Keeps the overlay out of its own screenshots.
//!
//! The coordinator is the only owner of the overlay windows and of the
//! visibility flags, and it lives on the control thread. Around every
//! capture it hides everything and puts the previous state back on every
//! exit path: success, error, panic, or the capture future being dropped.

use super::windows::{OverlayWindows, WindowError};
use crate::capture::{CaptureError, PixelImage};
use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayMode {
    Collapsed,
    Expanded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Visible,
    Hidden,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverlayVisibilityState {
    pub mode: OverlayMode,
    pub visibility: Visibility,
}

pub struct OverlayVisibilityCoordinator {
    windows: Box<dyn OverlayWindows>,
    state: OverlayVisibilityState,
    hide_settle: Duration,
}

impl OverlayVisibilityCoordinator {
    /// `hide_settle` is how long to wait after hiding before capturing, so
    /// the compositor has dropped the overlay from the frame.
    pub fn new(windows: Box<dyn OverlayWindows>, hide_settle: Duration) -> Self {
        Self {
            windows,
            state: OverlayVisibilityState {
                mode: OverlayMode::Collapsed,
                visibility: Visibility::Visible,
            },
            hide_settle,
        }
    }

    /// Put the collapsed handle on screen.
    pub fn install(&mut self) -> Result<(), WindowError> {
        self.windows.attach_handle()?;
        self.apply();
        Ok(())
    }

    pub fn state(&self) -> OverlayVisibilityState {
        self.state
    }

    /// Collapsed → Expanded: add the panel, hide the handle.
    pub fn show_panel(&mut self) -> Result<(), WindowError> {
        if self.state.mode == OverlayMode::Expanded {
            return Ok(());
        }
        self.windows.attach_panel()?;
        self.state.mode = OverlayMode::Expanded;
        self.apply();
        Ok(())
    }

    /// Expanded → Collapsed: remove the panel, bring the handle back.
    pub fn show_handle(&mut self) {
        if self.state.mode == OverlayMode::Collapsed {
            return;
        }
        self.windows.detach_panel();
        self.state.mode = OverlayMode::Collapsed;
        self.apply();
    }

    pub fn set_panel_focusable(&mut self, focusable: bool) {
        if self.state.mode == OverlayMode::Expanded {
            self.windows.set_panel_focusable(focusable);
        }
    }

    /// Hide every overlay surface. Returns the state to hand to `restore`.
    pub fn hide(&mut self) -> OverlayVisibilityState {
        let prior = self.state;
        self.state.visibility = Visibility::Hidden;
        self.apply();
        prior
    }

    pub fn restore(&mut self, prior: OverlayVisibilityState) {
        if prior.mode != self.state.mode {
            log::warn!(
                "[OVERLAY] Mode changed while hidden ({:?} -> {:?}); keeping current mode",
                prior.mode,
                self.state.mode
            );
        }
        self.state.visibility = prior.visibility;
        self.apply();
    }

    /// Runs `capture` with the overlay hidden and restores it afterwards.
    pub async fn around_capture<F, Fut>(&mut self, capture: F) -> Result<PixelImage, CaptureError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<PixelImage, CaptureError>>,
    {
        let settle = self.hide_settle;
        let scope = HiddenScope::enter(self);
        if !settle.is_zero() {
            tokio::time::sleep(settle).await;
        }
        let outcome = capture().await;
        drop(scope);
        outcome
    }

    pub fn remove_all(&mut self) {
        self.windows.remove_all();
    }

    fn apply(&mut self) {
        let visible = self.state.visibility == Visibility::Visible;
        match self.state.mode {
            OverlayMode::Collapsed => {
                self.windows.set_handle_visible(visible);
            }
            OverlayMode::Expanded => {
                self.windows.set_handle_visible(false);
                self.windows.set_panel_visible(visible);
            }
        }
    }
}

/// Overlay stays hidden while this lives.
struct HiddenScope<'a> {
    coordinator: &'a mut OverlayVisibilityCoordinator,
    prior: OverlayVisibilityState,
}

impl<'a> HiddenScope<'a> {
    fn enter(coordinator: &'a mut OverlayVisibilityCoordinator) -> Self {
        let prior = coordinator.hide();
        log::debug!("[OVERLAY] Hidden for capture (was {:?})", prior);
        Self { coordinator, prior }
    }
}

impl Drop for HiddenScope<'_> {
    fn drop(&mut self) {
        self.coordinator.restore(self.prior);
        log::debug!("[OVERLAY] Restored to {:?}", self.prior);
    }
}
