//! Overlay state machine and panel content.
//!
//! `Collapsed` shows only the edge handle; `Expanded` shows the panel with
//! its tabs. Gestures on the handle expand, the close action or a tap
//! outside the panel collapses. Everything here runs on the control thread.

use super::gesture::{GestureKind, GesturePolicy};
use super::visibility::{OverlayMode, OverlayVisibilityCoordinator, OverlayVisibilityState};
use super::windows::WindowError;
use crate::capture::{CaptureError, PixelImage};
use std::future::Future;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelTab {
    Home,
    Chat,
    Settings,
}

impl std::str::FromStr for PanelTab {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "home" => Ok(PanelTab::Home),
            "chat" => Ok(PanelTab::Chat),
            "settings" => Ok(PanelTab::Settings),
            other => Err(format!("unknown tab: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadingStage {
    Idle,
    Uploading,
    Receiving,
}

const MESSAGE_SPACER: &str = "\n\n";

pub struct OverlayController {
    coordinator: OverlayVisibilityCoordinator,
    gestures: GesturePolicy,
    tab: PanelTab,
    last_capture: Option<PixelImage>,
    send_enabled: bool,
    transcript: String,
    quick_actions: Vec<String>,
    loading: LoadingStage,
    focusable: bool,
}

impl OverlayController {
    pub fn new(coordinator: OverlayVisibilityCoordinator, gestures: GesturePolicy) -> Self {
        Self {
            coordinator,
            gestures,
            tab: PanelTab::Home,
            last_capture: None,
            send_enabled: false,
            transcript: String::new(),
            quick_actions: Vec::new(),
            loading: LoadingStage::Idle,
            focusable: false,
        }
    }

    pub fn install(&mut self) -> Result<(), WindowError> {
        self.coordinator.install()
    }

    pub fn mode(&self) -> OverlayMode {
        self.coordinator.state().mode
    }

    pub fn visibility_state(&self) -> OverlayVisibilityState {
        self.coordinator.state()
    }

    /// Classify a finished touch on the handle and expand if it qualifies.
    /// Ignored while expanded.
    pub fn handle_gesture(&mut self, start_x: f32, end_x: f32) -> GestureKind {
        let kind = self.gestures.classify(start_x, end_x);
        if self.mode() == OverlayMode::Expanded {
            return kind;
        }
        log::debug!(
            "[OVERLAY] Gesture {:?} (start={}, end={})",
            kind,
            start_x,
            end_x
        );
        if kind.expands() {
            if let Err(e) = self.expand() {
                log::error!("[OVERLAY] Could not expand: {}", e);
            }
        }
        kind
    }

    pub fn expand(&mut self) -> Result<(), WindowError> {
        if self.mode() == OverlayMode::Expanded {
            return Ok(());
        }
        self.coordinator.show_panel()?;
        self.focusable = false;
        // Returning to the panel shows Home with the last capture, if any.
        self.tab = PanelTab::Home;
        Ok(())
    }

    /// Close action or a tap outside the panel.
    pub fn collapse(&mut self) {
        self.coordinator.show_handle();
        self.focusable = false;
    }

    pub fn tab(&self) -> PanelTab {
        self.tab
    }

    pub fn switch_tab(&mut self, tab: PanelTab) {
        if self.tab != tab {
            log::debug!("[OVERLAY] Tab {:?} -> {:?}", self.tab, tab);
        }
        self.tab = tab;
        // Chat and Settings have text inputs.
        self.set_focusable(tab != PanelTab::Home);
    }

    /// Capture with the overlay hidden; the result replaces the cached image.
    pub async fn capture_with<F, Fut>(&mut self, capture: F) -> Result<(), CaptureError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<PixelImage, CaptureError>>,
    {
        match self.coordinator.around_capture(capture).await {
            Ok(image) => {
                self.on_screenshot_captured(Some(image));
                Ok(())
            }
            Err(e) => {
                self.on_screenshot_captured(None);
                Err(e)
            }
        }
    }

    pub fn on_screenshot_captured(&mut self, image: Option<PixelImage>) {
        match &image {
            Some(image) => log::info!(
                "[OVERLAY] Showing capture {}x{}",
                image.width(),
                image.height()
            ),
            None => log::info!("[OVERLAY] Capture failed, clearing preview"),
        }
        self.last_capture = image;
        // A new capture has to be saved before it can be sent.
        self.send_enabled = false;
    }

    pub fn current_capture(&self) -> Option<&PixelImage> {
        self.last_capture.as_ref()
    }

    pub fn send_enabled(&self) -> bool {
        self.send_enabled
    }

    pub fn set_send_enabled(&mut self, enabled: bool) {
        self.send_enabled = enabled;
    }

    pub fn transcript(&self) -> &str {
        &self.transcript
    }

    pub fn append_chat_message(&mut self, message: &str) {
        if !self.transcript.is_empty() {
            self.transcript.push_str(MESSAGE_SPACER);
        }
        self.transcript.push_str(message);
    }

    pub fn reset_chat(&mut self) {
        self.transcript.clear();
        self.quick_actions.clear();
    }

    pub fn quick_actions(&self) -> &[String] {
        &self.quick_actions
    }

    pub fn set_quick_actions(&mut self, actions: Vec<String>) {
        self.quick_actions = actions;
    }

    pub fn loading(&self) -> LoadingStage {
        self.loading
    }

    pub fn show_loading(&mut self) {
        self.loading = LoadingStage::Uploading;
    }

    pub fn upload_complete(&mut self) {
        if self.loading == LoadingStage::Uploading {
            self.loading = LoadingStage::Receiving;
        }
    }

    pub fn hide_loading(&mut self) {
        self.loading = LoadingStage::Idle;
    }

    pub fn is_focusable(&self) -> bool {
        self.focusable
    }

    pub fn set_focusable(&mut self, focusable: bool) {
        if self.mode() != OverlayMode::Expanded {
            return;
        }
        self.focusable = focusable;
        self.coordinator.set_panel_focusable(focusable);
    }

    /// Hide everything while an external flow (permission prompt) runs.
    pub fn hide_for_external_flow(&mut self) -> OverlayVisibilityState {
        self.coordinator.hide()
    }

    pub fn restore_after_external_flow(&mut self, prior: OverlayVisibilityState) {
        self.coordinator.restore(prior);
    }

    pub fn remove_all(&mut self) {
        self.coordinator.remove_all();
    }
}
