//! Control thread: owns the overlay and reacts to events.
//!
//! Everything that touches overlay state runs here, one event at a time.
//! Slow work (capture on the worker thread, disk writes, assistant calls)
//! runs elsewhere and reports back as another `ControlEvent`.

use crate::assistant::{split_options, Assistant, AssistantError};
use crate::capture::platform::MirrorBackend;
use crate::capture::{
    build_surface, CaptureSession, CaptureWorker, GrantToken, ProjectionGrant,
};
use crate::config::AppConfig;
use crate::overlay::{
    OverlayController, OverlayVisibilityCoordinator, OverlayVisibilityState, OverlayWindows,
    PanelTab, WindowError,
};
use crate::persistence::{PersistenceError, ScreenshotStore};
use crate::settings::{SettingsStore, SettingsUpdate};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Debug)]
pub enum ControlEvent {
    HandleGesture { start_x: f32, end_x: f32 },
    PanelClosed,
    OutsideTap,
    SwitchTab(PanelTab),
    CaptureRequested,
    SaveRequested,
    SaveFinished(Result<PathBuf, PersistenceError>),
    SendRequested,
    UploadComplete { session: u64 },
    AssistantReply { session: u64, result: Result<String, AssistantError> },
    ChatMessage(String),
    ChatReply { session: u64, result: Result<String, AssistantError> },
    /// Send the quick action at this index (0-based) as a follow-up.
    QuickAction(usize),
    /// Outcome of the external authorization flow.
    PermissionResult(GrantToken),
    /// The user stopped sharing from the system UI.
    StopProjection,
    /// Fired by the grant's revocation callback.
    GrantRevoked,
    UpdateSettings(SettingsUpdate),
    HealthCheck,
    HealthCheckFinished(Result<(), AssistantError>),
    Shutdown,
}

/// Cloneable sender for control events.
#[derive(Debug, Clone)]
pub struct ServiceHandle {
    tx: mpsc::UnboundedSender<ControlEvent>,
}

impl ServiceHandle {
    /// Returns false once the service has stopped.
    pub fn send(&self, event: ControlEvent) -> bool {
        self.tx.send(event).is_ok()
    }
}

/// User-facing output: short toasts plus the chat panel's content.
pub trait Notifier: Send + Sync {
    fn notify(&self, message: &str);

    /// A line appended to the chat transcript.
    fn chat_line(&self, line: &str) {
        self.notify(line);
    }

    /// Quick actions offered under the latest reply, in pick order.
    fn quick_actions(&self, options: &[String]) {
        if options.is_empty() {
            return;
        }
        let listed: Vec<String> = options
            .iter()
            .enumerate()
            .map(|(i, option)| format!("[{}] {}", i + 1, option))
            .collect();
        self.notify(&format!("Quick actions: {}", listed.join("  ")));
    }
}

/// Starts the platform's screen capture authorization. The result must
/// come back as `ControlEvent::PermissionResult`.
pub trait PermissionRequester: Send + Sync {
    fn request(&self, events: ServiceHandle);
}

pub struct ServiceDeps {
    pub backend: Arc<dyn MirrorBackend>,
    pub windows: Box<dyn OverlayWindows>,
    pub assistant: Option<Arc<dyn Assistant>>,
    pub settings: SettingsStore,
    pub store: Arc<dyn ScreenshotStore>,
    pub notifier: Arc<dyn Notifier>,
    pub permissions: Box<dyn PermissionRequester>,
}

/// Grant plus the worker capturing under it.
struct ActiveCapture {
    grant: ProjectionGrant,
    worker: CaptureWorker,
}

pub struct OverlayService {
    config: AppConfig,
    backend: Arc<dyn MirrorBackend>,
    controller: OverlayController,
    assistant: Option<Arc<dyn Assistant>>,
    settings: SettingsStore,
    store: Arc<dyn ScreenshotStore>,
    notifier: Arc<dyn Notifier>,
    permissions: Box<dyn PermissionRequester>,
    capture: Option<ActiveCapture>,
    /// Overlay state to restore once the permission flow reports back.
    awaiting_permission: Option<OverlayVisibilityState>,
    /// Bumped on every send so replies from an older conversation are dropped.
    session: u64,
    rx: mpsc::UnboundedReceiver<ControlEvent>,
    handle: ServiceHandle,
}

impl OverlayService {
    pub fn new(config: AppConfig, deps: ServiceDeps) -> (Self, ServiceHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = ServiceHandle { tx };

        let coordinator = OverlayVisibilityCoordinator::new(deps.windows, config.hide_settle);
        let controller = OverlayController::new(coordinator, config.gestures);

        let service = Self {
            backend: deps.backend,
            controller,
            assistant: deps.assistant,
            settings: deps.settings,
            store: deps.store,
            notifier: deps.notifier,
            permissions: deps.permissions,
            capture: None,
            awaiting_permission: None,
            session: 0,
            rx,
            handle: handle.clone(),
            config,
        };
        service.configure_assistant();
        (service, handle)
    }

    pub fn handle(&self) -> ServiceHandle {
        self.handle.clone()
    }

    pub fn controller(&self) -> &OverlayController {
        &self.controller
    }

    pub fn has_active_grant(&self) -> bool {
        self.capture.as_ref().is_some_and(|c| c.grant.is_active())
    }

    /// Put the overlay handle on screen.
    pub fn install(&mut self) -> Result<(), WindowError> {
        self.controller.install()
    }

    /// Install the overlay and process events until `Shutdown`.
    pub async fn run(mut self) -> Result<(), WindowError> {
        self.install()?;
        log::info!("[OVERLAY] Service started");
        while self.pump().await {}
        self.shutdown().await;
        Ok(())
    }

    /// Handle the next queued event. Returns false on `Shutdown`.
    pub async fn pump(&mut self) -> bool {
        match self.rx.recv().await {
            Some(event) => self.dispatch(event).await,
            None => false,
        }
    }

    async fn dispatch(&mut self, event: ControlEvent) -> bool {
        log::debug!("[OVERLAY] Event {:?}", event);
        match event {
            ControlEvent::HandleGesture { start_x, end_x } => {
                self.controller.handle_gesture(start_x, end_x);
            }
            ControlEvent::PanelClosed | ControlEvent::OutsideTap => self.controller.collapse(),
            ControlEvent::SwitchTab(tab) => self.controller.switch_tab(tab),
            ControlEvent::CaptureRequested => self.on_capture_requested().await,
            ControlEvent::SaveRequested => self.on_save_requested(),
            ControlEvent::SaveFinished(result) => self.on_save_finished(result),
            ControlEvent::SendRequested => self.on_send_requested(),
            ControlEvent::UploadComplete { session } => {
                if session == self.session {
                    self.controller.upload_complete();
                }
            }
            ControlEvent::AssistantReply { session, result } => {
                self.on_assistant_reply(session, result)
            }
            ControlEvent::ChatMessage(text) => self.on_chat_message(text),
            ControlEvent::ChatReply { session, result } => self.on_chat_reply(session, result),
            ControlEvent::QuickAction(index) => self.on_quick_action(index),
            ControlEvent::PermissionResult(token) => self.on_permission_result(token).await,
            ControlEvent::StopProjection => {
                if let Some(active) = &self.capture {
                    active.grant.revoke();
                }
            }
            ControlEvent::GrantRevoked => self.on_grant_revoked().await,
            ControlEvent::UpdateSettings(update) => self.on_update_settings(update),
            ControlEvent::HealthCheck => self.on_health_check(),
            ControlEvent::HealthCheckFinished(result) => match result {
                Ok(()) => self.notifier.notify("Health check passed"),
                Err(e) => self.notifier.notify(&format!("Health check failed: {e}")),
            },
            ControlEvent::Shutdown => return false,
        }
        true
    }

    async fn on_capture_requested(&mut self) {
        if !self.has_active_grant() {
            self.begin_permission_flow();
            return;
        }
        let Some(active) = &self.capture else {
            return;
        };
        let worker = &active.worker;

        self.notifier.notify("Capturing...");
        let outcome = self
            .controller
            .capture_with(|| {
                let ticket = worker.request();
                async move {
                    match ticket {
                        Ok(ticket) => ticket.outcome().await,
                        Err(e) => Err(e),
                    }
                }
            })
            .await;

        if let Err(e) = outcome {
            self.notifier.notify(&format!("Capture failed: {e}"));
            if !e.is_recoverable() {
                self.stop_capture().await;
            }
        }
    }

    fn begin_permission_flow(&mut self) {
        self.notifier.notify("Screen recording permission required");
        if self.awaiting_permission.is_none() {
            self.awaiting_permission = Some(self.controller.hide_for_external_flow());
        }
        log::info!("[GRANT] Requesting screen capture permission");
        self.permissions.request(self.handle.clone());
    }

    async fn on_permission_result(&mut self, token: GrantToken) {
        if let Some(prior) = self.awaiting_permission.take() {
            self.controller.restore_after_external_flow(prior);
        }

        let grant = match ProjectionGrant::acquire(token) {
            Ok(grant) => grant,
            Err(e) => {
                log::warn!("[GRANT] Permission not granted: {}", e);
                self.notifier.notify("Screen capture permission denied");
                return;
            }
        };

        // A fresh grant replaces whatever was there.
        self.stop_capture().await;

        let events = self.handle.clone();
        grant.on_revoked(move || {
            events.send(ControlEvent::GrantRevoked);
        });

        let surface = build_surface(
            self.config.strategy,
            self.backend.clone(),
            grant.clone(),
            self.config.buffer_slots,
        );
        let session = CaptureSession::new(grant.clone(), surface, Box::new(self.config.waiter()));
        match CaptureWorker::spawn(session) {
            Ok(worker) => {
                log::info!("[GRANT] Capture ready ({:?})", self.config.strategy);
                self.capture = Some(ActiveCapture { grant, worker });
            }
            Err(e) => {
                log::error!("[CAPTURE] Could not start worker: {}", e);
                grant.release();
                self.notifier.notify("Could not start screen capture");
            }
        }
    }

    async fn on_grant_revoked(&mut self) {
        // Callbacks from a grant that was already replaced are stale.
        let revoked = self
            .capture
            .as_ref()
            .is_some_and(|c| c.grant.revocation_observed());
        if !revoked {
            return;
        }
        log::warn!("[GRANT] Projection revoked by the platform");
        self.stop_capture().await;
        self.notifier.notify("Screen capture stopped");
    }

    /// Release the grant and join the worker, which tears the surface down.
    async fn stop_capture(&mut self) {
        let Some(active) = self.capture.take() else {
            return;
        };
        active.grant.release();
        let worker = active.worker;
        if tokio::task::spawn_blocking(move || worker.shutdown())
            .await
            .is_err()
        {
            log::error!("[CAPTURE] Worker shutdown panicked");
        }
    }

    fn on_save_requested(&mut self) {
        let Some(image) = self.controller.current_capture().cloned() else {
            self.notifier.notify("No screenshot to save!");
            return;
        };
        let store = self.store.clone();
        let events = self.handle.clone();
        tokio::task::spawn_blocking(move || {
            events.send(ControlEvent::SaveFinished(store.save(&image)));
        });
    }

    fn on_save_finished(&mut self, result: Result<PathBuf, PersistenceError>) {
        match result {
            Ok(path) => {
                self.controller.set_send_enabled(true);
                self.notifier.notify(&format!("Saved: {}", path.display()));
            }
            Err(e) => {
                log::error!("[CAPTURE] Save failed: {}", e);
                self.notifier.notify("Failed to save screenshot");
            }
        }
    }

    fn on_send_requested(&mut self) {
        let Some(image) = self.controller.current_capture().cloned() else {
            self.notifier.notify("No screenshot to send!");
            return;
        };
        if !self.controller.send_enabled() {
            self.notifier.notify("Save the screenshot before sending");
            return;
        }
        let Some(assistant) = self.assistant.clone() else {
            self.notifier.notify("Assistant is not available");
            return;
        };

        self.session += 1;
        let session = self.session;
        self.controller.reset_chat();
        self.controller.show_loading();

        let events = self.handle.clone();
        tokio::spawn(async move {
            let encoded = tokio::task::spawn_blocking(move || image.to_png_bytes())
                .await
                .map_err(|e| e.to_string())
                .and_then(|png| png.map_err(|e| e.to_string()));
            let png = match encoded {
                Ok(png) => png,
                Err(e) => {
                    events.send(ControlEvent::AssistantReply {
                        session,
                        result: Err(AssistantError::Encode(e)),
                    });
                    return;
                }
            };
            events.send(ControlEvent::UploadComplete { session });
            let result = assistant.start_session(&png).await;
            events.send(ControlEvent::AssistantReply { session, result });
        });
    }

    fn on_assistant_reply(&mut self, session: u64, result: Result<String, AssistantError>) {
        if session != self.session {
            log::debug!("[ASSISTANT] Dropping reply from session {}", session);
            return;
        }
        self.controller.hide_loading();
        match result {
            Ok(reply) => {
                self.controller.switch_tab(PanelTab::Chat);
                self.show_reply(&reply);
            }
            Err(e) => {
                log::error!("[ASSISTANT] {}", e);
                self.notifier.notify(&format!("Assistant error: {e}"));
            }
        }
    }

    fn on_chat_message(&mut self, text: String) {
        let text = text.trim().to_string();
        if text.is_empty() {
            return;
        }
        self.append_chat(&format!("Me: {text}"));

        let session = self.session;
        let events = self.handle.clone();
        let Some(assistant) = self.assistant.clone() else {
            events.send(ControlEvent::ChatReply {
                session,
                result: Err(AssistantError::SessionNotStarted),
            });
            return;
        };
        tokio::spawn(async move {
            let result = assistant.follow_up(&text).await;
            events.send(ControlEvent::ChatReply { session, result });
        });
    }

    fn on_chat_reply(&mut self, session: u64, result: Result<String, AssistantError>) {
        if session != self.session {
            return;
        }
        match result {
            Ok(reply) => self.show_reply(&reply),
            Err(e) => self.append_chat(&format!("System: Error - {e}")),
        }
    }

    fn on_quick_action(&mut self, index: usize) {
        match self.controller.quick_actions().get(index).cloned() {
            Some(action) => self.on_chat_message(action),
            None => self.notifier.notify("No such quick action"),
        }
    }

    fn show_reply(&mut self, reply: &str) {
        let parsed = split_options(reply);
        self.append_chat(&format!("Assistant: {}", parsed.text));
        self.notifier.quick_actions(&parsed.options);
        self.controller.set_quick_actions(parsed.options);
    }

    /// Transcript lines go to the panel and to the user's output.
    fn append_chat(&mut self, line: &str) {
        self.controller.append_chat_message(line);
        self.notifier.chat_line(line);
    }

    fn on_update_settings(&mut self, update: SettingsUpdate) {
        match self.settings.apply(&update) {
            Ok(()) => {
                self.configure_assistant();
                self.notifier.notify("Settings saved");
            }
            Err(e) => {
                log::error!("[SETTINGS] {}", e);
                self.notifier.notify(&format!("Could not save settings: {e}"));
            }
        }
    }

    fn on_health_check(&mut self) {
        let Some(assistant) = self.assistant.clone() else {
            self.notifier.notify("Assistant is not available");
            return;
        };
        let events = self.handle.clone();
        tokio::spawn(async move {
            let result = assistant.health_check().await;
            events.send(ControlEvent::HealthCheckFinished(result));
        });
    }

    fn configure_assistant(&self) {
        let Some(assistant) = &self.assistant else {
            return;
        };
        match self.settings.credentials() {
            Ok(credentials) => assistant.configure(credentials),
            Err(e) => log::error!("[SETTINGS] Could not read credentials: {}", e),
        }
    }

    async fn shutdown(&mut self) {
        self.controller.remove_all();
        self.stop_capture().await;
        log::info!("[OVERLAY] Service stopped");
    }
}
