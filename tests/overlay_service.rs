//! Integration tests for the control-thread service.
//!
//! Each test builds the service with headless windows, the synthetic
//! compositor and scripted collaborators, feeds it events and pumps the
//! queue by hand so every step is deterministic.

use async_trait::async_trait;
use overlay_capture_lib::assistant::{Assistant, AssistantCredentials, AssistantError};
use overlay_capture_lib::capture::synthetic::{SyntheticBackend, SyntheticConfig};
use overlay_capture_lib::capture::{GrantToken, PixelImage};
use overlay_capture_lib::config::AppConfig;
use overlay_capture_lib::overlay::{
    HeadlessWindows, LoadingStage, OverlayMode, PanelTab, WindowProbe, WindowSnapshot,
};
use overlay_capture_lib::persistence::{PersistenceError, ScreenshotStore};
use overlay_capture_lib::service::{
    ControlEvent, Notifier, OverlayService, PermissionRequester, ServiceDeps, ServiceHandle,
};
use overlay_capture_lib::settings::{MemoryVault, SettingsStore, SettingsUpdate};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ── Scripted collaborators ──────────────────────────────────────────

#[derive(Default)]
struct Notes(Mutex<Vec<String>>);

impl Notes {
    fn push(&self, message: &str) {
        self.0.lock().unwrap().push(message.to_string());
    }

    fn contains(&self, needle: &str) -> bool {
        self.0.lock().unwrap().iter().any(|n| n.contains(needle))
    }
}

struct NoteSink(Arc<Notes>);

impl Notifier for NoteSink {
    fn notify(&self, message: &str) {
        self.0.push(message);
    }
}

struct CountingPrompt(Arc<AtomicUsize>);

impl PermissionRequester for CountingPrompt {
    fn request(&self, _events: ServiceHandle) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct MemoryStore {
    saved: Mutex<Vec<(u32, u32)>>,
}

struct StoreSink(Arc<MemoryStore>);

impl ScreenshotStore for StoreSink {
    fn save(&self, image: &PixelImage) -> Result<PathBuf, PersistenceError> {
        self.0
            .saved
            .lock()
            .unwrap()
            .push((image.width(), image.height()));
        Ok(PathBuf::from("/captures/capture_result.png"))
    }
}

#[derive(Default)]
struct ScriptedAssistant {
    replies: Mutex<VecDeque<Result<String, AssistantError>>>,
    images: Mutex<Vec<usize>>,
    follow_ups: Mutex<Vec<String>>,
    configured: Mutex<Vec<AssistantCredentials>>,
}

impl ScriptedAssistant {
    fn script(&self, reply: Result<&str, AssistantError>) {
        self.replies
            .lock()
            .unwrap()
            .push_back(reply.map(str::to_string));
    }

    fn next(&self) -> Result<String, AssistantError> {
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(AssistantError::EmptyResponse))
    }
}

#[async_trait]
impl Assistant for ScriptedAssistant {
    fn configure(&self, credentials: AssistantCredentials) {
        self.configured.lock().unwrap().push(credentials);
    }

    async fn start_session(&self, screenshot_png: &[u8]) -> Result<String, AssistantError> {
        self.images.lock().unwrap().push(screenshot_png.len());
        self.next()
    }

    async fn follow_up(&self, message: &str) -> Result<String, AssistantError> {
        self.follow_ups.lock().unwrap().push(message.to_string());
        self.next()
    }

    async fn health_check(&self) -> Result<(), AssistantError> {
        self.next().map(|_| ())
    }
}

// ── Harness ─────────────────────────────────────────────────────────

struct Harness {
    service: OverlayService,
    handle: ServiceHandle,
    probe: WindowProbe,
    backend: SyntheticBackend,
    notes: Arc<Notes>,
    prompts: Arc<AtomicUsize>,
    store: Arc<MemoryStore>,
    assistant: Arc<ScriptedAssistant>,
}

impl Harness {
    fn new(name: &str) -> Self {
        let windows = HeadlessWindows::new();
        let probe = windows.probe();
        let backend = SyntheticBackend::new(SyntheticConfig::default());
        let notes = Arc::new(Notes::default());
        let prompts = Arc::new(AtomicUsize::new(0));
        let store = Arc::new(MemoryStore::default());
        let assistant = Arc::new(ScriptedAssistant::default());

        let dir = std::env::temp_dir().join(format!(
            "overlay-capture-service-{}-{}",
            name,
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        let settings = SettingsStore::new(dir.join("settings.json"), Box::new(MemoryVault::new()));

        let config = AppConfig {
            settle: Duration::from_millis(1),
            poll_backoff: Duration::from_millis(1),
            hide_settle: Duration::ZERO,
            ..AppConfig::default()
        };

        let (mut service, handle) = OverlayService::new(
            config,
            ServiceDeps {
                backend: Arc::new(backend.clone()),
                windows: Box::new(windows),
                assistant: Some(assistant.clone()),
                settings,
                store: Arc::new(StoreSink(store.clone())),
                notifier: Arc::new(NoteSink(notes.clone())),
                permissions: Box::new(CountingPrompt(prompts.clone())),
            },
        );
        service.install().unwrap();

        Self {
            service,
            handle,
            probe,
            backend,
            notes,
            prompts,
            store,
            assistant,
        }
    }

    /// Send one event and process everything it produces up to `steps`.
    async fn step(&mut self, event: ControlEvent, steps: usize) {
        assert!(self.handle.send(event));
        for _ in 0..steps {
            assert!(self.service.pump().await);
        }
    }

    async fn grant(&mut self) {
        self.step(
            ControlEvent::PermissionResult(GrantToken::new(-1, Some(b"ok".to_vec()))),
            1,
        )
        .await;
        assert!(self.service.has_active_grant());
    }

    async fn expand(&mut self) {
        self.step(
            ControlEvent::HandleGesture {
                start_x: 1000.0,
                end_x: 900.0,
            },
            1,
        )
        .await;
        assert_eq!(self.service.controller().mode(), OverlayMode::Expanded);
    }

    async fn capture_and_save(&mut self) {
        self.step(ControlEvent::CaptureRequested, 1).await;
        // SaveRequested, then SaveFinished from the blocking task.
        self.step(ControlEvent::SaveRequested, 2).await;
        assert!(self.service.controller().send_enabled());
    }
}

// ── Permission flow ─────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread")]
async fn capture_without_grant_asks_for_permission_and_restores_on_deny() {
    let mut h = Harness::new("deny");

    h.step(ControlEvent::CaptureRequested, 1).await;
    assert!(h.notes.contains("Screen recording permission required"));
    assert_eq!(h.prompts.load(Ordering::SeqCst), 1);
    assert!(h.probe.snapshot().nothing_on_screen());

    h.step(ControlEvent::PermissionResult(GrantToken::cancelled()), 1)
        .await;
    assert!(h.probe.snapshot().handle_visible);
    assert!(!h.service.has_active_grant());
    assert_eq!(h.backend.stats().attach_count, 0);
    assert!(h.service.controller().current_capture().is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn granted_permission_enables_capture() {
    let mut h = Harness::new("grant");
    h.step(ControlEvent::CaptureRequested, 1).await;
    h.grant().await;
    assert!(h.probe.snapshot().handle_visible);

    h.step(ControlEvent::CaptureRequested, 1).await;
    let image = h.service.controller().current_capture().unwrap();
    assert_eq!((image.width(), image.height()), (64, 48));
}

// ── Visibility around capture ───────────────────────────────────────

#[tokio::test(flavor = "multi_thread")]
async fn overlay_is_hidden_while_capturing_and_restored_after() {
    let mut h = Harness::new("hidden");
    h.grant().await;
    h.expand().await;
    let before: WindowSnapshot = h.probe.snapshot();

    let seen_hidden = Arc::new(AtomicBool::new(false));
    let (probe, flag) = (h.probe.clone(), seen_hidden.clone());
    h.backend.on_attach(move || {
        flag.store(probe.snapshot().nothing_on_screen(), Ordering::SeqCst);
    });

    h.step(ControlEvent::CaptureRequested, 1).await;
    assert!(seen_hidden.load(Ordering::SeqCst));
    assert_eq!(h.probe.snapshot(), before);
    assert!(!h.service.controller().send_enabled());
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_capture_restores_overlay_and_clears_preview() {
    let mut h = Harness::new("failed");
    h.grant().await;
    h.step(ControlEvent::CaptureRequested, 1).await;
    assert!(h.service.controller().current_capture().is_some());

    h.backend.reconfigure(|c| c.empty_polls = 10);
    h.step(ControlEvent::CaptureRequested, 1).await;

    assert!(h.notes.contains("No frame produced after 3 attempts"));
    assert!(h.service.controller().current_capture().is_none());
    assert!(h.probe.snapshot().handle_visible);
    assert!(h.service.has_active_grant());
}

// ── Revocation ──────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread")]
async fn stopping_the_projection_releases_all_resources() {
    let mut h = Harness::new("revoke");
    h.grant().await;
    h.step(ControlEvent::CaptureRequested, 1).await;
    assert_eq!(h.backend.stats().live_pools, 1);

    // StopProjection revokes; the callback queues GrantRevoked.
    h.step(ControlEvent::StopProjection, 2).await;
    assert!(!h.service.has_active_grant());
    assert!(h.notes.contains("Screen capture stopped"));
    let stats = h.backend.stats();
    assert_eq!(stats.live_pools, 0);
    assert_eq!(stats.live_outputs, 0);

    h.step(ControlEvent::CaptureRequested, 1).await;
    assert_eq!(h.prompts.load(Ordering::SeqCst), 1);
}

// ── Save / send / chat ──────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread")]
async fn save_without_capture_is_refused() {
    let mut h = Harness::new("nosave");
    h.step(ControlEvent::SaveRequested, 1).await;
    assert!(h.notes.contains("No screenshot to save!"));
    assert!(h.store.saved.lock().unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn send_requires_a_saved_capture() {
    let mut h = Harness::new("unsaved");
    h.grant().await;
    h.step(ControlEvent::CaptureRequested, 1).await;
    h.step(ControlEvent::SendRequested, 1).await;
    assert!(h.notes.contains("Save the screenshot before sending"));
    assert!(h.assistant.images.lock().unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn send_and_chat_build_the_transcript() {
    let mut h = Harness::new("chat");
    h.grant().await;
    h.expand().await;
    h.capture_and_save().await;
    assert_eq!(h.store.saved.lock().unwrap().as_slice(), &[(64, 48)]);
    assert!(h.notes.contains("Saved: /captures/capture_result.png"));

    h.assistant
        .script(Ok("A settings dialog. [OPTIONS: Explain | Close it]"));
    h.step(ControlEvent::SendRequested, 1).await;
    assert_eq!(h.service.controller().loading(), LoadingStage::Uploading);

    h.service.pump().await; // UploadComplete
    assert_eq!(h.service.controller().loading(), LoadingStage::Receiving);
    h.service.pump().await; // AssistantReply

    let controller = h.service.controller();
    assert_eq!(controller.loading(), LoadingStage::Idle);
    assert_eq!(controller.tab(), PanelTab::Chat);
    assert_eq!(controller.transcript(), "Assistant: A settings dialog.");
    assert_eq!(controller.quick_actions(), ["Explain", "Close it"]);
    assert_eq!(h.assistant.images.lock().unwrap().len(), 1);

    h.assistant.script(Err(AssistantError::Api {
        status: 500,
        body: "boom".into(),
    }));
    h.step(ControlEvent::ChatMessage("Explain".into()), 2).await;
    assert_eq!(
        h.service.controller().transcript(),
        "Assistant: A settings dialog.\n\nMe: Explain\n\nSystem: Error - API returned 500: boom"
    );
    assert_eq!(h.assistant.follow_ups.lock().unwrap().as_slice(), ["Explain"]);
}

#[tokio::test(flavor = "multi_thread")]
async fn replies_and_quick_actions_reach_the_user() {
    let mut h = Harness::new("present");
    h.grant().await;
    h.capture_and_save().await;

    h.assistant
        .script(Ok("A settings dialog. [OPTIONS: Explain | Close it]"));
    h.step(ControlEvent::SendRequested, 3).await;
    assert!(h.notes.contains("Assistant: A settings dialog."));
    assert!(h.notes.contains("Quick actions: [1] Explain  [2] Close it"));

    h.assistant.script(Ok("Tap the X in the corner."));
    h.step(ControlEvent::QuickAction(1), 2).await;
    assert_eq!(h.assistant.follow_ups.lock().unwrap().as_slice(), ["Close it"]);
    assert!(h.notes.contains("Me: Close it"));
    assert!(h.notes.contains("Assistant: Tap the X in the corner."));
    assert!(h
        .service
        .controller()
        .transcript()
        .ends_with("Me: Close it\n\nAssistant: Tap the X in the corner."));
    assert!(h.service.controller().quick_actions().is_empty());

    h.step(ControlEvent::QuickAction(4), 1).await;
    assert!(h.notes.contains("No such quick action"));
    assert_eq!(h.assistant.follow_ups.lock().unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn assistant_failure_hides_loading_and_notifies() {
    let mut h = Harness::new("sendfail");
    h.grant().await;
    h.capture_and_save().await;

    h.assistant.script(Err(AssistantError::MissingApiKey));
    h.step(ControlEvent::SendRequested, 3).await;
    assert_eq!(h.service.controller().loading(), LoadingStage::Idle);
    assert!(h.notes.contains("Assistant error: No API key configured"));
    assert_eq!(h.service.controller().transcript(), "");
}

// ── Settings ────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread")]
async fn settings_update_reconfigures_the_assistant() {
    let mut h = Harness::new("settings");
    let mut update = SettingsUpdate {
        model_name: "gemini-2.5-pro".into(),
        active_key_index: Some(2),
        ..SettingsUpdate::default()
    };
    update.api_keys[1] = Some("second-key".into());

    h.step(ControlEvent::UpdateSettings(update), 1).await;
    assert!(h.notes.contains("Settings saved"));

    let configured = h.assistant.configured.lock().unwrap();
    let latest = configured.last().unwrap();
    assert_eq!(latest.model, "gemini-2.5-pro");
    assert_eq!(latest.api_key.as_deref(), Some("second-key"));
}

#[tokio::test(flavor = "multi_thread")]
async fn health_check_reports_result() {
    let mut h = Harness::new("health");
    h.assistant.script(Ok("Pong"));
    h.step(ControlEvent::HealthCheck, 2).await;
    assert!(h.notes.contains("Health check passed"));
}

// ── Shutdown ────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread")]
async fn shutdown_removes_windows_and_releases_the_surface() {
    let h = Harness::new("shutdown");
    let backend = h.backend.clone();
    let probe = h.probe.clone();

    h.handle.send(ControlEvent::PermissionResult(GrantToken::new(
        -1,
        Some(b"ok".to_vec()),
    )));
    h.handle.send(ControlEvent::CaptureRequested);
    h.handle.send(ControlEvent::Shutdown);
    h.service.run().await.unwrap();

    assert_eq!(probe.snapshot(), WindowSnapshot::default());
    let stats = backend.stats();
    assert_eq!(stats.attach_count, 1);
    assert_eq!(stats.live_pools, 0);
    assert_eq!(stats.live_outputs, 0);
}
