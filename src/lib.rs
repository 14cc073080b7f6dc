//! Overlay capture: application entry point.
//!
//! This is the app shell that wires together:
//! - Screen capture domain (capture/)
//! - Overlay handle and panel (overlay/)
//! - Vision assistant client (assistant/)
//! - Settings, screenshot persistence and runtime config
//! - The control-thread service and the stdin console that drives it

pub mod assistant;
pub mod capture;
pub mod config;
pub mod console;
pub mod overlay;
pub mod persistence;
pub mod service;
pub mod settings;

use assistant::{Assistant, AssistantCredentials, GeminiAssistant};
use capture::platform::MirrorBackend;
use config::AppConfig;
use console::{ConsoleNotifier, ConsolePermissionPrompt};
use overlay::HeadlessWindows;
use persistence::PngFileStore;
use service::{OverlayService, ServiceDeps};
use settings::{CredentialVault, SettingsStore};
use std::sync::Arc;

pub fn run() {
    // .env is optional
    let _ = dotenvy::dotenv();
    env_logger::init();

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            log::error!("Invalid configuration: {}", e);
            eprintln!("{e}");
            return;
        }
    };
    log::info!("Overlay capture starting up ({:?})", config);

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            log::error!("Failed to start async runtime: {}", e);
            return;
        }
    };
    runtime.block_on(run_app(config));
}

async fn run_app(config: AppConfig) {
    let settings = SettingsStore::open_default(credential_vault());
    let credentials = settings.credentials().unwrap_or_else(|e| {
        log::warn!("[SETTINGS] Falling back to defaults: {}", e);
        AssistantCredentials {
            model: assistant::prompts::DEFAULT_MODEL.to_string(),
            api_key: None,
        }
    });
    let assistant: Arc<dyn Assistant> = Arc::new(GeminiAssistant::new(credentials));

    let (service, handle) = OverlayService::new(
        config,
        ServiceDeps {
            backend: mirror_backend(),
            windows: Box::new(HeadlessWindows::new()),
            assistant: Some(assistant),
            settings,
            store: Arc::new(PngFileStore::in_pictures_dir()),
            notifier: Arc::new(ConsoleNotifier),
            permissions: Box::new(ConsolePermissionPrompt),
        },
    );

    let console = tokio::spawn(console::run_console(handle));
    if let Err(e) = service.run().await {
        log::error!("[OVERLAY] {}", e);
    }
    console.abort();
    log::info!("Overlay capture stopped");
}

#[cfg(feature = "desktop")]
fn mirror_backend() -> Arc<dyn MirrorBackend> {
    match capture::desktop::DesktopMirror::primary() {
        Ok(mirror) => Arc::new(mirror),
        Err(e) => {
            log::warn!("[CAPTURE] Desktop capture unavailable ({}), using synthetic frames", e);
            synthetic_backend()
        }
    }
}

#[cfg(not(feature = "desktop"))]
fn mirror_backend() -> Arc<dyn MirrorBackend> {
    synthetic_backend()
}

fn synthetic_backend() -> Arc<dyn MirrorBackend> {
    Arc::new(capture::synthetic::SyntheticBackend::new(
        capture::synthetic::SyntheticConfig::default(),
    ))
}

#[cfg(feature = "native-keyring")]
fn credential_vault() -> Box<dyn CredentialVault> {
    Box::new(settings::KeyringVault::new())
}

// Without a native store keyring only has a per-entry mock, so keys would
// not survive between reads.
#[cfg(not(feature = "native-keyring"))]
fn credential_vault() -> Box<dyn CredentialVault> {
    Box::new(settings::MemoryVault::new())
}
