//! User settings: model name, three API key slots and which one is active.
//!
//! Non-secret fields live in a JSON file under the platform config dir:
//!   macOS:   ~/Library/Application Support/overlay-capture/settings.json
//!   Linux:   ~/.config/overlay-capture/settings.json
//!   Windows: %APPDATA%/overlay-capture/settings.json
//! API keys go through a `CredentialVault` (the OS keychain in production).

use crate::assistant::{prompts::DEFAULT_MODEL, AssistantCredentials};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub const KEY_SLOTS: u8 = 3;
const KEYRING_SERVICE: &str = "overlay-capture";
const API_KEY_ENV: &str = "GEMINI_API_KEY";

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Failed to access settings file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Settings file is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Credential store error: {0}")]
    Vault(String),
}

/// Base directory for settings.
pub fn settings_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("overlay-capture")
}

/// Secret storage for the API key slots. Slots are 1-based.
pub trait CredentialVault: Send + Sync {
    fn get(&self, slot: u8) -> Result<Option<String>, SettingsError>;
    /// An empty value clears the slot.
    fn set(&self, slot: u8, value: &str) -> Result<(), SettingsError>;
}

/// OS keychain via the `keyring` crate.
pub struct KeyringVault {
    service: String,
}

impl KeyringVault {
    pub fn new() -> Self {
        Self {
            service: KEYRING_SERVICE.to_string(),
        }
    }

    fn entry(&self, slot: u8) -> Result<keyring::Entry, SettingsError> {
        keyring::Entry::new(&self.service, &format!("gemini_api_key_{slot}"))
            .map_err(|e| SettingsError::Vault(e.to_string()))
    }
}

impl Default for KeyringVault {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialVault for KeyringVault {
    fn get(&self, slot: u8) -> Result<Option<String>, SettingsError> {
        match self.entry(slot)?.get_password() {
            Ok(key) => Ok(Some(key)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(SettingsError::Vault(e.to_string())),
        }
    }

    fn set(&self, slot: u8, value: &str) -> Result<(), SettingsError> {
        let entry = self.entry(slot)?;
        let result = if value.is_empty() {
            match entry.delete_credential() {
                Err(keyring::Error::NoEntry) => Ok(()),
                other => other,
            }
        } else {
            entry.set_password(value)
        };
        result.map_err(|e| SettingsError::Vault(e.to_string()))
    }
}

/// Process-local vault for tests and for running without a keychain.
#[derive(Default)]
pub struct MemoryVault {
    keys: Mutex<HashMap<u8, String>>,
}

impl MemoryVault {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialVault for MemoryVault {
    fn get(&self, slot: u8) -> Result<Option<String>, SettingsError> {
        let keys = self
            .keys
            .lock()
            .map_err(|e| SettingsError::Vault(e.to_string()))?;
        Ok(keys.get(&slot).cloned())
    }

    fn set(&self, slot: u8, value: &str) -> Result<(), SettingsError> {
        let mut keys = self
            .keys
            .lock()
            .map_err(|e| SettingsError::Vault(e.to_string()))?;
        if value.is_empty() {
            keys.remove(&slot);
        } else {
            keys.insert(slot, value.to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredSettings {
    #[serde(default)]
    model_name: Option<String>,
    #[serde(default)]
    active_key_index: Option<u8>,
}

/// Everything the Settings tab submits at once.
#[derive(Clone, Default)]
pub struct SettingsUpdate {
    /// `None` leaves a slot unchanged, `Some("")` clears it.
    pub api_keys: [Option<String>; KEY_SLOTS as usize],
    pub model_name: String,
    pub active_key_index: Option<u8>,
}

impl std::fmt::Debug for SettingsUpdate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let touched: Vec<usize> = self
            .api_keys
            .iter()
            .enumerate()
            .filter(|(_, k)| k.is_some())
            .map(|(i, _)| i + 1)
            .collect();
        f.debug_struct("SettingsUpdate")
            .field("api_key_slots", &touched)
            .field("model_name", &self.model_name)
            .field("active_key_index", &self.active_key_index)
            .finish()
    }
}

pub struct SettingsStore {
    path: PathBuf,
    vault: Box<dyn CredentialVault>,
    fallback_key: Option<String>,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>, vault: Box<dyn CredentialVault>) -> Self {
        Self {
            path: path.into(),
            vault,
            fallback_key: None,
        }
    }

    /// Settings file in the platform config dir, with `GEMINI_API_KEY`
    /// as the fallback key.
    pub fn open_default(vault: Box<dyn CredentialVault>) -> Self {
        let fallback = std::env::var(API_KEY_ENV).ok().filter(|k| !k.is_empty());
        Self::new(settings_dir().join("settings.json"), vault).with_fallback_key(fallback)
    }

    pub fn with_fallback_key(mut self, key: Option<String>) -> Self {
        self.fallback_key = key;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn model_name(&self) -> Result<String, SettingsError> {
        Ok(self
            .load()?
            .model_name
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string()))
    }

    pub fn save_model_name(&self, model: &str) -> Result<(), SettingsError> {
        let mut stored = self.load()?;
        stored.model_name = Some(model.trim().to_string());
        self.store(&stored)
    }

    /// Active slot, 1 through 3. Anything else reads as 1.
    pub fn active_key_index(&self) -> Result<u8, SettingsError> {
        Ok(normalize_slot(self.load()?.active_key_index.unwrap_or(1)))
    }

    pub fn save_active_key_index(&self, index: u8) -> Result<(), SettingsError> {
        let mut stored = self.load()?;
        stored.active_key_index = Some(index);
        self.store(&stored)
    }

    pub fn api_key(&self, slot: u8) -> Result<String, SettingsError> {
        Ok(self.vault.get(normalize_slot(slot))?.unwrap_or_default())
    }

    pub fn save_api_key(&self, slot: u8, key: &str) -> Result<(), SettingsError> {
        self.vault.set(normalize_slot(slot), key.trim())
    }

    /// Key in the active slot, or the environment fallback when it is empty.
    pub fn active_api_key(&self) -> Result<Option<String>, SettingsError> {
        let key = self.api_key(self.active_key_index()?)?;
        if key.is_empty() {
            Ok(self.fallback_key.clone())
        } else {
            Ok(Some(key))
        }
    }

    pub fn credentials(&self) -> Result<AssistantCredentials, SettingsError> {
        Ok(AssistantCredentials {
            model: self.model_name()?,
            api_key: self.active_api_key()?,
        })
    }

    /// Save a Settings tab submission. An empty model name is not saved,
    /// and a missing index keeps the current one.
    pub fn apply(&self, update: &SettingsUpdate) -> Result<(), SettingsError> {
        for (slot, key) in (1..=KEY_SLOTS).zip(update.api_keys.iter()) {
            if let Some(key) = key {
                self.save_api_key(slot, key)?;
            }
        }

        let mut stored = self.load()?;
        if !update.model_name.trim().is_empty() {
            stored.model_name = Some(update.model_name.trim().to_string());
        }
        if let Some(index) = update.active_key_index {
            stored.active_key_index = Some(index);
        }
        self.store(&stored)?;

        log::info!(
            "[SETTINGS] Saved (model={:?}, active slot={})",
            stored.model_name,
            normalize_slot(stored.active_key_index.unwrap_or(1))
        );
        Ok(())
    }

    fn load(&self) -> Result<StoredSettings, SettingsError> {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) => Ok(serde_json::from_str(&raw)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(StoredSettings::default()),
            Err(source) => Err(SettingsError::Io {
                path: self.path.clone(),
                source,
            }),
        }
    }

    fn store(&self, stored: &StoredSettings) -> Result<(), SettingsError> {
        let io_err = |source| SettingsError::Io {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let json = serde_json::to_string_pretty(stored)?;
        std::fs::write(&self.path, json).map_err(io_err)
    }
}

fn normalize_slot(slot: u8) -> u8 {
    if (1..=KEY_SLOTS).contains(&slot) {
        slot
    } else {
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store(name: &str) -> SettingsStore {
        let dir = std::env::temp_dir().join(format!(
            "overlay-capture-settings-{}-{}",
            name,
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        SettingsStore::new(dir.join("settings.json"), Box::new(MemoryVault::new()))
    }

    #[test]
    fn defaults_without_a_file() {
        let store = temp_store("defaults");
        assert_eq!(store.model_name().unwrap(), "gemini-2.5-flash");
        assert_eq!(store.active_key_index().unwrap(), 1);
        assert_eq!(store.active_api_key().unwrap(), None);
    }

    #[test]
    fn out_of_range_index_reads_as_first_slot() {
        let store = temp_store("index");
        store.save_active_key_index(7).unwrap();
        assert_eq!(store.active_key_index().unwrap(), 1);
        store.save_active_key_index(3).unwrap();
        assert_eq!(store.active_key_index().unwrap(), 3);
    }

    #[test]
    fn active_key_follows_the_index() {
        let store = temp_store("active");
        store.save_api_key(1, "key-one").unwrap();
        store.save_api_key(2, "key-two").unwrap();
        store.save_active_key_index(2).unwrap();
        assert_eq!(store.active_api_key().unwrap().as_deref(), Some("key-two"));
    }

    #[test]
    fn empty_slot_falls_back_to_environment_key() {
        let store = temp_store("fallback").with_fallback_key(Some("from-env".into()));
        assert_eq!(store.active_api_key().unwrap().as_deref(), Some("from-env"));
        store.save_api_key(1, "stored").unwrap();
        assert_eq!(store.active_api_key().unwrap().as_deref(), Some("stored"));
    }

    #[test]
    fn apply_keeps_model_when_field_is_blank() {
        let store = temp_store("apply");
        store.save_model_name("gemini-2.5-pro").unwrap();

        store
            .apply(&SettingsUpdate {
                api_keys: [None, Some("second".into()), Some(String::new())],
                model_name: "  ".into(),
                active_key_index: Some(2),
            })
            .unwrap();

        let creds = store.credentials().unwrap();
        assert_eq!(creds.model, "gemini-2.5-pro");
        assert_eq!(creds.api_key.as_deref(), Some("second"));
        assert_eq!(store.api_key(3).unwrap(), "");
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let store = temp_store("corrupt");
        std::fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        std::fs::write(store.path(), "{not json").unwrap();
        assert!(matches!(store.model_name(), Err(SettingsError::Parse(_))));
    }
}
