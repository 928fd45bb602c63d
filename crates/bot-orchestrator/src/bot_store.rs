use gex_desk_core::{BotConfig, DeskError, Result};
use gex_desk_paper::{read_json, write_json_atomic};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const BOT_CONFIG_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct PersistedBotConfig {
    version: u32,
    config: BotConfig,
}

/// JSON file holding the bot configuration, separate from the ledger.
///
/// A store without a path keeps nothing and never fails.
#[derive(Debug, Clone, Default)]
pub struct BotConfigStore {
    path: Option<PathBuf>,
}

impl BotConfigStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    #[must_use]
    pub const fn in_memory() -> Self {
        Self { path: None }
    }

    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Loads the persisted configuration, or `None` if there is none yet.
    ///
    /// # Errors
    ///
    /// `Persistence` if the file exists but cannot be read, or was written by
    /// a newer version.
    pub fn load(&self) -> Result<Option<BotConfig>> {
        let Some(path) = &self.path else {
            return Ok(None);
        };
        let Some(persisted) = read_json::<PersistedBotConfig>(path)? else {
            return Ok(None);
        };
        if persisted.version > BOT_CONFIG_VERSION {
            return Err(DeskError::persistence(format!(
                "bot config {} has version {}, newest supported is {BOT_CONFIG_VERSION}",
                path.display(),
                persisted.version
            )));
        }
        tracing::debug!(path = %path.display(), "Loaded bot config");
        Ok(Some(persisted.config))
    }

    /// Writes the loop bookkeeping (`last_spot`, `last_action_ms`) of
    /// `current` into the persisted config and keeps every other field as
    /// found on disk. Falls back to writing `current` whole when nothing is
    /// persisted yet. Returns the config that was written.
    ///
    /// # Errors
    ///
    /// `Persistence` if the file cannot be read or written.
    pub fn save_bookkeeping(&self, current: &BotConfig) -> Result<BotConfig> {
        let merged = match self.load()? {
            Some(mut on_disk) => {
                on_disk.last_spot = current.last_spot;
                on_disk.last_action_ms = current.last_action_ms;
                on_disk
            }
            None => current.clone(),
        };
        self.save(&merged)?;
        Ok(merged)
    }

    /// # Errors
    ///
    /// `Persistence` if the file cannot be written.
    pub fn save(&self, config: &BotConfig) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        write_json_atomic(
            path,
            &PersistedBotConfig {
                version: BOT_CONFIG_VERSION,
                config: config.clone(),
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use tempfile::TempDir;

    #[test]
    fn round_trips_config_with_bookkeeping() {
        let dir = TempDir::new().unwrap();
        let store = BotConfigStore::new(dir.path().join("bot_config.json"));
        assert!(store.load().unwrap().is_none());

        let config = BotConfig {
            enabled: true,
            expiries: vec!["28MAR25".into()],
            max_risk_usd: dec!(800),
            last_spot: Some(61_234.5),
            last_action_ms: 1_700_000_000_000,
            ..BotConfig::default()
        };
        store.save(&config).unwrap();
        assert_eq!(store.load().unwrap(), Some(config));
    }

    #[test]
    fn bookkeeping_save_keeps_settings_from_disk() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bot_config.json");
        let store = BotConfigStore::new(&path);

        // written by another process while the loop runs
        let on_disk = BotConfig {
            enabled: false,
            walls_n: 7,
            ..BotConfig::default()
        };
        store.save(&on_disk).unwrap();

        let in_memory = BotConfig {
            enabled: true,
            walls_n: 18,
            last_spot: Some(60_001.0),
            last_action_ms: 1_700_000_000_000,
            ..BotConfig::default()
        };
        let written = store.save_bookkeeping(&in_memory).unwrap();
        assert!(!written.enabled);
        assert_eq!(written.walls_n, 7);
        assert_eq!(written.last_spot, Some(60_001.0));
        assert_eq!(written.last_action_ms, 1_700_000_000_000);
        assert_eq!(store.load().unwrap(), Some(written));
    }

    #[test]
    fn bookkeeping_save_without_file_writes_whole_config() {
        let dir = TempDir::new().unwrap();
        let store = BotConfigStore::new(dir.path().join("bot_config.json"));
        let config = BotConfig {
            enabled: true,
            last_action_ms: 5,
            ..BotConfig::default()
        };
        assert_eq!(store.save_bookkeeping(&config).unwrap(), config);
        assert_eq!(store.load().unwrap(), Some(config));
    }

    #[test]
    fn in_memory_store_is_inert() {
        let store = BotConfigStore::in_memory();
        store.save(&BotConfig::default()).unwrap();
        assert!(store.load().unwrap().is_none());
    }
}
