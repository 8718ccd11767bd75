use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

pub const DEFAULT_CHANNEL: i32 = 16;
pub const DEFAULT_MIN_LQI: f32 = 60.0;
pub const DEFAULT_LOOKBACK_MINUTES: u32 = 10;

/// Persisted snapshot of the user preferences.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub channel: i32,
    pub min_lqi: f32,
    pub lookback_minutes: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            channel: DEFAULT_CHANNEL,
            min_lqi: DEFAULT_MIN_LQI,
            lookback_minutes: DEFAULT_LOOKBACK_MINUTES,
        }
    }
}

/// Durable key-value store for the three user preferences.
///
/// Reads are served from memory and always observe the latest `set_*`
/// call. Writes persist asynchronously as a TOML snapshot; callers do
/// not block on the file write. Each key exposes a `watch` receiver so
/// consumers can react to changes without polling the store. Range
/// validation (e.g. channel within 11..=26) is the caller's job.
pub struct SettingsStore {
    path: PathBuf,
    channel: watch::Sender<i32>,
    min_lqi: watch::Sender<f32>,
    lookback_minutes: watch::Sender<u32>,
}

impl SettingsStore {
    /// Loads settings from the given TOML file path, falling back to
    /// defaults if the file is absent or malformed.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();

        let settings = match std::fs::read_to_string(&path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(settings) => settings,
                Err(err) => {
                    log::warn!(
                        "ignoring malformed settings file {}: {}",
                        path.display(),
                        err
                    );
                    Settings::default()
                }
            },
            Err(_) => Settings::default(),
        };

        Self {
            path,
            channel: watch::Sender::new(settings.channel),
            min_lqi: watch::Sender::new(settings.min_lqi),
            lookback_minutes: watch::Sender::new(settings.lookback_minutes),
        }
    }

    pub fn channel(&self) -> i32 {
        *self.channel.borrow()
    }

    pub fn min_lqi(&self) -> f32 {
        *self.min_lqi.borrow()
    }

    pub fn lookback_minutes(&self) -> u32 {
        *self.lookback_minutes.borrow()
    }

    pub fn set_channel(&self, channel: i32) {
        self.channel.send_replace(channel);
        self.persist();
    }

    pub fn set_min_lqi(&self, min_lqi: f32) {
        self.min_lqi.send_replace(min_lqi);
        self.persist();
    }

    pub fn set_lookback_minutes(&self, minutes: u32) {
        self.lookback_minutes.send_replace(minutes);
        self.persist();
    }

    pub fn subscribe_channel(&self) -> watch::Receiver<i32> {
        self.channel.subscribe()
    }

    pub fn subscribe_min_lqi(&self) -> watch::Receiver<f32> {
        self.min_lqi.subscribe()
    }

    pub fn subscribe_lookback_minutes(&self) -> watch::Receiver<u32> {
        self.lookback_minutes.subscribe()
    }

    pub fn snapshot(&self) -> Settings {
        Settings {
            channel: self.channel(),
            min_lqi: self.min_lqi(),
            lookback_minutes: self.lookback_minutes(),
        }
    }

    // Fire-and-forget snapshot write. Must run inside a tokio runtime,
    // which the client requires anyway.
    fn persist(&self) {
        let path = self.path.clone();
        let snapshot = self.snapshot();

        tokio::spawn(async move {
            let contents = match toml::to_string_pretty(&snapshot) {
                Ok(contents) => contents,
                Err(err) => {
                    log::error!("failed to serialize settings: {}", err);
                    return;
                }
            };

            if let Err(err) = tokio::fs::write(&path, contents).await {
                log::error!(
                    "failed to persist settings to {}: {}",
                    path.display(),
                    err
                );
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn store_in(dir: &tempfile::TempDir) -> SettingsStore {
        SettingsStore::load(dir.path().join("settings.toml"))
    }

    #[test]
    fn defaults_when_never_set() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store_in(&dir);

        assert_eq!(store.channel(), 16);
        assert_eq!(store.min_lqi(), 60.0);
        assert_eq!(store.lookback_minutes(), 10);
    }

    #[test]
    fn defaults_on_malformed_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("settings.toml");
        std::fs::write(&path, "channel = \"not a number\"").expect("write");

        let store = SettingsStore::load(&path);
        assert_eq!(store.snapshot(), Settings::default());
    }

    #[tokio::test]
    async fn get_observes_completed_set() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store_in(&dir);

        store.set_channel(21);
        store.set_min_lqi(45.0);
        store.set_lookback_minutes(5);

        assert_eq!(store.channel(), 21);
        assert_eq!(store.min_lqi(), 45.0);
        assert_eq!(store.lookback_minutes(), 5);
    }

    #[tokio::test]
    async fn notifies_subscribers_per_key() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store_in(&dir);

        let mut channel_rx = store.subscribe_channel();
        let mut lqi_rx = store.subscribe_min_lqi();

        store.set_channel(12);
        channel_rx.changed().await.expect("channel change");
        assert_eq!(*channel_rx.borrow(), 12);
        assert!(!lqi_rx.has_changed().expect("lqi sender alive"));

        store.set_min_lqi(30.0);
        lqi_rx.changed().await.expect("lqi change");
        assert_eq!(*lqi_rx.borrow(), 30.0);
    }

    #[tokio::test]
    async fn persists_and_reloads() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("settings.toml");

        let store = SettingsStore::load(&path);
        store.set_channel(24);
        store.set_min_lqi(15.0);
        store.set_lookback_minutes(42);

        // The write is fire-and-forget, so wait for it to land.
        for _ in 0..100 {
            tokio::time::sleep(Duration::from_millis(20)).await;

            if path.exists() {
                let reloaded = SettingsStore::load(&path);
                if reloaded.snapshot()
                    == (Settings {
                        channel: 24,
                        min_lqi: 15.0,
                        lookback_minutes: 42,
                    })
                {
                    return;
                }
            }
        }

        panic!("settings were not persisted to {}", path.display());
    }
}
