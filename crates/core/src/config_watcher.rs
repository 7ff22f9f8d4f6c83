use crate::config::AppConfig;
use crate::config_loader::ConfigLoader;
use anyhow::{Context, Result};
use notify::{Event, EventKind, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use tokio::sync::watch;
use tracing::{debug, error, info};

/// Publishes the application config and re-reads it when its file changes.
pub struct ConfigWatcher {
    tx: watch::Sender<AppConfig>,
}

impl ConfigWatcher {
    /// Returns the watcher and a receiver primed with `initial_config`.
    #[must_use]
    pub fn new(initial_config: AppConfig) -> (Self, watch::Receiver<AppConfig>) {
        let (tx, rx) = watch::channel(initial_config);
        (Self { tx }, rx)
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<AppConfig> {
        self.tx.subscribe()
    }

    #[must_use]
    pub fn current(&self) -> AppConfig {
        self.tx.borrow().clone()
    }

    /// Re-reads `path` once. Returns true when the published config changed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be parsed; the published config is
    /// left as it was.
    pub fn reload(&self, path: &Path) -> Result<bool> {
        publish(&self.tx, path)
    }

    /// Reloads on every write to `config_path` until the watcher fails.
    ///
    /// Parse failures are logged and the previous config stays published.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be watched.
    pub async fn watch(&self, config_path: impl AsRef<Path>) -> Result<()> {
        let tx = self.tx.clone();
        let path: PathBuf = config_path.as_ref().to_path_buf();

        tokio::task::spawn_blocking(move || {
            let (event_tx, event_rx) = std::sync::mpsc::channel();
            let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
                if let Ok(event) = res {
                    let _ = event_tx.send(event);
                }
            })?;
            watcher
                .watch(&path, RecursiveMode::NonRecursive)
                .with_context(|| format!("Failed to watch {}", path.display()))?;
            info!(path = %path.display(), "Watching config file");

            for event in event_rx {
                // Editors that replace the file emit a create rather than a modify.
                if !matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
                    continue;
                }
                match publish(&tx, &path) {
                    Ok(changed) => info!(path = %path.display(), changed, "Config reloaded"),
                    Err(e) => error!(path = %path.display(), "Failed to reload config: {e:#}"),
                }
            }
            Ok::<_, anyhow::Error>(())
        })
        .await??;

        Ok(())
    }
}

fn publish(tx: &watch::Sender<AppConfig>, path: &Path) -> Result<bool> {
    let loaded = ConfigLoader::load_from(path)?;
    let changed = tx.send_if_modified(|current| {
        if *current == loaded {
            return false;
        }
        *current = loaded;
        true
    });
    debug!(changed, "Config compared with published value");
    Ok(changed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_reload_publishes_changes() {
        let (watcher, mut rx) = ConfigWatcher::new(AppConfig::default());
        let file = write_config("[arbitrage]\nmax_hops = 3\n");

        assert!(watcher.reload(file.path()).unwrap());
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().arbitrage.max_hops, 3);
        assert_eq!(watcher.current().arbitrage.max_hops, 3);
    }

    #[test]
    fn test_reload_skips_identical_config() {
        let (watcher, rx) = ConfigWatcher::new(AppConfig::default());
        let file = write_config("[arbitrage]\nmax_hops = 5\n");

        assert!(!watcher.reload(file.path()).unwrap());
        assert!(!rx.has_changed().unwrap());
    }

    #[test]
    fn test_reload_keeps_previous_config_on_parse_error() {
        let (watcher, _rx) = ConfigWatcher::new(AppConfig::default());
        let file = write_config("[arbitrage]\nmax_hops = \"many\"\n");

        assert!(watcher.reload(file.path()).is_err());
        assert_eq!(watcher.current(), AppConfig::default());
    }
}
