//! File-backed configuration store with hot reload.
//!
//! `FileConfigStore` holds a single named resource (normally `config`) in a
//! YAML or JSON file and reports changes as [`ConfigEvent`]s: `new` on the
//! first successful load, `update` on every later change to the contents and
//! `delete` when the file goes away. The file is watched with `notify`.

use crate::core::{ConfigAction, ConfigEvent};
use crate::task_manager::TaskManager;
use notify::{event::EventKind, Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use serde_json::Value;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

#[derive(Error, Debug)]
pub enum ConfigStoreError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("failed to watch configuration file: {0}")]
    Watch(#[from] notify::Error),
}

/// A configuration store backed by one file on disk.
#[derive(Debug, Clone)]
pub struct FileConfigStore {
    path: PathBuf,
    name: String,
}

impl FileConfigStore {
    /// Creates a store that serves the file at `path` as the resource `name`.
    pub fn new(path: impl Into<PathBuf>, name: impl Into<String>) -> Result<Self, ConfigStoreError> {
        let path = path.into();
        let path = std::path::absolute(&path).map_err(|source| ConfigStoreError::Io {
            path: path.clone(),
            source,
        })?;
        Ok(Self {
            path,
            name: name.into(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads and parses the file.
    pub async fn load(&self) -> Result<Value, ConfigStoreError> {
        let text = fs::read_to_string(&self.path)
            .await
            .map_err(|source| ConfigStoreError::Io {
                path: self.path.clone(),
                source,
            })?;
        parse_contents(&self.path, &text)
    }

    /// Starts watching the file. Change events are sent on `events_tx`; the
    /// watcher stops when the task manager's shutdown signal fires.
    pub fn spawn(
        self,
        events_tx: mpsc::Sender<ConfigEvent>,
        task_manager: &TaskManager,
    ) -> Result<(), ConfigStoreError> {
        let (fs_tx, fs_rx) = mpsc::channel(100);
        let mut watcher = RecommendedWatcher::new(
            move |res: Result<Event, notify::Error>| match res {
                Ok(event) => {
                    if let Err(e) = fs_tx.blocking_send(event) {
                        debug!("Configuration watcher channel closed: {}", e);
                    }
                }
                Err(e) => error!("Configuration watcher error: {}", e),
            },
            Config::default(),
        )?;

        let watch_dir = self
            .path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("/"));
        watcher.watch(&watch_dir, RecursiveMode::NonRecursive)?;
        info!(path = %self.path.display(), "Watching configuration file");

        let shutdown_rx = task_manager.get_shutdown_rx();
        task_manager.spawn("ConfigStoreWatcher", async move {
            // The watcher must outlive the loop, it stops when dropped.
            let _watcher = watcher;
            self.run(fs_rx, events_tx, shutdown_rx).await;
        });
        Ok(())
    }

    async fn run(
        self,
        mut fs_rx: mpsc::Receiver<Event>,
        events_tx: mpsc::Sender<ConfigEvent>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        let mut last: Option<Value> = None;
        self.reload(&mut last, &events_tx).await;

        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.changed() => {
                    debug!("Configuration watcher received shutdown signal.");
                    break;
                }
                event = fs_rx.recv() => {
                    let Some(event) = event else { break };
                    if !event.paths.iter().any(|p| p == &self.path) {
                        continue;
                    }
                    match event.kind {
                        EventKind::Remove(_) if !self.path.exists() => {
                            if last.take().is_some() {
                                info!(path = %self.path.display(), "Configuration file removed");
                                let event = ConfigEvent::new(&self.name, ConfigAction::Delete, Value::Null);
                                if events_tx.send(event).await.is_err() {
                                    break;
                                }
                            }
                        }
                        EventKind::Create(_) | EventKind::Modify(_) => {
                            self.reload(&mut last, &events_tx).await;
                        }
                        _ => {}
                    }
                }
            }
        }
        debug!("Configuration watcher finished.");
    }

    /// Loads the file and emits `new` or `update` if the contents changed.
    async fn reload(&self, last: &mut Option<Value>, events_tx: &mpsc::Sender<ConfigEvent>) {
        if !self.path.exists() {
            warn!(path = %self.path.display(), "Configuration file does not exist yet");
            return;
        }
        let contents = match self.load().await {
            Ok(contents) => contents,
            Err(e) => {
                error!("Failed to load configuration: {}", e);
                return;
            }
        };
        if last.as_ref() == Some(&contents) {
            debug!("Configuration file touched without changes");
            return;
        }

        let action = if last.is_some() {
            ConfigAction::Update
        } else {
            ConfigAction::New
        };
        info!(name = %self.name, %action, "Configuration changed");
        *last = Some(contents.clone());
        if events_tx
            .send(ConfigEvent::new(&self.name, action, contents))
            .await
            .is_err()
        {
            debug!("Configuration event receiver dropped");
        }
    }
}

/// Parses configuration text. `.json` files are read as JSON, anything else
/// as YAML.
pub fn parse_contents(path: &Path, text: &str) -> Result<Value, ConfigStoreError> {
    let is_json = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

    let parsed = if is_json {
        serde_json::from_str(text).map_err(|e| e.to_string())
    } else {
        serde_yml::from_str(text).map_err(|e| e.to_string())
    };
    parsed.map_err(|message| ConfigStoreError::Parse {
        path: path.to_path_buf(),
        message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_yaml_contents() {
        let text = r##"
slack_api_token: xoxb-test
agent_channel_config:
  ag1: ["#ops", "#alerts"]
"##;
        let value = parse_contents(Path::new("config.yml"), text).unwrap();
        assert_eq!(
            value,
            json!({
                "slack_api_token": "xoxb-test",
                "agent_channel_config": { "ag1": ["#ops", "#alerts"] }
            })
        );
    }

    #[test]
    fn test_parse_json_contents() {
        let value = parse_contents(Path::new("config.JSON"), r#"{"slack_api_token": 5}"#).unwrap();
        assert_eq!(value, json!({ "slack_api_token": 5 }));
    }

    #[test]
    fn test_parse_errors_name_the_file() {
        let err = parse_contents(Path::new("broken.json"), "{").unwrap_err();
        assert!(matches!(err, ConfigStoreError::Parse { .. }));
        assert!(err.to_string().contains("broken.json"));
    }

    #[tokio::test]
    async fn test_load_missing_file_is_io_error() {
        let store = FileConfigStore::new("/nonexistent/slack-health/config.yml", "config").unwrap();
        assert!(matches!(store.load().await, Err(ConfigStoreError::Io { .. })));
    }
}
