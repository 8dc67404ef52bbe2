// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! State Store Implementations
//!
//! The signer keeps everything it remembers in one key-value document:
//!
//! ```json
//! {
//!   "private_key": "<64 hex>",
//!   "relays": { "wss://relay": { "read": true, "write": true } },
//!   "policies": { "<host>": { "true": { "<type>": { "conditions": {}, "created_at": 0 } } } },
//!   "notifications": false,
//!   "protocol_handler": "https://njump.me/{raw}"
//! }
//! ```
//!
//! These keys are the compatibility surface and must not be renamed.
//!
//! - **JsonFileStateStore** - the document on disk, rewritten atomically after
//!   every change (mode 0600 on unix)
//! - **InMemoryStateStore** - the same document in memory, for tests
//!
//! Both implement [`PolicyRepository`] and [`SettingsRepository`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

use crate::domain::action::{ActionType, Origin};
use crate::domain::policy::{Conditions, Decision, PolicyBook, PolicyFilter, PolicyRecord};
use crate::domain::relay::RelayList;
use crate::domain::repository::{PolicyRepository, SettingsRepository, StoreError};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key: Option<String>,
    #[serde(default)]
    pub relays: RelayList,
    #[serde(default)]
    pub policies: PolicyBook,
    #[serde(default)]
    pub notifications: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol_handler: Option<String>,
}

/// Where a changed document goes.
#[async_trait]
pub trait StateBackend: Send + Sync {
    async fn persist(&self, state: &PersistedState) -> Result<(), StoreError>;
}

#[derive(Debug, Default)]
pub struct MemoryBackend;

#[async_trait]
impl StateBackend for MemoryBackend {
    async fn persist(&self, _state: &PersistedState) -> Result<(), StoreError> {
        Ok(())
    }
}

#[derive(Debug)]
pub struct JsonFile {
    path: PathBuf,
}

#[async_trait]
impl StateBackend for JsonFile {
    async fn persist(&self, state: &PersistedState) -> Result<(), StoreError> {
        let data = serde_json::to_vec_pretty(state)?;
        write_atomic(&self.path, &data).await
    }
}

async fn write_atomic(path: &Path, data: &[u8]) -> Result<(), StoreError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }

    let temp_path = path.with_extension("json.tmp");
    let mut file = create_private(&temp_path).await?;
    file.write_all(data).await?;
    file.sync_all().await?;
    drop(file);

    tokio::fs::rename(&temp_path, path).await?;
    debug!(path = ?path, bytes = data.len(), "State written");
    Ok(())
}

/// Fresh file readable by the owner only from the moment it exists. A stale
/// file at `path` is removed first, since `mode` only applies on creation.
async fn create_private(path: &Path) -> std::io::Result<tokio::fs::File> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }

    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    options.mode(0o600);
    options.open(path).await
}

/// The state document behind a lock, written through `B` on change.
pub struct StateStore<B> {
    state: Mutex<PersistedState>,
    backend: B,
}

pub type InMemoryStateStore = StateStore<MemoryBackend>;
pub type JsonFileStateStore = StateStore<JsonFile>;

impl StateStore<MemoryBackend> {
    pub fn new() -> Self {
        Self::with_state(PersistedState::default())
    }

    pub fn with_state(state: PersistedState) -> Self {
        Self {
            state: Mutex::new(state),
            backend: MemoryBackend,
        }
    }
}

impl Default for StateStore<MemoryBackend> {
    fn default() -> Self {
        Self::new()
    }
}

impl StateStore<JsonFile> {
    /// Loads the document at `path`. A missing file is an empty state.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let state = match tokio::fs::read(&path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => PersistedState::default(),
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = ?path, "No state file yet, starting empty");
                PersistedState::default()
            }
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            state: Mutex::new(state),
            backend: JsonFile { path },
        })
    }

    pub fn path(&self) -> &Path {
        &self.backend.path
    }
}

impl<B: StateBackend> StateStore<B> {
    pub async fn snapshot(&self) -> PersistedState {
        self.state.lock().await.clone()
    }

    async fn read<T>(&self, f: impl FnOnce(&PersistedState) -> T) -> T {
        f(&*self.state.lock().await)
    }

    /// Applies `f` to a copy, persists the copy if it changed, then commits.
    /// A failed write leaves the in-memory state untouched.
    async fn update<T>(&self, f: impl FnOnce(&mut PersistedState) -> T) -> Result<T, StoreError> {
        let mut state = self.state.lock().await;
        let mut next = state.clone();
        let out = f(&mut next);
        if next != *state {
            self.backend.persist(&next).await?;
            *state = next;
        }
        Ok(out)
    }
}

#[async_trait]
impl<B: StateBackend> PolicyRepository for StateStore<B> {
    async fn get(&self, origin: &Origin, action: ActionType, kind: Option<u32>) -> Result<Option<Decision>, StoreError> {
        Ok(self.read(|s| s.policies.decision_for(origin, action, kind)).await)
    }

    async fn put(
        &self,
        origin: &Origin,
        action: ActionType,
        decision: Decision,
        conditions: Conditions,
    ) -> Result<(), StoreError> {
        let now = chrono::Utc::now().timestamp();
        self.update(|s| s.policies.put(origin, action, decision, conditions, now))
            .await
    }

    async fn remove_all(&self, origin: &Origin, decision: Decision, action: Option<ActionType>) -> Result<usize, StoreError> {
        self.update(|s| s.policies.remove_all(origin, decision, action)).await
    }

    async fn list(&self, filter: &PolicyFilter) -> Result<Vec<PolicyRecord>, StoreError> {
        Ok(self.read(|s| s.policies.records(filter)).await)
    }
}

#[async_trait]
impl<B: StateBackend> SettingsRepository for StateStore<B> {
    async fn private_key(&self) -> Result<Option<String>, StoreError> {
        Ok(self.read(|s| s.private_key.clone()).await)
    }

    async fn set_private_key(&self, hex: Option<String>) -> Result<(), StoreError> {
        self.update(|s| s.private_key = hex).await
    }

    async fn relays(&self) -> Result<RelayList, StoreError> {
        Ok(self.read(|s| s.relays.clone()).await)
    }

    async fn set_relays(&self, relays: RelayList) -> Result<(), StoreError> {
        self.update(|s| s.relays = relays).await
    }

    async fn notifications(&self) -> Result<bool, StoreError> {
        Ok(self.read(|s| s.notifications).await)
    }

    async fn set_notifications(&self, enabled: bool) -> Result<(), StoreError> {
        self.update(|s| s.notifications = enabled).await
    }

    async fn protocol_handler(&self) -> Result<Option<String>, StoreError> {
        Ok(self.read(|s| s.protocol_handler.clone()).await)
    }

    async fn set_protocol_handler(&self, template: Option<String>) -> Result<(), StoreError> {
        self.update(|s| s.protocol_handler = template).await
    }
}
