//! Draft persistence: debounced autosave per draft, backed by S3.

pub mod s3;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::cv::autosave::{Autosaver, DraftKey, DraftSink, DEFAULT_IDLE_TIMEOUT};
use crate::cv::document::EditableCV;
use crate::cv::store;
use crate::errors::AppError;
use crate::state::AppState;

type SaverMap = HashMap<DraftKey, Arc<Autosaver>>;

fn lock(savers: &Mutex<SaverMap>) -> MutexGuard<'_, SaverMap> {
    savers.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// One `Autosaver` per open draft, created on first use and dropped once it
/// has gone idle.
pub struct AutosaveRegistry {
    sink: Arc<dyn DraftSink>,
    delay: Duration,
    idle: Duration,
    savers: Arc<Mutex<SaverMap>>,
}

impl AutosaveRegistry {
    pub fn new(sink: Arc<dyn DraftSink>, delay: Duration) -> Self {
        Self::with_idle_timeout(sink, delay, DEFAULT_IDLE_TIMEOUT)
    }

    pub fn with_idle_timeout(sink: Arc<dyn DraftSink>, delay: Duration, idle: Duration) -> Self {
        Self {
            sink,
            delay,
            idle,
            savers: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// The live saver for `key`, replacing one whose task has stopped.
    fn saver(&self, key: &DraftKey) -> Arc<Autosaver> {
        let mut savers = lock(&self.savers);
        if let Some(saver) = savers.get(key).filter(|s| !s.is_closed()) {
            return saver.clone();
        }

        let map: Weak<Mutex<SaverMap>> = Arc::downgrade(&self.savers);
        let stopped = key.clone();
        let saver = Arc::new(Autosaver::spawn_with(
            self.sink.clone(),
            key.clone(),
            self.delay,
            self.idle,
            move || {
                let Some(map) = map.upgrade() else {
                    return;
                };
                let mut savers = lock(&map);
                // A replacement may already hold the slot.
                if savers.get(&stopped).is_some_and(|s| s.is_closed()) {
                    savers.remove(&stopped);
                }
            },
        ));
        savers.insert(key.clone(), saver.clone());
        saver
    }

    pub fn update(&self, key: &DraftKey, doc: EditableCV) {
        // A saver that stopped between lookup and send is replaced on the next pass.
        while self.saver(key).update(&doc).is_err() {}
    }

    /// Clears the stored draft and writes `doc` immediately.
    pub async fn import(&self, key: &DraftKey, doc: &EditableCV) -> Result<(), AppError> {
        loop {
            if let Ok(result) = self.saver(key).import(doc).await {
                return result;
            }
        }
    }

    /// Newest known snapshot: a pending edit if any, else the stored blob.
    pub async fn load(&self, key: &DraftKey) -> Result<Option<EditableCV>, AppError> {
        let pending = lock(&self.savers).get(key).and_then(|s| s.latest());
        match pending {
            Some(doc) => Ok(Some(doc)),
            None => self.sink.load(key).await,
        }
    }

    pub async fn remove(&self, key: &DraftKey) -> Result<(), AppError> {
        let removed = lock(&self.savers).remove(key);
        if let Some(saver) = removed {
            if let Ok(result) = saver.clear().await {
                return result;
            }
        }
        self.sink.clear(key).await
    }

    /// Flushes every pending edit and stops all savers.
    pub async fn shutdown(&self) {
        let savers: Vec<_> = lock(&self.savers).drain().map(|(_, s)| s).collect();
        info!("Flushing {} open draft(s)", savers.len());
        for saver in savers {
            saver.shutdown().await;
        }
    }

    #[cfg(test)]
    fn open_savers(&self) -> usize {
        lock(&self.savers).len()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// GET /api/v1/drafts/:id
pub async fn handle_get_draft(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(draft_id): Path<Uuid>,
) -> Result<Json<EditableCV>, AppError> {
    let key = DraftKey::new(user_id, draft_id);
    state
        .drafts
        .load(&key)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Draft {draft_id} not found")))
}

/// PUT /api/v1/drafts/:id
pub async fn handle_put_draft(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(draft_id): Path<Uuid>,
    Json(doc): Json<EditableCV>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let key = DraftKey::new(user_id, draft_id);
    let doc = store::ensure_personal(doc);
    state.drafts.update(&key, doc);
    Ok((StatusCode::ACCEPTED, Json(json!({ "status": "queued" }))))
}

/// DELETE /api/v1/drafts/:id
pub async fn handle_delete_draft(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(draft_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let key = DraftKey::new(user_id, draft_id);
    state.drafts.remove(&key).await?;
    info!("Deleted draft {key}");
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use async_trait::async_trait;

    #[derive(Default)]
    pub struct MemoryDraftSink {
        pub blobs: Mutex<HashMap<DraftKey, EditableCV>>,
    }

    #[async_trait]
    impl DraftSink for MemoryDraftSink {
        async fn save(&self, key: &DraftKey, doc: &EditableCV) -> Result<(), AppError> {
            self.blobs.lock().unwrap().insert(key.clone(), doc.clone());
            Ok(())
        }

        async fn load(&self, key: &DraftKey) -> Result<Option<EditableCV>, AppError> {
            Ok(self.blobs.lock().unwrap().get(key).cloned())
        }

        async fn clear(&self, key: &DraftKey) -> Result<(), AppError> {
            self.blobs.lock().unwrap().remove(key);
            Ok(())
        }
    }
}
