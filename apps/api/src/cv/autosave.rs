//! Debounced draft autosave.
//!
//! Each draft gets a background task that owns every write to its stored
//! blob. Edits, imports and clears reach it over one channel, so they are
//! applied in the order they were sent. An edit is written once no other
//! command has arrived for the quiet period. An import drops the pending
//! edit, clears the stored draft and writes the imported document straight
//! away. A task with nothing pending stops after the idle timeout.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::cv::document::EditableCV;
use crate::errors::AppError;

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(1500);

/// How long a saver with nothing pending stays alive.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Identifies one stored draft.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DraftKey {
    pub user_id: Uuid,
    pub draft_id: Uuid,
}

impl DraftKey {
    pub fn new(user_id: Uuid, draft_id: Uuid) -> Self {
        Self { user_id, draft_id }
    }

    /// Object key in the draft bucket.
    pub fn object_key(&self) -> String {
        format!("drafts/{}/draft_{}.json", self.user_id, self.draft_id)
    }
}

impl fmt::Display for DraftKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.user_id, self.draft_id)
    }
}

/// Where drafts are persisted. Carried as `Arc<dyn DraftSink>`.
#[async_trait]
pub trait DraftSink: Send + Sync {
    async fn save(&self, key: &DraftKey, doc: &EditableCV) -> Result<(), AppError>;
    async fn load(&self, key: &DraftKey) -> Result<Option<EditableCV>, AppError>;
    async fn clear(&self, key: &DraftKey) -> Result<(), AppError>;
}

type Reply = oneshot::Sender<Result<(), AppError>>;

enum Command {
    Update(EditableCV),
    Import(EditableCV, Reply),
    Clear(Reply),
    Stop(oneshot::Sender<()>),
}

/// Returned when the saver's task has already stopped; the caller should
/// retry on a fresh saver.
#[derive(Debug)]
pub struct SaverClosed;

pub struct Autosaver {
    key: DraftKey,
    tx: mpsc::UnboundedSender<Command>,
    /// Newest snapshot sent to this saver, written or not.
    latest: Arc<Mutex<Option<EditableCV>>>,
}

impl Autosaver {
    /// `on_stop` runs after the task has flushed and stopped taking commands.
    pub fn spawn_with(
        sink: Arc<dyn DraftSink>,
        key: DraftKey,
        delay: Duration,
        idle: Duration,
        on_stop: impl FnOnce() + Send + 'static,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let latest = Arc::new(Mutex::new(None));
        let worker = Worker {
            sink,
            key: key.clone(),
            pending: None,
            written: None,
        };
        tokio::spawn(async move {
            worker.run(rx, delay, idle).await;
            on_stop();
        });
        Self { key, tx, latest }
    }

    fn latest_slot(&self) -> MutexGuard<'_, Option<EditableCV>> {
        self.latest.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// True once the task no longer accepts commands.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Queues a snapshot; only the newest one after the quiet period is written.
    pub fn update(&self, doc: &EditableCV) -> Result<(), SaverClosed> {
        self.tx
            .send(Command::Update(doc.clone()))
            .map_err(|_| SaverClosed)?;
        *self.latest_slot() = Some(doc.clone());
        Ok(())
    }

    /// The newest snapshot seen by this saver, written or not.
    pub fn latest(&self) -> Option<EditableCV> {
        self.latest_slot().clone()
    }

    /// Replaces the stored draft with an imported document, discarding any
    /// pending edit. Waits for edits queued earlier to be handled first.
    pub async fn import(&self, doc: &EditableCV) -> Result<Result<(), AppError>, SaverClosed> {
        let (reply, done) = oneshot::channel();
        self.tx
            .send(Command::Import(doc.clone(), reply))
            .map_err(|_| SaverClosed)?;
        *self.latest_slot() = Some(doc.clone());
        done.await.map_err(|_| SaverClosed)
    }

    /// Drops any pending snapshot and clears the stored draft.
    pub async fn clear(&self) -> Result<Result<(), AppError>, SaverClosed> {
        let (reply, done) = oneshot::channel();
        self.tx
            .send(Command::Clear(reply))
            .map_err(|_| SaverClosed)?;
        *self.latest_slot() = None;
        done.await.map_err(|_| SaverClosed)
    }

    /// Flushes the pending snapshot, if any, and stops the background task.
    pub async fn shutdown(&self) {
        let (stop, done) = oneshot::channel();
        if self.tx.send(Command::Stop(stop)).is_ok() && done.await.is_err() {
            warn!("Autosave task for {} ended abnormally", self.key);
        }
    }
}

struct Worker {
    sink: Arc<dyn DraftSink>,
    key: DraftKey,
    pending: Option<EditableCV>,
    written: Option<EditableCV>,
}

impl Worker {
    async fn run(
        mut self,
        mut rx: mpsc::UnboundedReceiver<Command>,
        delay: Duration,
        idle: Duration,
    ) {
        loop {
            let wait = if self.pending.is_some() { delay } else { idle };
            match tokio::time::timeout(wait, rx.recv()).await {
                Ok(Some(Command::Stop(done))) => {
                    self.drain(&mut rx).await;
                    let _ = done.send(());
                    return;
                }
                Ok(Some(cmd)) => self.handle(cmd).await,
                Ok(None) => break,
                Err(_) if self.pending.is_some() => self.flush().await,
                Err(_) => {
                    debug!("Autosave for draft {} idle, stopping", self.key);
                    break;
                }
            }
        }
        self.drain(&mut rx).await;
    }

    /// Stops accepting commands, handles those already queued and flushes.
    async fn drain(&mut self, rx: &mut mpsc::UnboundedReceiver<Command>) {
        rx.close();
        while let Some(cmd) = rx.recv().await {
            self.handle(cmd).await;
        }
        self.flush().await;
    }

    async fn handle(&mut self, cmd: Command) {
        match cmd {
            Command::Update(doc) => self.pending = Some(doc),
            Command::Import(doc, reply) => {
                self.pending = None;
                let result = self.replace(&doc).await;
                if result.is_ok() {
                    debug!("Draft {} replaced by import", self.key);
                }
                let _ = reply.send(result);
            }
            Command::Clear(reply) => {
                self.pending = None;
                self.written = None;
                let _ = reply.send(self.sink.clear(&self.key).await);
            }
            Command::Stop(done) => {
                self.flush().await;
                let _ = done.send(());
            }
        }
    }

    async fn replace(&mut self, doc: &EditableCV) -> Result<(), AppError> {
        self.written = None;
        self.sink.clear(&self.key).await?;
        self.sink.save(&self.key, doc).await?;
        self.written = Some(doc.clone());
        Ok(())
    }

    async fn flush(&mut self) {
        let Some(doc) = self.pending.take() else {
            return;
        };
        if self.written.as_ref() == Some(&doc) {
            debug!("Draft {} unchanged since last write", self.key);
            return;
        }
        match self.sink.save(&self.key, &doc).await {
            Ok(()) => {
                debug!("Draft {} autosaved", self.key);
                self.written = Some(doc);
            }
            Err(e) => warn!("Autosave of draft {} failed: {e}", self.key),
        }
    }
}
