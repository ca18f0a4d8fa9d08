//! WebSocket client for file-change notifications with exponential
//! reconnect backoff.

use std::future::Future;
use std::path::{Component, Path, PathBuf};
use std::pin::Pin;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use codesync_embed::Embedder;
use futures::{Stream, StreamExt};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_util::sync::CancellationToken;

use crate::error::WatchError;
use crate::indexer::CodeIndexer;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Inbound text frames. The stream ending means the peer closed.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<String, WatchError>> + Send>>;

/// Invoked once per accepted change event.
pub type ChangeHandler = Arc<dyn Fn(FileChangeEvent) + Send + Sync>;

const FILE_CHANGED: &str = "file_changed";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherState {
    Disconnected,
    Connecting,
    Connected,
    /// Terminal; no further connections or callbacks.
    Destroyed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FileChangeEvent {
    pub file_path: String,
    pub timestamp: f64,
}

#[derive(Debug, Clone)]
pub struct WatcherConfig {
    pub url: String,
    pub base_interval: Duration,
    pub max_reconnect_attempts: u32,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:3001".into(),
            base_interval: Duration::from_millis(1000),
            max_reconnect_attempts: 5,
        }
    }
}

/// Opens the notification socket.
pub trait Connector: Send + Sync {
    fn connect(&self, url: &str) -> BoxFuture<'_, Result<FrameStream, WatchError>>;
}

/// [`Connector`] over `tokio-tungstenite`. Only text frames are surfaced.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

impl Connector for WsConnector {
    fn connect(&self, url: &str) -> BoxFuture<'_, Result<FrameStream, WatchError>> {
        let url = url.to_owned();
        Box::pin(async move {
            let (ws, _) = connect_async(url.as_str())
                .await
                .map_err(|e| WatchError::Connect(e.to_string()))?;

            let frames = futures::stream::unfold(ws, |mut ws| async move {
                loop {
                    let Some(message) = ws.next().await else {
                        return None;
                    };
                    match message {
                        Ok(WsMessage::Text(text)) => return Some((Ok(text.to_string()), ws)),
                        Ok(WsMessage::Close(_)) => return None,
                        Ok(_) => {}
                        Err(e) => return Some((Err(WatchError::Socket(e.to_string())), ws)),
                    }
                }
            });
            Ok(Box::pin(frames) as FrameStream)
        })
    }
}

/// `base × 2^(attempt-1)`, saturating. `attempt` starts at 1.
#[must_use]
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    2u32.checked_pow(attempt.saturating_sub(1))
        .map_or(Duration::MAX, |factor| base.saturating_mul(factor))
}

/// Accept only `{type: "file_changed", filePath: string, timestamp: number}`.
#[must_use]
pub fn parse_event(text: &str) -> Option<FileChangeEvent> {
    let value: Value = serde_json::from_str(text).ok()?;
    if value.get("type")?.as_str()? != FILE_CHANGED {
        return None;
    }
    let file_path = value.get("filePath")?.as_str()?.to_owned();
    let timestamp = value.get("timestamp")?.as_f64()?;
    Some(FileChangeEvent {
        file_path,
        timestamp,
    })
}

/// True if any path segment starts with a dot (`.` and `..` excluded).
#[must_use]
pub fn is_hidden_path(path: &str) -> bool {
    Path::new(path).components().any(|c| match c {
        Component::Normal(name) => name.to_string_lossy().starts_with('.'),
        _ => false,
    })
}

struct Shared {
    config: WatcherConfig,
    connector: Arc<dyn Connector>,
    handler: ChangeHandler,
    state: Mutex<WatcherState>,
    attempts: AtomicU32,
    cancel: CancellationToken,
}

impl Shared {
    fn state(&self) -> WatcherState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns false once destroyed; `Destroyed` is never left.
    fn transition(&self, to: WatcherState) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state == WatcherState::Destroyed {
            return false;
        }
        *state = to;
        true
    }

    fn dispatch(&self, text: &str) {
        let Some(event) = parse_event(text) else {
            tracing::debug!(frame = text, "ignoring unrecognized watch frame");
            return;
        };
        if is_hidden_path(&event.file_path) {
            tracing::debug!(file = %event.file_path, "ignoring hidden path");
            return;
        }
        if self.cancel.is_cancelled() {
            return;
        }
        (self.handler)(event);
    }
}

/// Keeps one notification socket open and forwards change events.
pub struct ChangeWatcher {
    shared: Arc<Shared>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ChangeWatcher {
    #[must_use]
    pub fn new(
        config: WatcherConfig,
        connector: Arc<dyn Connector>,
        handler: ChangeHandler,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                connector,
                handler,
                state: Mutex::new(WatcherState::Disconnected),
                attempts: AtomicU32::new(0),
                cancel: CancellationToken::new(),
            }),
            task: Mutex::new(None),
        }
    }

    /// Start (or restart after retries ran out) the connection loop.
    /// No-op while connecting, connected or destroyed.
    pub fn connect(&self) {
        {
            let mut state = self.shared.state.lock().unwrap_or_else(PoisonError::into_inner);
            if *state != WatcherState::Disconnected {
                return;
            }
            *state = WatcherState::Connecting;
        }
        self.shared.attempts.store(0, Ordering::SeqCst);

        let mut task = self.task.lock().unwrap_or_else(PoisonError::into_inner);
        // A loop waiting out a backoff delay is superseded.
        if let Some(previous) = task.take() {
            previous.abort();
        }
        *task = Some(tokio::spawn(run(Arc::clone(&self.shared))));
    }

    /// Enter the terminal state: cancel any pending reconnect and close the
    /// socket. Idempotent.
    pub fn destroy(&self) {
        {
            let mut state = self.shared.state.lock().unwrap_or_else(PoisonError::into_inner);
            if *state == WatcherState::Destroyed {
                return;
            }
            *state = WatcherState::Destroyed;
        }
        self.shared.cancel.cancel();
        if let Some(task) = self.task.lock().unwrap_or_else(PoisonError::into_inner).take() {
            task.abort();
        }
        tracing::info!(url = %self.shared.config.url, "watcher destroyed");
    }

    #[must_use]
    pub fn state(&self) -> WatcherState {
        self.shared.state()
    }

    #[must_use]
    pub fn reconnect_attempts(&self) -> u32 {
        self.shared.attempts.load(Ordering::SeqCst)
    }
}

impl Drop for ChangeWatcher {
    fn drop(&mut self) {
        self.shared.cancel.cancel();
    }
}

async fn run(shared: Arc<Shared>) {
    loop {
        if !shared.transition(WatcherState::Connecting) {
            return;
        }
        let outcome = tokio::select! {
            () = shared.cancel.cancelled() => return,
            outcome = session(&shared) => outcome,
        };
        if !shared.transition(WatcherState::Disconnected) {
            return;
        }
        match outcome {
            Ok(()) => tracing::info!(url = %shared.config.url, "watch socket closed"),
            Err(e) => tracing::warn!(url = %shared.config.url, "watch socket failed: {e}"),
        }

        let attempt = shared.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt > shared.config.max_reconnect_attempts {
            tracing::warn!(
                attempts = shared.config.max_reconnect_attempts,
                "giving up on watch socket until connect() is called"
            );
            return;
        }
        let delay = backoff_delay(shared.config.base_interval, attempt);
        tracing::info!(attempt, ?delay, "reconnecting watch socket");
        tokio::select! {
            () = shared.cancel.cancelled() => return,
            () = tokio::time::sleep(delay) => {}
        }
    }
}

async fn session(shared: &Shared) -> Result<(), WatchError> {
    let mut frames = shared.connector.connect(&shared.config.url).await?;
    if !shared.transition(WatcherState::Connected) {
        return Ok(());
    }
    shared.attempts.store(0, Ordering::SeqCst);
    tracing::info!(url = %shared.config.url, "watch socket connected");

    while let Some(frame) = frames.next().await {
        shared.dispatch(&frame?);
    }
    Ok(())
}

/// Handler that queues events for a task reconciling each changed file.
/// Failures are logged and the task moves on to the next event. The task
/// ends once every clone of the handler is dropped.
pub fn spawn_reindexer<E: Embedder + 'static>(
    indexer: Arc<CodeIndexer<E>>,
    collection: String,
) -> (ChangeHandler, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel::<FileChangeEvent>();

    let handle = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let path = PathBuf::from(&event.file_path);
            match indexer.reconcile_file(&collection, &path).await {
                Ok(report) => tracing::debug!(
                    file = %event.file_path,
                    fragments = report.fragments,
                    "reindexed"
                ),
                Err(e) => tracing::warn!(file = %event.file_path, "reindex failed: {e}"),
            }
        }
    });

    let handler: ChangeHandler = Arc::new(move |event| {
        let _ = tx.send(event);
    });
    (handler, handle)
}
