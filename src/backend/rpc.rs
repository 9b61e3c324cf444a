//! JSON-RPC 2.0 over newline-delimited streams
//!
//! One writer and one reader task per channel. Responses are routed back to their
//! callers by request id, so any number of requests can be outstanding at once.
//! Lines that carry a `method` but no `id` are backend notifications (events).

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{oneshot, Mutex};
use tokio_util::sync::CancellationToken;

use super::provider::BackendError;

// ============================================================================
// JSON-RPC Types
// ============================================================================

#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<Value>,
}

/// Any line the backend may send: a response (id) or a notification (method)
#[derive(Debug, Deserialize)]
struct JsonRpcMessage {
    #[serde(default)]
    id: Option<u64>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    params: Option<Value>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    #[allow(dead_code)]
    code: i64,
    message: String,
}

/// Fire-and-forget message pushed by the backend
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub method: String,
    pub params: Value,
}

/// Callback for backend notifications, invoked on the reader task
pub type NotificationCallback = Box<dyn Fn(Notification) + Send + Sync>;

type PendingMap = Arc<DashMap<u64, oneshot::Sender<Result<Value, BackendError>>>>;

// ============================================================================
// Channel
// ============================================================================

pub struct RpcChannel {
    writer: Mutex<Box<dyn AsyncWrite + Send + Unpin>>,
    pending: PendingMap,
    next_id: AtomicU64,
    closed: Arc<AtomicBool>,
    shutdown: CancellationToken,
}

/// Removes an abandoned request from the pending table when its caller goes away
struct PendingGuard<'a> {
    pending: &'a PendingMap,
    id: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.remove(&self.id);
    }
}

impl RpcChannel {
    /// Wrap a reader/writer pair and start the reader task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new<R, W>(reader: R, writer: W, on_notification: NotificationCallback) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let pending: PendingMap = Arc::new(DashMap::new());
        let closed = Arc::new(AtomicBool::new(false));
        let shutdown = CancellationToken::new();

        tokio::spawn(read_loop(
            reader,
            pending.clone(),
            closed.clone(),
            on_notification,
            shutdown.clone(),
        ));

        Self {
            writer: Mutex::new(Box::new(writer)),
            pending,
            next_id: AtomicU64::new(1),
            closed,
            shutdown,
        }
    }

    /// Whether the reader has stopped (backend exited or channel shut down)
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Number of requests still waiting for a response
    pub fn pending_requests(&self) -> usize {
        self.pending.len()
    }

    /// Send a request and wait for its response
    pub async fn call(&self, method: &str, params: Option<Value>) -> Result<Value, BackendError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();

        self.pending.insert(id, tx);
        let _guard = PendingGuard {
            pending: &self.pending,
            id,
        };

        // Checked after registering so the reader either sees us or we see it closed
        if self.is_closed() {
            return Err(BackendError::Unavailable(
                "backend channel is closed".to_string(),
            ));
        }

        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            id,
            method,
            params,
        };
        let mut line = serde_json::to_string(&request)
            .map_err(|e| BackendError::Protocol(format!("Failed to serialize request: {}", e)))?;
        line.push('\n');

        log::debug!("backend → {}", line.trim_end());

        {
            let mut writer = self.writer.lock().await;
            writer
                .write_all(line.as_bytes())
                .await
                .map_err(|e| BackendError::Transport(format!("Failed to write to backend: {}", e)))?;
            writer
                .flush()
                .await
                .map_err(|e| BackendError::Transport(format!("Failed to flush: {}", e)))?;
        }

        rx.await.map_err(|_| {
            BackendError::Unavailable("backend channel closed before responding".to_string())
        })?
    }

    /// Stop the reader task; outstanding calls fail with `Unavailable`
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

impl Drop for RpcChannel {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn read_loop<R>(
    reader: R,
    pending: PendingMap,
    closed: Arc<AtomicBool>,
    on_notification: NotificationCallback,
    shutdown: CancellationToken,
) where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();

    loop {
        let next = tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                log::debug!("RPC reader shutting down");
                break;
            }
            next = lines.next_line() => next,
        };

        match next {
            Ok(Some(line)) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                log::debug!("backend ← {}", trimmed);
                dispatch_line(trimmed, &pending, &on_notification);
            }
            Ok(None) => {
                log::warn!("Backend closed its output stream");
                break;
            }
            Err(e) => {
                log::error!("Failed to read from backend: {}", e);
                break;
            }
        }
    }

    closed.store(true, Ordering::SeqCst);

    let ids: Vec<u64> = pending.iter().map(|entry| *entry.key()).collect();
    for id in ids {
        if let Some((_, tx)) = pending.remove(&id) {
            let _ = tx.send(Err(BackendError::Unavailable(
                "backend channel closed before responding".to_string(),
            )));
        }
    }
}

fn dispatch_line(line: &str, pending: &PendingMap, on_notification: &NotificationCallback) {
    let message: JsonRpcMessage = match serde_json::from_str(line) {
        Ok(message) => message,
        Err(e) => {
            log::warn!("Ignoring non JSON-RPC line from backend ({}): {}", e, line);
            return;
        }
    };

    match (message.id, message.method) {
        (Some(id), None) => {
            let Some((_, tx)) = pending.remove(&id) else {
                log::debug!("Dropping response for abandoned request {}", id);
                return;
            };
            let outcome = match (message.error, message.result) {
                (Some(error), _) => Err(BackendError::Remote(error.message)),
                (None, Some(result)) => Ok(result),
                (None, None) => Ok(Value::Null),
            };
            let _ = tx.send(outcome);
        }
        (None, Some(method)) => on_notification(Notification {
            method,
            params: message.params.unwrap_or(Value::Null),
        }),
        (Some(id), Some(method)) => {
            log::warn!(
                "Backend sent request '{}' (id {}); the client does not serve requests",
                method,
                id
            );
        }
        (None, None) => log::warn!("Ignoring backend message with neither id nor method"),
    }
}
