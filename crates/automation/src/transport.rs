//! Request/response correlation over the browser's DevTools WebSocket.
//!
//! Commands carry a process-unique id; the reader task matches responses back
//! to the waiting caller by that id. Protocol events (no id) are not consumed
//! by this layer; callers poll page state instead of subscribing.

use futures::{SinkExt, StreamExt};
use notebridge_core::{Error, Result};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, trace, warn};

type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<std::result::Result<Value, String>>>>>;

#[derive(Debug, Deserialize)]
struct Incoming {
    id: Option<u64>,
    result: Option<Value>,
    error: Option<IncomingError>,
    method: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IncomingError {
    message: String,
}

pub struct CdpTransport {
    next_id: AtomicU64,
    pending: Pending,
    outgoing: mpsc::Sender<String>,
}

impl CdpTransport {
    pub async fn connect(ws_url: &str) -> Result<Arc<Self>> {
        let (stream, _) = connect_async(ws_url)
            .await
            .map_err(|e| Error::Surface(format!("connect {ws_url}: {e}")))?;
        let (mut sink, mut source) = stream.split();

        let (outgoing, mut outgoing_rx) = mpsc::channel::<String>(64);
        tokio::spawn(async move {
            while let Some(text) = outgoing_rx.recv().await {
                if let Err(e) = sink.send(Message::Text(text)).await {
                    warn!(error = %e, "DevTools socket write failed");
                    break;
                }
            }
        });

        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let reader_pending = pending.clone();
        tokio::spawn(async move {
            while let Some(next) = source.next().await {
                match next {
                    Ok(Message::Text(text)) => dispatch(&reader_pending, &text).await,
                    Ok(Message::Close(_)) | Err(_) => break,
                    Ok(_) => {}
                }
            }
            // Connection gone; wake everyone still waiting.
            let mut map = reader_pending.lock().await;
            for (_, tx) in map.drain() {
                let _ = tx.send(Err("DevTools connection closed".to_string()));
            }
        });

        Ok(Arc::new(Self {
            next_id: AtomicU64::new(1),
            pending,
            outgoing,
        }))
    }

    /// Issue one command and await its response. `session_id` scopes the
    /// command to an attached page target; `None` targets the browser.
    pub async fn call(
        &self,
        session_id: Option<&str>,
        method: &str,
        params: Value,
    ) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut request = json!({
            "id": id,
            "method": method,
            "params": params,
        });
        if let Some(session) = session_id {
            request["sessionId"] = json!(session);
        }

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        trace!(id, method, "DevTools command");
        if self.outgoing.send(request.to_string()).await.is_err() {
            self.pending.lock().await.remove(&id);
            return Err(Error::Surface("DevTools connection closed".to_string()));
        }

        match rx.await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(message)) => Err(Error::Surface(format!("{method}: {message}"))),
            Err(_) => Err(Error::Surface(format!("{method}: response channel dropped"))),
        }
    }
}

async fn dispatch(pending: &Pending, text: &str) {
    let incoming: Incoming = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(e) => {
            warn!(error = %e, "Unparseable DevTools message");
            return;
        }
    };

    let Some(id) = incoming.id else {
        if let Some(method) = incoming.method {
            trace!(method = %method, "DevTools event (ignored)");
        }
        return;
    };

    let Some(tx) = pending.lock().await.remove(&id) else {
        debug!(id, "Response for unknown command id");
        return;
    };

    let outcome = match incoming.error {
        Some(err) => Err(err.message),
        None => Ok(incoming.result.unwrap_or(Value::Null)),
    };
    let _ = tx.send(outcome);
}
