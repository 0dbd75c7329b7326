use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, warn};

use crate::error::{BrowserError, Result};
use crate::page::Page;

const COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Message-framed control channel to the remote browser. Commands are JSON
/// with a monotonically increasing id; the reader task routes replies back to
/// the waiting caller through a pending-call map. Unsolicited frames (events)
/// are logged and dropped.
pub(crate) struct CdpTransport {
    next_id: AtomicU64,
    pending: Mutex<HashMap<u64, oneshot::Sender<std::result::Result<Value, String>>>>,
    outgoing: mpsc::Sender<Message>,
}

impl CdpTransport {
    pub(crate) async fn send(
        &self,
        method: &str,
        session_id: Option<&str>,
        params: Value,
    ) -> Result<Value> {
        self.send_with_timeout(method, session_id, params, COMMAND_TIMEOUT)
            .await
    }

    pub(crate) async fn send_with_timeout(
        &self,
        method: &str,
        session_id: Option<&str>,
        params: Value,
        timeout: Duration,
    ) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut frame = json!({ "id": id, "method": method, "params": params });
        if let Some(sid) = session_id {
            frame["sessionId"] = json!(sid);
        }

        let (tx, rx) = oneshot::channel();
        self.pending
            .lock()
            .expect("pending map lock poisoned")
            .insert(id, tx);

        if self
            .outgoing
            .send(Message::Text(frame.to_string()))
            .await
            .is_err()
        {
            self.pending
                .lock()
                .expect("pending map lock poisoned")
                .remove(&id);
            return Err(BrowserError::Channel("control channel closed".to_string()));
        }

        match tokio::time::timeout(timeout, rx).await {
            Err(_) => {
                self.pending
                    .lock()
                    .expect("pending map lock poisoned")
                    .remove(&id);
                Err(BrowserError::timeout(method.to_string(), timeout))
            }
            Ok(Err(_)) => Err(BrowserError::Channel(
                "control channel dropped the reply".to_string(),
            )),
            Ok(Ok(Err(message))) => Err(BrowserError::Channel(format!("{method}: {message}"))),
            Ok(Ok(Ok(result))) => Ok(result),
        }
    }
}

/// One remote browser session. Additional pages created from it share the
/// session (and its cookies).
pub struct Session {
    pub id: String,
    transport: Arc<CdpTransport>,
    reader: tokio::task::JoinHandle<()>,
    writer: tokio::task::JoinHandle<()>,
    closed: AtomicBool,
}

impl Session {
    /// Connect the control channel for an already-created vendor session.
    pub(crate) async fn connect(id: String, connect_url: &str) -> Result<Session> {
        let (ws, _) = connect_async(connect_url).await?;
        let (mut sink, mut stream) = ws.split();

        let (out_tx, mut out_rx) = mpsc::channel::<Message>(64);
        let transport = Arc::new(CdpTransport {
            next_id: AtomicU64::new(1),
            pending: Mutex::new(HashMap::new()),
            outgoing: out_tx,
        });

        let writer = tokio::spawn(async move {
            while let Some(msg) = out_rx.recv().await {
                if let Err(e) = sink.send(msg).await {
                    warn!(error = %e, "Control channel write failed");
                    break;
                }
            }
        });

        let reader = {
            let transport = transport.clone();
            tokio::spawn(async move {
                while let Some(frame) = stream.next().await {
                    let text = match frame {
                        Ok(Message::Text(t)) => t,
                        Ok(Message::Close(_)) => break,
                        Ok(_) => continue,
                        Err(e) => {
                            warn!(error = %e, "Control channel read failed");
                            break;
                        }
                    };
                    let value: Value = match serde_json::from_str(&text) {
                        Ok(v) => v,
                        Err(_) => continue,
                    };
                    let Some(id) = value.get("id").and_then(Value::as_u64) else {
                        debug!(
                            method = value.get("method").and_then(|v| v.as_str()).unwrap_or(""),
                            "Browser event"
                        );
                        continue;
                    };
                    let sender = transport
                        .pending
                        .lock()
                        .expect("pending map lock poisoned")
                        .remove(&id);
                    if let Some(sender) = sender {
                        let outcome = if let Some(err) = value.get("error") {
                            Err(err
                                .get("message")
                                .and_then(Value::as_str)
                                .unwrap_or("unknown protocol error")
                                .to_string())
                        } else {
                            Ok(value.get("result").cloned().unwrap_or(Value::Null))
                        };
                        let _ = sender.send(outcome);
                    }
                }
            })
        };

        Ok(Session {
            id,
            transport,
            reader,
            writer,
            closed: AtomicBool::new(false),
        })
    }

    /// Open a new page in this session at the default viewport.
    pub async fn create_page(&self) -> Result<Page> {
        let created = self
            .transport
            .send("Target.createTarget", None, json!({ "url": "about:blank" }))
            .await?;
        let target_id = created
            .get("targetId")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                BrowserError::Channel("Target.createTarget returned no targetId".to_string())
            })?
            .to_string();

        let attached = self
            .transport
            .send(
                "Target.attachToTarget",
                None,
                json!({ "targetId": target_id, "flatten": true }),
            )
            .await?;
        let session_id = attached
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                BrowserError::Channel("Target.attachToTarget returned no sessionId".to_string())
            })?
            .to_string();

        let page = Page::new(self.transport.clone(), session_id, target_id);
        page.init().await?;
        Ok(page)
    }

    /// Tear down the session. Idempotent; never fails.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Err(e) = self
            .transport
            .send_with_timeout("Browser.close", None, json!({}), Duration::from_secs(5))
            .await
        {
            debug!(error = %e, "Browser.close failed during teardown");
        }
        self.reader.abort();
        self.writer.abort();
    }
}
