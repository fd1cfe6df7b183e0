//! Minimal DevTools protocol client.
//!
//! One websocket per browser instance, commands issued strictly one at a
//! time. Event notifications arriving between a command and its response are
//! discarded; nothing here subscribes to events.

use anyhow::{Context, Result, bail};
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

const CALL_TIMEOUT: Duration = Duration::from_secs(30);

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub(crate) struct CdpConnection {
    socket: Mutex<Socket>,
    next_id: AtomicU64,
}

impl CdpConnection {
    pub(crate) async fn connect(ws_url: &str) -> Result<Self> {
        let (socket, _) = tokio_tungstenite::connect_async(ws_url)
            .await
            .with_context(|| format!("connecting to devtools socket {}", ws_url))?;
        Ok(Self {
            socket: Mutex::new(socket),
            next_id: AtomicU64::new(1),
        })
    }

    /// Issue one command and wait for its response.
    ///
    /// The socket lock is held for the full round trip, which serializes
    /// commands and keeps response matching trivial.
    pub(crate) async fn call(&self, method: &str, params: Value) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let command = json!({ "id": id, "method": method, "params": params }).to_string();

        let mut socket = self.socket.lock().await;
        tokio::time::timeout(CALL_TIMEOUT, async {
            socket
                .send(Message::Text(command.into()))
                .await
                .with_context(|| format!("sending {}", method))?;

            loop {
                let message = match socket.next().await {
                    Some(result) => result.with_context(|| format!("reading {} response", method))?,
                    None => bail!("devtools socket closed during {}", method),
                };
                let Ok(text) = message.to_text() else {
                    continue;
                };
                match parse_response(text, id) {
                    Some(Ok(result)) => return Ok(result),
                    Some(Err(error)) => bail!("{} failed: {}", method, error),
                    None => continue,
                }
            }
        })
        .await
        .map_err(|_| anyhow::anyhow!("{} timed out", method))?
    }
}

/// Classify one incoming frame against the awaited command id.
///
/// `None` means "not ours" (an event or a stale response), otherwise the
/// command's result or its protocol-level error message.
fn parse_response(text: &str, id: u64) -> Option<std::result::Result<Value, String>> {
    let payload: Value = serde_json::from_str(text).ok()?;
    if payload.get("id").and_then(Value::as_u64) != Some(id) {
        return None;
    }
    if let Some(error) = payload.get("error") {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown protocol error");
        return Some(Err(message.to_string()));
    }
    Some(Ok(payload.get("result").cloned().unwrap_or(Value::Null)))
}
