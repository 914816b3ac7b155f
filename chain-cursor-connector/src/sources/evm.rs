//! EVM block heights as a cursor source.
//!
//! The latest height comes from `eth_blockNumber` over HTTP; advancement comes
//! from an `eth_subscribe("newHeads")` websocket subscription.

use crate::{
    config,
    cursor::Cursor,
    error::SourceError,
    source::{CursorSource, OnAdvance},
};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_util::sync::CancellationToken;

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        SourceError::Rpc(err.to_string())
    }
}

impl From<tungstenite::Error> for SourceError {
    fn from(err: tungstenite::Error) -> Self {
        SourceError::Subscription(err.to_string())
    }
}

/// Reports EVM block numbers.
pub struct EvmBlockSource {
    http: reqwest::Client,
    http_url: String,
    ws_url: String,
    request_id: AtomicU64,
}

impl EvmBlockSource {
    pub fn new(http_url: impl Into<String>, ws_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            http_url: http_url.into(),
            ws_url: ws_url.into(),
            request_id: AtomicU64::new(1),
        }
    }

    pub fn from_config(config: &config::Evm) -> Self {
        Self::new(config.http_url.clone(), config.ws_url.clone())
    }

    fn request(&self, method: &str, params: Value) -> (u64, Value) {
        let id = self.request_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params });
        (id, body)
    }
}

#[async_trait]
impl CursorSource for EvmBlockSource {
    fn name(&self) -> &str {
        "evm-block"
    }

    async fn latest(&self) -> Result<Cursor, SourceError> {
        let (_, body) = self.request("eth_blockNumber", json!([]));
        let response: Value = self
            .http
            .post(&self.http_url)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        quantity(&rpc_result(response)?)
    }

    async fn subscribe(
        &self,
        cancel: CancellationToken,
        on_advance: &OnAdvance<'_>,
    ) -> Result<(), SourceError> {
        let (ws, _) = tokio_tungstenite::connect_async(self.ws_url.as_str()).await?;
        let (mut sink, mut stream) = ws.split();

        let (subscribe_id, body) = self.request("eth_subscribe", json!(["newHeads"]));
        sink.send(Message::Text(body.to_string().into())).await?;
        tracing::info!(ws_url = %self.ws_url, "Subscribing to new heads...");

        let mut heads = HeadSubscription::new(subscribe_id);
        let result = loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break Ok(()),
                msg = stream.next() => match msg {
                    None => {
                        tracing::info!("Head subscription closed by the node.");
                        break Ok(());
                    }
                    Some(Err(e)) => break Err(e.into()),
                    Some(Ok(Message::Text(text))) => match heads.handle(text.as_str()) {
                        Ok(Some(head)) => {
                            tracing::debug!(block = %head, "New head");
                            on_advance(head);
                        }
                        Ok(None) => {}
                        Err(e) => break Err(e),
                    },
                    Some(Ok(Message::Close(frame))) => {
                        tracing::info!(?frame, "Node closed the websocket.");
                        break Ok(());
                    }
                    Some(Ok(_)) => {}
                },
            }
        };

        if let Some(id) = heads.id.take() {
            let (_, body) = self.request("eth_unsubscribe", json!([id]));
            if let Err(e) = sink.send(Message::Text(body.to_string().into())).await {
                tracing::debug!(error = %e, "Could not send eth_unsubscribe.");
            }
        }
        if let Err(e) = sink.close().await {
            tracing::debug!(error = %e, "Websocket close failed.");
        }
        result
    }
}

/// Tracks the `newHeads` subscription id and decodes its notifications.
struct HeadSubscription {
    request_id: u64,
    id: Option<String>,
    highest: Option<Cursor>,
}

impl HeadSubscription {
    fn new(request_id: u64) -> Self {
        Self {
            request_id,
            id: None,
            highest: None,
        }
    }

    /// Returns the head number carried by `text` if it is one of our
    /// notifications and higher than every head seen so far. Reorged heads at
    /// the same or a lower height are dropped.
    fn handle(&mut self, text: &str) -> Result<Option<Cursor>, SourceError> {
        let msg: Value = serde_json::from_str(text)
            .map_err(|e| SourceError::InvalidResponse(format!("{e}: {text}")))?;

        if msg.get("id").and_then(Value::as_u64) == Some(self.request_id) {
            let id = rpc_result(msg).map_err(|e| SourceError::Subscription(e.to_string()))?;
            let id = id
                .as_str()
                .ok_or_else(|| SourceError::InvalidResponse(format!("subscription id {id}")))?;
            self.id = Some(id.to_string());
            return Ok(None);
        }

        if msg.get("method").and_then(Value::as_str) != Some("eth_subscription") {
            return Ok(None);
        }
        let params = &msg["params"];
        if params["subscription"].as_str() != self.id.as_deref() {
            return Ok(None);
        }
        let head = quantity(&params["result"]["number"])?;
        if self.highest.as_ref().is_some_and(|highest| head <= *highest) {
            tracing::debug!(block = %head, "Ignoring head that does not advance the chain");
            return Ok(None);
        }
        self.highest = Some(head.clone());
        Ok(Some(head))
    }
}

/// Extracts `result` from a JSON-RPC response, turning `error` into a `SourceError`.
fn rpc_result(mut response: Value) -> Result<Value, SourceError> {
    if let Some(error) = response.get("error") {
        return Err(SourceError::Rpc(error.to_string()));
    }
    match response.get_mut("result") {
        Some(result) => Ok(result.take()),
        None => Err(SourceError::InvalidResponse(format!(
            "missing result: {response}"
        ))),
    }
}

/// Decodes a JSON-RPC hex quantity such as `"0x1b4"`.
fn quantity(value: &Value) -> Result<Cursor, SourceError> {
    let hex = value
        .as_str()
        .ok_or_else(|| SourceError::InvalidResponse(format!("expected a hex quantity, got {value}")))?;
    Ok(Cursor::from_str_radix(hex, 16)?)
}
