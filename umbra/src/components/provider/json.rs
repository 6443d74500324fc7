//! The framed-JSON fetch provider transport.
//!
//! Requests and responses are newline-delimited JSON objects over a single TCP stream:
//! `{"id": u64, "method": ..., "params": [...]}` out, either a `{"id", "result"|"error"}`
//! response or an `{"method", "params"}` notification in. One monotonic id counter per
//! connection; outstanding requests are matched by id and time out after
//! `timeout_secs`. The tip is cached from `blockchain.headers.subscribe` notifications
//! rather than re-polled.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::{
    io::{AsyncWriteExt, BufReader},
    net::TcpStream,
    sync::{Mutex, oneshot},
};
use tokio_util::codec::{FramedRead, LinesCodec};

use super::{FetchProvider, InputRef, OutputKeyRef, TxKeyBlock, TxKeyRange, TxKeySummary};
use crate::error::{Error, ErrorKind};

#[derive(Serialize)]
struct Request<'a> {
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Deserialize)]
struct Response {
    #[serde(default)]
    id: Option<u64>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
    #[serde(default)]
    method: Option<String>,
}

struct Pending {
    waiters: Mutex<HashMap<u64, oneshot::Sender<Result<Value, Value>>>>,
}

/// The framed-JSON transport. Holds the write half directly and dispatches inbound
/// frames from a background reader task into per-request oneshot channels.
pub(crate) struct JsonProvider {
    endpoint: String,
    timeout: Duration,
    writer: Mutex<tokio::net::tcp::OwnedWriteHalf>,
    next_id: AtomicU64,
    pending: Arc<Pending>,
    cached_tip: Arc<Mutex<Option<u32>>>,
}

impl JsonProvider {
    pub(crate) async fn connect(endpoint: &str, timeout: Duration) -> Result<Self, Error> {
        let stream = TcpStream::connect(endpoint)
            .await
            .map_err(|e| ErrorKind::Connect.context(e))?;
        let (read_half, write_half) = stream.into_split();

        let pending = Arc::new(Pending {
            waiters: Mutex::new(HashMap::new()),
        });
        let cached_tip = Arc::new(Mutex::new(None));

        spawn_reader(read_half, pending.clone(), cached_tip.clone());

        let provider = Self {
            endpoint: endpoint.to_string(),
            timeout,
            writer: Mutex::new(write_half),
            next_id: AtomicU64::new(1),
            pending,
            cached_tip,
        };

        provider.call("server.version", Value::Array(vec![
            Value::String("umbra".into()),
            Value::String(env!("CARGO_PKG_VERSION").into()),
        ])).await?;
        provider.call("blockchain.headers.subscribe", Value::Array(vec![])).await?;

        Ok(provider)
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, Error> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.pending.waiters.lock().await.insert(id, tx);

        let request = Request { id, method, params };
        let mut line = serde_json::to_string(&request).map_err(|e| ErrorKind::Parse.context(e))?;
        line.push('\n');

        {
            let mut writer = self.writer.lock().await;
            writer
                .write_all(line.as_bytes())
                .await
                .map_err(|e| ErrorKind::Disconnected.context(e))?;
        }

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(Ok(result))) => Ok(result),
            Ok(Ok(Err(error))) => Err(ErrorKind::ProtocolInvariantViolation
                .context(format!("provider returned an error: {error}"))
                .into()),
            Ok(Err(_)) => {
                self.pending.waiters.lock().await.remove(&id);
                Err(ErrorKind::Disconnected.context("connection closed while awaiting response").into())
            }
            Err(_) => {
                self.pending.waiters.lock().await.remove(&id);
                Err(ErrorKind::Timeout.context(format!("request {method} timed out")).into())
            }
        }
    }
}

fn spawn_reader(
    read_half: tokio::net::tcp::OwnedReadHalf,
    pending: Arc<Pending>,
    cached_tip: Arc<Mutex<Option<u32>>>,
) {
    tokio::spawn(async move {
        let mut lines = FramedRead::new(BufReader::new(read_half), LinesCodec::new());
        use futures::StreamExt;
        while let Some(Ok(line)) = lines.next().await {
            let Ok(response) = serde_json::from_str::<Response>(&line) else {
                continue;
            };

            if let Some(id) = response.id {
                if let Some(waiter) = pending.waiters.lock().await.remove(&id) {
                    let outcome = match response.error {
                        Some(error) => Err(error),
                        None => Ok(response.result.unwrap_or(Value::Null)),
                    };
                    let _ = waiter.send(outcome);
                }
                continue;
            }

            if response.method.as_deref() == Some("blockchain.headers.subscribe") {
                if let Some(result) = response.result {
                    if let Some(height) = result.get("height").and_then(Value::as_u64) {
                        *cached_tip.lock().await = Some(height as u32);
                    }
                }
            }
        }
    });
}

fn decode_hex(s: &str) -> Result<Vec<u8>, Error> {
    hex::decode(s).map_err(|e| ErrorKind::Parse.context(e).into())
}

fn decode_header(hex_str: &str) -> Result<[u8; 80], Error> {
    let bytes = decode_hex(hex_str)?;
    bytes
        .as_slice()
        .try_into()
        .map_err(|_| ErrorKind::ProtocolInvariantViolation.context("header was not 80 bytes").into())
}

fn decode_point48(value: &Value, field: &str) -> Result<[u8; 48], Error> {
    let hex_str = value
        .get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| ErrorKind::ProtocolInvariantViolation.context(format!("missing field {field}")))?;
    let bytes = decode_hex(hex_str)?;
    bytes
        .as_slice()
        .try_into()
        .map_err(|_| ErrorKind::ProtocolInvariantViolation.context(format!("{field} was not 48 bytes")).into())
}

fn decode_token_id(value: &Value) -> Option<[u8; 64]> {
    let hex_str = value.get("tokenId").and_then(Value::as_str)?;
    let bytes = decode_hex(hex_str).ok()?;
    bytes.as_slice().try_into().ok()
}

fn decode_hash32(hex_str: &str) -> Result<[u8; 32], Error> {
    let bytes = decode_hex(hex_str)?;
    bytes
        .as_slice()
        .try_into()
        .map_err(|_| ErrorKind::ProtocolInvariantViolation.context("expected a 32-byte hash").into())
}

fn parse_input_ref(value: &Value) -> Option<InputRef> {
    if let Some(h) = value.get("outputHash").and_then(Value::as_str) {
        return decode_hash32(h).ok().map(InputRef::OutPointOnly);
    }
    if let Some(h) = value.get("prevoutHash").and_then(Value::as_str) {
        return decode_hash32(h).ok().map(|hash| InputRef::Named { hash });
    }
    if let Some(prevout) = value.get("prevout") {
        if let Some(h) = prevout.get("hash").and_then(Value::as_str) {
            return decode_hash32(h).ok().map(|hash| InputRef::Named { hash });
        }
    }
    None
}

fn parse_tx_key(value: &Value) -> Result<TxKeySummary, Error> {
    let pair = value
        .as_array()
        .filter(|a| a.len() == 2)
        .ok_or_else(|| ErrorKind::ProtocolInvariantViolation.context("tx key entry was not a 2-tuple"))?;

    let txid = decode_hex(
        pair[0]
            .as_str()
            .ok_or_else(|| ErrorKind::ProtocolInvariantViolation.context("tx key txid was not a string"))?,
    )?;

    let outputs = pair[1]
        .get("outputs")
        .and_then(Value::as_array)
        .map(|outputs| {
            outputs
                .iter()
                .filter_map(|o| {
                    Some(OutputKeyRef {
                        blinding_pub: decode_point48(o, "blindingKey").ok()?,
                        spending_pub: decode_point48(o, "spendingKey").ok()?,
                        ephemeral_pub: decode_point48(o, "ephemeralKey").ok()?,
                        view_tag: o.get("viewTag").and_then(Value::as_u64)? as u16,
                        output_hash: decode_hash32(o.get("outputHash")?.as_str()?).ok()?,
                        token_id: decode_token_id(o),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    let inputs = pair[1]
        .get("inputs")
        .and_then(Value::as_array)
        .map(|inputs| inputs.iter().filter_map(parse_input_ref).collect())
        .unwrap_or_default();

    Ok(TxKeySummary { txid, outputs, inputs })
}

#[async_trait]
impl FetchProvider for JsonProvider {
    async fn connect(&self) -> Result<(), Error> {
        self.call("server.version", Value::Array(vec![])).await?;
        Ok(())
    }

    async fn chain_tip_height(&self) -> Result<u32, Error> {
        if let Some(height) = *self.cached_tip.lock().await {
            return Ok(height);
        }
        let result = self.call("blockchain.headers.subscribe", Value::Array(vec![])).await?;
        let height = result
            .get("height")
            .and_then(Value::as_u64)
            .ok_or_else(|| ErrorKind::ProtocolInvariantViolation.context("missing tip height"))?;
        *self.cached_tip.lock().await = Some(height as u32);
        Ok(height as u32)
    }

    async fn block_header(&self, height: u32) -> Result<[u8; 80], Error> {
        let result = self
            .call("blockchain.block.header", Value::Array(vec![Value::from(height)]))
            .await?;
        let hex_str = result
            .as_str()
            .ok_or_else(|| ErrorKind::ProtocolInvariantViolation.context("block header was not a string"))?;
        decode_header(hex_str)
    }

    async fn block_headers(&self, start: u32, count: u32) -> Result<Vec<[u8; 80]>, Error> {
        let result = self
            .call(
                "blockchain.block.headers",
                Value::Array(vec![Value::from(start), Value::from(count)]),
            )
            .await?;
        let hex_str = result
            .get("hex")
            .and_then(Value::as_str)
            .ok_or_else(|| ErrorKind::ProtocolInvariantViolation.context("missing headers hex"))?;
        let bytes = decode_hex(hex_str)?;
        if bytes.len() % 80 != 0 {
            return Err(ErrorKind::ProtocolInvariantViolation
                .context("headers blob was not a multiple of 80 bytes")
                .into());
        }
        Ok(bytes
            .chunks_exact(80)
            .map(|chunk| chunk.try_into().expect("chunk is exactly 80 bytes"))
            .collect())
    }

    async fn block_tx_keys_range(&self, start: u32) -> Result<TxKeyRange, Error> {
        let result = self
            .call("blockchain.block.get_range_txs_keys", Value::Array(vec![Value::from(start)]))
            .await?;

        let next_height = result
            .get("next_height")
            .and_then(Value::as_u64)
            .ok_or_else(|| ErrorKind::ProtocolInvariantViolation.context("missing next_height"))? as u32;

        let raw_blocks = result
            .get("blocks")
            .and_then(Value::as_array)
            .ok_or_else(|| ErrorKind::ProtocolInvariantViolation.context("missing blocks array"))?;

        let mut blocks = Vec::with_capacity(raw_blocks.len());
        let mut max_height = None;
        for (offset, raw_block) in raw_blocks.iter().enumerate() {
            let height = start + offset as u32;
            let txs = raw_block
                .as_array()
                .ok_or_else(|| ErrorKind::ProtocolInvariantViolation.context("block entry was not an array"))?
                .iter()
                .map(parse_tx_key)
                .collect::<Result<Vec<_>, _>>()?;
            max_height = Some(height);
            blocks.push(TxKeyBlock { height, txs });
        }

        if let Some(max_height) = max_height {
            if next_height <= max_height {
                return Err(ErrorKind::ProtocolInvariantViolation
                    .context("next_height did not advance past the returned batch")
                    .into());
            }
        }

        Ok(TxKeyRange { blocks, next_height })
    }

    async fn tx_output_by_hash(&self, output_hash: &[u8; 32]) -> Result<Vec<u8>, Error> {
        let result = self
            .call(
                "blockchain.transaction.get_output",
                Value::Array(vec![Value::String(hex::encode(output_hash))]),
            )
            .await?;
        let hex_str = result
            .as_str()
            .ok_or_else(|| ErrorKind::ProtocolInvariantViolation.context("output was not a hex string"))?;
        decode_hex(hex_str)
    }

    async fn broadcast(&self, raw_tx: &[u8]) -> Result<[u8; 32], Error> {
        let result = self
            .call(
                "blockchain.transaction.broadcast",
                Value::Array(vec![Value::String(hex::encode(raw_tx))]),
            )
            .await?;
        let hex_str = result
            .as_str()
            .ok_or_else(|| ErrorKind::ProtocolInvariantViolation.context("broadcast did not return a txid"))?;
        decode_hash32(hex_str)
    }
}

impl std::fmt::Debug for JsonProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonProvider").field("endpoint", &self.endpoint).finish()
    }
}
