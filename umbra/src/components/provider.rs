//! Abstract fetch provider: the sync engine's only window onto the outside world. Two
//! transports implement the same [`FetchProvider`] contract — [`json`] (a framed JSON
//! request/response stream) and [`p2p`] (a Bitcoin-style binary gossip protocol that
//! the transport itself must parse) — so the sync engine never needs to know which one
//! it's talking to.

pub(crate) mod json;
pub(crate) mod p2p;

use std::time::Duration;

use async_trait::async_trait;
use tokio::time::sleep;

use crate::error::{Error, ErrorKind};

/// A batch of per-block transaction-key summaries, as returned by
/// [`FetchProvider::block_tx_keys_range`].
#[derive(Clone, Debug)]
pub(crate) struct TxKeyBlock {
    pub height: u32,
    pub txs: Vec<TxKeySummary>,
}

/// The ownership-relevant fields of a single transaction, as reported by a provider
/// without the wallet having to fetch and parse the full serialized transaction.
#[derive(Clone, Debug)]
pub(crate) struct TxKeySummary {
    pub txid: Vec<u8>,
    pub outputs: Vec<OutputKeyRef>,
    pub inputs: Vec<InputRef>,
}

#[derive(Clone, Debug)]
pub(crate) struct OutputKeyRef {
    pub blinding_pub: [u8; 48],
    pub spending_pub: [u8; 48],
    /// The sender's per-output ephemeral key. Carried alongside `blinding_pub`/
    /// `spending_pub` (the destination sub-address's static pubkeys) so the wallet can
    /// run the `view_tag` fast-reject filter without first fetching the full output.
    pub ephemeral_pub: [u8; 48],
    pub view_tag: u16,
    pub output_hash: [u8; 32],
    pub token_id: Option<[u8; 64]>,
}

/// The wire shape of an input reference is schema-tolerant: different backends (and
/// even different wire versions of the same backend) name the referenced outpoint
/// differently, so this is modeled as a small sum type rather than failing closed on
/// an unrecognized field name.
#[derive(Clone, Debug)]
pub(crate) enum InputRef {
    OutPointOnly([u8; 32]),
    Named { hash: [u8; 32] },
}

impl InputRef {
    pub(crate) fn hash(&self) -> &[u8; 32] {
        match self {
            InputRef::OutPointOnly(h) => h,
            InputRef::Named { hash } => hash,
        }
    }
}

/// The result of [`FetchProvider::block_tx_keys_range`]: a contiguous run of blocks
/// starting at the requested height, plus the height the caller should request next.
#[derive(Clone, Debug)]
pub(crate) struct TxKeyRange {
    pub blocks: Vec<TxKeyBlock>,
    pub next_height: u32,
}

/// The abstract transport contract consumed by the sync engine and the wallet
/// facade's `broadcast`. Every operation that talks to the network is async and
/// individually retryable; `connect` is idempotent.
#[async_trait]
pub(crate) trait FetchProvider: Send + Sync {
    /// Performs (or re-confirms) the handshake. Safe to call more than once.
    async fn connect(&self) -> Result<(), Error>;

    /// The remote's current best-chain height. Guaranteed non-decreasing within one
    /// connection (a provider that observes the tip moving backward must reconnect).
    async fn chain_tip_height(&self) -> Result<u32, Error>;

    /// The raw 80-byte header at `height`.
    async fn block_header(&self, height: u32) -> Result<[u8; 80], Error>;

    /// Up to `count` consecutive raw 80-byte headers starting at `start`. The provider
    /// may return fewer than `count` if it runs out of chain.
    async fn block_headers(&self, start: u32, count: u32) -> Result<Vec<[u8; 80]>, Error>;

    /// A batch of transaction-key summaries starting at `start`. `next_height` in the
    /// result MUST exceed every height present in `blocks`; the sync engine treats a
    /// non-advancing `next_height` as [`ErrorKind::ProtocolInvariantViolation`].
    async fn block_tx_keys_range(&self, start: u32) -> Result<TxKeyRange, Error>;

    /// The serialized confidential output identified by `output_hash`, for the
    /// output decoder to parse.
    async fn tx_output_by_hash(&self, output_hash: &[u8; 32]) -> Result<Vec<u8>, Error>;

    /// Broadcasts a raw transaction, returning its txid.
    async fn broadcast(&self, raw_tx: &[u8]) -> Result<[u8; 32], Error>;
}

fn is_retryable(err: &Error) -> bool {
    matches!(
        err.kind(),
        ErrorKind::Timeout | ErrorKind::Disconnected | ErrorKind::Connect
    )
}

/// Runs `op`, retrying transient failures with exponential backoff: delays of
/// `2 * 2^attempt` seconds across `max_retries` attempts, with a reconnect attempted
/// between tries. Non-retryable errors propagate immediately.
pub(crate) async fn with_retry<T, F, Fut>(
    provider: &dyn FetchProvider,
    max_retries: u32,
    mut op: F,
) -> Result<T, Error>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, Error>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < max_retries && is_retryable(&err) => {
                tracing::warn!(attempt, %err, "fetch provider request failed, retrying");
                let delay = Duration::from_secs(2 * 2u64.pow(attempt));
                sleep(delay).await;
                // Best-effort reconnect; if it fails too, the next attempt's own
                // request will surface the connection error again.
                let _ = provider.connect().await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
