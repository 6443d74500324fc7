//! The sync engine — the reorg-aware, pipelined state machine that is the heart of
//! the wallet.
//!
//! # Design note: one loop, not two
//!
//! A steady-state scan and a post-reorg "recover history" pass are the same algorithm
//! with a different starting height: both walk forward from `last_synced_height + 1`
//! to the tip, comparing sampled hashes as they go. This implementation runs a single
//! unified loop (`run_once`) that detects and resolves a reorg inline whenever it meets
//! one, rather than branching into a separate recovery state machine.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use sha2::{Digest, Sha256};

use super::keystore::KeyStore;
use super::provider::{FetchProvider, InputRef, TxKeyBlock, with_retry};
use crate::{
    config::SyncSection,
    crypto::{self, SubAddressPubKey},
    error::{Error, ErrorKind},
    parser,
    storage::{Database, OutputState, ops},
};

/// Headers are fetched in chunks this large, matching the chunking used by the
/// `block_tx_keys_range` pagination on most backends.
const HEADERS_CHUNK: u32 = 2016;

/// The sync loop yields to the scheduler after this many processed blocks so the
/// embedding application doesn't starve.
const YIELD_EVERY: u32 = 50;

/// Reported back to callers of [`WalletSync::run_once`] and to
/// [`WalletSync::background_sync`]'s `on_progress` callback.
#[derive(Clone, Debug, Default)]
pub(crate) struct SyncProgress {
    pub height: u32,
    pub tip: u32,
    pub blocks_processed: u32,
    pub tx_keys_processed: u64,
    pub reorg: Option<ReorgInfo>,
}

#[derive(Clone, Debug)]
pub(crate) struct ReorgInfo {
    pub height: u32,
    pub blocks_reverted: u32,
}

fn double_sha256_reversed(data: &[u8]) -> [u8; 32] {
    let first = Sha256::digest(data);
    let second = Sha256::digest(first);
    let mut out: [u8; 32] = second.into();
    out.reverse();
    out
}

/// The sync engine. Owns no durable state of its own beyond its collaborators; all
/// persisted state lives in [`Database`].
pub(crate) struct WalletSync {
    db: Database,
    keystore: Arc<KeyStore>,
    provider: Arc<dyn FetchProvider>,
    config: SyncSection,
    max_retries: u32,
    /// Guards against concurrent sync cycles.
    running: AtomicBool,
}

impl WalletSync {
    pub(crate) fn new(
        db: Database,
        keystore: Arc<KeyStore>,
        provider: Arc<dyn FetchProvider>,
        config: SyncSection,
        max_retries: u32,
    ) -> Self {
        Self {
            db,
            keystore,
            provider,
            config,
            max_retries,
            running: AtomicBool::new(false),
        }
    }

    /// Runs one full catch-up cycle: from the last synced height to the provider's
    /// current tip, handling any reorgs encountered along the way. Returns without
    /// error if the wallet is already caught up.
    pub(crate) async fn run_once(&self) -> Result<SyncProgress, Error> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(ErrorKind::Generic.context("sync cycle already in progress").into());
        }
        let result = self.run_once_inner().await;
        self.running.store(false, Ordering::SeqCst);
        result
    }

    async fn run_once_inner(&self) -> Result<SyncProgress, Error> {
        self.provider.connect().await?;

        let mut progress = SyncProgress::default();

        if let Some(reorg) = self.check_for_reorg_at_last_height().await? {
            progress.reorg = Some(reorg);
        }

        let tip = with_retry(self.provider.as_ref(), self.max_retries, || self.provider.chain_tip_height()).await?;
        progress.tip = tip;

        let (mut last_height, _) = self
            .db
            .handle()
            .await?
            .with_raw(|conn| ops::get_sync_state(conn))
            .map_err(|e| ErrorKind::Storage.context(e))?;

        let mut current = last_height.map(|h| h + 1).unwrap_or_else(|| self.config.creation_height(tip));
        let mut tx_keys_total = 0u64;
        let mut blocks_since_yield = 0u32;

        while current <= tip {
            let sync_end = tip;

            let tx_range = with_retry(self.provider.as_ref(), self.max_retries, || {
                self.provider.block_tx_keys_range(current)
            })
            .await?;

            let blocks: Vec<_> = tx_range.blocks.into_iter().filter(|b| b.height <= sync_end).collect();
            if blocks.is_empty() {
                break;
            }

            let chunk_start = blocks.first().map(|b| b.height).unwrap_or(current);
            let last_in_chunk = blocks.last().map(|b| b.height).unwrap_or(current);
            let header_count = (last_in_chunk - chunk_start + 1).min(HEADERS_CHUNK);
            let headers = with_retry(self.provider.as_ref(), self.max_retries, || {
                self.provider.block_headers(chunk_start, header_count)
            })
            .await?;

            let mut reorg_hit = None;

            for (offset, block) in blocks.iter().enumerate() {
                let Some(header) = headers.get(offset) else { break };
                let block_hash = double_sha256_reversed(header);

                let stored_sample = self
                    .db
                    .handle()
                    .await?
                    .with_raw(|conn| ops::get_block_hash(conn, block.height))
                    .map_err(|e| ErrorKind::Storage.context(e))?;

                if let Some(stored) = &stored_sample {
                    if stored.as_slice() != block_hash.as_slice() && block.height <= last_height.unwrap_or(0) {
                        reorg_hit = self.resolve_reorg(block.height, &block_hash).await?;
                        break;
                    }
                }

                self.process_block(block.height, &block_hash, block).await?;
                tx_keys_total += block.txs.len() as u64;
                last_height = Some(block.height);
                progress.blocks_processed += 1;

                blocks_since_yield += 1;
                if blocks_since_yield >= YIELD_EVERY {
                    tokio::task::yield_now().await;
                    blocks_since_yield = 0;
                }
            }

            if let Some(reorg) = reorg_hit {
                progress.reorg = Some(reorg);
                // Resume forward sync from the rewound height on the next outer
                // iteration rather than continuing a now-stale batch.
                break;
            }

            let last_height_reached = last_height.unwrap_or(current);
            let last_header = headers
                .get((last_height_reached.saturating_sub(chunk_start)) as usize)
                .ok_or_else(|| ErrorKind::ProtocolInvariantViolation.context("missing header for last processed block"))?;
            let last_hash = double_sha256_reversed(last_header);

            self.db
                .handle()
                .await?
                .with_raw_mut(|conn| ops::set_sync_state(conn, last_height_reached, &last_hash))
                .map_err(|e| ErrorKind::Storage.context(e))?;

            ops_prune_if_needed(&self.db, last_height_reached).await?;

            current = tx_range.next_height.max(last_height_reached + 1);
        }

        progress.height = last_height.unwrap_or(0);
        progress.tx_keys_processed = tx_keys_total;

        Ok(progress)
    }

    /// Decides ownership and recovers amounts for every output in `block`, then walks
    /// its inputs to update spend state, all within a single transaction.
    async fn process_block(&self, height: u32, block_hash: &[u8; 32], block: &TxKeyBlock) -> Result<(), Error> {
        let mut owned_in_block = Vec::new();

        for tx in &block.txs {
            for (index, output) in tx.outputs.iter().enumerate() {
                let candidate = SubAddressPubKey {
                    spend_pub: output.spending_pub,
                    view_pub: output.blinding_pub,
                };

                // The same shared secret, derived once from this output's ephemeral
                // key, drives both the view-tag fast-reject filter and amount
                // recovery below — there is only one DH secret per output.
                let shared_secret = match self.keystore.shared_secret(&output.ephemeral_pub).await {
                    Ok(secret) => secret,
                    Err(e) => {
                        tracing::warn!(error = %e, "shared secret derivation failed, skipping output");
                        continue;
                    }
                };

                let owner = match self
                    .keystore
                    .is_mine_by_keys(&candidate, &shared_secret, output.view_tag)
                    .await
                {
                    Ok(owner) => owner,
                    Err(e) => {
                        tracing::warn!(error = %e, "ownership check failed for an output, skipping");
                        continue;
                    }
                };
                let Some((account, address_index)) = owner else { continue };

                let raw_output = match with_retry(self.provider.as_ref(), self.max_retries, || {
                    self.provider.tx_output_by_hash(&output.output_hash)
                })
                .await
                {
                    Ok(raw) => raw,
                    Err(e) => {
                        tracing::warn!(error = %e, "failed to fetch owned output, will retry next sync");
                        continue;
                    }
                };

                let parsed = match parser::parse_output(&raw_output) {
                    Ok(parsed) => parsed,
                    Err(e) => {
                        tracing::warn!(error = %e, "failed to parse owned output, skipping");
                        continue;
                    }
                };

                let (amount, gamma, memo) =
                    match crypto::recover_amount(&shared_secret, index as u32, &parsed.range_proof, parsed.token_id.as_ref()) {
                        Ok(Some((amount, gamma, memo))) => (amount, Some(gamma), memo),
                        Ok(None) => (0, None, None),
                        Err(e) => {
                            tracing::warn!(error = %e, "amount recovery failed, storing amount=0");
                            (0, None, None)
                        }
                    };

                owned_in_block.push((
                    tx.txid.clone(),
                    index as u32,
                    account,
                    address_index,
                    amount,
                    memo,
                    output.spending_pub,
                    output.output_hash,
                    parsed.ephemeral_pub,
                    gamma,
                    parsed.token_id,
                ));
            }
        }

        let retain_tx_keys = self.config.retain_tx_keys;
        let txs = block.txs.clone();

        self.db
            .handle()
            .await?
            .with_transaction(|tx| {
                ops::insert_block_hash(tx, height, block_hash)?;

                for (txid, index, account, address_index, amount, memo, spending_pub, output_hash, ephemeral_pub, gamma, token_id) in
                    &owned_in_block
                {
                    ops::insert_output(
                        tx,
                        txid,
                        *index,
                        *account,
                        *address_index,
                        *amount,
                        memo.as_deref(),
                        spending_pub,
                        output_hash,
                        ephemeral_pub,
                        gamma.as_ref().map(|g| g.as_slice()),
                        token_id.as_ref().map(|t| t.as_slice()),
                        Some(height),
                        OutputState::ConfirmedUnspent,
                    )?;
                }

                for entry in &txs {
                    if retain_tx_keys {
                        for (index, output) in entry.outputs.iter().enumerate() {
                            ops::insert_tx_key(tx, height, &entry.txid, index as u32, &output.blinding_pub)?;
                        }
                    }

                    let mut reconcile = Vec::new();
                    for input in &entry.inputs {
                        let prev_out_hash = input_hash(input);
                        if let Some(owned) = ops::get_output_by_hash(tx, prev_out_hash)? {
                            if owned.state.is_spendable() {
                                ops::mark_output_spent(tx, &owned.txid, owned.output_index, Some(height), &entry.txid)?;
                            } else if let Some(old) = ops::get_mempool_spent_tx_hash(tx, &owned.txid, owned.output_index)? {
                                ops::mark_output_spent(tx, &owned.txid, owned.output_index, Some(height), &entry.txid)?;
                                reconcile.push(old);
                            }
                        }
                    }
                    for old in reconcile {
                        ops::delete_unconfirmed_outputs_by_tx(tx, &old)?;
                    }
                }

                Ok(())
            })
            .map_err(|e: rusqlite::Error| ErrorKind::Storage.context(e))?;

        for (_, _, account, address_index, ..) in &owned_in_block {
            self.keystore.mark_sub_address_used(*account, *address_index).await?;
        }

        Ok(())
    }

    /// Probes whether our previously-recorded `last_synced_height` sample still
    /// matches the network before starting a new batch.
    async fn check_for_reorg_at_last_height(&self) -> Result<Option<ReorgInfo>, Error> {
        let (last_height, last_hash) = self
            .db
            .handle()
            .await?
            .with_raw(|conn| ops::get_sync_state(conn))
            .map_err(|e| ErrorKind::Storage.context(e))?;

        let Some(last_height) = last_height else { return Ok(None) };
        let Some(last_hash) = last_hash else { return Ok(None) };

        let header =
            with_retry(self.provider.as_ref(), self.max_retries, || self.provider.block_header(last_height)).await?;
        let fresh_hash = double_sha256_reversed(&header);

        if fresh_hash.as_slice() == last_hash.as_slice() {
            return Ok(None);
        }

        self.resolve_reorg(last_height, &fresh_hash).await
    }

    /// Walks backward from `h` to find the common ancestor, reverts the intervening
    /// UTXO effects, and rewinds sync-state. Returns `Err(ErrorKind::ReorgDetected)`
    /// instead if `stop_on_reorg` is configured.
    async fn resolve_reorg(&self, h: u32, new_hash: &[u8; 32]) -> Result<Option<ReorgInfo>, Error> {
        let mut probe = h;
        let common_ancestor: i64 = loop {
            if probe == 0 {
                break -1;
            }
            let candidate = probe - 1;
            let stored = self
                .db
                .handle()
                .await?
                .with_raw(|conn| ops::get_block_hash(conn, candidate))
                .map_err(|e| ErrorKind::Storage.context(e))?;

            let Some(stored) = stored else {
                probe = candidate;
                continue;
            };

            let header =
                with_retry(self.provider.as_ref(), self.max_retries, || self.provider.block_header(candidate)).await?;
            let fresh = double_sha256_reversed(&header);

            if stored.as_slice() == fresh.as_slice() {
                break candidate as i64;
            }
            probe = candidate;
        };

        let blocks_reverted = (h as i64 - common_ancestor) as u32;

        if self.config.stop_on_reorg {
            return Err(ErrorKind::ReorgDetected
                .context(format!(
                    "reorg at height {h}: new_hash {}, {blocks_reverted} block(s) to revert",
                    hex::encode(new_hash)
                ))
                .into());
        }

        let revert_from = (common_ancestor + 1).max(0) as u32;
        self.db
            .handle()
            .await?
            .with_transaction(|tx| {
                for height in revert_from..=h {
                    ops::delete_outputs_by_height(tx, height)?;
                    ops::unspend_outputs_by_spent_height(tx, height)?;
                    ops::delete_tx_keys_by_height(tx, height)?;
                    ops::delete_block_hash(tx, height)?;
                }
                let ancestor_hash = if common_ancestor >= 0 {
                    ops::get_block_hash(tx, common_ancestor as u32)?.unwrap_or_default()
                } else {
                    Vec::new()
                };
                ops::set_sync_state(tx, common_ancestor.max(-1) as u32, &ancestor_hash)
            })
            .map_err(|e: rusqlite::Error| ErrorKind::Storage.context(e))?;

        Ok(Some(ReorgInfo { height: h, blocks_reverted }))
    }

    /// Drives repeated [`WalletSync::run_once`] cycles, sleeping `poll_interval`
    /// between them. Errors are reported through `on_error` and never stop the loop.
    pub(crate) async fn background_sync(
        self: Arc<Self>,
        poll_interval: Duration,
        on_progress: impl Fn(&SyncProgress) + Send + Sync + 'static,
        on_error: impl Fn(&Error) + Send + Sync + 'static,
    ) {
        loop {
            match self.run_once().await {
                Ok(progress) => on_progress(&progress),
                Err(e) => on_error(&e),
            }
            tokio::time::sleep(poll_interval).await;
        }
    }
}

fn input_hash(input: &InputRef) -> &[u8; 32] {
    input.hash()
}

/// Prunes the block-hash retention window (`R = 10000`), run opportunistically after
/// every batch rather than on a separate counter, since `prune_block_hashes` is a
/// cheap no-op once nothing is old enough to delete.
async fn ops_prune_if_needed(db: &Database, tip_height: u32) -> Result<(), Error> {
    const RETENTION: u32 = 10_000;
    let retain_from = tip_height.saturating_sub(RETENTION - 1);
    db.handle()
        .await?
        .with_raw_mut(|conn| ops::prune_block_hashes(conn, retain_from))
        .map_err(|e| ErrorKind::Storage.context(e))
}
