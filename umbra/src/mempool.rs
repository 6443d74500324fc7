//! Mempool handler.
//!
//! Processes a just-broadcast (unconfirmed) transaction: parses its outputs and inputs
//! locally, records synthetic pending UTXOs for anything we own, and marks owned inputs
//! as pending-spent. When a confirmed block later supersedes the same spend under a
//! (possibly different) confirmed txid, the sync engine's per-block loop reconciles
//! the two by deleting the synthetic pending outputs this module created.

use rusqlite::Connection;
use sha2::{Digest, Sha256};

use crate::{
    components::keystore::KeyStore,
    crypto::{self, SubAddressPubKey},
    error::{Error, ErrorKind},
    parser,
    storage::{OutputState, ops},
};

/// Content hash an output is referenced by on the wire (`InputRef::hash`), matching
/// the convention the P2P transport computes for block-sourced outputs.
fn output_hash(raw_output: &[u8]) -> [u8; 32] {
    let first = Sha256::digest(raw_output);
    let second = Sha256::digest(first);
    second.into()
}

/// A minimal view of a raw transaction's structure, as parsed locally from the bytes
/// the wallet itself broadcast (or observed being broadcast). Only output/input
/// framing is needed here; full wire parsing of arbitrary transactions happens in the
/// fetch provider transports.
pub(crate) struct RawTxOutputs {
    pub txid: [u8; 32],
    /// Serialized output bytes, in order.
    pub outputs: Vec<Vec<u8>>,
    /// `prev_out_hash` for every input this transaction spends.
    pub inputs: Vec<[u8; 32]>,
}

/// Records the effects of observing `tx` in the mempool: ownership-positive outputs
/// become synthetic `PendingUnspent` rows (`block_height = NULL`, synthetic id
/// `mempool:{txid}:{i}`), and any of our own unspent inputs it spends become
/// `PendingSpent`.
pub(crate) async fn observe_broadcast(
    conn: &mut Connection,
    keystore: &KeyStore,
    tx: &RawTxOutputs,
) -> Result<(), Error> {
    for (index, raw_output) in tx.outputs.iter().enumerate() {
        let parsed = match parser::parse_output(raw_output) {
            Ok(parsed) => parsed,
            Err(_) => continue,
        };

        let candidate = SubAddressPubKey {
            spend_pub: parsed.spending_pub,
            view_pub: parsed.blinding_pub,
        };

        let shared_secret = keystore.shared_secret(&parsed.ephemeral_pub).await?;

        let Some((account, address_index)) = keystore
            .is_mine_by_keys(&candidate, &shared_secret, parsed.view_tag)
            .await?
        else {
            continue;
        };

        let (amount, gamma, memo) =
            match crypto::recover_amount(&shared_secret, index as u32, &parsed.range_proof, parsed.token_id.as_ref()) {
                Ok(Some((amount, gamma, memo))) => (amount, Some(gamma), memo),
                Ok(None) | Err(_) => (0, None, None),
            };

        ops::insert_output(
            conn,
            &tx.txid,
            index as u32,
            account,
            address_index,
            amount,
            memo.as_deref(),
            &parsed.spending_pub,
            &output_hash(raw_output),
            &parsed.ephemeral_pub,
            gamma.as_deref(),
            parsed.token_id.as_ref().map(|t| t.as_slice()),
            None,
            OutputState::PendingUnspent,
        )
        .map_err(|e| ErrorKind::Storage.context(e))?;

        keystore.mark_sub_address_used(account, address_index).await?;
    }

    for prev_out_hash in &tx.inputs {
        if let Some(owned) = ops::get_output_by_hash(conn, prev_out_hash)
            .map_err(|e| ErrorKind::Storage.context(e))?
        {
            if owned.state.is_spendable() {
                ops::mark_output_spent(conn, &owned.txid, owned.output_index, None, &tx.txid)
                    .map_err(|e| ErrorKind::Storage.context(e))?;
            }
        }
    }

    Ok(())
}
