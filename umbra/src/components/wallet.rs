//! The wallet facade: the surface the JSON-RPC methods and CLI commands actually
//! call. Ties together the key manager, storage, the fetch
//! provider and the sync engine behind a handful of operations — balance, listing
//! unspent outputs, constructing and broadcasting a spend, and driving sync.

use std::sync::Arc;

use rand::thread_rng;

use super::keystore::KeyStore;
use super::provider::FetchProvider;
use super::sync::{SyncProgress, WalletSync};
use crate::{
    address::Codec,
    config::SyncSection,
    crypto::{self, SubAddressPubKey},
    error::{Error, ErrorKind},
    network::Network,
    storage::{Database, OutputState, WalletOutput, ops},
};

/// The flat per-output network fee, scaled by the number of inputs a spend consumes
/// (`(inputs + 2) * 200_000`).
const FEE_PER_UNIT: u64 = 200_000;

/// The pseudo-account change outputs are addressed to, kept out of the ordinary
/// account numbering space so `listunspent`/balance queries can filter it out or
/// include it explicitly.
const CHANGE_ACCOUNT: i64 = -1;

/// The result of a successful [`Wallet::send_transaction`] call.
#[derive(Clone, Debug)]
pub(crate) struct SendResult {
    pub txid: [u8; 32],
    pub fee: u64,
}

#[derive(Clone)]
pub(crate) struct Wallet {
    db: Database,
    keystore: Arc<KeyStore>,
    provider: Arc<dyn FetchProvider>,
    sync: Arc<WalletSync>,
    network: Network,
}

impl Wallet {
    pub(crate) fn new(
        db: Database,
        keystore: Arc<KeyStore>,
        provider: Arc<dyn FetchProvider>,
        sync_config: SyncSection,
        max_retries: u32,
        network: Network,
    ) -> Self {
        let sync = Arc::new(WalletSync::new(
            db.clone(),
            keystore.clone(),
            provider.clone(),
            sync_config,
            max_retries,
        ));
        Self {
            db,
            keystore,
            provider,
            sync,
            network,
        }
    }

    pub(crate) fn sync_engine(&self) -> Arc<WalletSync> {
        self.sync.clone()
    }

    pub(crate) fn keystore(&self) -> &KeyStore {
        &self.keystore
    }

    pub(crate) fn network(&self) -> Network {
        self.network
    }

    /// Runs one sync cycle to completion. Thin pass-through to the sync engine, kept
    /// here so callers only need to depend on `Wallet`.
    pub(crate) async fn sync_once(&self) -> Result<SyncProgress, Error> {
        self.sync.run_once().await
    }

    /// `(confirmed, pending)` balance, in the smallest confidential-amount unit.
    /// `account = None` sums every account; `token_id = None` is the native coin.
    pub(crate) async fn balance(&self, account: Option<i64>, token_id: Option<&[u8]>) -> Result<(u64, u64), Error> {
        self.db
            .handle()
            .await?
            .with_raw(|conn| ops::balance(conn, account, token_id))
            .map_err(|e| ErrorKind::Storage.context(e).into())
    }

    /// Every spendable output, optionally restricted to one account and/or one token,
    /// largest amount first.
    pub(crate) async fn list_unspent(
        &self,
        account: Option<i64>,
        token_id: Option<&[u8]>,
    ) -> Result<Vec<WalletOutput>, Error> {
        self.db
            .handle()
            .await?
            .with_raw(|conn| ops::list_unspent(conn, account, token_id))
            .map_err(|e| ErrorKind::Storage.context(e).into())
    }

    /// Issues a fresh never-before-used receiving sub-address for `account`.
    pub(crate) async fn new_address(&self, account: i64) -> Result<(u64, String), Error> {
        let (index, pubkey) = self.keystore.generate_new_sub_address(account).await?;
        Ok((index, pubkey.encode(self.network)))
    }

    /// Every output this wallet created or received in transaction `txid`.
    pub(crate) async fn transaction(&self, txid: &[u8]) -> Result<Vec<WalletOutput>, Error> {
        self.db
            .handle()
            .await?
            .with_raw(|conn| ops::get_outputs_by_txid(conn, txid))
            .map_err(|e| ErrorKind::Storage.context(e).into())
    }

    /// Every sub-address this wallet has generated, as `(account, index, address)`.
    pub(crate) async fn list_addresses(&self) -> Result<Vec<(i64, u64, String)>, Error> {
        let rows = self
            .db
            .handle()
            .await?
            .with_raw(|conn| ops::list_sub_addresses(conn))
            .map_err(|e| ErrorKind::Storage.context(e))?;

        rows.into_iter()
            .map(|(account, index, spend_pub, view_pub)| {
                let spend_pub: crypto::CompressedPoint = spend_pub
                    .try_into()
                    .map_err(|_| ErrorKind::Storage.context("malformed spend_pub in sub_addresses"))?;
                let view_pub: crypto::CompressedPoint = view_pub
                    .try_into()
                    .map_err(|_| ErrorKind::Storage.context("malformed view_pub in sub_addresses"))?;
                let address = SubAddressPubKey { spend_pub, view_pub }.encode(self.network);
                Ok((account, index, address))
            })
            .collect()
    }

    /// The height most recently persisted by the sync engine, without running a sync
    /// pass. `None` if the wallet has never completed an initial sync.
    pub(crate) async fn sync_height(&self) -> Result<Option<u32>, Error> {
        let (height, _) = self
            .db
            .handle()
            .await?
            .with_raw(|conn| ops::get_sync_state(conn))
            .map_err(|e| ErrorKind::Storage.context(e))?;
        Ok(height)
    }

    /// `true` if the keystore's decryption identities are not currently loaded.
    pub(crate) async fn is_locked(&self) -> bool {
        self.keystore.is_locked().await
    }

    /// Constructs, broadcasts and locally records a confidential spend.
    ///
    /// Decodes the destination address, selects spendable inputs of the requested
    /// token largest-amount-first until the requested amount (plus, unless
    /// `subtract_fee_from_amount` carves it out of `amount` itself, the size-scaled
    /// fee) is covered, hands the selection to [`crypto::build_ctx`] to assemble and
    /// sign the whole transaction, broadcasts it, then records its effects directly
    /// rather than waiting for the mempool handler to observe and reparse the
    /// broadcast transaction — the wallet already knows everything that reparse would
    /// recover.
    pub(crate) async fn send_transaction(
        &self,
        account: Option<i64>,
        address: &str,
        amount: u64,
        memo: &str,
        subtract_fee_from_amount: bool,
        token_id: Option<[u8; 64]>,
    ) -> Result<SendResult, Error> {
        let destination = SubAddressPubKey::decode(self.network, address)?;

        let candidates = self.list_unspent(account, token_id.as_ref().map(|t| t.as_slice())).await?;
        let mut selected = Vec::new();
        let mut selected_total = 0u64;
        let mut fee = FEE_PER_UNIT * 2;
        for candidate in candidates {
            let required = if subtract_fee_from_amount { amount } else { amount + fee };
            if selected_total >= required {
                break;
            }
            selected_total += candidate.amount;
            selected.push(candidate);
            fee = (selected.len() as u64 + 2) * FEE_PER_UNIT;
        }

        let required = if subtract_fee_from_amount { amount } else { amount + fee };
        if selected_total < required {
            return Err(ErrorKind::InsufficientFunds
                .context(format!("need {required}, have {selected_total} spendable"))
                .into());
        }
        if subtract_fee_from_amount && amount <= fee {
            return Err(ErrorKind::InsufficientFunds
                .context(format!("amount {amount} does not cover its own fee of {fee}"))
                .into());
        }

        let (destination_amount, change_amount) = if subtract_fee_from_amount {
            (amount - fee, selected_total - amount)
        } else {
            (amount, selected_total - amount - fee)
        };

        // Derives the private spending key for each selected input, confirming the
        // keystore is unlocked before broadcasting anything, and hands it to
        // `build_ctx` to authorize the spend.
        let mut tx_inputs = Vec::with_capacity(selected.len());
        for utxo in &selected {
            let shared_secret = self.keystore.shared_secret(&ephemeral_pub_of(utxo)?).await?;
            let spend_sk = self
                .keystore
                .private_spending_key(utxo.account, utxo.address_index as u64, &shared_secret, utxo.output_index)
                .await?;
            let mut output_hash = [0u8; 32];
            output_hash.copy_from_slice(&utxo.output_hash);
            tx_inputs.push(crypto::TxInputSpec { output_hash, spend_sk });
        }

        let (change_index, change_pubkey) = self.keystore.generate_new_sub_address(CHANGE_ACCOUNT).await?;

        let tx_outputs = vec![
            crypto::TxOutputSpec {
                destination,
                amount: destination_amount,
                memo: memo.to_string(),
                token_id,
            },
            crypto::TxOutputSpec {
                destination: change_pubkey,
                amount: change_amount,
                memo: String::new(),
                token_id,
            },
        ];

        let mut rng = thread_rng();
        let (raw_tx, built) = crypto::build_ctx(&tx_inputs, &tx_outputs, &mut rng)?;
        let broadcast_txid = self.provider.broadcast(&raw_tx).await?;

        let destination_built = &built[0];
        let change_built = &built[1];

        let destination_shared_secret = self.keystore.shared_secret(&destination_built.ephemeral_pub).await?;
        let destination_owner = self
            .keystore
            .is_mine_by_keys(&destination, &destination_shared_secret, destination_built.view_tag)
            .await?;

        self.db
            .handle()
            .await?
            .with_transaction(|tx| {
                for utxo in &selected {
                    ops::mark_output_spent(tx, &utxo.txid, utxo.output_index, None, &broadcast_txid)?;
                }

                ops::insert_output(
                    tx,
                    &broadcast_txid,
                    1,
                    CHANGE_ACCOUNT,
                    change_index,
                    change_built.amount,
                    None,
                    &change_built.one_time_spend_pub,
                    &change_built.output_hash,
                    &change_built.ephemeral_pub,
                    Some(&change_built.gamma),
                    change_built.token_id.as_ref().map(|t| t.as_slice()),
                    None,
                    OutputState::PendingUnspent,
                )?;

                if let Some((account, address_index)) = destination_owner {
                    ops::insert_output(
                        tx,
                        &broadcast_txid,
                        0,
                        account,
                        address_index,
                        destination_built.amount,
                        Some(memo).filter(|m| !m.is_empty()),
                        &destination_built.one_time_spend_pub,
                        &destination_built.output_hash,
                        &destination_built.ephemeral_pub,
                        Some(&destination_built.gamma),
                        destination_built.token_id.as_ref().map(|t| t.as_slice()),
                        None,
                        OutputState::PendingUnspent,
                    )?;
                }

                Ok(())
            })
            .map_err(|e: rusqlite::Error| ErrorKind::Storage.context(e))?;

        self.keystore.mark_sub_address_used(CHANGE_ACCOUNT, change_index).await?;

        Ok(SendResult {
            txid: broadcast_txid,
            fee,
        })
    }
}

fn ephemeral_pub_of(utxo: &WalletOutput) -> Result<crypto::CompressedPoint, Error> {
    utxo.ephemeral_pub
        .clone()
        .try_into()
        .map_err(|_| ErrorKind::Storage.context("malformed ephemeral_pub in wallet_outputs").into())
}
