//! Plain-SQL implementations of the wallet storage contract. Each function takes
//! anything that derefs to [`rusqlite::Connection`], so
//! callers can pass either a pooled connection (`with_raw`/`with_raw_mut`) or a
//! transaction (`with_transaction`) for the per-block atomic mutations the sync engine
//! requires.

use rusqlite::{Connection, OptionalExtension, Row, named_params};

use crate::storage::{OutputState, WalletOutput};

fn output_from_row(row: &Row<'_>) -> rusqlite::Result<WalletOutput> {
    Ok(WalletOutput {
        txid: row.get("txid")?,
        output_index: row.get("output_index")?,
        account: row.get("account")?,
        address_index: row.get("address_index")?,
        amount: row.get::<_, i64>("amount")? as u64,
        memo: row.get("memo")?,
        one_time_spend_pub: row.get("one_time_spend_pub")?,
        output_hash: row.get("output_hash")?,
        ephemeral_pub: row.get("ephemeral_pub")?,
        gamma: row.get("gamma")?,
        token_id: row.get("token_id")?,
        height: row.get("height")?,
        state: OutputState::from_i64(row.get("state")?),
        spent_height: row.get("spent_height")?,
        spent_txid: row.get("spent_txid")?,
    })
}

// --- Wallet identity -------------------------------------------------------

pub(crate) fn store_master_seed(conn: &Connection, encrypted_seed: &[u8]) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO master_seed (id, encrypted_seed) VALUES (0, :seed)
         ON CONFLICT (id) DO UPDATE SET encrypted_seed = excluded.encrypted_seed",
        named_params! { ":seed": encrypted_seed },
    )?;
    Ok(())
}

pub(crate) fn load_master_seed(conn: &Connection) -> rusqlite::Result<Option<Vec<u8>>> {
    conn.query_row("SELECT encrypted_seed FROM master_seed WHERE id = 0", [], |row| {
        row.get(0)
    })
    .optional()
}

pub(crate) fn store_view_key(conn: &Connection, view_sk: &[u8], view_pub: &[u8]) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO view_key (id, view_sk, view_pub) VALUES (0, :sk, :pk)
         ON CONFLICT (id) DO UPDATE SET view_sk = excluded.view_sk, view_pub = excluded.view_pub",
        named_params! { ":sk": view_sk, ":pk": view_pub },
    )?;
    Ok(())
}

pub(crate) fn load_view_key(conn: &Connection) -> rusqlite::Result<Option<(Vec<u8>, Vec<u8>)>> {
    conn.query_row("SELECT view_sk, view_pub FROM view_key WHERE id = 0", [], |row| {
        Ok((row.get(0)?, row.get(1)?))
    })
    .optional()
}

pub(crate) fn store_spend_key(
    conn: &Connection,
    encrypted_spend_sk: &[u8],
    spend_pub: &[u8],
) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO spend_key (id, encrypted_spend_sk, spend_pub) VALUES (0, :sk, :pk)
         ON CONFLICT (id) DO UPDATE SET encrypted_spend_sk = excluded.encrypted_spend_sk, spend_pub = excluded.spend_pub",
        named_params! { ":sk": encrypted_spend_sk, ":pk": spend_pub },
    )?;
    Ok(())
}

pub(crate) fn load_spend_key(conn: &Connection) -> rusqlite::Result<Option<(Vec<u8>, Vec<u8>)>> {
    conn.query_row(
        "SELECT encrypted_spend_sk, spend_pub FROM spend_key WHERE id = 0",
        [],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )
    .optional()
}

pub(crate) fn set_encrypted(conn: &Connection, is_encrypted: bool, age_recipients: Option<&[u8]>) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE encryption_metadata SET is_encrypted = :enc, age_recipients = :recips WHERE id = 0",
        named_params! { ":enc": is_encrypted, ":recips": age_recipients },
    )?;
    Ok(())
}

pub(crate) fn is_encrypted(conn: &Connection) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT is_encrypted FROM encryption_metadata WHERE id = 0",
        [],
        |row| row.get(0),
    )
}

// --- HD accounts and sub-addresses -----------------------------------------

pub(crate) fn next_account(conn: &Connection) -> rusqlite::Result<i64> {
    let next: i64 = conn.query_row("SELECT next_account FROM hd_chain WHERE id = 0", [], |row| {
        row.get(0)
    })?;
    conn.execute(
        "UPDATE hd_chain SET next_account = :next WHERE id = 0",
        named_params! { ":next": next + 1 },
    )?;
    Ok(next)
}

pub(crate) fn upsert_sub_address(
    conn: &Connection,
    account: i64,
    index: u64,
    spend_pub: &[u8],
    view_pub: &[u8],
) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO sub_addresses (account, address_index, spend_pub, view_pub)
         VALUES (:account, :index, :spend_pub, :view_pub)
         ON CONFLICT (account, address_index) DO NOTHING",
        named_params! {
            ":account": account,
            ":index": index as i64,
            ":spend_pub": spend_pub,
            ":view_pub": view_pub,
        },
    )?;
    Ok(())
}

pub(crate) fn get_sub_address(
    conn: &Connection,
    account: i64,
    index: u64,
) -> rusqlite::Result<Option<(Vec<u8>, Vec<u8>)>> {
    conn.query_row(
        "SELECT spend_pub, view_pub FROM sub_addresses WHERE account = :account AND address_index = :index",
        named_params! { ":account": account, ":index": index as i64 },
        |row| Ok((row.get(0)?, row.get(1)?)),
    )
    .optional()
}

/// Every generated sub-address, across all accounts, as `(account, index, spend_pub,
/// view_pub)`.
pub(crate) fn list_sub_addresses(
    conn: &Connection,
) -> rusqlite::Result<Vec<(i64, u64, Vec<u8>, Vec<u8>)>> {
    let mut stmt = conn.prepare(
        "SELECT account, address_index, spend_pub, view_pub FROM sub_addresses
         ORDER BY account, address_index",
    )?;
    stmt.query_map([], |row| {
        Ok((
            row.get(0)?,
            row.get::<_, i64>(1)? as u64,
            row.get(2)?,
            row.get(3)?,
        ))
    })?
    .collect()
}

pub(crate) fn sub_address_counter(conn: &Connection, account: i64) -> rusqlite::Result<(u64, i64)> {
    conn.query_row(
        "SELECT highest_generated, highest_used FROM sub_address_counter WHERE account = :account",
        named_params! { ":account": account },
        |row| Ok((row.get::<_, i64>(0)? as u64, row.get(1)?)),
    )
    .optional()
    .map(|opt| opt.unwrap_or((0, -1)))
}

pub(crate) fn set_sub_address_counter(
    conn: &Connection,
    account: i64,
    highest_generated: u64,
    highest_used: i64,
) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO sub_address_counter (account, highest_generated, highest_used)
         VALUES (:account, :gen, :used)
         ON CONFLICT (account) DO UPDATE SET
            highest_generated = excluded.highest_generated,
            highest_used = excluded.highest_used",
        named_params! { ":account": account, ":gen": highest_generated as i64, ":used": highest_used },
    )?;
    Ok(())
}

pub(crate) fn gap_limit(conn: &Connection, account: i64) -> rusqlite::Result<u64> {
    conn.query_row(
        "SELECT gap_limit FROM sub_address_pool WHERE account = :account",
        named_params! { ":account": account },
        |row| row.get::<_, i64>(0),
    )
    .optional()
    .map(|opt| opt.unwrap_or(20) as u64)
}

pub(crate) fn set_gap_limit(conn: &Connection, account: i64, gap_limit: u64) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO sub_address_pool (account, gap_limit) VALUES (:account, :gap)
         ON CONFLICT (account) DO UPDATE SET gap_limit = excluded.gap_limit",
        named_params! { ":account": account, ":gap": gap_limit as i64 },
    )?;
    Ok(())
}

// --- O(1) ownership indices --------------------------------------------------

pub(crate) fn insert_key_hash(conn: &Connection, hash_id: &[u8], account: i64, index: u64) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO keys (hash_id, account, address_index) VALUES (:h, :account, :index)
         ON CONFLICT (hash_id) DO NOTHING",
        named_params! { ":h": hash_id, ":account": account, ":index": index as i64 },
    )?;
    Ok(())
}

pub(crate) fn lookup_key_hash(conn: &Connection, hash_id: &[u8]) -> rusqlite::Result<Option<(i64, u64)>> {
    conn.query_row(
        "SELECT account, address_index FROM keys WHERE hash_id = :h",
        named_params! { ":h": hash_id },
        |row| Ok((row.get(0)?, row.get::<_, i64>(1)? as u64)),
    )
    .optional()
}

pub(crate) fn insert_out_key(
    conn: &Connection,
    one_time_spend_pub: &[u8],
    txid: &[u8],
    output_index: u32,
) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO out_keys (one_time_spend_pub, txid, output_index) VALUES (:p, :txid, :idx)
         ON CONFLICT (one_time_spend_pub) DO NOTHING",
        named_params! { ":p": one_time_spend_pub, ":txid": txid, ":idx": output_index },
    )?;
    Ok(())
}

pub(crate) fn lookup_out_key(
    conn: &Connection,
    one_time_spend_pub: &[u8],
) -> rusqlite::Result<Option<(Vec<u8>, u32)>> {
    conn.query_row(
        "SELECT txid, output_index FROM out_keys WHERE one_time_spend_pub = :p",
        named_params! { ":p": one_time_spend_pub },
        |row| Ok((row.get(0)?, row.get(1)?)),
    )
    .optional()
}

// --- tx_keys (ephemeral per-output public keys, retained only if configured) ----

pub(crate) fn insert_tx_key(
    conn: &Connection,
    height: u32,
    txid: &[u8],
    output_index: u32,
    ephemeral_pub: &[u8],
) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO tx_keys (height, txid, output_index, ephemeral_pub) VALUES (:h, :txid, :idx, :ek)
         ON CONFLICT (txid, output_index) DO NOTHING",
        named_params! { ":h": height, ":txid": txid, ":idx": output_index, ":ek": ephemeral_pub },
    )?;
    Ok(())
}

pub(crate) fn delete_tx_keys_by_height(conn: &Connection, height: u32) -> rusqlite::Result<()> {
    conn.execute("DELETE FROM tx_keys WHERE height = :h", named_params! { ":h": height })?;
    Ok(())
}

// --- block_hashes (retention-bounded reorg samples) --------------------------

pub(crate) fn insert_block_hash(conn: &Connection, height: u32, hash: &[u8]) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO block_hashes (height, hash) VALUES (:h, :hash)
         ON CONFLICT (height) DO UPDATE SET hash = excluded.hash",
        named_params! { ":h": height, ":hash": hash },
    )?;
    Ok(())
}

pub(crate) fn get_block_hash(conn: &Connection, height: u32) -> rusqlite::Result<Option<Vec<u8>>> {
    conn.query_row(
        "SELECT hash FROM block_hashes WHERE height = :h",
        named_params! { ":h": height },
        |row| row.get(0),
    )
    .optional()
}

pub(crate) fn delete_block_hash(conn: &Connection, height: u32) -> rusqlite::Result<()> {
    conn.execute("DELETE FROM block_hashes WHERE height = :h", named_params! { ":h": height })?;
    Ok(())
}

/// Prunes `block_hashes` rows older than `retain_from_height`, implementing the
/// retention window (`R = 10000`, cleaned up every 100 inserts).
pub(crate) fn prune_block_hashes(conn: &Connection, retain_from_height: u32) -> rusqlite::Result<()> {
    conn.execute(
        "DELETE FROM block_hashes WHERE height < :from",
        named_params! { ":from": retain_from_height },
    )?;
    Ok(())
}

// --- sync_state ---------------------------------------------------------------

pub(crate) fn get_sync_state(conn: &Connection) -> rusqlite::Result<(Option<u32>, Option<Vec<u8>>)> {
    conn.query_row(
        "SELECT synced_height, synced_hash FROM sync_state WHERE id = 0",
        [],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )
}

pub(crate) fn set_sync_state(conn: &Connection, height: u32, hash: &[u8]) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE sync_state SET synced_height = :h, synced_hash = :hash, updated_at = datetime('now') WHERE id = 0",
        named_params! { ":h": height, ":hash": hash },
    )?;
    Ok(())
}

// --- wallet_outputs (the UTXO state machine) ----------------------------------

#[allow(clippy::too_many_arguments)]
pub(crate) fn insert_output(
    conn: &Connection,
    txid: &[u8],
    output_index: u32,
    account: i64,
    address_index: u64,
    amount: u64,
    memo: Option<&str>,
    one_time_spend_pub: &[u8],
    output_hash: &[u8],
    ephemeral_pub: &[u8],
    gamma: Option<&[u8]>,
    token_id: Option<&[u8]>,
    height: Option<u32>,
    state: OutputState,
) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO wallet_outputs
            (txid, output_index, account, address_index, amount, memo, one_time_spend_pub,
             output_hash, ephemeral_pub, gamma, token_id, height, state, spent_height, spent_txid)
         VALUES (:txid, :idx, :account, :addr_idx, :amount, :memo, :spend_pub, :out_hash, :eph_pub,
                 :gamma, :token_id, :height, :state, NULL, NULL)
         ON CONFLICT (txid, output_index) DO UPDATE SET
            height = excluded.height,
            state = excluded.state",
        named_params! {
            ":txid": txid,
            ":idx": output_index,
            ":account": account,
            ":addr_idx": address_index as i64,
            ":amount": amount as i64,
            ":memo": memo,
            ":spend_pub": one_time_spend_pub,
            ":out_hash": output_hash,
            ":eph_pub": ephemeral_pub,
            ":gamma": gamma,
            ":token_id": token_id,
            ":height": height,
            ":state": state.as_i64(),
        },
    )?;
    Ok(())
}

pub(crate) fn mark_output_spent(
    conn: &Connection,
    txid: &[u8],
    output_index: u32,
    spent_height: Option<u32>,
    spent_txid: &[u8],
) -> rusqlite::Result<()> {
    let state = if spent_height.is_some() {
        OutputState::ConfirmedSpent
    } else {
        OutputState::PendingSpent
    };
    conn.execute(
        "UPDATE wallet_outputs
         SET state = :state, spent_height = :sh, spent_txid = :stx
         WHERE txid = :txid AND output_index = :idx",
        named_params! {
            ":state": state.as_i64(),
            ":sh": spent_height,
            ":stx": spent_txid,
            ":txid": txid,
            ":idx": output_index,
        },
    )?;
    Ok(())
}

/// Looks up a tracked output by the content hash inputs reference it by
/// (`InputRef::hash`), used to recognize and mark our own outputs as spent.
pub(crate) fn get_output_by_hash(
    conn: &Connection,
    output_hash: &[u8],
) -> rusqlite::Result<Option<WalletOutput>> {
    conn.query_row(
        "SELECT * FROM wallet_outputs WHERE output_hash = :h",
        named_params! { ":h": output_hash },
        output_from_row,
    )
    .optional()
}

/// Every output this wallet created or received in transaction `txid`.
pub(crate) fn get_outputs_by_txid(conn: &Connection, txid: &[u8]) -> rusqlite::Result<Vec<WalletOutput>> {
    let mut stmt = conn.prepare("SELECT * FROM wallet_outputs WHERE txid = :txid ORDER BY output_index")?;
    stmt.query_map(named_params! { ":txid": txid }, output_from_row)?
        .collect()
}

pub(crate) fn delete_outputs_by_height(conn: &Connection, height: u32) -> rusqlite::Result<()> {
    conn.execute(
        "DELETE FROM wallet_outputs WHERE height = :h",
        named_params! { ":h": height },
    )?;
    Ok(())
}

pub(crate) fn unspend_outputs_by_spent_height(conn: &Connection, height: u32) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE wallet_outputs
         SET state = :unspent, spent_height = NULL, spent_txid = NULL
         WHERE spent_height = :h",
        named_params! { ":unspent": OutputState::ConfirmedUnspent.as_i64(), ":h": height },
    )?;
    Ok(())
}

/// Returns the mempool (unconfirmed) `spent_txid` currently recorded against an owned
/// output, if its spend is still pending confirmation.
pub(crate) fn get_mempool_spent_tx_hash(
    conn: &Connection,
    txid: &[u8],
    output_index: u32,
) -> rusqlite::Result<Option<Vec<u8>>> {
    conn.query_row(
        "SELECT spent_txid FROM wallet_outputs
         WHERE txid = :txid AND output_index = :idx AND state = :pending_spent",
        named_params! {
            ":txid": txid,
            ":idx": output_index,
            ":pending_spent": OutputState::PendingSpent.as_i64(),
        },
        |row| row.get(0),
    )
    .optional()
    .map(Option::flatten)
}

/// Deletes the synthetic `PendingUnspent` rows a mempool transaction produced, once a
/// confirmed block has superseded it under a (possibly different) txid.
pub(crate) fn delete_unconfirmed_outputs_by_tx(conn: &Connection, txid: &[u8]) -> rusqlite::Result<()> {
    conn.execute(
        "DELETE FROM wallet_outputs WHERE txid = :txid AND state = :pending_unspent",
        named_params! { ":txid": txid, ":pending_unspent": OutputState::PendingUnspent.as_i64() },
    )?;
    Ok(())
}

/// Lists spendable outputs, optionally narrowed to one account and/or one token.
/// `token_id = None` means the native coin, matching the on-wire convention that a
/// `None` `token_id` denotes an unshielded-of-token (native) amount.
pub(crate) fn list_unspent(
    conn: &Connection,
    account: Option<i64>,
    token_id: Option<&[u8]>,
) -> rusqlite::Result<Vec<WalletOutput>> {
    let mut stmt = match account {
        Some(_) => conn.prepare(
            "SELECT * FROM wallet_outputs
             WHERE account = :account AND state IN (0, 1)
             AND ((:token_id IS NULL AND token_id IS NULL) OR token_id = :token_id)
             ORDER BY amount DESC",
        )?,
        None => conn.prepare(
            "SELECT * FROM wallet_outputs
             WHERE state IN (0, 1)
             AND ((:token_id IS NULL AND token_id IS NULL) OR token_id = :token_id)
             ORDER BY amount DESC",
        )?,
    };

    let rows = if let Some(account) = account {
        stmt.query_map(named_params! { ":account": account, ":token_id": token_id }, output_from_row)?
            .collect::<Result<Vec<_>, _>>()?
    } else {
        stmt.query_map(named_params! { ":token_id": token_id }, output_from_row)?
            .collect::<Result<Vec<_>, _>>()?
    };

    Ok(rows)
}

/// Sums confirmed (state 1) and pending (state 0) amounts, optionally narrowed to one
/// account and/or one token. `token_id = None` selects native-coin balances only.
pub(crate) fn balance(
    conn: &Connection,
    account: Option<i64>,
    token_id: Option<&[u8]>,
) -> rusqlite::Result<(u64, u64)> {
    let (confirmed, pending): (i64, i64) = match account {
        Some(account) => conn.query_row(
            "SELECT
                COALESCE(SUM(CASE WHEN state = 1 THEN amount ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN state = 0 THEN amount ELSE 0 END), 0)
             FROM wallet_outputs
             WHERE account = :account
             AND ((:token_id IS NULL AND token_id IS NULL) OR token_id = :token_id)",
            named_params! { ":account": account, ":token_id": token_id },
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?,
        None => conn.query_row(
            "SELECT
                COALESCE(SUM(CASE WHEN state = 1 THEN amount ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN state = 0 THEN amount ELSE 0 END), 0)
             FROM wallet_outputs
             WHERE (:token_id IS NULL AND token_id IS NULL) OR token_id = :token_id",
            named_params! { ":token_id": token_id },
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?,
    };
    Ok((confirmed as u64, pending as u64))
}
