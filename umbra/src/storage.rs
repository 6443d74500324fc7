//! Public storage types shared between the key manager, sync engine, mempool handler
//! and wallet facade.
//!
//! The actual SQL lives in `components::database::ops`; this module holds the plain
//! data types those functions read and write, kept separate from the database plumbing
//! so the rest of the crate doesn't need to know it's backed by SQLite.

pub(crate) use crate::components::database::ops;
pub(crate) use crate::components::database::{Database, DbHandle};

#[cfg(test)]
pub(crate) use crate::components::database::testing;

/// The lifecycle state of a tracked output: `∅ -> PENDING_UNSPENT -> CONFIRMED_UNSPENT
/// -> {PENDING_SPENT ->} CONFIRMED_SPENT`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum OutputState {
    /// Seen in a mempool-relayed transaction, not yet mined.
    PendingUnspent,
    /// Mined and not yet spent.
    ConfirmedUnspent,
    /// Unmined spend observed in the mempool for a confirmed (or another pending)
    /// output.
    PendingSpent,
    /// Spend mined into a block.
    ConfirmedSpent,
}

impl OutputState {
    pub(crate) fn as_i64(self) -> i64 {
        match self {
            OutputState::PendingUnspent => 0,
            OutputState::ConfirmedUnspent => 1,
            OutputState::PendingSpent => 2,
            OutputState::ConfirmedSpent => 3,
        }
    }

    pub(crate) fn from_i64(v: i64) -> Self {
        match v {
            0 => OutputState::PendingUnspent,
            1 => OutputState::ConfirmedUnspent,
            2 => OutputState::PendingSpent,
            _ => OutputState::ConfirmedSpent,
        }
    }

    pub(crate) fn is_spendable(self) -> bool {
        matches!(self, OutputState::ConfirmedUnspent | OutputState::PendingUnspent)
    }
}

/// A single tracked output, as persisted in the `wallet_outputs` table.
#[derive(Clone, Debug)]
pub(crate) struct WalletOutput {
    pub txid: Vec<u8>,
    pub output_index: u32,
    pub account: i64,
    pub address_index: i64,
    pub amount: u64,
    pub memo: Option<String>,
    pub one_time_spend_pub: Vec<u8>,
    /// Content hash of the serialized output, the identifier inputs reference it by on
    /// the wire (`InputRef::hash`). Distinct from `one_time_spend_pub`: the latter keys
    /// `out_keys` for spend-key lookup, this one is what prevout refs actually match.
    pub output_hash: Vec<u8>,
    pub ephemeral_pub: Vec<u8>,
    /// The recovered Pedersen blinding scalar for this output's amount commitment.
    /// `None` when recovery failed or the output carries no confidential amount.
    pub gamma: Option<Vec<u8>>,
    /// The token this output is denominated in. `None` means the native coin.
    pub token_id: Option<Vec<u8>>,
    pub height: Option<u32>,
    pub state: OutputState,
    pub spent_height: Option<u32>,
    pub spent_txid: Option<Vec<u8>>,
}
