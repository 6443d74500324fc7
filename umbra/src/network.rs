//! Chain parameters for the networks Umbra can connect to.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The network a wallet instance is configured against.
///
/// Unlike `zcash_protocol::consensus::Network`, this carries no notion of upgrade
/// activation heights: Umbra's sync engine does not validate consensus rules, it only
/// needs enough network identity to pick a P2P magic, a default port, and an address
/// human-readable prefix.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    #[default]
    Mainnet,
    Testnet,
    Regtest,
}

impl Network {
    /// The 4-byte magic that prefixes every P2P message on this network.
    pub(crate) fn magic(self) -> [u8; 4] {
        match self {
            Network::Mainnet => 0xDBD2_B1ACu32.to_le_bytes(),
            Network::Testnet => 0x1C03_BB83u32.to_le_bytes(),
            Network::Regtest => 0xFDBF_9FFBu32.to_le_bytes(),
        }
    }

    /// The default P2P listen port for this network.
    pub(crate) fn default_p2p_port(self) -> u16 {
        match self {
            Network::Mainnet => 44440,
            Network::Testnet => 33670,
            Network::Regtest => 18444,
        }
    }

    /// The human-readable prefix used by bech32(m) addresses on this network.
    pub(crate) fn hrp(self) -> &'static str {
        match self {
            Network::Mainnet => "nv",
            Network::Testnet => "tnv",
            Network::Regtest => "rnv",
        }
    }

    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Network::Mainnet => "main",
            Network::Testnet => "test",
            Network::Regtest => "regtest",
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Network {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "main" | "mainnet" => Ok(Network::Mainnet),
            "test" | "testnet" => Ok(Network::Testnet),
            "regtest" => Ok(Network::Regtest),
            _ => Err("expected one of 'main', 'test', or 'regtest'"),
        }
    }
}

pub(crate) mod kind {
    use rusqlite::{
        ToSql,
        types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, ValueRef},
    };

    use super::Network;

    pub(crate) struct Sql(pub(crate) Network);

    impl FromSql for Sql {
        fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
            value
                .as_str()?
                .parse::<Network>()
                .map(Sql)
                .map_err(|_| FromSqlError::InvalidType)
        }
    }

    impl ToSql for Sql {
        fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
            Ok(ToSqlOutput::Borrowed(ValueRef::Text(
                self.0.as_str().as_bytes(),
            )))
        }
    }
}
