//! Address string encoding.
//!
//! Wallet addresses are just a sub-address's two compressed G1 points (spend and view
//! public keys), strung together and wrapped in a human-readable `bech32` envelope. This
//! is kept behind a narrow [`Codec`] trait rather than inlined in [`crate::keys`] so that
//! the rest of the crate (in particular the RPC surface, which only ever deals in
//! strings) doesn't need to know the wire layout.

use bech32::{Bech32m, Hrp};

use crate::{
    crypto::{CompressedPoint, SubAddressPubKey},
    error::{Error, ErrorKind},
    network::Network,
};

/// Encodes and decodes wallet addresses as strings.
pub(crate) trait Codec: Sized {
    fn encode(&self, network: Network) -> String;
    fn decode(network: Network, s: &str) -> Result<Self, Error>;
}

impl Codec for SubAddressPubKey {
    fn encode(&self, network: Network) -> String {
        let hrp = Hrp::parse(network.hrp()).expect("static HRPs are valid");
        let mut data = Vec::with_capacity(96);
        data.extend_from_slice(&self.spend_pub);
        data.extend_from_slice(&self.view_pub);
        bech32::encode::<Bech32m>(hrp, &data).expect("fixed-size payload always encodes")
    }

    fn decode(network: Network, s: &str) -> Result<Self, Error> {
        let (hrp, data) = bech32::decode(s).map_err(|e| ErrorKind::InvalidAddress.context(e))?;
        if hrp.as_str() != network.hrp() {
            return Err(ErrorKind::InvalidAddress
                .context(format!(
                    "address is for a different network (expected {}, got {})",
                    network.hrp(),
                    hrp.as_str()
                ))
                .into());
        }
        if data.len() != 96 {
            return Err(ErrorKind::InvalidAddress
                .context("address payload has the wrong length")
                .into());
        }

        let spend_pub: CompressedPoint = data[0..48]
            .try_into()
            .expect("checked length above");
        let view_pub: CompressedPoint = data[48..96]
            .try_into()
            .expect("checked length above");

        Ok(SubAddressPubKey {
            spend_pub,
            view_pub,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_bech32m() {
        let pk = SubAddressPubKey {
            spend_pub: [1u8; 48],
            view_pub: [2u8; 48],
        };
        let encoded = pk.encode(Network::Mainnet);
        assert!(encoded.starts_with("nv1"));

        let decoded = SubAddressPubKey::decode(Network::Mainnet, &encoded).unwrap();
        assert_eq!(decoded.spend_pub, pk.spend_pub);
        assert_eq!(decoded.view_pub, pk.view_pub);
    }

    #[test]
    fn rejects_wrong_network() {
        let pk = SubAddressPubKey {
            spend_pub: [1u8; 48],
            view_pub: [2u8; 48],
        };
        let encoded = pk.encode(Network::Testnet);
        assert!(SubAddressPubKey::decode(Network::Mainnet, &encoded).is_err());
    }
}
