//! The Umbra key manager.
//!
//! # Design
//!
//! Umbra stores key material (the wallet seed's mnemonic phrase, and the derived
//! spending scalar) in the same SQLite database as everything else, encrypted at rest
//! with [`age`]. age is built around "encryption recipients" and "decryption
//! identities":
//!
//! - Once the wallet has been initialized for an identity file, key material can be
//!   added to the database at any time without the identity file being present.
//! - Identity files can themselves be encrypted with a passphrase, letting the operator
//!   limit how long the decryption key is resident in memory (`lockwallet`/
//!   `unlockwallet`).
//!
//! The view private scalar is *not* encrypted: the sync engine needs it on every scan
//! pass regardless of whether the wallet is "locked", and it cannot be used to spend
//! funds, only to recognize and decrypt them. Only the spend private scalar (and the
//! seed mnemonic it is derived from) require the keystore to be unlocked.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use std::sync::Arc;

use bip0039::{English, Mnemonic};
use rand::thread_rng;
use rusqlite::Connection;
use secrecy::{ExposeSecret, SecretString, SecretVec, Zeroize};
use tokio::sync::RwLock;

use crate::{
    config::UmbraConfig,
    crypto::{self, CompressedPoint, SecretScalar, SubAddressPubKey},
    error::{Error, ErrorKind},
    storage::{self, Database, ops},
};

pub(crate) mod error;
#[cfg(test)]
pub(crate) mod testing;

pub(crate) use error::KeystoreError;

/// The fixed HD child indices within `tx_key`.
const TX_KEY_VIEW: u32 = 0;
const TX_KEY_SPEND: u32 = 1;

/// The fixed HD child indices within the seed-derived `child` scalar.
const CHILD_TX_KEY: u32 = 0;
const CHILD_BLINDING_KEY: u32 = 1;
const CHILD_TOKEN_KEY: u32 = 2;

/// The key manager: owns age identities/recipients, the HD derivation tree, and the
/// sub-address pool (generation, gap-limit top-up, and the `is_mine_by_keys` index).
pub(crate) struct KeyStore {
    db: Database,

    /// The gap limit applied when topping up a sub-address pool.
    gap_limit: u64,

    /// A ciphertext ostensibly containing encrypted age identities, or `None` if the
    /// configured identity file is not passphrase-protected.
    encrypted_identities: Option<Vec<u8>>,

    /// The in-memory cache of age identities used to decrypt key material.
    identities: Arc<RwLock<Vec<Box<dyn age::Identity + Send + Sync>>>>,
}

impl std::fmt::Debug for KeyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyStore").finish_non_exhaustive()
    }
}

impl KeyStore {
    /// Opens the key manager, loading (but not necessarily unlocking) the configured
    /// age identity file.
    pub(crate) async fn new(config: &UmbraConfig, db: Database) -> Result<Self, Error> {
        let path = config.encryption_identity();

        let mut identity_data = vec![];
        File::open(&path)
            .and_then(|mut f| f.read_to_end(&mut identity_data))
            .map_err(|e| {
                ErrorKind::Init.context(format!(
                    "could not read keystore identity file {}: {e}",
                    path.display()
                ))
            })?;

        let mut encrypted_identities = None;
        let mut identities = Vec::new();

        if let Ok(decryptor) =
            age::Decryptor::new_buffered(age::armor::ArmoredReader::new(identity_data.as_slice()))
        {
            // Only passphrase-encrypted age identities are supported as "locked" files.
            if age::encrypted::EncryptedIdentity::new(decryptor, age::NoCallbacks, None).is_none() {
                return Err(ErrorKind::Init
                    .context("keystore identity file is not encrypted with a passphrase")
                    .into());
            }
            encrypted_identities = Some(identity_data);
        } else {
            let identity_file = age::IdentityFile::from_file(path.display().to_string())
                .map_err(|e| ErrorKind::Init.context(e))?
                .with_callbacks(age::cli_common::UiCallbacks);
            identities = identity_file.into_identities().map_err(|e| {
                ErrorKind::Init.context(format!("keystore identity file is not usable: {e}"))
            })?;
        }

        Ok(Self {
            db,
            gap_limit: config.keystore.gap_limit,
            encrypted_identities,
            identities: Arc::new(RwLock::new(identities)),
        })
    }

    /// Builds a [`KeyStore`] directly from an already-loaded set of identities, skipping
    /// the identity-file parsing `new` performs. Used by tests only.
    #[cfg(test)]
    pub(crate) fn new_for_testing(
        db: Database,
        identities: Vec<Box<dyn age::Identity + Send + Sync>>,
    ) -> Self {
        Self {
            db,
            gap_limit: 20,
            encrypted_identities: None,
            identities: Arc::new(RwLock::new(identities)),
        }
    }

    /// Returns `true` if the keystore's age identities require a passphrase to unlock.
    pub(crate) fn is_crypted(&self) -> bool {
        self.encrypted_identities.is_some()
    }

    /// Returns `true` if the keystore's decryption identities are not currently loaded.
    pub(crate) async fn is_locked(&self) -> bool {
        self.is_crypted() && self.identities.read().await.is_empty()
    }

    /// Unlocks a passphrase-protected identity file, loading its identities into
    /// memory until [`KeyStore::lock`] is called.
    pub(crate) async fn unlock(&self, passphrase: SecretString) -> Result<(), Error> {
        let Some(encrypted) = &self.encrypted_identities else {
            // Nothing to unlock; treat as a no-op, matching an always-unlocked wallet.
            return Ok(());
        };

        let decryptor =
            age::Decryptor::new_buffered(age::armor::ArmoredReader::new(encrypted.as_slice()))
                .map_err(|e| ErrorKind::Generic.context(e))?;
        let identity = age::encrypted::EncryptedIdentity::new(
            decryptor,
            age::NoCallbacks,
            Some(passphrase),
        )
        .ok_or_else(|| ErrorKind::Generic.context("identity file is not passphrase-encrypted"))?;

        *self.identities.write().await = vec![Box::new(identity)];
        Ok(())
    }

    /// Clears the in-memory decryption identities, requiring [`KeyStore::unlock`] again
    /// before spend-key material can be accessed.
    pub(crate) async fn lock(&self) {
        if self.is_crypted() {
            self.identities.write().await.clear();
        }
    }

    async fn with_db<T>(&self, f: impl FnOnce(&Connection) -> Result<T, Error>) -> Result<T, Error> {
        self.db.handle().await?.with_raw(f)
    }

    async fn with_db_mut<T>(
        &self,
        f: impl FnOnce(&mut Connection) -> Result<T, Error>,
    ) -> Result<T, Error> {
        self.db.handle().await?.with_raw_mut(f)
    }

    /// Fetches this wallet's age recipients from the database.
    async fn recipients(&self) -> Result<Vec<Box<dyn age::Recipient + Send>>, Error> {
        let recipient_strings = self
            .with_db(|conn| {
                ops::is_encrypted(conn)
                    .map_err(|e| ErrorKind::Storage.context(e))?
                    .then(|| ())
                    .ok_or_else(|| ErrorKind::Generic.context(KeystoreError::MissingRecipients))?;
                conn.query_row(
                    "SELECT age_recipients FROM encryption_metadata WHERE id = 0",
                    [],
                    |row| row.get::<_, Vec<u8>>(0),
                )
                .map_err(|e| ErrorKind::Storage.context(e))
            })
            .await?;

        let recipient_strings = String::from_utf8(recipient_strings)
            .map_err(|e| ErrorKind::Storage.context(e))?
            .lines()
            .map(str::to_owned)
            .collect();

        let mut stdin_guard = age::cli_common::StdinGuard::new(false);
        age::cli_common::read_recipients(recipient_strings, vec![], vec![], None, &mut stdin_guard)
            .map_err(|e| ErrorKind::Generic.context(e))
    }

    /// Records the recipients this wallet encrypts key material to. Run once, by the
    /// `init-wallet-encryption` subcommand, before any key material is generated or
    /// imported.
    pub(crate) async fn initialize_recipients(&self, recipients: Vec<String>) -> Result<(), Error> {
        let blob = recipients.join("\n").into_bytes();
        self.with_db_mut(|conn| {
            ops::set_encrypted(conn, true, Some(&blob)).map_err(|e| ErrorKind::Storage.context(e))
        })
        .await
    }

    /// Generates a new wallet seed (or imports `mnemonic` if supplied), encrypting the
    /// mnemonic phrase to this wallet's recipients and deriving+storing the view and
    /// spend keys. Returns the mnemonic phrase so the caller can display/back it up.
    pub(crate) async fn generate_or_import(
        &self,
        mnemonic: Option<SecretString>,
    ) -> Result<SecretString, Error> {
        let recipients = self.recipients().await?;

        let mnemonic = match mnemonic {
            Some(phrase) => Mnemonic::<English>::from_phrase(phrase.expose_secret())
                .map_err(|e| ErrorKind::InvalidMnemonic.context(e))?,
            None => Mnemonic::<English>::generate(thread_rng()),
        };
        let phrase = SecretString::new(mnemonic.phrase().to_owned());

        let mut seed = mnemonic.to_seed("");
        let master_sk = crypto::derive_master_sk(&seed);
        seed.zeroize();

        let child = crypto::derive_child_sk(&master_sk, CHILD_TX_KEY);
        let _blinding_key = crypto::derive_child_sk(&master_sk, CHILD_BLINDING_KEY);
        let _token_key = crypto::derive_child_sk(&master_sk, CHILD_TOKEN_KEY);
        let view_sk = crypto::derive_child_sk(&child, TX_KEY_VIEW);
        let spend_sk = crypto::derive_child_sk(&child, TX_KEY_SPEND);

        let view_pub = crypto::sk_to_pk(&view_sk);
        let spend_pub = crypto::sk_to_pk(&spend_sk);

        let encrypted_mnemonic = encrypt_string(&recipients, phrase.expose_secret())
            .map_err(|e| ErrorKind::Generic.context(e))?;
        let encrypted_spend_sk = encrypt_string(&recipients, &hex::encode(spend_sk.to_bytes()))
            .map_err(|e| ErrorKind::Generic.context(e))?;

        self.with_db_mut(|conn| {
            ops::store_master_seed(conn, &encrypted_mnemonic)
                .map_err(|e| ErrorKind::Storage.context(e))?;
            ops::store_view_key(conn, &view_sk.to_bytes(), &view_pub)
                .map_err(|e| ErrorKind::Storage.context(e))?;
            ops::store_spend_key(conn, encrypted_spend_sk.as_bytes(), &spend_pub)
                .map_err(|e| ErrorKind::Storage.context(e))
        })
        .await?;

        // The primary sub-address (account 0, index 0) always exists.
        self.get_sub_address(0, 0).await?;

        Ok(phrase)
    }

    /// Exports the wallet's mnemonic phrase. Requires the keystore to be unlocked.
    pub(crate) async fn export_mnemonic(&self) -> Result<SecretString, Error> {
        let identities = self.identities.read().await;
        if identities.is_empty() {
            return Err(ErrorKind::WalletLocked.into());
        }

        let encrypted = self
            .with_db(|conn| {
                ops::load_master_seed(conn)
                    .map_err(|e| ErrorKind::Storage.context(e))?
                    .ok_or_else(|| ErrorKind::WalletNotFound.context("no wallet seed").into())
            })
            .await?;

        decrypt_string(&identities, &encrypted).map_err(|e| ErrorKind::Generic.context(e).into())
    }

    /// The view private scalar, always available regardless of lock state.
    async fn view_sk(&self) -> Result<SecretScalar, Error> {
        let (sk_bytes, _pk) = self
            .with_db(|conn| {
                ops::load_view_key(conn)
                    .map_err(|e| ErrorKind::Storage.context(e))?
                    .ok_or_else(|| ErrorKind::WalletNotFound.context("no view key").into())
            })
            .await?;
        let sk_bytes: [u8; 32] = sk_bytes
            .try_into()
            .map_err(|_| ErrorKind::Storage.context("malformed view_sk"))?;
        SecretScalar::from_bytes(&sk_bytes).ok_or_else(|| ErrorKind::Storage.context("invalid view_sk").into())
    }

    /// The spend private scalar. Requires the keystore to be unlocked.
    async fn spend_sk(&self) -> Result<SecretScalar, Error> {
        let identities = self.identities.read().await;
        if identities.is_empty() {
            return Err(ErrorKind::WalletLocked.into());
        }

        let (encrypted_sk, _pk) = self
            .with_db(|conn| {
                ops::load_spend_key(conn)
                    .map_err(|e| ErrorKind::Storage.context(e))?
                    .ok_or_else(|| ErrorKind::WalletNotFound.context("no spend key").into())
            })
            .await?;

        let hex_sk =
            decrypt_string(&identities, &encrypted_sk).map_err(|e| ErrorKind::Generic.context(e))?;
        let sk_bytes: [u8; 32] = hex::decode(hex_sk.expose_secret())
            .map_err(|e| ErrorKind::Generic.context(e))?
            .try_into()
            .map_err(|_| ErrorKind::Storage.context("malformed spend_sk"))?;
        SecretScalar::from_bytes(&sk_bytes)
            .ok_or_else(|| ErrorKind::Storage.context("invalid spend_sk").into())
    }

    /// The wallet's root spend public key, needed to derive any sub-address.
    async fn spend_pub(&self) -> Result<CompressedPoint, Error> {
        let (_sk, pk) = self
            .with_db(|conn| {
                ops::load_spend_key(conn)
                    .map_err(|e| ErrorKind::Storage.context(e))?
                    .ok_or_else(|| ErrorKind::WalletNotFound.context("no spend key").into())
            })
            .await?;
        pk.try_into()
            .map_err(|_| ErrorKind::Storage.context("malformed spend_pub").into())
    }

    /// Returns the `(account, index)` sub-address's double public key, deriving and
    /// caching it if this is the first time it has been requested.
    pub(crate) async fn get_sub_address(
        &self,
        account: i64,
        index: u64,
    ) -> Result<SubAddressPubKey, Error> {
        if let Some((spend_pub, view_pub)) = self
            .with_db(|conn| ops::get_sub_address(conn, account, index).map_err(|e| ErrorKind::Storage.context(e)))
            .await?
        {
            return Ok(SubAddressPubKey {
                spend_pub: spend_pub
                    .try_into()
                    .map_err(|_| ErrorKind::Storage.context("malformed spend_pub"))?,
                view_pub: view_pub
                    .try_into()
                    .map_err(|_| ErrorKind::Storage.context("malformed view_pub"))?,
            });
        }

        let view_sk = self.view_sk().await?;
        let spend_pub_root = self.spend_pub().await?;
        let pubkey = crypto::sub_address(&view_sk, &spend_pub_root, account, index)?;

        self.with_db_mut(|conn| {
            ops::upsert_sub_address(conn, account, index, &pubkey.spend_pub, &pubkey.view_pub)
                .map_err(|e| ErrorKind::Storage.context(e))?;
            ops::insert_key_hash(conn, &crypto::hash_id(&pubkey), account, index)
                .map_err(|e| ErrorKind::Storage.context(e))
        })
        .await?;

        Ok(pubkey)
    }

    /// Generates the next never-before-issued sub-address for `account`, advancing the
    /// account's `highest_generated` counter.
    pub(crate) async fn generate_new_sub_address(
        &self,
        account: i64,
    ) -> Result<(u64, SubAddressPubKey), Error> {
        let (highest_generated, highest_used) = self
            .with_db(|conn| ops::sub_address_counter(conn, account).map_err(|e| ErrorKind::Storage.context(e)))
            .await?;

        let index = if highest_generated == 0 && highest_used < 0 {
            0
        } else {
            highest_generated + 1
        };

        let pubkey = self.get_sub_address(account, index).await?;

        self.with_db_mut(|conn| {
            ops::set_sub_address_counter(conn, account, index, highest_used)
                .map_err(|e| ErrorKind::Storage.context(e))
        })
        .await?;

        Ok((index, pubkey))
    }

    /// Tops up `account`'s sub-address pool so that at least `gap_limit` unused
    /// addresses are generated past the highest one seen in a transaction.
    ///
    /// Called after every block during sync whenever a sub-address is used, to
    /// maintain the configured gap limit.
    pub(crate) async fn top_up(&self, account: i64) -> Result<(), Error> {
        loop {
            let (highest_generated, highest_used) = self
                .with_db(|conn| {
                    ops::sub_address_counter(conn, account).map_err(|e| ErrorKind::Storage.context(e))
                })
                .await?;

            let generated_ahead = highest_generated as i64 - highest_used;
            if generated_ahead >= self.gap_limit as i64 {
                break;
            }

            self.generate_new_sub_address(account).await?;
        }

        Ok(())
    }

    /// Records that `index` (within `account`) has been observed spent-to in a
    /// transaction, advancing `highest_used` so [`KeyStore::top_up`] knows to generate
    /// further ahead.
    pub(crate) async fn mark_sub_address_used(&self, account: i64, index: u64) -> Result<(), Error> {
        let (highest_generated, highest_used) = self
            .with_db(|conn| ops::sub_address_counter(conn, account).map_err(|e| ErrorKind::Storage.context(e)))
            .await?;

        if (index as i64) > highest_used {
            self.with_db_mut(|conn| {
                ops::set_sub_address_counter(conn, account, highest_generated.max(index), index as i64)
                    .map_err(|e| ErrorKind::Storage.context(e))
            })
            .await?;
        }

        self.top_up(account).await
    }

    /// The ownership check: does `pubkey` correspond to a sub-address this wallet
    /// controls? `shared_secret` and `view_tag` must come from the same output's
    /// ephemeral key so the fast-reject filter below is checking the value the sender
    /// actually embedded; a mismatch rejects before the (costlier) `hash_id` lookup
    /// runs at all. Returns the owning `(account, index)` if so.
    pub(crate) async fn is_mine_by_keys(
        &self,
        pubkey: &SubAddressPubKey,
        shared_secret: &CompressedPoint,
        view_tag: u16,
    ) -> Result<Option<(i64, u64)>, Error> {
        let expected_view_tag = crypto::view_tag(shared_secret);
        if !crypto::view_tags_eq(expected_view_tag, view_tag) {
            return Ok(None);
        }

        let hash_id = crypto::hash_id(pubkey);
        self.with_db(|conn| ops::lookup_key_hash(conn, &hash_id).map_err(|e| ErrorKind::Storage.context(e)))
            .await
    }

    /// Derives the one-time private spending key for an owned output. Requires the
    /// keystore to be unlocked.
    pub(crate) async fn private_spending_key(
        &self,
        account: i64,
        index: u64,
        shared_secret: &CompressedPoint,
        output_index: u32,
    ) -> Result<SecretScalar, Error> {
        let spend_sk = self.spend_sk().await?;
        let view_sk = self.view_sk().await?;
        Ok(crypto::private_spending_key(
            &spend_sk,
            &view_sk,
            account,
            index,
            shared_secret,
            output_index,
        ))
    }

    /// Computes the scanning-side DH shared secret for a candidate output's ephemeral
    /// public key. Always available, since it only needs the view scalar.
    pub(crate) async fn shared_secret(
        &self,
        ephemeral_pub: &CompressedPoint,
    ) -> Result<CompressedPoint, Error> {
        let view_sk = self.view_sk().await?;
        crypto::dh_shared_secret_scan(&view_sk, ephemeral_pub)
    }
}

fn encrypt_string(
    recipients: &[Box<dyn age::Recipient + Send>],
    plaintext: &str,
) -> Result<Vec<u8>, age::EncryptError> {
    let encryptor = age::Encryptor::with_recipients(recipients.iter().map(|r| r.as_ref() as _))?;

    let mut ciphertext = Vec::with_capacity(plaintext.len());
    let mut writer = encryptor.wrap_output(&mut ciphertext)?;
    writer.write_all(plaintext.as_bytes())?;
    writer.finish()?;

    Ok(ciphertext)
}

fn decrypt_string(
    identities: &[Box<dyn age::Identity + Send + Sync>],
    ciphertext: &[u8],
) -> Result<SecretString, age::DecryptError> {
    let decryptor = age::Decryptor::new(ciphertext)?;

    // The plaintext is always shorter than the ciphertext. Over-allocating the initial
    // string up front avoids any internal reallocation that could leave plaintext bytes
    // behind in the heap.
    let mut buf = String::with_capacity(ciphertext.len());
    let res = decryptor
        .decrypt(identities.iter().map(|i| i.as_ref() as _))?
        .read_to_string(&mut buf);

    // We deliberately don't use `?` directly on the decryption call: a partial failure
    // could leave secret bytes in `buf` without it ever becoming a `SecretString`.
    let secret = SecretString::new(buf);
    res?;

    Ok(secret)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::Network;

    #[tokio::test]
    async fn generate_and_recover_mnemonic() {
        let db = storage::testing::in_memory_database(Network::Regtest).await;
        let keystore = testing::test_keystore(db).await.unwrap();

        let phrase = keystore.generate_or_import(None).await.unwrap();
        let exported = keystore.export_mnemonic().await.unwrap();
        assert_eq!(phrase.expose_secret(), exported.expose_secret());
    }

    #[tokio::test]
    async fn sub_address_pool_top_up_respects_gap_limit() {
        let db = storage::testing::in_memory_database(Network::Regtest).await;
        let keystore = testing::test_keystore(db).await.unwrap();
        keystore.generate_or_import(None).await.unwrap();

        keystore.top_up(0).await.unwrap();
        let (generated, _used) = keystore
            .with_db(|conn| ops::sub_address_counter(conn, 0).map_err(|e| ErrorKind::Storage.context(e)))
            .await
            .unwrap();
        assert_eq!(generated as u64, keystore.gap_limit);
    }
}
