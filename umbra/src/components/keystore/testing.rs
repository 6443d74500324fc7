//! Test utilities for keystore operations.

use super::KeyStore;
use crate::{error::Error, storage::Database};

/// Generates a test age identity and its corresponding recipient string.
pub(crate) fn generate_test_identity() -> (age::x25519::Identity, String) {
    let identity = age::x25519::Identity::generate();
    let recipient = identity.to_public();
    (identity, recipient.to_string())
}

/// Creates a test [`KeyStore`] with a freshly generated identity, already unlocked and
/// with recipients initialized, suitable for exercising key generation/derivation in
/// unit tests without touching the filesystem.
pub(crate) async fn test_keystore(db: Database) -> Result<KeyStore, Error> {
    let (identity, recipient_string) = generate_test_identity();

    let keystore = KeyStore::new_for_testing(db, vec![Box::new(identity)]);
    keystore.initialize_recipients(vec![recipient_string]).await?;

    Ok(keystore)
}
