//! BLS12-381 confidential-transaction primitives.
//!
//! Umbra's chain encodes every non-transparent output as a BLS12-381 G1 "double public
//! key" (a spend component and a view component), with a shared secret derived via
//! Diffie-Hellman between the sender's ephemeral key and the recipient's view key. This
//! module implements the small set of pure functions that sit on top of that design:
//! hierarchical key derivation, sub-address generation, the view-tag fast-reject filter,
//! shared-secret derivation, amount/memo recovery, and transaction assembly/signing.
//! Range-proof verification and consensus validation are explicitly out of scope.

use blake2::{Blake2b512, Digest};
use bls12_381::{G1Affine, G1Projective, Scalar};
use chacha20poly1305::{
    ChaCha20Poly1305, KeyInit, Nonce,
    aead::{Aead, Payload},
};
use ff::Field;
use group::{Curve, Group};
use hkdf::Hkdf;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{Error, ErrorKind};

/// Sentinel amount used on the wire to mean "this output's value is not confidential".
pub const MAX_AMOUNT: u64 = 0x7FFF_FFFF_FFFF_FFFF;

/// A scalar in the BLS12-381 scalar field, held as a private key or derivation offset.
///
/// Zeroized on drop; never implements `Debug` so it cannot accidentally be logged.
#[derive(Clone)]
pub struct SecretScalar(Scalar);

impl Zeroize for SecretScalar {
    fn zeroize(&mut self) {
        self.0 = Scalar::zero();
    }
}

impl ZeroizeOnDrop for SecretScalar {}

impl Drop for SecretScalar {
    fn drop(&mut self) {
        self.zeroize();
    }
}

impl SecretScalar {
    pub fn from_scalar(s: Scalar) -> Self {
        Self(s)
    }

    pub fn scalar(&self) -> &Scalar {
        &self.0
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        self.0.to_bytes()
    }

    pub fn from_bytes(bytes: &[u8; 32]) -> Option<Self> {
        Option::<Scalar>::from(Scalar::from_bytes(bytes)).map(Self)
    }
}

/// A compressed BLS12-381 G1 point, as it appears on the wire (48 bytes).
pub type CompressedPoint = [u8; 48];

fn point_to_bytes(p: &G1Affine) -> CompressedPoint {
    p.to_compressed()
}

fn point_from_bytes(bytes: &CompressedPoint) -> Result<G1Affine, Error> {
    Option::<G1Affine>::from(G1Affine::from_compressed(bytes))
        .ok_or_else(|| ErrorKind::Parse.context("invalid G1 point encoding").into())
}

fn double_sha256(data: &[u8]) -> [u8; 32] {
    let first = Sha256::digest(data);
    let second = Sha256::digest(first);
    second.into()
}

/// Hashes arbitrary domain-separated input down to a scalar, via wide reduction of a
/// 64-byte BLAKE2b digest.
fn hash_to_scalar(domain: &[u8], parts: &[&[u8]]) -> Scalar {
    let mut hasher = Blake2b512::new();
    hasher.update(domain);
    for part in parts {
        hasher.update(part);
    }
    let digest = hasher.finalize();
    let mut wide = [0u8; 64];
    wide.copy_from_slice(&digest);
    Scalar::from_bytes_wide(&wide)
}

/// Hashes domain-separated input down to a G1 point, standing in for a proper
/// hash-to-curve function the same way this module's range-proof handling stands in
/// for Bulletproof+: a real implementation would use a constant-time hash-to-curve,
/// verified by consensus rules this wallet never evaluates.
fn hash_to_g1(domain: &[u8], msg: &[u8]) -> G1Affine {
    let scalar = hash_to_scalar(domain, &[msg]);
    (G1Affine::generator() * scalar).to_affine()
}

/// Derives the master spending scalar for a wallet seed.
///
/// This is the root of the fixed child-index derivation tree: `seed -> 130 -> child`.
pub fn derive_master_sk(seed: &[u8]) -> SecretScalar {
    derive_child_sk(&master_from_seed(seed), 130)
}

/// The very first derivation step, turning raw seed bytes into a root scalar via HKDF.
fn master_from_seed(seed: &[u8]) -> SecretScalar {
    let hk = Hkdf::<Sha256>::new(Some(b"umbra-hd-seed"), seed);
    let mut okm = [0u8; 64];
    hk.expand(b"master", &mut okm)
        .expect("64 is a valid HKDF-SHA256 output length");
    SecretScalar(Scalar::from_bytes_wide(&okm))
}

/// Derives a child scalar from a parent scalar and a (non-hardened) numeric index.
///
/// Matches the fixed tree used throughout Umbra: `child -> 0 -> tx_key`,
/// `child -> 1 -> blinding_key`, `child -> 2 -> token_key`, `tx_key -> 0 -> view_key`,
/// `tx_key -> 1 -> spend_key`.
pub fn derive_child_sk(parent: &SecretScalar, index: u32) -> SecretScalar {
    let offset = hash_to_scalar(b"umbra-hd-child", &[&parent.to_bytes(), &index.to_le_bytes()]);
    SecretScalar(parent.0 + offset)
}

/// Computes the public point corresponding to a private scalar.
pub fn sk_to_pk(sk: &SecretScalar) -> CompressedPoint {
    point_to_bytes(&(G1Affine::generator() * sk.0).to_affine())
}

/// A sub-address's double public key: a spend component and a view component.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SubAddressPubKey {
    pub spend_pub: CompressedPoint,
    pub view_pub: CompressedPoint,
}

/// Derives the `(account, index)` sub-address public key from the wallet's view and
/// spend public keys.
///
/// `account = -1` is the reserved change sub-address range; `account = -2` is reserved
/// for future use.
pub fn sub_address(
    view_sk: &SecretScalar,
    spend_pub: &CompressedPoint,
    account: i64,
    index: u64,
) -> Result<SubAddressPubKey, Error> {
    let spend_pub_point = point_from_bytes(spend_pub)?;

    if account == 0 && index == 0 {
        // The primary address has no offset applied.
        let view_pub = point_to_bytes(&(G1Affine::generator() * view_sk.0).to_affine());
        return Ok(SubAddressPubKey {
            spend_pub: *spend_pub,
            view_pub,
        });
    }

    let m = hash_to_scalar(
        b"umbra-subaddress",
        &[
            &view_sk.to_bytes(),
            &account.to_le_bytes(),
            &index.to_le_bytes(),
        ],
    );

    let spend_pub_i = (G1Projective::from(spend_pub_point) + G1Affine::generator() * m).to_affine();
    let view_pub_i = (spend_pub_i * view_sk.0).to_affine();

    Ok(SubAddressPubKey {
        spend_pub: point_to_bytes(&spend_pub_i),
        view_pub: point_to_bytes(&view_pub_i),
    })
}

/// The scalar offset applied by [`sub_address`], needed to recover the private spending
/// key for an owned sub-address.
fn sub_address_offset(view_sk: &SecretScalar, account: i64, index: u64) -> Scalar {
    if account == 0 && index == 0 {
        return Scalar::zero();
    }
    hash_to_scalar(
        b"umbra-subaddress",
        &[
            &view_sk.to_bytes(),
            &account.to_le_bytes(),
            &index.to_le_bytes(),
        ],
    )
}

/// Computes the Diffie-Hellman shared secret between an ephemeral transaction key and a
/// recipient's view key, as a compressed point (the scanning side holds the view
/// private scalar and the ephemeral public key `r_pub`; the sending side holds the
/// ephemeral private scalar `r` and the recipient's view public key).
pub fn dh_shared_secret_scan(view_sk: &SecretScalar, ephemeral_pub: &CompressedPoint) -> Result<CompressedPoint, Error> {
    let r_pub = point_from_bytes(ephemeral_pub)?;
    Ok(point_to_bytes(&(r_pub * view_sk.0).to_affine()))
}

pub fn dh_shared_secret_send(ephemeral_sk: &SecretScalar, view_pub: &CompressedPoint) -> Result<CompressedPoint, Error> {
    let view_pub_point = point_from_bytes(view_pub)?;
    Ok(point_to_bytes(&(view_pub_point * ephemeral_sk.0).to_affine()))
}

/// Derives the 16-bit little-endian view tag used to cheaply reject outputs that do not
/// belong to this wallet before computing the full ownership check.
pub fn view_tag(shared_secret: &CompressedPoint) -> u16 {
    let mut hasher = Blake2b512::new();
    hasher.update(b"umbra-view-tag");
    hasher.update(shared_secret);
    let digest = hasher.finalize();
    u16::from_le_bytes([digest[0], digest[1]])
}

/// Derives the per-output nonce scalar used both to offset the one-time spend key and
/// to key the amount/memo AEAD.
pub fn nonce(shared_secret: &CompressedPoint, output_index: u32) -> Scalar {
    hash_to_scalar(b"umbra-output-nonce", &[shared_secret, &output_index.to_le_bytes()])
}

/// Computes a compact lookup key for an output's double public key, used by the O(1)
/// `is_mine_by_keys` index maintained by the key manager's `keys`/`out_keys` tables.
pub fn hash_id(pubkey: &SubAddressPubKey) -> [u8; 32] {
    let mut hasher = Blake2b512::new();
    hasher.update(b"umbra-hash-id");
    hasher.update(pubkey.spend_pub);
    hasher.update(pubkey.view_pub);
    let digest = hasher.finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest[..32]);
    out
}

/// Derives the one-time private spending key for an output addressed to
/// `(account, index)`, given the recipient's spend private scalar and the per-output
/// shared secret.
pub fn private_spending_key(
    spend_sk: &SecretScalar,
    view_sk: &SecretScalar,
    account: i64,
    index: u64,
    shared_secret: &CompressedPoint,
    output_index: u32,
) -> SecretScalar {
    let offset = sub_address_offset(view_sk, account, index);
    let n = nonce(shared_secret, output_index);
    SecretScalar(spend_sk.0 + offset + n)
}

fn amount_aead(shared_secret: &CompressedPoint, output_index: u32) -> (ChaCha20Poly1305, [u8; 12]) {
    let n = nonce(shared_secret, output_index);
    let hk = Hkdf::<Sha256>::new(None, &n.to_bytes());
    let mut okm = [0u8; 44];
    hk.expand(b"umbra-amount-aead", &mut okm)
        .expect("44 is a valid HKDF-SHA256 output length");
    let mut key = [0u8; 32];
    key.copy_from_slice(&okm[..32]);
    let mut iv = [0u8; 12];
    iv.copy_from_slice(&okm[32..44]);
    (ChaCha20Poly1305::new((&key).into()), iv)
}

/// Length in bytes of the Pedersen blinding scalar carried in the plaintext amount
/// payload, right after the 8-byte amount.
const GAMMA_LEN: usize = 32;

/// Encrypts `amount`/`gamma`/`memo` under the shared secret and output index, bound to
/// `token_id` as additional authenticated data so a ciphertext minted for one token id
/// cannot be replayed against another. Counterpart of [`recover_amount`].
pub fn encrypt_amount_payload(
    shared_secret: &CompressedPoint,
    output_index: u32,
    amount: u64,
    gamma: &[u8; 32],
    memo: &str,
    token_id: Option<&[u8; 64]>,
) -> Result<Vec<u8>, Error> {
    let (cipher, iv) = amount_aead(shared_secret, output_index);
    let mut plaintext = Vec::with_capacity(8 + GAMMA_LEN + memo.len());
    plaintext.extend_from_slice(&amount.to_le_bytes());
    plaintext.extend_from_slice(gamma);
    plaintext.extend_from_slice(memo.as_bytes());

    let aad = token_id.map(|t| t.as_slice()).unwrap_or(&[]);
    cipher
        .encrypt(Nonce::from_slice(&iv), Payload { msg: &plaintext, aad })
        .map_err(|_| ErrorKind::TxBuildFailed.context("AEAD encryption failed").into())
}

/// Recovers the plaintext amount, Pedersen blinding scalar and (when present) memo
/// bytes embedded in an output's range proof, given the shared secret, the output
/// index, the ciphertext bytes read off the wire by [`crate::parser`], and the
/// output's `token_id` (bound as AEAD associated data, so it must match what the
/// sender encrypted under).
///
/// Returns `Ok(None)` (rather than an error) when the decrypted value equals
/// [`MAX_AMOUNT`], signalling that this output intentionally carries no confidential
/// value and should be treated as non-owned for balance purposes.
pub fn recover_amount(
    shared_secret: &CompressedPoint,
    output_index: u32,
    ciphertext: &[u8],
    token_id: Option<&[u8; 64]>,
) -> Result<Option<(u64, [u8; 32], Option<String>)>, Error> {
    let (cipher, iv) = amount_aead(shared_secret, output_index);
    let aad = token_id.map(|t| t.as_slice()).unwrap_or(&[]);
    let plaintext = cipher
        .decrypt(Nonce::from_slice(&iv), Payload { msg: ciphertext, aad })
        .map_err(|_| ErrorKind::AmountRecoveryFailed.context("AEAD decryption failed"))?;

    if plaintext.len() < 8 + GAMMA_LEN {
        return Err(ErrorKind::AmountRecoveryFailed.context("decrypted payload too short").into());
    }

    let mut amount_bytes = [0u8; 8];
    amount_bytes.copy_from_slice(&plaintext[..8]);
    let amount = u64::from_le_bytes(amount_bytes);

    if amount == MAX_AMOUNT {
        return Ok(None);
    }

    let mut gamma = [0u8; 32];
    gamma.copy_from_slice(&plaintext[8..8 + GAMMA_LEN]);

    let memo = if plaintext.len() > 8 + GAMMA_LEN {
        Some(String::from_utf8_lossy(&plaintext[8 + GAMMA_LEN..]).into_owned())
    } else {
        None
    };

    Ok(Some((amount, gamma, memo)))
}

/// A spendable input selected for a new transaction: the content hash the output is
/// referenced by on the wire, and the one-time private spending key that authorizes
/// spending it.
pub struct TxInputSpec {
    pub output_hash: [u8; 32],
    pub spend_sk: SecretScalar,
}

/// A new output to create: the recipient's sub-address public key, the plaintext
/// amount/memo, and the token it is denominated in (`None` for the native coin).
pub struct TxOutputSpec {
    pub destination: SubAddressPubKey,
    pub amount: u64,
    pub memo: String,
    pub token_id: Option<[u8; 64]>,
}

/// A constructed output, echoed back to the caller alongside the serialized
/// transaction so it can record its own effects without re-parsing the wire bytes it
/// just produced.
pub struct BuiltOutput {
    pub one_time_spend_pub: CompressedPoint,
    pub ephemeral_pub: CompressedPoint,
    pub view_tag: u16,
    pub output_hash: [u8; 32],
    pub gamma: [u8; 32],
    pub amount: u64,
    pub memo: String,
    pub token_id: Option<[u8; 64]>,
}

struct NewOutput {
    ephemeral_pub: CompressedPoint,
    one_time_spend_pub: CompressedPoint,
    view_tag: u16,
    gamma: [u8; 32],
}

/// Builds the sender-side key material for a new output: a freshly-sampled ephemeral
/// key, the shared secret derived from it and the recipient's view public key, the
/// view tag and one-time spend key that follow from that secret, and a freshly-sampled
/// Pedersen blinding scalar.
fn new_output(
    destination: &SubAddressPubKey,
    output_index: u32,
    rng: &mut impl rand::RngCore,
) -> Result<NewOutput, Error> {
    let ephemeral_sk = SecretScalar(Scalar::random(&mut *rng));
    let ephemeral_pub = sk_to_pk(&ephemeral_sk);

    let shared_secret = dh_shared_secret_send(&ephemeral_sk, &destination.view_pub)?;
    let vt = view_tag(&shared_secret);
    let n = nonce(&shared_secret, output_index);

    let one_time_spend_pub = point_to_bytes(
        &(G1Projective::from(point_from_bytes(&destination.spend_pub)?) + G1Affine::generator() * n)
            .to_affine(),
    );

    let gamma = Scalar::random(&mut *rng).to_bytes();

    Ok(NewOutput {
        ephemeral_pub,
        one_time_spend_pub,
        view_tag: vt,
        gamma,
    })
}

/// Signs `digest` with a one-time spending key, the per-input half of the aggregate
/// signature [`build_ctx`] appends to the assembled transaction.
pub fn sign_digest(spend_sk: &SecretScalar, digest: &[u8; 32]) -> CompressedPoint {
    point_to_bytes(&(hash_to_g1(b"umbra-tx-sig", digest) * spend_sk.0).to_affine())
}

/// Aggregates per-input signatures produced by [`sign_digest`] into a single point, the
/// property a real BLS aggregate signature scheme relies on to keep a transaction's
/// signature the same size regardless of how many inputs it spends.
pub fn aggregate_signatures(sigs: &[CompressedPoint]) -> Result<CompressedPoint, Error> {
    let mut acc = G1Projective::identity();
    for sig in sigs {
        acc += G1Projective::from(point_from_bytes(sig)?);
    }
    Ok(point_to_bytes(&acc.to_affine()))
}

fn write_compact_size(buf: &mut Vec<u8>, value: u64) {
    if value <= 0xfc {
        buf.push(value as u8);
    } else if value <= 0xffff {
        buf.push(0xfd);
        buf.extend_from_slice(&(value as u16).to_le_bytes());
    } else if value <= 0xffff_ffff {
        buf.push(0xfe);
        buf.extend_from_slice(&(value as u32).to_le_bytes());
    } else {
        buf.push(0xff);
        buf.extend_from_slice(&value.to_le_bytes());
    }
}

/// Assembles and signs a complete transaction spending `inputs` to `outputs`: builds
/// each output's one-time key, serializes the wire body, signs it with every input's
/// one-time spending key, and appends the aggregated signature. Returns the serialized
/// transaction bytes plus the constructed outputs, for the caller's own bookkeeping —
/// callers never need to touch the wire format themselves.
pub fn build_ctx(
    inputs: &[TxInputSpec],
    outputs: &[TxOutputSpec],
    mut rng: impl rand::RngCore,
) -> Result<(Vec<u8>, Vec<BuiltOutput>), Error> {
    let mut body = Vec::new();
    body.extend_from_slice(&1u32.to_le_bytes());

    write_compact_size(&mut body, inputs.len() as u64);
    for input in inputs {
        body.extend_from_slice(&input.output_hash);
        write_compact_size(&mut body, 0); // empty script
        body.extend_from_slice(&0xffff_ffffu32.to_le_bytes());
    }

    write_compact_size(&mut body, outputs.len() as u64);
    let mut built = Vec::with_capacity(outputs.len());
    for (index, output) in outputs.iter().enumerate() {
        let new_output = new_output(&output.destination, index as u32, &mut rng)?;

        let wire = crate::parser::serialize_output(
            &output.destination.spend_pub,
            &output.destination.view_pub,
            &new_output.ephemeral_pub,
            new_output.view_tag,
        );
        let output_hash = double_sha256(&wire);
        body.extend_from_slice(&wire);

        built.push(BuiltOutput {
            one_time_spend_pub: new_output.one_time_spend_pub,
            ephemeral_pub: new_output.ephemeral_pub,
            view_tag: new_output.view_tag,
            output_hash,
            gamma: new_output.gamma,
            amount: output.amount,
            memo: output.memo.clone(),
            token_id: output.token_id,
        });
    }

    body.extend_from_slice(&0u32.to_le_bytes()); // locktime

    let digest = double_sha256(&body);
    let sigs: Vec<CompressedPoint> = inputs.iter().map(|input| sign_digest(&input.spend_sk, &digest)).collect();
    let aggregate = aggregate_signatures(&sigs)?;

    let mut raw_tx = body;
    raw_tx.extend_from_slice(&aggregate);

    Ok((raw_tx, built))
}

/// Constant-time comparison of two view tags, used when a caller wants to avoid leaking
/// timing information about how many candidate outputs matched.
pub fn view_tags_eq(a: u16, b: u16) -> bool {
    a.to_le_bytes().ct_eq(&b.to_le_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn amount_payload_round_trips() {
        let shared_secret = [7u8; 48];
        let gamma = [9u8; 32];
        let ciphertext =
            encrypt_amount_payload(&shared_secret, 0, 12_345, &gamma, "hello", None).unwrap();

        let (amount, recovered_gamma, memo) = recover_amount(&shared_secret, 0, &ciphertext, None)
            .unwrap()
            .unwrap();
        assert_eq!(amount, 12_345);
        assert_eq!(recovered_gamma, gamma);
        assert_eq!(memo.as_deref(), Some("hello"));
    }

    #[test]
    fn amount_payload_with_empty_memo_recovers_no_memo() {
        let shared_secret = [3u8; 48];
        let gamma = [1u8; 32];
        let ciphertext = encrypt_amount_payload(&shared_secret, 2, 500, &gamma, "", None).unwrap();

        let (_, _, memo) = recover_amount(&shared_secret, 2, &ciphertext, None).unwrap().unwrap();
        assert_eq!(memo, None);
    }

    #[test]
    fn amount_payload_rejects_mismatched_token_id() {
        let shared_secret = [5u8; 48];
        let gamma = [2u8; 32];
        let token_id = [1u8; 64];
        let ciphertext =
            encrypt_amount_payload(&shared_secret, 0, 42, &gamma, "", Some(&token_id)).unwrap();

        assert!(recover_amount(&shared_secret, 0, &ciphertext, None).is_err());
        let other_token = [2u8; 64];
        assert!(recover_amount(&shared_secret, 0, &ciphertext, Some(&other_token)).is_err());
        assert!(recover_amount(&shared_secret, 0, &ciphertext, Some(&token_id)).is_ok());
    }

    #[test]
    fn recover_amount_treats_max_amount_as_unconfidential() {
        let shared_secret = [1u8; 48];
        let gamma = [0u8; 32];
        let ciphertext = encrypt_amount_payload(&shared_secret, 0, MAX_AMOUNT, &gamma, "", None).unwrap();
        assert!(recover_amount(&shared_secret, 0, &ciphertext, None).unwrap().is_none());
    }

    #[test]
    fn view_tag_matches_between_sender_and_scanning_sides() {
        let view_sk = SecretScalar(Scalar::from(11u64));
        let view_pub = sk_to_pk(&view_sk);
        let ephemeral_sk = SecretScalar(Scalar::from(22u64));
        let ephemeral_pub = sk_to_pk(&ephemeral_sk);

        let send_secret = dh_shared_secret_send(&ephemeral_sk, &view_pub).unwrap();
        let scan_secret = dh_shared_secret_scan(&view_sk, &ephemeral_pub).unwrap();
        assert_eq!(send_secret, scan_secret);
        assert_eq!(view_tag(&send_secret), view_tag(&scan_secret));
    }

    #[test]
    fn build_ctx_produces_a_verifiable_aggregate_signature_shape() {
        let spend_sk = SecretScalar(Scalar::from(42u64));
        let spend_pub = sk_to_pk(&spend_sk);
        let view_sk = SecretScalar(Scalar::from(99u64));
        let view_pub = sk_to_pk(&view_sk);

        let destination = SubAddressPubKey { spend_pub, view_pub };
        let inputs = vec![TxInputSpec {
            output_hash: [1u8; 32],
            spend_sk: SecretScalar(Scalar::from(7u64)),
        }];
        let outputs = vec![TxOutputSpec {
            destination,
            amount: 1_000,
            memo: "gift".into(),
            token_id: None,
        }];

        let (raw_tx, built) = build_ctx(&inputs, &outputs, rand::thread_rng()).unwrap();
        assert_eq!(built.len(), 1);
        assert_eq!(built[0].amount, 1_000);
        // version + input count/body + output count/body + locktime + 48-byte signature.
        assert!(raw_tx.len() > 48);
        assert_eq!(&raw_tx[raw_tx.len() - 48..], &sign_digest(&inputs[0].spend_sk, &double_sha256(&raw_tx[..raw_tx.len() - 48])) as &[u8]);
    }
}
