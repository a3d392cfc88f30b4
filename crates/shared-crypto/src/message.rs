//! Bitcoin-style signed messages with the FLO magic prefix.
//!
//! Signatures are 65-byte compact recoverable signatures: a header byte
//! `27 + recovery_id (+4 if the key is compressed)` followed by `r || s`.

use crate::hashing::{sha256d, Hash};
use crate::CryptoError;
use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};

/// Prefix hashed in front of every signed message.
pub const SIGNED_MESSAGE_MAGIC: &str = "Florincoin Signed Message:\n";

/// Length of a compact recoverable signature.
pub const COMPACT_SIGNATURE_LEN: usize = 65;

/// Digest signed for `message`: `sha256d(varstr(magic) || varstr(message))`.
pub fn signed_message_hash(message: &[u8]) -> Hash {
    let mut buf = Vec::with_capacity(SIGNED_MESSAGE_MAGIC.len() + message.len() + 10);
    write_var_bytes(&mut buf, SIGNED_MESSAGE_MAGIC.as_bytes());
    write_var_bytes(&mut buf, message);
    sha256d(&buf)
}

/// Sign `message` and return the compact recoverable signature.
pub fn sign_message(
    key: &SigningKey,
    compressed: bool,
    message: &[u8],
) -> Result<[u8; COMPACT_SIGNATURE_LEN], CryptoError> {
    let digest = signed_message_hash(message);
    let (signature, recovery_id) = key
        .sign_prehash_recoverable(&digest)
        .map_err(|e| CryptoError::SigningFailed(e.to_string()))?;

    let mut out = [0u8; COMPACT_SIGNATURE_LEN];
    out[0] = 27 + recovery_id.to_byte() + if compressed { 4 } else { 0 };
    out[1..].copy_from_slice(&signature.to_bytes());
    Ok(out)
}

/// Recover the serialized public key that produced `signature` over `message`.
///
/// The key is serialized compressed or uncompressed according to the
/// signature header, matching what the signer's address was derived from.
pub fn recover_message_pubkey(signature: &[u8], message: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if signature.len() != COMPACT_SIGNATURE_LEN {
        return Err(CryptoError::InvalidSignatureFormat);
    }
    let header = signature[0];
    if !(27..=34).contains(&header) {
        return Err(CryptoError::InvalidSignatureFormat);
    }
    let compressed = header >= 31;
    let recovery = if compressed { header - 31 } else { header - 27 };
    let recovery_id = RecoveryId::from_byte(recovery).ok_or(CryptoError::InvalidSignatureFormat)?;
    let signature =
        Signature::from_slice(&signature[1..]).map_err(|_| CryptoError::InvalidSignatureFormat)?;

    let digest = signed_message_hash(message);
    let key = VerifyingKey::recover_from_prehash(&digest, &signature, recovery_id)
        .map_err(|_| CryptoError::RecoveryFailed)?;
    Ok(key.to_encoded_point(compressed).as_bytes().to_vec())
}

fn write_var_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    write_compact_size(buf, bytes.len() as u64);
    buf.extend_from_slice(bytes);
}

fn write_compact_size(buf: &mut Vec<u8>, n: u64) {
    match n {
        0..=0xfc => buf.push(n as u8),
        0xfd..=0xffff => {
            buf.push(0xfd);
            buf.extend_from_slice(&(n as u16).to_le_bytes());
        }
        0x1_0000..=0xffff_ffff => {
            buf.push(0xfe);
            buf.extend_from_slice(&(n as u32).to_le_bytes());
        }
        _ => {
            buf.push(0xff);
            buf.extend_from_slice(&n.to_le_bytes());
        }
    }
}
