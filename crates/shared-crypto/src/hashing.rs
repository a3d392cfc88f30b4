//! # Ledger Hashing
//!
//! The two digests the FLO address and message formats are built on.

use ripemd::Ripemd160;
use sha2::{Digest, Sha256};

/// 32-byte digest.
pub type Hash = [u8; 32];

/// SHA-256 applied twice.
pub fn sha256d(data: &[u8]) -> Hash {
    let first = Sha256::digest(data);
    Sha256::digest(first).into()
}

/// RIPEMD-160 of SHA-256, the address payload of a public key.
pub fn hash160(data: &[u8]) -> [u8; 20] {
    let sha = Sha256::digest(data);
    Ripemd160::digest(sha).into()
}
