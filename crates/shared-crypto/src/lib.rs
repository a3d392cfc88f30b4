//! # Shared Crypto - FLO Address and Message Signing
//!
//! ## Components
//!
//! | Module | Algorithm | Use Case |
//! |--------|-----------|----------|
//! | `hashing` | SHA-256d, HASH160 | Checksums, address payloads |
//! | `address` | Base58Check | FLO addresses and WIF keys |
//! | `message` | secp256k1 compact recoverable | Signed-message format |
//! | `signer` | - | `MessageSigner` / `MessageVerifier` capabilities |
//!
//! ## Security Properties
//!
//! - **secp256k1**: RFC 6979 deterministic nonces, low-S normalization
//! - **Verification by recovery**: the public key is recovered from the
//!   signature and its HASH160 compared with the address payload, so no
//!   key directory is needed

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod address;
pub mod errors;
pub mod hashing;
pub mod message;
pub mod signer;

// Re-exports
pub use address::{AddressKind, FloAddress, FloNetwork};
pub use errors::CryptoError;
pub use hashing::{hash160, sha256d};
pub use message::{recover_message_pubkey, sign_message, signed_message_hash};
pub use signer::{
    FloMessageVerifier, LocalKeySigner, MessageSigner, MessageVerifier, SIGNATURE_TEXT_LEN,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    #[test]
    fn test_version() {
        assert!(!super::VERSION.is_empty());
    }
}
