//! Crypto error types.

use thiserror::Error;

/// Cryptographic operation errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// Base58 string contained a character outside the alphabet.
    #[error("Invalid base58 character")]
    InvalidCharacter,

    /// Decoded payload had the wrong length.
    #[error("Invalid payload length: {0}")]
    InvalidLength(usize),

    /// Base58Check checksum did not match.
    #[error("Invalid checksum")]
    InvalidChecksum,

    /// Version byte is not a known FLO prefix.
    #[error("Unknown version byte: 0x{0:02x}")]
    UnknownVersion(u8),

    /// Invalid private key
    #[error("Invalid private key")]
    InvalidPrivateKey,

    /// Invalid signature format
    #[error("Invalid signature format")]
    InvalidSignatureFormat,

    /// Signing failed.
    #[error("Signing failed: {0}")]
    SigningFailed(String),

    /// Public key recovery failed.
    #[error("Public key recovery failed")]
    RecoveryFailed,

    /// Signer does not hold the key for the requested address.
    #[error("No key for address {0}")]
    UnknownSigner(String),
}
