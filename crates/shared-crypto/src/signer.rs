//! # Signing Capabilities
//!
//! The multipart protocol treats signing and verification as opaque
//! capabilities. Signatures travel as base64 text of the 65-byte compact
//! format, which is always [`SIGNATURE_TEXT_LEN`] characters.

use crate::address::{wif_to_secret_key, FloAddress, FloNetwork};
use crate::hashing::hash160;
use crate::message::{recover_message_pubkey, sign_message};
use crate::CryptoError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use k256::ecdsa::SigningKey;

/// Base64 length of a 65-byte compact signature.
pub const SIGNATURE_TEXT_LEN: usize = 88;

/// Produces signatures for one controlled address.
pub trait MessageSigner: Send + Sync {
    /// Address the signatures verify against.
    fn address(&self) -> &str;

    /// Exact length of every signature this signer produces.
    fn signature_len(&self) -> usize {
        SIGNATURE_TEXT_LEN
    }

    /// Sign a text preimage.
    fn sign(&self, preimage: &str) -> Result<String, CryptoError>;
}

/// Checks signatures against addresses.
pub trait MessageVerifier: Send + Sync {
    /// Whether `signature` over `preimage` was produced by `address`'s key.
    fn verify(&self, preimage: &str, address: &str, signature: &str) -> bool;
}

/// Signer backed by an in-process secp256k1 key.
pub struct LocalKeySigner {
    key: SigningKey,
    compressed: bool,
    address: String,
}

impl LocalKeySigner {
    /// Load the key from a WIF string.
    pub fn from_wif(wif: &str) -> Result<Self, CryptoError> {
        let (network, secret, compressed) = wif_to_secret_key(wif)?;
        Self::from_secret(&secret, network, compressed)
    }

    /// Build from a raw 32-byte secret; the address uses the compressed key.
    pub fn from_secret_bytes(secret: &[u8; 32], network: FloNetwork) -> Result<Self, CryptoError> {
        Self::from_secret(secret, network, true)
    }

    fn from_secret(
        secret: &[u8; 32],
        network: FloNetwork,
        compressed: bool,
    ) -> Result<Self, CryptoError> {
        let key = SigningKey::from_bytes(secret.into()).map_err(|_| CryptoError::InvalidPrivateKey)?;
        let pubkey = key.verifying_key().to_encoded_point(compressed);
        let address = FloAddress::from_pubkey_hash(network, hash160(pubkey.as_bytes())).to_string();
        Ok(Self {
            key,
            compressed,
            address,
        })
    }
}

impl MessageSigner for LocalKeySigner {
    fn address(&self) -> &str {
        &self.address
    }

    fn sign(&self, preimage: &str) -> Result<String, CryptoError> {
        let raw = sign_message(&self.key, self.compressed, preimage.as_bytes())?;
        Ok(STANDARD.encode(raw))
    }
}

/// Verifies signed messages by public-key recovery.
#[derive(Debug, Clone, Copy, Default)]
pub struct FloMessageVerifier;

impl FloMessageVerifier {
    /// Verify, reporting why a signature was rejected.
    pub fn check(&self, preimage: &str, address: &str, signature: &str) -> Result<bool, CryptoError> {
        let address = FloAddress::parse(address)?;
        let raw = STANDARD
            .decode(signature)
            .map_err(|_| CryptoError::InvalidSignatureFormat)?;
        let pubkey = recover_message_pubkey(&raw, preimage.as_bytes())?;
        Ok(hash160(&pubkey) == address.hash)
    }
}

impl MessageVerifier for FloMessageVerifier {
    fn verify(&self, preimage: &str, address: &str, signature: &str) -> bool {
        self.check(preimage, address, signature).unwrap_or(false)
    }
}
