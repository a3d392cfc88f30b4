//! # FLO Addresses
//!
//! Base58Check decoding/encoding of pay-to-pubkey-hash and pay-to-script-hash
//! addresses, and of WIF-encoded private keys.

use crate::hashing::sha256d;
use crate::CryptoError;
use std::fmt;
use std::str::FromStr;
use zeroize::Zeroizing;

const ALPHABET: &[u8; 58] = b"123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

/// FLO network an address or key belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FloNetwork {
    /// Production network (`F...` addresses).
    Mainnet,
    /// Test network (`o...` addresses).
    Testnet,
}

impl FloNetwork {
    /// Version byte of pay-to-pubkey-hash addresses.
    pub fn pubkey_version(self) -> u8 {
        match self {
            Self::Mainnet => 0x23,
            Self::Testnet => 0x73,
        }
    }

    /// Version byte of pay-to-script-hash addresses.
    pub fn script_version(self) -> u8 {
        match self {
            Self::Mainnet => 0x5e,
            Self::Testnet => 0xc6,
        }
    }

    /// Version byte of WIF private keys.
    pub fn wif_version(self) -> u8 {
        match self {
            Self::Mainnet => 0xa3,
            Self::Testnet => 0xef,
        }
    }
}

/// What an address pays to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressKind {
    /// Pay to public key hash.
    PubKeyHash,
    /// Pay to script hash.
    ScriptHash,
}

/// A decoded FLO address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FloAddress {
    /// Network the address belongs to.
    pub network: FloNetwork,
    /// Address kind.
    pub kind: AddressKind,
    /// HASH160 payload.
    pub hash: [u8; 20],
}

impl FloAddress {
    /// Address paying to the given public key hash.
    pub fn from_pubkey_hash(network: FloNetwork, hash: [u8; 20]) -> Self {
        Self {
            network,
            kind: AddressKind::PubKeyHash,
            hash,
        }
    }

    /// Decode and validate a base58check address string.
    pub fn parse(address: &str) -> Result<Self, CryptoError> {
        let payload = base58check_decode(address)?;
        if payload.len() != 21 {
            return Err(CryptoError::InvalidLength(payload.len()));
        }
        let (network, kind) = match payload[0] {
            0x23 => (FloNetwork::Mainnet, AddressKind::PubKeyHash),
            0x5e => (FloNetwork::Mainnet, AddressKind::ScriptHash),
            0x73 => (FloNetwork::Testnet, AddressKind::PubKeyHash),
            0xc6 => (FloNetwork::Testnet, AddressKind::ScriptHash),
            other => return Err(CryptoError::UnknownVersion(other)),
        };
        let mut hash = [0u8; 20];
        hash.copy_from_slice(&payload[1..]);
        Ok(Self {
            network,
            kind,
            hash,
        })
    }

    fn version(&self) -> u8 {
        match self.kind {
            AddressKind::PubKeyHash => self.network.pubkey_version(),
            AddressKind::ScriptHash => self.network.script_version(),
        }
    }
}

impl fmt::Display for FloAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut payload = Vec::with_capacity(21);
        payload.push(self.version());
        payload.extend_from_slice(&self.hash);
        f.write_str(&base58check_encode(&payload))
    }
}

impl FromStr for FloAddress {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Decode a WIF private key.
///
/// Returns the network, the secret scalar, and whether the key signs for the
/// compressed public key.
pub fn wif_to_secret_key(
    wif: &str,
) -> Result<(FloNetwork, Zeroizing<[u8; 32]>, bool), CryptoError> {
    let payload = Zeroizing::new(base58check_decode(wif)?);
    let network = match payload.first() {
        Some(0xa3) => FloNetwork::Mainnet,
        Some(0xef) => FloNetwork::Testnet,
        Some(other) => return Err(CryptoError::UnknownVersion(*other)),
        None => return Err(CryptoError::InvalidLength(0)),
    };
    let compressed = match payload.len() {
        33 => false,
        34 if payload[33] == 0x01 => true,
        other => return Err(CryptoError::InvalidLength(other)),
    };
    let mut secret = Zeroizing::new([0u8; 32]);
    secret.copy_from_slice(&payload[1..33]);
    Ok((network, secret, compressed))
}

/// Encode a private key as WIF.
pub fn secret_key_to_wif(secret: &[u8; 32], network: FloNetwork, compressed: bool) -> String {
    let mut payload = Zeroizing::new(Vec::with_capacity(34));
    payload.push(network.wif_version());
    payload.extend_from_slice(secret);
    if compressed {
        payload.push(0x01);
    }
    base58check_encode(&payload)
}

/// Decode base58 and verify the trailing 4-byte double-SHA256 checksum.
pub fn base58check_decode(input: &str) -> Result<Vec<u8>, CryptoError> {
    let bytes = base58_decode(input)?;
    if bytes.len() < 4 {
        return Err(CryptoError::InvalidLength(bytes.len()));
    }
    let (payload, checksum) = bytes.split_at(bytes.len() - 4);
    if checksum != &sha256d(payload)[..4] {
        return Err(CryptoError::InvalidChecksum);
    }
    Ok(payload.to_vec())
}

/// Append a 4-byte double-SHA256 checksum and encode as base58.
pub fn base58check_encode(payload: &[u8]) -> String {
    let mut data = Vec::with_capacity(payload.len() + 4);
    data.extend_from_slice(payload);
    data.extend_from_slice(&sha256d(payload)[..4]);
    base58_encode(&data)
}

fn base58_decode(input: &str) -> Result<Vec<u8>, CryptoError> {
    if input.is_empty() {
        return Err(CryptoError::InvalidLength(0));
    }
    let mut bytes: Vec<u8> = Vec::new();
    for ch in input.bytes() {
        let mut carry = base58_value(ch).ok_or(CryptoError::InvalidCharacter)? as u32;
        for byte in bytes.iter_mut().rev() {
            let val = (*byte as u32) * 58 + carry;
            *byte = (val & 0xff) as u8;
            carry = val >> 8;
        }
        while carry > 0 {
            bytes.insert(0, (carry & 0xff) as u8);
            carry >>= 8;
        }
    }

    let leading_zeros = input.bytes().take_while(|b| *b == b'1').count();
    let mut out = vec![0u8; leading_zeros];
    out.extend_from_slice(&bytes);
    Ok(out)
}

fn base58_encode(data: &[u8]) -> String {
    if data.is_empty() {
        return String::new();
    }
    let mut digits = vec![0u8];
    for byte in data {
        let mut carry = *byte as u32;
        for digit in digits.iter_mut().rev() {
            let value = (*digit as u32) * 256 + carry;
            *digit = (value % 58) as u8;
            carry = value / 58;
        }
        while carry > 0 {
            digits.insert(0, (carry % 58) as u8);
            carry /= 58;
        }
    }
    let leading_zeros = data.iter().take_while(|b| **b == 0).count();
    let mut out = String::with_capacity(leading_zeros + digits.len());
    for _ in 0..leading_zeros {
        out.push('1');
    }
    // An all-zero input leaves only the seed digit, already covered by the '1's.
    if digits != [0] {
        for digit in digits {
            out.push(ALPHABET[digit as usize] as char);
        }
    }
    out
}

fn base58_value(byte: u8) -> Option<u8> {
    ALPHABET
        .iter()
        .position(|value| *value == byte)
        .map(|pos| pos as u8)
}
