//! # Fragment Validation
//!
//! Checks run in a fixed order so each rejection names the first problem:
//! wire form, then address, then signature. Reference resolution sits
//! between the last two and cannot fail.

use super::errors::FragmentError;
use super::wire::{strip_fragment_prefix, truncate_reference, FragmentMessage};
use shared_crypto::{FloAddress, MessageVerifier};
use shared_types::{FloMessage, FragmentRecord};

/// A fragment that passed every check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedFragment {
    /// Parsed wire message.
    pub message: FragmentMessage,
    /// Resolved 10-character reference.
    pub reference: String,
}

/// Validate a fragment body (prefix already stripped) carried by `txid`.
pub fn validate_fragment(
    body: &str,
    txid: &str,
    verifier: &dyn MessageVerifier,
) -> Result<ValidatedFragment, FragmentError> {
    let message = FragmentMessage::parse(body)?;

    FloAddress::parse(&message.address)
        .map_err(|e| FragmentError::InvalidAddress(format!("{}: {e}", message.address)))?;

    let reference = if message.part == 0 {
        truncate_reference(txid)
    } else {
        truncate_reference(&message.reference)
    };

    if !verifier.verify(&message.preimage(), &message.address, &message.signature) {
        return Err(FragmentError::BadSignature { part: message.part });
    }

    Ok(ValidatedFragment { message, reference })
}

impl ValidatedFragment {
    /// Pending record for the carrying transaction.
    pub fn into_record(self, carrier: &FloMessage) -> FragmentRecord {
        FragmentRecord {
            reference: self.reference,
            part: self.message.part,
            max: self.message.max,
            chunk: self.message.chunk,
            address: self.message.address,
            signature: self.message.signature,
            txid: carrier.txid.clone(),
            block: carrier.block.clone(),
            time: carrier.time,
            complete: false,
            stale: false,
            assembled: None,
        }
    }
}

/// Parse and validate a transaction's embedded data.
///
/// `None` when the data carries no fragment prefix.
pub fn fragment_from_message(
    message: &FloMessage,
    verifier: &dyn MessageVerifier,
) -> Option<Result<FragmentRecord, FragmentError>> {
    let text = std::str::from_utf8(&message.data).ok()?;
    let body = strip_fragment_prefix(text)?;
    Some(validate_fragment(body, &message.txid, verifier).map(|v| v.into_record(message)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::wire::signing_preimage;
    use shared_crypto::{FloMessageVerifier, FloNetwork, LocalKeySigner, MessageSigner};
    use shared_types::MessageOrigin;

    fn signer() -> LocalKeySigner {
        LocalKeySigner::from_secret_bytes(&[11u8; 32], FloNetwork::Mainnet).unwrap()
    }

    fn signed(part: u32, max: u32, reference: &str, chunk: &str) -> String {
        let signer = signer();
        let preimage = signing_preimage(part, max, signer.address(), reference, chunk);
        let signature = signer.sign(&preimage).unwrap();
        format!("{part},{max},{},{reference},{signature}):{chunk}", signer.address())
    }

    #[test]
    fn test_part_zero_reference_from_own_txid() {
        let txid = "0123456789abcdef".repeat(4);
        let fragment = validate_fragment(&signed(0, 2, "", "A"), &txid, &FloMessageVerifier).unwrap();
        assert_eq!(fragment.reference, "0123456789");
    }

    #[test]
    fn test_later_part_reference_truncated() {
        let reference = "fedcba9876543210".repeat(4);
        let body = signed(1, 2, &reference, "B");
        let fragment = validate_fragment(&body, &"11".repeat(32), &FloMessageVerifier).unwrap();
        assert_eq!(fragment.reference, "fedcba9876");
    }

    #[test]
    fn test_part_zero_signed_over_other_preimage_rejected() {
        let signer = signer();
        // Signed as if the prior reference were a real txid.
        let preimage = format!("0-2-{}-{}-A", signer.address(), "ab".repeat(32));
        assert_ne!(preimage, signing_preimage(0, 2, signer.address(), "", "A"));
        let signature = signer.sign(&preimage).unwrap();
        let body = format!("0,2,{},,{signature}):A", signer.address());

        assert_eq!(
            validate_fragment(&body, &"22".repeat(32), &FloMessageVerifier),
            Err(FragmentError::BadSignature { part: 0 })
        );
    }

    #[test]
    fn test_invalid_address_checked_before_signature() {
        let err = validate_fragment("0,1,notanaddress,,sig):A", "t", &FloMessageVerifier).unwrap_err();
        assert!(matches!(err, FragmentError::InvalidAddress(_)));
    }

    #[test]
    fn test_malformed_checked_first() {
        let err = validate_fragment("0,0,notanaddress,,sig):A", "t", &FloMessageVerifier).unwrap_err();
        assert!(matches!(err, FragmentError::MalformedFragment(_)));
    }

    #[test]
    fn test_fragment_from_message() {
        let carrier = FloMessage {
            txid: "ab".repeat(32),
            block: None,
            time: 42,
            data: format!("oip-mp({}", signed(0, 1, "", "z")).into_bytes(),
            origin: MessageOrigin::Transaction,
        };
        let record = fragment_from_message(&carrier, &FloMessageVerifier).unwrap().unwrap();
        assert_eq!(record.reference, "ababababab");
        assert_eq!(record.time, 42);
        assert!(!record.complete);

        let plain = FloMessage {
            data: b"text:hello".to_vec(),
            ..carrier
        };
        assert!(fragment_from_message(&plain, &FloMessageVerifier).is_none());
    }
}
