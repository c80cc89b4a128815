//! Ed25519 key handling.

use ed25519_dalek::{Signer, SigningKey, VerifyingKey};
use thiserror::Error;
use zeroize::Zeroizing;

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("seed is not valid hex")]
    InvalidHex,

    #[error("seed must be 32 bytes, got {0}")]
    InvalidLength(usize),
}

/// An Ed25519 key pair. The secret half is zeroized on drop by
/// `ed25519-dalek`.
pub struct Keypair {
    signing: SigningKey,
}

impl Keypair {
    pub fn public_bytes(&self) -> [u8; 32] {
        self.signing.verifying_key().to_bytes()
    }

    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.signing.sign(message).to_bytes()
    }
}

/// Derive a key pair from a 32-byte seed (deterministic).
pub fn keypair_from_seed(seed: &[u8; 32]) -> Keypair {
    Keypair {
        signing: SigningKey::from_bytes(seed),
    }
}

/// Derive a key pair from a hex-encoded 32-byte seed.
///
/// The decoded seed buffer is wiped before returning.
pub fn keypair_from_hex_seed(hex_seed: &str) -> Result<Keypair, KeyError> {
    let bytes = Zeroizing::new(hex::decode(hex_seed.trim()).map_err(|_| KeyError::InvalidHex)?);
    let seed: Zeroizing<[u8; 32]> = Zeroizing::new(
        bytes
            .as_slice()
            .try_into()
            .map_err(|_| KeyError::InvalidLength(bytes.len()))?,
    );
    Ok(keypair_from_seed(&seed))
}

/// Verify a signature against a message and public key.
///
/// Returns `false` for malformed keys as well as bad signatures.
pub fn verify_signature(message: &[u8], signature: &[u8; 64], public_key: &[u8; 32]) -> bool {
    let Ok(verifying_key) = VerifyingKey::from_bytes(public_key) else {
        return false;
    };
    let sig = ed25519_dalek::Signature::from_bytes(signature);
    verifying_key.verify_strict(message, &sig).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_derivation_is_deterministic() {
        let a = keypair_from_seed(&[7u8; 32]);
        let b = keypair_from_seed(&[7u8; 32]);
        assert_eq!(a.public_bytes(), b.public_bytes());
        assert_eq!(a.sign(b"msg"), b.sign(b"msg"));
    }

    #[test]
    fn hex_seed_matches_raw_seed() {
        let hex_seed = "07".repeat(32);
        let from_hex = keypair_from_hex_seed(&hex_seed).unwrap();
        assert_eq!(from_hex.public_bytes(), keypair_from_seed(&[7u8; 32]).public_bytes());
    }

    #[test]
    fn bad_hex_seeds_are_rejected() {
        assert!(matches!(keypair_from_hex_seed("zz"), Err(KeyError::InvalidHex)));
        assert!(matches!(
            keypair_from_hex_seed("0011"),
            Err(KeyError::InvalidLength(2))
        ));
    }

    #[test]
    fn sign_and_verify() {
        let kp = keypair_from_seed(&[1u8; 32]);
        let sig = kp.sign(b"payload");
        assert!(verify_signature(b"payload", &sig, &kp.public_bytes()));
        assert!(!verify_signature(b"other", &sig, &kp.public_bytes()));
        assert!(!verify_signature(b"payload", &sig, &keypair_from_seed(&[2u8; 32]).public_bytes()));
    }
}
