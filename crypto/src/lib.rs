//! Cryptographic primitives for the round-keeper.
//!
//! - **Ed25519** keys derived from 32-byte seeds
//! - A self-describing signed envelope and the [`KeypairSigner`] that
//!   produces it for each delivery attempt

pub mod envelope;
pub mod keys;
pub mod signer;

pub use envelope::{open_envelope, Envelope, EnvelopeError};
pub use keys::{keypair_from_hex_seed, keypair_from_seed, verify_signature, KeyError, Keypair};
pub use signer::KeypairSigner;
