//! Cryptographic primitives and helpers used by the TLS engine.

pub(crate) mod key_schedule;
pub mod provider;
pub mod rust_crypto;

// Re-export all provider traits so backends can be written against
// `tlsock::crypto::*` alone.
pub use provider::{
    ActiveKeyExchange, Cipher, CryptoProvider, CryptoSafe, HashContext, HashProvider,
};
pub use provider::{HkdfProvider, HmacProvider, KeyProvider};
pub use provider::{SecureRandom, SignatureVerifier, SigningKey};
pub use provider::{SupportedCipherSuite, SupportedKxGroup};

// Shared types appearing in provider trait signatures.
pub use crate::buffer::Buf;
pub use crate::types::{CipherSuite, HashAlgorithm, NamedGroup, SignatureAlgorithm, SignatureScheme};
