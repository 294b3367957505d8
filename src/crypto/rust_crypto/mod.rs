//! RustCrypto cryptographic provider implementation for tlsock.
//!
//! This module provides a pure Rust cryptographic backend using crates from
//! the [RustCrypto](https://github.com/RustCrypto) organization. It is the
//! provider [`Config::builder()`](crate::Config::builder) falls back to when
//! none is set explicitly or installed as process default.
//!
//! ```
//! use std::sync::Arc;
//! use tlsock::Config;
//! use tlsock::crypto::rust_crypto;
//!
//! let config = Arc::new(
//!     Config::builder()
//!         .with_crypto_provider(rust_crypto::default_provider())
//!         .build()
//!         .unwrap()
//! );
//! # let _ = config;
//! ```

mod cipher_suite;
mod hash;
mod hkdf;
mod hmac;
mod kx_group;
mod random;
mod sign;

use crate::crypto::provider::CryptoProvider;

/// Get the default RustCrypto-based crypto provider.
///
/// # Supported Cipher Suites
///
/// - `TLS_AES_128_GCM_SHA256` (0x1301)
/// - `TLS_AES_256_GCM_SHA384` (0x1302)
///
/// # Supported Key Exchange Groups
///
/// - `x25519`
/// - `secp256r1` (P-256)
/// - `secp384r1` (P-384)
///
/// # Signatures
///
/// Handshake signatures are ECDSA with P-256/SHA-256 or P-384/SHA-384.
/// Certificate chain signatures may additionally be RSA PKCS#1 v1.5.
///
/// # Key Formats
///
/// PKCS#8 DER, SEC1 DER and PEM encoded versions of both.
pub fn default_provider() -> CryptoProvider {
    CryptoProvider {
        cipher_suites: cipher_suite::ALL_CIPHER_SUITES,
        kx_groups: kx_group::ALL_KX_GROUPS,
        signature_verification: &sign::SIGNATURE_VERIFIER,
        key_provider: &sign::KEY_PROVIDER,
        secure_random: &random::SECURE_RANDOM,
        hash_provider: &hash::HASH_PROVIDER,
        hmac_provider: &hmac::HMAC_PROVIDER,
        hkdf_provider: &hkdf::HKDF_PROVIDER,
    }
}
