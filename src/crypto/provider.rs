//! Cryptographic provider traits for pluggable crypto backends.
//!
//! The [`CryptoProvider`] struct holds static references to trait objects,
//! each representing one cryptographic capability the TLS engine needs:
//!
//! - **Cipher Suites** ([`SupportedCipherSuite`]): Factory for AEAD ciphers
//! - **Key Exchange Groups** ([`SupportedKxGroup`]): Factory for ECDHE key exchanges
//! - **Signature Verification** ([`SignatureVerifier`]): Verify handshake and certificate signatures
//! - **Key Provider** ([`KeyProvider`]): Parse and load private keys
//! - **Secure Random** ([`SecureRandom`]): Cryptographically secure RNG
//! - **Hash Provider** ([`HashProvider`]): Transcript hashing
//! - **HKDF Provider** ([`HkdfProvider`]): TLS 1.3 key derivation
//! - **HMAC Provider** ([`HmacProvider`]): Finished verify data
//!
//! The default implementation lives in [`rust_crypto`](crate::crypto::rust_crypto).
//!
//! # Thread Safety
//!
//! All provider traits require `Send + Sync + UnwindSafe + RefUnwindSafe` so a
//! provider can be shared between sessions on different threads.

use std::fmt::Debug;
use std::panic::{RefUnwindSafe, UnwindSafe};

use once_cell::sync::OnceCell;

use crate::buffer::Buf;
use crate::types::{CipherSuite, HashAlgorithm, NamedGroup, SignatureAlgorithm, SignatureScheme};

/// Marker trait for types that are safe to use in crypto provider components.
pub trait CryptoSafe: Send + Sync + Debug + UnwindSafe + RefUnwindSafe {}

impl<T: Send + Sync + Debug + UnwindSafe + RefUnwindSafe> CryptoSafe for T {}

// ============================================================================
// Instance Traits (created by factories)
// ============================================================================

/// AEAD cipher for in-place encryption/decryption.
pub trait Cipher: CryptoSafe {
    /// Encrypt plaintext in-place, appending authentication tag.
    fn encrypt(&mut self, plaintext: &mut Buf, aad: &[u8], nonce: &[u8; 12])
        -> Result<(), String>;

    /// Decrypt ciphertext in-place, verifying and removing authentication tag.
    fn decrypt(&mut self, ciphertext: &mut Buf, aad: &[u8], nonce: &[u8; 12])
        -> Result<(), String>;
}

/// Stateful hash context for incremental hashing.
pub trait HashContext: CryptoSafe {
    /// Update the hash with new data.
    fn update(&mut self, data: &[u8]);

    /// Clone the context and finalize it, writing the hash to `out`.
    /// The original context can continue to be updated.
    fn clone_and_finalize(&self, out: &mut Buf);
}

/// Signing key for handshake signatures.
pub trait SigningKey: CryptoSafe {
    /// Sign data (the key hashes it with [`SigningKey::scheme`]'s hash).
    fn sign(&self, data: &[u8], out: &mut Buf) -> Result<(), String>;

    /// The TLS 1.3 signature scheme this key produces.
    fn scheme(&self) -> SignatureScheme;

    /// Uncompressed SEC1 encoding of the public key.
    fn public_key(&self) -> Vec<u8>;
}

/// Active key exchange instance (ephemeral keypair for one handshake).
pub trait ActiveKeyExchange: CryptoSafe {
    /// Get the public key for this exchange.
    fn pub_key(&self) -> &[u8];

    /// Complete exchange with peer's public key, returning shared secret.
    fn complete(self: Box<Self>, peer_pub: &[u8], out: &mut Buf) -> Result<(), String>;

    /// Get the named group for this exchange.
    fn group(&self) -> NamedGroup;
}

// ============================================================================
// Factory Traits (used by CryptoProvider)
// ============================================================================

/// TLS 1.3 cipher suite support (factory for Cipher instances).
pub trait SupportedCipherSuite: CryptoSafe {
    /// The cipher suite this supports.
    fn suite(&self) -> CipherSuite;

    /// Hash algorithm used by this suite.
    fn hash_algorithm(&self) -> HashAlgorithm;

    /// AEAD key length in bytes.
    fn key_len(&self) -> usize;

    /// AEAD nonce/IV length in bytes.
    fn iv_len(&self) -> usize {
        12
    }

    /// AEAD tag length in bytes.
    fn tag_len(&self) -> usize {
        16
    }

    /// Create a cipher instance with the given key.
    fn create_cipher(&self, key: &[u8]) -> Result<Box<dyn Cipher>, String>;
}

/// Key exchange group support (factory for ActiveKeyExchange).
pub trait SupportedKxGroup: CryptoSafe {
    /// Named group for this key exchange group.
    fn name(&self) -> NamedGroup;

    /// Start a new key exchange, generating ephemeral keypair.
    fn start_exchange(&self) -> Result<Box<dyn ActiveKeyExchange>, String>;
}

/// Signature verification against a subject public key.
pub trait SignatureVerifier: CryptoSafe {
    /// Verify `signature` over `data` using a DER-encoded SubjectPublicKeyInfo.
    fn verify_signature(
        &self,
        spki_der: &[u8],
        data: &[u8],
        signature: &[u8],
        hash_alg: HashAlgorithm,
        sig_alg: SignatureAlgorithm,
    ) -> Result<(), String>;
}

/// Private key parser (factory for SigningKey).
pub trait KeyProvider: CryptoSafe {
    /// Parse and load a private key from unencrypted DER/PEM bytes.
    fn load_private_key(&self, key_der: &[u8]) -> Result<Box<dyn SigningKey>, String>;
}

/// Secure random number generator.
pub trait SecureRandom: CryptoSafe {
    /// Fill buffer with cryptographically secure random bytes.
    fn fill(&self, buf: &mut [u8]) -> Result<(), String>;
}

/// Hash provider (factory for HashContext).
pub trait HashProvider: CryptoSafe {
    /// Create a new hash context for the specified algorithm.
    fn create_hash(&self, algorithm: HashAlgorithm) -> Result<Box<dyn HashContext>, String>;
}

/// HMAC provider.
pub trait HmacProvider: CryptoSafe {
    /// Compute HMAC(key, data) with the given hash, writing the tag to `out`.
    fn hmac(&self, hash: HashAlgorithm, key: &[u8], data: &[u8], out: &mut Buf)
        -> Result<(), String>;
}

/// HKDF provider for TLS 1.3 key derivation (RFC 5869).
pub trait HkdfProvider: CryptoSafe {
    /// HKDF-Extract: PRK = HKDF-Extract(salt, IKM)
    fn hkdf_extract(
        &self,
        hash: HashAlgorithm,
        salt: &[u8],
        ikm: &[u8],
        out: &mut Buf,
    ) -> Result<(), String>;

    /// HKDF-Expand: OKM = HKDF-Expand(PRK, info, L)
    fn hkdf_expand(
        &self,
        hash: HashAlgorithm,
        prk: &[u8],
        info: &[u8],
        out: &mut Buf,
        output_len: usize,
    ) -> Result<(), String>;

    /// HKDF-Expand-Label for TLS 1.3 (RFC 8446 Section 7.1).
    ///
    /// HkdfLabel = struct {
    ///     uint16 length;
    ///     opaque label<7..255> = "tls13 " + Label;
    ///     opaque context<0..255> = Context;
    /// }
    fn hkdf_expand_label(
        &self,
        hash: HashAlgorithm,
        secret: &[u8],
        label: &[u8],
        context: &[u8],
        out: &mut Buf,
        output_len: usize,
    ) -> Result<(), String> {
        let full_label_len = 6 + label.len();

        if full_label_len > 255 {
            return Err("Label too long for HKDF-Expand-Label".to_string());
        }
        if context.len() > 255 {
            return Err("Context too long for HKDF-Expand-Label".to_string());
        }
        if output_len > 65535 {
            return Err("Output length too large for HKDF-Expand-Label".to_string());
        }

        let mut info = Buf::new();
        info.extend_from_slice(&(output_len as u16).to_be_bytes());
        info.push(full_label_len as u8);
        info.extend_from_slice(b"tls13 ");
        info.extend_from_slice(label);
        info.push(context.len() as u8);
        info.extend_from_slice(context);

        self.hkdf_expand(hash, secret, &info, out, output_len)
    }
}

// ============================================================================
// Core Provider Struct
// ============================================================================

/// Cryptographic provider for TLS operations.
///
/// Holds `&'static dyn Trait` references, so cloning is cheap and dispatch
/// needs no allocation.
#[derive(Debug, Clone)]
pub struct CryptoProvider {
    /// Supported TLS 1.3 cipher suites.
    pub cipher_suites: &'static [&'static dyn SupportedCipherSuite],

    /// Supported key exchange groups.
    pub kx_groups: &'static [&'static dyn SupportedKxGroup],

    /// Signature verification for handshake and certificate signatures.
    pub signature_verification: &'static dyn SignatureVerifier,

    /// Key provider for parsing private keys.
    pub key_provider: &'static dyn KeyProvider,

    /// Secure random number generator.
    pub secure_random: &'static dyn SecureRandom,

    /// Hash provider for transcript hashing.
    pub hash_provider: &'static dyn HashProvider,

    /// HMAC provider for Finished messages.
    pub hmac_provider: &'static dyn HmacProvider,

    /// HKDF provider for the key schedule.
    pub hkdf_provider: &'static dyn HkdfProvider,
}

static DEFAULT: OnceCell<CryptoProvider> = OnceCell::new();

impl CryptoProvider {
    /// Install a default crypto provider for the process.
    ///
    /// Used by [`Config::builder()`](crate::Config::builder) when no explicit
    /// provider is set.
    ///
    /// # Panics
    ///
    /// Panics if called more than once.
    pub fn install_default(provider: CryptoProvider) {
        DEFAULT
            .set(provider)
            .expect("CryptoProvider::install_default() called more than once");
    }

    /// Get the default crypto provider, if one has been installed.
    pub fn get_default() -> Option<&'static CryptoProvider> {
        DEFAULT.get()
    }

    /// The installed default, else the RustCrypto provider.
    pub(crate) fn get_default_or_builtin() -> CryptoProvider {
        Self::get_default()
            .cloned()
            .unwrap_or_else(super::rust_crypto::default_provider)
    }

    /// Find the provider implementation of a cipher suite.
    pub fn find_cipher_suite(&self, suite: CipherSuite) -> Option<&'static dyn SupportedCipherSuite> {
        self.cipher_suites.iter().copied().find(|cs| cs.suite() == suite)
    }

    /// Find the provider implementation of a key exchange group.
    pub fn find_kx_group(&self, group: NamedGroup) -> Option<&'static dyn SupportedKxGroup> {
        self.kx_groups.iter().copied().find(|kx| kx.name() == group)
    }

    /// Hash `data` in one go.
    pub fn hash(&self, algorithm: HashAlgorithm, data: &[u8]) -> Result<Buf, String> {
        let mut ctx = self.hash_provider.create_hash(algorithm)?;
        ctx.update(data);
        let mut out = Buf::new();
        ctx.clone_and_finalize(&mut out);
        Ok(out)
    }

    /// Validate that the provider can run a TLS 1.3 handshake.
    ///
    /// Returns `Error::Config` if it lacks cipher suites or key exchange
    /// groups, or if its hash provider produces wrong digests.
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.cipher_suites.is_empty() {
            return Err(crate::Error::Config(
                "CryptoProvider has no cipher suites".to_string(),
            ));
        }
        if self.kx_groups.is_empty() {
            return Err(crate::Error::Config(
                "CryptoProvider has no key exchange groups".to_string(),
            ));
        }

        for cs in self.cipher_suites {
            let hash_alg = cs.hash_algorithm();
            let result = self.hash(hash_alg, &[]).map_err(crate::Error::Config)?;
            let expected = HASH_TEST_VECTORS
                .iter()
                .find(|(h, _)| *h == hash_alg)
                .map(|(_, v)| *v)
                .ok_or_else(|| {
                    crate::Error::Config(format!("No hash test vector for {:?}", hash_alg))
                })?;
            if &*result != expected {
                return Err(crate::Error::Config(format!(
                    "Hash provider {:?} produced incorrect result",
                    hash_alg
                )));
            }
        }

        Ok(())
    }
}

// Digests of the empty string.
const HASH_TEST_VECTORS: &[(HashAlgorithm, &[u8])] = &[
    (
        HashAlgorithm::SHA256,
        &[
            0xe3, 0xb0, 0xc4, 0x42, 0x98, 0xfc, 0x1c, 0x14, 0x9a, 0xfb, 0xf4, 0xc8, 0x99, 0x6f,
            0xb9, 0x24, 0x27, 0xae, 0x41, 0xe4, 0x64, 0x9b, 0x93, 0x4c, 0xa4, 0x95, 0x99, 0x1b,
            0x78, 0x52, 0xb8, 0x55,
        ],
    ),
    (
        HashAlgorithm::SHA384,
        &[
            0x38, 0xb0, 0x60, 0xa7, 0x51, 0xac, 0x96, 0x38, 0x4c, 0xd9, 0x32, 0x7e, 0xb1, 0xb1,
            0xe3, 0x6a, 0x21, 0xfd, 0xb7, 0x11, 0x14, 0xbe, 0x07, 0x43, 0x4c, 0x0c, 0xc7, 0xbf,
            0x63, 0xf6, 0xe1, 0xda, 0x27, 0x4e, 0xde, 0xbf, 0xe7, 0x6f, 0x65, 0xfb, 0xd5, 0x1a,
            0xd2, 0xf1, 0x48, 0x98, 0xb9, 0x5b,
        ],
    ),
];
