use crate::crypto::CryptoProvider;
use crate::types::{CipherSuite, NamedGroup, SignatureScheme};
use crate::Error;

/// Largest plaintext a TLS record may carry (2^14).
pub const MAX_FRAGMENT_LEN: usize = 16384;

/// TLS configuration, shared between sessions as `Arc<Config>`.
#[derive(Debug, Clone)]
pub struct Config {
    cipher_suites: Vec<CipherSuite>,
    kx_groups: Vec<NamedGroup>,
    signature_schemes: Vec<SignatureScheme>,
    max_fragment_len: usize,
    max_handshake_message_size: usize,
    crypto_provider: CryptoProvider,
}

impl Config {
    /// Create a new configuration builder.
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder {
            cipher_suites: vec![
                CipherSuite::AES_128_GCM_SHA256,
                CipherSuite::AES_256_GCM_SHA384,
            ],
            kx_groups: vec![
                NamedGroup::X25519,
                NamedGroup::Secp256r1,
                NamedGroup::Secp384r1,
            ],
            signature_schemes: vec![
                SignatureScheme::ECDSA_SECP256R1_SHA256,
                SignatureScheme::ECDSA_SECP384R1_SHA384,
            ],
            max_fragment_len: MAX_FRAGMENT_LEN,
            max_handshake_message_size: 65536,
            crypto_provider: None,
        }
    }

    /// Cipher suites in preference order.
    ///
    /// A server picks the first of these the client also offers.
    #[inline(always)]
    pub fn cipher_suites(&self) -> &[CipherSuite] {
        &self.cipher_suites
    }

    /// Key exchange groups in preference order.
    ///
    /// A client sends a key share for every one of them.
    #[inline(always)]
    pub fn kx_groups(&self) -> &[NamedGroup] {
        &self.kx_groups
    }

    /// Signature schemes accepted in CertificateVerify.
    #[inline(always)]
    pub fn signature_schemes(&self) -> &[SignatureScheme] {
        &self.signature_schemes
    }

    /// Largest application data plaintext put in one record.
    #[inline(always)]
    pub fn max_fragment_len(&self) -> usize {
        self.max_fragment_len
    }

    /// Largest handshake message accepted from the peer.
    #[inline(always)]
    pub fn max_handshake_message_size(&self) -> usize {
        self.max_handshake_message_size
    }

    /// Cryptographic provider.
    ///
    /// Provides all cryptographic operations (ciphers, key exchange, signing, etc.).
    #[inline(always)]
    pub fn crypto_provider(&self) -> &CryptoProvider {
        &self.crypto_provider
    }
}

impl Default for Config {
    fn default() -> Self {
        // The builder defaults always validate against the bundled provider.
        Config::builder()
            .build()
            .expect("default configuration is valid")
    }
}

/// Builder for TLS configuration.
pub struct ConfigBuilder {
    cipher_suites: Vec<CipherSuite>,
    kx_groups: Vec<NamedGroup>,
    signature_schemes: Vec<SignatureScheme>,
    max_fragment_len: usize,
    max_handshake_message_size: usize,
    crypto_provider: Option<CryptoProvider>,
}

impl ConfigBuilder {
    /// Set the cipher suites, in preference order.
    ///
    /// Defaults to TLS_AES_128_GCM_SHA256, TLS_AES_256_GCM_SHA384.
    pub fn cipher_suites(mut self, suites: &[CipherSuite]) -> Self {
        self.cipher_suites = suites.to_vec();
        self
    }

    /// Set the key exchange groups, in preference order.
    ///
    /// Defaults to x25519, secp256r1, secp384r1.
    pub fn kx_groups(mut self, groups: &[NamedGroup]) -> Self {
        self.kx_groups = groups.to_vec();
        self
    }

    /// Set the signature schemes accepted for CertificateVerify.
    ///
    /// Defaults to ecdsa_secp256r1_sha256, ecdsa_secp384r1_sha384.
    pub fn signature_schemes(mut self, schemes: &[SignatureScheme]) -> Self {
        self.signature_schemes = schemes.to_vec();
        self
    }

    /// Set the largest plaintext put in one outgoing record.
    ///
    /// Capped at 16384. Defaults to 16384.
    pub fn max_fragment_len(mut self, len: usize) -> Self {
        self.max_fragment_len = len;
        self
    }

    /// Set the largest handshake message accepted from the peer.
    ///
    /// Defaults to 65536.
    pub fn max_handshake_message_size(mut self, size: usize) -> Self {
        self.max_handshake_message_size = size;
        self
    }

    /// Set a custom crypto provider.
    ///
    /// If not set, the process default installed with
    /// [`CryptoProvider::install_default()`] is used, falling back to
    /// [`rust_crypto::default_provider()`](crate::crypto::rust_crypto::default_provider).
    pub fn with_crypto_provider(mut self, provider: CryptoProvider) -> Self {
        self.crypto_provider = Some(provider);
        self
    }

    /// Build the configuration.
    ///
    /// Returns `Error::Config` if the provider is invalid or if a configured
    /// cipher suite or group is not implemented by it.
    pub fn build(self) -> Result<Config, Error> {
        let crypto_provider = self
            .crypto_provider
            .unwrap_or_else(CryptoProvider::get_default_or_builtin);

        // Always validate the crypto provider
        crypto_provider.validate()?;

        if self.cipher_suites.is_empty() {
            return Err(Error::Config("No cipher suites configured".into()));
        }
        if self.kx_groups.is_empty() {
            return Err(Error::Config("No key exchange groups configured".into()));
        }
        if self.signature_schemes.is_empty() {
            return Err(Error::Config("No signature schemes configured".into()));
        }
        for suite in &self.cipher_suites {
            if crypto_provider.find_cipher_suite(*suite).is_none() {
                return Err(Error::Config(format!(
                    "Cipher suite {} not supported by crypto provider",
                    suite
                )));
            }
        }
        for group in &self.kx_groups {
            if crypto_provider.find_kx_group(*group).is_none() {
                return Err(Error::Config(format!(
                    "Key exchange group {:?} not supported by crypto provider",
                    group
                )));
            }
        }
        if self.max_fragment_len == 0 || self.max_fragment_len > MAX_FRAGMENT_LEN {
            return Err(Error::Config(format!(
                "max_fragment_len must be within 1..={}",
                MAX_FRAGMENT_LEN
            )));
        }
        if self.max_handshake_message_size < 1024 {
            return Err(Error::Config(
                "max_handshake_message_size must be at least 1024".into(),
            ));
        }

        Ok(Config {
            cipher_suites: self.cipher_suites,
            kx_groups: self.kx_groups,
            signature_schemes: self.signature_schemes,
            max_fragment_len: self.max_fragment_len,
            max_handshake_message_size: self.max_handshake_message_size,
            crypto_provider,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_builds() {
        let config = Config::default();
        assert_eq!(config.max_fragment_len(), MAX_FRAGMENT_LEN);
        assert_eq!(config.kx_groups()[0], NamedGroup::X25519);
    }

    #[test]
    fn rejects_unsupported_suite() {
        let err = Config::builder()
            .cipher_suites(&[CipherSuite::CHACHA20_POLY1305_SHA256])
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn rejects_oversized_fragment() {
        let err = Config::builder().max_fragment_len(20000).build().unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
