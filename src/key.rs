//! Local certificate chain and private key.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use pkcs8::EncryptedPrivateKeyInfo;
use zeroize::Zeroizing;

use crate::certificate::{is_pem, Certificate};
use crate::crypto::{CryptoProvider, SigningKey};
use crate::types::SignatureScheme;
use crate::Error;

const ENCRYPTED_LABEL: &str = "ENCRYPTED PRIVATE KEY";

/// A certificate chain (leaf first) with the private key of the leaf.
///
/// Cloning shares the loaded key.
#[derive(Clone)]
pub struct CertifiedKey {
    chain: Vec<Certificate>,
    key: Arc<dyn SigningKey>,
}

impl CertifiedKey {
    /// Load from DER certificates and a DER or PEM private key.
    ///
    /// Accepts PKCS#8 and SEC1 keys. Uses the installed default crypto
    /// provider, or the RustCrypto one.
    pub fn from_der(chain: Vec<Vec<u8>>, key: &[u8]) -> Result<CertifiedKey, Error> {
        let chain = chain
            .iter()
            .map(|der| Certificate::parse(der))
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(chain, key, None, &CryptoProvider::get_default_or_builtin())
    }

    /// Load from a PEM certificate chain and a PEM private key.
    ///
    /// `passphrase` decrypts an `ENCRYPTED PRIVATE KEY`.
    pub fn from_pem(
        cert_pem: &[u8],
        key_pem: &[u8],
        passphrase: Option<&str>,
    ) -> Result<CertifiedKey, Error> {
        let chain = Certificate::chain_from_pem(cert_pem)?;
        Self::new(chain, key_pem, passphrase, &CryptoProvider::get_default_or_builtin())
    }

    /// Load from files. Both files may be PEM or DER.
    pub fn from_files(
        cert_path: impl AsRef<Path>,
        key_path: impl AsRef<Path>,
        passphrase: Option<&str>,
    ) -> Result<CertifiedKey, Error> {
        let cert_data = std::fs::read(cert_path)?;
        let key_data = Zeroizing::new(std::fs::read(key_path)?);

        let chain = if is_pem(&cert_data) {
            Certificate::chain_from_pem(&cert_data)?
        } else {
            vec![Certificate::parse(&cert_data)?]
        };
        Self::new(chain, &key_data, passphrase, &CryptoProvider::get_default_or_builtin())
    }

    /// Build from parsed certificates and key bytes, loading the key with `provider`.
    ///
    /// Fails with `InvalidKey` if the key does not belong to the leaf.
    pub fn new(
        chain: Vec<Certificate>,
        key: &[u8],
        passphrase: Option<&str>,
        provider: &CryptoProvider,
    ) -> Result<CertifiedKey, Error> {
        let leaf = chain
            .first()
            .ok_or_else(|| Error::MalformedCertificate("Empty certificate chain".to_string()))?;

        let key_der = decrypt_key(key, passphrase)?;
        let key = provider
            .key_provider
            .load_private_key(&key_der)
            .map_err(Error::InvalidKey)?;

        if key.public_key() != leaf.public_key() {
            return Err(Error::InvalidKey(
                "Private key does not match the certificate".to_string(),
            ));
        }

        Ok(CertifiedKey {
            chain,
            key: Arc::from(key),
        })
    }

    /// The leaf certificate.
    pub fn certificate(&self) -> &Certificate {
        &self.chain[0]
    }

    /// The full chain, leaf first.
    pub fn chain(&self) -> &[Certificate] {
        &self.chain
    }

    /// The signature scheme of the key.
    pub fn scheme(&self) -> SignatureScheme {
        self.key.scheme()
    }

    pub(crate) fn signing_key(&self) -> &dyn SigningKey {
        &*self.key
    }
}

impl fmt::Debug for CertifiedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CertifiedKey")
            .field("certificate", self.certificate())
            .field("chain_len", &self.chain.len())
            .field("scheme", &self.key.scheme())
            .finish()
    }
}

/// Unwrap PEM and decrypt encrypted PKCS#8, returning key DER.
fn decrypt_key(key: &[u8], passphrase: Option<&str>) -> Result<Zeroizing<Vec<u8>>, Error> {
    let (encrypted, der) = if is_pem(key) {
        let (label, der) =
            der::pem::decode_vec(key).map_err(|e| Error::InvalidKey(format!("Invalid PEM: {}", e)))?;
        (label == ENCRYPTED_LABEL, Zeroizing::new(der))
    } else {
        let der = Zeroizing::new(key.to_vec());
        (EncryptedPrivateKeyInfo::try_from(&der[..]).is_ok(), der)
    };

    if !encrypted {
        return Ok(der);
    }

    let passphrase = passphrase.ok_or_else(|| {
        Error::InvalidKey("Private key is encrypted and no passphrase was given".to_string())
    })?;

    let info = EncryptedPrivateKeyInfo::try_from(&der[..])
        .map_err(|e| Error::InvalidKey(format!("Invalid encrypted key: {}", e)))?;
    let doc = info
        .decrypt(passphrase)
        .map_err(|e| Error::InvalidKey(format!("Failed to decrypt key: {}", e)))?;

    Ok(Zeroizing::new(doc.as_bytes().to_vec()))
}
