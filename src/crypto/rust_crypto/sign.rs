//! Signing, key loading and signature verification using RustCrypto.

use std::str;

use der::Encode;
use p256::ecdsa::{Signature as P256Signature, SigningKey as P256SigningKey};
use p256::ecdsa::VerifyingKey as P256VerifyingKey;
use p384::ecdsa::{Signature as P384Signature, SigningKey as P384SigningKey};
use p384::ecdsa::VerifyingKey as P384VerifyingKey;
use pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::{Pkcs1v15Sign, RsaPublicKey};
use sha2::{Digest, Sha256, Sha384, Sha512};
use signature::hazmat::{PrehashSigner, PrehashVerifier};
use spki::ObjectIdentifier;

use crate::buffer::Buf;
use crate::crypto::provider::{KeyProvider, SignatureVerifier, SigningKey};
use crate::types::{HashAlgorithm, SignatureAlgorithm, SignatureScheme};

const OID_EC_PUBLIC_KEY: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.2.1");
const OID_P256: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.3.1.7");
const OID_P384: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.132.0.34");

/// ECDSA signing key implementation.
enum EcdsaSigningKey {
    P256(P256SigningKey),
    P384(P384SigningKey),
}

impl std::fmt::Debug for EcdsaSigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EcdsaSigningKey::P256(_) => f.debug_tuple("EcdsaSigningKey::P256").finish(),
            EcdsaSigningKey::P384(_) => f.debug_tuple("EcdsaSigningKey::P384").finish(),
        }
    }
}

impl SigningKey for EcdsaSigningKey {
    fn sign(&self, data: &[u8], out: &mut Buf) -> Result<(), String> {
        out.clear();
        match self {
            EcdsaSigningKey::P256(key) => {
                let hash = Sha256::digest(data);
                let signature: P256Signature = key
                    .sign_prehash(&hash)
                    .map_err(|_| "Signing failed".to_string())?;
                out.extend_from_slice(signature.to_der().as_bytes());
            }
            EcdsaSigningKey::P384(key) => {
                let hash = Sha384::digest(data);
                let signature: P384Signature = key
                    .sign_prehash(&hash)
                    .map_err(|_| "Signing failed".to_string())?;
                out.extend_from_slice(signature.to_der().as_bytes());
            }
        }
        Ok(())
    }

    fn scheme(&self) -> SignatureScheme {
        match self {
            EcdsaSigningKey::P256(_) => SignatureScheme::ECDSA_SECP256R1_SHA256,
            EcdsaSigningKey::P384(_) => SignatureScheme::ECDSA_SECP384R1_SHA384,
        }
    }

    fn public_key(&self) -> Vec<u8> {
        match self {
            EcdsaSigningKey::P256(key) => key
                .verifying_key()
                .to_encoded_point(false)
                .as_bytes()
                .to_vec(),
            EcdsaSigningKey::P384(key) => key
                .verifying_key()
                .to_encoded_point(false)
                .as_bytes()
                .to_vec(),
        }
    }
}

/// Key provider implementation.
#[derive(Debug)]
pub(super) struct RustCryptoKeyProvider;

impl RustCryptoKeyProvider {
    /// Wrap a SEC1 `ECPrivateKey` into PKCS#8 so the curve crates can load it.
    fn load_sec1(&self, key_der: &[u8]) -> Option<Box<dyn SigningKey>> {
        let ec_key = sec1::EcPrivateKey::try_from(key_der).ok()?;

        let curve_oid = match &ec_key.parameters {
            Some(sec1::EcParameters::NamedCurve(oid)) => *oid,
            None if ec_key.private_key.len() == 32 => OID_P256,
            None if ec_key.private_key.len() == 48 => OID_P384,
            None => return None,
        };

        let curve_params_der = curve_oid.to_der().ok()?;
        let curve_params_any = der::asn1::AnyRef::try_from(curve_params_der.as_slice()).ok()?;

        let pkcs8 = pkcs8::PrivateKeyInfo {
            algorithm: spki::AlgorithmIdentifierRef {
                oid: OID_EC_PUBLIC_KEY,
                parameters: Some(curve_params_any),
            },
            private_key: key_der,
            public_key: None,
        };
        let pkcs8_der = pkcs8.to_der().ok()?;

        if curve_oid == OID_P256 {
            let key = P256SigningKey::from_pkcs8_der(&pkcs8_der).ok()?;
            return Some(Box::new(EcdsaSigningKey::P256(key)));
        }
        if curve_oid == OID_P384 {
            let key = P384SigningKey::from_pkcs8_der(&pkcs8_der).ok()?;
            return Some(Box::new(EcdsaSigningKey::P384(key)));
        }
        None
    }
}

impl KeyProvider for RustCryptoKeyProvider {
    fn load_private_key(&self, key_der: &[u8]) -> Result<Box<dyn SigningKey>, String> {
        // PKCS#8 DER first (most common)
        if let Ok(key) = P256SigningKey::from_pkcs8_der(key_der) {
            return Ok(Box::new(EcdsaSigningKey::P256(key)));
        }
        if let Ok(key) = P384SigningKey::from_pkcs8_der(key_der) {
            return Ok(Box::new(EcdsaSigningKey::P384(key)));
        }

        // SEC1 DER (OpenSSL "EC PRIVATE KEY")
        if let Some(key) = self.load_sec1(key_der) {
            return Ok(key);
        }

        if let Ok(pem_str) = str::from_utf8(key_der) {
            if pem_str.contains("-----BEGIN") {
                let (label, doc) = der::Document::from_pem(pem_str)
                    .map_err(|e| format!("Invalid PEM: {}", e))?;
                if label == "ENCRYPTED PRIVATE KEY" {
                    return Err("Private key is encrypted".to_string());
                }
                return self.load_private_key(doc.as_bytes());
            }
        }

        Err("Failed to parse private key as ECDSA P-256/P-384 (PKCS#8 or SEC1)".to_string())
    }
}

/// Signature verifier implementation.
#[derive(Debug)]
pub(super) struct RustCryptoSignatureVerifier;

impl RustCryptoSignatureVerifier {
    fn verify_ecdsa(
        &self,
        spki_der: &[u8],
        digest: &[u8],
        signature: &[u8],
    ) -> Result<(), String> {
        if let Ok(public_key) = p256::PublicKey::from_public_key_der(spki_der) {
            let sig = P256Signature::from_der(signature)
                .map_err(|_| "Invalid ECDSA signature encoding".to_string())?;
            return P256VerifyingKey::from(public_key)
                .verify_prehash(digest, &sig)
                .map_err(|_| "ECDSA P-256 signature verification failed".to_string());
        }
        if let Ok(public_key) = p384::PublicKey::from_public_key_der(spki_der) {
            let sig = P384Signature::from_der(signature)
                .map_err(|_| "Invalid ECDSA signature encoding".to_string())?;
            return P384VerifyingKey::from(public_key)
                .verify_prehash(digest, &sig)
                .map_err(|_| "ECDSA P-384 signature verification failed".to_string());
        }
        Err("Public key is not an ECDSA P-256/P-384 key".to_string())
    }

    fn verify_rsa_pkcs1(
        &self,
        spki_der: &[u8],
        hash_alg: HashAlgorithm,
        digest: &[u8],
        signature: &[u8],
    ) -> Result<(), String> {
        let public_key = RsaPublicKey::from_public_key_der(spki_der)
            .map_err(|e| format!("Public key is not an RSA key: {}", e))?;
        let scheme = match hash_alg {
            HashAlgorithm::SHA256 => Pkcs1v15Sign::new::<Sha256>(),
            HashAlgorithm::SHA384 => Pkcs1v15Sign::new::<Sha384>(),
            HashAlgorithm::SHA512 => Pkcs1v15Sign::new::<Sha512>(),
            _ => return Err(format!("Unsupported RSA hash: {:?}", hash_alg)),
        };
        public_key
            .verify(scheme, digest, signature)
            .map_err(|_| "RSA PKCS#1 signature verification failed".to_string())
    }
}

impl SignatureVerifier for RustCryptoSignatureVerifier {
    fn verify_signature(
        &self,
        spki_der: &[u8],
        data: &[u8],
        signature: &[u8],
        hash_alg: HashAlgorithm,
        sig_alg: SignatureAlgorithm,
    ) -> Result<(), String> {
        let digest: Vec<u8> = match hash_alg {
            HashAlgorithm::SHA256 => Sha256::digest(data).to_vec(),
            HashAlgorithm::SHA384 => Sha384::digest(data).to_vec(),
            HashAlgorithm::SHA512 => Sha512::digest(data).to_vec(),
            HashAlgorithm::None => return Err("Signature without hash".to_string()),
        };

        match sig_alg {
            SignatureAlgorithm::ECDSA => self.verify_ecdsa(spki_der, &digest, signature),
            SignatureAlgorithm::RSA_PKCS1 => {
                self.verify_rsa_pkcs1(spki_der, hash_alg, &digest, signature)
            }
            _ => Err(format!("Unsupported signature algorithm: {:?}", sig_alg)),
        }
    }
}

/// Static instance of the key provider.
pub(super) static KEY_PROVIDER: RustCryptoKeyProvider = RustCryptoKeyProvider;

/// Static instance of the signature verifier.
pub(super) static SIGNATURE_VERIFIER: RustCryptoSignatureVerifier = RustCryptoSignatureVerifier;
