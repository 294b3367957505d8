//! HKDF implementation using RustCrypto crates for TLS 1.3 key derivation.

use hkdf::Hkdf;
use sha2::{Sha256, Sha384};
use zeroize::Zeroizing;

use crate::buffer::Buf;
use crate::crypto::provider::HkdfProvider;
use crate::types::HashAlgorithm;

/// HKDF provider implementation using RustCrypto.
#[derive(Debug)]
pub(super) struct RustCryptoHkdfProvider;

impl HkdfProvider for RustCryptoHkdfProvider {
    fn hkdf_extract(
        &self,
        hash: HashAlgorithm,
        salt: &[u8],
        ikm: &[u8],
        out: &mut Buf,
    ) -> Result<(), String> {
        out.clear();
        let salt = if salt.is_empty() { None } else { Some(salt) };

        match hash {
            HashAlgorithm::SHA256 => {
                let (prk, _) = Hkdf::<Sha256>::extract(salt, ikm);
                out.extend_from_slice(prk.as_slice());
            }
            HashAlgorithm::SHA384 => {
                let (prk, _) = Hkdf::<Sha384>::extract(salt, ikm);
                out.extend_from_slice(prk.as_slice());
            }
            _ => return Err(format!("Unsupported hash for HKDF: {:?}", hash)),
        }

        Ok(())
    }

    fn hkdf_expand(
        &self,
        hash: HashAlgorithm,
        prk: &[u8],
        info: &[u8],
        out: &mut Buf,
        output_len: usize,
    ) -> Result<(), String> {
        out.clear();
        let mut output = Zeroizing::new(vec![0u8; output_len]);

        match hash {
            HashAlgorithm::SHA256 => {
                let hk =
                    Hkdf::<Sha256>::from_prk(prk).map_err(|e| format!("Invalid PRK: {:?}", e))?;
                hk.expand(info, &mut output)
                    .map_err(|e| format!("HKDF expand failed: {:?}", e))?;
            }
            HashAlgorithm::SHA384 => {
                let hk =
                    Hkdf::<Sha384>::from_prk(prk).map_err(|e| format!("Invalid PRK: {:?}", e))?;
                hk.expand(info, &mut output)
                    .map_err(|e| format!("HKDF expand failed: {:?}", e))?;
            }
            _ => return Err(format!("Unsupported hash for HKDF: {:?}", hash)),
        }

        out.extend_from_slice(&output);
        Ok(())
    }
}

/// Static instance of the HKDF provider.
pub(super) static HKDF_PROVIDER: RustCryptoHkdfProvider = RustCryptoHkdfProvider;
