//! Hash implementations using RustCrypto.

use sha2::{Digest, Sha256, Sha384, Sha512};

use crate::buffer::Buf;
use crate::crypto::provider::{HashContext, HashProvider};
use crate::types::HashAlgorithm;

/// Hash context implementation using RustCrypto.
#[derive(Debug)]
enum RustCryptoHashContext {
    Sha256(Sha256),
    Sha384(Sha384),
    Sha512(Sha512),
}

impl HashContext for RustCryptoHashContext {
    fn update(&mut self, data: &[u8]) {
        match self {
            RustCryptoHashContext::Sha256(ctx) => ctx.update(data),
            RustCryptoHashContext::Sha384(ctx) => ctx.update(data),
            RustCryptoHashContext::Sha512(ctx) => ctx.update(data),
        }
    }

    fn clone_and_finalize(&self, out: &mut Buf) {
        out.clear();
        match self {
            RustCryptoHashContext::Sha256(ctx) => out.extend_from_slice(&ctx.clone().finalize()),
            RustCryptoHashContext::Sha384(ctx) => out.extend_from_slice(&ctx.clone().finalize()),
            RustCryptoHashContext::Sha512(ctx) => out.extend_from_slice(&ctx.clone().finalize()),
        }
    }
}

/// Hash provider implementation.
#[derive(Debug)]
pub(super) struct RustCryptoHashProvider;

impl HashProvider for RustCryptoHashProvider {
    fn create_hash(&self, algorithm: HashAlgorithm) -> Result<Box<dyn HashContext>, String> {
        let ctx = match algorithm {
            HashAlgorithm::SHA256 => RustCryptoHashContext::Sha256(Sha256::new()),
            HashAlgorithm::SHA384 => RustCryptoHashContext::Sha384(Sha384::new()),
            HashAlgorithm::SHA512 => RustCryptoHashContext::Sha512(Sha512::new()),
            HashAlgorithm::None => return Err("No hash algorithm selected".to_string()),
        };
        Ok(Box::new(ctx))
    }
}

/// Static instance of the hash provider.
pub(super) static HASH_PROVIDER: RustCryptoHashProvider = RustCryptoHashProvider;
