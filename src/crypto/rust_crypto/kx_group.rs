//! Key exchange group implementations using RustCrypto.

use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::{ecdh::EphemeralSecret, PublicKey as P256PublicKey};
use p384::{ecdh::EphemeralSecret as P384EphemeralSecret, PublicKey as P384PublicKey};
use rand::rngs::OsRng;

use crate::buffer::Buf;
use crate::crypto::provider::{ActiveKeyExchange, SupportedKxGroup};
use crate::types::NamedGroup;

/// ECDHE key exchange implementation.
enum EcdhKeyExchange {
    P256 {
        secret: EphemeralSecret,
        public_key: Buf,
    },
    P384 {
        secret: P384EphemeralSecret,
        public_key: Buf,
    },
    X25519 {
        secret: x25519_dalek::EphemeralSecret,
        public_key: Buf,
    },
}

impl std::fmt::Debug for EcdhKeyExchange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EcdhKeyExchange")
            .field("group", &self.group())
            .field("public_key_len", &self.pub_key().len())
            .finish_non_exhaustive()
    }
}

impl EcdhKeyExchange {
    fn new(group: NamedGroup) -> Result<Self, String> {
        match group {
            NamedGroup::Secp256r1 => {
                let secret = EphemeralSecret::random(&mut OsRng);
                // key_share carries the uncompressed point
                let point = P256PublicKey::from(&secret).to_encoded_point(false);
                Ok(EcdhKeyExchange::P256 {
                    secret,
                    public_key: Buf::from_slice(point.as_bytes()),
                })
            }
            NamedGroup::Secp384r1 => {
                let secret = P384EphemeralSecret::random(&mut OsRng);
                let point = P384PublicKey::from(&secret).to_encoded_point(false);
                Ok(EcdhKeyExchange::P384 {
                    secret,
                    public_key: Buf::from_slice(point.as_bytes()),
                })
            }
            NamedGroup::X25519 => {
                let secret = x25519_dalek::EphemeralSecret::random_from_rng(OsRng);
                let public = x25519_dalek::PublicKey::from(&secret);
                Ok(EcdhKeyExchange::X25519 {
                    secret,
                    public_key: Buf::from_slice(public.as_bytes()),
                })
            }
            _ => Err(format!("Unsupported group: {:?}", group)),
        }
    }
}

impl ActiveKeyExchange for EcdhKeyExchange {
    fn pub_key(&self) -> &[u8] {
        match self {
            EcdhKeyExchange::P256 { public_key, .. } => public_key,
            EcdhKeyExchange::P384 { public_key, .. } => public_key,
            EcdhKeyExchange::X25519 { public_key, .. } => public_key,
        }
    }

    fn complete(self: Box<Self>, peer_pub: &[u8], out: &mut Buf) -> Result<(), String> {
        out.clear();
        match *self {
            EcdhKeyExchange::P256 { secret, .. } => {
                let peer_key = P256PublicKey::from_sec1_bytes(peer_pub)
                    .map_err(|_| "Invalid P-256 public key".to_string())?;
                let shared_secret = secret.diffie_hellman(&peer_key);
                out.extend_from_slice(shared_secret.raw_secret_bytes().as_slice());
            }
            EcdhKeyExchange::P384 { secret, .. } => {
                let peer_key = P384PublicKey::from_sec1_bytes(peer_pub)
                    .map_err(|_| "Invalid P-384 public key".to_string())?;
                let shared_secret = secret.diffie_hellman(&peer_key);
                out.extend_from_slice(shared_secret.raw_secret_bytes().as_slice());
            }
            EcdhKeyExchange::X25519 { secret, .. } => {
                let peer: [u8; 32] = peer_pub
                    .try_into()
                    .map_err(|_| "Invalid X25519 public key length".to_string())?;
                let shared_secret = secret.diffie_hellman(&x25519_dalek::PublicKey::from(peer));
                if !shared_secret.was_contributory() {
                    return Err("X25519 shared secret is all zeros".to_string());
                }
                out.extend_from_slice(shared_secret.as_bytes());
            }
        }
        Ok(())
    }

    fn group(&self) -> NamedGroup {
        match self {
            EcdhKeyExchange::P256 { .. } => NamedGroup::Secp256r1,
            EcdhKeyExchange::P384 { .. } => NamedGroup::Secp384r1,
            EcdhKeyExchange::X25519 { .. } => NamedGroup::X25519,
        }
    }
}

/// Key exchange group backed by [`EcdhKeyExchange`].
#[derive(Debug)]
struct EcdhGroup(NamedGroup);

impl SupportedKxGroup for EcdhGroup {
    fn name(&self) -> NamedGroup {
        self.0
    }

    fn start_exchange(&self) -> Result<Box<dyn ActiveKeyExchange>, String> {
        Ok(Box::new(EcdhKeyExchange::new(self.0)?))
    }
}

static KX_GROUP_X25519: EcdhGroup = EcdhGroup(NamedGroup::X25519);
static KX_GROUP_P256: EcdhGroup = EcdhGroup(NamedGroup::Secp256r1);
static KX_GROUP_P384: EcdhGroup = EcdhGroup(NamedGroup::Secp384r1);

/// All supported key exchange groups, in default preference order.
pub(super) static ALL_KX_GROUPS: &[&dyn SupportedKxGroup] =
    &[&KX_GROUP_X25519, &KX_GROUP_P256, &KX_GROUP_P384];
