//! tlsock: TLS 1.3 sessions over pluggable byte-stream transports.
//!
//! The crate has three parts:
//!
//! * [`Certificate`]: a parsed X.509 certificate with its subject, issuer,
//!   alternative names, validity and constraints, and predicates to match it
//!   against a host name, SRV service or IP address.
//! * [`Session`]: one TLS 1.3 connection (client or server) over any
//!   [`Transport`]. The session drives the handshake, encrypts application
//!   data and handles KeyUpdate and close_notify.
//! * [`verify()`]: checks a peer chain against a [`TrustPolicy`] (trusted
//!   roots, validity window, basic constraints, expected [`Identity`]).
//!
//! Verification is never implicit. After the handshake call
//! [`Session::verify_peer`], or use [`TlsSocket`] which does it for you.
//!
//! # Example
//!
//! ```no_run
//! use std::io::{Read, Write};
//! use std::sync::Arc;
//!
//! use tlsock::{Certificate, Config, TlsSocket, TrustPolicy};
//!
//! # fn main() -> Result<(), tlsock::Error> {
//! let root = Certificate::from_file("ca.pem")?;
//! let trust = TrustPolicy::with_roots(vec![root]).host("example.com");
//!
//! let config = Arc::new(Config::default());
//! let mut socket = TlsSocket::connect("example.com:443", config, trust)?;
//!
//! socket.write_all(b"GET / HTTP/1.0\r\n\r\n")?;
//! let mut response = Vec::new();
//! socket.read_to_end(&mut response)?;
//! socket.close();
//! # Ok(())
//! # }
//! ```
//!
//! # Scope
//!
//! TLS 1.3 only, with TLS_AES_128_GCM_SHA256 and TLS_AES_256_GCM_SHA384,
//! x25519, secp256r1 and secp384r1 key exchange, and ECDSA P-256/P-384
//! CertificateVerify signatures. Certificate chains may also be signed with
//! RSA PKCS#1 v1.5. There is no resumption, 0-RTT, PSK or renegotiation.
//!
//! # Cryptography
//!
//! All primitives go through a [`CryptoProvider`](crypto::CryptoProvider).
//! The default is built from RustCrypto crates; another provider can be set
//! per [`Config`] or installed process-wide with
//! [`CryptoProvider::install_default`](crypto::CryptoProvider::install_default).

#![forbid(unsafe_code)]
#![warn(clippy::all)]
#![allow(clippy::new_without_default)]

#[macro_use]
extern crate log;

mod buffer;
mod client;
mod engine;
mod error;
mod key;
mod message;
mod record;
mod server;
mod types;

pub mod certificate;
pub mod crypto;
pub mod session;
pub mod socket;
pub mod transport;
pub mod trust;
pub mod verify;

mod config;
pub use config::{Config, ConfigBuilder, MAX_FRAGMENT_LEN};

pub use buffer::Buf;
pub use certificate::{Certificate, DistinguishedName, SubjectAltName};
pub use error::{Error, ErrorKind};
pub use key::CertifiedKey;
pub use session::{Role, Session, SessionState};
pub use socket::TlsSocket;
pub use transport::{CloseHandle, MemoryTransport, Transport};
pub use trust::{Identity, TrustMode, TrustPolicy};
pub use types::{
    AlertDescription, CipherSuite, HashAlgorithm, NamedGroup, ProtocolVersion, SignatureAlgorithm,
    SignatureScheme,
};
pub use verify::{verify, VerificationStatus, VerifyError};

#[cfg(feature = "rcgen")]
pub use certificate::generate_self_signed;
