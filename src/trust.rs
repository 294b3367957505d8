//! Trust policy: which roots to trust and which peer identity to expect.

use std::net::IpAddr;

use time::OffsetDateTime;

use crate::certificate::Certificate;
use crate::Error;

/// Longest accepted path, leaf and trust anchor included.
pub const DEFAULT_MAX_CHAIN_DEPTH: usize = 8;

/// How peer certificates are trusted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrustMode {
    /// Chains must end in one of these certificates.
    Roots(Vec<Certificate>),
    /// Accept any certificate. Verification always succeeds.
    InsecureSkipVerification,
}

/// The identity the peer certificate must prove.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    /// A host name, matched against DNS names (or the CN when there are none).
    Hostname(String),
    /// An SRV-ID. Falls back to the host name rule for `domain`.
    Service { domain: String, service: String },
    /// An IP address, matched against IP alternative names only.
    Ip(IpAddr),
}

impl Identity {
    /// `Ip` when `host` parses as an address, `Hostname` otherwise.
    pub fn from_host(host: &str) -> Identity {
        match host.parse::<IpAddr>() {
            Ok(ip) => Identity::Ip(ip),
            Err(_) => Identity::Hostname(host.to_string()),
        }
    }

    /// The name to send as server_name, if any.
    pub(crate) fn server_name(&self) -> Option<&str> {
        match self {
            Identity::Hostname(name) => Some(name),
            Identity::Service { domain, .. } => Some(domain),
            Identity::Ip(_) => None,
        }
    }
}

/// Roots, expected identity and client certificate policy of a session.
///
/// The default trusts no roots, so verification fails until roots are added.
/// Skipping verification requires [`TrustPolicy::insecure_skip_verification`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustPolicy {
    mode: TrustMode,
    identity: Option<Identity>,
    request_client_certificate: bool,
    require_client_certificate: bool,
    verification_time: Option<OffsetDateTime>,
    max_depth: usize,
}

impl Default for TrustPolicy {
    fn default() -> Self {
        TrustPolicy::with_roots(Vec::new())
    }
}

impl TrustPolicy {
    /// Trust chains ending in one of `roots`.
    pub fn with_roots(roots: Vec<Certificate>) -> Self {
        TrustPolicy {
            mode: TrustMode::Roots(roots),
            identity: None,
            request_client_certificate: false,
            require_client_certificate: false,
            verification_time: None,
            max_depth: DEFAULT_MAX_CHAIN_DEPTH,
        }
    }

    /// Trust the certificates of a PEM bundle.
    pub fn from_pem(pem: &[u8]) -> Result<Self, Error> {
        Ok(Self::with_roots(Certificate::chain_from_pem(pem)?))
    }

    /// Accept every peer certificate.
    pub fn insecure_skip_verification() -> Self {
        TrustPolicy {
            mode: TrustMode::InsecureSkipVerification,
            ..Self::default()
        }
    }

    /// Add a trusted root.
    pub fn add_root(&mut self, root: Certificate) {
        match &mut self.mode {
            TrustMode::Roots(roots) => roots.push(root),
            TrustMode::InsecureSkipVerification => {
                self.mode = TrustMode::Roots(vec![root]);
            }
        }
    }

    /// Expect the peer to prove `identity`.
    pub fn identity(mut self, identity: Identity) -> Self {
        self.identity = Some(identity);
        self
    }

    /// Shorthand for [`Identity::from_host`].
    pub fn host(self, host: &str) -> Self {
        self.identity(Identity::from_host(host))
    }

    /// Server: ask the client for a certificate.
    pub fn request_client_certificate(mut self, request: bool) -> Self {
        self.request_client_certificate = request;
        self
    }

    /// Server: fail the handshake when the client sends no certificate.
    ///
    /// Implies requesting one.
    pub fn require_client_certificate(mut self, require: bool) -> Self {
        self.require_client_certificate = require;
        self
    }

    /// Verify at a fixed time instead of the system clock.
    pub fn verification_time(mut self, time: OffsetDateTime) -> Self {
        self.verification_time = Some(time);
        self
    }

    /// Longest accepted chain, leaf and root included.
    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth.max(1);
        self
    }

    pub fn mode(&self) -> &TrustMode {
        &self.mode
    }

    pub fn expected_identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub fn is_insecure(&self) -> bool {
        self.mode == TrustMode::InsecureSkipVerification
    }

    pub(crate) fn roots(&self) -> &[Certificate] {
        match &self.mode {
            TrustMode::Roots(roots) => roots,
            TrustMode::InsecureSkipVerification => &[],
        }
    }

    /// Whether a server sends CertificateRequest.
    pub fn requests_client_certificate(&self) -> bool {
        self.request_client_certificate || self.require_client_certificate
    }

    pub fn requires_client_certificate(&self) -> bool {
        self.require_client_certificate
    }

    pub(crate) fn now(&self) -> OffsetDateTime {
        self.verification_time
            .unwrap_or_else(OffsetDateTime::now_utc)
    }

    pub(crate) fn chain_depth_limit(&self) -> usize {
        self.max_depth
    }
}
