//! Certificate chain and identity verification.

use der::asn1::ObjectIdentifier;
use thiserror::Error;

use crate::certificate::Certificate;
use crate::crypto::CryptoProvider;
use crate::trust::{Identity, TrustPolicy};
use crate::types::{HashAlgorithm, SignatureAlgorithm};

/// Why a peer certificate was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum VerifyError {
    /// No path to a trusted root, or a constraint on the path is violated.
    #[error("Certificate chain is not trusted")]
    UntrustedChain,
    /// A certificate on the path has expired.
    #[error("Certificate has expired")]
    Expired,
    /// A certificate on the path is not valid yet.
    #[error("Certificate is not yet valid")]
    NotYetValid,
    /// The leaf does not match the expected identity.
    #[error("Certificate does not match the expected identity")]
    IdentityMismatch,
}

/// Outcome of verifying a session's peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VerificationStatus {
    /// No peer certificate to verify.
    #[default]
    Unset,
    /// Peer certificate received, not verified yet.
    Pending,
    Valid,
    Invalid(VerifyError),
}

const SIGNATURE_ALGORITHMS: &[(&str, HashAlgorithm, SignatureAlgorithm)] = &[
    ("1.2.840.10045.4.3.2", HashAlgorithm::SHA256, SignatureAlgorithm::ECDSA),
    ("1.2.840.10045.4.3.3", HashAlgorithm::SHA384, SignatureAlgorithm::ECDSA),
    ("1.2.840.10045.4.3.4", HashAlgorithm::SHA512, SignatureAlgorithm::ECDSA),
    ("1.2.840.113549.1.1.11", HashAlgorithm::SHA256, SignatureAlgorithm::RSA_PKCS1),
    ("1.2.840.113549.1.1.12", HashAlgorithm::SHA384, SignatureAlgorithm::RSA_PKCS1),
    ("1.2.840.113549.1.1.13", HashAlgorithm::SHA512, SignatureAlgorithm::RSA_PKCS1),
];

/// Verify `certificate` against `policy`.
///
/// `intermediates` may be in any order and contain unrelated certificates.
/// When `expected` is `None` the identity is not checked. Uses the installed
/// default crypto provider, or the RustCrypto one.
pub fn verify(
    certificate: &Certificate,
    intermediates: &[Certificate],
    policy: &TrustPolicy,
    expected: Option<&Identity>,
) -> Result<(), VerifyError> {
    let provider = CryptoProvider::get_default_or_builtin();
    verify_with_provider(certificate, intermediates, policy, expected, &provider)
}

/// [`verify`] with an explicit crypto provider.
pub fn verify_with_provider(
    certificate: &Certificate,
    intermediates: &[Certificate],
    policy: &TrustPolicy,
    expected: Option<&Identity>,
    provider: &CryptoProvider,
) -> Result<(), VerifyError> {
    if policy.is_insecure() {
        warn!(
            "Skipping verification of peer certificate: {}",
            certificate.subject()
        );
        return Ok(());
    }

    let path = build_path(certificate, intermediates, policy, provider).ok_or_else(|| {
        debug!("No trusted path for {}", certificate.subject());
        VerifyError::UntrustedChain
    })?;

    if let Some(cert) = below_anchor(&path)
        .iter()
        .find(|cert| cert.has_unhandled_critical_extension())
    {
        debug!("{} carries an unhandled critical extension", cert.subject());
        return Err(VerifyError::UntrustedChain);
    }

    check_validity(&path, policy)?;

    if let Some(identity) = expected {
        if !matches_identity(certificate, identity) {
            debug!("{:?} does not match {}", identity, certificate.subject());
            return Err(VerifyError::IdentityMismatch);
        }
    }

    trace!("Verified path of {} certificates", path.len());
    Ok(())
}

// ============================================================================
// Path building
// ============================================================================

fn build_path<'a>(
    leaf: &'a Certificate,
    intermediates: &'a [Certificate],
    policy: &'a TrustPolicy,
    provider: &CryptoProvider,
) -> Option<Vec<&'a Certificate>> {
    let roots = policy.roots();

    if roots.contains(leaf) {
        return Some(vec![leaf]);
    }

    let mut path = vec![leaf];
    if extend_path(&mut path, intermediates, roots, policy.chain_depth_limit(), provider) {
        Some(path)
    } else {
        None
    }
}

/// Depth first search from the last certificate of `path` towards a root.
fn extend_path<'a>(
    path: &mut Vec<&'a Certificate>,
    intermediates: &'a [Certificate],
    roots: &'a [Certificate],
    max_depth: usize,
    provider: &CryptoProvider,
) -> bool {
    if path.len() >= max_depth {
        return false;
    }

    let Some(&child) = path.last() else {
        return false;
    };
    // Intermediates below the next issuer, leaf excluded.
    let below = path.len() - 1;

    for root in roots {
        if can_issue(child, root, below, provider) {
            path.push(root);
            return true;
        }
    }

    for candidate in intermediates {
        if path.contains(&candidate) || !can_issue(child, candidate, below, provider) {
            continue;
        }
        path.push(candidate);
        if extend_path(path, intermediates, roots, max_depth, provider) {
            return true;
        }
        path.pop();
    }

    false
}

fn can_issue(
    child: &Certificate,
    issuer: &Certificate,
    below: usize,
    provider: &CryptoProvider,
) -> bool {
    if !child.issued_by(issuer) {
        return false;
    }
    if !issuer.is_ca() || !issuer.may_sign_certificates() {
        trace!("{} may not issue certificates", issuer.subject());
        return false;
    }
    if let Some(limit) = issuer.path_len_constraint() {
        if below > limit as usize {
            trace!("pathLenConstraint of {} exceeded", issuer.subject());
            return false;
        }
    }
    check_signature(child, issuer, provider)
}

fn check_signature(child: &Certificate, issuer: &Certificate, provider: &CryptoProvider) -> bool {
    let Some((hash, alg)) = lookup_signature_algorithm(child.signature_algorithm()) else {
        debug!(
            "Unsupported certificate signature algorithm {}",
            child.signature_algorithm()
        );
        return false;
    };

    match provider.signature_verification.verify_signature(
        issuer.public_key_info(),
        child.tbs(),
        child.signature(),
        hash,
        alg,
    ) {
        Ok(()) => true,
        Err(e) => {
            trace!("Signature of {} rejected: {}", child.subject(), e);
            false
        }
    }
}

fn lookup_signature_algorithm(
    oid: &ObjectIdentifier,
) -> Option<(HashAlgorithm, SignatureAlgorithm)> {
    let dotted = oid.to_string();
    SIGNATURE_ALGORITHMS
        .iter()
        .find(|(o, _, _)| *o == dotted)
        .map(|(_, hash, alg)| (*hash, *alg))
}

// ============================================================================
// Validity and identity
// ============================================================================

/// The path without its trust anchor, unless the anchor is the leaf itself.
fn below_anchor<'a, 'p>(path: &'p [&'a Certificate]) -> &'p [&'a Certificate] {
    if path.len() > 1 {
        &path[..path.len() - 1]
    } else {
        path
    }
}

fn check_validity(path: &[&Certificate], policy: &TrustPolicy) -> Result<(), VerifyError> {
    let now = policy.now();

    for cert in below_anchor(path) {
        if now < cert.not_before() {
            return Err(VerifyError::NotYetValid);
        }
        if now > cert.not_after() {
            return Err(VerifyError::Expired);
        }
    }
    Ok(())
}

fn matches_hostname(cert: &Certificate, host: &str) -> bool {
    if cert.dns_names().next().is_some() {
        cert.matches_dns_name(host)
    } else {
        cert.matches_common_name(host)
    }
}

fn matches_identity(cert: &Certificate, identity: &Identity) -> bool {
    match identity {
        Identity::Hostname(host) => matches_hostname(cert, host),
        Identity::Service { domain, service } => {
            cert.matches_srv_name(domain, service) || matches_hostname(cert, domain)
        }
        Identity::Ip(ip) => cert.matches_ip_address(*ip),
    }
}
