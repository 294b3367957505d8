//! X.509 certificates and identity matching.
//!
//! A [`Certificate`] is parsed once from DER and keeps the original bytes.
//! Everything the verifier and the identity predicates need (names,
//! alternative names, validity, constraints, signature) is decoded up front,
//! so all accessors are cheap pure reads.

use std::fmt;
use std::net::IpAddr;
use std::path::Path;

use der::asn1::ObjectIdentifier;
use der::{Decode, DecodePem, Encode, Tag, Tagged};
use sha2::{Digest, Sha256};
use time::OffsetDateTime;
use x509_cert::ext::pkix::name::GeneralName;
use x509_cert::ext::pkix::{BasicConstraints, KeyUsage, SubjectAltName as SanExtension};
use x509_cert::time::Time;
use x509_cert::Certificate as X509Certificate;

use crate::Error;

mod matching;
mod name;

#[cfg(feature = "rcgen")]
mod generate;

#[cfg(feature = "rcgen")]
pub use generate::generate_self_signed;

pub use name::{DistinguishedName, NameAttribute};

pub(crate) use matching::dns_name_matches;

const OID_SUBJECT_ALT_NAME: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.29.17");
const OID_BASIC_CONSTRAINTS: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.29.19");
const OID_KEY_USAGE: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.29.15");

/// otherName type of an SRV-ID (RFC 4985).
pub const OID_SRV_NAME: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.6.1.5.5.7.8.7");

/// One entry of the subject alternative name extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubjectAltName {
    /// dNSName, possibly wildcarded.
    Dns(String),
    /// SRV-ID otherName, `_service.domain`.
    Srv(String),
    /// iPAddress.
    Ip(IpAddr),
    /// rfc822Name.
    Email(String),
    /// uniformResourceIdentifier.
    Uri(String),
    /// directoryName.
    DirectoryName(DistinguishedName),
    /// Any other name type. `value` is the DER encoding of the entry.
    Other { oid: Option<ObjectIdentifier>, value: Vec<u8> },
}

/// A parsed X.509 certificate.
///
/// Equality is defined by the DER encoding.
#[derive(Clone)]
pub struct Certificate {
    der: Vec<u8>,
    serial: Vec<u8>,
    subject: DistinguishedName,
    issuer: DistinguishedName,
    subject_der: Vec<u8>,
    issuer_der: Vec<u8>,
    alt_names: Vec<SubjectAltName>,
    not_before: OffsetDateTime,
    not_after: OffsetDateTime,
    is_ca: bool,
    path_len: Option<u8>,
    key_cert_sign: Option<bool>,
    unhandled_critical: bool,
    signature_algorithm: ObjectIdentifier,
    signature: Vec<u8>,
    tbs: Vec<u8>,
    spki: Vec<u8>,
    public_key: Vec<u8>,
}

impl Certificate {
    /// Parse a DER encoded certificate.
    pub fn parse(der: &[u8]) -> Result<Certificate, Error> {
        let cert = X509Certificate::from_der(der).map_err(malformed)?;
        Self::from_x509(&cert, der.to_vec())
    }

    /// Parse the first certificate of a PEM document.
    pub fn from_pem(pem: &[u8]) -> Result<Certificate, Error> {
        let cert = X509Certificate::from_pem(pem).map_err(malformed)?;
        let der = cert.to_der().map_err(malformed)?;
        Self::from_x509(&cert, der)
    }

    /// Parse every certificate of a PEM document, in order.
    pub fn chain_from_pem(pem: &[u8]) -> Result<Vec<Certificate>, Error> {
        // load_pem_chain does not cope with input that is empty once
        // trailing newlines are stripped.
        let chain = if is_pem(pem) {
            X509Certificate::load_pem_chain(pem).map_err(malformed)?
        } else {
            Vec::new()
        };
        if chain.is_empty() {
            return Err(Error::MalformedCertificate(
                "No certificate in PEM input".to_string(),
            ));
        }
        chain
            .iter()
            .map(|cert| {
                let der = cert.to_der().map_err(malformed)?;
                Self::from_x509(cert, der)
            })
            .collect()
    }

    /// Read a certificate from a file holding either PEM or DER.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Certificate, Error> {
        let data = std::fs::read(path)?;
        if is_pem(&data) {
            Self::from_pem(&data)
        } else {
            Self::parse(&data)
        }
    }

    fn from_x509(cert: &X509Certificate, der: Vec<u8>) -> Result<Certificate, Error> {
        let tbs = &cert.tbs_certificate;

        let mut alt_names = Vec::new();
        let mut is_ca = false;
        let mut path_len = None;
        let mut key_cert_sign = None;
        let mut unhandled_critical = false;

        for ext in tbs.extensions.iter().flatten() {
            let value = ext.extn_value.as_bytes();
            if ext.extn_id == OID_SUBJECT_ALT_NAME {
                let san = SanExtension::from_der(value).map_err(malformed)?;
                for name in &san.0 {
                    alt_names.push(convert_general_name(name)?);
                }
            } else if ext.extn_id == OID_BASIC_CONSTRAINTS {
                let bc = BasicConstraints::from_der(value).map_err(malformed)?;
                is_ca = bc.ca;
                path_len = bc.path_len_constraint;
            } else if ext.extn_id == OID_KEY_USAGE {
                let ku = KeyUsage::from_der(value).map_err(malformed)?;
                key_cert_sign = Some(ku.key_cert_sign());
            } else if ext.critical {
                debug!("Unhandled critical extension {}", ext.extn_id);
                unhandled_critical = true;
            }
        }

        let signature = cert
            .signature
            .as_bytes()
            .ok_or_else(|| Error::MalformedCertificate("Signature has unused bits".to_string()))?
            .to_vec();

        let public_key = tbs
            .subject_public_key_info
            .subject_public_key
            .as_bytes()
            .ok_or_else(|| Error::MalformedCertificate("Public key has unused bits".to_string()))?
            .to_vec();

        Ok(Certificate {
            serial: tbs.serial_number.as_bytes().to_vec(),
            subject: DistinguishedName::from_name(&tbs.subject),
            issuer: DistinguishedName::from_name(&tbs.issuer),
            subject_der: tbs.subject.to_der().map_err(malformed)?,
            issuer_der: tbs.issuer.to_der().map_err(malformed)?,
            alt_names,
            not_before: convert_time(&tbs.validity.not_before)?,
            not_after: convert_time(&tbs.validity.not_after)?,
            is_ca,
            path_len,
            key_cert_sign,
            unhandled_critical,
            signature_algorithm: cert.signature_algorithm.oid,
            signature,
            tbs: tbs.to_der().map_err(malformed)?,
            spki: tbs.subject_public_key_info.to_der().map_err(malformed)?,
            public_key,
            der,
        })
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn der(&self) -> &[u8] {
        &self.der
    }

    /// Serial number, big-endian as encoded.
    pub fn serial_number(&self) -> &[u8] {
        &self.serial
    }

    pub fn subject(&self) -> &DistinguishedName {
        &self.subject
    }

    pub fn issuer(&self) -> &DistinguishedName {
        &self.issuer
    }

    pub fn subject_alternative_names(&self) -> &[SubjectAltName] {
        &self.alt_names
    }

    /// The first commonName of the subject.
    pub fn common_name(&self) -> Option<&str> {
        self.subject.common_names().next()
    }

    pub fn not_before(&self) -> OffsetDateTime {
        self.not_before
    }

    pub fn not_after(&self) -> OffsetDateTime {
        self.not_after
    }

    /// Whether the basic constraints extension marks this as a CA.
    pub fn is_ca(&self) -> bool {
        self.is_ca
    }

    /// The pathLenConstraint of the basic constraints extension.
    pub fn path_len_constraint(&self) -> Option<u8> {
        self.path_len
    }

    /// Whether the key may sign certificates.
    ///
    /// True when the key usage extension is absent.
    pub fn may_sign_certificates(&self) -> bool {
        self.key_cert_sign.unwrap_or(true)
    }

    /// Whether a critical extension was present that this crate does not
    /// process. Such a certificate is never accepted by the verifier.
    pub fn has_unhandled_critical_extension(&self) -> bool {
        self.unhandled_critical
    }

    /// Whether the certificate is self-issued (subject equals issuer).
    pub fn is_self_issued(&self) -> bool {
        self.subject_der == self.issuer_der
    }

    /// DER encoded SubjectPublicKeyInfo.
    pub fn public_key_info(&self) -> &[u8] {
        &self.spki
    }

    /// The subject public key bits (an SEC1 point for EC keys).
    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }

    pub(crate) fn issued_by(&self, issuer: &Certificate) -> bool {
        self.issuer_der == issuer.subject_der
    }

    pub(crate) fn signature_algorithm(&self) -> &ObjectIdentifier {
        &self.signature_algorithm
    }

    pub(crate) fn signature(&self) -> &[u8] {
        &self.signature
    }

    pub(crate) fn tbs(&self) -> &[u8] {
        &self.tbs
    }

    /// SHA-256 over the DER encoding.
    pub fn fingerprint_sha256(&self) -> [u8; 32] {
        Sha256::digest(&self.der).into()
    }

    /// The SHA-256 fingerprint as colon separated uppercase hex, "AF:12:F6:...".
    pub fn fingerprint_str(&self) -> String {
        self.fingerprint_sha256()
            .iter()
            .map(|byte| format!("{:02X}", byte))
            .collect::<Vec<String>>()
            .join(":")
    }

    // ========================================================================
    // Identity predicates
    // ========================================================================

    /// Match `domain` against every commonName of the subject.
    pub fn matches_common_name(&self, domain: &str) -> bool {
        self.subject
            .common_names()
            .any(|cn| dns_name_matches(cn, domain))
    }

    /// Match `domain` against the DNS entries of the alternative names.
    pub fn matches_dns_name(&self, domain: &str) -> bool {
        self.dns_names().any(|name| dns_name_matches(name, domain))
    }

    /// Match `_service.domain` against the SRV entries of the alternative names.
    pub fn matches_srv_name(&self, domain: &str, service: &str) -> bool {
        self.alt_names.iter().any(|san| match san {
            SubjectAltName::Srv(name) => matching::srv_name_matches(name, domain, service),
            _ => false,
        })
    }

    /// Match `ip` against the IP entries of the alternative names.
    pub fn matches_ip_address(&self, ip: IpAddr) -> bool {
        self.alt_names
            .iter()
            .any(|san| matches!(san, SubjectAltName::Ip(addr) if *addr == ip))
    }

    pub(crate) fn dns_names(&self) -> impl Iterator<Item = &str> {
        self.alt_names.iter().filter_map(|san| match san {
            SubjectAltName::Dns(name) => Some(name.as_str()),
            _ => None,
        })
    }
}

impl PartialEq for Certificate {
    fn eq(&self, other: &Self) -> bool {
        self.der == other.der
    }
}

impl Eq for Certificate {}

impl fmt::Debug for Certificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Certificate")
            .field("subject", &self.subject.to_string())
            .field("issuer", &self.issuer.to_string())
            .field("not_after", &self.not_after)
            .finish()
    }
}

pub(crate) fn is_pem(data: &[u8]) -> bool {
    let start = data
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(data.len());
    data[start..].starts_with(b"-----BEGIN")
}

fn malformed(e: der::Error) -> Error {
    Error::MalformedCertificate(e.to_string())
}

fn convert_time(time: &Time) -> Result<OffsetDateTime, Error> {
    let secs = time.to_unix_duration().as_secs();
    OffsetDateTime::from_unix_timestamp(secs as i64)
        .map_err(|e| Error::MalformedCertificate(e.to_string()))
}

fn convert_general_name(name: &GeneralName) -> Result<SubjectAltName, Error> {
    let san = match name {
        GeneralName::DnsName(s) => SubjectAltName::Dns(s.to_string()),
        GeneralName::Rfc822Name(s) => SubjectAltName::Email(s.to_string()),
        GeneralName::UniformResourceIdentifier(s) => SubjectAltName::Uri(s.to_string()),
        GeneralName::DirectoryName(n) => {
            SubjectAltName::DirectoryName(DistinguishedName::from_name(n))
        }
        GeneralName::IpAddress(octets) => match octets.as_bytes() {
            b if b.len() == 4 => {
                let mut v4 = [0u8; 4];
                v4.copy_from_slice(b);
                SubjectAltName::Ip(IpAddr::from(v4))
            }
            b if b.len() == 16 => {
                let mut v6 = [0u8; 16];
                v6.copy_from_slice(b);
                SubjectAltName::Ip(IpAddr::from(v6))
            }
            _ => {
                return Err(Error::MalformedCertificate(
                    "iPAddress must be 4 or 16 bytes".to_string(),
                ))
            }
        },
        GeneralName::OtherName(other)
            if other.type_id == OID_SRV_NAME && other.value.tag() == Tag::Ia5String =>
        {
            let value = std::str::from_utf8(other.value.value())
                .map_err(|e| Error::MalformedCertificate(e.to_string()))?;
            SubjectAltName::Srv(value.to_string())
        }
        GeneralName::OtherName(other) => SubjectAltName::Other {
            oid: Some(other.type_id),
            value: other.value.to_der().map_err(malformed)?,
        },
        other => SubjectAltName::Other {
            oid: None,
            value: other.to_der().map_err(malformed)?,
        },
    };
    Ok(san)
}
