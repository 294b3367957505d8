use std::net::IpAddr;

use rcgen::{
    Certificate as RcgenCertificate, CertificateParams, DistinguishedName, DnType, IsCa, KeyPair,
    SanType, PKCS_ECDSA_P256_SHA256,
};

use crate::{CertifiedKey, Error};

/// Generate a self-signed P-256 certificate and key for `names`.
///
/// Every name becomes a subject alternative name: an IP entry when it parses
/// as an address, a DNS entry otherwise. The first name is also the subject
/// commonName. Valid from now for one year.
pub fn generate_self_signed(names: &[&str]) -> Result<CertifiedKey, Error> {
    let first = names
        .first()
        .ok_or_else(|| Error::Config("At least one name is required".to_string()))?;

    let key_pair = KeyPair::generate(&PKCS_ECDSA_P256_SHA256)
        .map_err(|e| Error::Crypto(format!("Key generation failed: {}", e)))?;

    let mut params = CertificateParams::default();
    params.alg = &PKCS_ECDSA_P256_SHA256;
    params.subject_alt_names = names
        .iter()
        .map(|name| match name.parse::<IpAddr>() {
            Ok(ip) => SanType::IpAddress(ip),
            Err(_) => SanType::DnsName(name.to_string()),
        })
        .collect();

    let mut distinguished_name = DistinguishedName::new();
    distinguished_name.push(DnType::CommonName, first.to_string());
    params.distinguished_name = distinguished_name;

    params.is_ca = IsCa::NoCa;
    params.key_pair = Some(key_pair);

    let not_before = time::OffsetDateTime::now_utc() - time::Duration::minutes(1);
    params.not_before = not_before;
    params.not_after = not_before + time::Duration::days(365);

    let cert = RcgenCertificate::from_params(params)
        .map_err(|e| Error::Crypto(format!("Certificate generation failed: {}", e)))?;
    let cert_der = cert
        .serialize_der()
        .map_err(|e| Error::Crypto(format!("Certificate serialization failed: {}", e)))?;
    let key_der = cert.serialize_private_key_der();

    CertifiedKey::from_der(vec![cert_der], &key_der)
}
