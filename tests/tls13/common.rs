//! Shared helpers for TLS 1.3 integration tests.

#![allow(unused)]

use std::net::IpAddr;
use std::sync::Arc;
use std::thread;

use rcgen::{
    BasicConstraints, CertificateParams, DnType, IsCa, KeyUsagePurpose, SanType,
    PKCS_ECDSA_P256_SHA256,
};
use time::{Duration, OffsetDateTime};

use tlsock::{
    Certificate, CertifiedKey, Config, Error, MemoryTransport, Session, TrustPolicy,
};

/// A certificate authority able to issue CA and leaf certificates.
pub struct Authority {
    rcgen: rcgen::Certificate,
    certificate: Certificate,
}

impl Authority {
    /// A self-signed root.
    pub fn root(name: &str) -> Authority {
        Self::root_with(name, BasicConstraints::Unconstrained)
    }

    pub fn root_with(name: &str, constraints: BasicConstraints) -> Authority {
        let params = ca_params(name, constraints);
        let rcgen = rcgen::Certificate::from_params(params).expect("root params");
        let der = rcgen.serialize_der().expect("serialize root");
        let certificate = Certificate::parse(&der).expect("parse root");
        Authority { rcgen, certificate }
    }

    /// An intermediate CA issued by this authority.
    pub fn intermediate(&self, name: &str, constraints: BasicConstraints) -> Authority {
        self.issuer(name, IsCa::Ca(constraints), ca_key_usages())
    }

    /// A certificate issued by this authority, usable to sign others
    /// whatever its constraints say.
    pub fn issuer(
        &self,
        name: &str,
        is_ca: IsCa,
        key_usages: Vec<KeyUsagePurpose>,
    ) -> Authority {
        let mut params = ca_params(name, BasicConstraints::Unconstrained);
        params.is_ca = is_ca;
        params.key_usages = key_usages;
        self.sign_issuer(params)
    }

    /// Issue a CA certificate from prepared parameters.
    pub fn sign_issuer(&self, params: CertificateParams) -> Authority {
        let rcgen = rcgen::Certificate::from_params(params).expect("issuer params");
        let der = rcgen
            .serialize_der_with_signer(&self.rcgen)
            .expect("sign intermediate");
        let certificate = Certificate::parse(&der).expect("parse intermediate");
        Authority { rcgen, certificate }
    }

    pub fn certificate(&self) -> &Certificate {
        &self.certificate
    }

    /// A leaf for `names` (DNS or IP), valid from a minute ago for a year.
    pub fn leaf(&self, names: &[&str]) -> CertifiedKey {
        let common_name = names.first().copied().unwrap_or("leaf");
        self.sign_leaf(current_leaf_params(names, common_name))
    }

    /// A leaf with explicit common name and validity window.
    pub fn leaf_with(
        &self,
        names: &[&str],
        common_name: &str,
        not_before: OffsetDateTime,
        not_after: OffsetDateTime,
    ) -> CertifiedKey {
        self.sign_leaf(leaf_params(names, common_name, not_before, not_after))
    }

    /// Issue a leaf from prepared parameters.
    pub fn sign_leaf(&self, params: CertificateParams) -> CertifiedKey {
        let leaf = rcgen::Certificate::from_params(params).expect("leaf params");
        let der = leaf
            .serialize_der_with_signer(&self.rcgen)
            .expect("sign leaf");
        let key = leaf.serialize_private_key_der();

        CertifiedKey::from_der(vec![der], &key).expect("certified key")
    }
}

/// Parameters of a P-256 end-entity certificate.
pub fn leaf_params(
    names: &[&str],
    common_name: &str,
    not_before: OffsetDateTime,
    not_after: OffsetDateTime,
) -> CertificateParams {
    let mut params = CertificateParams::default();
    params.alg = &PKCS_ECDSA_P256_SHA256;
    params.subject_alt_names = names.iter().map(|n| san(n)).collect();
    params.distinguished_name = rcgen::DistinguishedName::new();
    params
        .distinguished_name
        .push(DnType::CommonName, common_name.to_string());
    params.is_ca = IsCa::NoCa;
    params.not_before = not_before;
    params.not_after = not_after;
    params
}

/// Parameters valid from a minute ago for a year.
pub fn current_leaf_params(names: &[&str], common_name: &str) -> CertificateParams {
    let now = OffsetDateTime::now_utc();
    leaf_params(
        names,
        common_name,
        now - Duration::minutes(1),
        now + Duration::days(365),
    )
}

pub fn ca_params(name: &str, constraints: BasicConstraints) -> CertificateParams {
    let mut params = CertificateParams::default();
    params.alg = &PKCS_ECDSA_P256_SHA256;
    params.distinguished_name = rcgen::DistinguishedName::new();
    params
        .distinguished_name
        .push(DnType::OrganizationName, "tlsock tests");
    params.distinguished_name.push(DnType::CommonName, name);
    params.is_ca = IsCa::Ca(constraints);
    params.key_usages = ca_key_usages();
    params
}

pub fn ca_key_usages() -> Vec<KeyUsagePurpose> {
    vec![
        KeyUsagePurpose::KeyCertSign,
        KeyUsagePurpose::CrlSign,
        KeyUsagePurpose::DigitalSignature,
    ]
}

fn san(name: &str) -> SanType {
    match name.parse::<IpAddr>() {
        Ok(ip) => SanType::IpAddress(ip),
        Err(_) => SanType::DnsName(name.to_string()),
    }
}

pub fn config() -> Arc<Config> {
    Arc::new(Config::default())
}

/// Client and server sessions over an in-memory pair.
pub fn sessions(
    client_config: Arc<Config>,
    client_trust: TrustPolicy,
    client_key: Option<CertifiedKey>,
    server_config: Arc<Config>,
    server_trust: TrustPolicy,
    server_key: CertifiedKey,
) -> (Session<MemoryTransport>, Session<MemoryTransport>) {
    let (a, b) = MemoryTransport::pair();
    let client = Session::client(a, client_config, client_trust, client_key);
    let server = Session::server(b, server_config, server_trust, server_key);
    (client, server)
}

pub struct Outcome {
    pub client: Session<MemoryTransport>,
    pub server: Session<MemoryTransport>,
    pub client_result: Result<(), Error>,
    pub server_result: Result<(), Error>,
}

/// Run both handshakes, the server on its own thread.
pub fn handshake(
    mut client: Session<MemoryTransport>,
    mut server: Session<MemoryTransport>,
) -> Outcome {
    let server_thread = thread::spawn(move || {
        let result = server.start_handshake();
        (server, result)
    });

    let client_result = client.start_handshake();
    if client_result.is_err() {
        // Unblock a server still waiting for our flight.
        client.close();
    }

    let (server, server_result) = server_thread.join().expect("server thread");
    Outcome {
        client,
        server,
        client_result,
        server_result,
    }
}

/// Established client and server, the server trusting nothing and the
/// client trusting `authority` for "localhost".
pub fn established(authority: &Authority) -> (Session<MemoryTransport>, Session<MemoryTransport>) {
    let trust = TrustPolicy::with_roots(vec![authority.certificate().clone()]).host("localhost");
    let (client, server) = sessions(
        config(),
        trust,
        None,
        config(),
        TrustPolicy::default(),
        authority.leaf(&["localhost"]),
    );

    let outcome = handshake(client, server);
    outcome.client_result.expect("client handshake");
    outcome.server_result.expect("server handshake");
    (outcome.client, outcome.server)
}

/// Read until `n` bytes arrived.
pub fn read_exact(session: &mut Session<MemoryTransport>, n: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(n);
    let mut buf = vec![0u8; 4096];
    while out.len() < n {
        let read = session.read(&mut buf).expect("read");
        assert!(read > 0, "unexpected close after {} bytes", out.len());
        out.extend_from_slice(&buf[..read]);
    }
    out
}
