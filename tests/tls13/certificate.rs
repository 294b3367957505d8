use std::fs;
use std::path::PathBuf;

use der::pem::LineEnding;
use time::{Duration, OffsetDateTime};

use tlsock::{Certificate, CertifiedKey, Error, SubjectAltName, TrustPolicy};

use crate::common::*;

fn to_pem(cert: &Certificate) -> String {
    der::pem::encode_string("CERTIFICATE", LineEnding::LF, cert.der()).expect("pem")
}

fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("tlsock-{}-{}", std::process::id(), name))
}

#[test]
fn subject_and_issuer() {
    let _ = env_logger::try_init();

    let root = Authority::root("Test Root");
    let leaf = root.leaf(&["www.example.com", "10.0.0.1"]);
    let cert = leaf.certificate();

    assert_eq!(cert.subject().to_string(), "CN=www.example.com");
    assert_eq!(cert.issuer().to_string(), "O=tlsock tests, CN=Test Root");
    assert_eq!(cert.issuer().len(), 2);
    assert_eq!(cert.common_name(), Some("www.example.com"));
    assert!(!cert.is_self_issued());
    assert!(!cert.is_ca());

    assert_eq!(
        cert.subject_alternative_names(),
        &[
            SubjectAltName::Dns("www.example.com".to_string()),
            SubjectAltName::Ip("10.0.0.1".parse().unwrap()),
        ]
    );

    let root_cert = root.certificate();
    assert!(root_cert.is_ca());
    assert!(root_cert.is_self_issued());
    assert!(root_cert.may_sign_certificates());
    assert_eq!(root_cert.path_len_constraint(), None);
    assert!(!root_cert.serial_number().is_empty());
}

#[test]
fn validity_dates() {
    let _ = env_logger::try_init();

    let root = Authority::root("Test Root");
    let not_before = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();
    let not_after = not_before + Duration::days(90);
    let leaf = root.leaf_with(&["dates.test"], "dates.test", not_before, not_after);

    assert_eq!(leaf.certificate().not_before(), not_before);
    assert_eq!(leaf.certificate().not_after(), not_after);
}

#[test]
fn pem_chain_keeps_order() {
    let _ = env_logger::try_init();

    let root = Authority::root("Test Root");
    let leaf = root.leaf(&["chain.test"]);

    let pem = format!(
        "{}{}",
        to_pem(leaf.certificate()),
        to_pem(root.certificate())
    );

    let chain = Certificate::chain_from_pem(pem.as_bytes()).expect("chain");
    assert_eq!(chain.len(), 2);
    assert_eq!(&chain[0], leaf.certificate());
    assert_eq!(&chain[1], root.certificate());

    // A single PEM certificate parses on its own.
    let single = Certificate::from_pem(to_pem(root.certificate()).as_bytes()).expect("pem");
    assert_eq!(&single, root.certificate());

    // A policy can be loaded from the same bundle.
    let policy = TrustPolicy::from_pem(pem.as_bytes()).expect("policy");
    assert!(!policy.is_insecure());

    assert!(matches!(
        Certificate::chain_from_pem(b""),
        Err(Error::MalformedCertificate(_))
    ));
    assert!(matches!(
        TrustPolicy::from_pem(b"\n"),
        Err(Error::MalformedCertificate(_))
    ));
}

#[test]
fn load_from_files() {
    let _ = env_logger::try_init();

    let root = Authority::root("Test Root");
    let pem_path = temp_path("root.pem");
    let der_path = temp_path("root.der");

    fs::write(&pem_path, to_pem(root.certificate())).expect("write pem");
    fs::write(&der_path, root.certificate().der()).expect("write der");

    assert_eq!(&Certificate::from_file(&pem_path).expect("pem file"), root.certificate());
    assert_eq!(&Certificate::from_file(&der_path).expect("der file"), root.certificate());

    let missing = Certificate::from_file(temp_path("missing.pem")).unwrap_err();
    assert!(matches!(missing, Error::Transport(_)));

    let _ = fs::remove_file(pem_path);
    let _ = fs::remove_file(der_path);
}

#[test]
fn certified_key_from_pem_files() {
    let _ = env_logger::try_init();

    let mut params = rcgen::CertificateParams::new(vec!["files.test".to_string()]);
    params.alg = &rcgen::PKCS_ECDSA_P256_SHA256;
    let generated = rcgen::Certificate::from_params(params).expect("params");

    let cert_path = temp_path("key-cert.pem");
    let key_path = temp_path("key.pem");
    fs::write(&cert_path, generated.serialize_pem().expect("pem")).expect("write cert");
    fs::write(&key_path, generated.serialize_private_key_pem()).expect("write key");

    let key = CertifiedKey::from_files(&cert_path, &key_path, None).expect("certified key");
    assert!(key.certificate().matches_dns_name("files.test"));
    assert_eq!(key.chain().len(), 1);

    // A key belonging to another certificate is refused.
    let other = Authority::root("Test Root").leaf(&["other.test"]);
    let err = CertifiedKey::from_pem(
        to_pem(other.certificate()).as_bytes(),
        generated.serialize_private_key_pem().as_bytes(),
        None,
    )
    .unwrap_err();
    assert!(matches!(err, Error::InvalidKey(_)));

    let _ = fs::remove_file(cert_path);
    let _ = fs::remove_file(key_path);
}

#[test]
fn fingerprint_is_stable() {
    let _ = env_logger::try_init();

    let root = Authority::root("Test Root");
    let cert = root.certificate();
    let reparsed = Certificate::parse(cert.der()).expect("parse");
    assert_eq!(cert.fingerprint_sha256(), reparsed.fingerprint_sha256());
    assert_eq!(cert.fingerprint_str(), reparsed.fingerprint_str());
}
