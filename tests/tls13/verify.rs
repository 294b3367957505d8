use der::asn1::Any;
use der::{Encode, Tag};
use rcgen::{BasicConstraints, CustomExtension, IsCa, KeyUsagePurpose};
use time::{Duration, OffsetDateTime};
use x509_cert::ext::pkix::name::{GeneralName, OtherName};
use x509_cert::ext::pkix::SubjectAltName as SanExtension;

use tlsock::certificate::OID_SRV_NAME;
use tlsock::{
    generate_self_signed, verify, Identity, SubjectAltName, TrustPolicy, VerifyError,
};

use crate::common::*;

fn host(name: &str) -> Identity {
    Identity::Hostname(name.to_string())
}

fn critical_extension() -> CustomExtension {
    // Private enterprise arc, DER NULL as content.
    let mut ext = CustomExtension::from_oid_content(&[1, 3, 6, 1, 4, 1, 99999, 1], vec![0x05, 0x00]);
    ext.set_criticality(true);
    ext
}

/// A subjectAltName extension holding SRV-ID otherNames.
fn srv_alt_names(names: &[&str]) -> CustomExtension {
    let san = SanExtension(
        names
            .iter()
            .map(|name| {
                GeneralName::OtherName(OtherName {
                    type_id: OID_SRV_NAME,
                    value: Any::new(Tag::Ia5String, name.as_bytes()).expect("ia5"),
                })
            })
            .collect(),
    );
    CustomExtension::from_oid_content(&[2, 5, 29, 17], san.to_der().expect("san der"))
}

#[test]
fn chain_through_intermediate() {
    let _ = env_logger::try_init();

    let root = Authority::root("Test Root");
    let intermediate = root.intermediate("Test Intermediate", BasicConstraints::Unconstrained);
    let leaf = intermediate.leaf(&["www.example.com"]);

    let policy = TrustPolicy::with_roots(vec![root.certificate().clone()]);
    let chain = [intermediate.certificate().clone()];

    assert_eq!(
        verify(leaf.certificate(), &chain, &policy, Some(&host("www.example.com"))),
        Ok(())
    );

    // Without the intermediate there is no path.
    assert_eq!(
        verify(leaf.certificate(), &[], &policy, None),
        Err(VerifyError::UntrustedChain)
    );

    // Unrelated certificates among the intermediates are skipped.
    let other = Authority::root("Other Root");
    let noisy = [other.certificate().clone(), intermediate.certificate().clone()];
    assert_eq!(verify(leaf.certificate(), &noisy, &policy, None), Ok(()));
}

#[test]
fn wrong_root_is_untrusted() {
    let _ = env_logger::try_init();

    let root = Authority::root("Test Root");
    let impostor = Authority::root("Test Root");
    let leaf = root.leaf(&["www.example.com"]);

    // Same subject name, different key: the signature check fails.
    let policy = TrustPolicy::with_roots(vec![impostor.certificate().clone()]);
    assert_eq!(
        verify(leaf.certificate(), &[], &policy, None),
        Err(VerifyError::UntrustedChain)
    );

    // The empty default trusts nothing.
    assert_eq!(
        verify(leaf.certificate(), &[], &TrustPolicy::default(), None),
        Err(VerifyError::UntrustedChain)
    );
}

#[test]
fn path_length_constraint() {
    let _ = env_logger::try_init();

    let root = Authority::root_with("Strict Root", BasicConstraints::Constrained(0));
    let policy = TrustPolicy::with_roots(vec![root.certificate().clone()]);

    // Directly issued leaves are fine.
    let direct = root.leaf(&["direct.test"]);
    assert_eq!(verify(direct.certificate(), &[], &policy, None), Ok(()));

    // One intermediate below a pathLen 0 root is one too many.
    let intermediate = root.intermediate("Sub CA", BasicConstraints::Unconstrained);
    let leaf = intermediate.leaf(&["deep.test"]);
    assert_eq!(
        verify(
            leaf.certificate(),
            &[intermediate.certificate().clone()],
            &policy,
            None
        ),
        Err(VerifyError::UntrustedChain)
    );
}

#[test]
fn maximum_depth() {
    let _ = env_logger::try_init();

    let root = Authority::root("Test Root");
    let first = root.intermediate("First", BasicConstraints::Unconstrained);
    let second = first.intermediate("Second", BasicConstraints::Unconstrained);
    let leaf = second.leaf(&["deep.test"]);
    let chain = [first.certificate().clone(), second.certificate().clone()];

    // leaf, second, first, root
    let policy = TrustPolicy::with_roots(vec![root.certificate().clone()]);
    assert_eq!(verify(leaf.certificate(), &chain, &policy, None), Ok(()));

    let shallow = policy.clone().max_depth(4);
    assert_eq!(verify(leaf.certificate(), &chain, &shallow, None), Ok(()));

    let too_shallow = policy.max_depth(3);
    assert_eq!(
        verify(leaf.certificate(), &chain, &too_shallow, None),
        Err(VerifyError::UntrustedChain)
    );
}

#[test]
fn issuer_must_be_a_ca() {
    let _ = env_logger::try_init();

    let root = Authority::root("Test Root");
    let policy = TrustPolicy::with_roots(vec![root.certificate().clone()]);

    let not_ca = root.issuer("Not A CA", IsCa::NoCa, vec![]);
    let leaf = not_ca.leaf(&["leaf.test"]);

    // Fine as a leaf, not as an issuer.
    assert_eq!(verify(not_ca.certificate(), &[], &policy, None), Ok(()));
    assert_eq!(
        verify(
            leaf.certificate(),
            &[not_ca.certificate().clone()],
            &policy,
            None
        ),
        Err(VerifyError::UntrustedChain)
    );
}

#[test]
fn issuer_needs_key_cert_sign() {
    let _ = env_logger::try_init();

    let root = Authority::root("Test Root");
    let policy = TrustPolicy::with_roots(vec![root.certificate().clone()]);

    let signing_only = root.issuer(
        "Signing Only",
        IsCa::Ca(BasicConstraints::Unconstrained),
        vec![KeyUsagePurpose::DigitalSignature],
    );
    let leaf = signing_only.leaf(&["leaf.test"]);
    assert_eq!(
        verify(
            leaf.certificate(),
            &[signing_only.certificate().clone()],
            &policy,
            None
        ),
        Err(VerifyError::UntrustedChain)
    );
}

#[test]
fn validity_window() {
    let _ = env_logger::try_init();

    let root = Authority::root("Test Root");
    let leaf = root.leaf(&["www.example.com"]);
    let policy = TrustPolicy::with_roots(vec![root.certificate().clone()]);
    let now = OffsetDateTime::now_utc();

    let future = policy.clone().verification_time(now + Duration::days(400));
    assert_eq!(
        verify(leaf.certificate(), &[], &future, None),
        Err(VerifyError::Expired)
    );

    let past = policy.clone().verification_time(now - Duration::days(2));
    assert_eq!(
        verify(leaf.certificate(), &[], &past, None),
        Err(VerifyError::NotYetValid)
    );

    let expired = root.leaf_with(
        &["old.example.com"],
        "old.example.com",
        now - Duration::days(30),
        now - Duration::days(1),
    );
    assert_eq!(
        verify(expired.certificate(), &[], &policy, None),
        Err(VerifyError::Expired)
    );

    // An expired certificate is reported as such whatever the identity.
    assert_eq!(
        verify(
            expired.certificate(),
            &[],
            &policy,
            Some(&host("unrelated.example.net"))
        ),
        Err(VerifyError::Expired)
    );

    // Trust is decided before the validity window.
    let untrusted = Authority::root("Other Root").leaf_with(
        &["old.example.com"],
        "old.example.com",
        now - Duration::days(30),
        now - Duration::days(1),
    );
    assert_eq!(
        verify(untrusted.certificate(), &[], &policy, None),
        Err(VerifyError::UntrustedChain)
    );
}

#[test]
fn hostname_identity() {
    let _ = env_logger::try_init();

    let root = Authority::root("Test Root");
    let policy = TrustPolicy::with_roots(vec![root.certificate().clone()]);
    let now = OffsetDateTime::now_utc();

    let leaf = root.leaf_with(
        &["*.example.com", "example.org"],
        "cn.example.net",
        now - Duration::minutes(1),
        now + Duration::days(1),
    );
    let cert = leaf.certificate();

    assert_eq!(verify(cert, &[], &policy, Some(&host("a.example.com"))), Ok(()));
    assert_eq!(verify(cert, &[], &policy, Some(&host("EXAMPLE.ORG."))), Ok(()));
    assert_eq!(
        verify(cert, &[], &policy, Some(&host("a.b.example.com"))),
        Err(VerifyError::IdentityMismatch)
    );
    assert_eq!(
        verify(cert, &[], &policy, Some(&host("example.com"))),
        Err(VerifyError::IdentityMismatch)
    );
    // With DNS names present the CN is ignored.
    assert_eq!(
        verify(cert, &[], &policy, Some(&host("cn.example.net"))),
        Err(VerifyError::IdentityMismatch)
    );

    // Without DNS names the CN is used.
    let cn_only = root.leaf_with(
        &[],
        "legacy.example.com",
        now - Duration::minutes(1),
        now + Duration::days(1),
    );
    assert_eq!(
        verify(
            cn_only.certificate(),
            &[],
            &policy,
            Some(&host("legacy.example.com"))
        ),
        Ok(())
    );
}

#[test]
fn service_identity_falls_back_to_domain() {
    let _ = env_logger::try_init();

    let root = Authority::root("Test Root");
    let policy = TrustPolicy::with_roots(vec![root.certificate().clone()]);
    let leaf = root.leaf(&["chat.example.com"]);

    let service = Identity::Service {
        domain: "chat.example.com".to_string(),
        service: "xmpp-client".to_string(),
    };
    assert_eq!(verify(leaf.certificate(), &[], &policy, Some(&service)), Ok(()));

    let other = Identity::Service {
        domain: "example.com".to_string(),
        service: "xmpp-client".to_string(),
    };
    assert_eq!(
        verify(leaf.certificate(), &[], &policy, Some(&other)),
        Err(VerifyError::IdentityMismatch)
    );
}

#[test]
fn ip_identity() {
    let _ = env_logger::try_init();

    let root = Authority::root("Test Root");
    let policy = TrustPolicy::with_roots(vec![root.certificate().clone()]);
    let leaf = root.leaf(&["192.0.2.10", "2001:db8::1"]);
    let cert = leaf.certificate();

    let v4 = Identity::from_host("192.0.2.10");
    assert_eq!(v4, Identity::Ip("192.0.2.10".parse().unwrap()));
    assert_eq!(verify(cert, &[], &policy, Some(&v4)), Ok(()));

    let v6 = Identity::Ip("2001:db8::1".parse().unwrap());
    assert_eq!(verify(cert, &[], &policy, Some(&v6)), Ok(()));

    let wrong = Identity::Ip("192.0.2.11".parse().unwrap());
    assert_eq!(
        verify(cert, &[], &policy, Some(&wrong)),
        Err(VerifyError::IdentityMismatch)
    );

    // An address in the CN does not count.
    let now = OffsetDateTime::now_utc();
    let cn_only = root.leaf_with(
        &[],
        "192.0.2.10",
        now - Duration::minutes(1),
        now + Duration::days(1),
    );
    assert_eq!(
        verify(cn_only.certificate(), &[], &policy, Some(&v4)),
        Err(VerifyError::IdentityMismatch)
    );
}

#[test]
fn insecure_policy_accepts_anything() {
    let _ = env_logger::try_init();

    let key = generate_self_signed(&["whatever.test"]).expect("generate");
    let policy = TrustPolicy::insecure_skip_verification();
    assert!(policy.is_insecure());
    assert_eq!(
        verify(key.certificate(), &[], &policy, Some(&host("elsewhere.test"))),
        Ok(())
    );
}

#[test]
fn unhandled_critical_extension_is_rejected() {
    let _ = env_logger::try_init();

    let root = Authority::root("Test Root");
    let policy = TrustPolicy::with_roots(vec![root.certificate().clone()]);

    let mut params = current_leaf_params(&["critical.test"], "critical.test");
    params.custom_extensions.push(critical_extension());
    let leaf = root.sign_leaf(params);
    assert!(leaf.certificate().has_unhandled_critical_extension());
    assert_eq!(
        verify(leaf.certificate(), &[], &policy, None),
        Err(VerifyError::UntrustedChain)
    );

    // The same extension marked non-critical is ignored.
    let mut params = current_leaf_params(&["plain.test"], "plain.test");
    let mut ext = critical_extension();
    ext.set_criticality(false);
    params.custom_extensions.push(ext);
    let leaf = root.sign_leaf(params);
    assert!(!leaf.certificate().has_unhandled_critical_extension());
    assert_eq!(verify(leaf.certificate(), &[], &policy, None), Ok(()));

    // An intermediate carrying one taints the whole path.
    let mut params = ca_params("Critical Sub CA", BasicConstraints::Unconstrained);
    params.custom_extensions.push(critical_extension());
    let intermediate = root.sign_issuer(params);
    let leaf = intermediate.leaf(&["below.test"]);
    assert_eq!(
        verify(
            leaf.certificate(),
            &[intermediate.certificate().clone()],
            &policy,
            None
        ),
        Err(VerifyError::UntrustedChain)
    );
}

#[test]
fn service_identity_from_srv_name() {
    let _ = env_logger::try_init();

    let root = Authority::root("Test Root");
    let policy = TrustPolicy::with_roots(vec![root.certificate().clone()]);

    // No DNS names and an unrelated CN, so only the SRV-ID can match.
    let mut params = current_leaf_params(&[], "srv leaf");
    params
        .custom_extensions
        .push(srv_alt_names(&["_xmpp-client.chat.example.com"]));
    let leaf = root.sign_leaf(params);
    let cert = leaf.certificate();

    assert_eq!(
        cert.subject_alternative_names(),
        &[SubjectAltName::Srv("_xmpp-client.chat.example.com".to_string())]
    );
    assert!(cert.matches_srv_name("chat.example.com", "_xmpp-client"));
    assert!(!cert.matches_dns_name("chat.example.com"));

    let service = Identity::Service {
        domain: "chat.example.com".to_string(),
        service: "xmpp-client".to_string(),
    };
    assert_eq!(verify(cert, &[], &policy, Some(&service)), Ok(()));

    let other_service = Identity::Service {
        domain: "chat.example.com".to_string(),
        service: "xmpp-server".to_string(),
    };
    assert_eq!(
        verify(cert, &[], &policy, Some(&other_service)),
        Err(VerifyError::IdentityMismatch)
    );

    // SRV-IDs do not satisfy a plain hostname.
    assert_eq!(
        verify(cert, &[], &policy, Some(&host("chat.example.com"))),
        Err(VerifyError::IdentityMismatch)
    );
}
