use std::sync::Arc;

use rcgen::{CertificateParams, PKCS_ECDSA_P384_SHA384};

use tlsock::{
    AlertDescription, CertifiedKey, CipherSuite, Config, Error, ErrorKind, MemoryTransport,
    NamedGroup, ProtocolVersion, Session, SessionState, SignatureScheme, TrustPolicy,
    VerificationStatus, VerifyError,
};

use crate::common::*;

fn client_trust(authority: &Authority) -> TrustPolicy {
    TrustPolicy::with_roots(vec![authority.certificate().clone()]).host("localhost")
}

#[test]
fn handshake_with_defaults() {
    let _ = env_logger::try_init();

    let authority = Authority::root("Test Root");
    let (mut client, server) = established(&authority);

    for session in [&client, &server] {
        assert_eq!(session.state(), SessionState::Established);
        assert_eq!(session.protocol_version(), Some(ProtocolVersion::TLS1_3));
        assert_eq!(session.cipher_suite(), Some(CipherSuite::AES_128_GCM_SHA256));
        assert_eq!(session.key_exchange_group(), Some(NamedGroup::X25519));
    }

    // Verification only happens on request.
    assert_eq!(client.verification(), VerificationStatus::Pending);
    assert_eq!(server.verification(), VerificationStatus::Unset);
    assert!(server.peer_certificate().is_none());

    let peer = client.peer_certificate().expect("server certificate");
    assert_eq!(peer.common_name(), Some("localhost"));
    assert_eq!(client.peer_certificate_chain().len(), 1);

    client.verify_peer().expect("verify server");
    assert_eq!(client.verification(), VerificationStatus::Valid);
}

#[test]
fn every_suite_and_group_negotiates() {
    let _ = env_logger::try_init();

    let authority = Authority::root("Test Root");
    let suites = [CipherSuite::AES_128_GCM_SHA256, CipherSuite::AES_256_GCM_SHA384];
    let groups = [NamedGroup::X25519, NamedGroup::Secp256r1, NamedGroup::Secp384r1];

    for suite in suites {
        for group in groups {
            let config = Arc::new(
                Config::builder()
                    .cipher_suites(&[suite])
                    .kx_groups(&[group])
                    .build()
                    .expect("config"),
            );

            let (client, server) = sessions(
                config.clone(),
                client_trust(&authority),
                None,
                config,
                TrustPolicy::default(),
                authority.leaf(&["localhost"]),
            );
            let outcome = handshake(client, server);
            outcome.client_result.expect("client handshake");
            outcome.server_result.expect("server handshake");

            assert_eq!(outcome.client.cipher_suite(), Some(suite));
            assert_eq!(outcome.server.key_exchange_group(), Some(group));
        }
    }
}

#[test]
fn server_prefers_its_own_suite_order() {
    let _ = env_logger::try_init();

    let authority = Authority::root("Test Root");
    let server_config = Arc::new(
        Config::builder()
            .cipher_suites(&[CipherSuite::AES_256_GCM_SHA384, CipherSuite::AES_128_GCM_SHA256])
            .build()
            .expect("config"),
    );

    let (client, server) = sessions(
        config(),
        client_trust(&authority),
        None,
        server_config,
        TrustPolicy::default(),
        authority.leaf(&["localhost"]),
    );
    let outcome = handshake(client, server);
    outcome.client_result.expect("client handshake");
    assert_eq!(
        outcome.client.cipher_suite(),
        Some(CipherSuite::AES_256_GCM_SHA384)
    );
}

#[test]
fn p384_server_key() {
    let _ = env_logger::try_init();

    let mut params = CertificateParams::new(vec!["localhost".to_string()]);
    params.alg = &PKCS_ECDSA_P384_SHA384;
    let cert = rcgen::Certificate::from_params(params).expect("params");
    let key = CertifiedKey::from_der(
        vec![cert.serialize_der().expect("der")],
        &cert.serialize_private_key_der(),
    )
    .expect("certified key");
    assert_eq!(key.scheme(), SignatureScheme::ECDSA_SECP384R1_SHA384);

    let trust = TrustPolicy::with_roots(vec![key.certificate().clone()]).host("localhost");
    let (client, server) = sessions(
        config(),
        trust,
        None,
        config(),
        TrustPolicy::default(),
        key.clone(),
    );
    let mut outcome = handshake(client, server);
    outcome.client_result.expect("client handshake");
    outcome.client.verify_peer().expect("pinned P-384 certificate");

    // A client that only accepts P-256 signatures cannot talk to this server.
    let p256_only = Arc::new(
        Config::builder()
            .signature_schemes(&[SignatureScheme::ECDSA_SECP256R1_SHA256])
            .build()
            .expect("config"),
    );
    let (client, server) = sessions(
        p256_only,
        TrustPolicy::insecure_skip_verification(),
        None,
        config(),
        TrustPolicy::default(),
        key,
    );
    let outcome = handshake(client, server);
    assert!(matches!(
        outcome.server_result,
        Err(Error::NoCommonParameters(_))
    ));
    assert!(matches!(
        outcome.client_result,
        Err(Error::HandshakeFailed(AlertDescription::HandshakeFailure))
    ));
}

#[test]
fn no_common_cipher_suite() {
    let _ = env_logger::try_init();

    let authority = Authority::root("Test Root");
    let client_config = Arc::new(
        Config::builder()
            .cipher_suites(&[CipherSuite::AES_128_GCM_SHA256])
            .build()
            .expect("config"),
    );
    let server_config = Arc::new(
        Config::builder()
            .cipher_suites(&[CipherSuite::AES_256_GCM_SHA384])
            .build()
            .expect("config"),
    );

    let (client, server) = sessions(
        client_config,
        client_trust(&authority),
        None,
        server_config,
        TrustPolicy::default(),
        authority.leaf(&["localhost"]),
    );
    let outcome = handshake(client, server);

    let server_err = outcome.server_result.unwrap_err();
    assert_eq!(server_err.kind(), ErrorKind::NoCommonParameters);
    assert_eq!(
        outcome.server.state(),
        SessionState::Error(ErrorKind::NoCommonParameters)
    );
    assert!(!outcome.server.has_key_material());

    assert!(matches!(
        outcome.client_result,
        Err(Error::HandshakeFailed(AlertDescription::HandshakeFailure))
    ));
    assert_eq!(
        outcome.client.state(),
        SessionState::Error(ErrorKind::HandshakeFailed(AlertDescription::HandshakeFailure))
    );
}

#[test]
fn no_common_group() {
    let _ = env_logger::try_init();

    let authority = Authority::root("Test Root");
    let client_config = Arc::new(
        Config::builder()
            .kx_groups(&[NamedGroup::X25519])
            .build()
            .expect("config"),
    );
    let server_config = Arc::new(
        Config::builder()
            .kx_groups(&[NamedGroup::Secp384r1])
            .build()
            .expect("config"),
    );

    let (client, server) = sessions(
        client_config,
        client_trust(&authority),
        None,
        server_config,
        TrustPolicy::default(),
        authority.leaf(&["localhost"]),
    );
    let outcome = handshake(client, server);

    assert!(matches!(
        outcome.server_result,
        Err(Error::NoCommonParameters(_))
    ));
    assert!(matches!(
        outcome.client_result,
        Err(Error::HandshakeFailed(AlertDescription::HandshakeFailure))
    ));
}

#[test]
fn mutual_authentication() {
    let _ = env_logger::try_init();

    let authority = Authority::root("Test Root");
    let server_trust = TrustPolicy::with_roots(vec![authority.certificate().clone()])
        .host("client.test")
        .require_client_certificate(true);

    let (client, server) = sessions(
        config(),
        client_trust(&authority),
        Some(authority.leaf(&["client.test"])),
        config(),
        server_trust,
        authority.leaf(&["localhost"]),
    );
    let outcome = handshake(client, server);
    outcome.client_result.expect("client handshake");
    outcome.server_result.expect("server handshake");

    let mut server = outcome.server;
    let peer = server.peer_certificate().expect("client certificate");
    assert_eq!(peer.common_name(), Some("client.test"));
    assert_eq!(server.verification(), VerificationStatus::Pending);
    server.verify_peer().expect("verify client");
    assert_eq!(server.verification(), VerificationStatus::Valid);
}

#[test]
fn client_certificate_from_untrusted_authority() {
    let _ = env_logger::try_init();

    let authority = Authority::root("Test Root");
    let rogue = Authority::root("Rogue Root");
    let server_trust = TrustPolicy::with_roots(vec![authority.certificate().clone()])
        .request_client_certificate(true);

    let (client, server) = sessions(
        config(),
        client_trust(&authority),
        Some(rogue.leaf(&["client.test"])),
        config(),
        server_trust,
        authority.leaf(&["localhost"]),
    );
    let outcome = handshake(client, server);
    outcome.server_result.expect("server handshake");

    let mut server = outcome.server;
    let err = server.verify_peer().unwrap_err();
    assert!(matches!(err, Error::Verify(VerifyError::UntrustedChain)));
    assert_eq!(
        server.verification(),
        VerificationStatus::Invalid(VerifyError::UntrustedChain)
    );
    // A failed verification does not tear down the session.
    assert_eq!(server.state(), SessionState::Established);
}

#[test]
fn requested_client_certificate_is_optional() {
    let _ = env_logger::try_init();

    let authority = Authority::root("Test Root");
    let server_trust = TrustPolicy::default().request_client_certificate(true);

    let (client, server) = sessions(
        config(),
        client_trust(&authority),
        None,
        config(),
        server_trust,
        authority.leaf(&["localhost"]),
    );
    let outcome = handshake(client, server);
    outcome.client_result.expect("client handshake");
    outcome.server_result.expect("server handshake");

    assert!(outcome.server.peer_certificate().is_none());
    assert_eq!(outcome.server.verification(), VerificationStatus::Unset);
}

#[test]
fn required_client_certificate_missing() {
    let _ = env_logger::try_init();

    let authority = Authority::root("Test Root");
    let server_trust = TrustPolicy::default().require_client_certificate(true);

    let (client, server) = sessions(
        config(),
        client_trust(&authority),
        None,
        config(),
        server_trust,
        authority.leaf(&["localhost"]),
    );
    let outcome = handshake(client, server);

    assert!(matches!(
        outcome.server_result,
        Err(Error::PeerCertificateRequired)
    ));
    assert_eq!(
        outcome.server.state(),
        SessionState::Error(ErrorKind::PeerCertificateRequired)
    );

    // The client finished its side before the server objected.
    outcome.client_result.expect("client handshake");
    let mut client = outcome.client;
    let mut buf = [0u8; 16];
    let err = client.read(&mut buf).unwrap_err();
    assert!(matches!(
        err,
        Error::AlertReceived(AlertDescription::CertificateRequired)
    ));
    assert!(!client.has_key_material());
}

#[test]
fn non_blocking_handshake() {
    let _ = env_logger::try_init();

    let authority = Authority::root("Test Root");
    let (mut a, mut b) = MemoryTransport::pair();
    a.set_nonblocking(true);
    b.set_nonblocking(true);

    let mut client = Session::client(a, config(), client_trust(&authority), None);
    let mut server = Session::server(
        b,
        config(),
        TrustPolicy::default(),
        authority.leaf(&["localhost"]),
    );

    let mut client_done = false;
    let mut server_done = false;
    let mut rounds = 0;

    while !(client_done && server_done) {
        rounds += 1;
        assert!(rounds < 20, "handshake did not converge");

        if !client_done {
            match client.start_handshake() {
                Ok(()) => client_done = true,
                Err(Error::WouldBlock) => {
                    assert_eq!(client.state(), SessionState::Handshaking);
                }
                Err(e) => panic!("client failed: {}", e),
            }
        }
        if !server_done {
            match server.start_handshake() {
                Ok(()) => server_done = true,
                Err(Error::WouldBlock) => {
                    assert_eq!(server.state(), SessionState::Handshaking);
                }
                Err(e) => panic!("server failed: {}", e),
            }
        }
    }

    client.write(b"ping").expect("write");
    let mut buf = [0u8; 16];
    assert_eq!(server.read(&mut buf).expect("read"), 4);
    assert_eq!(&buf[..4], b"ping");

    // Nothing more to read: the session waits without failing.
    assert!(matches!(server.read(&mut buf), Err(Error::WouldBlock)));
    assert_eq!(server.state(), SessionState::Established);
}

/// Everything currently readable from a non-blocking transport.
fn drain(transport: &mut MemoryTransport) -> Vec<u8> {
    use std::io::Read;

    let mut out = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        match transport.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => out.extend_from_slice(&buf[..n]),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
            Err(e) => panic!("relay read failed: {}", e),
        }
    }
    out
}

#[test]
fn peer_certificate_hidden_until_handshake_completes() {
    use std::io::Write;

    let _ = env_logger::try_init();

    let authority = Authority::root("Test Root");

    // client <-> (client_relay, server_relay) <-> server
    let (mut client_side, mut client_relay) = MemoryTransport::pair();
    let (mut server_relay, mut server_side) = MemoryTransport::pair();
    for transport in [
        &mut client_side,
        &mut client_relay,
        &mut server_relay,
        &mut server_side,
    ] {
        transport.set_nonblocking(true);
    }

    let mut client = Session::client(client_side, config(), client_trust(&authority), None);
    let mut server = Session::server(
        server_side,
        config(),
        TrustPolicy::default(),
        authority.leaf(&["localhost"]),
    );

    assert!(matches!(client.start_handshake(), Err(Error::WouldBlock)));
    let client_hello = drain(&mut client_relay);
    server_relay.write_all(&client_hello).expect("relay");

    assert!(matches!(server.start_handshake(), Err(Error::WouldBlock)));
    let server_flight = drain(&mut server_relay);
    assert!(!server_flight.is_empty());

    // Deliver the server flight one byte at a time. The certificate arrives
    // well before CertificateVerify and Finished are checked.
    let mut completed = false;
    for byte in &server_flight {
        assert!(!completed, "handshake completed before the whole flight");
        client_relay.write_all(&[*byte]).expect("relay");

        match client.start_handshake() {
            Ok(()) => completed = true,
            Err(Error::WouldBlock) => {
                assert_eq!(client.state(), SessionState::Handshaking);
                assert!(client.peer_certificate().is_none());
                assert!(client.peer_certificate_chain().is_empty());
            }
            Err(e) => panic!("client failed: {}", e),
        }
    }
    assert!(completed);
    let peer = client.peer_certificate().expect("server certificate");
    assert!(peer.matches_dns_name("localhost"));
    assert_eq!(client.peer_certificate_chain().len(), 1);

    let client_finished = drain(&mut client_relay);
    server_relay.write_all(&client_finished).expect("relay");
    server.start_handshake().expect("server handshake");
    assert!(server.peer_certificate().is_none());
}

#[test]
fn start_handshake_twice_is_a_no_op() {
    let _ = env_logger::try_init();

    let authority = Authority::root("Test Root");
    let (mut client, _server) = established(&authority);
    client.start_handshake().expect("already established");
    assert_eq!(client.state(), SessionState::Established);
}

#[test]
fn server_needs_a_client_hello() {
    let _ = env_logger::try_init();

    let authority = Authority::root("Test Root");
    let (a, b) = MemoryTransport::pair();
    let mut server = Session::server(
        b,
        config(),
        TrustPolicy::default(),
        authority.leaf(&["localhost"]),
    );

    // Plaintext application data instead of a ClientHello.
    let mut a = a;
    std::io::Write::write_all(&mut a, &[23, 3, 3, 0, 2, 0xAA, 0xBB]).expect("write");

    let err = server.start_handshake().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ProtocolViolation);

    // The server answered with unexpected_message.
    let mut alert = [0u8; 7];
    std::io::Read::read_exact(&mut a, &mut alert).expect("alert");
    assert_eq!(alert, [21, 3, 3, 0, 2, 2, 10]);
}
