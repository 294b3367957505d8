use std::io::Write;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tlsock::{
    AlertDescription, Config, Error, ErrorKind, SessionState, TrustPolicy,
};

use crate::common::*;

#[test]
fn application_data_both_ways() {
    let _ = env_logger::try_init();

    let authority = Authority::root("Test Root");
    let (mut client, mut server) = established(&authority);

    assert_eq!(client.write(b"hello server").expect("write"), 12);
    assert_eq!(read_exact(&mut server, 12), b"hello server");

    assert_eq!(server.write(b"hello client").expect("write"), 12);
    assert_eq!(read_exact(&mut client, 12), b"hello client");

    // Empty writes produce no records.
    assert_eq!(client.write(b"").expect("write"), 0);
    assert_eq!(client.transport().available(), 0);
}

#[test]
fn large_write_is_fragmented() {
    let _ = env_logger::try_init();

    let authority = Authority::root("Test Root");
    let config = Arc::new(
        Config::builder()
            .max_fragment_len(1000)
            .build()
            .expect("config"),
    );
    let trust = TrustPolicy::with_roots(vec![authority.certificate().clone()]);
    let (client, server) = sessions(
        config.clone(),
        trust,
        None,
        config,
        TrustPolicy::default(),
        authority.leaf(&["localhost"]),
    );
    let outcome = handshake(client, server);
    outcome.client_result.expect("client handshake");
    let (mut client, mut server) = (outcome.client, outcome.server);

    let data: Vec<u8> = (0..100_000u32).map(|i| (i % 251) as u8).collect();
    client.write(&data).expect("write");

    // 100 records of at most 1000 bytes plus header, content type and tag.
    let on_wire = server.transport().available();
    assert!(on_wire >= 100 * (1000 + 5 + 1 + 16));
    assert!(on_wire < 101 * (1000 + 5 + 1 + 16));

    let mut buf = [0u8; 4096];
    let n = server.read(&mut buf).expect("read");
    assert!(n <= 1000, "one read returns at most one record, got {}", n);

    let mut received = buf[..n].to_vec();
    received.extend(read_exact(&mut server, data.len() - n));
    assert_eq!(received, data);
}

#[test]
fn key_update_in_both_directions() {
    let _ = env_logger::try_init();

    let authority = Authority::root("Test Root");
    let (mut client, mut server) = established(&authority);

    client.update_keys().expect("update keys");
    client.write(b"after update").expect("write");
    assert_eq!(read_exact(&mut server, 12), b"after update");

    // The server answered update_requested with its own KeyUpdate.
    server.write(b"reply").expect("write");
    assert_eq!(read_exact(&mut client, 5), b"reply");

    server.update_keys().expect("update keys");
    server.write(b"again").expect("write");
    assert_eq!(read_exact(&mut client, 5), b"again");
    client.write(b"ok").expect("write");
    assert_eq!(read_exact(&mut server, 2), b"ok");
}

#[test]
fn close_notify_reads_zero() {
    let _ = env_logger::try_init();

    let authority = Authority::root("Test Root");
    let (mut client, mut server) = established(&authority);

    client.write(b"last words").expect("write");
    client.close();
    assert_eq!(client.state(), SessionState::Closed);
    assert!(!client.has_key_material());

    // Data sent before close_notify is still delivered.
    assert_eq!(read_exact(&mut server, 10), b"last words");

    let mut buf = [0u8; 16];
    assert_eq!(server.read(&mut buf).expect("read"), 0);
    assert_eq!(server.read(&mut buf).expect("read"), 0);
    assert_eq!(server.state(), SessionState::Established);

    server.close();
    assert_eq!(server.state(), SessionState::Closed);
    assert!(!server.has_key_material());

    // Closing twice is harmless.
    server.close();
    assert_eq!(server.state(), SessionState::Closed);
}

#[test]
fn operations_after_close_are_invalid() {
    let _ = env_logger::try_init();

    let authority = Authority::root("Test Root");
    let (mut client, _server) = established(&authority);
    client.close();

    let mut buf = [0u8; 4];
    for err in [
        client.read(&mut buf).unwrap_err(),
        client.write(b"x").unwrap_err(),
        client.update_keys().unwrap_err(),
        client.verify_peer().unwrap_err(),
    ] {
        assert!(matches!(
            err,
            Error::InvalidState {
                state: SessionState::Closed,
                ..
            }
        ));
    }
}

#[test]
fn truncation_is_a_transport_error() {
    let _ = env_logger::try_init();

    let authority = Authority::root("Test Root");
    let (client, mut server) = established(&authority);

    // The client goes away without close_notify.
    drop(client);

    let mut buf = [0u8; 16];
    let err = server.read(&mut buf).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Transport);
    assert_eq!(server.state(), SessionState::Error(ErrorKind::Transport));
    assert!(!server.has_key_material());
}

#[test]
fn plaintext_handshake_after_establishment() {
    let _ = env_logger::try_init();

    let authority = Authority::root("Test Root");
    let (mut client, mut server) = established(&authority);

    // An unprotected ClientHello header, as a renegotiation attempt would send.
    client
        .transport_mut()
        .write_all(&[22, 3, 3, 0, 4, 1, 0, 0, 0])
        .expect("inject");

    let mut buf = [0u8; 16];
    let err = server.read(&mut buf).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ProtocolViolation);
    assert_eq!(
        server.state(),
        SessionState::Error(ErrorKind::ProtocolViolation)
    );

    // The alert reaches the client protected with the application key.
    let err = client.read(&mut buf).unwrap_err();
    assert!(matches!(
        err,
        Error::AlertReceived(AlertDescription::UnexpectedMessage)
    ));
}

#[test]
fn tampered_record_is_rejected() {
    let _ = env_logger::try_init();

    let authority = Authority::root("Test Root");
    let (mut client, mut server) = established(&authority);

    // A protected record with a garbage body.
    let mut record = vec![23, 3, 3, 0, 32];
    record.extend_from_slice(&[0x5A; 32]);
    client.transport_mut().write_all(&record).expect("inject");

    let mut buf = [0u8; 16];
    let err = server.read(&mut buf).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ProtocolViolation);

    let err = client.read(&mut buf).unwrap_err();
    assert!(matches!(
        err,
        Error::AlertReceived(AlertDescription::BadRecordMac)
    ));
}

#[test]
fn failure_forgets_peer_certificate() {
    let _ = env_logger::try_init();

    let authority = Authority::root("Test Root");
    let (mut client, mut server) = established(&authority);
    assert!(client.peer_certificate().is_some());

    server.close();
    client.close();
    // A clean close keeps what the handshake authenticated.
    assert_eq!(client.state(), SessionState::Closed);
    assert!(client.peer_certificate().is_some());

    let (mut client, mut server) = established(&authority);
    let mut record = vec![23, 3, 3, 0, 32];
    record.extend_from_slice(&[0x5A; 32]);
    server.transport_mut().write_all(&record).expect("inject");

    let mut buf = [0u8; 16];
    client.read(&mut buf).unwrap_err();
    assert!(matches!(client.state(), SessionState::Error(_)));
    assert!(client.peer_certificate().is_none());
    assert!(client.peer_certificate_chain().is_empty());
}

#[test]
fn close_handle_interrupts_blocked_read() {
    let _ = env_logger::try_init();

    let authority = Authority::root("Test Root");
    let (client, _server) = established(&authority);
    let handle = client.transport().close_handle();

    let reader = thread::spawn(move || {
        let mut client = client;
        let mut buf = [0u8; 16];
        let result = client.read(&mut buf);
        (client, result)
    });

    thread::sleep(Duration::from_millis(50));
    handle.close();

    let (client, result) = reader.join().expect("reader thread");
    assert_eq!(result.unwrap_err().kind(), ErrorKind::Transport);
    assert_eq!(client.state(), SessionState::Error(ErrorKind::Transport));
}
