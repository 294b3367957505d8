use std::io::{Read, Write};
use std::net::TcpListener;
use std::thread;

use tlsock::{
    generate_self_signed, Error, MemoryTransport, SessionState, TlsSocket, TrustPolicy,
    VerificationStatus, VerifyError,
};

use crate::common::*;

#[test]
fn tcp_echo() {
    let _ = env_logger::try_init();

    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("local addr");

    let key = generate_self_signed(&["localhost"]).expect("generate");
    let trust = TrustPolicy::with_roots(vec![key.certificate().clone()]).host("localhost");

    let server = thread::spawn(move || {
        let mut socket =
            TlsSocket::accept(&listener, config(), TrustPolicy::default(), key).expect("accept");

        let mut buf = [0u8; 64];
        loop {
            let n = socket.read(&mut buf).expect("server read");
            if n == 0 {
                break;
            }
            socket.write_all(&buf[..n]).expect("server write");
        }
        socket.close();
    });

    let mut socket = TlsSocket::connect(addr, config(), trust).expect("connect");
    assert_eq!(
        socket.session().verification(),
        VerificationStatus::Valid
    );
    assert!(socket.peer_certificate().is_some());

    socket.write_all(b"ping").expect("write");
    let mut buf = [0u8; 4];
    socket.read_exact(&mut buf).expect("read");
    assert_eq!(&buf, b"ping");

    socket.close();
    assert!(socket.is_closed());

    server.join().expect("server thread");
}

#[test]
fn tcp_wrong_host_is_rejected() {
    let _ = env_logger::try_init();

    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("local addr");

    let key = generate_self_signed(&["localhost"]).expect("generate");
    let trust = TrustPolicy::with_roots(vec![key.certificate().clone()]).host("elsewhere.test");

    let server = thread::spawn(move || {
        // The server finishes its side before the client rejects it.
        let _ = TlsSocket::accept(&listener, config(), TrustPolicy::default(), key);
    });

    let err = TlsSocket::connect(addr, config(), trust).unwrap_err();
    assert!(matches!(err, Error::Verify(VerifyError::IdentityMismatch)));

    server.join().expect("server thread");
}

#[test]
fn memory_transport_socket() {
    let _ = env_logger::try_init();

    let authority = Authority::root("Test Root");
    let leaf = authority.leaf(&["memory.test"]);
    let trust = TrustPolicy::with_roots(vec![authority.certificate().clone()]).host("memory.test");

    let (a, b) = MemoryTransport::pair();

    let server = thread::spawn(move || {
        let mut socket =
            TlsSocket::server(b, config(), TrustPolicy::default(), leaf).expect("server");
        // No client certificate was requested, so nothing was verified.
        assert_eq!(socket.session().verification(), VerificationStatus::Unset);

        let mut buf = [0u8; 5];
        socket.read_exact(&mut buf).expect("server read");
        assert_eq!(&buf, b"hello");
        socket.write_all(b"world").expect("server write");
        socket
    });

    let mut client = TlsSocket::client(a, config(), trust, None).expect("client");
    client.write_all(b"hello").expect("write");

    let mut buf = [0u8; 5];
    client.read_exact(&mut buf).expect("read");
    assert_eq!(&buf, b"world");

    let server = server.join().expect("server thread");
    assert_eq!(server.session().state(), SessionState::Established);

    let session = client.into_session();
    assert_eq!(session.state(), SessionState::Established);
}
