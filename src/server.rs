// TLS 1.3 server handshake (RFC 8446 Section 2):
//
// 1. Client sends ClientHello
//    - Server picks suite (own preference), group (first client share in a
//      configured group) and checks the client accepts our signature scheme
// 2. Server sends ServerHello (plaintext), installs handshake keys
// 3. Server sends EncryptedExtensions
// 4. Server sends CertificateRequest (if the trust policy asks for one)
// 5. Server sends Certificate, CertificateVerify, Finished
//    - Server derives application secrets, writes with its application key
// 6. Client sends Certificate (if requested)
// 7. Client sends CertificateVerify (if its Certificate was not empty)
// 8. Client sends Finished
//    - Server reads with the client's application key
//
// A client without a usable key share is refused instead of being sent a
// HelloRetryRequest.

use crate::buffer::Buf;
use crate::client::unexpected;
use crate::engine::Engine;
use crate::error::violation;
use crate::message::{
    Body, Certificate as CertificateMessage, CertificateRequest, EncryptedExtensions, Extension,
    Finished, Handshake, KeyShareEntry, ServerHello,
};
use crate::types::{AlertDescription, CipherSuite, HandshakeType, NamedGroup, ProtocolVersion};
use crate::{CertifiedKey, Error};

pub(crate) struct Server {
    /// Current server state.
    state: State,

    /// Engine in common between server and client.
    engine: Engine,

    /// Our certificate chain and key.
    certified_key: CertifiedKey,

    /// Send CertificateRequest.
    request_client_certificate: bool,

    /// Fail when the client sends an empty Certificate.
    require_client_certificate: bool,

    /// Parameters picked from the ClientHello.
    negotiated: Option<Negotiated>,
}

/// What the ClientHello settled, kept until ServerHello is sent.
struct Negotiated {
    suite: CipherSuite,
    group: NamedGroup,
    client_share: Vec<u8>,
    session_id: Vec<u8>,
    server_name: Option<String>,
}

impl Server {
    pub fn new(
        engine: Engine,
        certified_key: CertifiedKey,
        request_client_certificate: bool,
        require_client_certificate: bool,
    ) -> Server {
        Server {
            state: State::AwaitClientHello,
            engine,
            certified_key,
            request_client_certificate: request_client_certificate || require_client_certificate,
            require_client_certificate,
            negotiated: None,
        }
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut Engine {
        &mut self.engine
    }

    pub fn is_established(&self) -> bool {
        self.state == State::Established
    }

    /// The server_name the client asked for.
    pub fn server_name(&self) -> Option<&str> {
        self.negotiated
            .as_ref()
            .and_then(|n| n.server_name.as_deref())
    }

    /// Advance the handshake as far as the received data allows.
    pub fn make_progress(&mut self) -> Result<(), Error> {
        loop {
            let prev_state = self.state;

            let new_state = prev_state.make_progress(self)?;
            if prev_state != new_state {
                self.state = new_state;
                trace!("{:?} -> {:?}", prev_state, new_state);
            } else {
                break;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    AwaitClientHello,
    SendServerHello,
    SendEncryptedExtensions,
    SendCertificateRequest,
    SendCertificate,
    SendCertificateVerify,
    SendFinished,
    AwaitCertificate,
    AwaitCertificateVerify,
    AwaitFinished,
    Established,
}

impl State {
    fn make_progress(self, server: &mut Server) -> Result<Self, Error> {
        match self {
            State::AwaitClientHello => self.await_client_hello(server),
            State::SendServerHello => self.send_server_hello(server),
            State::SendEncryptedExtensions => self.send_encrypted_extensions(server),
            State::SendCertificateRequest => self.send_certificate_request(server),
            State::SendCertificate => self.send_certificate(server),
            State::SendCertificateVerify => self.send_certificate_verify(server),
            State::SendFinished => self.send_finished(server),
            State::AwaitCertificate => self.await_certificate(server),
            State::AwaitCertificateVerify => self.await_certificate_verify(server),
            State::AwaitFinished => self.await_finished(server),
            State::Established => Ok(self),
        }
    }

    fn await_client_hello(self, server: &mut Server) -> Result<Self, Error> {
        let engine = &mut server.engine;

        let Some(handshake) = engine.next_handshake()? else {
            return Ok(self);
        };

        let Body::ClientHello(client_hello) = handshake.body else {
            return Err(unexpected(engine, HandshakeType::ClientHello, handshake.msg_type));
        };

        let offers_tls13 = client_hello
            .supported_versions()
            .map(|versions| versions.contains(&ProtocolVersion::TLS1_3))
            .unwrap_or(false);
        if !offers_tls13 {
            return Err(engine.fail(
                AlertDescription::ProtocolVersion,
                violation!("Client does not offer TLS 1.3"),
            ));
        }

        if client_hello.legacy_compression_methods != [0] {
            return Err(engine.fail(
                AlertDescription::IllegalParameter,
                violation!("Client offered compression"),
            ));
        }

        let config = engine.config();

        let Some(suite) = config
            .cipher_suites()
            .iter()
            .copied()
            .find(|s| client_hello.cipher_suites.contains(s))
        else {
            return Err(engine.fail(
                AlertDescription::HandshakeFailure,
                Error::NoCommonParameters("No common cipher suite".to_string()),
            ));
        };

        let Some(schemes) = client_hello.signature_algorithms() else {
            return Err(engine.fail(
                AlertDescription::MissingExtension,
                violation!("ClientHello without signature_algorithms"),
            ));
        };

        let scheme = server.certified_key.scheme();
        if !schemes.contains(&scheme) {
            return Err(engine.fail(
                AlertDescription::HandshakeFailure,
                Error::NoCommonParameters(format!("Client does not accept {:?}", scheme)),
            ));
        }

        let Some(shares) = client_hello.key_shares() else {
            return Err(engine.fail(
                AlertDescription::MissingExtension,
                violation!("ClientHello without key_share"),
            ));
        };

        let Some(share) = shares
            .iter()
            .find(|share| config.kx_groups().contains(&share.group))
        else {
            return Err(engine.fail(
                AlertDescription::HandshakeFailure,
                Error::NoCommonParameters(
                    "No key share in a supported group, HelloRetryRequest not supported"
                        .to_string(),
                ),
            ));
        };

        debug!(
            "Selected {} with {:?} (server_name: {:?})",
            suite,
            share.group,
            client_hello.server_name()
        );

        server.negotiated = Some(Negotiated {
            suite,
            group: share.group,
            client_share: share.key_exchange.clone(),
            session_id: client_hello.legacy_session_id.clone(),
            server_name: client_hello.server_name().map(str::to_string),
        });

        Ok(Self::SendServerHello)
    }

    fn send_server_hello(self, server: &mut Server) -> Result<Self, Error> {
        let engine = &mut server.engine;
        let Some(negotiated) = &mut server.negotiated else {
            return Err(violation!("ServerHello without negotiated parameters"));
        };

        engine.select_suite(negotiated.suite)?;
        engine.set_key_exchange_group(negotiated.group);

        let kx_group = engine
            .config()
            .crypto_provider()
            .find_kx_group(negotiated.group)
            .ok_or_else(|| Error::Crypto(format!("Group not available: {:?}", negotiated.group)))?;
        let exchange = kx_group
            .start_exchange()
            .map_err(|e| Error::Crypto(format!("Failed to start key exchange: {}", e)))?;
        let public_key = exchange.pub_key().to_vec();

        let mut shared_secret = Buf::new();
        if let Err(e) = exchange.complete(&negotiated.client_share, &mut shared_secret) {
            return Err(engine.fail(
                AlertDescription::IllegalParameter,
                Error::Crypto(format!("ECDHE completion failed: {}", e)),
            ));
        }
        negotiated.client_share.clear();

        let mut random = [0u8; 32];
        engine.random_bytes(&mut random)?;

        let server_hello = ServerHello {
            legacy_version: ProtocolVersion::TLS1_2,
            random,
            legacy_session_id_echo: negotiated.session_id.clone(),
            cipher_suite: negotiated.suite,
            legacy_compression_method: 0,
            extensions: vec![
                Extension::SelectedVersion(ProtocolVersion::TLS1_3),
                Extension::KeyShare(KeyShareEntry {
                    group: negotiated.group,
                    key_exchange: public_key,
                }),
            ],
        };

        engine.send_handshake(&Handshake::new(Body::ServerHello(server_hello)))?;
        engine.derive_handshake_keys(&shared_secret)?;

        Ok(Self::SendEncryptedExtensions)
    }

    fn send_encrypted_extensions(self, server: &mut Server) -> Result<Self, Error> {
        let mut extensions = Vec::new();
        if server.server_name().is_some() {
            extensions.push(Extension::ServerName(None));
        }

        server
            .engine
            .send_handshake(&Handshake::new(Body::EncryptedExtensions(
                EncryptedExtensions { extensions },
            )))?;

        Ok(Self::SendCertificateRequest)
    }

    fn send_certificate_request(self, server: &mut Server) -> Result<Self, Error> {
        if !server.request_client_certificate {
            return Ok(Self::SendCertificate);
        }

        let request = CertificateRequest::new(server.engine.config().signature_schemes());
        server
            .engine
            .send_handshake(&Handshake::new(Body::CertificateRequest(request)))?;

        Ok(Self::SendCertificate)
    }

    fn send_certificate(self, server: &mut Server) -> Result<Self, Error> {
        let chain = server.certified_key.chain().iter().map(|c| c.der());
        let message = CertificateMessage::from_chain(&[], chain);

        server
            .engine
            .send_handshake(&Handshake::new(Body::Certificate(message)))?;

        Ok(Self::SendCertificateVerify)
    }

    fn send_certificate_verify(self, server: &mut Server) -> Result<Self, Error> {
        let transcript_hash = server.engine.transcript_hash()?;
        let verify = server
            .engine
            .sign_certificate_verify(&server.certified_key, &transcript_hash)?;

        server
            .engine
            .send_handshake(&Handshake::new(Body::CertificateVerify(verify)))?;

        Ok(Self::SendFinished)
    }

    fn send_finished(self, server: &mut Server) -> Result<Self, Error> {
        let engine = &mut server.engine;

        let transcript_hash = engine.transcript_hash()?;
        let verify_data = engine.finished_verify_data(false, &transcript_hash)?;

        engine.send_handshake(&Handshake::new(Body::Finished(Finished {
            verify_data: verify_data.to_vec(),
        })))?;

        // Application secrets cover the transcript through our Finished.
        engine.derive_application_secrets()?;
        engine.install_application_write()?;

        if server.request_client_certificate {
            Ok(Self::AwaitCertificate)
        } else {
            Ok(Self::AwaitFinished)
        }
    }

    fn await_certificate(self, server: &mut Server) -> Result<Self, Error> {
        let engine = &mut server.engine;

        let Some(handshake) = engine.next_handshake()? else {
            return Ok(self);
        };

        let Body::Certificate(certificate) = handshake.body else {
            return Err(unexpected(engine, HandshakeType::Certificate, handshake.msg_type));
        };

        if !certificate.context.is_empty() {
            return Err(engine.fail(
                AlertDescription::IllegalParameter,
                violation!("Client Certificate context does not match the request"),
            ));
        }

        if certificate.certificate_list.is_empty() {
            if server.require_client_certificate {
                return Err(engine.fail(
                    AlertDescription::CertificateRequired,
                    Error::PeerCertificateRequired,
                ));
            }
            debug!("Client sent no certificate");
            return Ok(Self::AwaitFinished);
        }

        engine.accept_peer_certificates(&certificate)?;

        Ok(Self::AwaitCertificateVerify)
    }

    fn await_certificate_verify(self, server: &mut Server) -> Result<Self, Error> {
        let engine = &mut server.engine;

        let Some(handshake) = engine.next_handshake()? else {
            return Ok(self);
        };

        let Body::CertificateVerify(verify) = handshake.body else {
            return Err(unexpected(
                engine,
                HandshakeType::CertificateVerify,
                handshake.msg_type,
            ));
        };

        let transcript_hash = engine.transcript_hash_before_last()?;
        engine.check_certificate_verify(&verify, &transcript_hash)?;

        Ok(Self::AwaitFinished)
    }

    fn await_finished(self, server: &mut Server) -> Result<Self, Error> {
        let engine = &mut server.engine;

        let Some(handshake) = engine.next_handshake()? else {
            return Ok(self);
        };

        let Body::Finished(finished) = handshake.body else {
            return Err(unexpected(engine, HandshakeType::Finished, handshake.msg_type));
        };

        let transcript_hash = engine.transcript_hash_before_last()?;
        engine.check_finished(&finished, &transcript_hash)?;

        engine.install_application_read()?;
        engine.complete_handshake();

        Ok(Self::Established)
    }
}
