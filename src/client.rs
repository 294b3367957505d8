// TLS 1.3 client handshake (RFC 8446 Section 2):
//
// 1. Client sends ClientHello with a key share for every configured group
// 2. Server sends ServerHello (plaintext)
//    - Client completes ECDHE, installs handshake keys in both directions
// 3. Server sends EncryptedExtensions
// 4. Server sends CertificateRequest (optional)
// 5. Server sends Certificate and CertificateVerify
// 6. Server sends Finished
//    - Client derives application secrets, reads with the server's
//      application key from here on
// 7. Client sends Certificate (if requested, possibly empty)
// 8. Client sends CertificateVerify (if it sent a certificate)
// 9. Client sends Finished, switches to its application key
//
// HelloRetryRequest is not supported. Offering every group up front means a
// retry would only ever be asked for a group we do not have.

use std::net::IpAddr;

use crate::buffer::Buf;
use crate::crypto::ActiveKeyExchange;
use crate::engine::Engine;
use crate::error::violation;
use crate::message::{
    Body, Certificate as CertificateMessage, ClientHello, Extension, Finished, Handshake,
    KeyShareEntry,
};
use crate::types::{AlertDescription, HandshakeType, ProtocolVersion, SignatureScheme};
use crate::{CertifiedKey, Error};

pub(crate) struct Client {
    /// Current client state.
    state: State,

    /// Engine in common between server and client.
    engine: Engine,

    /// Our certificate and key, if we have one.
    certified_key: Option<CertifiedKey>,

    /// Host name sent as server_name.
    server_name: Option<String>,

    /// legacy_session_id, echoed by the server.
    session_id: [u8; 32],

    /// One pending exchange per offered group.
    key_exchanges: Vec<Box<dyn ActiveKeyExchange>>,

    /// Schemes from the server's CertificateRequest, if it sent one.
    requested_schemes: Option<Vec<SignatureScheme>>,

    /// Whether our Certificate carried a chain to sign for.
    sent_certificate: bool,
}

impl Client {
    pub fn new(
        engine: Engine,
        certified_key: Option<CertifiedKey>,
        server_name: Option<&str>,
    ) -> Client {
        // server_name carries DNS names only, without the trailing dot.
        let server_name = server_name
            .map(|name| name.strip_suffix('.').unwrap_or(name))
            .filter(|name| !name.is_empty() && name.parse::<IpAddr>().is_err())
            .map(str::to_string);

        Client {
            state: State::SendClientHello,
            engine,
            certified_key,
            server_name,
            session_id: [0; 32],
            key_exchanges: Vec::new(),
            requested_schemes: None,
            sent_certificate: false,
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
    SendClientHello,
    AwaitServerHello,
    AwaitEncryptedExtensions,
    AwaitCertificateRequest,
    AwaitCertificate,
    AwaitCertificateVerify,
    AwaitFinished,
    SendCertificate,
    SendCertificateVerify,
    SendFinished,
    Established,
}

impl State {
    fn make_progress(self, client: &mut Client) -> Result<Self, Error> {
        match self {
            State::SendClientHello => self.send_client_hello(client),
            State::AwaitServerHello => self.await_server_hello(client),
            State::AwaitEncryptedExtensions => self.await_encrypted_extensions(client),
            State::AwaitCertificateRequest => self.await_certificate_request(client),
            State::AwaitCertificate => self.await_certificate(client),
            State::AwaitCertificateVerify => self.await_certificate_verify(client),
            State::AwaitFinished => self.await_finished(client),
            State::SendCertificate => self.send_certificate(client),
            State::SendCertificateVerify => self.send_certificate_verify(client),
            State::SendFinished => self.send_finished(client),
            State::Established => Ok(self),
        }
    }

    fn send_client_hello(self, client: &mut Client) -> Result<Self, Error> {
        let engine = &mut client.engine;

        let mut random = [0u8; 32];
        engine.random_bytes(&mut random)?;
        engine.random_bytes(&mut client.session_id)?;

        let config = engine.config();
        let groups = config.kx_groups().to_vec();

        let mut shares = Vec::with_capacity(groups.len());
        for group in &groups {
            let kx_group = config
                .crypto_provider()
                .find_kx_group(*group)
                .ok_or_else(|| Error::Config(format!("Group not available: {:?}", group)))?;
            let exchange = kx_group.start_exchange().map_err(|e| {
                Error::Crypto(format!("Failed to start key exchange: {}", e))
            })?;
            shares.push(KeyShareEntry {
                group: *group,
                key_exchange: exchange.pub_key().to_vec(),
            });
            client.key_exchanges.push(exchange);
        }

        let mut extensions = Vec::with_capacity(5);
        if let Some(name) = &client.server_name {
            extensions.push(Extension::ServerName(Some(name.clone())));
        }
        extensions.push(Extension::SupportedVersions(vec![ProtocolVersion::TLS1_3]));
        extensions.push(Extension::SupportedGroups(groups));
        extensions.push(Extension::SignatureAlgorithms(
            config.signature_schemes().to_vec(),
        ));
        extensions.push(Extension::KeyShares(shares));

        let client_hello = ClientHello {
            legacy_version: ProtocolVersion::TLS1_2,
            random,
            legacy_session_id: client.session_id.to_vec(),
            cipher_suites: config.cipher_suites().to_vec(),
            legacy_compression_methods: vec![0],
            extensions,
        };

        engine.send_handshake(&Handshake::new(Body::ClientHello(client_hello)))?;

        Ok(Self::AwaitServerHello)
    }

    fn await_server_hello(self, client: &mut Client) -> Result<Self, Error> {
        let engine = &mut client.engine;

        let Some(handshake) = engine.next_handshake()? else {
            return Ok(self);
        };

        let Body::ServerHello(server_hello) = handshake.body else {
            return Err(unexpected(engine, HandshakeType::ServerHello, handshake.msg_type));
        };

        if server_hello.is_hello_retry_request() {
            return Err(engine.fail(
                AlertDescription::HandshakeFailure,
                violation!("HelloRetryRequest is not supported"),
            ));
        }

        if server_hello.selected_version() != Some(ProtocolVersion::TLS1_3) {
            return Err(engine.fail(
                AlertDescription::ProtocolVersion,
                violation!("Server did not select TLS 1.3"),
            ));
        }

        if server_hello.legacy_session_id_echo != client.session_id {
            return Err(engine.fail(
                AlertDescription::IllegalParameter,
                violation!("Server did not echo the session id"),
            ));
        }

        let suite = server_hello.cipher_suite;
        if !engine.config().cipher_suites().contains(&suite) {
            return Err(engine.fail(
                AlertDescription::IllegalParameter,
                violation!("Server selected cipher suite {} which was not offered", suite),
            ));
        }

        if server_hello.legacy_compression_method != 0 {
            return Err(engine.fail(
                AlertDescription::IllegalParameter,
                violation!("Server selected compression"),
            ));
        }

        let Some(share) = server_hello.key_share() else {
            return Err(engine.fail(
                AlertDescription::MissingExtension,
                violation!("ServerHello without key_share"),
            ));
        };

        let Some(pos) = client
            .key_exchanges
            .iter()
            .position(|kx| kx.group() == share.group)
        else {
            return Err(engine.fail(
                AlertDescription::IllegalParameter,
                violation!("Server key share for {:?} which was not offered", share.group),
            ));
        };

        let exchange = client.key_exchanges.swap_remove(pos);
        client.key_exchanges.clear();

        engine.select_suite(suite)?;
        engine.set_key_exchange_group(share.group);

        let mut shared_secret = Buf::new();
        if let Err(e) = exchange.complete(&share.key_exchange, &mut shared_secret) {
            return Err(engine.fail(
                AlertDescription::IllegalParameter,
                Error::Crypto(format!("ECDHE completion failed: {}", e)),
            ));
        }

        engine.derive_handshake_keys(&shared_secret)?;

        debug!("Server selected {} with {:?}", suite, share.group);

        Ok(Self::AwaitEncryptedExtensions)
    }

    fn await_encrypted_extensions(self, client: &mut Client) -> Result<Self, Error> {
        let engine = &mut client.engine;

        let Some(handshake) = engine.next_handshake()? else {
            return Ok(self);
        };

        let Body::EncryptedExtensions(encrypted_extensions) = handshake.body else {
            return Err(unexpected(
                engine,
                HandshakeType::EncryptedExtensions,
                handshake.msg_type,
            ));
        };

        if encrypted_extensions.server_name_acknowledged() && client.server_name.is_none() {
            return Err(engine.fail(
                AlertDescription::UnsupportedExtension,
                violation!("Server acknowledged a server_name that was not sent"),
            ));
        }

        Ok(Self::AwaitCertificateRequest)
    }

    fn await_certificate_request(self, client: &mut Client) -> Result<Self, Error> {
        let engine = &mut client.engine;

        // CertificateRequest is optional. Anything else is for the next state.
        let Some(msg_type) = engine.peek_handshake()? else {
            return Ok(self);
        };
        if msg_type != HandshakeType::CertificateRequest {
            return Ok(Self::AwaitCertificate);
        }

        let Some(handshake) = engine.next_handshake()? else {
            return Ok(self);
        };
        let Body::CertificateRequest(request) = handshake.body else {
            return Err(unexpected(
                engine,
                HandshakeType::CertificateRequest,
                handshake.msg_type,
            ));
        };

        if !request.context.is_empty() {
            return Err(engine.fail(
                AlertDescription::IllegalParameter,
                violation!("CertificateRequest context must be empty during the handshake"),
            ));
        }

        let Some(schemes) = request.signature_algorithms() else {
            return Err(engine.fail(
                AlertDescription::MissingExtension,
                violation!("CertificateRequest without signature_algorithms"),
            ));
        };

        debug!("Server requested a client certificate");
        client.requested_schemes = Some(schemes.to_vec());

        Ok(Self::AwaitCertificate)
    }

    fn await_certificate(self, client: &mut Client) -> Result<Self, Error> {
        let engine = &mut client.engine;

        let Some(handshake) = engine.next_handshake()? else {
            return Ok(self);
        };

        let Body::Certificate(certificate) = handshake.body else {
            return Err(unexpected(engine, HandshakeType::Certificate, handshake.msg_type));
        };

        if !certificate.context.is_empty() {
            return Err(engine.fail(
                AlertDescription::IllegalParameter,
                violation!("Server Certificate with a request context"),
            ));
        }

        if certificate.certificate_list.is_empty() {
            return Err(engine.fail(
                AlertDescription::DecodeError,
                violation!("Server sent an empty certificate list"),
            ));
        }

        engine.accept_peer_certificates(&certificate)?;

        Ok(Self::AwaitCertificateVerify)
    }

    fn await_certificate_verify(self, client: &mut Client) -> Result<Self, Error> {
        let engine = &mut client.engine;

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

        // Signed over the transcript up to and including Certificate.
        let transcript_hash = engine.transcript_hash_before_last()?;
        engine.check_certificate_verify(&verify, &transcript_hash)?;

        Ok(Self::AwaitFinished)
    }

    fn await_finished(self, client: &mut Client) -> Result<Self, Error> {
        let engine = &mut client.engine;

        let Some(handshake) = engine.next_handshake()? else {
            return Ok(self);
        };

        let Body::Finished(finished) = handshake.body else {
            return Err(unexpected(engine, HandshakeType::Finished, handshake.msg_type));
        };

        let transcript_hash = engine.transcript_hash_before_last()?;
        engine.check_finished(&finished, &transcript_hash)?;

        // Application secrets cover the transcript through the server Finished.
        engine.derive_application_secrets()?;
        engine.install_application_read()?;

        Ok(Self::SendCertificate)
    }

    fn send_certificate(self, client: &mut Client) -> Result<Self, Error> {
        let Some(schemes) = &client.requested_schemes else {
            return Ok(Self::SendFinished);
        };

        let usable = client
            .certified_key
            .as_ref()
            .filter(|key| schemes.contains(&key.scheme()));

        let message = match usable {
            Some(key) => {
                CertificateMessage::from_chain(&[], key.chain().iter().map(|c| c.der()))
            }
            None => {
                debug!("No client certificate for the requested signature schemes");
                CertificateMessage::from_chain(&[], std::iter::empty())
            }
        };
        client.sent_certificate = usable.is_some();

        client
            .engine
            .send_handshake(&Handshake::new(Body::Certificate(message)))?;

        Ok(Self::SendCertificateVerify)
    }

    fn send_certificate_verify(self, client: &mut Client) -> Result<Self, Error> {
        if !client.sent_certificate {
            return Ok(Self::SendFinished);
        }
        let Some(key) = &client.certified_key else {
            return Ok(Self::SendFinished);
        };

        let transcript_hash = client.engine.transcript_hash()?;
        let verify = client
            .engine
            .sign_certificate_verify(key, &transcript_hash)?;

        client
            .engine
            .send_handshake(&Handshake::new(Body::CertificateVerify(verify)))?;

        Ok(Self::SendFinished)
    }

    fn send_finished(self, client: &mut Client) -> Result<Self, Error> {
        let engine = &mut client.engine;

        let transcript_hash = engine.transcript_hash()?;
        let verify_data = engine.finished_verify_data(true, &transcript_hash)?;

        engine.send_handshake(&Handshake::new(Body::Finished(Finished {
            verify_data: verify_data.to_vec(),
        })))?;

        engine.install_application_write()?;
        engine.complete_handshake();

        Ok(Self::Established)
    }
}

/// Error for a handshake message arriving out of order.
pub(crate) fn unexpected(engine: &mut Engine, expected: HandshakeType, got: HandshakeType) -> Error {
    engine.fail(
        AlertDescription::UnexpectedMessage,
        violation!("Expected {:?}, got {:?}", expected, got),
    )
}
