//! One TLS connection over a [`Transport`].
//!
//! A [`Session`] owns the transport and drives the client or server state
//! machine through the handshake. Afterwards it encrypts and decrypts
//! application data. All operations take `&mut self`; a session is never
//! shared between threads while in use.
//!
//! ```text
//!   Init --start_handshake--> Handshaking --> Established --close--> Closing --> Closed
//!                                  |               |
//!                                  +---------------+----> Error(kind)
//! ```
//!
//! On a non-blocking transport every operation may return
//! [`Error::WouldBlock`]. The session keeps partial records, handshake
//! progress and unsent ciphertext; call the same operation again once the
//! transport is ready.

use std::io;
use std::sync::Arc;

use crate::certificate::Certificate;
use crate::client::Client;
use crate::engine::Engine;
use crate::error::ErrorKind;
use crate::server::Server;
use crate::transport::Transport;
use crate::trust::TrustPolicy;
use crate::types::{AlertDescription, CipherSuite, NamedGroup, ProtocolVersion};
use crate::verify::{self, VerificationStatus, VerifyError};
use crate::{CertifiedKey, Config, Error};

/// Size of the buffer used for a single transport read.
const READ_CHUNK: usize = 18 * 1024;

/// Which side of the handshake a session plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Server,
}

/// Lifecycle of a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Created, handshake not started.
    Init,
    /// Handshake in progress, possibly suspended on a non-blocking transport.
    Handshaking,
    /// Handshake complete, application data flows.
    Established,
    /// close_notify queued, not flushed yet.
    Closing,
    Closed,
    /// The session failed. Absorbing; keys are wiped.
    Error(ErrorKind),
}

enum Endpoint {
    Client(Box<Client>),
    Server(Box<Server>),
}

impl Endpoint {
    fn engine(&self) -> &Engine {
        match self {
            Endpoint::Client(c) => c.engine(),
            Endpoint::Server(s) => s.engine(),
        }
    }

    fn engine_mut(&mut self) -> &mut Engine {
        match self {
            Endpoint::Client(c) => c.engine_mut(),
            Endpoint::Server(s) => s.engine_mut(),
        }
    }

    fn make_progress(&mut self) -> Result<(), Error> {
        match self {
            Endpoint::Client(c) => c.make_progress(),
            Endpoint::Server(s) => s.make_progress(),
        }
    }

    fn is_established(&self) -> bool {
        match self {
            Endpoint::Client(c) => c.is_established(),
            Endpoint::Server(s) => s.is_established(),
        }
    }
}

/// A TLS 1.3 session bound to a transport.
pub struct Session<T: Transport> {
    transport: T,
    endpoint: Endpoint,
    state: SessionState,
    trust: TrustPolicy,
    verification: VerificationStatus,
}

impl<T: Transport> Session<T> {
    /// Create a client session.
    ///
    /// The server_name sent to the peer comes from the expected identity in
    /// `trust`. `certified_key` is only used if the server asks for a client
    /// certificate.
    pub fn client(
        transport: T,
        config: Arc<Config>,
        trust: TrustPolicy,
        certified_key: Option<CertifiedKey>,
    ) -> Session<T> {
        let engine = Engine::new(config, Role::Client);
        let server_name = trust.expected_identity().and_then(|i| i.server_name());
        let client = Client::new(engine, certified_key, server_name);

        Session {
            transport,
            endpoint: Endpoint::Client(Box::new(client)),
            state: SessionState::Init,
            trust,
            verification: VerificationStatus::Unset,
        }
    }

    /// Create a server session presenting `certified_key`.
    pub fn server(
        transport: T,
        config: Arc<Config>,
        trust: TrustPolicy,
        certified_key: CertifiedKey,
    ) -> Session<T> {
        let engine = Engine::new(config, Role::Server);
        let server = Server::new(
            engine,
            certified_key,
            trust.requests_client_certificate(),
            trust.requires_client_certificate(),
        );

        Session {
            transport,
            endpoint: Endpoint::Server(Box::new(server)),
            state: SessionState::Init,
            trust,
            verification: VerificationStatus::Unset,
        }
    }

    /// Run the handshake to completion.
    ///
    /// On a non-blocking transport this returns [`Error::WouldBlock`] when it
    /// has to wait; call it again to resume. Calling it on an established
    /// session is a no-op.
    pub fn start_handshake(&mut self) -> Result<(), Error> {
        match self.state {
            SessionState::Init => {
                debug!("Starting handshake as {:?}", self.role());
                self.set_state(SessionState::Handshaking);
            }
            SessionState::Handshaking => {}
            SessionState::Established => return Ok(()),
            state => {
                return Err(Error::InvalidState {
                    operation: "start_handshake",
                    state,
                })
            }
        }

        let result = self.drive_handshake();
        self.check(result)?;

        self.verification = if self.engine().peer_certificates().is_empty() {
            VerificationStatus::Unset
        } else {
            VerificationStatus::Pending
        };
        self.set_state(SessionState::Established);
        Ok(())
    }

    fn drive_handshake(&mut self) -> Result<(), Error> {
        loop {
            self.endpoint.make_progress()?;
            self.flush_output()?;

            if self.endpoint.is_established() {
                return Ok(());
            }

            self.receive()?;
        }
    }

    /// Read decrypted application data.
    ///
    /// Returns 0 once the peer has sent close_notify.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize, Error> {
        self.require_established("read")?;

        let result = self.read_inner(buf);
        self.check(result)
    }

    fn read_inner(&mut self, buf: &mut [u8]) -> Result<usize, Error> {
        loop {
            let read = self.engine_mut().read_app(buf)?;

            // A KeyUpdate may have queued an answer.
            self.flush_pending()?;

            if let Some(n) = read {
                return Ok(n);
            }

            self.receive()?;
        }
    }

    /// Encrypt and send `data`.
    ///
    /// Returns the number of bytes accepted, which is all of `data` unless
    /// an error is returned.
    pub fn write(&mut self, data: &[u8]) -> Result<usize, Error> {
        self.require_established("write")?;

        if data.is_empty() {
            return Ok(0);
        }

        // Push back on the caller before buffering more ciphertext.
        if self.engine().has_pending_output() {
            let result = self.flush_output();
            self.check(result)?;
        }

        let result = self.engine_mut().write_app(data);
        self.check(result)?;

        self.flush_pending()?;
        Ok(data.len())
    }

    /// Write any ciphertext still held by the session.
    pub fn flush(&mut self) -> Result<(), Error> {
        match self.state {
            SessionState::Handshaking | SessionState::Established | SessionState::Closing => {}
            state => {
                return Err(Error::InvalidState {
                    operation: "flush",
                    state,
                })
            }
        }

        let result = self
            .flush_output()
            .and_then(|_| self.transport.flush().map_err(Error::from_io));
        self.check(result)
    }

    /// Send close_notify, wipe the keys and shut the transport down.
    ///
    /// The session ends up `Closed` whatever the transport does. A failed
    /// session stays in its error state.
    pub fn close(&mut self) {
        match self.state {
            SessionState::Closed => return,
            SessionState::Error(_) => {
                self.shutdown_transport();
                return;
            }
            SessionState::Init => {}
            SessionState::Handshaking | SessionState::Established | SessionState::Closing => {
                if self.state != SessionState::Closing {
                    self.engine_mut().send_alert(AlertDescription::CloseNotify);
                    self.set_state(SessionState::Closing);
                }
                if let Err(e) = self.flush_output() {
                    warn!("Failed to send close_notify: {}", e);
                }
            }
        }

        self.engine_mut().wipe();
        self.shutdown_transport();
        self.set_state(SessionState::Closed);
    }

    /// Send a KeyUpdate and ask the peer to update its keys too.
    pub fn update_keys(&mut self) -> Result<(), Error> {
        self.require_established("update_keys")?;

        let result = self.engine_mut().update_keys(true);
        self.check(result)?;
        self.flush_pending()
    }

    /// Verify the peer's certificate chain with the session's trust policy.
    ///
    /// The outcome is kept in [`Session::verification`]. A peer without a
    /// certificate fails with [`VerifyError::UntrustedChain`].
    pub fn verify_peer(&mut self) -> Result<(), Error> {
        self.require_established("verify_peer")?;

        let chain = self.engine().peer_certificates();
        let result = match chain.split_first() {
            Some((leaf, intermediates)) => verify::verify_with_provider(
                leaf,
                intermediates,
                &self.trust,
                self.trust.expected_identity(),
                self.engine().config().crypto_provider(),
            ),
            None if self.trust.is_insecure() => Ok(()),
            None => Err(VerifyError::UntrustedChain),
        };

        match result {
            Ok(()) => {
                self.verification = VerificationStatus::Valid;
                Ok(())
            }
            Err(e) => {
                debug!("Peer verification failed: {}", e);
                self.verification = VerificationStatus::Invalid(e);
                Err(Error::Verify(e))
            }
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn role(&self) -> Role {
        self.engine().role()
    }

    pub fn trust_policy(&self) -> &TrustPolicy {
        &self.trust
    }

    pub fn verification(&self) -> VerificationStatus {
        self.verification
    }

    /// The peer's leaf certificate, if it sent one.
    ///
    /// `None` until the handshake completed, and after a failure.
    pub fn peer_certificate(&self) -> Option<Certificate> {
        self.authenticated_peer().first().cloned()
    }

    /// The peer's certificate chain, leaf first. Empty whenever
    /// [`Session::peer_certificate`] is `None`.
    pub fn peer_certificate_chain(&self) -> Vec<Certificate> {
        self.authenticated_peer().to_vec()
    }

    pub fn cipher_suite(&self) -> Option<CipherSuite> {
        self.engine().cipher_suite()
    }

    /// Always TLS 1.3 once a suite is negotiated.
    pub fn protocol_version(&self) -> Option<ProtocolVersion> {
        self.cipher_suite().map(|_| ProtocolVersion::TLS1_3)
    }

    pub fn key_exchange_group(&self) -> Option<NamedGroup> {
        self.engine().key_exchange_group()
    }

    /// Whether any traffic secret or key is still held.
    pub fn has_key_material(&self) -> bool {
        self.engine().holds_key_material()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn engine(&self) -> &Engine {
        self.endpoint.engine()
    }

    fn engine_mut(&mut self) -> &mut Engine {
        self.endpoint.engine_mut()
    }

    /// The peer chain once CertificateVerify and Finished were checked.
    fn authenticated_peer(&self) -> &[Certificate] {
        let completed = matches!(
            self.state,
            SessionState::Established | SessionState::Closing | SessionState::Closed
        ) && self.engine().is_established();

        if completed {
            self.engine().peer_certificates()
        } else {
            &[]
        }
    }

    fn set_state(&mut self, state: SessionState) {
        if self.state != state {
            trace!("{:?} -> {:?}", self.state, state);
            self.state = state;
        }
    }

    fn require_established(&self, operation: &'static str) -> Result<(), Error> {
        if self.state == SessionState::Established {
            Ok(())
        } else {
            Err(Error::InvalidState {
                operation,
                state: self.state,
            })
        }
    }

    /// Move to `Error` on fatal errors, sending an alert where one applies.
    fn check<R>(&mut self, result: Result<R, Error>) -> Result<R, Error> {
        match result {
            Err(e) if e.is_fatal() => {
                self.abort(&e);
                Err(e)
            }
            other => other,
        }
    }

    fn abort(&mut self, err: &Error) {
        debug!("Session failed: {}", err);

        let alert = self.engine_mut().take_pending_alert().or_else(|| err.alert());
        if let Some(alert) = alert {
            self.engine_mut().send_alert(alert);
            if let Err(e) = self.flush_output() {
                warn!("Failed to send alert {}: {}", alert, e);
            }
        }

        self.engine_mut().wipe();
        self.engine_mut().set_peer_certificates(Vec::new());
        self.set_state(SessionState::Error(err.kind()));
    }

    /// Flush, but leave ciphertext buffered if the transport would block.
    fn flush_pending(&mut self) -> Result<(), Error> {
        match self.flush_output() {
            Err(Error::WouldBlock) => Ok(()),
            result => self.check(result),
        }
    }

    fn flush_output(&mut self) -> Result<(), Error> {
        while self.endpoint.engine().has_pending_output() {
            let pending = self.endpoint.engine().pending_output();
            let n = match self.transport.write(pending) {
                Ok(0) => return Err(io::Error::from(io::ErrorKind::WriteZero).into()),
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(Error::from_io(e)),
            };
            self.endpoint.engine_mut().consume_output(n);
        }
        Ok(())
    }

    /// Read once from the transport into the engine.
    fn receive(&mut self) -> Result<(), Error> {
        let mut buf = [0u8; READ_CHUNK];
        loop {
            match self.transport.read(&mut buf) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "peer closed the transport without close_notify",
                    )
                    .into())
                }
                Ok(n) => {
                    self.engine_mut().feed(&buf[..n]);
                    return Ok(());
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(Error::from_io(e)),
            }
        }
    }

    fn shutdown_transport(&mut self) {
        if let Err(e) = self.transport.shutdown() {
            debug!("Transport shutdown failed: {}", e);
        }
    }
}

impl<T: Transport> std::fmt::Debug for Session<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("role", &self.role())
            .field("state", &self.state)
            .field("cipher_suite", &self.cipher_suite())
            .field("verification", &self.verification)
            .finish()
    }
}
