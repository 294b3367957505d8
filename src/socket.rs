//! Blocking TLS sockets on top of [`Session`].

use std::io::{self, Read, Write};
use std::net::{TcpListener, TcpStream, ToSocketAddrs};
use std::sync::Arc;

use crate::certificate::Certificate;
use crate::session::{Session, SessionState};
use crate::transport::Transport;
use crate::trust::TrustPolicy;
use crate::verify::VerificationStatus;
use crate::{CertifiedKey, Config, Error};

/// A connected, handshaken and verified TLS stream.
///
/// The client verifies the server against the trust policy before
/// `connect` returns. The server verifies the client certificate when the
/// client presented one.
pub struct TlsSocket<T: Transport = TcpStream> {
    session: Session<T>,
}

impl TlsSocket<TcpStream> {
    /// Connect over TCP and perform the client handshake.
    ///
    /// Connection attempts are not retried.
    pub fn connect<A: ToSocketAddrs>(
        addr: A,
        config: Arc<Config>,
        trust: TrustPolicy,
    ) -> Result<Self, Error> {
        let stream = TcpStream::connect(addr)?;
        stream.set_nodelay(true)?;
        Self::client(stream, config, trust, None)
    }

    /// Accept one TCP connection and perform the server handshake.
    pub fn accept(
        listener: &TcpListener,
        config: Arc<Config>,
        trust: TrustPolicy,
        certified_key: CertifiedKey,
    ) -> Result<Self, Error> {
        let (stream, peer) = listener.accept()?;
        debug!("Accepted connection from {}", peer);
        stream.set_nodelay(true)?;
        Self::server(stream, config, trust, certified_key)
    }
}

impl<T: Transport> TlsSocket<T> {
    /// Client handshake over an already connected transport.
    pub fn client(
        transport: T,
        config: Arc<Config>,
        trust: TrustPolicy,
        certified_key: Option<CertifiedKey>,
    ) -> Result<Self, Error> {
        let session = Session::client(transport, config, trust, certified_key);
        Self::establish(session)
    }

    /// Server handshake over an already accepted transport.
    pub fn server(
        transport: T,
        config: Arc<Config>,
        trust: TrustPolicy,
        certified_key: CertifiedKey,
    ) -> Result<Self, Error> {
        let session = Session::server(transport, config, trust, certified_key);
        Self::establish(session)
    }

    fn establish(mut session: Session<T>) -> Result<Self, Error> {
        session.start_handshake()?;

        // Servers always present a certificate, so a client always verifies.
        if session.verification() == VerificationStatus::Pending {
            if let Err(e) = session.verify_peer() {
                session.close();
                return Err(e);
            }
        }

        Ok(TlsSocket { session })
    }

    pub fn session(&self) -> &Session<T> {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session<T> {
        &mut self.session
    }

    pub fn into_session(self) -> Session<T> {
        self.session
    }

    pub fn peer_certificate(&self) -> Option<Certificate> {
        self.session.peer_certificate()
    }

    /// Send close_notify and shut the transport down.
    pub fn close(&mut self) {
        self.session.close();
    }

    pub fn is_closed(&self) -> bool {
        matches!(
            self.session.state(),
            SessionState::Closed | SessionState::Error(_)
        )
    }
}

impl<T: Transport> Read for TlsSocket<T> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(self.session.read(buf)?)
    }
}

impl<T: Transport> Write for TlsSocket<T> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(self.session.write(buf)?)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(self.session.flush()?)
    }
}

impl<T: Transport> std::fmt::Debug for TlsSocket<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsSocket")
            .field("session", &self.session)
            .finish()
    }
}
