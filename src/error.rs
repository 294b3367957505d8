use std::io;

use thiserror::Error;

use crate::session::SessionState;
use crate::types::AlertDescription;
use crate::verify::VerifyError;

/// Errors surfaced by sessions, certificates and key loading.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O failure on the underlying transport, including EOF without close_notify.
    #[error("Transport error: {0}")]
    Transport(#[source] io::Error),

    /// The non-blocking transport cannot make progress right now.
    ///
    /// The session keeps its partial state. Retry the same operation later.
    #[error("Operation would block")]
    WouldBlock,

    /// The peer aborted the handshake with an alert.
    #[error("Handshake failed, peer sent alert: {0}")]
    HandshakeFailed(AlertDescription),

    /// The peer sent a fatal alert after the handshake completed.
    #[error("Peer sent fatal alert: {0}")]
    AlertReceived(AlertDescription),

    /// Malformed, out-of-order or cryptographically invalid message.
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    /// Local and peer configuration share no cipher suite, group or signature scheme.
    #[error("No common parameters: {0}")]
    NoCommonParameters(String),

    /// The server requires a client certificate and the client sent none.
    #[error("Peer did not present a required certificate")]
    PeerCertificateRequired,

    /// Certificate bytes could not be decoded.
    #[error("Malformed certificate: {0}")]
    MalformedCertificate(String),

    /// Private key bytes could not be decoded or do not match the certificate.
    #[error("Invalid private key: {0}")]
    InvalidKey(String),

    /// Certificate verification failed.
    #[error("Certificate verification failed: {0}")]
    Verify(#[from] VerifyError),

    /// Operation invoked outside of the state it is valid in.
    #[error("Invalid state for {operation}: {state:?}")]
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Failure inside the crypto provider.
    #[error("Crypto error: {0}")]
    Crypto(String),
}

/// Copyable classification of an [`Error`].
///
/// Kept in [`SessionState::Error`] after a session failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transport,
    WouldBlock,
    HandshakeFailed(AlertDescription),
    AlertReceived(AlertDescription),
    ProtocolViolation,
    NoCommonParameters,
    PeerCertificateRequired,
    MalformedCertificate,
    InvalidKey,
    Verify,
    InvalidState,
    Config,
    Crypto,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Transport(_) => ErrorKind::Transport,
            Error::WouldBlock => ErrorKind::WouldBlock,
            Error::HandshakeFailed(a) => ErrorKind::HandshakeFailed(*a),
            Error::AlertReceived(a) => ErrorKind::AlertReceived(*a),
            Error::ProtocolViolation(_) => ErrorKind::ProtocolViolation,
            Error::NoCommonParameters(_) => ErrorKind::NoCommonParameters,
            Error::PeerCertificateRequired => ErrorKind::PeerCertificateRequired,
            Error::MalformedCertificate(_) => ErrorKind::MalformedCertificate,
            Error::InvalidKey(_) => ErrorKind::InvalidKey,
            Error::Verify(_) => ErrorKind::Verify,
            Error::InvalidState { .. } => ErrorKind::InvalidState,
            Error::Config(_) => ErrorKind::Config,
            Error::Crypto(_) => ErrorKind::Crypto,
        }
    }

    /// The alert to send to the peer when this error is detected locally.
    ///
    /// `None` for errors that originate from the peer or from the caller.
    pub(crate) fn alert(&self) -> Option<AlertDescription> {
        match self {
            Error::ProtocolViolation(_) => Some(AlertDescription::UnexpectedMessage),
            Error::NoCommonParameters(_) => Some(AlertDescription::HandshakeFailure),
            Error::PeerCertificateRequired => Some(AlertDescription::CertificateRequired),
            Error::MalformedCertificate(_) => Some(AlertDescription::BadCertificate),
            Error::Crypto(_) => Some(AlertDescription::InternalError),
            _ => None,
        }
    }

    /// Whether the error ends the session.
    pub(crate) fn is_fatal(&self) -> bool {
        !matches!(self, Error::WouldBlock | Error::InvalidState { .. })
    }

    pub(crate) fn from_io(e: io::Error) -> Error {
        if e.kind() == io::ErrorKind::WouldBlock {
            Error::WouldBlock
        } else {
            Error::Transport(e)
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::from_io(e)
    }
}

impl From<Error> for io::Error {
    fn from(e: Error) -> Self {
        match e {
            Error::Transport(e) => e,
            Error::WouldBlock => io::ErrorKind::WouldBlock.into(),
            Error::InvalidState { .. } => io::Error::new(io::ErrorKind::NotConnected, e),
            other => io::Error::new(io::ErrorKind::Other, other),
        }
    }
}

/// Protocol violation with a formatted message.
macro_rules! violation {
    ($($arg:tt)*) => {
        $crate::Error::ProtocolViolation(format!($($arg)*))
    };
}
pub(crate) use violation;
