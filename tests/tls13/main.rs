//! TLS 1.3 session, verification and socket tests.

mod certificate;
mod common;
mod handshake;
mod session;
mod socket;
mod verify;
