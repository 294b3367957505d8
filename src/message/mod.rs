//! TLS 1.3 handshake and alert messages (RFC 8446 Section 4 and 6).
//!
//! Every message has a nom `parse` and a `serialize` appending to a [`Buf`].
//! Messages own their bytes; the handshake layer keeps the raw encoding for
//! the transcript separately.

mod alert;
mod certificate;
mod certificate_request;
mod certificate_verify;
mod client_hello;
mod encrypted_extensions;
mod extension;
mod finished;
mod key_update;
mod server_hello;

pub(crate) use alert::Alert;
pub(crate) use certificate::{Certificate, CertificateEntry};
pub(crate) use certificate_request::CertificateRequest;
pub(crate) use certificate_verify::{signed_content, CertificateVerify};
pub(crate) use client_hello::ClientHello;
pub(crate) use encrypted_extensions::EncryptedExtensions;
pub(crate) use extension::{Extension, ExtensionContext, KeyShareEntry};
pub(crate) use finished::Finished;
pub(crate) use key_update::KeyUpdate;
pub(crate) use server_hello::ServerHello;

use nom::bytes::complete::take;
use nom::error::{Error, ErrorKind};
use nom::number::complete::{be_u16, be_u24, be_u8};
use nom::{Err, IResult};

use crate::buffer::Buf;
use crate::types::HandshakeType;

/// Length of the handshake message header (type + uint24 length).
pub(crate) const HANDSHAKE_HEADER_LEN: usize = 4;

/// A complete handshake message.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct Handshake {
    pub msg_type: HandshakeType,
    pub body: Body,
}

#[allow(clippy::large_enum_variant)]
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Body {
    ClientHello(ClientHello),
    ServerHello(ServerHello),
    NewSessionTicket,
    EncryptedExtensions(EncryptedExtensions),
    Certificate(Certificate),
    CertificateRequest(CertificateRequest),
    CertificateVerify(CertificateVerify),
    Finished(Finished),
    KeyUpdate(KeyUpdate),
    Unknown(u8),
}

impl Handshake {
    pub fn new(body: Body) -> Self {
        Handshake {
            msg_type: body.msg_type(),
            body,
        }
    }

    /// Peek the type and total length (header included) of the message at
    /// the front of `input`, if the header is complete.
    pub fn peek_header(input: &[u8]) -> Option<(HandshakeType, usize)> {
        if input.len() < HANDSHAKE_HEADER_LEN {
            return None;
        }
        let len = u32::from_be_bytes([0, input[1], input[2], input[3]]) as usize;
        Some((HandshakeType::from_u8(input[0]), HANDSHAKE_HEADER_LEN + len))
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], Handshake> {
        let (input, msg_type) = HandshakeType::parse(input)?;
        let (input, length) = be_u24(input)?;
        let (input, body_bytes) = take(length as usize)(input)?;

        let (rest, body) = Body::parse(body_bytes, msg_type)?;
        if !rest.is_empty() {
            return Err(Err::Failure(Error::new(rest, ErrorKind::LengthValue)));
        }

        Ok((input, Handshake { msg_type, body }))
    }

    pub fn serialize(&self, output: &mut Buf) {
        let mut body = Buf::new();
        self.body.serialize(&mut body);

        output.push(self.msg_type.as_u8());
        put_u24(output, body.len());
        output.extend_from_slice(&body);
    }
}

impl Body {
    fn msg_type(&self) -> HandshakeType {
        match self {
            Body::ClientHello(_) => HandshakeType::ClientHello,
            Body::ServerHello(_) => HandshakeType::ServerHello,
            Body::NewSessionTicket => HandshakeType::NewSessionTicket,
            Body::EncryptedExtensions(_) => HandshakeType::EncryptedExtensions,
            Body::Certificate(_) => HandshakeType::Certificate,
            Body::CertificateRequest(_) => HandshakeType::CertificateRequest,
            Body::CertificateVerify(_) => HandshakeType::CertificateVerify,
            Body::Finished(_) => HandshakeType::Finished,
            Body::KeyUpdate(_) => HandshakeType::KeyUpdate,
            Body::Unknown(v) => HandshakeType::Unknown(*v),
        }
    }

    pub fn parse(input: &[u8], msg_type: HandshakeType) -> IResult<&[u8], Body> {
        match msg_type {
            HandshakeType::ClientHello => {
                let (input, m) = ClientHello::parse(input)?;
                Ok((input, Body::ClientHello(m)))
            }
            HandshakeType::ServerHello => {
                let (input, m) = ServerHello::parse(input)?;
                Ok((input, Body::ServerHello(m)))
            }
            HandshakeType::NewSessionTicket => {
                // Resumption is not supported, the ticket is dropped unread.
                Ok((&input[input.len()..], Body::NewSessionTicket))
            }
            HandshakeType::EncryptedExtensions => {
                let (input, m) = EncryptedExtensions::parse(input)?;
                Ok((input, Body::EncryptedExtensions(m)))
            }
            HandshakeType::Certificate => {
                let (input, m) = Certificate::parse(input)?;
                Ok((input, Body::Certificate(m)))
            }
            HandshakeType::CertificateRequest => {
                let (input, m) = CertificateRequest::parse(input)?;
                Ok((input, Body::CertificateRequest(m)))
            }
            HandshakeType::CertificateVerify => {
                let (input, m) = CertificateVerify::parse(input)?;
                Ok((input, Body::CertificateVerify(m)))
            }
            HandshakeType::Finished => {
                let (input, m) = Finished::parse(input)?;
                Ok((input, Body::Finished(m)))
            }
            HandshakeType::KeyUpdate => {
                let (input, m) = KeyUpdate::parse(input)?;
                Ok((input, Body::KeyUpdate(m)))
            }
            other => Ok((&input[input.len()..], Body::Unknown(other.as_u8()))),
        }
    }

    pub fn serialize(&self, output: &mut Buf) {
        match self {
            Body::ClientHello(m) => m.serialize(output),
            Body::ServerHello(m) => m.serialize(output),
            Body::EncryptedExtensions(m) => m.serialize(output),
            Body::Certificate(m) => m.serialize(output),
            Body::CertificateRequest(m) => m.serialize(output),
            Body::CertificateVerify(m) => m.serialize(output),
            Body::Finished(m) => m.serialize(output),
            Body::KeyUpdate(m) => m.serialize(output),
            Body::NewSessionTicket | Body::Unknown(_) => {}
        }
    }
}

// Length-prefixed vectors (RFC 8446 Section 3.4).

pub(crate) fn vec_u8(input: &[u8]) -> IResult<&[u8], &[u8]> {
    let (input, len) = be_u8(input)?;
    take(len)(input)
}

pub(crate) fn vec_u16(input: &[u8]) -> IResult<&[u8], &[u8]> {
    let (input, len) = be_u16(input)?;
    take(len)(input)
}

pub(crate) fn vec_u24(input: &[u8]) -> IResult<&[u8], &[u8]> {
    let (input, len) = be_u24(input)?;
    take(len)(input)
}

/// Apply `f` repeatedly until `input` is exhausted.
pub(crate) fn many_exact<'a, O>(
    mut input: &'a [u8],
    mut f: impl FnMut(&'a [u8]) -> IResult<&'a [u8], O>,
) -> IResult<&'a [u8], Vec<O>> {
    let mut acc = Vec::new();
    while !input.is_empty() {
        let (rest, o) = f(input)?;
        input = rest;
        acc.push(o);
    }
    Ok((input, acc))
}

/// Fail the parse unless `rest` is empty.
pub(crate) fn exhausted(rest: &[u8]) -> Result<(), Err<Error<&[u8]>>> {
    if rest.is_empty() {
        Ok(())
    } else {
        Err(Err::Failure(Error::new(rest, ErrorKind::LengthValue)))
    }
}

pub(crate) fn put_u24(output: &mut Buf, len: usize) {
    output.extend_from_slice(&(len as u32).to_be_bytes()[1..]);
}

pub(crate) fn put_vec_u8(output: &mut Buf, data: &[u8]) {
    output.push(data.len() as u8);
    output.extend_from_slice(data);
}

pub(crate) fn put_vec_u16(output: &mut Buf, data: &[u8]) {
    output.extend_from_slice(&(data.len() as u16).to_be_bytes());
    output.extend_from_slice(data);
}

pub(crate) fn put_vec_u24(output: &mut Buf, data: &[u8]) {
    put_u24(output, data.len());
    output.extend_from_slice(data);
}
