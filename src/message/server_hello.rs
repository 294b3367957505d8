use nom::bytes::complete::take;
use nom::number::complete::be_u8;
use nom::IResult;

use super::extension::{parse_extensions, serialize_extensions};
use super::{put_vec_u8, vec_u8};
use super::{Extension, ExtensionContext, KeyShareEntry};
use crate::buffer::Buf;
use crate::types::{CipherSuite, ProtocolVersion};

/// `Random` of a HelloRetryRequest, SHA-256("HelloRetryRequest").
pub(crate) const HELLO_RETRY_REQUEST_RANDOM: [u8; 32] = [
    0xCF, 0x21, 0xAD, 0x74, 0xE5, 0x9A, 0x61, 0x11, 0xBE, 0x1D, 0x8C, 0x02, 0x1E, 0x65, 0xB8, 0x91,
    0xC2, 0xA2, 0x11, 0x16, 0x7A, 0xBB, 0x8C, 0x5E, 0x07, 0x9E, 0x09, 0xE2, 0xC8, 0xA8, 0x33, 0x9C,
];

/// ServerHello (RFC 8446 Section 4.1.3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ServerHello {
    pub legacy_version: ProtocolVersion,
    pub random: [u8; 32],
    pub legacy_session_id_echo: Vec<u8>,
    pub cipher_suite: CipherSuite,
    pub legacy_compression_method: u8,
    pub extensions: Vec<Extension>,
}

impl ServerHello {
    pub fn parse(input: &[u8]) -> IResult<&[u8], ServerHello> {
        let (input, legacy_version) = ProtocolVersion::parse(input)?;
        let (input, random_bytes) = take(32usize)(input)?;
        let (input, legacy_session_id_echo) = vec_u8(input)?;
        let (input, cipher_suite) = CipherSuite::parse(input)?;
        let (input, legacy_compression_method) = be_u8(input)?;

        let mut random = [0u8; 32];
        random.copy_from_slice(random_bytes);
        let hello_retry = random == HELLO_RETRY_REQUEST_RANDOM;

        let (input, extensions) = if input.is_empty() {
            (input, Vec::new())
        } else {
            parse_extensions(input, ExtensionContext::ServerHello, hello_retry)?
        };

        Ok((
            input,
            ServerHello {
                legacy_version,
                random,
                legacy_session_id_echo: legacy_session_id_echo.to_vec(),
                cipher_suite,
                legacy_compression_method,
                extensions,
            },
        ))
    }

    pub fn serialize(&self, output: &mut Buf) {
        output.extend_from_slice(&self.legacy_version.as_u16().to_be_bytes());
        output.extend_from_slice(&self.random);
        put_vec_u8(output, &self.legacy_session_id_echo);
        output.extend_from_slice(&self.cipher_suite.as_u16().to_be_bytes());
        output.push(self.legacy_compression_method);
        serialize_extensions(&self.extensions, output);
    }

    pub fn is_hello_retry_request(&self) -> bool {
        self.random == HELLO_RETRY_REQUEST_RANDOM
    }

    pub fn selected_version(&self) -> Option<ProtocolVersion> {
        self.extensions.iter().find_map(|e| match e {
            Extension::SelectedVersion(v) => Some(*v),
            _ => None,
        })
    }

    pub fn key_share(&self) -> Option<&KeyShareEntry> {
        self.extensions.iter().find_map(|e| match e {
            Extension::KeyShare(entry) => Some(entry),
            _ => None,
        })
    }
}
