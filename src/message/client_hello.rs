use nom::bytes::complete::take;
use nom::error::{Error, ErrorKind};
use nom::{Err, IResult};

use super::extension::{parse_extensions, serialize_extensions};
use super::{put_vec_u16, put_vec_u8, vec_u16, vec_u8};
use super::{Extension, ExtensionContext, KeyShareEntry};
use crate::buffer::Buf;
use crate::types::{CipherSuite, NamedGroup, ProtocolVersion, SignatureScheme};

/// ClientHello (RFC 8446 Section 4.1.2).
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ClientHello {
    pub legacy_version: ProtocolVersion,
    pub random: [u8; 32],
    pub legacy_session_id: Vec<u8>,
    pub cipher_suites: Vec<CipherSuite>,
    pub legacy_compression_methods: Vec<u8>,
    pub extensions: Vec<Extension>,
}

impl ClientHello {
    pub fn parse(input: &[u8]) -> IResult<&[u8], ClientHello> {
        let (input, legacy_version) = ProtocolVersion::parse(input)?;
        let (input, random) = take(32usize)(input)?;
        let (input, legacy_session_id) = vec_u8(input)?;
        if legacy_session_id.len() > 32 {
            return Err(Err::Failure(Error::new(input, ErrorKind::LengthValue)));
        }

        let (input, suites) = vec_u16(input)?;
        if suites.len() % 2 != 0 || suites.is_empty() {
            return Err(Err::Failure(Error::new(suites, ErrorKind::LengthValue)));
        }
        let cipher_suites = suites
            .chunks(2)
            .map(|c| CipherSuite::from_u16(u16::from_be_bytes([c[0], c[1]])))
            .collect();

        let (input, compression) = vec_u8(input)?;

        // Extensions are mandatory in TLS 1.3, but a bare TLS 1.2 hello may omit them.
        let (input, extensions) = if input.is_empty() {
            (input, Vec::new())
        } else {
            parse_extensions(input, ExtensionContext::ClientHello, false)?
        };

        let mut r = [0u8; 32];
        r.copy_from_slice(random);

        Ok((
            input,
            ClientHello {
                legacy_version,
                random: r,
                legacy_session_id: legacy_session_id.to_vec(),
                cipher_suites,
                legacy_compression_methods: compression.to_vec(),
                extensions,
            },
        ))
    }

    pub fn serialize(&self, output: &mut Buf) {
        output.extend_from_slice(&self.legacy_version.as_u16().to_be_bytes());
        output.extend_from_slice(&self.random);
        put_vec_u8(output, &self.legacy_session_id);

        let mut suites = Buf::new();
        for s in &self.cipher_suites {
            suites.extend_from_slice(&s.as_u16().to_be_bytes());
        }
        put_vec_u16(output, &suites);

        put_vec_u8(output, &self.legacy_compression_methods);
        serialize_extensions(&self.extensions, output);
    }

    pub fn server_name(&self) -> Option<&str> {
        self.extensions.iter().find_map(|e| match e {
            Extension::ServerName(Some(name)) => Some(name.as_str()),
            _ => None,
        })
    }

    pub fn supported_versions(&self) -> Option<&[ProtocolVersion]> {
        self.extensions.iter().find_map(|e| match e {
            Extension::SupportedVersions(v) => Some(v.as_slice()),
            _ => None,
        })
    }

    pub fn supported_groups(&self) -> Option<&[NamedGroup]> {
        self.extensions.iter().find_map(|e| match e {
            Extension::SupportedGroups(v) => Some(v.as_slice()),
            _ => None,
        })
    }

    pub fn signature_algorithms(&self) -> Option<&[SignatureScheme]> {
        self.extensions.iter().find_map(|e| match e {
            Extension::SignatureAlgorithms(v) => Some(v.as_slice()),
            _ => None,
        })
    }

    pub fn key_shares(&self) -> Option<&[KeyShareEntry]> {
        self.extensions.iter().find_map(|e| match e {
            Extension::KeyShares(v) => Some(v.as_slice()),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ClientHello {
        ClientHello {
            legacy_version: ProtocolVersion::TLS1_2,
            random: [7; 32],
            legacy_session_id: vec![1; 32],
            cipher_suites: vec![CipherSuite::AES_128_GCM_SHA256, CipherSuite::Unknown(0x00ff)],
            legacy_compression_methods: vec![0],
            extensions: vec![
                Extension::ServerName(Some("example.org".into())),
                Extension::SupportedVersions(vec![ProtocolVersion::TLS1_3]),
                Extension::SupportedGroups(vec![NamedGroup::X25519]),
                Extension::SignatureAlgorithms(vec![SignatureScheme::ECDSA_SECP256R1_SHA256]),
                Extension::KeyShares(vec![KeyShareEntry {
                    group: NamedGroup::X25519,
                    key_exchange: vec![9; 32],
                }]),
            ],
        }
    }

    #[test]
    fn roundtrip_and_accessors() {
        let hello = sample();
        let mut out = Buf::new();
        hello.serialize(&mut out);

        let (rest, parsed) = ClientHello::parse(&out).unwrap();
        assert!(rest.is_empty());
        assert_eq!(parsed, hello);
        assert_eq!(parsed.server_name(), Some("example.org"));
        assert_eq!(parsed.supported_versions(), Some(&[ProtocolVersion::TLS1_3][..]));
        assert_eq!(parsed.key_shares().unwrap()[0].group, NamedGroup::X25519);
    }

    #[test]
    fn odd_cipher_suite_length_rejected() {
        let mut out = Buf::new();
        out.extend_from_slice(&[0x03, 0x03]);
        out.extend_from_slice(&[0; 32]);
        out.push(0);
        out.extend_from_slice(&[0x00, 0x03, 0x13, 0x01, 0x13]);
        out.extend_from_slice(&[0x01, 0x00]);
        assert!(ClientHello::parse(&out).is_err());
    }
}
