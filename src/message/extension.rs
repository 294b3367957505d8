use nom::error::{Error, ErrorKind};
use nom::number::complete::{be_u16, be_u8};
use nom::{Err, IResult};

use super::{exhausted, many_exact, put_vec_u16, put_vec_u8, vec_u16, vec_u8};
use crate::buffer::Buf;
use crate::types::{ExtensionType, NamedGroup, ProtocolVersion, SignatureScheme};

/// Which message an extension block belongs to.
///
/// Several extensions have a different body depending on the carrier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ExtensionContext {
    ClientHello,
    ServerHello,
    EncryptedExtensions,
    CertificateRequest,
    Certificate,
}

/// A single KeyShareEntry (RFC 8446 Section 4.2.8).
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct KeyShareEntry {
    pub group: NamedGroup,
    pub key_exchange: Vec<u8>,
}

impl KeyShareEntry {
    pub fn parse(input: &[u8]) -> IResult<&[u8], KeyShareEntry> {
        let (input, group) = NamedGroup::parse(input)?;
        let (input, key_exchange) = vec_u16(input)?;
        if key_exchange.is_empty() {
            return Err(Err::Failure(Error::new(input, ErrorKind::LengthValue)));
        }
        Ok((
            input,
            KeyShareEntry {
                group,
                key_exchange: key_exchange.to_vec(),
            },
        ))
    }

    pub fn serialize(&self, output: &mut Buf) {
        output.extend_from_slice(&self.group.as_u16().to_be_bytes());
        put_vec_u16(output, &self.key_exchange);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Extension {
    /// Host name in ClientHello, `None` for the empty acknowledgement in
    /// EncryptedExtensions.
    ServerName(Option<String>),
    SupportedGroups(Vec<NamedGroup>),
    SignatureAlgorithms(Vec<SignatureScheme>),
    /// Offered versions (ClientHello).
    SupportedVersions(Vec<ProtocolVersion>),
    /// Selected version (ServerHello).
    SelectedVersion(ProtocolVersion),
    /// Offered shares (ClientHello).
    KeyShares(Vec<KeyShareEntry>),
    /// Selected share (ServerHello).
    KeyShare(KeyShareEntry),
    /// Group demanded by a HelloRetryRequest.
    KeyShareRetry(NamedGroup),
    Unknown(u16, Vec<u8>),
}

impl Extension {
    pub fn extension_type(&self) -> ExtensionType {
        match self {
            Extension::ServerName(_) => ExtensionType::ServerName,
            Extension::SupportedGroups(_) => ExtensionType::SupportedGroups,
            Extension::SignatureAlgorithms(_) => ExtensionType::SignatureAlgorithms,
            Extension::SupportedVersions(_) | Extension::SelectedVersion(_) => {
                ExtensionType::SupportedVersions
            }
            Extension::KeyShares(_) | Extension::KeyShare(_) | Extension::KeyShareRetry(_) => {
                ExtensionType::KeyShare
            }
            Extension::Unknown(t, _) => ExtensionType::Unknown(*t),
        }
    }

    pub fn parse(
        input: &[u8],
        ctx: ExtensionContext,
        hello_retry: bool,
    ) -> IResult<&[u8], Extension> {
        let (input, ext_type) = be_u16(input)?;
        let (input, data) = vec_u16(input)?;
        let ext_type = ExtensionType::from_u16(ext_type);

        // Extensions are only decoded where tlsock acts on them.
        let decoded = match (ext_type, ctx) {
            (ExtensionType::ServerName, ExtensionContext::ClientHello) => {
                Some(Self::parse_server_name(data)?)
            }
            (ExtensionType::ServerName, ExtensionContext::EncryptedExtensions) => {
                exhausted(data)?;
                Some(Extension::ServerName(None))
            }
            (ExtensionType::SupportedGroups, ExtensionContext::ClientHello) => {
                let (rest, list) = vec_u16(data)?;
                exhausted(rest)?;
                let (_, groups) = many_exact(list, NamedGroup::parse)?;
                Some(Extension::SupportedGroups(groups))
            }
            (
                ExtensionType::SignatureAlgorithms,
                ExtensionContext::ClientHello | ExtensionContext::CertificateRequest,
            ) => {
                let (rest, list) = vec_u16(data)?;
                exhausted(rest)?;
                let (_, schemes) = many_exact(list, SignatureScheme::parse)?;
                if schemes.is_empty() {
                    return Err(Err::Failure(Error::new(data, ErrorKind::LengthValue)));
                }
                Some(Extension::SignatureAlgorithms(schemes))
            }
            (ExtensionType::SupportedVersions, ExtensionContext::ClientHello) => {
                let (rest, list) = vec_u8(data)?;
                exhausted(rest)?;
                let (_, versions) = many_exact(list, ProtocolVersion::parse)?;
                Some(Extension::SupportedVersions(versions))
            }
            (ExtensionType::SupportedVersions, ExtensionContext::ServerHello) => {
                let (rest, version) = ProtocolVersion::parse(data)?;
                exhausted(rest)?;
                Some(Extension::SelectedVersion(version))
            }
            (ExtensionType::KeyShare, ExtensionContext::ClientHello) => {
                let (rest, list) = vec_u16(data)?;
                exhausted(rest)?;
                let (_, entries) = many_exact(list, KeyShareEntry::parse)?;
                Some(Extension::KeyShares(entries))
            }
            (ExtensionType::KeyShare, ExtensionContext::ServerHello) if hello_retry => {
                let (rest, group) = NamedGroup::parse(data)?;
                exhausted(rest)?;
                Some(Extension::KeyShareRetry(group))
            }
            (ExtensionType::KeyShare, ExtensionContext::ServerHello) => {
                let (rest, entry) = KeyShareEntry::parse(data)?;
                exhausted(rest)?;
                Some(Extension::KeyShare(entry))
            }
            _ => None,
        };

        let ext = decoded.unwrap_or_else(|| Extension::Unknown(ext_type.as_u16(), data.to_vec()));
        Ok((input, ext))
    }

    fn parse_server_name(data: &[u8]) -> Result<Extension, Err<Error<&[u8]>>> {
        let (rest, list) = vec_u16(data)?;
        exhausted(rest)?;

        let mut host = None;
        let mut input = list;
        while !input.is_empty() {
            let (r, name_type) = be_u8(input)?;
            let (r, name) = vec_u16(r)?;
            // host_name(0) is the only defined type
            if name_type == 0 && host.is_none() {
                let name = std::str::from_utf8(name)
                    .map_err(|_| Err::Failure(Error::new(name, ErrorKind::Char)))?;
                host = Some(name.to_string());
            }
            input = r;
        }
        Ok(Extension::ServerName(host))
    }

    pub fn serialize(&self, output: &mut Buf) {
        let mut data = Buf::new();
        match self {
            Extension::ServerName(Some(host)) => {
                let mut entry = Buf::new();
                entry.push(0);
                put_vec_u16(&mut entry, host.as_bytes());
                put_vec_u16(&mut data, &entry);
            }
            Extension::ServerName(None) => {}
            Extension::SupportedGroups(groups) => {
                let mut list = Buf::new();
                for g in groups {
                    list.extend_from_slice(&g.as_u16().to_be_bytes());
                }
                put_vec_u16(&mut data, &list);
            }
            Extension::SignatureAlgorithms(schemes) => {
                let mut list = Buf::new();
                for s in schemes {
                    list.extend_from_slice(&s.as_u16().to_be_bytes());
                }
                put_vec_u16(&mut data, &list);
            }
            Extension::SupportedVersions(versions) => {
                let mut list = Buf::new();
                for v in versions {
                    list.extend_from_slice(&v.as_u16().to_be_bytes());
                }
                put_vec_u8(&mut data, &list);
            }
            Extension::SelectedVersion(v) => {
                data.extend_from_slice(&v.as_u16().to_be_bytes());
            }
            Extension::KeyShares(entries) => {
                let mut list = Buf::new();
                for e in entries {
                    e.serialize(&mut list);
                }
                put_vec_u16(&mut data, &list);
            }
            Extension::KeyShare(entry) => entry.serialize(&mut data),
            Extension::KeyShareRetry(group) => {
                data.extend_from_slice(&group.as_u16().to_be_bytes());
            }
            Extension::Unknown(_, bytes) => data.extend_from_slice(bytes),
        }

        output.extend_from_slice(&self.extension_type().as_u16().to_be_bytes());
        put_vec_u16(output, &data);
    }
}

/// Parse an `extensions<..2^16-1>` block, rejecting duplicates.
pub(crate) fn parse_extensions(
    input: &[u8],
    ctx: ExtensionContext,
    hello_retry: bool,
) -> IResult<&[u8], Vec<Extension>> {
    let (input, block) = vec_u16(input)?;
    let (_, extensions) = many_exact(block, |i| Extension::parse(i, ctx, hello_retry))?;

    for (i, ext) in extensions.iter().enumerate() {
        let t = ext.extension_type();
        if extensions[..i].iter().any(|e| e.extension_type() == t) {
            return Err(Err::Failure(Error::new(block, ErrorKind::Verify)));
        }
    }

    Ok((input, extensions))
}

pub(crate) fn serialize_extensions(extensions: &[Extension], output: &mut Buf) {
    let mut block = Buf::new();
    for ext in extensions {
        ext.serialize(&mut block);
    }
    put_vec_u16(output, &block);
}
