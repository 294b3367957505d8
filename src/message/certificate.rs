use nom::error::{Error, ErrorKind};
use nom::{Err, IResult};

use super::{many_exact, put_vec_u16, put_vec_u24, put_vec_u8, vec_u16, vec_u24, vec_u8};
use crate::buffer::Buf;

/// TLS 1.3 CertificateEntry (RFC 8446 Section 4.4.2).
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CertificateEntry {
    pub cert_data: Vec<u8>,
    /// Raw extension block; tlsock neither sends nor reads entry extensions.
    pub extensions: Vec<u8>,
}

impl CertificateEntry {
    pub fn parse(input: &[u8]) -> IResult<&[u8], CertificateEntry> {
        let (input, cert_data) = vec_u24(input)?;
        if cert_data.is_empty() {
            return Err(Err::Failure(Error::new(input, ErrorKind::LengthValue)));
        }
        let (input, extensions) = vec_u16(input)?;
        Ok((
            input,
            CertificateEntry {
                cert_data: cert_data.to_vec(),
                extensions: extensions.to_vec(),
            },
        ))
    }

    pub fn serialize(&self, output: &mut Buf) {
        put_vec_u24(output, &self.cert_data);
        put_vec_u16(output, &self.extensions);
    }
}

/// TLS 1.3 Certificate message (RFC 8446 Section 4.4.2).
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Certificate {
    pub context: Vec<u8>,
    pub certificate_list: Vec<CertificateEntry>,
}

impl Certificate {
    /// Build a Certificate message from DER certificates, leaf first.
    pub fn from_chain<'a>(context: &[u8], chain: impl IntoIterator<Item = &'a [u8]>) -> Self {
        Certificate {
            context: context.to_vec(),
            certificate_list: chain
                .into_iter()
                .map(|der| CertificateEntry {
                    cert_data: der.to_vec(),
                    extensions: Vec::new(),
                })
                .collect(),
        }
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], Certificate> {
        let (input, context) = vec_u8(input)?;
        let (input, list) = vec_u24(input)?;
        let (_, certificate_list) = many_exact(list, CertificateEntry::parse)?;
        Ok((
            input,
            Certificate {
                context: context.to_vec(),
                certificate_list,
            },
        ))
    }

    pub fn serialize(&self, output: &mut Buf) {
        put_vec_u8(output, &self.context);
        let mut list = Buf::new();
        for entry in &self.certificate_list {
            entry.serialize(&mut list);
        }
        put_vec_u24(output, &list);
    }
}
