use nom::IResult;

use super::extension::{parse_extensions, serialize_extensions};
use super::{put_vec_u8, vec_u8};
use super::{Extension, ExtensionContext};
use crate::buffer::Buf;
use crate::types::SignatureScheme;

/// CertificateRequest (RFC 8446 Section 4.3.2).
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CertificateRequest {
    pub context: Vec<u8>,
    pub extensions: Vec<Extension>,
}

impl CertificateRequest {
    pub fn new(schemes: &[SignatureScheme]) -> Self {
        CertificateRequest {
            // Empty outside of post-handshake authentication.
            context: Vec::new(),
            extensions: vec![Extension::SignatureAlgorithms(schemes.to_vec())],
        }
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], CertificateRequest> {
        let (input, context) = vec_u8(input)?;
        let (input, extensions) =
            parse_extensions(input, ExtensionContext::CertificateRequest, false)?;
        Ok((
            input,
            CertificateRequest {
                context: context.to_vec(),
                extensions,
            },
        ))
    }

    pub fn serialize(&self, output: &mut Buf) {
        put_vec_u8(output, &self.context);
        serialize_extensions(&self.extensions, output);
    }

    pub fn signature_algorithms(&self) -> Option<&[SignatureScheme]> {
        self.extensions.iter().find_map(|e| match e {
            Extension::SignatureAlgorithms(v) => Some(v.as_slice()),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let req = CertificateRequest::new(&[SignatureScheme::ECDSA_SECP384R1_SHA384]);
        let mut out = Buf::new();
        req.serialize(&mut out);
        let (rest, parsed) = CertificateRequest::parse(&out).unwrap();
        assert!(rest.is_empty());
        assert_eq!(
            parsed.signature_algorithms(),
            Some(&[SignatureScheme::ECDSA_SECP384R1_SHA384][..])
        );
    }
}
