use nom::IResult;

use super::{put_vec_u16, vec_u16};
use crate::buffer::Buf;
use crate::types::SignatureScheme;

/// CertificateVerify (RFC 8446 Section 4.4.3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CertificateVerify {
    pub scheme: SignatureScheme,
    pub signature: Vec<u8>,
}

impl CertificateVerify {
    pub fn parse(input: &[u8]) -> IResult<&[u8], CertificateVerify> {
        let (input, scheme) = SignatureScheme::parse(input)?;
        let (input, signature) = vec_u16(input)?;
        Ok((
            input,
            CertificateVerify {
                scheme,
                signature: signature.to_vec(),
            },
        ))
    }

    pub fn serialize(&self, output: &mut Buf) {
        output.extend_from_slice(&self.scheme.as_u16().to_be_bytes());
        put_vec_u16(output, &self.signature);
    }
}

/// Content covered by the CertificateVerify signature.
///
/// 64 spaces, a context string, a zero byte, then the transcript hash.
pub(crate) fn signed_content(server: bool, transcript_hash: &[u8]) -> Buf {
    let context: &[u8] = if server {
        b"TLS 1.3, server CertificateVerify"
    } else {
        b"TLS 1.3, client CertificateVerify"
    };

    let mut out = Buf::new();
    out.resize(64, 0x20);
    out.extend_from_slice(context);
    out.push(0);
    out.extend_from_slice(transcript_hash);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let cv = CertificateVerify {
            scheme: SignatureScheme::ECDSA_SECP256R1_SHA256,
            signature: vec![0x30, 0x02, 0x01, 0x00],
        };
        let mut out = Buf::new();
        cv.serialize(&mut out);
        assert_eq!(&out[..4], &[0x04, 0x03, 0x00, 0x04]);
        let (_, parsed) = CertificateVerify::parse(&out).unwrap();
        assert_eq!(parsed, cv);
    }

    #[test]
    fn signed_content_layout() {
        let content = signed_content(true, &[0xAA; 32]);
        assert_eq!(content.len(), 64 + 33 + 1 + 32);
        assert!(content[..64].iter().all(|b| *b == 0x20));
        assert_eq!(&content[64..97], b"TLS 1.3, server CertificateVerify");
        assert_eq!(content[97], 0);
    }
}
