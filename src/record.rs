//! TLS record layer framing and protection (RFC 8446 Section 5).

use nom::number::complete::{be_u16, be_u8};
use nom::IResult;
use zeroize::Zeroize;

use crate::buffer::Buf;
use crate::config::MAX_FRAGMENT_LEN;
use crate::crypto::key_schedule::TrafficKeys;
use crate::crypto::{Cipher, SupportedCipherSuite};
use crate::types::ContentType;
use crate::Error;

/// type(1) + legacy_record_version(2) + length(2)
pub(crate) const RECORD_HEADER_LEN: usize = 5;

/// Largest TLSCiphertext.length a peer may send.
pub(crate) const MAX_CIPHERTEXT_LEN: usize = MAX_FRAGMENT_LEN + 256;

/// legacy_record_version of every record tlsock writes.
const LEGACY_RECORD_VERSION: u16 = 0x0303;

/// Record header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RecordHeader {
    pub content_type: ContentType,
    pub legacy_version: u16,
    pub length: u16,
}

impl RecordHeader {
    pub fn new(content_type: ContentType, length: usize) -> Self {
        RecordHeader {
            content_type,
            legacy_version: LEGACY_RECORD_VERSION,
            length: length as u16,
        }
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], RecordHeader> {
        let (input, content_type) = be_u8(input)?;
        let (input, legacy_version) = be_u16(input)?;
        let (input, length) = be_u16(input)?;
        Ok((
            input,
            RecordHeader {
                content_type: ContentType::from_u8(content_type),
                legacy_version,
                length,
            },
        ))
    }

    pub fn to_bytes(self) -> [u8; RECORD_HEADER_LEN] {
        let v = self.legacy_version.to_be_bytes();
        let l = self.length.to_be_bytes();
        [self.content_type.as_u8(), v[0], v[1], l[0], l[1]]
    }
}

/// Write an unprotected record.
pub(crate) fn write_plaintext(content_type: ContentType, fragment: &[u8], out: &mut Buf) {
    out.extend_from_slice(&RecordHeader::new(content_type, fragment.len()).to_bytes());
    out.extend_from_slice(fragment);
}

/// AEAD state for one direction of one traffic secret.
pub(crate) struct RecordProtection {
    cipher: Box<dyn Cipher>,
    iv: [u8; 12],
    tag_len: usize,
    seq: u64,
}

impl std::fmt::Debug for RecordProtection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordProtection")
            .field("seq", &self.seq)
            .finish_non_exhaustive()
    }
}

impl RecordProtection {
    pub fn new(suite: &dyn SupportedCipherSuite, keys: TrafficKeys) -> Result<Self, Error> {
        let cipher = suite.create_cipher(&keys.key).map_err(Error::Crypto)?;
        Ok(RecordProtection {
            cipher,
            iv: keys.iv,
            tag_len: suite.tag_len(),
            seq: 0,
        })
    }

    /// Per-record nonce: the static IV XOR the left-padded sequence number.
    fn nonce(&self) -> [u8; 12] {
        let mut nonce = self.iv;
        for (n, s) in nonce[4..].iter_mut().zip(self.seq.to_be_bytes()) {
            *n ^= s;
        }
        nonce
    }

    fn next_seq(&mut self) -> Result<(), Error> {
        // A sequence number must never wrap; the peer has to rekey first.
        self.seq = self
            .seq
            .checked_add(1)
            .ok_or_else(|| Error::Crypto("Record sequence number exhausted".into()))?;
        Ok(())
    }

    /// Encrypt `fragment` as TLSInnerPlaintext and append the record to `out`.
    pub fn seal(
        &mut self,
        content_type: ContentType,
        fragment: &[u8],
        out: &mut Buf,
    ) -> Result<(), Error> {
        let mut inner = Buf::new();
        inner.extend_from_slice(fragment);
        inner.push(content_type.as_u8());

        let header =
            RecordHeader::new(ContentType::ApplicationData, inner.len() + self.tag_len).to_bytes();

        let nonce = self.nonce();
        self.cipher
            .encrypt(&mut inner, &header, &nonce)
            .map_err(Error::Crypto)?;
        self.next_seq()?;

        out.extend_from_slice(&header);
        out.extend_from_slice(&inner);
        Ok(())
    }

    /// Decrypt a protected record, returning the inner content type and plaintext.
    pub fn open(
        &mut self,
        header: &[u8; RECORD_HEADER_LEN],
        ciphertext: &[u8],
    ) -> Result<(ContentType, Buf), OpenError> {
        let mut buf = Buf::from_slice(ciphertext);
        let nonce = self.nonce();
        self.cipher
            .decrypt(&mut buf, header, &nonce)
            .map_err(|_| OpenError::BadRecordMac)?;
        self.next_seq().map_err(|_| OpenError::BadRecordMac)?;

        if buf.len() > MAX_FRAGMENT_LEN + 1 {
            return Err(OpenError::Overflow);
        }

        // Strip zero padding; the last non-zero byte is the real content type.
        let Some(pos) = buf.iter().rposition(|b| *b != 0) else {
            return Err(OpenError::NoContentType);
        };
        let content_type = ContentType::from_u8(buf[pos]);
        buf.truncate(pos);

        Ok((content_type, buf))
    }
}

impl Drop for RecordProtection {
    fn drop(&mut self) {
        self.iv.zeroize();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OpenError {
    BadRecordMac,
    Overflow,
    NoContentType,
}
