//! TLS 1.3 key schedule (RFC 8446 Section 7.1).
//!
//! ```text
//!              0
//!              |
//!              v
//!    0 ->  HKDF-Extract = Early Secret
//!              |
//!        Derive-Secret(., "derived", "")
//!              |
//!              v
//!    (EC)DHE -> HKDF-Extract = Handshake Secret
//!              |
//!              +-----> Derive-Secret(., "c hs traffic", ClientHello...ServerHello)
//!              +-----> Derive-Secret(., "s hs traffic", ClientHello...ServerHello)
//!              |
//!        Derive-Secret(., "derived", "")
//!              |
//!              v
//!    0 -> HKDF-Extract = Master Secret
//!              |
//!              +-----> Derive-Secret(., "c ap traffic", ClientHello...server Finished)
//!              +-----> Derive-Secret(., "s ap traffic", ClientHello...server Finished)
//! ```
//!
//! No PSK and no 0-RTT, so the early secret only feeds the first "derived".

use crate::buffer::Buf;
use crate::crypto::provider::{HkdfProvider, HmacProvider};
use crate::types::HashAlgorithm;

/// Tracks the current stage secret and derives traffic secrets from it.
///
/// Derived secrets are returned to the caller; only the stage secret is kept.
#[derive(Debug)]
pub(crate) struct KeySchedule {
    hkdf: &'static dyn HkdfProvider,
    hash: HashAlgorithm,
    current_secret: Buf,
}

/// AEAD key and static IV for one direction.
#[derive(Debug)]
pub(crate) struct TrafficKeys {
    pub key: Buf,
    pub iv: [u8; 12],
}

impl KeySchedule {
    /// Start a key schedule without PSK, positioned to accept the ECDHE secret.
    pub fn new(hkdf: &'static dyn HkdfProvider, hash: HashAlgorithm) -> Result<Self, String> {
        let zeros = vec![0u8; hash.output_len()];

        let mut early_secret = Buf::new();
        hkdf.hkdf_extract(hash, &[], &zeros, &mut early_secret)?;

        let mut this = Self {
            hkdf,
            hash,
            current_secret: early_secret,
        };
        let derived = this.derive_secret(&this.current_secret, b"derived", &this.empty_hash())?;
        this.current_secret = derived;

        Ok(this)
    }

    pub fn hash(&self) -> HashAlgorithm {
        self.hash
    }

    fn empty_hash(&self) -> Buf {
        // Hash("") for each supported hash, precomputed.
        match self.hash {
            HashAlgorithm::SHA384 => Buf::from_slice(&EMPTY_SHA384),
            _ => Buf::from_slice(&EMPTY_SHA256),
        }
    }

    fn derive_secret(&self, secret: &[u8], label: &[u8], context: &[u8]) -> Result<Buf, String> {
        let mut out = Buf::new();
        self.hkdf.hkdf_expand_label(
            self.hash,
            secret,
            label,
            context,
            &mut out,
            self.hash.output_len(),
        )?;
        Ok(out)
    }

    /// Mix in the ECDHE shared secret.
    ///
    /// Returns (client_handshake_traffic_secret, server_handshake_traffic_secret).
    pub fn derive_handshake_secrets(
        &mut self,
        ecdhe_secret: &[u8],
        transcript_hash: &[u8],
    ) -> Result<(Buf, Buf), String> {
        let mut handshake_secret = Buf::new();
        self.hkdf.hkdf_extract(
            self.hash,
            &self.current_secret,
            ecdhe_secret,
            &mut handshake_secret,
        )?;

        let client = self.derive_secret(&handshake_secret, b"c hs traffic", transcript_hash)?;
        let server = self.derive_secret(&handshake_secret, b"s hs traffic", transcript_hash)?;

        self.current_secret =
            self.derive_secret(&handshake_secret, b"derived", &self.empty_hash())?;

        Ok((client, server))
    }

    /// Derive the first application traffic secrets.
    ///
    /// Returns (client_application_traffic_secret_0, server_application_traffic_secret_0).
    pub fn derive_application_secrets(
        &mut self,
        transcript_hash: &[u8],
    ) -> Result<(Buf, Buf), String> {
        let zeros = vec![0u8; self.hash.output_len()];

        let mut master_secret = Buf::new();
        self.hkdf
            .hkdf_extract(self.hash, &self.current_secret, &zeros, &mut master_secret)?;

        let client = self.derive_secret(&master_secret, b"c ap traffic", transcript_hash)?;
        let server = self.derive_secret(&master_secret, b"s ap traffic", transcript_hash)?;

        // Nothing is derived from the master secret after this point
        drop(master_secret);
        self.current_secret.clear();

        Ok((client, server))
    }

    /// Derive key and IV from a traffic secret.
    pub fn derive_traffic_keys(
        &self,
        traffic_secret: &[u8],
        key_len: usize,
    ) -> Result<TrafficKeys, String> {
        let mut key = Buf::new();
        self.hkdf
            .hkdf_expand_label(self.hash, traffic_secret, b"key", &[], &mut key, key_len)?;

        let mut iv_buf = Buf::new();
        self.hkdf
            .hkdf_expand_label(self.hash, traffic_secret, b"iv", &[], &mut iv_buf, 12)?;
        let mut iv = [0u8; 12];
        iv.copy_from_slice(&iv_buf);

        Ok(TrafficKeys { key, iv })
    }

    /// application_traffic_secret_N+1 (RFC 8446 Section 7.2).
    pub fn derive_next_traffic_secret(&self, current_secret: &[u8]) -> Result<Buf, String> {
        self.derive_secret(current_secret, b"traffic upd", &[])
    }

    /// Finished verify_data for the given base traffic secret.
    ///
    /// ```text
    /// finished_key = HKDF-Expand-Label(BaseKey, "finished", "", Hash.length)
    /// verify_data  = HMAC(finished_key, Transcript-Hash(...))
    /// ```
    pub fn finished_verify_data(
        &self,
        hmac: &dyn HmacProvider,
        base_secret: &[u8],
        transcript_hash: &[u8],
    ) -> Result<Buf, String> {
        let finished_key = self.derive_secret(base_secret, b"finished", &[])?;
        let mut out = Buf::new();
        hmac.hmac(self.hash, &finished_key, transcript_hash, &mut out)?;
        Ok(out)
    }
}

impl Drop for KeySchedule {
    fn drop(&mut self) {
        self.current_secret.clear();
    }
}

const EMPTY_SHA256: [u8; 32] = [
    0xe3, 0xb0, 0xc4, 0x42, 0x98, 0xfc, 0x1c, 0x14, 0x9a, 0xfb, 0xf4, 0xc8, 0x99, 0x6f, 0xb9, 0x24,
    0x27, 0xae, 0x41, 0xe4, 0x64, 0x9b, 0x93, 0x4c, 0xa4, 0x95, 0x99, 0x1b, 0x78, 0x52, 0xb8, 0x55,
];

const EMPTY_SHA384: [u8; 48] = [
    0x38, 0xb0, 0x60, 0xa7, 0x51, 0xac, 0x96, 0x38, 0x4c, 0xd9, 0x32, 0x7e, 0xb1, 0xb1, 0xe3, 0x6a,
    0x21, 0xfd, 0xb7, 0x11, 0x14, 0xbe, 0x07, 0x43, 0x4c, 0x0c, 0xc7, 0xbf, 0x63, 0xf6, 0xe1, 0xda,
    0x27, 0x4e, 0xde, 0xbf, 0xe7, 0x6f, 0x65, 0xfb, 0xd5, 0x1a, 0xd2, 0xf1, 0x48, 0x98, 0xb9, 0x5b,
];
