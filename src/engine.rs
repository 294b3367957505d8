//! Record and handshake plumbing shared by client and server.
//!
//! The engine does no I/O. Bytes read from the transport are handed to
//! [`Engine::feed`], encoded records accumulate in an output buffer that the
//! session drains with [`Engine::pending_output`] and
//! [`Engine::consume_output`]. Client and server state machines pull whole
//! handshake messages with [`Engine::next_handshake`] and push theirs with
//! [`Engine::send_handshake`].

use std::sync::Arc;

use subtle::ConstantTimeEq;

use crate::buffer::Buf;
use crate::certificate::Certificate;
use crate::config::MAX_FRAGMENT_LEN;
use crate::crypto::key_schedule::KeySchedule;
use crate::crypto::SupportedCipherSuite;
use crate::error::violation;
use crate::message::{
    signed_content, Alert, Body, Certificate as CertificateMessage, CertificateVerify, Finished,
    Handshake, KeyUpdate,
};
use crate::record::{
    write_plaintext, OpenError, RecordHeader, RecordProtection, MAX_CIPHERTEXT_LEN,
    RECORD_HEADER_LEN,
};
use crate::session::Role;
use crate::types::{
    AlertDescription, CipherSuite, ContentType, HandshakeType, NamedGroup, SignatureAlgorithm,
};
use crate::{CertifiedKey, Config, Error};

pub(crate) struct Engine {
    config: Arc<Config>,
    role: Role,

    /// Bytes read from the transport, not yet split into records.
    incoming: Buf,

    /// Encoded records waiting to be written to the transport.
    outgoing: Buf,

    /// Handshake message bytes, possibly spanning several records.
    handshake_buffer: Buf,

    /// Decrypted application data not yet read.
    app_data: Buf,

    /// All handshake messages so far, for the transcript hash.
    transcript: Buf,

    /// Offset of the last received message in `transcript`.
    last_message_start: usize,

    read_keys: Option<RecordProtection>,
    write_keys: Option<RecordProtection>,

    suite: Option<&'static dyn SupportedCipherSuite>,
    key_schedule: Option<KeySchedule>,
    group: Option<NamedGroup>,

    client_hs_secret: Option<Buf>,
    server_hs_secret: Option<Buf>,
    client_app_secret: Option<Buf>,
    server_app_secret: Option<Buf>,

    /// Certificates presented by the peer, leaf first.
    peer_certificates: Vec<Certificate>,

    /// Alert to send for the error currently being returned.
    pending_alert: Option<AlertDescription>,

    established: bool,
    peer_closed: bool,
}

impl Engine {
    pub fn new(config: Arc<Config>, role: Role) -> Self {
        Engine {
            config,
            role,
            incoming: Buf::new(),
            outgoing: Buf::new(),
            handshake_buffer: Buf::new(),
            app_data: Buf::new(),
            transcript: Buf::new(),
            last_message_start: 0,
            read_keys: None,
            write_keys: None,
            suite: None,
            key_schedule: None,
            group: None,
            client_hs_secret: None,
            server_hs_secret: None,
            client_app_secret: None,
            server_app_secret: None,
            peer_certificates: Vec::new(),
            pending_alert: None,
            established: false,
            peer_closed: false,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn is_established(&self) -> bool {
        self.established
    }

    pub fn peer_closed(&self) -> bool {
        self.peer_closed
    }

    pub fn cipher_suite(&self) -> Option<CipherSuite> {
        self.suite.map(|s| s.suite())
    }

    pub fn key_exchange_group(&self) -> Option<NamedGroup> {
        self.group
    }

    pub fn set_key_exchange_group(&mut self, group: NamedGroup) {
        self.group = Some(group);
    }

    pub fn peer_certificates(&self) -> &[Certificate] {
        &self.peer_certificates
    }

    pub fn set_peer_certificates(&mut self, chain: Vec<Certificate>) {
        self.peer_certificates = chain;
    }

    pub fn random_bytes(&self, buf: &mut [u8]) -> Result<(), Error> {
        self.config
            .crypto_provider()
            .secure_random
            .fill(buf)
            .map_err(Error::Crypto)
    }

    /// Record `alert` as the one to send and return `err`.
    pub fn fail(&mut self, alert: AlertDescription, err: Error) -> Error {
        if self.pending_alert.is_none() {
            self.pending_alert = Some(alert);
        }
        err
    }

    pub fn take_pending_alert(&mut self) -> Option<AlertDescription> {
        self.pending_alert.take()
    }

    // ========================================================================
    // Transport side
    // ========================================================================

    /// Append bytes read from the transport.
    pub fn feed(&mut self, data: &[u8]) {
        self.incoming.extend_from_slice(data);
    }

    pub fn pending_output(&self) -> &[u8] {
        &self.outgoing
    }

    pub fn has_pending_output(&self) -> bool {
        !self.outgoing.is_empty()
    }

    /// Drop the first `n` bytes of pending output after they were written.
    pub fn consume_output(&mut self, n: usize) {
        self.outgoing.consume(n);
    }

    // ========================================================================
    // Incoming records
    // ========================================================================

    /// Process one complete record from the incoming buffer.
    ///
    /// Returns `Ok(false)` when no complete record is buffered.
    pub fn process_record(&mut self) -> Result<bool, Error> {
        if self.incoming.len() < RECORD_HEADER_LEN {
            return Ok(false);
        }

        let Ok((_, header)) = RecordHeader::parse(&self.incoming) else {
            return Ok(false);
        };
        let length = header.length as usize;

        if length > MAX_CIPHERTEXT_LEN {
            return Err(self.fail(
                AlertDescription::RecordOverflow,
                violation!("Record of {} bytes exceeds the limit", length),
            ));
        }
        if self.incoming.len() < RECORD_HEADER_LEN + length {
            return Ok(false);
        }

        let mut header_bytes = [0u8; RECORD_HEADER_LEN];
        header_bytes.copy_from_slice(&self.incoming[..RECORD_HEADER_LEN]);
        let fragment = Buf::from_slice(&self.incoming[RECORD_HEADER_LEN..RECORD_HEADER_LEN + length]);
        self.incoming.consume(RECORD_HEADER_LEN + length);

        let protected = self.read_keys.is_some();
        let (content_type, plaintext) = match (header.content_type, protected) {
            (ContentType::ChangeCipherSpec, _) => {
                // Middlebox compatibility, RFC 8446 Section 5.
                if !self.established && fragment[..] == [1] {
                    trace!("Ignoring change_cipher_spec");
                    return Ok(true);
                }
                return Err(self.fail(
                    AlertDescription::UnexpectedMessage,
                    violation!("Unexpected change_cipher_spec"),
                ));
            }
            (ContentType::ApplicationData, true) => {
                let opened = match self.read_keys.as_mut() {
                    Some(keys) => keys.open(&header_bytes, &fragment),
                    None => Err(OpenError::BadRecordMac),
                };
                match opened {
                    Ok(opened) => opened,
                    Err(e) => return Err(self.open_failed(e)),
                }
            }
            (ContentType::Handshake | ContentType::Alert, false) => (header.content_type, fragment),
            (ContentType::Alert, true) if !self.established => {
                // The peer may not have our handshake keys when it gives up.
                (ContentType::Alert, fragment)
            }
            (other, _) => {
                return Err(self.fail(
                    AlertDescription::UnexpectedMessage,
                    violation!("Unexpected {} record", other),
                ));
            }
        };

        if plaintext.len() > MAX_FRAGMENT_LEN {
            return Err(self.fail(
                AlertDescription::RecordOverflow,
                violation!("Plaintext of {} bytes exceeds the limit", plaintext.len()),
            ));
        }

        self.dispatch(content_type, plaintext)?;
        Ok(true)
    }

    fn open_failed(&mut self, e: OpenError) -> Error {
        match e {
            OpenError::BadRecordMac => self.fail(
                AlertDescription::BadRecordMac,
                violation!("Record authentication failed"),
            ),
            OpenError::Overflow => self.fail(
                AlertDescription::RecordOverflow,
                violation!("Decrypted record exceeds the limit"),
            ),
            OpenError::NoContentType => self.fail(
                AlertDescription::UnexpectedMessage,
                violation!("Protected record without content type"),
            ),
        }
    }

    fn dispatch(&mut self, content_type: ContentType, data: Buf) -> Result<(), Error> {
        match content_type {
            ContentType::Handshake => {
                if data.is_empty() {
                    return Err(self.fail(
                        AlertDescription::UnexpectedMessage,
                        violation!("Empty handshake record"),
                    ));
                }
                self.handshake_buffer.extend_from_slice(&data);
                Ok(())
            }
            ContentType::Alert => self.handle_alert(&data),
            ContentType::ApplicationData => {
                if !self.established {
                    return Err(self.fail(
                        AlertDescription::UnexpectedMessage,
                        violation!("Application data before the handshake completed"),
                    ));
                }
                if !self.handshake_buffer.is_empty() {
                    return Err(self.fail(
                        AlertDescription::UnexpectedMessage,
                        violation!("Application data inside a fragmented handshake message"),
                    ));
                }
                if self.peer_closed {
                    // Data after close_notify is ignored.
                    return Ok(());
                }
                self.app_data.extend_from_slice(&data);
                Ok(())
            }
            other => Err(self.fail(
                AlertDescription::UnexpectedMessage,
                violation!("Unexpected content type {}", other),
            )),
        }
    }

    fn handle_alert(&mut self, data: &[u8]) -> Result<(), Error> {
        let alert = match Alert::parse(data) {
            Ok((rest, alert)) if rest.is_empty() => alert,
            _ => {
                return Err(self.fail(
                    AlertDescription::DecodeError,
                    violation!("Malformed alert"),
                ))
            }
        };

        match alert.description {
            AlertDescription::CloseNotify => {
                debug!("Peer sent close_notify");
                self.peer_closed = true;
                if self.established {
                    Ok(())
                } else {
                    Err(Error::HandshakeFailed(AlertDescription::CloseNotify))
                }
            }
            AlertDescription::UserCanceled => {
                debug!("Peer sent user_canceled");
                Ok(())
            }
            description => {
                debug!("Peer sent fatal alert: {}", description);
                if self.established {
                    Err(Error::AlertReceived(description))
                } else {
                    Err(Error::HandshakeFailed(description))
                }
            }
        }
    }

    // ========================================================================
    // Handshake messages
    // ========================================================================

    /// Make sure a complete handshake message is buffered, reading records
    /// as needed. Returns its type.
    pub fn peek_handshake(&mut self) -> Result<Option<HandshakeType>, Error> {
        loop {
            if let Some(msg_type) = self.buffered_handshake_type()? {
                return Ok(Some(msg_type));
            }
            if !self.process_record()? {
                return Ok(None);
            }
        }
    }

    /// The next complete handshake message, if one can be assembled from
    /// what has been received so far.
    pub fn next_handshake(&mut self) -> Result<Option<Handshake>, Error> {
        if self.peek_handshake()?.is_none() {
            return Ok(None);
        }
        self.take_buffered_handshake()
    }

    fn buffered_handshake_type(&mut self) -> Result<Option<HandshakeType>, Error> {
        let Some((msg_type, total)) = Handshake::peek_header(&self.handshake_buffer) else {
            return Ok(None);
        };

        let max = self.config.max_handshake_message_size();
        if total - crate::message::HANDSHAKE_HEADER_LEN > max {
            return Err(self.fail(
                AlertDescription::IllegalParameter,
                violation!("{:?} of {} bytes exceeds the limit of {}", msg_type, total, max),
            ));
        }

        if self.handshake_buffer.len() < total {
            return Ok(None);
        }
        Ok(Some(msg_type))
    }

    fn take_buffered_handshake(&mut self) -> Result<Option<Handshake>, Error> {
        let Some(msg_type) = self.buffered_handshake_type()? else {
            return Ok(None);
        };
        let Some((_, total)) = Handshake::peek_header(&self.handshake_buffer) else {
            return Ok(None);
        };

        let raw = Buf::from_slice(&self.handshake_buffer[..total]);
        self.handshake_buffer.consume(total);

        let handshake = match Handshake::parse(&raw) {
            Ok((_, handshake)) => handshake,
            Err(_) => {
                return Err(self.fail(
                    AlertDescription::DecodeError,
                    violation!("Malformed {:?}", msg_type),
                ))
            }
        };

        if !self.established {
            self.last_message_start = self.transcript.len();
            self.transcript.extend_from_slice(&raw);
        }

        trace!("Received {:?}", msg_type);
        Ok(Some(handshake))
    }

    /// Encode `handshake`, add it to the transcript and queue its records.
    pub fn send_handshake(&mut self, handshake: &Handshake) -> Result<(), Error> {
        let mut encoded = Buf::new();
        handshake.serialize(&mut encoded);

        if !self.established {
            self.transcript.extend_from_slice(&encoded);
        }

        for chunk in encoded.chunks(MAX_FRAGMENT_LEN) {
            self.write_record(ContentType::Handshake, chunk)?;
        }

        trace!("Sent {:?}", handshake.msg_type);
        Ok(())
    }

    /// Queue an alert. Failures are logged and ignored.
    pub fn send_alert(&mut self, description: AlertDescription) {
        let mut body = Buf::new();
        Alert::new(description).serialize(&mut body);
        if let Err(e) = self.write_record(ContentType::Alert, &body) {
            warn!("Failed to encode alert {}: {}", description, e);
        }
    }

    fn write_record(&mut self, content_type: ContentType, fragment: &[u8]) -> Result<(), Error> {
        match self.write_keys.as_mut() {
            Some(keys) => keys.seal(content_type, fragment, &mut self.outgoing),
            None => {
                write_plaintext(content_type, fragment, &mut self.outgoing);
                Ok(())
            }
        }
    }

    // ========================================================================
    // Application data
    // ========================================================================

    /// Encrypt `data` as application data records.
    pub fn write_app(&mut self, data: &[u8]) -> Result<(), Error> {
        if !self.established || self.write_keys.is_none() {
            return Err(violation!("Application data before the handshake completed"));
        }
        let max = self.config.max_fragment_len();
        for chunk in data.chunks(max) {
            self.write_record(ContentType::ApplicationData, chunk)?;
        }
        Ok(())
    }

    /// Read decrypted application data into `buf`.
    ///
    /// `Ok(None)` means more records are needed, `Ok(Some(0))` that the peer
    /// closed. Post-handshake messages are handled on the way.
    pub fn read_app(&mut self, buf: &mut [u8]) -> Result<Option<usize>, Error> {
        loop {
            if !self.app_data.is_empty() {
                let n = buf.len().min(self.app_data.len());
                buf[..n].copy_from_slice(&self.app_data[..n]);
                self.app_data.consume(n);
                return Ok(Some(n));
            }

            if self.peer_closed || buf.is_empty() {
                return Ok(Some(0));
            }

            if let Some(handshake) = self.take_buffered_handshake()? {
                self.handle_post_handshake(handshake)?;
                continue;
            }

            if !self.process_record()? {
                return Ok(None);
            }
        }
    }

    fn handle_post_handshake(&mut self, handshake: Handshake) -> Result<(), Error> {
        match handshake.body {
            Body::KeyUpdate(key_update) => {
                debug!(
                    "Peer updated its keys (update_requested: {})",
                    key_update.update_requested
                );
                self.rotate_read_keys()?;
                if key_update.update_requested {
                    self.update_keys(false)?;
                }
                Ok(())
            }
            Body::NewSessionTicket if self.role == Role::Client => {
                debug!("Ignoring NewSessionTicket");
                Ok(())
            }
            _ => Err(self.fail(
                AlertDescription::UnexpectedMessage,
                violation!(
                    "Unexpected post-handshake {:?}, renegotiation is not supported",
                    handshake.msg_type
                ),
            )),
        }
    }

    /// Send a KeyUpdate and switch to the next write key.
    pub fn update_keys(&mut self, request_peer: bool) -> Result<(), Error> {
        let key_update = Handshake::new(Body::KeyUpdate(KeyUpdate {
            update_requested: request_peer,
        }));
        self.send_handshake(&key_update)?;
        self.rotate_write_keys()
    }

    fn rotate_read_keys(&mut self) -> Result<(), Error> {
        let peer_is_client = self.role == Role::Server;
        let next = self.next_app_secret(peer_is_client)?;
        let protection = self.protection_for(&next)?;
        self.set_read_keys(protection)?;
        self.store_app_secret(peer_is_client, next);
        Ok(())
    }

    fn rotate_write_keys(&mut self) -> Result<(), Error> {
        let own_is_client = self.role == Role::Client;
        let next = self.next_app_secret(own_is_client)?;
        self.write_keys = Some(self.protection_for(&next)?);
        self.store_app_secret(own_is_client, next);
        Ok(())
    }

    fn next_app_secret(&self, client: bool) -> Result<Buf, Error> {
        let current = if client {
            self.client_app_secret.as_ref()
        } else {
            self.server_app_secret.as_ref()
        };
        let current = current.ok_or_else(|| violation!("No application traffic secret"))?;
        self.schedule()?
            .derive_next_traffic_secret(current)
            .map_err(Error::Crypto)
    }

    fn store_app_secret(&mut self, client: bool, secret: Buf) {
        if client {
            self.client_app_secret = Some(secret);
        } else {
            self.server_app_secret = Some(secret);
        }
    }

    // ========================================================================
    // Key schedule
    // ========================================================================

    /// Fix the cipher suite and start the key schedule.
    pub fn select_suite(&mut self, suite: CipherSuite) -> Result<(), Error> {
        let provider = self.config.crypto_provider();
        let supported = provider
            .find_cipher_suite(suite)
            .ok_or_else(|| Error::Crypto(format!("Cipher suite not available: {}", suite)))?;
        let schedule = KeySchedule::new(provider.hkdf_provider, supported.hash_algorithm())
            .map_err(Error::Crypto)?;

        self.suite = Some(supported);
        self.key_schedule = Some(schedule);
        Ok(())
    }

    fn schedule(&self) -> Result<&KeySchedule, Error> {
        self.key_schedule
            .as_ref()
            .ok_or_else(|| violation!("Key schedule not started"))
    }

    fn protection_for(&self, secret: &[u8]) -> Result<RecordProtection, Error> {
        let suite = self
            .suite
            .ok_or_else(|| violation!("No cipher suite negotiated"))?;
        let keys = self
            .schedule()?
            .derive_traffic_keys(secret, suite.key_len())
            .map_err(Error::Crypto)?;
        RecordProtection::new(suite, keys)
    }

    /// Switch the read direction. Refused while a handshake message is
    /// partially buffered, since keys change at message boundaries only.
    fn set_read_keys(&mut self, protection: RecordProtection) -> Result<(), Error> {
        if !self.handshake_buffer.is_empty() {
            return Err(self.fail(
                AlertDescription::UnexpectedMessage,
                violation!("Key change inside a fragmented handshake message"),
            ));
        }
        self.read_keys = Some(protection);
        Ok(())
    }

    /// Hash of the transcript so far.
    pub fn transcript_hash(&self) -> Result<Buf, Error> {
        self.hash_transcript(self.transcript.len())
    }

    /// Hash of the transcript up to, not including, the last received message.
    pub fn transcript_hash_before_last(&self) -> Result<Buf, Error> {
        self.hash_transcript(self.last_message_start)
    }

    fn hash_transcript(&self, len: usize) -> Result<Buf, Error> {
        let hash = self.schedule()?.hash();
        self.config
            .crypto_provider()
            .hash(hash, &self.transcript[..len])
            .map_err(Error::Crypto)
    }

    /// Derive handshake traffic secrets from the ECDHE secret and install
    /// handshake keys in both directions.
    pub fn derive_handshake_keys(&mut self, shared_secret: &[u8]) -> Result<(), Error> {
        let transcript_hash = self.transcript_hash()?;
        let (client, server) = self
            .key_schedule
            .as_mut()
            .ok_or_else(|| violation!("Key schedule not started"))?
            .derive_handshake_secrets(shared_secret, &transcript_hash)
            .map_err(Error::Crypto)?;

        let (read, write) = match self.role {
            Role::Client => (self.protection_for(&server)?, self.protection_for(&client)?),
            Role::Server => (self.protection_for(&client)?, self.protection_for(&server)?),
        };
        self.set_read_keys(read)?;
        self.write_keys = Some(write);

        self.client_hs_secret = Some(client);
        self.server_hs_secret = Some(server);
        Ok(())
    }

    /// Derive the application traffic secrets from the current transcript.
    pub fn derive_application_secrets(&mut self) -> Result<(), Error> {
        let transcript_hash = self.transcript_hash()?;
        let (client, server) = self
            .key_schedule
            .as_mut()
            .ok_or_else(|| violation!("Key schedule not started"))?
            .derive_application_secrets(&transcript_hash)
            .map_err(Error::Crypto)?;

        self.client_app_secret = Some(client);
        self.server_app_secret = Some(server);
        Ok(())
    }

    /// Read with the peer's application traffic key.
    pub fn install_application_read(&mut self) -> Result<(), Error> {
        let secret = match self.role {
            Role::Client => &self.server_app_secret,
            Role::Server => &self.client_app_secret,
        };
        let secret = secret
            .as_ref()
            .ok_or_else(|| violation!("Application secrets not derived"))?;
        let protection = self.protection_for(secret)?;
        self.set_read_keys(protection)
    }

    /// Write with our application traffic key.
    pub fn install_application_write(&mut self) -> Result<(), Error> {
        let secret = match self.role {
            Role::Client => &self.client_app_secret,
            Role::Server => &self.server_app_secret,
        };
        let secret = secret
            .as_ref()
            .ok_or_else(|| violation!("Application secrets not derived"))?;
        self.write_keys = Some(self.protection_for(secret)?);
        Ok(())
    }

    /// verify_data of the client (`client = true`) or server Finished.
    pub fn finished_verify_data(&self, client: bool, transcript_hash: &[u8]) -> Result<Buf, Error> {
        let secret = if client {
            &self.client_hs_secret
        } else {
            &self.server_hs_secret
        };
        let secret = secret
            .as_ref()
            .ok_or_else(|| violation!("Handshake secrets not derived"))?;
        self.schedule()?
            .finished_verify_data(
                self.config.crypto_provider().hmac_provider,
                secret,
                transcript_hash,
            )
            .map_err(Error::Crypto)
    }

    // ========================================================================
    // Authentication
    // ========================================================================

    /// Parse the peer's certificate list into [`Certificate`]s.
    pub fn accept_peer_certificates(&mut self, message: &CertificateMessage) -> Result<(), Error> {
        let mut chain = Vec::with_capacity(message.certificate_list.len());
        for entry in &message.certificate_list {
            match Certificate::parse(&entry.cert_data) {
                Ok(cert) => chain.push(cert),
                Err(e) => return Err(self.fail(AlertDescription::BadCertificate, e)),
            }
        }
        if let Some(leaf) = chain.first() {
            debug!("Peer certificate: {}", leaf.subject());
        }
        self.peer_certificates = chain;
        Ok(())
    }

    /// Check the peer's CertificateVerify against its leaf certificate.
    pub fn check_certificate_verify(
        &mut self,
        verify: &CertificateVerify,
        transcript_hash: &[u8],
    ) -> Result<(), Error> {
        let scheme = verify.scheme;
        if !self.config.signature_schemes().contains(&scheme)
            || scheme.signature_algorithm() != SignatureAlgorithm::ECDSA
        {
            return Err(self.fail(
                AlertDescription::IllegalParameter,
                violation!("Peer signed with {:?}, which was not offered", scheme),
            ));
        }

        let Some(leaf) = self.peer_certificates.first() else {
            return Err(self.fail(
                AlertDescription::UnexpectedMessage,
                violation!("CertificateVerify without a certificate"),
            ));
        };

        // The peer signs as server when we are the client.
        let content = signed_content(self.role == Role::Client, transcript_hash);
        let result = self
            .config
            .crypto_provider()
            .signature_verification
            .verify_signature(
                leaf.public_key_info(),
                &content,
                &verify.signature,
                scheme.hash_algorithm(),
                SignatureAlgorithm::ECDSA,
            );

        result.map_err(|e| {
            self.fail(
                AlertDescription::DecryptError,
                violation!("Invalid CertificateVerify signature: {}", e),
            )
        })
    }

    /// Sign the transcript with our key.
    pub fn sign_certificate_verify(
        &self,
        key: &CertifiedKey,
        transcript_hash: &[u8],
    ) -> Result<CertificateVerify, Error> {
        let content = signed_content(self.role == Role::Server, transcript_hash);
        let mut signature = Buf::new();
        key.signing_key()
            .sign(&content, &mut signature)
            .map_err(Error::Crypto)?;
        Ok(CertificateVerify {
            scheme: key.scheme(),
            signature: signature.to_vec(),
        })
    }

    /// Compare a received Finished with the expected verify_data.
    pub fn check_finished(
        &mut self,
        finished: &Finished,
        transcript_hash: &[u8],
    ) -> Result<(), Error> {
        let peer_is_client = self.role == Role::Server;
        let expected = self.finished_verify_data(peer_is_client, transcript_hash)?;
        if bool::from(expected.ct_eq(&finished.verify_data)) {
            Ok(())
        } else {
            Err(self.fail(
                AlertDescription::DecryptError,
                violation!("Finished verification failed"),
            ))
        }
    }

    /// Drop handshake-only state and start accepting application data.
    pub fn complete_handshake(&mut self) {
        self.client_hs_secret = None;
        self.server_hs_secret = None;
        self.transcript.clear();
        self.last_message_start = 0;
        self.established = true;
        debug!(
            "Handshake complete ({:?}, {:?})",
            self.cipher_suite(),
            self.group
        );
    }

    /// Zeroize every secret and buffered plaintext.
    pub fn wipe(&mut self) {
        self.read_keys = None;
        self.write_keys = None;
        self.key_schedule = None;
        self.client_hs_secret = None;
        self.server_hs_secret = None;
        self.client_app_secret = None;
        self.server_app_secret = None;
        self.transcript.clear();
        self.handshake_buffer.clear();
        self.app_data.clear();
        self.incoming.clear();
        self.outgoing.clear();
    }

    pub fn holds_key_material(&self) -> bool {
        self.read_keys.is_some()
            || self.write_keys.is_some()
            || self.key_schedule.is_some()
            || self.client_hs_secret.is_some()
            || self.server_hs_secret.is_some()
            || self.client_app_secret.is_some()
            || self.server_app_secret.is_some()
    }
}
