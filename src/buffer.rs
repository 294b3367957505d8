//! Byte buffers for protocol data and secrets.
//!
//! [`Buf`] wraps `Vec<u8>` and wipes its contents when dropped or cleared,
//! so transcript bytes, traffic secrets and record plaintext never linger
//! in freed memory.

use std::fmt;
use std::ops::{Deref, DerefMut};

use zeroize::Zeroize;

/// Growable buffer used throughout tlsock.
///
/// The content is overwritten with zeros before the allocation is released.
#[derive(Default, Clone, PartialEq, Eq)]
pub struct Buf(Vec<u8>);

impl Buf {
    /// Create a new empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new buffer from a slice.
    pub fn from_slice(data: &[u8]) -> Self {
        Buf(data.to_vec())
    }

    /// Clear the buffer, wiping the previous content.
    pub fn clear(&mut self) {
        self.0.zeroize();
    }

    /// Extend the buffer with a slice of bytes.
    pub fn extend_from_slice(&mut self, other: &[u8]) {
        self.0.extend_from_slice(other);
    }

    /// Push a single byte onto the buffer.
    pub fn push(&mut self, byte: u8) {
        self.0.push(byte);
    }

    /// Resize the buffer to the specified length, filling with the given value.
    pub fn resize(&mut self, len: usize, value: u8) {
        self.0.resize(len, value);
    }

    /// Truncate the buffer to the specified length.
    ///
    /// The removed tail is wiped.
    pub fn truncate(&mut self, len: usize) {
        if len < self.0.len() {
            self.0[len..].zeroize();
            self.0.truncate(len);
        }
    }

    /// Remove the first `n` bytes, shifting the remainder to the front.
    pub fn consume(&mut self, n: usize) {
        let n = n.min(self.0.len());
        self.0[..n].zeroize();
        self.0.drain(..n);
    }
}

impl Zeroize for Buf {
    fn zeroize(&mut self) {
        self.0.zeroize();
    }
}

impl Drop for Buf {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl Deref for Buf {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for Buf {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl AsRef<[u8]> for Buf {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl AsMut<[u8]> for Buf {
    fn as_mut(&mut self) -> &mut [u8] {
        &mut self.0
    }
}

impl fmt::Debug for Buf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buf").field("len", &self.0.len()).finish()
    }
}

/// Trait for types that can be converted into a `Buf`.
pub trait ToBuf {
    /// Convert this value into a `Buf`.
    fn to_buf(self) -> Buf;
}

impl ToBuf for Vec<u8> {
    fn to_buf(self) -> Buf {
        Buf(self)
    }
}

impl ToBuf for &[u8] {
    fn to_buf(self) -> Buf {
        self.to_vec().to_buf()
    }
}

/// Implement the `aead::Buffer` trait for `Buf` to support in-place AEAD operations.
impl aes_gcm::aead::Buffer for Buf {
    fn extend_from_slice(&mut self, other: &[u8]) -> Result<(), aes_gcm::aead::Error> {
        self.0.extend_from_slice(other);
        Ok(())
    }

    fn truncate(&mut self, len: usize) {
        Buf::truncate(self, len);
    }
}
