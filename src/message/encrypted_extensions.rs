use nom::IResult;

use super::extension::{parse_extensions, serialize_extensions};
use super::{Extension, ExtensionContext};
use crate::buffer::Buf;

/// EncryptedExtensions (RFC 8446 Section 4.3.1).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct EncryptedExtensions {
    pub extensions: Vec<Extension>,
}

impl EncryptedExtensions {
    pub fn parse(input: &[u8]) -> IResult<&[u8], EncryptedExtensions> {
        let (input, extensions) =
            parse_extensions(input, ExtensionContext::EncryptedExtensions, false)?;
        Ok((input, EncryptedExtensions { extensions }))
    }

    pub fn serialize(&self, output: &mut Buf) {
        serialize_extensions(&self.extensions, output);
    }

    /// Whether the server acknowledged the client's server_name.
    pub fn server_name_acknowledged(&self) -> bool {
        self.extensions
            .iter()
            .any(|e| matches!(e, Extension::ServerName(None)))
    }
}
