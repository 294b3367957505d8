use nom::IResult;

use crate::buffer::Buf;

/// Finished (RFC 8446 Section 4.4.4).
///
/// The verify_data length is the suite hash length, checked by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Finished {
    pub verify_data: Vec<u8>,
}

impl Finished {
    pub fn parse(input: &[u8]) -> IResult<&[u8], Finished> {
        Ok((
            &input[input.len()..],
            Finished {
                verify_data: input.to_vec(),
            },
        ))
    }

    pub fn serialize(&self, output: &mut Buf) {
        output.extend_from_slice(&self.verify_data);
    }
}
