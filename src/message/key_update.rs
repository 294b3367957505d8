use nom::error::{Error, ErrorKind};
use nom::number::complete::be_u8;
use nom::{Err, IResult};

use crate::buffer::Buf;

/// KeyUpdate (RFC 8446 Section 4.6.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct KeyUpdate {
    pub update_requested: bool,
}

impl KeyUpdate {
    pub fn parse(input: &[u8]) -> IResult<&[u8], KeyUpdate> {
        let (rest, value) = be_u8(input)?;
        let update_requested = match value {
            0 => false,
            1 => true,
            _ => return Err(Err::Failure(Error::new(input, ErrorKind::Verify))),
        };
        Ok((rest, KeyUpdate { update_requested }))
    }

    pub fn serialize(&self, output: &mut Buf) {
        output.push(self.update_requested as u8);
    }
}
