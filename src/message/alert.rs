use nom::number::complete::be_u8;
use nom::IResult;

use crate::buffer::Buf;
use crate::types::{AlertDescription, AlertLevel};

/// Alert (RFC 8446 Section 6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Alert {
    pub level: AlertLevel,
    pub description: AlertDescription,
}

impl Alert {
    /// Build an alert with the level TLS 1.3 assigns to `description`.
    pub fn new(description: AlertDescription) -> Self {
        let level = match description {
            AlertDescription::CloseNotify | AlertDescription::UserCanceled => AlertLevel::Warning,
            _ => AlertLevel::Fatal,
        };
        Alert { level, description }
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], Alert> {
        let (input, level) = be_u8(input)?;
        let (input, description) = be_u8(input)?;
        Ok((
            input,
            Alert {
                level: AlertLevel::from_u8(level),
                description: AlertDescription::from_u8(description),
            },
        ))
    }

    pub fn serialize(&self, output: &mut Buf) {
        output.push(self.level.as_u8());
        output.push(self.description.as_u8());
    }
}
