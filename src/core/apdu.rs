//! ISO7816-4 command and response APDUs.
//!
//! ```text
//! command:  | CLA | INS | P1 | P2 | [Lc | Data] | [Le] |
//! response: | Data ...                  | SW1 | SW2 |
//! ```
//!
//! Only the short encoding is modelled: Lc and Le are single bytes and an Le
//! of zero means "no Le field".

use std::fmt;

use crate::core::error::{Error, ErrorKind, Result};
use crate::core::status::{describe_status_word, StatusClass};
use crate::core::utils::format_hex;

/// Largest data field a short command APDU can carry.
pub const MAX_SHORT_DATA: usize = 255;

const HEADER_LEN: usize = 4;

/// A command APDU, owning its encoded bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CommandApdu(Vec<u8>);

impl CommandApdu {
    /// Build a command from its fields.
    ///
    /// Lc and `data` are only encoded when `data` is non-empty, and `le` only
    /// when it is non-zero. Data longer than [`MAX_SHORT_DATA`] cannot be
    /// described by a one-byte Lc and is rejected with
    /// [`ErrorKind::InvalidCommand`].
    pub fn new(cla: u8, ins: u8, p1: u8, p2: u8, data: &[u8], le: u8) -> Result<Self> {
        if data.len() > MAX_SHORT_DATA {
            return Err(Error::new(
                ErrorKind::InvalidCommand,
                format!(
                    "command data is {} bytes, a short APDU carries at most {MAX_SHORT_DATA}",
                    data.len()
                ),
            ));
        }

        let mut bytes = Vec::with_capacity(HEADER_LEN + 2 + data.len());
        bytes.extend_from_slice(&[cla, ins, p1, p2]);
        if !data.is_empty() {
            bytes.push(data.len() as u8);
            bytes.extend_from_slice(data);
        }
        if le > 0 {
            bytes.push(le);
        }

        Ok(Self(bytes))
    }

    /// SELECT FILE by application identifier, no Le.
    pub fn select(aid: &[u8]) -> Result<Self> {
        Self::new(0x00, 0xA4, 0x04, 0x00, aid, 0)
    }

    /// Wrap bytes received from elsewhere without checking them.
    /// Use [`CommandApdu::is_valid`] before relying on the structure.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Structural length check: Lc must agree with the number of bytes that
    /// follow it, leaving room for at most one Le byte.
    pub fn is_valid(&self) -> bool {
        let len = self.0.len();
        match len {
            0..=3 => false,
            4 | 5 => true,
            _ => {
                let lc = usize::from(self.0[HEADER_LEN]);
                let trailing = len - (HEADER_LEN + 1);
                lc <= trailing && trailing <= lc + 1
            }
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn cla(&self) -> Option<u8> {
        self.header(0)
    }

    pub fn ins(&self) -> Option<u8> {
        self.header(1)
    }

    pub fn p1(&self) -> Option<u8> {
        self.header(2)
    }

    pub fn p2(&self) -> Option<u8> {
        self.header(3)
    }

    /// Lc, when the command carries a data field.
    pub fn lc(&self) -> Option<u8> {
        (self.is_valid() && self.0.len() > HEADER_LEN + 1).then(|| self.0[HEADER_LEN])
    }

    /// Data field; empty when there is none or the command is malformed.
    pub fn data(&self) -> &[u8] {
        match self.lc() {
            Some(lc) => {
                let start = HEADER_LEN + 1;
                &self.0[start..start + usize::from(lc)]
            }
            None => &[],
        }
    }

    /// Le, when present.
    pub fn le(&self) -> Option<u8> {
        if !self.is_valid() {
            return None;
        }
        match self.lc() {
            None => self.0.get(HEADER_LEN).copied(),
            Some(lc) if self.0.len() == HEADER_LEN + 2 + usize::from(lc) => self.0.last().copied(),
            Some(_) => None,
        }
    }

    fn header(&self, index: usize) -> Option<u8> {
        if self.is_valid() {
            self.0.get(index).copied()
        } else {
            None
        }
    }
}

impl AsRef<[u8]> for CommandApdu {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Diagnostic rendering, never meant to be parsed back.
impl fmt::Display for CommandApdu {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.is_valid() {
            return f.write_str("Invalid APDU");
        }

        let apdu = &self.0;
        write!(
            f,
            "{:02X} {:02X} {:02X} {:02X}",
            apdu[0], apdu[1], apdu[2], apdu[3]
        )?;
        if apdu.len() > HEADER_LEN {
            write!(f, " {:02X}", apdu[HEADER_LEN])?;
        }
        if apdu.len() > HEADER_LEN + 1 {
            let body = &apdu[HEADER_LEN + 1..];
            if apdu.len() == usize::from(apdu[HEADER_LEN]) + HEADER_LEN + 1 {
                write!(f, " {}", format_hex(body))?;
            } else {
                let (data, le) = body.split_at(body.len() - 1);
                if !data.is_empty() {
                    write!(f, " {}", format_hex(data))?;
                }
                write!(f, " {:02X}", le[0])?;
            }
        }
        Ok(())
    }
}

/// A response APDU: payload followed by the two status bytes.
///
/// The response owns its buffer, so later changes to the bytes it was built
/// from never affect it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResponseApdu(Vec<u8>);

impl ResponseApdu {
    /// Wrap a raw response. Fails with [`ErrorKind::InvalidResponse`] when the
    /// status word is incomplete.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Result<Self> {
        let bytes = bytes.into();
        if bytes.len() < 2 {
            return Err(Error::new(
                ErrorKind::InvalidResponse,
                format!("invalid response apdu size: {}", bytes.len()),
            ));
        }
        Ok(Self(bytes))
    }

    pub fn sw1(&self) -> u8 {
        self.0[self.0.len() - 2]
    }

    pub fn sw2(&self) -> u8 {
        self.0[self.0.len() - 1]
    }

    /// 16-bit status word.
    pub fn sw(&self) -> u16 {
        u16::from_be_bytes([self.sw1(), self.sw2()])
    }

    /// Payload before the status word; empty for a bare status word.
    pub fn data(&self) -> &[u8] {
        &self.0[..self.0.len() - 2]
    }

    pub fn class(&self) -> StatusClass {
        StatusClass::of(self.sw())
    }

    pub fn is_success(&self) -> bool {
        self.class() == StatusClass::Success
    }

    pub fn description(&self) -> String {
        describe_status_word(self.sw1(), self.sw2())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

impl TryFrom<Vec<u8>> for ResponseApdu {
    type Error = Error;

    fn try_from(bytes: Vec<u8>) -> Result<Self> {
        Self::new(bytes)
    }
}

impl TryFrom<&[u8]> for ResponseApdu {
    type Error = Error;

    fn try_from(bytes: &[u8]) -> Result<Self> {
        Self::new(bytes)
    }
}

impl fmt::Display for ResponseApdu {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (data, sw) = self.0.split_at(self.0.len() - 2);
        if data.is_empty() {
            write!(f, "{}", format_hex(sw))
        } else {
            write!(f, "{} {}", format_hex(data), format_hex(sw))
        }
    }
}
