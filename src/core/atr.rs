//! Answer-To-Reset bytes.

use std::fmt;

use crate::core::error::{codes, Error, Result};

/// Longest ATR the resource manager will report.
pub const MAX_ATR_SIZE: usize = 33;

/// ATR captured from a reader or on connect. Not decoded further.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Atr(Vec<u8>);

impl Atr {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Result<Self> {
        let bytes = bytes.into();
        if bytes.len() > MAX_ATR_SIZE {
            return Err(Error::from_native(codes::SCARD_E_INVALID_ATR)
                .with_message(format!("ATR is {} bytes, longer than {MAX_ATR_SIZE}", bytes.len())));
        }
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Match the ATR against a pattern with an optional mask
    ///
    /// If a mask is provided, only the bits set in the mask are compared.
    /// The pattern is matched as a prefix.
    pub fn matches(&self, pattern: &[u8], mask: Option<&[u8]>) -> bool {
        if pattern.len() > self.0.len() {
            return false;
        }

        match mask {
            Some(mask) if mask.len() < pattern.len() => false,
            Some(mask) => self
                .0
                .iter()
                .zip(pattern)
                .zip(mask)
                .all(|((atr, pattern), mask)| atr & mask == pattern & mask),
            None => self.0.starts_with(pattern),
        }
    }
}

impl AsRef<[u8]> for Atr {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Atr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(&self.0))
    }
}
