//! Status word (SW1/SW2) catalog.
//!
//! The catalog is advisory: it classifies and describes generic ISO7816-4
//! codes for diagnostics. Card-specific meanings must come from the card's
//! own documentation.

/// Authentication failed (counter in the low nibble of SW2).
pub const AUTH_FAILED: u16 = 0x63C0;
/// Wrong length.
pub const WRONG_LENGTH: u16 = 0x6700;
/// Record not found.
pub const RECORD_NOT_FOUND: u16 = 0x6A83;
/// Instruction code not supported.
pub const UNSUPPORTED_INS: u16 = 0x6D00;
/// Class not supported.
pub const UNSUPPORTED_CLA: u16 = 0x6E00;
/// No precise diagnosis.
pub const EXCEPTION: u16 = 0x6F00;
/// Normal processing.
pub const SUCCESS: u16 = 0x9000;
/// Not authorized (proprietary).
pub const NOT_AUTHORIZED: u16 = 0x91AE;
/// Insufficient memory (proprietary).
pub const INSUFFICIENT_MEMORY: u16 = 0x9210;

/// Coarse outcome of a status word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    /// `90 00`.
    Success,
    /// `61 xx`: processing succeeded and SW2 more bytes are waiting.
    MoreData,
    /// `62 xx` and `63 xx`.
    Warning,
    /// `64 xx` through `6F xx`, plus the catalogued proprietary errors.
    Error,
    /// Anything outside the catalog.
    Unknown,
}

impl StatusClass {
    /// Classify a 16-bit status word.
    pub const fn of(sw: u16) -> Self {
        let sw1 = (sw >> 8) as u8;
        match sw {
            SUCCESS => Self::Success,
            NOT_AUTHORIZED | INSUFFICIENT_MEMORY => Self::Error,
            _ => match sw1 {
                0x61 => Self::MoreData,
                0x62 | 0x63 => Self::Warning,
                0x64..=0x6F => Self::Error,
                _ => Self::Unknown,
            },
        }
    }
}

/// Get a human-readable description of SW1/SW2 status words
pub fn describe_status_word(sw1: u8, sw2: u8) -> String {
    match (sw1, sw2) {
        (0x90, 0x00) => "Success".to_string(),
        (0x61, n) => format!("Success, {n} bytes available"),
        (0x62, 0x00) => "Warning: No information given".to_string(),
        (0x62, 0x81) => "Warning: Part of returned data may be corrupted".to_string(),
        (0x62, 0x82) => "Warning: End of file reached".to_string(),
        (0x62, 0x83) => "Warning: Selected file invalidated".to_string(),
        (0x62, 0x84) => "Warning: FCI not formatted".to_string(),
        (0x63, 0x00) => "Warning: No information given".to_string(),
        (0x63, n) if n & 0xF0 == 0xC0 => format!("Warning: Counter = {}", n & 0x0F),
        (0x64, 0x00) => "Error: Execution error".to_string(),
        (0x65, 0x00) => "Error: No precise diagnosis".to_string(),
        (0x65, 0x81) => "Error: Memory failure".to_string(),
        (0x67, 0x00) => "Error: Wrong length".to_string(),
        (0x68, 0x00) => "Error: Functions in CLA not supported".to_string(),
        (0x68, 0x81) => "Error: Logical channel not supported".to_string(),
        (0x68, 0x82) => "Error: Secure messaging not supported".to_string(),
        (0x69, 0x00) => "Error: Command not allowed".to_string(),
        (0x69, 0x81) => "Error: Command incompatible with file structure".to_string(),
        (0x69, 0x82) => "Error: Security status not satisfied".to_string(),
        (0x69, 0x83) => "Error: Authentication method blocked".to_string(),
        (0x69, 0x84) => "Error: Referenced data invalidated".to_string(),
        (0x69, 0x85) => "Error: Conditions of use not satisfied".to_string(),
        (0x69, 0x86) => "Error: Command not allowed (no current EF)".to_string(),
        (0x6A, 0x80) => "Error: Incorrect parameters in data field".to_string(),
        (0x6A, 0x81) => "Error: Function not supported".to_string(),
        (0x6A, 0x82) => "Error: File not found".to_string(),
        (0x6A, 0x83) => "Error: Record not found".to_string(),
        (0x6A, 0x84) => "Error: Not enough memory space in file".to_string(),
        (0x6A, 0x86) => "Error: Incorrect parameters P1-P2".to_string(),
        (0x6A, 0x88) => "Error: Referenced data not found".to_string(),
        (0x6B, 0x00) => "Error: Wrong parameter(s) P1-P2".to_string(),
        (0x6C, n) => format!("Error: Wrong Le field, exact length: {n}"),
        (0x6D, 0x00) => "Error: Instruction code not supported or invalid".to_string(),
        (0x6E, 0x00) => "Error: Class not supported".to_string(),
        (0x6F, 0x00) => "Error: No precise diagnosis".to_string(),
        (0x91, 0xAE) => "Error: Not authorized".to_string(),
        (0x92, 0x10) => "Error: Insufficient memory".to_string(),
        _ => format!("Unknown status: {sw1:02X} {sw2:02X}"),
    }
}
