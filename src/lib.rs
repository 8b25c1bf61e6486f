/// Smartcard - portable smart-card sessions over PC/SC
///
/// This library establishes resource-manager contexts, discovers readers,
/// waits for card insertion and removal, and exchanges ISO7816-4 APDUs with
/// connected cards. The `smartcard` binary offers the same through a CLI.
pub mod cli;
pub mod core;

// Re-export commonly used types
pub use crate::core::{
    apdu::{CommandApdu, ResponseApdu},
    atr::Atr,
    card::Card,
    config::ConnectOptions,
    context::{Canceller, Context},
    error::{Error, ErrorKind, NativeStatus, Result},
    native::{Disposition, Negotiated, Protocol, Protocols, ReaderQuery, ResourceManager, Scope, ShareMode},
    pcsc::Pcsc,
    reader::{Reader, ReaderState},
    status::StatusClass,
    utils::{format_hex, parse_hex},
};
