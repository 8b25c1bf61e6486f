//! Error taxonomy and the native status-code catalog.
//!
//! Every native resource-manager call reports a 32-bit status. Those codes are
//! translated here, at the boundary, into a stable [`ErrorKind`] while the raw
//! code stays available through [`Error::code`] for diagnostics.

use std::fmt;

/// Library result type.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Raw status returned by a native resource-manager primitive.
pub type NativeStatus = u32;

/// Native status codes, numbered as in the PC/SC (winscard) headers.
pub mod codes {
    use super::NativeStatus;

    pub const SCARD_S_SUCCESS: NativeStatus = 0x0000_0000;
    pub const SCARD_F_INTERNAL_ERROR: NativeStatus = 0x8010_0001;
    pub const SCARD_E_CANCELLED: NativeStatus = 0x8010_0002;
    pub const SCARD_E_INVALID_HANDLE: NativeStatus = 0x8010_0003;
    pub const SCARD_E_INVALID_PARAMETER: NativeStatus = 0x8010_0004;
    pub const SCARD_E_INVALID_TARGET: NativeStatus = 0x8010_0005;
    pub const SCARD_E_NO_MEMORY: NativeStatus = 0x8010_0006;
    pub const SCARD_F_WAITED_TOO_LONG: NativeStatus = 0x8010_0007;
    pub const SCARD_E_INSUFFICIENT_BUFFER: NativeStatus = 0x8010_0008;
    pub const SCARD_E_UNKNOWN_READER: NativeStatus = 0x8010_0009;
    pub const SCARD_E_TIMEOUT: NativeStatus = 0x8010_000A;
    pub const SCARD_E_SHARING_VIOLATION: NativeStatus = 0x8010_000B;
    pub const SCARD_E_NO_SMARTCARD: NativeStatus = 0x8010_000C;
    pub const SCARD_E_UNKNOWN_CARD: NativeStatus = 0x8010_000D;
    pub const SCARD_E_CANT_DISPOSE: NativeStatus = 0x8010_000E;
    pub const SCARD_E_PROTO_MISMATCH: NativeStatus = 0x8010_000F;
    pub const SCARD_E_NOT_READY: NativeStatus = 0x8010_0010;
    pub const SCARD_E_INVALID_VALUE: NativeStatus = 0x8010_0011;
    pub const SCARD_E_SYSTEM_CANCELLED: NativeStatus = 0x8010_0012;
    pub const SCARD_F_COMM_ERROR: NativeStatus = 0x8010_0013;
    pub const SCARD_F_UNKNOWN_ERROR: NativeStatus = 0x8010_0014;
    pub const SCARD_E_INVALID_ATR: NativeStatus = 0x8010_0015;
    pub const SCARD_E_NOT_TRANSACTED: NativeStatus = 0x8010_0016;
    pub const SCARD_E_READER_UNAVAILABLE: NativeStatus = 0x8010_0017;
    pub const SCARD_P_SHUTDOWN: NativeStatus = 0x8010_0018;
    pub const SCARD_E_PCI_TOO_SMALL: NativeStatus = 0x8010_0019;
    pub const SCARD_E_READER_UNSUPPORTED: NativeStatus = 0x8010_001A;
    pub const SCARD_E_DUPLICATE_READER: NativeStatus = 0x8010_001B;
    pub const SCARD_E_CARD_UNSUPPORTED: NativeStatus = 0x8010_001C;
    pub const SCARD_E_NO_SERVICE: NativeStatus = 0x8010_001D;
    pub const SCARD_E_SERVICE_STOPPED: NativeStatus = 0x8010_001E;
    pub const SCARD_E_UNEXPECTED: NativeStatus = 0x8010_001F;
    pub const SCARD_E_ICC_INSTALLATION: NativeStatus = 0x8010_0020;
    pub const SCARD_E_ICC_CREATEORDER: NativeStatus = 0x8010_0021;
    pub const SCARD_E_UNSUPPORTED_FEATURE: NativeStatus = 0x8010_0022;
    pub const SCARD_E_DIR_NOT_FOUND: NativeStatus = 0x8010_0023;
    pub const SCARD_E_FILE_NOT_FOUND: NativeStatus = 0x8010_0024;
    pub const SCARD_E_NO_DIR: NativeStatus = 0x8010_0025;
    pub const SCARD_E_NO_FILE: NativeStatus = 0x8010_0026;
    pub const SCARD_E_NO_ACCESS: NativeStatus = 0x8010_0027;
    pub const SCARD_E_WRITE_TOO_MANY: NativeStatus = 0x8010_0028;
    pub const SCARD_E_BAD_SEEK: NativeStatus = 0x8010_0029;
    pub const SCARD_E_INVALID_CHV: NativeStatus = 0x8010_002A;
    pub const SCARD_E_UNKNOWN_RES_MNG: NativeStatus = 0x8010_002B;
    pub const SCARD_E_NO_SUCH_CERTIFICATE: NativeStatus = 0x8010_002C;
    pub const SCARD_E_CERTIFICATE_UNAVAILABLE: NativeStatus = 0x8010_002D;
    pub const SCARD_E_NO_READERS_AVAILABLE: NativeStatus = 0x8010_002E;
    pub const SCARD_E_COMM_DATA_LOST: NativeStatus = 0x8010_002F;
    pub const SCARD_E_NO_KEY_CONTAINER: NativeStatus = 0x8010_0030;
    pub const SCARD_E_SERVER_TOO_BUSY: NativeStatus = 0x8010_0031;
    pub const SCARD_W_UNSUPPORTED_CARD: NativeStatus = 0x8010_0065;
    pub const SCARD_W_UNRESPONSIVE_CARD: NativeStatus = 0x8010_0066;
    pub const SCARD_W_UNPOWERED_CARD: NativeStatus = 0x8010_0067;
    pub const SCARD_W_RESET_CARD: NativeStatus = 0x8010_0068;
    pub const SCARD_W_REMOVED_CARD: NativeStatus = 0x8010_0069;
    pub const SCARD_W_SECURITY_VIOLATION: NativeStatus = 0x8010_006A;
    pub const SCARD_W_WRONG_CHV: NativeStatus = 0x8010_006B;
    pub const SCARD_W_CHV_BLOCKED: NativeStatus = 0x8010_006C;
    pub const SCARD_W_EOF: NativeStatus = 0x8010_006D;
    pub const SCARD_W_CANCELLED_BY_USER: NativeStatus = 0x8010_006E;
    pub const SCARD_W_CARD_NOT_AUTHENTICATED: NativeStatus = 0x8010_006F;
    pub const SCARD_W_CACHE_ITEM_NOT_FOUND: NativeStatus = 0x8010_0070;
    pub const SCARD_W_CACHE_ITEM_STALE: NativeStatus = 0x8010_0071;
    pub const SCARD_W_CACHE_ITEM_TOO_BIG: NativeStatus = 0x8010_0072;
}

/// Semantic failure kinds surfaced by this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A command APDU is structurally malformed.
    InvalidCommand,
    /// A response APDU is shorter than its two-byte status word.
    InvalidResponse,
    /// The resource-manager context could not be established or released.
    /// The whole session must be torn down.
    ContextError,
    /// The resource manager reports that no readers are attached.
    NoReadersAvailable,
    /// The named reader is not known to the resource manager.
    UnknownReader,
    /// The reader cannot currently be used.
    ReaderUnavailable,
    /// Another session holds the reader exclusively.
    SharingViolation,
    /// No card is present in the reader.
    NoSmartcard,
    /// The card does not answer to reset.
    UnresponsiveCard,
    /// The card is not powered.
    UnpoweredCard,
    /// The card was removed.
    RemovedCard,
    /// The card was reset by another session.
    ResetCard,
    /// A wait or transmission ran out of time.
    Timeout,
    /// A blocking wait was cancelled.
    Cancelled,
    /// A transaction could not be carried out.
    NotTransacted,
    /// A parameter passed to the resource manager was rejected.
    InvalidParameter,
    /// The resource manager failed internally.
    InternalError,
    /// Communication with the reader or card failed.
    CommunicationError,
    /// The resource-manager service is not running or is overloaded.
    ServiceUnavailable,
    /// The card or its ATR is not supported.
    UnsupportedCard,
    /// The requested protocol cannot be used with this card.
    ProtocolMismatch,
    /// Access to the card was refused (security status, CHV, authentication).
    SecurityViolation,
    /// A file, certificate, key container or cached item was not found.
    NotFound,
    /// The operation is not supported by the reader or service.
    NotSupported,
    /// A native status outside the catalog. The raw code is retained.
    Unexpected,
}

impl ErrorKind {
    /// Short name of the kind.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidCommand => "invalid command",
            Self::InvalidResponse => "invalid response",
            Self::ContextError => "context error",
            Self::NoReadersAvailable => "no readers available",
            Self::UnknownReader => "unknown reader",
            Self::ReaderUnavailable => "reader unavailable",
            Self::SharingViolation => "sharing violation",
            Self::NoSmartcard => "no smart card",
            Self::UnresponsiveCard => "unresponsive card",
            Self::UnpoweredCard => "unpowered card",
            Self::RemovedCard => "removed card",
            Self::ResetCard => "reset card",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
            Self::NotTransacted => "not transacted",
            Self::InvalidParameter => "invalid parameter",
            Self::InternalError => "internal error",
            Self::CommunicationError => "communication error",
            Self::ServiceUnavailable => "service unavailable",
            Self::UnsupportedCard => "unsupported card",
            Self::ProtocolMismatch => "protocol mismatch",
            Self::SecurityViolation => "security violation",
            Self::NotFound => "not found",
            Self::NotSupported => "not supported",
            Self::Unexpected => "unexpected",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure value returned by every fallible operation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}{}", code_suffix(.code))]
pub struct Error {
    kind: ErrorKind,
    code: Option<NativeStatus>,
    message: String,
}

fn code_suffix(code: &Option<NativeStatus>) -> String {
    code.map(|code| format!(" (0x{code:08X})")).unwrap_or_default()
}

impl Error {
    /// Create an error that did not originate in the native layer.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: None,
            message: message.into(),
        }
    }

    /// Translate a native status into its catalogued kind.
    pub fn from_native(code: NativeStatus) -> Self {
        match lookup(code) {
            Some(info) => Self {
                kind: info.kind,
                code: Some(code),
                message: info.description.to_string(),
            },
            None => Self {
                kind: ErrorKind::Unexpected,
                code: Some(code),
                message: format!("unrecognised native status 0x{code:08X}"),
            },
        }
    }

    /// Wrap a native status from establishing or releasing a context.
    pub fn context(code: NativeStatus) -> Self {
        let message = lookup(code)
            .map(|info| info.description.to_string())
            .unwrap_or_else(|| format!("unrecognised native status 0x{code:08X}"));
        Self {
            kind: ErrorKind::ContextError,
            code: Some(code),
            message,
        }
    }

    /// Replace the description, keeping kind and code.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub(crate) fn cancelled() -> Self {
        Self::from_native(codes::SCARD_E_CANCELLED)
    }

    pub(crate) fn timeout() -> Self {
        Self::from_native(codes::SCARD_E_TIMEOUT)
    }

    /// Semantic kind of the failure.
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Raw native status, when the failure came from the native layer.
    pub const fn code(&self) -> Option<NativeStatus> {
        self.code
    }

    /// Human-readable description.
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Catalog entry for one native status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NativeCodeInfo {
    pub code: NativeStatus,
    pub name: &'static str,
    pub description: &'static str,
    pub kind: ErrorKind,
}

const fn entry(
    code: NativeStatus,
    name: &'static str,
    description: &'static str,
    kind: ErrorKind,
) -> NativeCodeInfo {
    NativeCodeInfo {
        code,
        name,
        description,
        kind,
    }
}

use codes::*;
use ErrorKind::*;

/// Every native failure and warning status with its semantic kind.
pub static NATIVE_CODES: &[NativeCodeInfo] = &[
    entry(SCARD_F_INTERNAL_ERROR, "SCARD_F_INTERNAL_ERROR", "An internal consistency check failed", InternalError),
    entry(SCARD_E_CANCELLED, "SCARD_E_CANCELLED", "The action was cancelled by an SCardCancel request", Cancelled),
    entry(SCARD_E_INVALID_HANDLE, "SCARD_E_INVALID_HANDLE", "The supplied handle was invalid", InvalidParameter),
    entry(SCARD_E_INVALID_PARAMETER, "SCARD_E_INVALID_PARAMETER", "One or more of the supplied parameters could not be properly interpreted", InvalidParameter),
    entry(SCARD_E_INVALID_TARGET, "SCARD_E_INVALID_TARGET", "Registry startup information is missing or invalid", InvalidParameter),
    entry(SCARD_E_NO_MEMORY, "SCARD_E_NO_MEMORY", "Not enough memory available to complete this command", InternalError),
    entry(SCARD_F_WAITED_TOO_LONG, "SCARD_F_WAITED_TOO_LONG", "An internal consistency timer has expired", Timeout),
    entry(SCARD_E_INSUFFICIENT_BUFFER, "SCARD_E_INSUFFICIENT_BUFFER", "The data buffer to receive returned data is too small", InvalidParameter),
    entry(SCARD_E_UNKNOWN_READER, "SCARD_E_UNKNOWN_READER", "The specified reader name is not recognized", UnknownReader),
    entry(SCARD_E_TIMEOUT, "SCARD_E_TIMEOUT", "The user-specified timeout value has expired", Timeout),
    entry(SCARD_E_SHARING_VIOLATION, "SCARD_E_SHARING_VIOLATION", "The smart card cannot be accessed because of other connections outstanding", SharingViolation),
    entry(SCARD_E_NO_SMARTCARD, "SCARD_E_NO_SMARTCARD", "The operation requires a smart card, but no smart card is currently in the device", NoSmartcard),
    entry(SCARD_E_UNKNOWN_CARD, "SCARD_E_UNKNOWN_CARD", "The specified smart card name is not recognized", UnsupportedCard),
    entry(SCARD_E_CANT_DISPOSE, "SCARD_E_CANT_DISPOSE", "The system could not dispose of the media in the requested manner", NotSupported),
    entry(SCARD_E_PROTO_MISMATCH, "SCARD_E_PROTO_MISMATCH", "The requested protocols are incompatible with the protocol currently in use with the smart card", ProtocolMismatch),
    entry(SCARD_E_NOT_READY, "SCARD_E_NOT_READY", "The reader or smart card is not ready to accept commands", ReaderUnavailable),
    entry(SCARD_E_INVALID_VALUE, "SCARD_E_INVALID_VALUE", "One or more of the supplied parameters values could not be properly interpreted", InvalidParameter),
    entry(SCARD_E_SYSTEM_CANCELLED, "SCARD_E_SYSTEM_CANCELLED", "The action was cancelled by the system, presumably to log off or shut down", Cancelled),
    entry(SCARD_F_COMM_ERROR, "SCARD_F_COMM_ERROR", "An internal communications error has been detected", CommunicationError),
    entry(SCARD_F_UNKNOWN_ERROR, "SCARD_F_UNKNOWN_ERROR", "An internal error has been detected, but the source is unknown", InternalError),
    entry(SCARD_E_INVALID_ATR, "SCARD_E_INVALID_ATR", "An ATR obtained from the registry is not a valid ATR string", UnsupportedCard),
    entry(SCARD_E_NOT_TRANSACTED, "SCARD_E_NOT_TRANSACTED", "An attempt was made to end a non-existent transaction", NotTransacted),
    entry(SCARD_E_READER_UNAVAILABLE, "SCARD_E_READER_UNAVAILABLE", "The specified reader is not currently available for use", ReaderUnavailable),
    entry(SCARD_P_SHUTDOWN, "SCARD_P_SHUTDOWN", "The operation has been aborted to allow the server application to exit", ServiceUnavailable),
    entry(SCARD_E_PCI_TOO_SMALL, "SCARD_E_PCI_TOO_SMALL", "The PCI Receive buffer was too small", InvalidParameter),
    entry(SCARD_E_READER_UNSUPPORTED, "SCARD_E_READER_UNSUPPORTED", "The reader driver does not meet minimal requirements for support", NotSupported),
    entry(SCARD_E_DUPLICATE_READER, "SCARD_E_DUPLICATE_READER", "The reader driver did not produce a unique reader name", ReaderUnavailable),
    entry(SCARD_E_CARD_UNSUPPORTED, "SCARD_E_CARD_UNSUPPORTED", "The smart card does not meet minimal requirements for support", UnsupportedCard),
    entry(SCARD_E_NO_SERVICE, "SCARD_E_NO_SERVICE", "The smart card resource manager is not running", ServiceUnavailable),
    entry(SCARD_E_SERVICE_STOPPED, "SCARD_E_SERVICE_STOPPED", "The smart card resource manager has shut down", ServiceUnavailable),
    entry(SCARD_E_UNEXPECTED, "SCARD_E_UNEXPECTED", "An unexpected card error has occurred", InternalError),
    entry(SCARD_E_ICC_INSTALLATION, "SCARD_E_ICC_INSTALLATION", "No primary provider can be found for the smart card", UnsupportedCard),
    entry(SCARD_E_ICC_CREATEORDER, "SCARD_E_ICC_CREATEORDER", "The requested order of object creation is not supported", UnsupportedCard),
    entry(SCARD_E_UNSUPPORTED_FEATURE, "SCARD_E_UNSUPPORTED_FEATURE", "This smart card does not support the requested feature", NotSupported),
    entry(SCARD_E_DIR_NOT_FOUND, "SCARD_E_DIR_NOT_FOUND", "The identified directory does not exist in the smart card", NotFound),
    entry(SCARD_E_FILE_NOT_FOUND, "SCARD_E_FILE_NOT_FOUND", "The identified file does not exist in the smart card", NotFound),
    entry(SCARD_E_NO_DIR, "SCARD_E_NO_DIR", "The supplied path does not represent a smart card directory", NotFound),
    entry(SCARD_E_NO_FILE, "SCARD_E_NO_FILE", "The supplied path does not represent a smart card file", NotFound),
    entry(SCARD_E_NO_ACCESS, "SCARD_E_NO_ACCESS", "Access is denied to this file", SecurityViolation),
    entry(SCARD_E_WRITE_TOO_MANY, "SCARD_E_WRITE_TOO_MANY", "The smart card does not have enough memory to store the information", InvalidParameter),
    entry(SCARD_E_BAD_SEEK, "SCARD_E_BAD_SEEK", "There was an error trying to set the smart card file object pointer", InvalidParameter),
    entry(SCARD_E_INVALID_CHV, "SCARD_E_INVALID_CHV", "The supplied PIN is incorrect", SecurityViolation),
    entry(SCARD_E_UNKNOWN_RES_MNG, "SCARD_E_UNKNOWN_RES_MNG", "An unrecognized error code was returned from a layered component", ServiceUnavailable),
    entry(SCARD_E_NO_SUCH_CERTIFICATE, "SCARD_E_NO_SUCH_CERTIFICATE", "The requested certificate does not exist", NotFound),
    entry(SCARD_E_CERTIFICATE_UNAVAILABLE, "SCARD_E_CERTIFICATE_UNAVAILABLE", "The requested certificate could not be obtained", NotFound),
    entry(SCARD_E_NO_READERS_AVAILABLE, "SCARD_E_NO_READERS_AVAILABLE", "Cannot find a smart card reader", NoReadersAvailable),
    entry(SCARD_E_COMM_DATA_LOST, "SCARD_E_COMM_DATA_LOST", "A communications error with the smart card has been detected", CommunicationError),
    entry(SCARD_E_NO_KEY_CONTAINER, "SCARD_E_NO_KEY_CONTAINER", "The requested key container does not exist on the smart card", NotFound),
    entry(SCARD_E_SERVER_TOO_BUSY, "SCARD_E_SERVER_TOO_BUSY", "The smart card resource manager is too busy to complete this operation", ServiceUnavailable),
    entry(SCARD_W_UNSUPPORTED_CARD, "SCARD_W_UNSUPPORTED_CARD", "The reader cannot communicate with the card, due to ATR string configuration conflicts", UnsupportedCard),
    entry(SCARD_W_UNRESPONSIVE_CARD, "SCARD_W_UNRESPONSIVE_CARD", "The smart card is not responding to a reset", UnresponsiveCard),
    entry(SCARD_W_UNPOWERED_CARD, "SCARD_W_UNPOWERED_CARD", "Power has been removed from the smart card, so that further communication is not possible", UnpoweredCard),
    entry(SCARD_W_RESET_CARD, "SCARD_W_RESET_CARD", "The smart card has been reset, so any shared state information is invalid", ResetCard),
    entry(SCARD_W_REMOVED_CARD, "SCARD_W_REMOVED_CARD", "The smart card has been removed, so further communication is not possible", RemovedCard),
    entry(SCARD_W_SECURITY_VIOLATION, "SCARD_W_SECURITY_VIOLATION", "Access was denied because of a security violation", SecurityViolation),
    entry(SCARD_W_WRONG_CHV, "SCARD_W_WRONG_CHV", "The card cannot be accessed because the wrong PIN was presented", SecurityViolation),
    entry(SCARD_W_CHV_BLOCKED, "SCARD_W_CHV_BLOCKED", "The card cannot be accessed because the maximum number of PIN entry attempts has been reached", SecurityViolation),
    entry(SCARD_W_EOF, "SCARD_W_EOF", "The end of the smart card file has been reached", NotFound),
    entry(SCARD_W_CANCELLED_BY_USER, "SCARD_W_CANCELLED_BY_USER", "The user pressed \"Cancel\" on a Smart Card Selection Dialog", Cancelled),
    entry(SCARD_W_CARD_NOT_AUTHENTICATED, "SCARD_W_CARD_NOT_AUTHENTICATED", "No PIN was presented to the smart card", SecurityViolation),
    entry(SCARD_W_CACHE_ITEM_NOT_FOUND, "SCARD_W_CACHE_ITEM_NOT_FOUND", "The requested item could not be found in the cache", NotFound),
    entry(SCARD_W_CACHE_ITEM_STALE, "SCARD_W_CACHE_ITEM_STALE", "The requested cache item is too old and was deleted from the cache", NotFound),
    entry(SCARD_W_CACHE_ITEM_TOO_BIG, "SCARD_W_CACHE_ITEM_TOO_BIG", "The new cache item exceeds the maximum per-item size defined for the cache", InvalidParameter),
];

/// Find the catalog entry for a native status.
pub fn lookup(code: NativeStatus) -> Option<&'static NativeCodeInfo> {
    NATIVE_CODES.iter().find(|info| info.code == code)
}
