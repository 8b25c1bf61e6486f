//! The native resource-manager capability.
//!
//! [`ResourceManager`] is the seam between the session state machine and
//! whatever multiplexes the physical readers. [`crate::core::pcsc::Pcsc`] is
//! the production implementation. Every primitive reports failures as a raw
//! [`NativeStatus`], which callers translate with [`Error::from_native`].
//!
//! [`Error::from_native`]: crate::core::error::Error::from_native

use std::fmt;
use std::time::Duration;

use bitflags::bitflags;

use crate::core::error::NativeStatus;
use crate::core::reader::ReaderState;

/// Result of a native primitive.
pub type NativeResult<T> = std::result::Result<T, NativeStatus>;

/// Scope in which a context is established.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Scope {
    User,
    Terminal,
    /// Process-wide system scope.
    #[default]
    System,
    Global,
}

/// Sharing mode for card connections
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShareMode {
    /// Exclusive access to the card
    Exclusive,
    /// Shared access to the card (default)
    #[default]
    Shared,
    /// Direct connection to the reader
    Direct,
}

impl fmt::Display for ShareMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Exclusive => "exclusive",
            Self::Shared => "shared",
            Self::Direct => "direct",
        })
    }
}

/// Transmission protocol negotiated with a card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Protocol {
    T0,
    T1,
    Raw,
    /// No protocol, e.g. on a direct connection without a card.
    #[default]
    Undefined,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::T0 => "T=0",
            Self::T1 => "T=1",
            Self::Raw => "raw",
            Self::Undefined => "undefined",
        })
    }
}

bitflags! {
    /// Protocols acceptable when connecting.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Protocols: u32 {
        const T0 = 0x0001;
        const T1 = 0x0002;
        const RAW = 0x0004;
        const ANY = Self::T0.bits() | Self::T1.bits();
    }
}

impl Default for Protocols {
    fn default() -> Self {
        Self::ANY
    }
}

/// What happens to the card when a connection is closed or reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Disposition {
    /// Leave the card powered and untouched.
    #[default]
    LeaveCard,
    ResetCard,
    UnpowerCard,
    EjectCard,
}

/// Protocol and ATR reported after connecting or reconnecting.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Negotiated {
    pub protocol: Protocol,
    pub atr: Vec<u8>,
}

/// One reader entry of a status-change request.
///
/// The caller states what it believes the reader state to be
/// (`current_state`). The resource manager blocks until the actual state
/// differs, then fills in `event_state`, the event counter and the ATR.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReaderQuery {
    name: String,
    current_state: ReaderState,
    event_state: ReaderState,
    event_count: Option<u32>,
    atr: Vec<u8>,
}

impl ReaderQuery {
    /// A query that knows nothing yet, so the first poll returns at once.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            current_state: ReaderState::UNAWARE,
            event_state: ReaderState::UNAWARE,
            event_count: None,
            atr: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn current_state(&self) -> ReaderState {
        self.current_state
    }

    pub fn event_state(&self) -> ReaderState {
        self.event_state
    }

    pub fn event_count(&self) -> Option<u32> {
        self.event_count
    }

    pub fn atr(&self) -> &[u8] {
        &self.atr
    }

    /// Record what the resource manager reported.
    pub fn update(&mut self, event_state: ReaderState, event_count: Option<u32>, atr: &[u8]) {
        self.event_state = event_state;
        self.event_count = event_count;
        self.atr = atr.to_vec();
    }

    /// Accept the reported state as known, so the next poll waits for a
    /// further change.
    pub fn sync_current_state(&mut self) {
        self.current_state = self.event_state - ReaderState::CHANGED;
    }
}

/// Primitives offered by a PC/SC-style resource manager.
///
/// Implementations must be usable from several threads: [`cancel`] is called
/// from a thread other than the one blocked in [`get_status_change`].
///
/// [`cancel`]: ResourceManager::cancel
/// [`get_status_change`]: ResourceManager::get_status_change
#[cfg_attr(test, mockall::automock(type Context = u32; type Card = u32;))]
pub trait ResourceManager: Send + Sync {
    /// Native context handle. Clones refer to the same context.
    type Context: Clone + Send + Sync;
    /// Native card connection handle.
    type Card: Send;

    fn establish_context(&self, scope: Scope) -> NativeResult<Self::Context>;

    fn release_context(&self, context: Self::Context) -> NativeResult<()>;

    /// Names of the attached readers.
    fn list_readers(&self, context: &Self::Context) -> NativeResult<Vec<String>>;

    /// Block until one of `readers` differs from its current state, or until
    /// `timeout` elapses (`None` waits forever).
    fn get_status_change(
        &self,
        context: &Self::Context,
        timeout: Option<Duration>,
        readers: &mut [ReaderQuery],
    ) -> NativeResult<()>;

    /// Unblock a pending [`ResourceManager::get_status_change`] on `context`.
    fn cancel(&self, context: &Self::Context) -> NativeResult<()>;

    fn connect(
        &self,
        context: &Self::Context,
        reader: &str,
        share_mode: ShareMode,
        protocols: Protocols,
    ) -> NativeResult<(Self::Card, Negotiated)>;

    fn reconnect(
        &self,
        card: &mut Self::Card,
        share_mode: ShareMode,
        protocols: Protocols,
        initialization: Disposition,
    ) -> NativeResult<Negotiated>;

    fn disconnect(&self, card: Self::Card, disposition: Disposition) -> NativeResult<()>;

    /// Send raw command bytes and return the raw reply.
    fn transmit(&self, card: &Self::Card, command: &[u8]) -> NativeResult<Vec<u8>>;
}
