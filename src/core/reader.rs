use bitflags::bitflags;
use serde::Serialize;

use crate::core::atr::Atr;
use crate::core::card::Card;
use crate::core::config::ConnectOptions;
use crate::core::context::Context;
use crate::core::error::{Error, Result};
use crate::core::native::{Protocols, ReaderQuery, ResourceManager, ShareMode};
use crate::core::pcsc::Pcsc;

bitflags! {
    /// State of a reader as reported by status polling.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ReaderState: u32 {
        /// The application is not interested in this reader.
        const IGNORE = 0x0001;
        /// The state differs from the caller's current state.
        const CHANGED = 0x0002;
        /// The reader name is not recognised.
        const UNKNOWN = 0x0004;
        /// The actual state of this reader is not available.
        const UNAVAILABLE = 0x0008;
        /// There is no card in the reader.
        const EMPTY = 0x0010;
        /// There is a card in the reader.
        const PRESENT = 0x0020;
        /// The card ATR matches one of the target cards.
        const ATRMATCH = 0x0040;
        /// The card is in use exclusively by another application.
        const EXCLUSIVE = 0x0080;
        /// The card is in use by one or more applications.
        const INUSE = 0x0100;
        /// The card does not answer to reset.
        const MUTE = 0x0200;
        /// The card is not powered.
        const UNPOWERED = 0x0400;
    }
}

impl ReaderState {
    /// Nothing known about the reader yet.
    pub const UNAWARE: Self = Self::empty();

    /// A card is present and the reader does not also claim to be empty.
    pub fn has_card(self) -> bool {
        self.contains(Self::PRESENT) && !self.contains(Self::EMPTY)
    }

    pub fn card_absent(self) -> bool {
        self.contains(Self::EMPTY)
    }

    pub fn is_exclusive(self) -> bool {
        self.contains(Self::EXCLUSIVE)
    }

    pub fn is_in_use(self) -> bool {
        self.contains(Self::INUSE)
    }

    pub fn is_mute(self) -> bool {
        self.contains(Self::MUTE)
    }

    pub fn is_unpowered(self) -> bool {
        self.contains(Self::UNPOWERED)
    }

    pub fn is_unavailable(self) -> bool {
        self.contains(Self::UNAVAILABLE)
    }

    pub fn has_changed(self) -> bool {
        self.contains(Self::CHANGED)
    }

    /// Lowercase names of the set flags, "unaware" when none are set.
    pub fn labels(self) -> Vec<String> {
        if self.is_empty() {
            return vec!["unaware".to_string()];
        }
        self.iter_names()
            .map(|(name, _)| name.to_lowercase())
            .collect()
    }
}

impl Serialize for ReaderState {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_seq(self.labels())
    }
}

/// A named card reader, borrowed from its [`Context`].
///
/// The cached state is whatever the last status poll reported. Reading it
/// never polls; call [`Reader::refresh`] for a fresh value.
pub struct Reader<'ctx, R: ResourceManager = Pcsc> {
    context: &'ctx Context<R>,
    name: String,
    state: ReaderState,
    event_count: Option<u32>,
    atr: Option<Atr>,
}

impl<'ctx, R: ResourceManager> Reader<'ctx, R> {
    pub(crate) fn new(context: &'ctx Context<R>, name: impl Into<String>) -> Self {
        Self {
            context,
            name: name.into(),
            state: ReaderState::UNAWARE,
            event_count: None,
            atr: None,
        }
    }

    pub(crate) fn from_query(context: &'ctx Context<R>, query: &ReaderQuery) -> Self {
        let mut reader = Self::new(context, query.name());
        reader.apply(query);
        reader
    }

    fn apply(&mut self, query: &ReaderQuery) {
        self.state = query.event_state() - ReaderState::CHANGED;
        self.event_count = query.event_count();
        self.atr = match query.atr() {
            [] => None,
            bytes => match Atr::new(bytes) {
                Ok(atr) => Some(atr),
                Err(err) => {
                    log::warn!("Ignoring ATR reported by {}: {}", self.name, err);
                    None
                }
            },
        };
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// State seen by the last poll.
    pub fn current_state(&self) -> ReaderState {
        self.state
    }

    pub fn event_count(&self) -> Option<u32> {
        self.event_count
    }

    /// ATR seen by the last poll, if a card was present.
    pub fn atr(&self) -> Option<&Atr> {
        self.atr.as_ref()
    }

    pub fn has_card(&self) -> bool {
        self.state.has_card()
    }

    /// Poll this reader once without blocking and update the cached view.
    pub fn refresh(&mut self) -> Result<()> {
        let native = self.context.native()?;
        let mut queries = [ReaderQuery::new(self.name.as_str())];
        self.context
            .manager()
            .get_status_change(native, Some(std::time::Duration::ZERO), &mut queries)
            .map_err(Error::from_native)?;
        log::debug!(
            "Reader {} state: {}",
            self.name,
            queries[0].event_state().labels().join(", ")
        );
        self.apply(&queries[0]);
        Ok(())
    }

    /// Connect to the card in this reader.
    pub fn connect(&self, share_mode: ShareMode, protocols: Protocols) -> Result<Card<'ctx, R>> {
        let options = ConnectOptions::default()
            .with_share_mode(share_mode)
            .with_protocols(protocols);
        self.connect_with(&options)
    }

    /// Connect to the card in this reader using `options`.
    pub fn connect_with(&self, options: &ConnectOptions) -> Result<Card<'ctx, R>> {
        log::info!("Connecting to reader: {}", self.name);

        let native = self.context.native()?;
        let (handle, negotiated) = self
            .context
            .manager()
            .connect(native, &self.name, options.share_mode, options.protocols)
            .map_err(|code| {
                let err = Error::from_native(code);
                let message = format!("failed to connect to reader {}: {}", self.name, err.message());
                err.with_message(message)
            })?;

        let card = Card::new(self.context, handle, self.name.clone(), options, negotiated)?;

        log::info!(
            "Successfully connected to reader: {} ({})",
            self.name,
            card.protocol()
        );
        Ok(card)
    }
}

impl<R: ResourceManager> std::fmt::Debug for Reader<'_, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reader")
            .field("name", &self.name)
            .field("state", &self.state)
            .field("event_count", &self.event_count)
            .field("atr", &self.atr)
            .finish()
    }
}
