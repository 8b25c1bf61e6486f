//! Connection options.

use crate::core::native::{Disposition, Protocols, ShareMode};

/// Options used when connecting to a card.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectOptions {
    /// Sharing mode for the connection
    pub share_mode: ShareMode,

    /// Protocols the card may negotiate
    pub protocols: Protocols,

    /// What to do with the card when the connection is dropped
    pub disposition: Disposition,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            share_mode: ShareMode::Shared,
            protocols: Protocols::ANY,
            disposition: Disposition::LeaveCard,
        }
    }
}

impl ConnectOptions {
    /// Create the default options
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the sharing mode
    pub const fn with_share_mode(mut self, mode: ShareMode) -> Self {
        self.share_mode = mode;
        self
    }

    /// Set the preferred protocols
    pub const fn with_protocols(mut self, protocols: Protocols) -> Self {
        self.protocols = protocols;
        self
    }

    /// Set the disposition applied when the card is dropped
    pub const fn with_disposition(mut self, disposition: Disposition) -> Self {
        self.disposition = disposition;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = ConnectOptions::new();
        assert_eq!(options.share_mode, ShareMode::Shared);
        assert_eq!(options.protocols, Protocols::T0 | Protocols::T1);
        assert_eq!(options.disposition, Disposition::LeaveCard);
    }

    #[test]
    fn test_builders() {
        let options = ConnectOptions::new()
            .with_share_mode(ShareMode::Direct)
            .with_protocols(Protocols::RAW)
            .with_disposition(Disposition::ResetCard);
        assert_eq!(options.share_mode, ShareMode::Direct);
        assert_eq!(options.protocols, Protocols::RAW);
        assert_eq!(options.disposition, Disposition::ResetCard);
    }
}
