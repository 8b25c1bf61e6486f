use crate::core::apdu::{CommandApdu, ResponseApdu};
use crate::core::atr::Atr;
use crate::core::config::ConnectOptions;
use crate::core::context::Context;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::native::{Disposition, Negotiated, Protocol, Protocols, ResourceManager, ShareMode};
use crate::core::pcsc::Pcsc;
use crate::core::utils::format_hex_spaced;

/// An open connection to the card in a reader.
///
/// Dropping the card disconnects with the disposition it was connected with
/// (leave-card unless configured otherwise).
pub struct Card<'ctx, R: ResourceManager = Pcsc> {
    context: &'ctx Context<R>,
    handle: Option<R::Card>,
    reader: String,
    share_mode: ShareMode,
    protocol: Protocol,
    atr: Atr,
    disposition: Disposition,
}

impl<'ctx, R: ResourceManager> Card<'ctx, R> {
    pub(crate) fn new(
        context: &'ctx Context<R>,
        handle: R::Card,
        reader: String,
        options: &ConnectOptions,
        negotiated: Negotiated,
    ) -> Result<Self> {
        let mut card = Self {
            context,
            handle: Some(handle),
            reader,
            share_mode: options.share_mode,
            protocol: negotiated.protocol,
            atr: Atr::default(),
            disposition: options.disposition,
        };
        card.atr = Atr::new(negotiated.atr)?;
        Ok(card)
    }

    fn handle(&self) -> Result<&R::Card> {
        self.handle
            .as_ref()
            .ok_or_else(|| Error::new(ErrorKind::InvalidParameter, "card handle already closed"))
    }

    /// Send a command and return the raw response bytes.
    pub fn transmit(&self, command: &CommandApdu) -> Result<Vec<u8>> {
        if !command.is_valid() {
            return Err(Error::new(
                ErrorKind::InvalidCommand,
                format!("invalid command apdu: {}", format_hex_spaced(command.as_bytes())),
            ));
        }

        log::debug!("Sending APDU to {}: {}", self.reader, command);
        let response = self
            .context
            .manager()
            .transmit(self.handle()?, command.as_bytes())
            .map_err(Error::from_native)?;
        log::debug!("Received response: {}", format_hex_spaced(&response));

        Ok(response)
    }

    /// Send a command and parse the reply as a response APDU.
    pub fn transmit_apdu(&self, command: &CommandApdu) -> Result<ResponseApdu> {
        let response = self.transmit(command)?;
        ResponseApdu::new(response)
    }

    /// Renegotiate the connection, replacing the protocol and ATR.
    pub fn reconnect(
        &mut self,
        share_mode: ShareMode,
        protocols: Protocols,
        initialization: Disposition,
    ) -> Result<()> {
        log::info!("Reconnecting to reader: {}", self.reader);
        let manager = self.context.manager();
        let handle = self
            .handle
            .as_mut()
            .ok_or_else(|| Error::new(ErrorKind::InvalidParameter, "card handle already closed"))?;
        let negotiated = manager
            .reconnect(handle, share_mode, protocols, initialization)
            .map_err(Error::from_native)?;

        self.share_mode = share_mode;
        self.protocol = negotiated.protocol;
        self.atr = Atr::new(negotiated.atr)?;
        Ok(())
    }

    /// Close the connection, applying `disposition` to the card.
    pub fn disconnect(mut self, disposition: Disposition) -> Result<()> {
        match self.handle.take() {
            Some(handle) => {
                self.context
                    .manager()
                    .disconnect(handle, disposition)
                    .map_err(Error::from_native)?;
                log::info!("Disconnected from reader: {}", self.reader);
                Ok(())
            }
            None => Ok(()),
        }
    }

    /// ATR captured when connecting, or on the last reconnect.
    pub fn atr(&self) -> &Atr {
        &self.atr
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    pub fn share_mode(&self) -> ShareMode {
        self.share_mode
    }

    pub fn reader_name(&self) -> &str {
        &self.reader
    }
}

impl<R: ResourceManager> Drop for Card<'_, R> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            if let Err(code) = self.context.manager().disconnect(handle, self.disposition) {
                log::warn!(
                    "Failed to disconnect cleanly from card in {}: {}",
                    self.reader,
                    Error::from_native(code)
                );
            }
        }
    }
}

impl<R: ResourceManager> std::fmt::Debug for Card<'_, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Card")
            .field("reader", &self.reader)
            .field("share_mode", &self.share_mode)
            .field("protocol", &self.protocol)
            .field("atr", &self.atr)
            .finish()
    }
}
