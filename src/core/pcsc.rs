//! [`ResourceManager`] backed by the platform PC/SC service.

use std::ffi::CString;
use std::time::Duration;

use crate::core::error::{codes, NativeStatus};
use crate::core::native::{
    Disposition, NativeResult, Negotiated, Protocol, Protocols, ReaderQuery, ResourceManager,
    Scope, ShareMode,
};
use crate::core::reader::ReaderState;

/// The platform PC/SC resource manager (pcsc-lite, WinSCard or
/// CryptoTokenKit, through the `pcsc` crate).
#[derive(Debug, Clone, Copy, Default)]
pub struct Pcsc;

const STATE_FLAGS: [(ReaderState, pcsc::State); 11] = [
    (ReaderState::IGNORE, pcsc::State::IGNORE),
    (ReaderState::CHANGED, pcsc::State::CHANGED),
    (ReaderState::UNKNOWN, pcsc::State::UNKNOWN),
    (ReaderState::UNAVAILABLE, pcsc::State::UNAVAILABLE),
    (ReaderState::EMPTY, pcsc::State::EMPTY),
    (ReaderState::PRESENT, pcsc::State::PRESENT),
    (ReaderState::ATRMATCH, pcsc::State::ATRMATCH),
    (ReaderState::EXCLUSIVE, pcsc::State::EXCLUSIVE),
    (ReaderState::INUSE, pcsc::State::INUSE),
    (ReaderState::MUTE, pcsc::State::MUTE),
    (ReaderState::UNPOWERED, pcsc::State::UNPOWERED),
];

fn status(err: pcsc::Error) -> NativeStatus {
    err as NativeStatus
}

fn reader_name(name: &str) -> NativeResult<CString> {
    CString::new(name).map_err(|_| codes::SCARD_E_INVALID_PARAMETER)
}

fn to_pcsc_state(state: ReaderState) -> pcsc::State {
    STATE_FLAGS
        .iter()
        .filter(|(ours, _)| state.contains(*ours))
        .fold(pcsc::State::UNAWARE, |acc, (_, theirs)| acc | *theirs)
}

fn from_pcsc_state(state: pcsc::State) -> ReaderState {
    STATE_FLAGS
        .iter()
        .filter(|(_, theirs)| state.contains(*theirs))
        .fold(ReaderState::UNAWARE, |acc, (ours, _)| acc | *ours)
}

fn to_pcsc_protocols(protocols: Protocols) -> pcsc::Protocols {
    let mut result = pcsc::Protocols::UNDEFINED;
    if protocols.contains(Protocols::T0) {
        result |= pcsc::Protocols::T0;
    }
    if protocols.contains(Protocols::T1) {
        result |= pcsc::Protocols::T1;
    }
    if protocols.contains(Protocols::RAW) {
        result |= pcsc::Protocols::RAW;
    }
    result
}

impl From<Scope> for pcsc::Scope {
    fn from(scope: Scope) -> Self {
        match scope {
            Scope::User => pcsc::Scope::User,
            Scope::Terminal => pcsc::Scope::Terminal,
            Scope::System => pcsc::Scope::System,
            Scope::Global => pcsc::Scope::Global,
        }
    }
}

impl From<ShareMode> for pcsc::ShareMode {
    fn from(mode: ShareMode) -> Self {
        match mode {
            ShareMode::Exclusive => pcsc::ShareMode::Exclusive,
            ShareMode::Shared => pcsc::ShareMode::Shared,
            ShareMode::Direct => pcsc::ShareMode::Direct,
        }
    }
}

impl From<Disposition> for pcsc::Disposition {
    fn from(disposition: Disposition) -> Self {
        match disposition {
            Disposition::LeaveCard => pcsc::Disposition::LeaveCard,
            Disposition::ResetCard => pcsc::Disposition::ResetCard,
            Disposition::UnpowerCard => pcsc::Disposition::UnpowerCard,
            Disposition::EjectCard => pcsc::Disposition::EjectCard,
        }
    }
}

impl From<Option<pcsc::Protocol>> for Protocol {
    fn from(protocol: Option<pcsc::Protocol>) -> Self {
        match protocol {
            Some(pcsc::Protocol::T0) => Protocol::T0,
            Some(pcsc::Protocol::T1) => Protocol::T1,
            Some(pcsc::Protocol::RAW) => Protocol::Raw,
            None => Protocol::Undefined,
        }
    }
}

fn negotiated(card: &pcsc::Card) -> NativeResult<Negotiated> {
    let status2 = card.status2_owned().map_err(status)?;
    Ok(Negotiated {
        protocol: status2.protocol2().into(),
        atr: status2.atr().to_vec(),
    })
}

impl ResourceManager for Pcsc {
    type Context = pcsc::Context;
    type Card = pcsc::Card;

    fn establish_context(&self, scope: Scope) -> NativeResult<pcsc::Context> {
        pcsc::Context::establish(scope.into()).map_err(status)
    }

    fn release_context(&self, context: pcsc::Context) -> NativeResult<()> {
        match context.release() {
            Ok(()) => Ok(()),
            // Outstanding cancellers still share the handle; it is released
            // when the last of them is dropped.
            Err((context, pcsc::Error::CantDispose)) => {
                log::warn!("Context still shared by a canceller, native release deferred");
                drop(context);
                Ok(())
            }
            Err((_, err)) => Err(status(err)),
        }
    }

    fn list_readers(&self, context: &pcsc::Context) -> NativeResult<Vec<String>> {
        let readers = context.list_readers_owned().map_err(status)?;
        Ok(readers
            .iter()
            .map(|name| name.to_string_lossy().into_owned())
            .collect())
    }

    fn get_status_change(
        &self,
        context: &pcsc::Context,
        timeout: Option<Duration>,
        readers: &mut [ReaderQuery],
    ) -> NativeResult<()> {
        let mut states = readers
            .iter()
            .map(|query| {
                Ok(pcsc::ReaderState::new(
                    reader_name(query.name())?,
                    to_pcsc_state(query.current_state()),
                ))
            })
            .collect::<NativeResult<Vec<_>>>()?;

        context
            .get_status_change(timeout, &mut states)
            .map_err(status)?;

        for (query, state) in readers.iter_mut().zip(&states) {
            query.update(
                from_pcsc_state(state.event_state()),
                Some(state.event_count()),
                state.atr(),
            );
        }
        Ok(())
    }

    fn cancel(&self, context: &pcsc::Context) -> NativeResult<()> {
        context.cancel().map_err(status)
    }

    fn connect(
        &self,
        context: &pcsc::Context,
        reader: &str,
        share_mode: ShareMode,
        protocols: Protocols,
    ) -> NativeResult<(pcsc::Card, Negotiated)> {
        let name = reader_name(reader)?;
        let card = context
            .connect(&name, share_mode.into(), to_pcsc_protocols(protocols))
            .map_err(status)?;
        let negotiated = negotiated(&card)?;
        Ok((card, negotiated))
    }

    fn reconnect(
        &self,
        card: &mut pcsc::Card,
        share_mode: ShareMode,
        protocols: Protocols,
        initialization: Disposition,
    ) -> NativeResult<Negotiated> {
        card.reconnect(share_mode.into(), to_pcsc_protocols(protocols), initialization.into())
            .map_err(status)?;
        negotiated(card)
    }

    fn disconnect(&self, card: pcsc::Card, disposition: Disposition) -> NativeResult<()> {
        card.disconnect(disposition.into())
            .map_err(|(_, err)| status(err))
    }

    fn transmit(&self, card: &pcsc::Card, command: &[u8]) -> NativeResult<Vec<u8>> {
        let mut buffer = vec![0; pcsc::MAX_BUFFER_SIZE_EXTENDED];
        let response = card.transmit(command, &mut buffer).map_err(status)?;
        Ok(response.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_mapping_round_trips_each_flag() {
        for (ours, theirs) in STATE_FLAGS {
            assert_eq!(to_pcsc_state(ours), theirs);
            assert_eq!(from_pcsc_state(theirs), ours);
        }
        assert_eq!(from_pcsc_state(pcsc::State::UNAWARE), ReaderState::UNAWARE);
    }

    #[test]
    fn test_protocol_mapping() {
        assert_eq!(to_pcsc_protocols(Protocols::ANY), pcsc::Protocols::ANY);
        assert_eq!(to_pcsc_protocols(Protocols::RAW), pcsc::Protocols::RAW);
        assert_eq!(Protocol::from(None), Protocol::Undefined);
        assert_eq!(Protocol::from(Some(pcsc::Protocol::T1)), Protocol::T1);
    }

    #[test]
    fn test_error_status_is_raw_code() {
        assert_eq!(status(pcsc::Error::NoSmartcard), codes::SCARD_E_NO_SMARTCARD);
        assert_eq!(status(pcsc::Error::Timeout), codes::SCARD_E_TIMEOUT);
        assert_eq!(status(pcsc::Error::RemovedCard), codes::SCARD_W_REMOVED_CARD);
    }

    #[test]
    fn test_interior_nul_is_invalid_parameter() {
        assert_eq!(reader_name("bad\0name"), Err(codes::SCARD_E_INVALID_PARAMETER));
    }
}
