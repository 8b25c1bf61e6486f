/// Mock PCSC tests for testing without real hardware
///
/// `MockPcsc` is a scripted resource manager: tests insert and remove cards
/// from other threads while the session code blocks in status polling.
use smartcard::core::error::{codes, ErrorKind};
use smartcard::{
    CommandApdu, Context, Disposition, NativeStatus, Negotiated, Protocol, Protocols, ReaderQuery,
    ReaderState, ResourceManager, Scope, ShareMode,
};
use std::collections::HashMap;
use std::sync::{mpsc, Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

type NativeResult<T> = Result<T, NativeStatus>;

const ATR: [u8; 10] = [0x3B, 0x75, 0x13, 0x00, 0x00, 0x47, 0x09, 0xEA, 0x90, 0x00];

#[derive(Debug, Clone)]
struct MockSlot {
    name: String,
    state: ReaderState,
    atr: Vec<u8>,
    events: u32,
    exclusive: bool,
}

type Hook = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct Bench {
    slots: Vec<MockSlot>,
    responses: HashMap<Vec<u8>, Vec<u8>>,
    waiting: usize,
    cancel_pending: bool,
    released: usize,
    /// Runs once on the polling thread just before it would block.
    before_block: Option<Hook>,
}

impl Bench {
    /// Fill in every query; true when any differs from its current state.
    fn report(&self, readers: &mut [ReaderQuery]) -> bool {
        let mut changed = false;
        for query in readers.iter_mut() {
            let (state, events, atr) = match self.slots.iter().find(|s| s.name == query.name()) {
                Some(slot) => (slot.state, Some(slot.events), slot.atr.clone()),
                None => (ReaderState::UNKNOWN, None, Vec::new()),
            };
            if state != query.current_state() {
                query.update(state | ReaderState::CHANGED, events, &atr);
                changed = true;
            } else {
                query.update(state, events, &atr);
            }
        }
        changed
    }

    fn slot_mut(&mut self, name: &str) -> &mut MockSlot {
        self.slots
            .iter_mut()
            .find(|s| s.name == name)
            .expect("unknown mock reader")
    }
}

#[derive(Debug)]
struct MockCard {
    reader: String,
    exclusive: bool,
}

/// Mock resource manager; clones share the same bench.
#[derive(Clone, Default)]
struct MockPcsc {
    shared: Arc<(Mutex<Bench>, Condvar)>,
}

impl MockPcsc {
    fn new(readers: &[&str]) -> Self {
        let mock = Self::default();
        mock.shared.0.lock().unwrap().slots = readers
            .iter()
            .map(|name| MockSlot {
                name: name.to_string(),
                state: ReaderState::EMPTY,
                atr: Vec::new(),
                events: 0,
                exclusive: false,
            })
            .collect();
        mock
    }

    fn insert_card(&self, reader: &str, atr: &[u8]) {
        let (lock, cvar) = &*self.shared;
        let mut bench = lock.lock().unwrap();
        let slot = bench.slot_mut(reader);
        slot.state = ReaderState::PRESENT;
        slot.atr = atr.to_vec();
        slot.events += 1;
        cvar.notify_all();
    }

    fn remove_card(&self, reader: &str) {
        let (lock, cvar) = &*self.shared;
        let mut bench = lock.lock().unwrap();
        let slot = bench.slot_mut(reader);
        slot.state = ReaderState::EMPTY;
        slot.atr.clear();
        slot.exclusive = false;
        slot.events += 1;
        cvar.notify_all();
    }

    fn add_mock_response(&self, command: &[u8], response: &[u8]) {
        self.shared
            .0
            .lock()
            .unwrap()
            .responses
            .insert(command.to_vec(), response.to_vec());
    }

    /// Block until some thread is parked in `get_status_change`.
    fn wait_until_blocked(&self) {
        let (lock, cvar) = &*self.shared;
        let bench = lock.lock().unwrap();
        let _bench = cvar
            .wait_while(bench, |bench| bench.waiting == 0)
            .unwrap();
    }

    /// Run `hook` on the next poll, after its checks and before it blocks.
    fn before_next_block(&self, hook: impl FnOnce() + Send + 'static) {
        self.shared.0.lock().unwrap().before_block = Some(Box::new(hook));
    }

    fn released(&self) -> usize {
        self.shared.0.lock().unwrap().released
    }
}

impl ResourceManager for MockPcsc {
    type Context = u32;
    type Card = MockCard;

    fn establish_context(&self, _scope: Scope) -> NativeResult<u32> {
        Ok(1)
    }

    fn release_context(&self, _context: u32) -> NativeResult<()> {
        self.shared.0.lock().unwrap().released += 1;
        Ok(())
    }

    fn list_readers(&self, _context: &u32) -> NativeResult<Vec<String>> {
        let bench = self.shared.0.lock().unwrap();
        Ok(bench.slots.iter().map(|s| s.name.clone()).collect())
    }

    fn get_status_change(
        &self,
        _context: &u32,
        timeout: Option<Duration>,
        readers: &mut [ReaderQuery],
    ) -> NativeResult<()> {
        let (lock, cvar) = &*self.shared;
        let deadline = timeout.map(|timeout| Instant::now() + timeout);
        let mut bench = lock.lock().unwrap();
        loop {
            if bench.report(readers) {
                return Ok(());
            }
            let now = Instant::now();
            if deadline.is_some_and(|deadline| now >= deadline) {
                return Err(codes::SCARD_E_TIMEOUT);
            }
            if let Some(hook) = bench.before_block.take() {
                drop(bench);
                hook();
                bench = lock.lock().unwrap();
                continue;
            }

            bench.waiting += 1;
            cvar.notify_all();
            bench = match deadline {
                Some(deadline) => cvar.wait_timeout(bench, deadline - now).unwrap().0,
                None => cvar.wait(bench).unwrap(),
            };
            bench.waiting -= 1;

            if std::mem::take(&mut bench.cancel_pending) {
                return Err(codes::SCARD_E_CANCELLED);
            }
        }
    }

    fn cancel(&self, _context: &u32) -> NativeResult<()> {
        let (lock, cvar) = &*self.shared;
        let mut bench = lock.lock().unwrap();
        if bench.waiting > 0 {
            bench.cancel_pending = true;
            cvar.notify_all();
        }
        Ok(())
    }

    fn connect(
        &self,
        _context: &u32,
        reader: &str,
        share_mode: ShareMode,
        _protocols: Protocols,
    ) -> NativeResult<(MockCard, Negotiated)> {
        let mut bench = self.shared.0.lock().unwrap();
        let slot = bench
            .slots
            .iter_mut()
            .find(|s| s.name == reader)
            .ok_or(codes::SCARD_E_UNKNOWN_READER)?;
        if slot.exclusive {
            return Err(codes::SCARD_E_SHARING_VIOLATION);
        }
        if !slot.state.has_card() {
            return Err(codes::SCARD_E_NO_SMARTCARD);
        }

        let exclusive = share_mode == ShareMode::Exclusive;
        slot.exclusive = exclusive;
        Ok((
            MockCard {
                reader: reader.to_string(),
                exclusive,
            },
            Negotiated {
                protocol: Protocol::T1,
                atr: slot.atr.clone(),
            },
        ))
    }

    fn reconnect(
        &self,
        card: &mut MockCard,
        _share_mode: ShareMode,
        _protocols: Protocols,
        _initialization: Disposition,
    ) -> NativeResult<Negotiated> {
        let mut bench = self.shared.0.lock().unwrap();
        let slot = bench.slot_mut(&card.reader);
        Ok(Negotiated {
            protocol: Protocol::T0,
            atr: slot.atr.clone(),
        })
    }

    fn disconnect(&self, card: MockCard, _disposition: Disposition) -> NativeResult<()> {
        if card.exclusive {
            self.shared.0.lock().unwrap().slot_mut(&card.reader).exclusive = false;
        }
        Ok(())
    }

    fn transmit(&self, card: &MockCard, command: &[u8]) -> NativeResult<Vec<u8>> {
        let bench = self.shared.0.lock().unwrap();
        let present = bench
            .slots
            .iter()
            .any(|s| s.name == card.reader && s.state.has_card());
        if !present {
            return Err(codes::SCARD_W_REMOVED_CARD);
        }
        Ok(bench
            .responses
            .get(command)
            .cloned()
            .unwrap_or_else(|| vec![0x6D, 0x00]))
    }
}

fn establish(mock: &MockPcsc) -> Context<MockPcsc> {
    Context::establish_with(mock.clone(), Scope::System).unwrap()
}

#[test]
fn test_list_readers_reports_cached_state() {
    let mock = MockPcsc::new(&["Mock Reader 1", "Mock Reader 2"]);
    mock.insert_card("Mock Reader 2", &ATR);
    let context = establish(&mock);

    let readers = context.list_readers().unwrap();
    assert_eq!(readers.len(), 2);
    assert!(!readers[0].has_card());
    assert!(readers[0].current_state().card_absent());
    assert!(readers[1].has_card());
    assert_eq!(readers[1].atr().unwrap().as_bytes(), &ATR);
    assert_eq!(readers[1].event_count(), Some(1));
}

#[test]
fn test_list_readers_without_readers() {
    let mock = MockPcsc::new(&[]);
    let context = establish(&mock);

    assert!(context.list_readers().unwrap().is_empty());
    let err = context.wait_for_card_present(None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NoReadersAvailable);
}

#[test]
fn test_zero_timeout_wait_returns_promptly() {
    let mock = MockPcsc::new(&["Mock Reader 1"]);
    let context = establish(&mock);

    let start = Instant::now();
    let err = context
        .wait_for_card_present(Some(Duration::ZERO))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert!(start.elapsed() < Duration::from_secs(1));
}

#[test]
fn test_finite_timeout_is_measured_from_entry() {
    let mock = MockPcsc::new(&["Mock Reader 1"]);
    let context = establish(&mock);

    let start = Instant::now();
    let err = context
        .wait_for_card_present(Some(Duration::from_millis(50)))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert!(start.elapsed() >= Duration::from_millis(50));
}

#[test]
fn test_present_card_satisfies_wait_immediately() {
    let mock = MockPcsc::new(&["Mock Reader 1"]);
    mock.insert_card("Mock Reader 1", &ATR);
    let context = establish(&mock);

    let reader = context
        .wait_for_card_present(Some(Duration::ZERO))
        .unwrap();
    assert_eq!(reader.name(), "Mock Reader 1");
    assert!(reader.has_card());
}

#[test]
fn test_insertion_wakes_present_wait() {
    let mock = MockPcsc::new(&["Mock Reader 1", "Mock Reader 2"]);
    let context = establish(&mock);

    let inserter = {
        let mock = mock.clone();
        thread::spawn(move || {
            mock.wait_until_blocked();
            mock.insert_card("Mock Reader 2", &ATR);
        })
    };

    let reader = context
        .wait_for_card_present(Some(Duration::from_secs(10)))
        .unwrap();
    inserter.join().unwrap();

    assert_eq!(reader.name(), "Mock Reader 2");
    assert_eq!(reader.atr().unwrap().to_string(), "3b751300004709ea9000");
}

#[test]
fn test_absent_wait_reports_removal_only() {
    let mock = MockPcsc::new(&["Mock Reader 1", "Mock Reader 2"]);
    mock.insert_card("Mock Reader 2", &ATR);
    let context = establish(&mock);

    let remover = {
        let mock = mock.clone();
        thread::spawn(move || {
            mock.wait_until_blocked();
            mock.remove_card("Mock Reader 2");
        })
    };

    // Mock Reader 1 is empty from the start and must not be reported.
    let reader = context
        .wait_for_card_absent(Some(Duration::from_secs(10)))
        .unwrap();
    remover.join().unwrap();

    assert_eq!(reader.name(), "Mock Reader 2");
    assert!(reader.current_state().card_absent());
}

#[test]
fn test_absent_wait_ignores_already_empty_readers() {
    let mock = MockPcsc::new(&["Mock Reader 1"]);
    let context = establish(&mock);

    let err = context
        .wait_for_card_absent(Some(Duration::from_millis(20)))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Timeout);
}

#[test]
fn test_cancel_from_another_thread() {
    let mock = MockPcsc::new(&["Mock Reader 1"]);
    let context = establish(&mock);
    let canceller = context.canceller().unwrap();

    let cancelling = {
        let mock = mock.clone();
        thread::spawn(move || {
            mock.wait_until_blocked();
            canceller.cancel().unwrap();
        })
    };

    let err = context.wait_for_card_present(None).unwrap_err();
    cancelling.join().unwrap();
    assert_eq!(err.kind(), ErrorKind::Cancelled);
}

#[test]
fn test_cancel_before_native_block_still_unblocks() {
    let mock = MockPcsc::new(&["Mock Reader 1"]);
    let (tx, rx) = mpsc::channel();

    let waiting = {
        let mock = mock.clone();
        thread::spawn(move || {
            let context = establish(&mock);
            let canceller = context.canceller().unwrap();
            // Nothing is blocked yet, so the native cancel is a no-op.
            mock.before_next_block(move || canceller.cancel().unwrap());
            let result = context
                .wait_for_card_present(None)
                .map(|reader| reader.name().to_string())
                .map_err(|err| err.kind());
            tx.send(result).unwrap();
        })
    };

    let result = rx
        .recv_timeout(Duration::from_secs(5))
        .expect("wait did not observe the cancellation");
    waiting.join().unwrap();
    assert_eq!(result, Err(ErrorKind::Cancelled));
}

#[test]
fn test_cancellation_wins_over_timeout() {
    let mock = MockPcsc::new(&["Mock Reader 1"]);
    let context = establish(&mock);
    let canceller = context.canceller().unwrap();

    let cancelling = {
        let mock = mock.clone();
        thread::spawn(move || {
            mock.wait_until_blocked();
            canceller.cancel().unwrap();
        })
    };

    let err = context
        .wait_for_card_present(Some(Duration::from_secs(10)))
        .unwrap_err();
    cancelling.join().unwrap();
    assert_eq!(err.kind(), ErrorKind::Cancelled);
}

#[test]
fn test_pre_signalled_cancellation() {
    let mock = MockPcsc::new(&["Mock Reader 1"]);
    mock.insert_card("Mock Reader 1", &ATR);
    let context = establish(&mock);

    context.canceller().unwrap().cancel().unwrap();
    let err = context.wait_for_card_present(None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Cancelled);

    // Consumed: the next wait sees the card.
    assert!(context.wait_for_card_present(None).is_ok());
}

#[test]
fn test_connect_errors() {
    let mock = MockPcsc::new(&["Mock Reader 1"]);
    let context = establish(&mock);

    let err = context
        .reader("Mock Reader 1")
        .connect(ShareMode::Shared, Protocols::ANY)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NoSmartcard);

    let err = context
        .reader("Nonexistent Reader")
        .connect(ShareMode::Shared, Protocols::ANY)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnknownReader);

    mock.insert_card("Mock Reader 1", &ATR);
    let reader = context.reader("Mock Reader 1");
    let card = reader.connect(ShareMode::Exclusive, Protocols::ANY).unwrap();
    let err = reader
        .connect(ShareMode::Shared, Protocols::ANY)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SharingViolation);

    card.disconnect(Disposition::LeaveCard).unwrap();
    assert!(reader.connect(ShareMode::Shared, Protocols::ANY).is_ok());
}

#[test]
fn test_select_and_card_removal() {
    let mock = MockPcsc::new(&["Mock Reader 1"]);
    mock.insert_card("Mock Reader 1", &ATR);
    let select = CommandApdu::select(&[0xA0, 0x00, 0x00, 0x00, 0x62, 0x03, 0x01, 0x0C, 0x01, 0x01])
        .unwrap();
    mock.add_mock_response(select.as_bytes(), &[0x6F, 0x00, 0x90, 0x00]);
    let context = establish(&mock);

    let card = context
        .reader("Mock Reader 1")
        .connect(ShareMode::Shared, Protocols::ANY)
        .unwrap();
    assert_eq!(card.protocol(), Protocol::T1);
    assert_eq!(card.atr().as_bytes(), &ATR);

    let response = card.transmit_apdu(&select).unwrap();
    assert!(response.is_success());
    assert_eq!(response.data(), &[0x6F, 0x00]);

    let unknown = CommandApdu::new(0x80, 0xCA, 0x00, 0x00, &[], 0x00).unwrap();
    let response = card.transmit_apdu(&unknown).unwrap();
    assert_eq!(response.sw(), 0x6D00);

    mock.remove_card("Mock Reader 1");
    let err = card.transmit_apdu(&select).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::RemovedCard);
}

#[test]
fn test_reconnect_updates_protocol() {
    let mock = MockPcsc::new(&["Mock Reader 1"]);
    mock.insert_card("Mock Reader 1", &ATR);
    let context = establish(&mock);

    let mut card = context
        .reader("Mock Reader 1")
        .connect(ShareMode::Shared, Protocols::ANY)
        .unwrap();
    card.reconnect(ShareMode::Shared, Protocols::T0, Disposition::ResetCard)
        .unwrap();
    assert_eq!(card.protocol(), Protocol::T0);
}

#[test]
fn test_context_released_exactly_once() {
    let mock = MockPcsc::new(&["Mock Reader 1"]);

    establish(&mock).release().unwrap();
    assert_eq!(mock.released(), 1);

    drop(establish(&mock));
    assert_eq!(mock.released(), 2);
}
