//! Resource-manager contexts and card-presence waits.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::core::error::{codes, Error, Result};
use crate::core::native::{ReaderQuery, ResourceManager, Scope};
use crate::core::pcsc::Pcsc;
use crate::core::reader::{Reader, ReaderState};

/// Longest single native status poll during a wait.
pub const POLL_SLICE: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WaitFor {
    Present,
    Absent,
}

/// An established resource-manager context.
///
/// The native handle is released exactly once, either by [`Context::release`]
/// or when the context is dropped. Readers and cards borrow the context, so
/// it cannot be released while they are alive.
pub struct Context<R: ResourceManager = Pcsc> {
    manager: Arc<R>,
    handle: Option<R::Context>,
    cancelled: Arc<AtomicBool>,
}

impl Context<Pcsc> {
    /// Establish a system-scope context with the platform PC/SC service.
    pub fn establish() -> Result<Self> {
        Self::establish_with(Pcsc, Scope::System)
    }
}

impl<R: ResourceManager> Context<R> {
    /// Establish a context with `manager` in the given scope.
    pub fn establish_with(manager: R, scope: Scope) -> Result<Self> {
        let handle = manager
            .establish_context(scope)
            .map_err(Error::context)?;
        log::info!("Established {:?} context", scope);

        Ok(Self {
            manager: Arc::new(manager),
            handle: Some(handle),
            cancelled: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Release the native handle.
    ///
    /// Cancellers taken from this context share the native handle. While any
    /// of them is alive the native release is deferred until the last one is
    /// dropped, and a warning is logged.
    pub fn release(mut self) -> Result<()> {
        match self.handle.take() {
            Some(handle) => {
                let cancellers = self.outstanding_cancellers();
                if cancellers > 0 {
                    log::warn!(
                        "Releasing context with {} outstanding canceller(s), native release deferred",
                        cancellers
                    );
                }
                self.manager.release_context(handle).map_err(Error::context)?;
                log::info!("Released context");
                Ok(())
            }
            None => Ok(()),
        }
    }

    /// Number of live [`Canceller`]s taken from this context.
    pub fn outstanding_cancellers(&self) -> usize {
        Arc::strong_count(&self.cancelled) - 1
    }

    pub(crate) fn manager(&self) -> &R {
        &self.manager
    }

    pub(crate) fn native(&self) -> Result<&R::Context> {
        self.handle
            .as_ref()
            .ok_or_else(|| Error::context(codes::SCARD_E_INVALID_HANDLE))
    }

    /// All attached readers, each primed with a non-blocking status poll.
    pub fn list_readers(&self) -> Result<Vec<Reader<'_, R>>> {
        let native = self.native()?;
        let names = self
            .manager
            .list_readers(native)
            .map_err(Error::from_native)?;
        if names.is_empty() {
            return Ok(Vec::new());
        }

        let mut queries: Vec<ReaderQuery> = names.into_iter().map(ReaderQuery::new).collect();
        match self
            .manager
            .get_status_change(native, Some(Duration::ZERO), &mut queries)
        {
            Ok(()) => {}
            // Nothing reported within the zero timeout: states stay unaware.
            Err(codes::SCARD_E_TIMEOUT) => {}
            Err(code) => return Err(Error::from_native(code)),
        }

        Ok(queries
            .iter()
            .map(|query| Reader::from_query(self, query))
            .collect())
    }

    /// A reader handle with unknown state. Does not poll.
    pub fn reader(&self, name: impl Into<String>) -> Reader<'_, R> {
        Reader::new(self, name)
    }

    /// A handle that interrupts waits on this context from another thread.
    pub fn canceller(&self) -> Result<Canceller<R>> {
        Ok(Canceller {
            manager: Arc::clone(&self.manager),
            handle: self.native()?.clone(),
            cancelled: Arc::clone(&self.cancelled),
        })
    }

    /// Wait until any reader holds a card.
    ///
    /// `None` waits forever; `Some(Duration::ZERO)` checks once. The native
    /// layer is polled in slices of at most [`POLL_SLICE`], so a cancellation
    /// is observed within one slice.
    pub fn wait_for_card_present(&self, timeout: Option<Duration>) -> Result<Reader<'_, R>> {
        self.wait_for(WaitFor::Present, timeout)
    }

    /// Wait until a card is removed from any reader.
    ///
    /// Only readers seen holding a card during this wait are reported, so a
    /// reader that is already empty never satisfies the wait.
    pub fn wait_for_card_absent(&self, timeout: Option<Duration>) -> Result<Reader<'_, R>> {
        self.wait_for(WaitFor::Absent, timeout)
    }

    fn wait_for(&self, target: WaitFor, timeout: Option<Duration>) -> Result<Reader<'_, R>> {
        let native = self.native()?;
        let names = self
            .manager
            .list_readers(native)
            .map_err(Error::from_native)?;
        if names.is_empty() {
            return Err(Error::from_native(codes::SCARD_E_NO_READERS_AVAILABLE));
        }

        let mut queries: Vec<ReaderQuery> = names.into_iter().map(ReaderQuery::new).collect();
        let mut seen_card = vec![false; queries.len()];
        // An unrepresentable deadline is treated as no deadline.
        let deadline = timeout.and_then(|timeout| Instant::now().checked_add(timeout));

        loop {
            if self.cancelled.swap(false, Ordering::SeqCst) {
                return Err(Error::cancelled());
            }

            let remaining = deadline.map(|deadline| deadline.saturating_duration_since(Instant::now()));
            // Never block longer than one slice so a cancel that lands before
            // the native call starts is still observed.
            let slice = remaining.map_or(POLL_SLICE, |remaining| remaining.min(POLL_SLICE));
            log::debug!(
                "Polling {} reader(s) for card {:?}, remaining {:?}",
                queries.len(),
                target,
                remaining
            );

            match self.manager.get_status_change(native, Some(slice), &mut queries) {
                Ok(()) => {}
                Err(codes::SCARD_E_TIMEOUT) => {
                    if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                        if self.cancelled.swap(false, Ordering::SeqCst) {
                            return Err(Error::cancelled());
                        }
                        return Err(Error::timeout());
                    }
                    continue;
                }
                Err(code) => {
                    if self.cancelled.swap(false, Ordering::SeqCst) {
                        return Err(Error::cancelled());
                    }
                    return Err(Error::from_native(code));
                }
            }

            for (query, seen) in queries.iter().zip(seen_card.iter_mut()) {
                let state = query.event_state();
                match target {
                    WaitFor::Present if state.has_card() => {
                        return Ok(Reader::from_query(self, query));
                    }
                    WaitFor::Absent if state.has_card() => *seen = true,
                    WaitFor::Absent if *seen && state.contains(ReaderState::EMPTY) => {
                        return Ok(Reader::from_query(self, query));
                    }
                    _ => {}
                }
            }

            queries.iter_mut().for_each(ReaderQuery::sync_current_state);

            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                if self.cancelled.swap(false, Ordering::SeqCst) {
                    return Err(Error::cancelled());
                }
                return Err(Error::timeout());
            }
        }
    }
}

impl<R: ResourceManager> Drop for Context<R> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            if let Err(code) = self.manager.release_context(handle) {
                log::warn!("Failed to release context: {}", Error::context(code));
            }
        }
    }
}

impl<R: ResourceManager> std::fmt::Debug for Context<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("established", &self.handle.is_some())
            .field("cancelled", &self.cancelled.load(Ordering::SeqCst))
            .finish()
    }
}

/// Interrupts a pending wait on the context it was taken from.
///
/// A cancellation issued while no wait is running is kept and consumed by
/// the next wait.
pub struct Canceller<R: ResourceManager = Pcsc> {
    manager: Arc<R>,
    handle: R::Context,
    cancelled: Arc<AtomicBool>,
}

impl<R: ResourceManager> Canceller<R> {
    pub fn cancel(&self) -> Result<()> {
        self.cancelled.store(true, Ordering::SeqCst);
        log::debug!("Cancelling pending waits");
        self.manager.cancel(&self.handle).map_err(Error::from_native)
    }
}

impl<R: ResourceManager> Clone for Canceller<R> {
    fn clone(&self) -> Self {
        Self {
            manager: Arc::clone(&self.manager),
            handle: self.handle.clone(),
            cancelled: Arc::clone(&self.cancelled),
        }
    }
}

impl<R: ResourceManager> std::fmt::Debug for Canceller<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Canceller")
            .field("cancelled", &self.cancelled.load(Ordering::SeqCst))
            .finish()
    }
}
