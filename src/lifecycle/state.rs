use super::types::ProcessState;
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::debug;

/// Shared owner of the process state.
///
/// Every read and write goes through one mutex. The watch channel only
/// republishes accepted transitions for async observers and is written
/// while the mutex is held, so observers never see an order that differs
/// from the lock order.
pub struct StateCell {
    current: Mutex<ProcessState>,
    publisher: watch::Sender<ProcessState>,
}

impl StateCell {
    pub fn new() -> Self {
        let (publisher, _) = watch::channel(ProcessState::Starting);
        Self {
            current: Mutex::new(ProcessState::Starting),
            publisher,
        }
    }

    pub fn get(&self) -> ProcessState {
        *self.current.lock()
    }

    /// Move to `next` if it ranks after the current state.
    /// Returns the state that was replaced, or `None` when the move was refused.
    pub fn advance(&self, next: ProcessState) -> Option<ProcessState> {
        let mut current = self.current.lock();
        let previous = *current;
        if !previous.can_advance_to(next) {
            debug!("Refused state change {} -> {}", previous, next);
            return None;
        }
        *current = next;
        self.publisher.send_replace(next);
        debug!("Process state changed {} -> {}", previous, next);
        Some(previous)
    }

    /// Move from exactly `from` to `next`
    pub fn transition(&self, from: ProcessState, next: ProcessState) -> bool {
        let mut current = self.current.lock();
        if *current != from || !from.can_advance_to(next) {
            return false;
        }
        *current = next;
        self.publisher.send_replace(next);
        debug!("Process state changed {} -> {}", from, next);
        true
    }

    /// Run `f` while holding the state lock, passing the current state.
    /// Callers use this to make decisions that must not interleave with a transition.
    pub fn with_state<R>(&self, f: impl FnOnce(ProcessState) -> R) -> R {
        let current = self.current.lock();
        f(*current)
    }

    /// Run `f` and apply the transition it returns under one lock acquisition
    pub fn update<R>(&self, f: impl FnOnce(ProcessState) -> (Option<ProcessState>, R)) -> R {
        let mut current = self.current.lock();
        let previous = *current;
        let (next, result) = f(previous);
        if let Some(next) = next {
            if previous.can_advance_to(next) {
                *current = next;
                self.publisher.send_replace(next);
                debug!("Process state changed {} -> {}", previous, next);
            }
        }
        result
    }

    pub fn subscribe(&self) -> watch::Receiver<ProcessState> {
        self.publisher.subscribe()
    }
}

impl Default for StateCell {
    fn default() -> Self {
        Self::new()
    }
}
