use std::cell::UnsafeCell;
use std::fmt;
#[cfg(not(loom))]
use std::sync::atomic::AtomicUsize;
#[cfg(not(loom))]
use std::sync::atomic::Ordering::{AcqRel, Acquire, Relaxed, Release};
use std::time::{Duration, Instant};

use crossbeam_utils::{Backoff, CachePadded};
#[cfg(loom)]
use loom::sync::atomic::AtomicUsize;
#[cfg(loom)]
use loom::sync::atomic::Ordering::{AcqRel, Acquire, Relaxed, Release};

const ACTIVE: usize = 0b001;
const READING: usize = 0b010;
const WRITING: usize = 0b100;

/// Double-buffered cell shared between a real-time reader and any number of writers.
///
/// The reader never blocks: [`enter`](Self::enter) either grants exclusive access to the
/// active value or fails immediately. Writers stage the new value in the inactive half and
/// flip halves only while no reader is inside, so the reader always observes either the old
/// or the new value in full.
pub struct CallbackSlot<T> {
    state: CachePadded<AtomicUsize>,
    halves: [UnsafeCell<Option<T>>; 2],
}

unsafe impl<T: Send> Send for CallbackSlot<T> {}
unsafe impl<T: Send> Sync for CallbackSlot<T> {}

impl<T> CallbackSlot<T> {
    pub fn new(value: Option<T>) -> CallbackSlot<T> {
        CallbackSlot {
            state: CachePadded::new(AtomicUsize::new(0)),
            halves: [UnsafeCell::new(value), UnsafeCell::new(None)],
        }
    }

    /// Grants access to the active value, or returns `None` if it's already being read.
    ///
    /// Wait-free with respect to writers apart from retrying when one flips the halves
    /// in between, which happens at most once per exchange.
    pub fn enter(&self) -> Option<SlotGuard<'_, T>> {
        let mut state = self.state.load(Relaxed);

        loop {
            if state & READING != 0 {
                return None;
            }

            match self
                .state
                .compare_exchange(state, state | READING, Acquire, Relaxed)
            {
                Ok(_) => {
                    return Some(SlotGuard {
                        slot: self,
                        index: state & ACTIVE,
                    })
                }
                Err(actual) => state = actual,
            }
        }
    }

    /// Replaces the active value, waiting until `deadline` for the reader to leave.
    ///
    /// Returns the previous value. On timeout the new value is handed back and the active
    /// value stays untouched.
    pub fn exchange(
        &self,
        value: T,
        deadline: Option<Instant>,
    ) -> Result<Option<T>, ExchangeError<T>> {
        let backoff = Backoff::new();

        let mut state = self.state.load(Relaxed);
        loop {
            if state & WRITING == 0 {
                match self
                    .state
                    .compare_exchange(state, state | WRITING, Acquire, Relaxed)
                {
                    Ok(_) => break,
                    Err(actual) => {
                        state = actual;
                        continue;
                    }
                }
            }

            if is_expired(deadline) {
                return Err(ExchangeError::Timeout(value));
            }

            wait(&backoff);
            state = self.state.load(Relaxed);
        }

        // Only writers flip the halves, so the index is stable while WRITING is held.
        let inactive = (state & ACTIVE) ^ ACTIVE;
        unsafe { *self.halves[inactive].get() = Some(value) };

        backoff.reset();
        loop {
            let state = self.state.load(Relaxed);

            if state & READING == 0 {
                if self
                    .state
                    .compare_exchange(state, state ^ ACTIVE, AcqRel, Relaxed)
                    .is_ok()
                {
                    break;
                }

                continue;
            }

            if is_expired(deadline) {
                let value = unsafe { (*self.halves[inactive].get()).take() };
                self.state.fetch_and(!WRITING, Release);

                return match value {
                    Some(value) => Err(ExchangeError::Timeout(value)),
                    None => unreachable!("staged value disappeared"),
                };
            }

            wait(&backoff);
        }

        // The staged half is live now, the other one holds the retired value.
        let previous = unsafe { (*self.halves[inactive ^ ACTIVE].get()).take() };
        self.state.fetch_and(!WRITING, Release);

        Ok(previous)
    }

    pub fn exchange_timeout(
        &self,
        value: T,
        timeout: Duration,
    ) -> Result<Option<T>, ExchangeError<T>> {
        self.exchange(value, Some(Instant::now() + timeout))
    }

    /// Active value, reachable without synchronization through exclusive access.
    pub fn get_mut(&mut self) -> Option<&mut T> {
        let index = self.state.load(Relaxed) & ACTIVE;
        self.halves[index].get_mut().as_mut()
    }

    pub fn into_inner(mut self) -> Option<T> {
        let index = self.state.load(Relaxed) & ACTIVE;
        self.halves[index].get_mut().take()
    }
}

impl<T> Default for CallbackSlot<T> {
    fn default() -> CallbackSlot<T> {
        CallbackSlot::new(None)
    }
}

impl<T> fmt::Debug for CallbackSlot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.load(Relaxed);
        f.debug_struct("CallbackSlot")
            .field("active", &(state & ACTIVE))
            .field("reading", &(state & READING != 0))
            .field("writing", &(state & WRITING != 0))
            .finish_non_exhaustive()
    }
}

fn is_expired(deadline: Option<Instant>) -> bool {
    deadline.is_some_and(|deadline| Instant::now() > deadline)
}

fn wait(backoff: &Backoff) {
    #[cfg(not(loom))]
    {
        if backoff.is_completed() {
            std::thread::sleep(Duration::from_micros(50));
        } else {
            backoff.snooze();
        }
    }

    #[cfg(loom)]
    {
        let _ = backoff;
        loom::thread::yield_now();
    }
}

/// Exclusive access to the active value of a [`CallbackSlot`].
pub struct SlotGuard<'a, T> {
    slot: &'a CallbackSlot<T>,
    index: usize,
}

impl<T> SlotGuard<'_, T> {
    pub fn get(&mut self) -> Option<&mut T> {
        unsafe { (*self.slot.halves[self.index].get()).as_mut() }
    }
}

impl<T> Drop for SlotGuard<'_, T> {
    fn drop(&mut self) {
        self.slot.state.fetch_and(!READING, Release);
    }
}

/// Error returned from [`CallbackSlot::exchange()`].
#[derive(Clone, Copy, Eq, PartialEq, thiserror::Error)]
pub enum ExchangeError<T> {
    /// The reader didn't leave in time. Holds the value that was meant to be installed.
    #[error("timed out waiting for the audio thread")]
    Timeout(T),
}

impl<T> ExchangeError<T> {
    pub fn into_inner(self) -> T {
        match self {
            ExchangeError::Timeout(value) => value,
        }
    }
}

impl<T> fmt::Debug for ExchangeError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExchangeError::Timeout(_) => f.write_str("Timeout(..)"),
        }
    }
}

#[cfg(test)]
mod tests {
    #[cfg(not(loom))]
    use std::sync::Arc;
    #[cfg(not(loom))]
    use std::thread;

    #[cfg(loom)]
    use loom::sync::Arc;
    #[cfg(loom)]
    use loom::thread;

    use super::*;

    #[test]
    #[cfg(not(loom))]
    fn test_seq() {
        let slot = CallbackSlot::new(Some(1));

        assert_eq!(slot.enter().unwrap().get().copied(), Some(1));
        assert_eq!(slot.exchange(2, None), Ok(Some(1)));
        assert_eq!(slot.enter().unwrap().get().copied(), Some(2));
        assert_eq!(slot.exchange(3, None), Ok(Some(2)));
        assert_eq!(slot.into_inner(), Some(3));
    }

    #[test]
    #[cfg(not(loom))]
    fn test_empty() {
        let mut slot = CallbackSlot::<i32>::default();
        assert!(slot.enter().unwrap().get().is_none());
        assert_eq!(slot.get_mut(), None);
        assert_eq!(slot.exchange(5, None), Ok(None));
        assert_eq!(slot.get_mut(), Some(&mut 5));
    }

    #[test]
    #[cfg(not(loom))]
    fn test_reentry_is_refused() {
        let slot = CallbackSlot::new(Some(1));
        let guard = slot.enter();
        assert!(guard.is_some());
        assert!(slot.enter().is_none());
        drop(guard);
        assert!(slot.enter().is_some());
    }

    #[test]
    #[cfg(not(loom))]
    fn test_timeout_keeps_active() {
        let slot = CallbackSlot::new(Some(1));

        let mut guard = slot.enter().unwrap();
        let res = slot.exchange_timeout(2, Duration::from_millis(10));
        assert_eq!(res, Err(ExchangeError::Timeout(2)));
        assert_eq!(guard.get().copied(), Some(1));
        drop(guard);

        assert_eq!(slot.enter().unwrap().get().copied(), Some(1));
        assert_eq!(slot.exchange(3, None), Ok(Some(1)));
    }

    #[test]
    #[cfg(not(loom))]
    fn test_exchange_keeps_new_value() {
        let mut slot = CallbackSlot::new(Some(String::from("old")));

        let previous = slot.exchange(String::from("new"), None);
        assert_eq!(previous, Ok(Some(String::from("old"))));
        assert_eq!(slot.get_mut().map(|s| s.as_str()), Some("new"));

        let previous = slot.exchange(String::from("newer"), None);
        assert_eq!(previous, Ok(Some(String::from("new"))));
        assert_eq!(slot.enter().unwrap().get().map(|s| s.as_str()), Some("newer"));
        assert_eq!(slot.into_inner().as_deref(), Some("newer"));
    }

    fn concurrent(rounds: usize) {
        let slot = Arc::new(CallbackSlot::new(Some(0usize)));

        let reader = {
            let slot = slot.clone();
            thread::spawn(move || {
                let mut last = 0;
                for _ in 0..rounds {
                    if let Some(mut guard) = slot.enter() {
                        let value = *guard.get().unwrap();
                        assert!(value >= last);
                        last = value;
                    }
                    thread::yield_now();
                }
            })
        };

        for i in 1..=rounds {
            assert_eq!(slot.exchange(i, None), Ok(Some(i - 1)));
        }

        reader.join().unwrap();
        assert_eq!(slot.enter().unwrap().get().copied(), Some(rounds));
    }

    #[test]
    #[cfg(not(loom))]
    fn test_concurrent() {
        concurrent(1000);
    }

    #[test]
    #[cfg(loom)]
    fn test_concurrent() {
        loom::model(|| concurrent(2));
    }
}
