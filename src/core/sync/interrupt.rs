/*!
 * Interrupt Signal
 *
 * The runtime's pending-interrupt source. An interrupt is pending when it was
 * raised explicitly (a signal is waiting to be handled) or when its deadline
 * has passed; both cases are treated the same by every blocking primitive.
 */

use super::event::Event;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

struct Inner {
    event: Event,
    deadline: Mutex<Option<Instant>>,
}

/// Cloneable handle to one interrupt source
#[derive(Clone)]
pub struct InterruptSignal {
    inner: Arc<Inner>,
}

impl InterruptSignal {
    /// Interrupt source with no deadline
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                event: Event::new(),
                deadline: Mutex::new(None),
            }),
        }
    }

    /// Interrupt source that fires on its own after `timeout`
    ///
    /// A timeout past the clock's range never fires.
    pub fn with_timeout(timeout: Duration) -> Self {
        let signal = Self::new();
        signal.set_deadline(Instant::now().checked_add(timeout));
        signal
    }

    /// Mark an interrupt as pending and wake every waiter
    pub fn raise(&self) {
        self.inner.event.set();
    }

    /// Acknowledge a pending interrupt
    pub fn clear(&self) {
        self.inner.event.reset();
    }

    pub fn set_deadline(&self, deadline: Option<Instant>) {
        *self.inner.deadline.lock() = deadline;
    }

    pub fn deadline(&self) -> Option<Instant> {
        *self.inner.deadline.lock()
    }

    /// Time left until the deadline fires; `None` without a deadline
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline()
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    #[inline]
    pub fn is_raised(&self) -> bool {
        self.inner.event.is_set()
    }

    /// Raised, or deadline reached
    pub fn is_pending(&self) -> bool {
        self.is_raised() || self.remaining().is_some_and(|r| r.is_zero())
    }

    /// Event half of the signal, for composite waits
    ///
    /// Callers must treat a composite-wait timeout at [`InterruptSignal::remaining`]
    /// as an interrupt.
    pub fn event(&self) -> &Event {
        &self.inner.event
    }

    /// Sleep for `duration` unless interrupted first
    ///
    /// Returns `true` if the sleep ended because an interrupt became pending.
    pub fn sleep(&self, duration: Duration) -> bool {
        let bounded = match self.remaining() {
            Some(remaining) => duration.min(remaining),
            None => duration,
        };
        if self.inner.event.wait(Some(bounded)) {
            return true;
        }
        self.is_pending()
    }
}

impl Default for InterruptSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InterruptSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterruptSignal")
            .field("raised", &self.is_raised())
            .field("deadline", &self.deadline())
            .finish()
    }
}
