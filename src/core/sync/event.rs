/*!
 * Manual-Reset Events
 *
 * Level-triggered events with a composite "wait for any" operation, the
 * building block for interrupt-or-complete waits.
 *
 * # Design
 *
 * Each wait registers one shared waiter (a parking_lot Mutex/Condvar pair)
 * with every event it watches. Registration and the signaled check happen
 * under the event's own lock, so a `set()` racing with a new waiter is never
 * lost. When several events are signaled the lowest index wins.
 */

use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Default)]
struct Waiter {
    notified: Mutex<bool>,
    condvar: Condvar,
}

impl Waiter {
    fn notify(&self) {
        let mut notified = self.notified.lock();
        *notified = true;
        self.condvar.notify_all();
    }
}

#[derive(Default)]
struct EventState {
    signaled: bool,
    waiters: Vec<Arc<Waiter>>,
}

/// Manual-reset event
///
/// Stays signaled until [`Event::reset`] is called.
#[derive(Default)]
pub struct Event {
    state: Mutex<EventState>,
}

impl Event {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal the event and wake every waiter
    pub fn set(&self) {
        let waiters = {
            let mut state = self.state.lock();
            state.signaled = true;
            state.waiters.clone()
        };
        for waiter in waiters {
            waiter.notify();
        }
    }

    /// Return the event to the non-signaled state
    pub fn reset(&self) {
        self.state.lock().signaled = false;
    }

    #[inline]
    pub fn is_set(&self) -> bool {
        self.state.lock().signaled
    }

    /// Wait for this event alone
    ///
    /// Returns `true` if signaled, `false` on timeout.
    pub fn wait(&self, timeout: Option<Duration>) -> bool {
        Self::wait_any(&[self], timeout).is_some()
    }

    /// Wait until any of `events` is signaled
    ///
    /// Returns the lowest signaled index, or `None` if `timeout` elapsed
    /// first. `None` timeout, or one too large to represent, waits forever.
    pub fn wait_any(events: &[&Event], timeout: Option<Duration>) -> Option<usize> {
        let deadline = timeout.and_then(|t| Instant::now().checked_add(t));
        let waiter = Arc::new(Waiter::default());

        for (index, event) in events.iter().enumerate() {
            let mut state = event.state.lock();
            if state.signaled {
                drop(state);
                Self::unregister(&events[..index], &waiter);
                return Some(index);
            }
            state.waiters.push(Arc::clone(&waiter));
        }

        let result = loop {
            {
                let mut notified = waiter.notified.lock();
                while !*notified {
                    match deadline {
                        Some(deadline) => {
                            if waiter.condvar.wait_until(&mut notified, deadline).timed_out() {
                                break;
                            }
                        }
                        None => waiter.condvar.wait(&mut notified),
                    }
                }
                *notified = false;
            }

            if let Some(index) = events.iter().position(|e| e.is_set()) {
                break Some(index);
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                break None;
            }
            // Woken by an event that was reset again before we looked
        };

        Self::unregister(events, &waiter);
        result
    }

    fn unregister(events: &[&Event], waiter: &Arc<Waiter>) {
        for event in events {
            event
                .state
                .lock()
                .waiters
                .retain(|w| !Arc::ptr_eq(w, waiter));
        }
    }

    #[cfg(test)]
    fn waiter_count(&self) -> usize {
        self.state.lock().waiters.len()
    }
}

impl std::fmt::Debug for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Event").field("signaled", &self.is_set()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_already_signaled_returns_immediately() {
        let a = Event::new();
        let b = Event::new();
        b.set();
        assert_eq!(Event::wait_any(&[&a, &b], Some(Duration::from_secs(5))), Some(1));
        assert_eq!(a.waiter_count(), 0);
    }

    #[test]
    fn test_lowest_index_wins() {
        let a = Event::new();
        let b = Event::new();
        a.set();
        b.set();
        assert_eq!(Event::wait_any(&[&a, &b], None), Some(0));
    }

    #[test]
    fn test_timeout() {
        let a = Event::new();
        let start = Instant::now();
        assert_eq!(Event::wait_any(&[&a], Some(Duration::from_millis(30))), None);
        assert!(start.elapsed() >= Duration::from_millis(30));
        assert_eq!(a.waiter_count(), 0);
    }

    #[test]
    fn test_unrepresentable_timeout_waits_forever() {
        let a = Arc::new(Event::new());
        let setter = Arc::clone(&a);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            setter.set();
        });

        assert_eq!(Event::wait_any(&[&a], Some(Duration::MAX)), Some(0));
        handle.join().unwrap();
    }

    #[test]
    fn test_cross_thread_wake() {
        let a = Arc::new(Event::new());
        let b = Arc::new(Event::new());
        let setter = Arc::clone(&b);

        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            setter.set();
        });

        assert_eq!(Event::wait_any(&[&a, &b], None), Some(1));
        handle.join().unwrap();
        assert_eq!(a.waiter_count(), 0);
        assert_eq!(b.waiter_count(), 0);
    }

    #[test]
    fn test_reset_is_level_triggered() {
        let a = Event::new();
        a.set();
        assert!(a.wait(Some(Duration::ZERO)));
        assert!(a.is_set());
        a.reset();
        assert!(!a.wait(Some(Duration::from_millis(5))));
    }
}
