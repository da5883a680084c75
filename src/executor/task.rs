/*!
 * Async Task
 *
 * Shared state between the caller of one cancellable operation and the worker
 * thread running it.
 */

use crate::core::errors::CompatResult;
use crate::core::sync::Event;
use nix::sys::pthread::{pthread_self, Pthread};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Sets the finished event when the worker leaves the operation, including
/// by unwinding
struct FinishGuard<'a>(&'a Event);

impl Drop for FinishGuard<'_> {
    fn drop(&mut self) {
        self.0.set();
    }
}

/// One in-flight cancellable operation
pub(crate) struct AsyncTask<T> {
    id: u64,
    result: Mutex<Option<CompatResult<T>>>,
    stack_marker: AtomicUsize,
    thread: Mutex<Option<Pthread>>,
    started: Event,
    finished: Event,
}

impl<T> AsyncTask<T> {
    pub(crate) fn new(id: u64) -> Self {
        Self {
            id,
            result: Mutex::new(None),
            stack_marker: AtomicUsize::new(0),
            thread: Mutex::new(None),
            started: Event::new(),
            finished: Event::new(),
        }
    }

    /// Worker entry point; stores the result exactly once
    pub(crate) fn run<F>(&self, op: F)
    where
        F: FnOnce() -> CompatResult<T>,
    {
        let _finish = FinishGuard(&self.finished);

        let marker = 0u8;
        self.stack_marker
            .store(std::ptr::addr_of!(marker) as usize, Ordering::Release);
        *self.thread.lock() = Some(pthread_self());
        self.started.set();

        let result = op();
        *self.result.lock() = Some(result);
    }

    #[inline]
    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn started(&self) -> &Event {
        &self.started
    }

    pub(crate) fn finished(&self) -> &Event {
        &self.finished
    }

    #[inline]
    pub(crate) fn is_finished(&self) -> bool {
        self.finished.is_set()
    }

    /// Native thread id, once the worker has started
    pub(crate) fn thread(&self) -> Option<Pthread> {
        *self.thread.lock()
    }

    /// Address near the base of the worker's stack, 0 before start
    pub(crate) fn stack_marker(&self) -> usize {
        self.stack_marker.load(Ordering::Acquire)
    }

    pub(crate) fn take_result(&self) -> Option<CompatResult<T>> {
        self.result.lock().take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::errors::CompatError;

    #[test]
    fn test_run_records_worker_state() {
        let task = AsyncTask::new(1);
        task.run(|| Ok(42));

        assert!(task.started().is_set());
        assert!(task.is_finished());
        assert!(task.thread().is_some());
        assert_ne!(task.stack_marker(), 0);
        assert_eq!(task.take_result(), Some(Ok(42)));
        assert_eq!(task.take_result(), None);
    }

    #[test]
    fn test_finished_set_on_panic() {
        let task = std::sync::Arc::new(AsyncTask::<()>::new(2));
        let worker = {
            let task = task.clone();
            std::thread::spawn(move || task.run(|| panic!("boom")))
        };
        assert!(worker.join().is_err());
        assert!(task.is_finished());
        assert!(task.take_result().is_none());
    }

    #[test]
    fn test_error_result_kept_verbatim() {
        let task = AsyncTask::<u8>::new(3);
        task.run(|| Err(CompatError::Os { errno: 13, native: 5 }));
        assert_eq!(
            task.take_result(),
            Some(Err(CompatError::Os { errno: 13, native: 5 }))
        );
    }
}
