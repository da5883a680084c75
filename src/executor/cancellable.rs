/*!
 * Cancellable Blocking Executor
 *
 * Runs one blocking operation on a dedicated worker thread while the caller
 * waits for either the worker or the interrupt signal. Workers are never
 * pooled: an interrupted worker may be abandoned mid-call, so its thread is
 * never handed another operation.
 */

use super::strategy::{CancelStrategy, IoCanceller};
use super::task::AsyncTask;
use super::worker;
use crate::core::config::CompatConfig;
use crate::core::errors::{CompatError, CompatResult};
use crate::core::limits::{DEFAULT_TERMINATION_STATUS, TERMINATION_RESIGNAL_INTERVAL};
use crate::core::sync::{Event, InterruptSignal};
use crate::monitoring::CompatStats;
use nix::sys::signal::Signal;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, instrument, warn};

/// Kernel-side operation already in flight, observed without a worker
pub trait Completion {
    /// Wait up to `timeout`; `Ok(true)` once the operation can complete
    fn wait_for(&self, timeout: Duration) -> CompatResult<bool>;
}

/// Interrupt-or-complete executor
pub struct CancellableExecutor {
    config: CompatConfig,
    signal: Signal,
    stats: Arc<CompatStats>,
}

impl CancellableExecutor {
    /// Create an executor and install the worker wake handler
    pub fn new(config: CompatConfig, stats: Arc<CompatStats>) -> CompatResult<Self> {
        config.validate()?;
        let signal = config.signal()?;
        worker::install_wake_handler(signal)?;
        Ok(Self {
            config,
            signal,
            stats,
        })
    }

    pub fn config(&self) -> &CompatConfig {
        &self.config
    }

    pub fn stats(&self) -> &Arc<CompatStats> {
        &self.stats
    }

    /// Run `op` on a fresh worker, abandoning it if `interrupt` fires first
    ///
    /// Returns the operation's own result verbatim when it completes first,
    /// EINTR otherwise. A panic inside `op` is resumed on the caller.
    #[instrument(level = "debug", skip_all, fields(strategy = ?strategy))]
    pub fn run_cancellable<T, F>(
        &self,
        op: F,
        interrupt: &InterruptSignal,
        strategy: CancelStrategy,
    ) -> CompatResult<T>
    where
        T: Send + 'static,
        F: FnOnce() -> CompatResult<T> + Send + 'static,
    {
        if interrupt.is_pending() {
            self.stats.inc_interrupts();
            debug!("interrupt pending before spawn");
            return Err(CompatError::Interrupted);
        }

        let task = Arc::new(AsyncTask::new(worker::next_id()));
        let handle = {
            let task = task.clone();
            worker::spawn(task.id(), move || task.run(op))
        };
        self.stats.inc_workers_spawned();
        task.started().wait(None);

        let woke = Event::wait_any(&[task.finished(), interrupt.event()], interrupt.remaining());
        if woke == Some(0) {
            return Self::collect(&task, handle);
        }

        debug!(worker = task.id(), "interrupted, cancelling worker");
        match strategy {
            CancelStrategy::GracefulCancel(canceller) => self.cancel_gracefully(&task, handle, &*canceller),
            CancelStrategy::ForcedTerminate { exit_status } => self.terminate(&task, handle, exit_status),
        }
        self.stats.inc_interrupts();
        Err(CompatError::Interrupted)
    }

    /// Wait for an in-flight operation versus the interrupt signal
    ///
    /// On interrupt the canceller runs and EINTR is returned.
    pub fn wait_completion(
        &self,
        completion: &dyn Completion,
        interrupt: &InterruptSignal,
        canceller: &dyn IoCanceller,
    ) -> CompatResult<()> {
        let quantum = self.config.poll_quantum;
        loop {
            if interrupt.is_pending() {
                if let Err(e) = canceller.cancel_io() {
                    warn!(error = %e, "native I/O cancel failed");
                }
                self.stats.inc_graceful_cancels();
                self.stats.inc_interrupts();
                return Err(CompatError::Interrupted);
            }

            let slice = interrupt.remaining().map_or(quantum, |r| r.min(quantum));
            if completion.wait_for(slice)? {
                return Ok(());
            }
        }
    }

    fn collect<T>(task: &AsyncTask<T>, handle: JoinHandle<()>) -> CompatResult<T> {
        if let Err(payload) = handle.join() {
            std::panic::resume_unwind(payload);
        }
        task.take_result().unwrap_or(Err(CompatError::Interrupted))
    }

    fn cancel_gracefully<T>(&self, task: &AsyncTask<T>, handle: JoinHandle<()>, canceller: &dyn IoCanceller) {
        self.stats.inc_graceful_cancels();
        if let Err(e) = canceller.cancel_io() {
            warn!(worker = task.id(), error = %e, "native I/O cancel failed");
        }

        if task.finished().wait(Some(self.config.cancel_grace)) {
            Self::reclaim(task, handle);
            return;
        }
        debug!(worker = task.id(), "cancel grace expired, escalating");
        self.terminate(task, handle, DEFAULT_TERMINATION_STATUS);
    }

    /// Signal the worker out of its blocking call, then join or abandon it
    fn terminate<T>(&self, task: &AsyncTask<T>, handle: JoinHandle<()>, exit_status: u32) {
        self.stats.inc_forced_terminations();
        let deadline = Instant::now() + self.config.termination_grace;

        if let Some(thread) = task.thread() {
            while !task.is_finished() {
                if let Err(e) = worker::interrupt(thread, self.signal) {
                    warn!(worker = task.id(), error = %e, "failed to signal worker");
                    break;
                }
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    break;
                }
                task.finished()
                    .wait(Some(remaining.min(TERMINATION_RESIGNAL_INTERVAL)));
            }
        }

        if task.is_finished() {
            Self::reclaim(task, handle);
            return;
        }

        // The JoinHandle drops here, detaching the thread with its stack.
        warn!(
            worker = task.id(),
            stack = format_args!("{:#x}", task.stack_marker()),
            exit_status,
            "couldn't release stack"
        );
        self.stats.inc_leaked_stacks();
        drop(handle);
    }

    fn reclaim<T>(task: &AsyncTask<T>, handle: JoinHandle<()>) {
        if handle.join().is_err() {
            warn!(worker = task.id(), "cancelled worker panicked");
        }
        debug!(worker = task.id(), "worker stack reclaimed");
    }
}

impl std::fmt::Debug for CancellableExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellableExecutor")
            .field("signal", &self.signal)
            .field("config", &self.config)
            .finish()
    }
}
