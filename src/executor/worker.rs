/*!
 * Worker Threads
 *
 * Spawning of disposable workers and the signal used to knock them out of a
 * blocking system call. The wake handler is installed without `SA_RESTART`,
 * so a signalled worker's blocking call fails with EINTR instead of resuming.
 */

use crate::core::errors::{fatal, CompatResult};
use crate::core::limits::WORKER_THREAD_PREFIX;
use nix::errno::Errno;
use nix::libc;
use nix::sys::pthread::{pthread_kill, Pthread};
use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use tracing::{debug, trace};

static NEXT_WORKER: AtomicU64 = AtomicU64::new(1);
static INSTALLED: Mutex<Vec<Signal>> = parking_lot::const_mutex(Vec::new());

extern "C" fn wake(_: libc::c_int) {}

/// Install the no-op wake handler for `signal`, once per process
pub(crate) fn install_wake_handler(signal: Signal) -> CompatResult<()> {
    let mut installed = INSTALLED.lock();
    if installed.contains(&signal) {
        return Ok(());
    }

    let action = SigAction::new(SigHandler::Handler(wake), SaFlags::empty(), SigSet::empty());
    // SAFETY: the handler touches no state, so it is async-signal-safe.
    unsafe { sigaction(signal, &action) }?;

    installed.push(signal);
    debug!(?signal, "installed worker wake handler");
    Ok(())
}

/// Next worker id
pub(crate) fn next_id() -> u64 {
    NEXT_WORKER.fetch_add(1, Ordering::Relaxed)
}

/// Spawn a named worker thread; failure to spawn aborts the process
pub(crate) fn spawn<F>(id: u64, body: F) -> JoinHandle<()>
where
    F: FnOnce() + Send + 'static,
{
    let name = format!("{}-{}", WORKER_THREAD_PREFIX, id);
    match thread::Builder::new().name(name.clone()).spawn(body) {
        Ok(handle) => {
            trace!(worker = %name, "worker spawned");
            handle
        }
        Err(e) => fatal(&format!("failed to spawn {}: {}", name, e)),
    }
}

/// Deliver `signal` to a worker; a worker that already exited is not an error
pub(crate) fn interrupt(thread: Pthread, signal: Signal) -> CompatResult<()> {
    match pthread_kill(thread, signal) {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(e) => Err(e.into()),
    }
}
