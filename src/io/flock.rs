/*!
 * Advisory Locking
 *
 * `flock(2)` on a disposable worker, so a lock wait can be interrupted.
 */

use crate::core::errors::{CompatError, CompatResult};
use crate::core::limits::DEFAULT_TERMINATION_STATUS;
use crate::core::sync::InterruptSignal;
use crate::core::types::RawHandle;
use crate::executor::{CancelStrategy, CancellableExecutor};
use nix::fcntl::FlockArg;
use tracing::debug;

pub const LOCK_SH: i32 = 1;
pub const LOCK_EX: i32 = 2;
pub const LOCK_NB: i32 = 4;
pub const LOCK_UN: i32 = 8;

/// Decode `LOCK_*` bits
pub fn lock_arg(operation: i32) -> CompatResult<FlockArg> {
    let nonblocking = operation & LOCK_NB != 0;
    let arg = match (operation & !LOCK_NB, nonblocking) {
        (LOCK_SH, false) => FlockArg::LockShared,
        (LOCK_SH, true) => FlockArg::LockSharedNonblock,
        (LOCK_EX, false) => FlockArg::LockExclusive,
        (LOCK_EX, true) => FlockArg::LockExclusiveNonblock,
        // Unlocking never blocks
        (LOCK_UN, _) => FlockArg::Unlock,
        _ => {
            return Err(CompatError::invalid(format!(
                "unknown flock operation {:#x}",
                operation
            )))
        }
    };
    Ok(arg)
}

/// Apply or remove an advisory lock, interruptibly
///
/// A lock held by someone else with `LOCK_NB` set fails with EWOULDBLOCK.
/// An interrupted wait abandons the worker; the caller keeps ownership of
/// `handle` and must keep it open until the call returns.
pub fn flock(
    executor: &CancellableExecutor,
    handle: RawHandle,
    operation: i32,
    interrupt: &InterruptSignal,
) -> CompatResult<()> {
    let arg = lock_arg(operation)?;
    debug!(handle, ?arg, "flock");
    executor.run_cancellable(
        move || {
            #[allow(deprecated)]
            nix::fcntl::flock(handle, arg)?;
            Ok(())
        },
        interrupt,
        CancelStrategy::ForcedTerminate {
            exit_status: DEFAULT_TERMINATION_STATUS,
        },
    )
}
