/*!
 * Cancellable Blocking Execution
 *
 * Interruptible wrappers for blocking calls the host cannot cancel itself.
 */

mod cancellable;
mod strategy;
mod task;
mod worker;

pub use cancellable::{CancellableExecutor, Completion};
pub use strategy::{CancelStrategy, IoCanceller, SocketCanceller};
