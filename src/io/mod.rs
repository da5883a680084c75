/*!
 * Interruptible I/O
 *
 * Socket transfers, socket lifecycle and advisory locking on top of the
 * executor and the descriptor registry.
 */

mod flock;
mod overlapped;
mod socket;

pub use flock::{flock, lock_arg, LOCK_EX, LOCK_NB, LOCK_SH, LOCK_UN};
pub use overlapped::OverlappedIoAdapter;
pub use socket::SocketLayer;
