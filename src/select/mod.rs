/*!
 * Readiness Multiplexing
 *
 * `select(2)` emulation over sockets, pipes, consoles and other handles.
 */

mod fdset;
mod multiplexer;
mod probe;

pub use fdset::{FdSet, SelectSets};
pub use multiplexer::Multiplexer;
pub use probe::ReadinessProbe;
