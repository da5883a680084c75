/*!
 * Synchronization Primitives
 *
 * - Event: manual-reset event with wait-any
 * - InterruptSignal: the runtime's interrupt/deadline source
 */

mod event;
mod interrupt;

pub use event::Event;
pub use interrupt::InterruptSignal;
