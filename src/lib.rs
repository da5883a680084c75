/*!
 * POSIX Compatibility Layer
 *
 * Interruptible blocking calls and `select(2)` over mixed descriptor kinds:
 * - readiness multiplexing across sockets, pipes, consoles and other handles
 * - cancellable execution of blocking calls on disposable workers
 * - interruptible socket transfers with native I/O cancel
 */

pub mod core;
pub mod executor;
pub mod host;
pub mod io;
pub mod layer;
pub mod monitoring;
pub mod registry;
pub mod select;

// Re-exports
pub use crate::core::{CompatConfig, CompatError, CompatResult, Event, InterruptSignal, Kind, RawHandle, TimeVal};
pub use executor::{CancelStrategy, CancellableExecutor, Completion, IoCanceller, SocketCanceller};
pub use host::{Host, SocketTransport, UnixHost};
pub use io::{flock, OverlappedIoAdapter, SocketLayer};
pub use layer::CompatLayer;
pub use monitoring::{init_tracing, CompatStats, StatsSnapshot};
pub use registry::{DescriptorClassifier, DescriptorRegistry};
pub use select::{FdSet, Multiplexer, ReadinessProbe, SelectSets};
