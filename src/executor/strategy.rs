/*!
 * Cancellation Strategies
 *
 * How an interrupted operation is stopped: cancel its native I/O and let it
 * return, or interrupt its worker thread and abandon it.
 */

use crate::core::errors::CompatResult;
use crate::core::limits::DEFAULT_TERMINATION_STATUS;
use crate::core::types::RawHandle;
use crate::host::SocketTransport;
use std::sync::Arc;

/// Native I/O cancel facility
pub trait IoCanceller: Send + Sync {
    fn cancel_io(&self) -> CompatResult<()>;
}

impl<F> IoCanceller for F
where
    F: Fn() -> CompatResult<()> + Send + Sync,
{
    fn cancel_io(&self) -> CompatResult<()> {
        self()
    }
}

/// Cancels outstanding I/O on one socket
pub struct SocketCanceller {
    transport: Arc<dyn SocketTransport>,
    handle: RawHandle,
}

impl SocketCanceller {
    pub fn new(transport: Arc<dyn SocketTransport>, handle: RawHandle) -> Self {
        Self { transport, handle }
    }
}

impl IoCanceller for SocketCanceller {
    fn cancel_io(&self) -> CompatResult<()> {
        self.transport
            .cancel_io(self.handle)
            .map_err(|native| self.transport.translate(native))
    }
}

/// What to do with an operation when the interrupt fires first
#[derive(Clone)]
pub enum CancelStrategy {
    /// Cancel native I/O and give the worker `cancel_grace` to return,
    /// escalating to [`CancelStrategy::ForcedTerminate`] if it does not
    GracefulCancel(Arc<dyn IoCanceller>),
    /// Interrupt the worker thread and abandon it
    ForcedTerminate { exit_status: u32 },
}

impl CancelStrategy {
    pub fn graceful(canceller: impl IoCanceller + 'static) -> Self {
        Self::GracefulCancel(Arc::new(canceller))
    }

    pub fn forced() -> Self {
        Self::ForcedTerminate {
            exit_status: DEFAULT_TERMINATION_STATUS,
        }
    }
}

impl Default for CancelStrategy {
    fn default() -> Self {
        Self::forced()
    }
}

impl std::fmt::Debug for CancelStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::GracefulCancel(_) => f.write_str("GracefulCancel"),
            Self::ForcedTerminate { exit_status } => f
                .debug_struct("ForcedTerminate")
                .field("exit_status", exit_status)
                .finish(),
        }
    }
}
