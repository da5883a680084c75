/*!
 * Overlapped Socket I/O
 *
 * Interruptible socket transfers. Blocking-mode sockets are driven through
 * asynchronous attempts: a pending attempt waits for readiness versus the
 * interrupt signal, and the interrupt cancels native I/O on the socket rather
 * than abandoning a worker thread.
 */

use crate::core::config::CompatConfig;
use crate::core::errors::{CompatError, CompatResult};
use crate::core::sync::InterruptSignal;
use crate::core::types::{Interest, RawHandle};
use crate::executor::{CancellableExecutor, Completion, SocketCanceller};
use crate::host::{IoStatus, SocketOp, SocketTransport, Transfer};
use crate::monitoring::CompatStats;
use crate::registry::DescriptorRegistry;
use nix::fcntl::OFlag;
use nix::sys::socket::MsgFlags;
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;

/// Readiness of a socket whose transfer reported "pending"
struct PendingSocketIo<'a> {
    transport: &'a dyn SocketTransport,
    handle: RawHandle,
    interest: Interest,
}

impl Completion for PendingSocketIo<'_> {
    fn wait_for(&self, timeout: Duration) -> CompatResult<bool> {
        self.transport
            .wait_ready(self.handle, self.interest, timeout)
            .map_err(|native| self.transport.translate(native))
    }
}

/// Socket transfer adapter
pub struct OverlappedIoAdapter {
    registry: Arc<DescriptorRegistry>,
    transport: Arc<dyn SocketTransport>,
    executor: Arc<CancellableExecutor>,
    overlapped: bool,
    stats: Arc<CompatStats>,
}

impl OverlappedIoAdapter {
    pub fn new(
        registry: Arc<DescriptorRegistry>,
        transport: Arc<dyn SocketTransport>,
        executor: Arc<CancellableExecutor>,
        config: &CompatConfig,
    ) -> Self {
        Self {
            registry,
            transport,
            stats: executor.stats().clone(),
            executor,
            overlapped: config.overlapped_io,
        }
    }

    /// Perform one send or receive on a registered socket
    ///
    /// Non-blocking sockets, and hosts without native I/O cancel, take the
    /// synchronous path. Everything else is interruptible.
    pub fn perform_io(
        &self,
        handle: RawHandle,
        op: &mut SocketOp<'_>,
        flags: MsgFlags,
        interrupt: &InterruptSignal,
    ) -> CompatResult<Transfer> {
        let mode = self
            .registry
            .mode(handle)
            .ok_or(CompatError::NotSocket(handle))?;

        if mode.contains(OFlag::O_NONBLOCK) || !self.overlapped || !self.transport.supports_io_cancel() {
            trace!(handle, ?mode, "synchronous socket transfer");
            return self
                .transport
                .transfer(handle, op, flags)
                .map_err(|native| self.transport.translate(native));
        }

        let interest = op.interest();
        loop {
            match self
                .transport
                .start_transfer(handle, op, flags)
                .map_err(|native| self.transport.translate(native))?
            {
                IoStatus::Complete(transfer) => return Ok(transfer),
                IoStatus::Pending => {
                    self.stats.inc_overlapped_pending();
                    trace!(handle, ?interest, "socket transfer pending");
                    let pending = PendingSocketIo {
                        transport: &*self.transport,
                        handle,
                        interest,
                    };
                    let canceller = SocketCanceller::new(self.transport.clone(), handle);
                    self.executor.wait_completion(&pending, interrupt, &canceller)?;
                }
            }
        }
    }
}

impl std::fmt::Debug for OverlappedIoAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OverlappedIoAdapter")
            .field("overlapped", &self.overlapped)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{FileType, Host, InputRecord, NativeError, PipeStatus};
    use crate::select::SelectSets;
    use nix::errno::Errno;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use std::collections::VecDeque;

    /// Scripted transport: replays start_transfer outcomes in order
    #[derive(Default)]
    struct ScriptedTransport {
        attempts: Mutex<VecDeque<Result<IoStatus, NativeError>>>,
        sync_calls: Mutex<usize>,
        cancels: Mutex<usize>,
        ready: bool,
        cancel_supported: bool,
    }

    impl Host for ScriptedTransport {
        fn file_type(&self, _: RawHandle) -> FileType {
            FileType::Other
        }
        fn peek_pipe(&self, _: RawHandle) -> PipeStatus {
            PipeStatus::Buffered(0)
        }
        fn peek_console(&self, _: RawHandle) -> Result<Option<InputRecord>, NativeError> {
            Err(NativeError(Errno::ENOTTY as i32))
        }
        fn discard_console_record(&self, _: RawHandle) -> Result<(), NativeError> {
            Ok(())
        }
        fn poll(&self, sets: &mut SelectSets, _: Duration) -> Result<usize, NativeError> {
            Ok(sets.len())
        }
        fn translate(&self, native: NativeError) -> CompatError {
            CompatError::from_errno(native.code())
        }
    }

    impl SocketTransport for ScriptedTransport {
        fn transfer(&self, _: RawHandle, op: &mut SocketOp<'_>, _: MsgFlags) -> Result<Transfer, NativeError> {
            *self.sync_calls.lock() += 1;
            Ok(Transfer::bytes(op.len()))
        }
        fn start_transfer(&self, _: RawHandle, _: &mut SocketOp<'_>, _: MsgFlags) -> Result<IoStatus, NativeError> {
            self.attempts
                .lock()
                .pop_front()
                .unwrap_or(Ok(IoStatus::Pending))
        }
        fn wait_ready(&self, _: RawHandle, _: Interest, timeout: Duration) -> Result<bool, NativeError> {
            if !self.ready {
                std::thread::sleep(timeout);
            }
            Ok(self.ready)
        }
        fn cancel_io(&self, _: RawHandle) -> Result<(), NativeError> {
            *self.cancels.lock() += 1;
            Ok(())
        }
        fn supports_io_cancel(&self) -> bool {
            self.cancel_supported
        }
    }

    const SOCK: RawHandle = 11;

    fn adapter(transport: Arc<ScriptedTransport>, mode: OFlag) -> OverlappedIoAdapter {
        let registry = Arc::new(DescriptorRegistry::opened());
        registry.register_socket(SOCK, mode).unwrap();
        let config = CompatConfig::low_latency();
        let executor = Arc::new(CancellableExecutor::new(config.clone(), Arc::new(CompatStats::new())).unwrap());
        OverlappedIoAdapter::new(registry, transport, executor, &config)
    }

    #[test]
    fn test_unregistered_handle_is_not_socket() {
        let adapter = adapter(Arc::new(ScriptedTransport::default()), OFlag::empty());
        let mut buf = [0u8; 4];
        let mut op = SocketOp::Recv { buf: &mut buf, want_peer: false };
        assert_eq!(
            adapter.perform_io(99, &mut op, MsgFlags::empty(), &InterruptSignal::new()).unwrap_err(),
            CompatError::NotSocket(99)
        );
    }

    #[test]
    fn test_nonblocking_socket_uses_sync_path() {
        let transport = Arc::new(ScriptedTransport {
            cancel_supported: true,
            ..Default::default()
        });
        let adapter = adapter(transport.clone(), OFlag::O_NONBLOCK);
        let mut op = SocketOp::Send { buf: b"hello", to: None };

        let transfer = adapter
            .perform_io(SOCK, &mut op, MsgFlags::empty(), &InterruptSignal::new())
            .unwrap();
        assert_eq!(transfer.bytes, 5);
        assert_eq!(*transport.sync_calls.lock(), 1);
    }

    #[test]
    fn test_no_cancel_support_uses_sync_path() {
        let transport = Arc::new(ScriptedTransport::default());
        let adapter = adapter(transport.clone(), OFlag::empty());
        let mut op = SocketOp::Send { buf: b"abc", to: None };

        adapter
            .perform_io(SOCK, &mut op, MsgFlags::empty(), &InterruptSignal::new())
            .unwrap();
        assert_eq!(*transport.sync_calls.lock(), 1);
    }

    #[test]
    fn test_pending_then_complete() {
        let transport = Arc::new(ScriptedTransport {
            attempts: Mutex::new(VecDeque::from([
                Ok(IoStatus::Pending),
                Ok(IoStatus::Complete(Transfer::bytes(3))),
            ])),
            ready: true,
            cancel_supported: true,
            ..Default::default()
        });
        let adapter = adapter(transport.clone(), OFlag::empty());
        let mut buf = [0u8; 8];
        let mut op = SocketOp::Recv { buf: &mut buf, want_peer: false };

        let transfer = adapter
            .perform_io(SOCK, &mut op, MsgFlags::empty(), &InterruptSignal::new())
            .unwrap();
        assert_eq!(transfer.bytes, 3);
        assert_eq!(*transport.sync_calls.lock(), 0);
        assert_eq!(adapter.stats.snapshot().overlapped_pending, 1);
    }

    #[test]
    fn test_interrupt_cancels_native_io() {
        let transport = Arc::new(ScriptedTransport {
            cancel_supported: true,
            ..Default::default()
        });
        let adapter = adapter(transport.clone(), OFlag::empty());
        let mut buf = [0u8; 8];
        let mut op = SocketOp::Recv { buf: &mut buf, want_peer: false };
        let interrupt = InterruptSignal::with_timeout(Duration::from_millis(20));

        let err = adapter
            .perform_io(SOCK, &mut op, MsgFlags::empty(), &interrupt)
            .unwrap_err();
        assert_eq!(err, CompatError::Interrupted);
        assert_eq!(*transport.cancels.lock(), 1);
    }

    #[test]
    fn test_native_error_translated() {
        let transport = Arc::new(ScriptedTransport {
            attempts: Mutex::new(VecDeque::from([Err(NativeError(Errno::ECONNRESET as i32))])),
            cancel_supported: true,
            ..Default::default()
        });
        let adapter = adapter(transport, OFlag::empty());
        let mut op = SocketOp::Send { buf: b"x", to: None };

        let err = adapter
            .perform_io(SOCK, &mut op, MsgFlags::empty(), &InterruptSignal::new())
            .unwrap_err();
        assert_eq!(err.errno(), Errno::ECONNRESET as i32);
    }
}
