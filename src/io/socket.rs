/*!
 * Socket Layer
 *
 * Socket creation and transfer entry points. Every socket created or
 * accepted here is recorded in the descriptor registry, which is what makes
 * it visible to the multiplexer's native poll and to the overlapped adapter.
 */

use super::overlapped::OverlappedIoAdapter;
use crate::core::errors::{CompatError, CompatResult};
use crate::core::sync::InterruptSignal;
use crate::core::types::RawHandle;
use crate::host::SocketOp;
use crate::registry::DescriptorRegistry;
use nix::errno::Errno;
use nix::fcntl::{fcntl, FcntlArg, OFlag};
use nix::sys::socket::{
    self, AddressFamily, MsgFlags, SockFlag, SockType, SockaddrLike, SockaddrStorage,
};
use std::os::fd::{BorrowedFd, IntoRawFd, OwnedFd};
use std::sync::Arc;
use tracing::{debug, warn};

/// Registry flags for a socket created with `flags`
fn initial_mode(flags: SockFlag) -> OFlag {
    if flags.contains(SockFlag::SOCK_NONBLOCK) {
        OFlag::O_NONBLOCK
    } else {
        OFlag::empty()
    }
}

/// Socket entry points over the registry and the overlapped adapter
pub struct SocketLayer {
    registry: Arc<DescriptorRegistry>,
    adapter: OverlappedIoAdapter,
}

impl SocketLayer {
    pub fn new(registry: Arc<DescriptorRegistry>, adapter: OverlappedIoAdapter) -> Self {
        Self { registry, adapter }
    }

    fn register(&self, fd: OwnedFd, mode: OFlag) -> CompatResult<RawHandle> {
        use std::os::fd::AsRawFd;
        // on failure `fd` drops and closes the socket
        self.registry.register_socket(fd.as_raw_fd(), mode)?;
        Ok(fd.into_raw_fd())
    }

    fn require_socket(&self, handle: RawHandle) -> CompatResult<()> {
        if self.registry.is_socket(handle) {
            Ok(())
        } else {
            Err(CompatError::NotSocket(handle))
        }
    }

    /// Create and register a socket
    pub fn socket(&self, domain: AddressFamily, ty: SockType, flags: SockFlag) -> CompatResult<RawHandle> {
        let fd = socket::socket(domain, ty, flags, None)?;
        let handle = self.register(fd, initial_mode(flags))?;
        debug!(handle, ?domain, ?ty, "socket created");
        Ok(handle)
    }

    /// Create and register a connected pair
    pub fn socketpair(
        &self,
        domain: AddressFamily,
        ty: SockType,
        flags: SockFlag,
    ) -> CompatResult<(RawHandle, RawHandle)> {
        let (a, b) = socket::socketpair(domain, ty, None, flags)?;
        let mode = initial_mode(flags);
        let a = self.register(a, mode)?;
        match self.register(b, mode) {
            Ok(b) => Ok((a, b)),
            Err(e) => {
                self.close(a)?;
                Err(e)
            }
        }
    }

    /// Accept a connection and register the new socket
    pub fn accept(&self, handle: RawHandle) -> CompatResult<RawHandle> {
        self.require_socket(handle)?;
        let accepted = socket::accept(handle)?;
        if let Err(e) = self.registry.register_socket(accepted, OFlag::empty()) {
            if let Err(close_err) = nix::unistd::close(accepted) {
                warn!(handle = accepted, error = %close_err, "failed to close unregistered socket");
            }
            return Err(e);
        }
        debug!(listener = handle, handle = accepted, "connection accepted");
        Ok(accepted)
    }

    /// Connect; a connection still being established is `InProgress`
    pub fn connect(&self, handle: RawHandle, addr: &dyn SockaddrLike) -> CompatResult<()> {
        self.require_socket(handle)?;
        match socket::connect(handle, addr) {
            Ok(()) => Ok(()),
            Err(Errno::EAGAIN) | Err(Errno::EINPROGRESS) => Err(CompatError::InProgress),
            Err(e) => Err(e.into()),
        }
    }

    /// `fcntl(F_SETFL, O_NONBLOCK)` for sockets
    ///
    /// The registry is only updated once the host accepted the new mode.
    pub fn set_nonblocking(&self, handle: RawHandle, nonblocking: bool) -> CompatResult<()> {
        if !self.registry.is_socket(handle) {
            return Err(CompatError::BadDescriptor(handle));
        }
        let mut mode = OFlag::from_bits_truncate(fcntl(handle, FcntlArg::F_GETFL)?);
        mode.set(OFlag::O_NONBLOCK, nonblocking);
        fcntl(handle, FcntlArg::F_SETFL(mode))?;
        self.registry.set_mode(handle, mode & OFlag::O_NONBLOCK)?;
        debug!(handle, nonblocking, "socket mode changed");
        Ok(())
    }

    /// Unregister, then close
    pub fn close(&self, handle: RawHandle) -> CompatResult<()> {
        self.registry.unregister(handle);
        nix::unistd::close(handle)?;
        Ok(())
    }

    pub fn recv(
        &self,
        handle: RawHandle,
        buf: &mut [u8],
        flags: MsgFlags,
        interrupt: &InterruptSignal,
    ) -> CompatResult<usize> {
        let mut op = SocketOp::Recv { buf, want_peer: false };
        Ok(self.adapter.perform_io(handle, &mut op, flags, interrupt)?.bytes)
    }

    pub fn recvfrom(
        &self,
        handle: RawHandle,
        buf: &mut [u8],
        flags: MsgFlags,
        interrupt: &InterruptSignal,
    ) -> CompatResult<(usize, Option<SockaddrStorage>)> {
        let mut op = SocketOp::Recv { buf, want_peer: true };
        let transfer = self.adapter.perform_io(handle, &mut op, flags, interrupt)?;
        Ok((transfer.bytes, transfer.peer))
    }

    pub fn send(
        &self,
        handle: RawHandle,
        buf: &[u8],
        flags: MsgFlags,
        interrupt: &InterruptSignal,
    ) -> CompatResult<usize> {
        let mut op = SocketOp::Send { buf, to: None };
        Ok(self.adapter.perform_io(handle, &mut op, flags, interrupt)?.bytes)
    }

    pub fn sendto(
        &self,
        handle: RawHandle,
        buf: &[u8],
        to: &SockaddrStorage,
        flags: MsgFlags,
        interrupt: &InterruptSignal,
    ) -> CompatResult<usize> {
        let mut op = SocketOp::Send { buf, to: Some(to) };
        Ok(self.adapter.perform_io(handle, &mut op, flags, interrupt)?.bytes)
    }

    /// `read(2)`; sockets go through the adapter
    pub fn read(&self, handle: RawHandle, buf: &mut [u8], interrupt: &InterruptSignal) -> CompatResult<usize> {
        if self.registry.is_socket(handle) {
            return self.recv(handle, buf, MsgFlags::empty(), interrupt);
        }
        Ok(nix::unistd::read(handle, buf)?)
    }

    /// `write(2)`; sockets go through the adapter
    pub fn write(&self, handle: RawHandle, buf: &[u8], interrupt: &InterruptSignal) -> CompatResult<usize> {
        if self.registry.is_socket(handle) {
            return self.send(handle, buf, MsgFlags::empty(), interrupt);
        }
        // SAFETY: the caller owns `handle` for the duration of the call.
        let fd = unsafe { BorrowedFd::borrow_raw(handle) };
        Ok(nix::unistd::write(fd, buf)?)
    }

    pub fn registry(&self) -> &Arc<DescriptorRegistry> {
        &self.registry
    }
}

impl std::fmt::Debug for SocketLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocketLayer")
            .field("sockets", &self.registry.len())
            .field("adapter", &self.adapter)
            .finish()
    }
}
