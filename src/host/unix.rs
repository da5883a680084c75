/*!
 * Unix Host
 *
 * Host primitives on top of `nix`:
 * - native poll: `poll(2)` over the handles handed to it (sockets only)
 * - pipe probe: `FIONREAD` plus a zero-timeout hang-up check
 * - console probe: terminal line-discipline bytes reported as one text record
 * - socket transfers: `recv`/`recvmsg`/`send`/`sendto`, with `MSG_DONTWAIT`
 *   for asynchronous attempts
 */

use super::translate::{ErrnoTranslator, ErrorTranslator, NativeError};
use super::{
    FileType, Host, InputRecord, IoStatus, PipeStatus, SocketOp, SocketTransport, Transfer,
};
use crate::core::errors::CompatError;
use crate::core::types::{Interest, RawHandle};
use crate::select::{FdSet, SelectSets};
use ahash::AHashMap;
use nix::errno::Errno;
use nix::libc;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use nix::sys::socket::{recv, recvmsg, send, sendto, MsgFlags, SockaddrStorage};
use nix::sys::stat::{fstat, SFlag};
use std::io::IoSliceMut;
use std::os::fd::BorrowedFd;
use std::time::Duration;
use tracing::{debug, trace};

nix::ioctl_read_bad!(fionread, libc::FIONREAD, libc::c_int);

const READ_READY: PollFlags = PollFlags::POLLIN
    .union(PollFlags::POLLHUP)
    .union(PollFlags::POLLERR);
const WRITE_READY: PollFlags = PollFlags::POLLOUT
    .union(PollFlags::POLLHUP)
    .union(PollFlags::POLLERR);

/// Host implementation for unix platforms
#[derive(Debug, Default)]
pub struct UnixHost {
    translator: ErrnoTranslator,
}

impl UnixHost {
    pub fn new() -> Self {
        Self::default()
    }

    fn borrow(handle: RawHandle) -> BorrowedFd<'static> {
        // SAFETY: the caller of every host primitive keeps `handle` open for
        // the duration of the call; a stale handle is reported as POLLNVAL or
        // EBADF by the kernel, never dereferenced.
        unsafe { BorrowedFd::borrow_raw(handle) }
    }

    fn buffered_bytes(handle: RawHandle) -> Result<usize, Errno> {
        let mut count: libc::c_int = 0;
        // SAFETY: FIONREAD writes a single c_int through the pointer.
        unsafe { fionread(handle, &mut count) }?;
        Ok(count.max(0) as usize)
    }

    fn poll_timeout(timeout: Duration) -> PollTimeout {
        let ms = u16::try_from(timeout.as_millis()).unwrap_or(u16::MAX);
        PollTimeout::from(ms)
    }

    fn poll_one(handle: RawHandle, events: PollFlags, timeout: Duration) -> Result<PollFlags, Errno> {
        let mut fds = [PollFd::new(Self::borrow(handle), events)];
        poll(&mut fds, Self::poll_timeout(timeout))?;
        Ok(fds[0].revents().unwrap_or(PollFlags::empty()))
    }
}

impl Host for UnixHost {
    fn file_type(&self, handle: RawHandle) -> FileType {
        let stat = match fstat(handle) {
            Ok(stat) => stat,
            Err(_) => return FileType::Invalid,
        };
        let format = SFlag::from_bits_truncate(stat.st_mode) & SFlag::S_IFMT;
        if format == SFlag::S_IFIFO || format == SFlag::S_IFSOCK {
            FileType::Pipe
        } else if format == SFlag::S_IFCHR {
            FileType::Character
        } else {
            FileType::Other
        }
    }

    fn peek_pipe(&self, handle: RawHandle) -> PipeStatus {
        match Self::buffered_bytes(handle) {
            Ok(0) => {}
            Ok(n) => return PipeStatus::Buffered(n),
            Err(Errno::EPIPE) => return PipeStatus::Broken,
            Err(e) => return PipeStatus::Unavailable(e.into()),
        }

        match Self::poll_one(handle, PollFlags::POLLIN, Duration::ZERO) {
            Ok(revents) if revents.contains(PollFlags::POLLNVAL) => {
                PipeStatus::Unavailable(Errno::EBADF.into())
            }
            Ok(revents) if revents.intersects(PollFlags::POLLHUP | PollFlags::POLLERR) => {
                PipeStatus::Broken
            }
            Ok(_) => PipeStatus::Buffered(0),
            Err(e) => PipeStatus::Unavailable(e.into()),
        }
    }

    fn peek_console(&self, handle: RawHandle) -> Result<Option<InputRecord>, NativeError> {
        if !nix::unistd::isatty(handle).unwrap_or(false) {
            return Err(Errno::ENOTTY.into());
        }
        match Self::buffered_bytes(handle)? {
            0 => Ok(None),
            pending => Ok(Some(InputRecord::Text { pending })),
        }
    }

    fn discard_console_record(&self, handle: RawHandle) -> Result<(), NativeError> {
        let mut byte = [0u8; 1];
        nix::unistd::read(handle, &mut byte)?;
        Ok(())
    }

    fn poll(&self, sets: &mut SelectSets, timeout: Duration) -> Result<usize, NativeError> {
        let mut interest: AHashMap<RawHandle, PollFlags> = AHashMap::new();
        let mut add = |set: &FdSet, flags: PollFlags| {
            for handle in set.iter() {
                *interest.entry(handle).or_insert(PollFlags::empty()) |= flags;
            }
        };
        add(&sets.read, PollFlags::POLLIN);
        add(&sets.write, PollFlags::POLLOUT);
        add(&sets.except, PollFlags::POLLPRI);

        let handles: Vec<(RawHandle, PollFlags)> = interest.into_iter().collect();
        let mut fds: Vec<PollFd<'_>> = handles
            .iter()
            .map(|&(handle, flags)| PollFd::new(Self::borrow(handle), flags))
            .collect();

        poll(&mut fds, Self::poll_timeout(timeout))?;

        let mut revents: AHashMap<RawHandle, PollFlags> = AHashMap::with_capacity(fds.len());
        for (fd, &(handle, _)) in fds.iter().zip(handles.iter()) {
            let flags = fd.revents().unwrap_or(PollFlags::empty());
            if flags.contains(PollFlags::POLLNVAL) {
                debug!(handle, "native poll reported an invalid handle");
                return Err(Errno::EBADF.into());
            }
            revents.insert(handle, flags);
        }

        let ready = |handle: &RawHandle, mask: PollFlags| {
            revents.get(handle).is_some_and(|f| f.intersects(mask))
        };
        sets.read.retain(|h| ready(h, READ_READY));
        sets.write.retain(|h| ready(h, WRITE_READY));
        sets.except.retain(|h| ready(h, PollFlags::POLLPRI));

        trace!(ready = sets.len(), "native poll finished");
        Ok(sets.len())
    }

    fn translate(&self, native: NativeError) -> CompatError {
        self.translator.translate(native)
    }
}

impl SocketTransport for UnixHost {
    fn transfer(
        &self,
        handle: RawHandle,
        op: &mut SocketOp<'_>,
        flags: MsgFlags,
    ) -> Result<Transfer, NativeError> {
        let transfer = match op {
            SocketOp::Recv { buf, want_peer: false } => {
                recv(handle, &mut buf[..], flags).map(Transfer::bytes)
            }
            SocketOp::Recv { buf, want_peer: true } => {
                let mut iov = [IoSliceMut::new(&mut buf[..])];
                recvmsg::<SockaddrStorage>(handle, &mut iov, None, flags).map(|msg| Transfer {
                    bytes: msg.bytes,
                    peer: msg.address,
                })
            }
            SocketOp::Send { buf, to: None } => send(handle, *buf, flags).map(Transfer::bytes),
            SocketOp::Send { buf, to: Some(addr) } => {
                sendto(handle, *buf, *addr, flags).map(Transfer::bytes)
            }
        };
        Ok(transfer?)
    }

    fn start_transfer(
        &self,
        handle: RawHandle,
        op: &mut SocketOp<'_>,
        flags: MsgFlags,
    ) -> Result<IoStatus, NativeError> {
        match self.transfer(handle, op, flags | MsgFlags::MSG_DONTWAIT) {
            Ok(transfer) => Ok(IoStatus::Complete(transfer)),
            Err(native) if native == NativeError::from(Errno::EAGAIN) => Ok(IoStatus::Pending),
            Err(native) => Err(native),
        }
    }

    fn wait_ready(
        &self,
        handle: RawHandle,
        interest: Interest,
        timeout: Duration,
    ) -> Result<bool, NativeError> {
        let (events, mask) = match interest {
            Interest::Read => (PollFlags::POLLIN, READ_READY),
            Interest::Write => (PollFlags::POLLOUT, WRITE_READY),
            Interest::Except => (PollFlags::POLLPRI, PollFlags::POLLPRI),
        };
        match Self::poll_one(handle, events, timeout) {
            Ok(revents) if revents.contains(PollFlags::POLLNVAL) => Err(Errno::EBADF.into()),
            Ok(revents) => Ok(revents.intersects(mask)),
            Err(Errno::EINTR) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn cancel_io(&self, handle: RawHandle) -> Result<(), NativeError> {
        // Nothing is in flight kernel-side between attempts
        debug!(handle, "socket I/O cancelled");
        Ok(())
    }

    fn supports_io_cancel(&self) -> bool {
        true
    }
}
