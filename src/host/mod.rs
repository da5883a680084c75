/*!
 * Host Platform Seams
 *
 * Every platform primitive the multiplexer and the socket adapter need is
 * reached through the traits in this module:
 *
 * - [`Host`]: file-type query, pipe/console probes, the native poll primitive
 *   and error translation
 * - [`SocketTransport`]: synchronous and asynchronous socket transfers, the
 *   socket readiness wait and native I/O cancel
 *
 * [`UnixHost`] implements both on top of `nix`.
 */

mod translate;
mod unix;

pub use translate::{ErrnoTranslator, ErrorTranslator, NativeError, TableTranslator};
pub use unix::UnixHost;

use crate::core::errors::CompatError;
use crate::core::types::{Interest, RawHandle};
use crate::select::SelectSets;
use nix::sys::socket::{MsgFlags, SockaddrStorage};
use std::time::Duration;

/// Native file type of a handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    /// Named or anonymous pipe (also reported for unregistered sockets)
    Pipe,
    /// Character device
    Character,
    /// Disk file, directory, or anything the host does not classify
    Other,
    /// Not an open handle
    Invalid,
}

/// Outcome of peeking a pipe without consuming
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipeStatus {
    /// Bytes currently buffered (may be zero)
    Buffered(usize),
    /// The writer side is gone; a read would observe end-of-stream
    Broken,
    /// The peek itself failed
    Unavailable(NativeError),
}

/// One buffered console input record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputRecord {
    /// Keyboard event; `unit` is the translated character, 0 for none
    Key { key_down: bool, unit: u16 },
    /// Line-discipline bytes waiting on a terminal
    Text { pending: usize },
    Mouse,
    WindowResize { columns: u16, rows: u16 },
    Focus { gained: bool },
    Menu,
}

impl InputRecord {
    /// Whether a read would return this record as input
    pub fn is_printable(&self) -> bool {
        match self {
            InputRecord::Key { key_down, unit } => *key_down && *unit != 0,
            InputRecord::Text { pending } => *pending > 0,
            _ => false,
        }
    }
}

/// Platform primitives used by classification and multiplexing
#[cfg_attr(test, mockall::automock)]
pub trait Host: Send + Sync {
    /// Native file type; never fails
    fn file_type(&self, handle: RawHandle) -> FileType;

    /// Buffered byte count of a pipe without consuming
    fn peek_pipe(&self, handle: RawHandle) -> PipeStatus;

    /// Next console input record without consuming
    ///
    /// Errors when the handle is not a console.
    fn peek_console(&self, handle: RawHandle) -> Result<Option<InputRecord>, NativeError>;

    /// Consume and drop the next console input record
    fn discard_console_record(&self, handle: RawHandle) -> Result<(), NativeError>;

    /// Native readiness poll over socket handles
    ///
    /// On success every set keeps only its ready members and the total
    /// membership is returned.
    fn poll(&self, sets: &mut SelectSets, timeout: Duration) -> Result<usize, NativeError>;

    /// Translate a native error into a POSIX classification
    fn translate(&self, native: NativeError) -> CompatError;
}

/// Result of one socket transfer
#[derive(Debug, Clone, Copy)]
pub struct Transfer {
    pub bytes: usize,
    /// Sender address, only for receives that asked for it
    pub peer: Option<SockaddrStorage>,
}

impl Transfer {
    pub fn bytes(bytes: usize) -> Self {
        Self { bytes, peer: None }
    }
}

/// Outcome of an asynchronous transfer attempt
#[derive(Debug, Clone, Copy)]
pub enum IoStatus {
    Complete(Transfer),
    /// Accepted but not finished; wait for readiness and re-issue
    Pending,
}

/// One socket send or receive
#[derive(Debug)]
pub enum SocketOp<'a> {
    Recv { buf: &'a mut [u8], want_peer: bool },
    Send { buf: &'a [u8], to: Option<&'a SockaddrStorage> },
}

impl SocketOp<'_> {
    #[inline]
    pub fn is_read(&self) -> bool {
        matches!(self, SocketOp::Recv { .. })
    }

    pub fn interest(&self) -> Interest {
        if self.is_read() {
            Interest::Read
        } else {
            Interest::Write
        }
    }

    pub fn len(&self) -> usize {
        match self {
            SocketOp::Recv { buf, .. } => buf.len(),
            SocketOp::Send { buf, .. } => buf.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Socket I/O primitives used by the overlapped adapter
pub trait SocketTransport: Host {
    /// Synchronous transfer; blocks according to the socket's own mode
    fn transfer(
        &self,
        handle: RawHandle,
        op: &mut SocketOp<'_>,
        flags: MsgFlags,
    ) -> Result<Transfer, NativeError>;

    /// Asynchronous transfer attempt; never blocks
    fn start_transfer(
        &self,
        handle: RawHandle,
        op: &mut SocketOp<'_>,
        flags: MsgFlags,
    ) -> Result<IoStatus, NativeError>;

    /// Wait up to `timeout` for the socket to become ready for `interest`
    fn wait_ready(
        &self,
        handle: RawHandle,
        interest: Interest,
        timeout: Duration,
    ) -> Result<bool, NativeError>;

    /// Cancel outstanding native I/O on the handle
    fn cancel_io(&self, handle: RawHandle) -> Result<(), NativeError>;

    /// Whether [`SocketTransport::cancel_io`] is backed by the host
    fn supports_io_cancel(&self) -> bool;
}
