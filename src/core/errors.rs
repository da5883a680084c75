/*!
 * Error Types
 * POSIX-shaped error handling with thiserror, miette, and serde support
 */

use super::types::RawHandle;
use miette::Diagnostic;
use nix::errno::Errno;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result alias used across the compatibility layer
pub type CompatResult<T> = Result<T, CompatError>;

/// Errors surfaced by the compatibility layer
///
/// Every variant carries a POSIX errno (see [`CompatError::errno`]). Native
/// platform codes never escape a component boundary untranslated: they are
/// folded into one of these variants by an [`ErrorTranslator`](crate::host::ErrorTranslator).
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Diagnostic)]
#[serde(tag = "error_type", content = "details", rename_all = "snake_case")]
pub enum CompatError {
    #[error("Invalid argument: {0}")]
    #[diagnostic(
        code(compat::invalid_argument),
        help("Descriptor counts and timeout components must be non-negative.")
    )]
    InvalidArgument(String),

    #[error("Operation interrupted")]
    #[diagnostic(
        code(compat::interrupted),
        help("A pending signal or an expired deadline aborted the blocking call. Retry if appropriate.")
    )]
    Interrupted,

    #[error("Operation would block")]
    #[diagnostic(code(compat::would_block))]
    WouldBlock,

    #[error("Operation in progress")]
    #[diagnostic(
        code(compat::in_progress),
        help("Wait for writability on the socket to learn the connection result.")
    )]
    InProgress,

    #[error("Out of memory: {0}")]
    #[diagnostic(code(compat::out_of_memory))]
    OutOfMemory(String),

    #[error("Bad descriptor {0}")]
    #[diagnostic(code(compat::bad_descriptor))]
    BadDescriptor(RawHandle),

    #[error("Descriptor {0} is not a registered socket")]
    #[diagnostic(
        code(compat::not_socket),
        help("Sockets must be created or accepted through the socket layer to be registered.")
    )]
    NotSocket(RawHandle),

    #[error("Descriptor registry is not open")]
    #[diagnostic(
        code(compat::registry_closed),
        help("Call DescriptorRegistry::open() before registering sockets.")
    )]
    RegistryClosed,

    #[error("OS error {errno} (native code {native})")]
    #[diagnostic(code(compat::os_error))]
    Os { errno: i32, native: i32 },
}

impl CompatError {
    /// Classify an already-translated POSIX errno
    pub fn from_errno(errno: i32) -> Self {
        Self::from_translated(errno, errno)
    }

    /// Classify a POSIX errno while remembering the native code it came from
    pub fn from_translated(errno: i32, native: i32) -> Self {
        match Errno::from_raw(errno) {
            Errno::EINTR => Self::Interrupted,
            // EWOULDBLOCK aliases EAGAIN on every supported host
            Errno::EAGAIN => Self::WouldBlock,
            Errno::EINPROGRESS => Self::InProgress,
            Errno::ENOMEM => Self::OutOfMemory(format!("native code {}", native)),
            _ => Self::Os { errno, native },
        }
    }

    /// Create an invalid argument error
    #[inline]
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// POSIX errno for this error
    pub fn errno(&self) -> i32 {
        match self {
            Self::InvalidArgument(_) | Self::RegistryClosed => Errno::EINVAL as i32,
            Self::Interrupted => Errno::EINTR as i32,
            Self::WouldBlock => Errno::EWOULDBLOCK as i32,
            Self::InProgress => Errno::EINPROGRESS as i32,
            Self::OutOfMemory(_) => Errno::ENOMEM as i32,
            Self::BadDescriptor(_) => Errno::EBADF as i32,
            Self::NotSocket(_) => Errno::ENOTSOCK as i32,
            Self::Os { errno, .. } => *errno,
        }
    }

    /// Check whether this error reports an interrupted call
    #[inline]
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Self::Interrupted)
    }
}

impl From<Errno> for CompatError {
    fn from(errno: Errno) -> Self {
        Self::from_errno(errno as i32)
    }
}

impl From<std::collections::TryReserveError> for CompatError {
    fn from(err: std::collections::TryReserveError) -> Self {
        Self::OutOfMemory(err.to_string())
    }
}

/// Raise a fatal diagnostic and terminate the process
///
/// Reserved for conditions with no safe degraded behaviour.
#[cold]
pub fn fatal(message: &str) -> ! {
    tracing::error!(message, "fatal compatibility-layer failure");
    eprintln!("[FATAL] {}", message);
    std::process::abort()
}
