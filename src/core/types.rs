/*!
 * Core Types
 * Common types used across the compatibility layer
 */

use super::errors::{CompatError, CompatResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Native handle value (a file descriptor on unix hosts)
pub type RawHandle = i32;

/// Descriptor kind as seen by the readiness multiplexer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Kind {
    /// Registered socket, handled by the native poll primitive
    Socket,
    /// Named or anonymous pipe, probed manually
    Pipe,
    /// Interactive console input, probed manually
    Console,
    /// Anything else; treated as always ready
    Other,
}

/// Interest a descriptor was registered with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Interest {
    Read,
    Write,
    Except,
}

/// One handle under test during a multiplexing call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitableDescriptor {
    pub handle: RawHandle,
    pub kind: Kind,
    pub interest: Interest,
}

/// POSIX `struct timeval`
///
/// Fields are signed so negative caller input can be rejected with EINVAL
/// instead of wrapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TimeVal {
    pub sec: i64,
    pub usec: i64,
}

impl TimeVal {
    pub const fn new(sec: i64, usec: i64) -> Self {
        Self { sec, usec }
    }

    pub fn from_millis(ms: u64) -> Self {
        Self {
            sec: (ms / 1000) as i64,
            usec: ((ms % 1000) * 1000) as i64,
        }
    }

    /// Convert to a duration, rejecting negative components
    ///
    /// Out-of-range values saturate at [`Duration::MAX`].
    pub fn to_duration(&self) -> CompatResult<Duration> {
        if self.sec < 0 || self.usec < 0 {
            return Err(CompatError::invalid(format!(
                "negative timeout component (sec={}, usec={})",
                self.sec, self.usec
            )));
        }
        Ok(Duration::from_secs(self.sec as u64).saturating_add(Duration::from_micros(self.usec as u64)))
    }
}

impl From<Duration> for TimeVal {
    fn from(d: Duration) -> Self {
        Self {
            sec: d.as_secs() as i64,
            usec: d.subsec_micros() as i64,
        }
    }
}
