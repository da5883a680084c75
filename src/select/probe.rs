/*!
 * Readiness Probes
 *
 * Manual readiness checks for descriptors the native poll cannot watch.
 */

use crate::core::limits::MAX_CONSOLE_DRAIN;
use crate::core::types::RawHandle;
use crate::host::{Host, PipeStatus};
use std::sync::Arc;
use tracing::trace;

/// Pipe and console input probes
#[derive(Clone)]
pub struct ReadinessProbe {
    host: Arc<dyn Host>,
}

impl ReadinessProbe {
    pub fn new(host: Arc<dyn Host>) -> Self {
        Self { host }
    }

    /// Whether a read on the pipe would not block
    ///
    /// A broken pipe counts as ready: the read observes end-of-stream.
    pub fn pipe_has_input(&self, handle: RawHandle) -> bool {
        match self.host.peek_pipe(handle) {
            PipeStatus::Buffered(n) => n > 0,
            PipeStatus::Broken => true,
            PipeStatus::Unavailable(native) => {
                trace!(handle, %native, "pipe probe failed");
                false
            }
        }
    }

    /// Whether the console holds a record a read would return
    ///
    /// Non-input records (key releases, mouse, focus, resize) ahead of the
    /// first input record are consumed.
    pub fn console_has_input(&self, handle: RawHandle) -> bool {
        for _ in 0..MAX_CONSOLE_DRAIN {
            let record = match self.host.peek_console(handle) {
                Ok(Some(record)) => record,
                Ok(None) | Err(_) => return false,
            };
            if record.is_printable() {
                return true;
            }
            trace!(handle, ?record, "discarding console noise");
            if self.host.discard_console_record(handle).is_err() {
                return false;
            }
        }
        false
    }
}

impl std::fmt::Debug for ReadinessProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadinessProbe").finish_non_exhaustive()
    }
}
