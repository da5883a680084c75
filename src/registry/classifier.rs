/*!
 * Descriptor Classification
 *
 * Decides how a handle is waited on: through the native poll (sockets) or by
 * manual probing (pipes, consoles, everything else).
 */

use super::DescriptorRegistry;
use crate::core::types::{Interest, Kind, RawHandle, WaitableDescriptor};
use crate::host::{FileType, Host};
use std::sync::Arc;
use tracing::trace;

/// Registry-first handle classifier
#[derive(Clone)]
pub struct DescriptorClassifier {
    registry: Arc<DescriptorRegistry>,
    host: Arc<dyn Host>,
}

impl DescriptorClassifier {
    pub fn new(registry: Arc<DescriptorRegistry>, host: Arc<dyn Host>) -> Self {
        Self { registry, host }
    }

    /// Classify a handle; never fails
    ///
    /// Unregistered sockets come back as [`Kind::Pipe`] since the host reports
    /// them pipe-like.
    pub fn classify(&self, handle: RawHandle) -> Kind {
        let kind = if self.registry.is_socket(handle) {
            Kind::Socket
        } else if self.host.file_type(handle) == FileType::Pipe {
            Kind::Pipe
        } else if self.host.peek_console(handle).is_ok() {
            Kind::Console
        } else {
            Kind::Other
        };
        trace!(handle, ?kind, "classified descriptor");
        kind
    }

    /// Classify `handle` for a wait with the given interest
    pub fn describe(&self, handle: RawHandle, interest: Interest) -> WaitableDescriptor {
        WaitableDescriptor {
            handle,
            kind: self.classify(handle),
            interest,
        }
    }

    pub fn registry(&self) -> &Arc<DescriptorRegistry> {
        &self.registry
    }
}

impl std::fmt::Debug for DescriptorClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DescriptorClassifier")
            .field("sockets", &self.registry.len())
            .finish()
    }
}
