/*!
 * Descriptor Registry
 *
 * The authoritative socket table: every handle created or accepted through
 * the socket layer is recorded here together with its blocking-mode flags.
 * Classification trusts this table over any native file-type query.
 */

use crate::core::errors::{CompatError, CompatResult};
use crate::core::types::RawHandle;
use ahash::RandomState;
use dashmap::DashMap;
use nix::fcntl::OFlag;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};

/// Concurrent socket handle → mode table
///
/// # Performance
/// - Sharded map, each operation locks one shard for its own duration only
#[derive(Debug)]
pub struct DescriptorRegistry {
    sockets: DashMap<RawHandle, OFlag, RandomState>,
    open: AtomicBool,
}

impl DescriptorRegistry {
    /// Create a closed registry
    pub fn new() -> Self {
        Self {
            sockets: DashMap::with_hasher(RandomState::new()),
            open: AtomicBool::new(false),
        }
    }

    /// Create and open a registry
    pub fn opened() -> Self {
        let registry = Self::new();
        registry.open();
        registry
    }

    pub fn open(&self) {
        if !self.open.swap(true, Ordering::AcqRel) {
            info!("descriptor registry opened");
        }
    }

    /// Close the registry and forget every socket
    pub fn close(&self) {
        if self.open.swap(false, Ordering::AcqRel) {
            let dropped = self.sockets.len();
            self.sockets.clear();
            info!(dropped, "descriptor registry closed");
        }
    }

    #[inline]
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Record a socket; re-registering a handle replaces its flags
    pub fn register_socket(&self, handle: RawHandle, flags: OFlag) -> CompatResult<()> {
        if !self.is_open() {
            return Err(CompatError::RegistryClosed);
        }
        self.sockets.insert(handle, flags);
        debug!(handle, ?flags, "socket registered");
        Ok(())
    }

    /// Forget a socket; returns its last flags
    pub fn unregister(&self, handle: RawHandle) -> Option<OFlag> {
        let removed = self.sockets.remove(&handle).map(|(_, flags)| flags);
        if removed.is_some() {
            debug!(handle, "socket unregistered");
        }
        removed
    }

    #[inline]
    pub fn is_socket(&self, handle: RawHandle) -> bool {
        self.sockets.contains_key(&handle)
    }

    /// Blocking-mode flags of a registered socket
    pub fn mode(&self, handle: RawHandle) -> Option<OFlag> {
        self.sockets.get(&handle).map(|entry| *entry.value())
    }

    pub fn set_mode(&self, handle: RawHandle, flags: OFlag) -> CompatResult<()> {
        match self.sockets.get_mut(&handle) {
            Some(mut entry) => {
                *entry.value_mut() = flags;
                Ok(())
            }
            None => Err(CompatError::NotSocket(handle)),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.sockets.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.sockets.is_empty()
    }
}

impl Default for DescriptorRegistry {
    fn default() -> Self {
        Self::new()
    }
}
