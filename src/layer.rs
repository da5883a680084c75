/*!
 * Compatibility Layer
 *
 * Owns the descriptor registry and wires the multiplexer, executor and
 * socket layer to one host.
 */

use crate::core::config::CompatConfig;
use crate::core::errors::CompatResult;
use crate::core::sync::InterruptSignal;
use crate::core::types::{RawHandle, TimeVal};
use crate::executor::{CancelStrategy, CancellableExecutor};
use crate::host::UnixHost;
use crate::io::{self, OverlappedIoAdapter, SocketLayer};
use crate::monitoring::{CompatStats, StatsSnapshot};
use crate::registry::DescriptorRegistry;
use crate::select::{FdSet, Multiplexer};
use std::sync::Arc;
use tracing::info;

/// Facade over every component, sharing one registry and one stats block
pub struct CompatLayer {
    config: CompatConfig,
    registry: Arc<DescriptorRegistry>,
    stats: Arc<CompatStats>,
    executor: Arc<CancellableExecutor>,
    multiplexer: Multiplexer,
    sockets: SocketLayer,
}

impl CompatLayer {
    /// Build the layer on the unix host and open the registry
    pub fn new(config: CompatConfig) -> CompatResult<Self> {
        let host = Arc::new(UnixHost::new());
        let registry = Arc::new(DescriptorRegistry::opened());
        let stats = Arc::new(CompatStats::new());
        let executor = Arc::new(CancellableExecutor::new(config.clone(), stats.clone())?);

        let multiplexer = Multiplexer::new(registry.clone(), host.clone(), &config, stats.clone());
        let adapter = OverlappedIoAdapter::new(registry.clone(), host, executor.clone(), &config);
        let sockets = SocketLayer::new(registry.clone(), adapter);

        info!(
            quantum_ms = config.poll_quantum.as_millis() as u64,
            signal = %config.termination_signal,
            overlapped = config.overlapped_io,
            "compatibility layer ready"
        );
        Ok(Self {
            config,
            registry,
            stats,
            executor,
            multiplexer,
            sockets,
        })
    }

    /// Layer configured from `COMPAT_*` environment variables
    pub fn from_env() -> CompatResult<Self> {
        Self::new(CompatConfig::from_env()?)
    }

    /// Make `select` return EINTR when `interrupt` fires
    pub fn with_select_interrupt(self, interrupt: InterruptSignal) -> Self {
        Self {
            multiplexer: self.multiplexer.with_interrupt(interrupt),
            ..self
        }
    }

    pub fn select(
        &self,
        nfds: i32,
        read: Option<&mut FdSet>,
        write: Option<&mut FdSet>,
        except: Option<&mut FdSet>,
        timeout: Option<&TimeVal>,
    ) -> CompatResult<usize> {
        self.multiplexer.select(nfds, read, write, except, timeout)
    }

    pub fn run_cancellable<T, F>(
        &self,
        op: F,
        interrupt: &InterruptSignal,
        strategy: CancelStrategy,
    ) -> CompatResult<T>
    where
        T: Send + 'static,
        F: FnOnce() -> CompatResult<T> + Send + 'static,
    {
        self.executor.run_cancellable(op, interrupt, strategy)
    }

    pub fn flock(&self, handle: RawHandle, operation: i32, interrupt: &InterruptSignal) -> CompatResult<()> {
        io::flock(&self.executor, handle, operation, interrupt)
    }

    pub fn sockets(&self) -> &SocketLayer {
        &self.sockets
    }

    pub fn multiplexer(&self) -> &Multiplexer {
        &self.multiplexer
    }

    pub fn executor(&self) -> &CancellableExecutor {
        &self.executor
    }

    pub fn registry(&self) -> &Arc<DescriptorRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &CompatConfig {
        &self.config
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Close the registry; sockets stay open but are no longer tracked
    pub fn close(&self) {
        self.registry.close();
    }
}

impl std::fmt::Debug for CompatLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompatLayer")
            .field("config", &self.config)
            .field("sockets", &self.registry.len())
            .finish_non_exhaustive()
    }
}
