/*!
 * Readiness Multiplexer
 *
 * `select(2)` over mixed descriptor kinds. Registered sockets go to the
 * host's native poll; pipes and consoles are probed by hand; anything else
 * is assumed ready. The native poll is only ever issued with a zero timeout,
 * alternating with quantum sleeps, so manual readiness is never stuck behind
 * a blocking native wait.
 */

use super::fdset::{FdSet, SelectSets};
use super::probe::ReadinessProbe;
use crate::core::config::CompatConfig;
use crate::core::errors::{CompatError, CompatResult};
use crate::core::limits::INDEFINITE_SLEEP_SLICE;
use crate::core::sync::InterruptSignal;
use crate::core::types::{Interest, Kind, TimeVal};
use crate::host::Host;
use crate::monitoring::CompatStats;
use crate::registry::{DescriptorClassifier, DescriptorRegistry};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, instrument, trace};

/// Serializes native polls process-wide
static SELECT_LOCK: Mutex<()> = parking_lot::const_mutex(());

/// Manual subsets extracted from the caller's sets for one call
#[derive(Debug)]
struct PollCycle {
    /// Ready, or assumed ready, read members
    other_read: FdSet,
    pipe_read: FdSet,
    console_read: FdSet,
    /// Non-socket write members; always ready
    other_write: FdSet,
}

impl PollCycle {
    /// Move every non-socket member out of `sets`
    ///
    /// Non-socket exception members are dropped.
    fn partition(classifier: &DescriptorClassifier, sets: &mut SelectSets) -> CompatResult<Self> {
        let mut cycle = Self {
            other_read: FdSet::try_with_capacity()?,
            pipe_read: FdSet::try_with_capacity()?,
            console_read: FdSet::try_with_capacity()?,
            other_write: FdSet::try_with_capacity()?,
        };
        let registry = classifier.registry();

        let mut manual = FdSet::try_with_capacity()?;
        sets.read.extract_into(&mut manual, |h| !registry.is_socket(h));
        for desc in manual.iter().map(|h| classifier.describe(h, Interest::Read)) {
            match desc.kind {
                Kind::Pipe => cycle.pipe_read.insert(desc.handle),
                Kind::Console => cycle.console_read.insert(desc.handle),
                _ => cycle.other_read.insert(desc.handle),
            };
        }

        sets.write
            .extract_into(&mut cycle.other_write, |h| !registry.is_socket(h));
        sets.except.retain(|h| registry.is_socket(*h));

        Ok(cycle)
    }

    /// Promote pipes and consoles that have input to `other_read`
    fn probe(&mut self, probe: &ReadinessProbe) {
        self.pipe_read
            .extract_into(&mut self.other_read, |h| probe.pipe_has_input(h));
        self.console_read
            .extract_into(&mut self.other_read, |h| probe.console_has_input(h));
    }

    #[inline]
    fn any_ready(&self) -> bool {
        !self.other_read.is_empty() || !self.other_write.is_empty()
    }

    fn merge_into(&mut self, sets: &mut SelectSets) {
        self.other_read.drain_into(&mut sets.read);
        self.other_write.drain_into(&mut sets.write);
    }
}

/// Readiness multiplexer over the descriptor registry
pub struct Multiplexer {
    classifier: DescriptorClassifier,
    probe: ReadinessProbe,
    host: Arc<dyn Host>,
    quantum: Duration,
    interrupt: Option<InterruptSignal>,
    stats: Arc<CompatStats>,
}

impl Multiplexer {
    pub fn new(
        registry: Arc<DescriptorRegistry>,
        host: Arc<dyn Host>,
        config: &CompatConfig,
        stats: Arc<CompatStats>,
    ) -> Self {
        Self {
            classifier: DescriptorClassifier::new(registry, host.clone()),
            probe: ReadinessProbe::new(host.clone()),
            host,
            quantum: config.poll_quantum,
            interrupt: None,
            stats,
        }
    }

    /// Let quantum sleeps end early with EINTR when `interrupt` fires
    pub fn with_interrupt(mut self, interrupt: InterruptSignal) -> Self {
        self.interrupt = Some(interrupt);
        self
    }

    pub fn quantum(&self) -> Duration {
        self.quantum
    }

    /// POSIX `select`
    ///
    /// Absent sets behave as empty ones. On success every present set holds
    /// only its ready members and the total membership is returned. On
    /// timeout all sets are emptied and 0 is returned. `timeout = None`
    /// waits forever.
    #[instrument(level = "debug", skip_all, fields(nfds = nfds))]
    pub fn select(
        &self,
        nfds: i32,
        mut read: Option<&mut FdSet>,
        mut write: Option<&mut FdSet>,
        mut except: Option<&mut FdSet>,
        timeout: Option<&TimeVal>,
    ) -> CompatResult<usize> {
        if nfds < 0 {
            return Err(CompatError::invalid(format!("negative descriptor count {}", nfds)));
        }
        let timeout = timeout.map(TimeVal::to_duration).transpose()?;
        self.stats.inc_select_calls();

        let mut sets = SelectSets::new(
            read.as_deref_mut().map(std::mem::take).unwrap_or_default(),
            write.as_deref_mut().map(std::mem::take).unwrap_or_default(),
            except.as_deref_mut().map(std::mem::take).unwrap_or_default(),
        );

        let result = self.select_sets(nfds as usize, &mut sets, timeout);

        let SelectSets {
            read: ready_read,
            write: ready_write,
            except: ready_except,
        } = sets;
        if let Some(set) = read {
            *set = ready_read;
        }
        if let Some(set) = write {
            *set = ready_write;
        }
        if let Some(set) = except {
            *set = ready_except;
        }
        result
    }

    /// `select` over an owned triple
    pub fn select_sets(
        &self,
        nfds: usize,
        sets: &mut SelectSets,
        timeout: Option<Duration>,
    ) -> CompatResult<usize> {
        if sets.is_empty() {
            return self.sleep_only(timeout);
        }

        let started = Instant::now();
        let deadline = timeout.and_then(|t| started.checked_add(t));
        let mut cycle = PollCycle::partition(&self.classifier, sets)?;
        let nfds = nfds.min(sets.max_len());
        trace!(nfds, ?cycle, "partitioned select sets");

        loop {
            cycle.probe(&self.probe);

            if cycle.any_ready() {
                self.native_poll(nfds, sets)?;
                cycle.merge_into(sets);
                debug!(ready = sets.len(), "manual descriptors ready");
                return Ok(sets.len());
            }

            let snapshot = sets.clone();
            let ready = self.native_poll(nfds, sets)?;
            if ready > 0 {
                debug!(ready, elapsed_ms = started.elapsed().as_millis() as u64, "sockets ready");
                return Ok(ready);
            }
            *sets = snapshot;

            let nap = match deadline {
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        sets.clear();
                        self.stats.inc_select_timeouts();
                        debug!(elapsed_ms = started.elapsed().as_millis() as u64, "select timed out");
                        return Ok(0);
                    }
                    remaining.min(self.quantum)
                }
                None => self.quantum,
            };
            self.nap(nap)?;
        }
    }

    /// Zero-timeout native poll; a zero count skips the host call
    fn native_poll(&self, nfds: usize, sets: &mut SelectSets) -> CompatResult<usize> {
        if nfds == 0 {
            sets.clear();
            return Ok(0);
        }
        let _guard = SELECT_LOCK.lock();
        self.host
            .poll(sets, Duration::ZERO)
            .map_err(|native| self.host.translate(native))
    }

    fn sleep_only(&self, timeout: Option<Duration>) -> CompatResult<usize> {
        match timeout {
            Some(duration) => {
                self.nap(duration)?;
                self.stats.inc_select_timeouts();
                Ok(0)
            }
            None => loop {
                self.nap(INDEFINITE_SLEEP_SLICE)?;
            },
        }
    }

    fn nap(&self, duration: Duration) -> CompatResult<()> {
        match &self.interrupt {
            Some(interrupt) => {
                if interrupt.sleep(duration) {
                    self.stats.inc_interrupts();
                    debug!("select interrupted");
                    return Err(CompatError::Interrupted);
                }
                Ok(())
            }
            None => {
                std::thread::sleep(duration);
                Ok(())
            }
        }
    }
}

impl std::fmt::Debug for Multiplexer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Multiplexer")
            .field("quantum", &self.quantum)
            .field("interrupt", &self.interrupt)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{FileType, MockHost, NativeError, PipeStatus};
    use nix::errno::Errno;
    use nix::fcntl::OFlag;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const PIPE: i32 = 3;
    const OTHER: i32 = 4;
    const SOCKET: i32 = 5;

    fn host() -> MockHost {
        let mut host = MockHost::new();
        host.expect_file_type().returning(|h| match h {
            PIPE => FileType::Pipe,
            OTHER => FileType::Other,
            _ => FileType::Invalid,
        });
        host.expect_peek_console().returning(|_| Err(NativeError(Errno::ENOTTY as i32)));
        host.expect_translate()
            .returning(|native| CompatError::from_errno(native.code()));
        host
    }

    fn multiplexer(host: MockHost) -> (Multiplexer, Arc<CompatStats>) {
        let registry = Arc::new(DescriptorRegistry::opened());
        registry.register_socket(SOCKET, OFlag::empty()).unwrap();
        let stats = Arc::new(CompatStats::new());
        let config = CompatConfig::low_latency();
        (
            Multiplexer::new(registry, Arc::new(host), &config, stats.clone()),
            stats,
        )
    }

    #[test]
    fn test_other_descriptor_is_immediately_ready() {
        let mut host = host();
        host.expect_poll().never();
        let (mux, _) = multiplexer(host);

        let mut read = FdSet::from_handles([OTHER]);
        let started = Instant::now();
        let ready = mux
            .select(1, Some(&mut read), None, None, Some(&TimeVal::new(10, 0)))
            .unwrap();

        assert_eq!(ready, 1);
        assert_eq!(read.as_slice(), &[OTHER]);
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_manual_ready_merges_native_result() {
        let mut host = host();
        host.expect_poll().times(1).returning(|sets, timeout| {
            assert_eq!(timeout, Duration::ZERO);
            Ok(sets.len())
        });
        let (mux, _) = multiplexer(host);

        let mut read = FdSet::from_handles([OTHER]);
        let mut write = FdSet::from_handles([SOCKET, OTHER]);
        let ready = mux
            .select(2, Some(&mut read), Some(&mut write), None, None)
            .unwrap();

        assert_eq!(ready, 3);
        assert_eq!(read.as_slice(), &[OTHER]);
        assert!(write.contains(SOCKET) && write.contains(OTHER));
    }

    #[test]
    fn test_idle_pipe_times_out_with_empty_sets() {
        let mut host = host();
        host.expect_peek_pipe().return_const(PipeStatus::Buffered(0));
        let (mux, stats) = multiplexer(host);

        let mut read = FdSet::from_handles([PIPE]);
        let mut except = FdSet::from_handles([PIPE]);
        let started = Instant::now();
        let ready = mux
            .select(1, Some(&mut read), None, Some(&mut except), Some(&TimeVal::from_millis(30)))
            .unwrap();

        assert_eq!(ready, 0);
        assert!(read.is_empty());
        assert!(except.is_empty());
        assert!(started.elapsed() >= Duration::from_millis(30));
        assert_eq!(stats.snapshot().select_timeouts, 1);
    }

    #[test]
    fn test_pipe_becomes_ready_mid_wait() {
        let mut host = host();
        let probes = AtomicUsize::new(0);
        host.expect_peek_pipe().returning(move |_| {
            if probes.fetch_add(1, Ordering::SeqCst) < 3 {
                PipeStatus::Buffered(0)
            } else {
                PipeStatus::Broken
            }
        });
        let (mux, _) = multiplexer(host);

        let mut read = FdSet::from_handles([PIPE]);
        let ready = mux
            .select(1, Some(&mut read), None, None, Some(&TimeVal::new(5, 0)))
            .unwrap();

        assert_eq!(ready, 1);
        assert_eq!(read.as_slice(), &[PIPE]);
    }

    #[test]
    fn test_native_error_aborts_wait() {
        let mut host = host();
        host.expect_poll()
            .returning(|_, _| Err(NativeError(Errno::EBADF as i32)));
        let (mux, _) = multiplexer(host);

        let mut read = FdSet::from_handles([SOCKET]);
        let err = mux
            .select(1, Some(&mut read), None, None, Some(&TimeVal::from_millis(100)))
            .unwrap_err();
        assert_eq!(err.errno(), Errno::EBADF as i32);
    }

    #[test]
    fn test_spurious_empty_poll_restores_sets() {
        let mut host = host();
        let polls = AtomicUsize::new(0);
        host.expect_poll().returning(move |sets, _| {
            if polls.fetch_add(1, Ordering::SeqCst) == 0 {
                sets.clear();
                return Ok(0);
            }
            assert!(sets.read.contains(SOCKET));
            Ok(sets.len())
        });
        let (mux, _) = multiplexer(host);

        let mut read = FdSet::from_handles([SOCKET]);
        let ready = mux.select(1, Some(&mut read), None, None, None).unwrap();
        assert_eq!(ready, 1);
        assert_eq!(read.as_slice(), &[SOCKET]);
    }

    #[test]
    fn test_zero_descriptors_sleeps() {
        let mut host = host();
        host.expect_poll().never();
        let (mux, _) = multiplexer(host);

        let started = Instant::now();
        let ready = mux
            .select(0, None, None, None, Some(&TimeVal::from_millis(20)))
            .unwrap();
        assert_eq!(ready, 0);
        assert!(started.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_interrupt_ends_wait() {
        let mut host = host();
        host.expect_peek_pipe().return_const(PipeStatus::Buffered(0));
        let (mux, stats) = multiplexer(host);
        let interrupt = InterruptSignal::new();
        let mux = mux.with_interrupt(interrupt.clone());

        let raiser = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            interrupt.raise();
        });

        let mut read = FdSet::from_handles([PIPE]);
        let err = mux.select(1, Some(&mut read), None, None, None).unwrap_err();
        raiser.join().unwrap();

        assert_eq!(err, CompatError::Interrupted);
        assert_eq!(stats.snapshot().interrupts, 1);
    }

    #[test]
    fn test_negative_arguments_rejected() {
        let (mux, stats) = multiplexer(host());
        let mut read = FdSet::from_handles([OTHER]);

        let err = mux.select(-1, Some(&mut read), None, None, None).unwrap_err();
        assert_eq!(err.errno(), Errno::EINVAL as i32);

        let err = mux
            .select(1, Some(&mut read), None, None, Some(&TimeVal::new(0, -1)))
            .unwrap_err();
        assert_eq!(err.errno(), Errno::EINVAL as i32);

        // rejected before touching the sets
        assert_eq!(read.as_slice(), &[OTHER]);
        assert_eq!(stats.snapshot().select_calls, 0);
    }

    proptest! {
        #[test]
        fn prop_negative_timeouts_rejected(sec in -1000i64..1000, usec in -1_000_000i64..1_000_000) {
            prop_assume!(sec < 0 || usec < 0);
            let (mux, _) = multiplexer(host());
            let err = mux.select(0, None, None, None, Some(&TimeVal::new(sec, usec))).unwrap_err();
            prop_assert_eq!(err.errno(), Errno::EINVAL as i32);
        }
    }
}
