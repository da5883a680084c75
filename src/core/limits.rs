/*!
 * System Limits and Constants
 *
 * Centralized location for the limits and tuning values of the
 * compatibility layer, grouped by component.
 */

use std::time::Duration;

// =============================================================================
// READINESS MULTIPLEXING
// =============================================================================

/// Capacity of one interest set
/// Matches the host readiness primitive's fixed descriptor array
pub const FD_SETSIZE: usize = 64;

/// Poll quantum between zero-timeout polls
/// Bounds readiness-detection latency for pipes and consoles
pub const DEFAULT_POLL_QUANTUM: Duration = Duration::from_millis(10);

/// Poll quantum for the low-latency preset
pub const LOW_LATENCY_POLL_QUANTUM: Duration = Duration::from_millis(1);

/// Poll quantum for the relaxed preset
pub const RELAXED_POLL_QUANTUM: Duration = Duration::from_millis(50);

/// Console noise records drained per probe before giving up for this cycle
pub const MAX_CONSOLE_DRAIN: usize = 64;

/// Slice used when an "indefinite" sleep has to be expressed as timed sleeps
pub const INDEFINITE_SLEEP_SLICE: Duration = Duration::from_secs(3600);

// =============================================================================
// CANCELLABLE EXECUTION
// =============================================================================

/// How long a signalled worker may take to leave its blocking call
/// before it is abandoned and its stack counted as leaked
pub const DEFAULT_TERMINATION_GRACE: Duration = Duration::from_millis(100);

/// How long a gracefully cancelled worker may take to finish
/// before escalating to forced termination
pub const DEFAULT_CANCEL_GRACE: Duration = Duration::from_millis(100);

/// Interval between repeated termination signals to a worker
/// The first signal can land before the worker entered its system call
pub const TERMINATION_RESIGNAL_INTERVAL: Duration = Duration::from_millis(5);

/// Signal used to break a worker out of its blocking system call
pub const DEFAULT_TERMINATION_SIGNAL: &str = "SIGUSR2";

/// Exit status recorded for forcibly terminated workers
pub const DEFAULT_TERMINATION_STATUS: u32 = u32::MAX;

/// Worker thread name prefix
pub const WORKER_THREAD_PREFIX: &str = "compat-worker";
