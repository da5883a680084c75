/*!
 * Compatibility Layer Configuration
 *
 * Tuning for the readiness multiplexer and the cancellable executor.
 */

use super::errors::{CompatError, CompatResult};
use super::limits::*;
use nix::sys::signal::Signal;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds};
use std::str::FromStr;
use std::time::Duration;

/// Runtime configuration
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompatConfig {
    /// Sleep between zero-timeout polls (default: 10ms)
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub poll_quantum: Duration,

    /// Time a signalled worker gets to leave its blocking call (default: 100ms)
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub termination_grace: Duration,

    /// Time a gracefully cancelled worker gets to finish (default: 100ms)
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub cancel_grace: Duration,

    /// Signal name used to interrupt worker threads
    pub termination_signal: String,

    /// Use the asynchronous socket path for blocking-mode sockets
    pub overlapped_io: bool,
}

impl CompatConfig {
    /// Create default configuration
    pub fn new() -> Self {
        Self {
            poll_quantum: DEFAULT_POLL_QUANTUM,
            termination_grace: DEFAULT_TERMINATION_GRACE,
            cancel_grace: DEFAULT_CANCEL_GRACE,
            termination_signal: DEFAULT_TERMINATION_SIGNAL.to_string(),
            overlapped_io: true,
        }
    }

    /// Short quantum for interactive workloads (more wakeups)
    pub fn low_latency() -> Self {
        Self {
            poll_quantum: LOW_LATENCY_POLL_QUANTUM,
            ..Self::new()
        }
    }

    /// Long quantum and grace periods for slow or loaded environments
    pub fn relaxed() -> Self {
        Self {
            poll_quantum: RELAXED_POLL_QUANTUM,
            termination_grace: DEFAULT_TERMINATION_GRACE * 5,
            cancel_grace: DEFAULT_CANCEL_GRACE * 5,
            ..Self::new()
        }
    }

    /// Load configuration from environment variables on top of the defaults
    ///
    /// - COMPAT_POLL_QUANTUM_MS
    /// - COMPAT_TERMINATION_GRACE_MS
    /// - COMPAT_CANCEL_GRACE_MS
    /// - COMPAT_TERMINATION_SIGNAL
    /// - COMPAT_OVERLAPPED_IO (1/true/0/false)
    pub fn from_env() -> CompatResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from a JSON document; missing fields keep defaults
    pub fn from_json(json: &str) -> CompatResult<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| CompatError::invalid(format!("invalid configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> CompatResult<Self> {
        let mut config = Self::new();

        if let Some(ms) = lookup("COMPAT_POLL_QUANTUM_MS") {
            config.poll_quantum = parse_millis("COMPAT_POLL_QUANTUM_MS", &ms)?;
        }
        if let Some(ms) = lookup("COMPAT_TERMINATION_GRACE_MS") {
            config.termination_grace = parse_millis("COMPAT_TERMINATION_GRACE_MS", &ms)?;
        }
        if let Some(ms) = lookup("COMPAT_CANCEL_GRACE_MS") {
            config.cancel_grace = parse_millis("COMPAT_CANCEL_GRACE_MS", &ms)?;
        }
        if let Some(signal) = lookup("COMPAT_TERMINATION_SIGNAL") {
            config.termination_signal = signal;
        }
        if let Some(flag) = lookup("COMPAT_OVERLAPPED_IO") {
            config.overlapped_io = matches!(flag.as_str(), "1" | "true");
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the layer cannot run with
    pub fn validate(&self) -> CompatResult<()> {
        if self.poll_quantum.is_zero() {
            return Err(CompatError::invalid("poll quantum must be non-zero"));
        }
        self.signal()?;
        Ok(())
    }

    /// Parsed termination signal
    pub fn signal(&self) -> CompatResult<Signal> {
        Signal::from_str(&self.termination_signal).map_err(|_| {
            CompatError::invalid(format!("unknown signal {}", self.termination_signal))
        })
    }
}

impl Default for CompatConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_millis(key: &str, value: &str) -> CompatResult<Duration> {
    value
        .trim()
        .parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|_| CompatError::invalid(format!("{} must be milliseconds, got {:?}", key, value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = CompatConfig::default();
        assert_eq!(config.poll_quantum, Duration::from_millis(10));
        assert_eq!(config.signal().unwrap(), Signal::SIGUSR2);
        assert!(config.overlapped_io);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_presets_order_quanta() {
        assert!(CompatConfig::low_latency().poll_quantum < CompatConfig::new().poll_quantum);
        assert!(CompatConfig::relaxed().poll_quantum > CompatConfig::new().poll_quantum);
    }

    #[test]
    fn test_lookup_overrides() {
        let vars: HashMap<&str, &str> = [
            ("COMPAT_POLL_QUANTUM_MS", "25"),
            ("COMPAT_TERMINATION_SIGNAL", "SIGUSR1"),
            ("COMPAT_OVERLAPPED_IO", "0"),
        ]
        .into_iter()
        .collect();

        let config = CompatConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(config.poll_quantum, Duration::from_millis(25));
        assert_eq!(config.signal().unwrap(), Signal::SIGUSR1);
        assert!(!config.overlapped_io);
        assert_eq!(config.cancel_grace, DEFAULT_CANCEL_GRACE);
    }

    #[test]
    fn test_lookup_rejects_garbage() {
        let result = CompatConfig::from_lookup(|k| {
            (k == "COMPAT_POLL_QUANTUM_MS").then(|| "soon".to_string())
        });
        assert!(matches!(result, Err(CompatError::InvalidArgument(_))));
    }

    #[test]
    fn test_zero_quantum_rejected() {
        let config = CompatConfig {
            poll_quantum: Duration::ZERO,
            ..CompatConfig::new()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_json_partial_document() {
        let config = CompatConfig::from_json(r#"{"poll_quantum": 5, "termination_grace": 250}"#).unwrap();
        assert_eq!(config.poll_quantum, Duration::from_millis(5));
        assert_eq!(config.termination_grace, Duration::from_millis(250));
        assert_eq!(config.termination_signal, "SIGUSR2");

        assert!(CompatConfig::from_json(r#"{"termination_signal": "SIGNOPE"}"#).is_err());
    }
}
