/*!
 * Monitoring Module
 * Tracing setup and runtime counters
 */

mod stats;
mod tracer;

pub use stats::{CompatStats, StatsSnapshot};
pub use tracer::init_tracing;
