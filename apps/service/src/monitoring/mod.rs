/// Monitoring engine module - probes targets and drives the monitor loop
///
/// This module is responsible for:
/// - Reaching targets over ICMP or TCP (`checker`)
/// - Turning each attempt into a `ProbeOutcome` (`executor`)
/// - Cycling over all targets and committing each batch (`scheduler`)
pub mod checker;
pub mod executor;
pub mod scheduler;
pub mod types;

pub use checker::{CheckMethod, Checker, ProbeError};
pub use executor::ProbeExecutor;
pub use scheduler::{CycleReport, MonitorLoop, MonitorPhase, MonitorSnapshot};
pub use types::{LogRecord, ProbeOutcome, Target};
