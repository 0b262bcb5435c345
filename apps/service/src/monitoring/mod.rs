/// Monitoring engine module - runs probes against configured targets
///
/// This module is responsible for:
/// - Executing HTTP/TLS/DNS checks
/// - Scheduling one round loop per target
/// - Handing each result to the store and the alert engine
pub mod checker;
pub mod executor;
pub mod scheduler;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use executor::MonitoringExecutor;
pub use scheduler::MonitoringScheduler;
pub use types::{CheckStatus, CheckType, HealthCheck};
