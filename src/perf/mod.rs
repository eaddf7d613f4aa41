//! Performance observation: frame timing, memory pressure, issue
//! classification and recommended corrective actions.

mod issues;
mod memory;
mod observer;
mod rolling;

pub use issues::{
    recommendations_for, Issue, IssueKind, IssueThresholds, Recommendation, Severity,
};
pub use memory::{MemoryProbe, MemorySnapshot, NoMemoryProbe, SystemMemoryProbe};
pub use observer::{
    ObserverConfig, PerformanceMetrics, PerformanceNotification, PerformanceObserver,
};
pub use rolling::RollingWindow;
