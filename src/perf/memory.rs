//! Memory usage probes.
//!
//! The observer asks its probe first and falls back to an estimate based
//! on the number of live managed entities when the probe has nothing.

use parking_lot::Mutex;
use serde::Serialize;
use sysinfo::System;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MemorySnapshot {
    pub used_bytes: u64,
    pub total_bytes: u64,
    pub percentage: f64,
}

impl MemorySnapshot {
    pub fn new(used_bytes: u64, total_bytes: u64) -> Self {
        let percentage = if total_bytes == 0 {
            0.0
        } else {
            used_bytes as f64 / total_bytes as f64 * 100.0
        };
        Self {
            used_bytes,
            total_bytes,
            percentage,
        }
    }

    /// Coarse estimate: every live entity costs `bytes_per_entity` out of a
    /// fixed `budget_bytes`.
    pub fn estimate(entities: usize, bytes_per_entity: u64, budget_bytes: u64) -> Self {
        let used = (entities as u64).saturating_mul(bytes_per_entity);
        Self::new(used.min(budget_bytes), budget_bytes)
    }
}

/// Source of memory usage readings.
pub trait MemoryProbe: Send + Sync {
    /// Current usage, or `None` if no introspection is available.
    fn sample(&self) -> Option<MemorySnapshot>;
}

/// Probe that never has data, forcing the entity-count estimate.
pub struct NoMemoryProbe;

impl MemoryProbe for NoMemoryProbe {
    fn sample(&self) -> Option<MemorySnapshot> {
        None
    }
}

/// Host memory via `sysinfo`.
pub struct SystemMemoryProbe {
    system: Mutex<System>,
}

impl SystemMemoryProbe {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_memory();
        Self {
            system: Mutex::new(system),
        }
    }
}

impl Default for SystemMemoryProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryProbe for SystemMemoryProbe {
    fn sample(&self) -> Option<MemorySnapshot> {
        let mut system = self.system.lock();
        system.refresh_memory();
        let total = system.total_memory();
        if total == 0 {
            return None;
        }
        Some(MemorySnapshot::new(system.used_memory(), total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_computes_percentage() {
        let snapshot = MemorySnapshot::new(256, 1024);
        assert!((snapshot.percentage - 25.0).abs() < 1e-9);
        assert_eq!(MemorySnapshot::new(1, 0).percentage, 0.0);
    }

    #[test]
    fn estimate_saturates_at_budget() {
        let snapshot = MemorySnapshot::estimate(10, 200, 1000);
        assert_eq!(snapshot.used_bytes, 1000);
        assert!((snapshot.percentage - 100.0).abs() < 1e-9);

        let snapshot = MemorySnapshot::estimate(2, 100, 1000);
        assert!((snapshot.percentage - 20.0).abs() < 1e-9);
    }
}
