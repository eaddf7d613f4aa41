//! Fixed-length rolling window with an incrementally maintained mean.

use std::collections::VecDeque;

#[derive(Debug, Clone)]
pub struct RollingWindow {
    samples: VecDeque<f64>,
    capacity: usize,
    sum: f64,
}

impl RollingWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
            sum: 0.0,
        }
    }

    /// Append a sample, dropping and returning the oldest once full.
    pub fn push(&mut self, value: f64) -> Option<f64> {
        let dropped = if self.samples.len() == self.capacity {
            self.samples.pop_front()
        } else {
            None
        };
        if let Some(old) = dropped {
            self.sum -= old;
        }
        self.samples.push_back(value);
        self.sum += value;
        dropped
    }

    pub fn average(&self) -> f64 {
        if self.samples.is_empty() {
            0.0
        } else {
            self.sum / self.samples.len() as f64
        }
    }

    pub fn latest(&self) -> Option<f64> {
        self.samples.back().copied()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.samples.len() == self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.samples.clear();
        self.sum = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drops_oldest_when_full() {
        let mut window = RollingWindow::new(3);
        assert_eq!(window.push(1.0), None);
        assert_eq!(window.push(2.0), None);
        assert_eq!(window.push(3.0), None);
        assert!(window.is_full());
        assert_eq!(window.push(4.0), Some(1.0));
        assert_eq!(window.len(), 3);
        assert!((window.average() - 3.0).abs() < 1e-9);
        assert_eq!(window.latest(), Some(4.0));
    }

    #[test]
    fn empty_window_averages_zero() {
        let mut window = RollingWindow::new(0);
        assert_eq!(window.capacity(), 1);
        assert_eq!(window.average(), 0.0);
        window.push(5.0);
        window.clear();
        assert!(window.is_empty());
        assert_eq!(window.average(), 0.0);
    }
}
