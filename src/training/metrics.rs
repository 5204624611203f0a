use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::gan::PlayerLosses;

/// Rolling windows of both players' running losses.
pub struct TrainingMetrics {
    discriminator: VecDeque<f64>,
    generator: VecDeque<f64>,
    capacity: usize,
    total_iterations: usize, // lifetime count, never capped
}

impl TrainingMetrics {
    pub fn with_capacity(capacity: usize) -> Self {
        TrainingMetrics {
            discriminator: VecDeque::with_capacity(capacity),
            generator: VecDeque::with_capacity(capacity),
            capacity,
            total_iterations: 0,
        }
    }

    pub fn new() -> Self {
        Self::with_capacity(100)
    }

    pub fn record(&mut self, losses: PlayerLosses) {
        self.total_iterations += 1;
        push_capped(&mut self.discriminator, losses.discriminator, self.capacity);
        push_capped(&mut self.generator, losses.generator, self.capacity);
    }

    /// Mean of the last `last_n` recorded losses per player.
    pub fn average(&self, last_n: usize) -> PlayerLosses {
        PlayerLosses {
            discriminator: tail_mean(&self.discriminator, last_n),
            generator: tail_mean(&self.generator, last_n),
        }
    }

    pub fn latest(&self) -> Option<PlayerLosses> {
        Some(PlayerLosses {
            discriminator: *self.discriminator.back()?,
            generator: *self.generator.back()?,
        })
    }

    pub fn total_iterations(&self) -> usize {
        self.total_iterations
    }
}

impl Default for TrainingMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-step timing tracker for profiling the training loop.
pub struct TimingMetrics {
    step_micros: VecDeque<u32>,
    capacity: usize,
    window_start: Instant,
    window_count: usize,
}

impl TimingMetrics {
    pub fn with_capacity(capacity: usize) -> Self {
        TimingMetrics {
            step_micros: VecDeque::with_capacity(capacity),
            capacity,
            window_start: Instant::now(),
            window_count: 0,
        }
    }

    pub fn new() -> Self {
        Self::with_capacity(100)
    }

    pub fn record_step_time(&mut self, d: Duration) {
        self.step_micros.push_back(d.as_micros() as u32);
        if self.step_micros.len() > self.capacity {
            self.step_micros.pop_front();
        }
        self.window_count += 1;
    }

    /// Mean of the last `last_n` step times in milliseconds.
    pub fn avg_step_ms(&self, last_n: usize) -> f32 {
        let n = self.step_micros.len().min(last_n);
        if n == 0 {
            return 0.0;
        }
        let mean = self
            .step_micros
            .iter()
            .rev()
            .take(n)
            .map(|&v| v as f64)
            .sum::<f64>()
            / n as f64;
        (mean / 1000.0) as f32
    }

    /// Steps per second since the last `reset_window` call.
    pub fn iterations_per_sec(&self) -> f32 {
        let micros = self.window_start.elapsed().as_micros();
        if micros == 0 {
            return 0.0;
        }
        self.window_count as f32 / (micros as f32 / 1_000_000.0)
    }

    pub fn reset_window(&mut self) {
        self.window_start = Instant::now();
        self.window_count = 0;
    }
}

impl Default for TimingMetrics {
    fn default() -> Self {
        Self::new()
    }
}

fn push_capped(window: &mut VecDeque<f64>, value: f64, capacity: usize) {
    window.push_back(value);
    if window.len() > capacity {
        window.pop_front();
    }
}

fn tail_mean(window: &VecDeque<f64>, last_n: usize) -> f64 {
    let n = window.len().min(last_n);
    if n == 0 {
        return 0.0;
    }
    window.iter().rev().take(n).sum::<f64>() / n as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn losses(discriminator: f64, generator: f64) -> PlayerLosses {
        PlayerLosses {
            discriminator,
            generator,
        }
    }

    #[test]
    fn test_average_over_window() {
        let mut m = TrainingMetrics::new();
        m.record(losses(1.0, 4.0));
        m.record(losses(3.0, 2.0));
        let avg = m.average(10);
        assert!((avg.discriminator - 2.0).abs() < 1e-12);
        assert!((avg.generator - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_average_last_n() {
        let mut m = TrainingMetrics::new();
        for i in 0..5 {
            m.record(losses(i as f64, 0.0));
        }
        assert!((m.average(2).discriminator - 3.5).abs() < 1e-12);
    }

    #[test]
    fn test_capacity_caps_window_not_total() {
        let mut m = TrainingMetrics::with_capacity(3);
        for i in 0..10 {
            m.record(losses(i as f64, i as f64));
        }
        assert_eq!(m.total_iterations(), 10);
        // Only 7, 8, 9 remain.
        assert!((m.average(100).generator - 8.0).abs() < 1e-12);
        assert_eq!(m.latest(), Some(losses(9.0, 9.0)));
    }

    #[test]
    fn test_empty_metrics() {
        let m = TrainingMetrics::new();
        assert_eq!(m.average(10), losses(0.0, 0.0));
        assert_eq!(m.latest(), None);
    }

    #[test]
    fn test_avg_step_ms_last_n() {
        let mut t = TimingMetrics::new();
        t.record_step_time(Duration::from_micros(1000));
        t.record_step_time(Duration::from_micros(9000));
        t.record_step_time(Duration::from_micros(5000));
        assert!((t.avg_step_ms(1) - 5.0).abs() < 1e-3);
        assert!((t.avg_step_ms(100) - 5.0).abs() < 1e-3);
    }

    #[test]
    fn test_iterations_per_sec_positive() {
        let mut t = TimingMetrics::new();
        for _ in 0..10 {
            t.record_step_time(Duration::from_micros(1000));
        }
        std::thread::sleep(Duration::from_millis(5));
        assert!(t.iterations_per_sec() > 0.0);
    }

    #[test]
    fn test_reset_window_clears_count() {
        let mut t = TimingMetrics::new();
        for _ in 0..5 {
            t.record_step_time(Duration::from_micros(1000));
        }
        t.reset_window();
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(t.iterations_per_sec(), 0.0);
        // The step window survives a throughput reset.
        assert!((t.avg_step_ms(5) - 1.0).abs() < 1e-3);
    }
}
