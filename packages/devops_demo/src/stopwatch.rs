//! Lap timer used to time every outbound call.

use std::time::{Duration, Instant};

/// Measures wall-clock time between checkpoints and keeps every lap.
#[derive(Debug, Clone)]
pub struct Stopwatch {
    checkpoint: Instant,
    laps: Vec<Duration>,
}

impl Default for Stopwatch {
    fn default() -> Self {
        Self::new()
    }
}

impl Stopwatch {
    pub fn new() -> Self {
        Self {
            checkpoint: Instant::now(),
            laps: Vec::new(),
        }
    }

    /// Time since the previous checkpoint (or construction). Moves the
    /// checkpoint to now and records the lap.
    pub fn elapsed(&mut self) -> Duration {
        let now = Instant::now();
        let lap = now.duration_since(self.checkpoint);
        self.checkpoint = now;
        self.laps.push(lap);
        lap
    }

    /// Records a lap and returns it in milliseconds, rounded to 2 decimals.
    pub fn elapsed_ms(&mut self) -> f64 {
        duration_ms(self.elapsed())
    }

    /// Sum of all recorded laps.
    pub fn total_elapsed(&self) -> Duration {
        self.laps.iter().sum()
    }
}

/// Milliseconds rounded to 2 decimal places.
pub fn duration_ms(duration: Duration) -> f64 {
    round2(duration.as_secs_f64() * 1000.0)
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_stopwatch_has_no_laps() {
        let sw = Stopwatch::new();
        assert!(sw.laps.is_empty());
        assert_eq!(sw.total_elapsed(), Duration::ZERO);
    }

    #[test]
    fn elapsed_records_each_lap_in_order() {
        let mut sw = Stopwatch::new();
        std::thread::sleep(Duration::from_millis(20));
        let first = sw.elapsed();
        std::thread::sleep(Duration::from_millis(5));
        let second = sw.elapsed();

        assert_eq!(sw.laps, vec![first, second]);
        assert!(first >= Duration::from_millis(20));
        assert!(second >= Duration::from_millis(5));
    }

    #[test]
    fn total_is_sum_of_laps() {
        let mut sw = Stopwatch::new();
        std::thread::sleep(Duration::from_millis(10));
        let d1 = sw.elapsed();
        std::thread::sleep(Duration::from_millis(15));
        let d2 = sw.elapsed();

        assert_eq!(sw.total_elapsed(), d1 + d2);
        assert!(sw.total_elapsed() >= Duration::from_millis(25));
    }

    #[test]
    fn checkpoint_resets_between_laps() {
        let mut sw = Stopwatch::new();
        std::thread::sleep(Duration::from_millis(30));
        sw.elapsed();
        // No sleep: second lap only covers the time since the first call
        let quick = sw.elapsed();
        assert!(quick < Duration::from_millis(30));
    }

    #[test]
    fn elapsed_ms_is_rounded() {
        let mut sw = Stopwatch::new();
        let ms = sw.elapsed_ms();
        assert_eq!(ms, round2(ms));
        assert_eq!(sw.laps.len(), 1);
    }

    #[test]
    fn duration_ms_rounds_to_two_places() {
        assert_eq!(duration_ms(Duration::from_micros(1_234_567)), 1234.57);
        assert_eq!(duration_ms(Duration::from_millis(250)), 250.0);
        assert_eq!(duration_ms(Duration::ZERO), 0.0);
    }

    #[test]
    fn round2_half_values() {
        assert_eq!(round2(100.125), 100.13);
        assert_eq!(round2(2.0 / 3.0), 0.67);
    }
}
