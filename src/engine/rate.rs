use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Trailing time span the frame rate is averaged over
pub const AVERAGE_SPAN: Duration = Duration::from_secs(1);

/// Completion times of recent frames, newest first
///
/// Entries older than [`AVERAGE_SPAN`] relative to the newest are dropped, but the two most
/// recent ones are always kept so a rate can be derived from them.
#[derive(Debug, Default)]
pub struct FrameTimes {
    times: VecDeque<Instant>,
}

impl FrameTimes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, time: Instant) {
        self.times.push_front(time);
    }

    pub fn trim(&mut self) {
        while self.times.len() > 2 {
            match (self.times.front(), self.times.back()) {
                (Some(newest), Some(oldest)) if newest.duration_since(*oldest) > AVERAGE_SPAN => {
                    self.times.pop_back();
                }
                _ => break,
            }
        }
    }

    pub fn clear(&mut self) {
        self.times.clear();
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.times.len()
    }

    /// Estimates the frame rate as seen at `now`
    ///
    /// While frames keep arriving the rate is the number of intervals over the retained span.
    /// Once the time since the newest frame exceeds that span, the rate decays as its inverse.
    /// Returns `None` with fewer than two frames or a vanishing denominator.
    pub fn rate(&self, now: Instant) -> Option<f64> {
        if self.times.len() < 2 {
            return None;
        }
        let newest = *self.times.front()?;
        let oldest = *self.times.back()?;

        let frame_delta = newest.duration_since(oldest).as_secs_f64();
        let idle_delta = now.saturating_duration_since(newest).as_secs_f64();

        if frame_delta > idle_delta {
            (frame_delta > f64::EPSILON).then(|| (self.times.len() - 1) as f64 / frame_delta)
        } else {
            (idle_delta > f64::EPSILON).then(|| 1.0 / idle_delta)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn needs_two_frames() {
        let start = Instant::now();
        let mut times = FrameTimes::new();
        assert_eq!(times.rate(start), None);

        times.push(start);
        assert_eq!(times.rate(start + ms(10)), None);
    }

    #[test]
    fn two_frames_give_inverse_interval() {
        let start = Instant::now();
        let mut times = FrameTimes::new();
        times.push(start);
        times.push(start + ms(40));

        let rate = times.rate(start + ms(40)).unwrap();
        assert!((rate - 25.0).abs() < 1e-6, "rate = {}", rate);
    }

    #[test]
    fn steady_stream_averages_over_window() {
        let start = Instant::now();
        let mut times = FrameTimes::new();
        for i in 0..100 {
            times.push(start + ms(i * 20));
            times.trim();
        }

        // 1 s span at 50 fps retains 51 entries
        assert_eq!(times.len(), 51);
        let rate = times.rate(start + ms(99 * 20)).unwrap();
        assert!((rate - 50.0).abs() < 1e-6, "rate = {}", rate);
    }

    #[test]
    fn idle_stream_decays() {
        let start = Instant::now();
        let mut times = FrameTimes::new();
        times.push(start);
        times.push(start + ms(100));

        let rate = times.rate(start + ms(100) + ms(2000)).unwrap();
        assert!((rate - 0.5).abs() < 1e-6, "rate = {}", rate);
    }

    #[test]
    fn trim_keeps_two_most_recent() {
        let start = Instant::now();
        let mut times = FrameTimes::new();
        times.push(start);
        times.push(start + ms(5000));
        times.push(start + ms(10000));
        times.trim();
        assert_eq!(times.len(), 2);
    }

    #[test]
    fn identical_timestamps_are_skipped() {
        let start = Instant::now();
        let mut times = FrameTimes::new();
        times.push(start);
        times.push(start);
        assert_eq!(times.rate(start), None);
    }
}
