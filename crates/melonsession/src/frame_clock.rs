//! Measured frame rate.
//!
//! Counts frames over a rolling one-second window of wall clock time using
//! `std::time::Instant`. Paused time is excluded from the measurement.

use std::time::{Duration, Instant};

const WINDOW: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Default)]
pub struct FrameClock {
    /// Start of the current measurement window (None while paused)
    window_start: Option<Instant>,

    frames_in_window: u32,

    /// Rate measured over the last complete window
    fps: f32,
}

impl FrameClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start measuring from now.
    pub fn start(&mut self) {
        self.start_at(Instant::now());
    }

    pub fn start_at(&mut self, now: Instant) {
        if self.window_start.is_none() {
            self.window_start = Some(now);
            self.frames_in_window = 0;
        }
    }

    pub fn is_running(&self) -> bool {
        self.window_start.is_some()
    }

    /// Stop measuring; the last measured rate is kept.
    pub fn pause(&mut self) {
        self.window_start = None;
        self.frames_in_window = 0;
    }

    /// Stop and forget the measurement.
    pub fn reset(&mut self) {
        self.pause();
        self.fps = 0.0;
    }

    /// Record one completed frame.
    pub fn frame(&mut self) {
        self.frame_at(Instant::now());
    }

    pub fn frame_at(&mut self, now: Instant) {
        let Some(start) = self.window_start else {
            return;
        };

        self.frames_in_window += 1;

        let elapsed = now.saturating_duration_since(start);
        if elapsed >= WINDOW {
            self.fps = self.frames_in_window as f32 / elapsed.as_secs_f32();
            self.window_start = Some(now);
            self.frames_in_window = 0;
        }
    }

    /// Frames per second over the last complete window.
    pub fn fps(&self) -> f32 {
        self.fps
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_measures_over_one_second() {
        let mut clock = FrameClock::new();
        let t0 = Instant::now();
        clock.start_at(t0);

        for i in 1..=60 {
            clock.frame_at(t0 + Duration::from_millis(i * 1000 / 60));
        }

        assert!((clock.fps() - 60.0).abs() < 0.5, "fps = {}", clock.fps());
    }

    #[test]
    fn test_no_measurement_before_window_completes() {
        let mut clock = FrameClock::new();
        let t0 = Instant::now();
        clock.start_at(t0);
        clock.frame_at(t0 + Duration::from_millis(100));
        assert_eq!(clock.fps(), 0.0);
    }

    #[test]
    fn test_paused_frames_ignored() {
        let mut clock = FrameClock::new();
        clock.frame();
        assert!(!clock.is_running());
        assert_eq!(clock.fps(), 0.0);
    }
}
