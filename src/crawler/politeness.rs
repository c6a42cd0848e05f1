//! Randomized inter-request delays with a night-time slowdown

use crate::config::HarvesterConfig;
use chrono::{Local, Timelike};
use rand::Rng;
use std::time::Duration;

/// Local-hour window `[start, end)`, wrapping midnight when `start > end`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NightWindow {
    pub start: u32,
    pub end: u32,
}

impl NightWindow {
    pub fn contains(&self, hour: u32) -> bool {
        if self.start == self.end {
            return false;
        }
        if self.start < self.end {
            hour >= self.start && hour < self.end
        } else {
            hour >= self.start || hour < self.end
        }
    }
}

/// Samples the delay a worker sleeps after each fetch
#[derive(Debug, Clone)]
pub struct Politeness {
    min_delay: f64,
    max_delay: f64,
    night: NightWindow,
    night_multiplier: f64,
}

impl Politeness {
    pub fn new(min_delay: f64, max_delay: f64, night: NightWindow, night_multiplier: f64) -> Self {
        Self {
            min_delay,
            max_delay,
            night,
            night_multiplier,
        }
    }

    pub fn from_config(config: &HarvesterConfig) -> Self {
        Self::new(
            config.min_delay_seconds,
            config.max_delay_seconds,
            NightWindow {
                start: config.night_hours_start,
                end: config.night_hours_end,
            },
            config.night_mode_multiplier,
        )
    }

    /// Delay for the current local hour
    pub fn next_delay(&self) -> Duration {
        self.delay_at_hour(Local::now().hour())
    }

    /// Delay uniformly drawn from `[min, max]`, scaled during night hours
    pub fn delay_at_hour(&self, hour: u32) -> Duration {
        let base = if self.max_delay > self.min_delay {
            rand::thread_rng().gen_range(self.min_delay..=self.max_delay)
        } else {
            self.min_delay
        };

        let seconds = if self.night.contains(hour) {
            base * self.night_multiplier
        } else {
            base
        };
        Duration::from_secs_f64(seconds.max(0.0))
    }
}
