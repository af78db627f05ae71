use serde::{Deserialize, Serialize};

pub const MIN_TARGET_SECONDS: u32 = 60;
pub const MAX_TARGET_SECONDS: u32 = 1800;
pub const DEFAULT_TARGET_SECONDS: u32 = 300;

/// Counts up to a target, then stops by itself.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, tsify::Tsify)]
#[tsify(into_wasm_abi)]
pub struct MeditationTimer {
    target: u32,
    elapsed: u32,
    active: bool,
}

impl Default for MeditationTimer {
    fn default() -> Self {
        Self::new(DEFAULT_TARGET_SECONDS)
    }
}

impl MeditationTimer {
    pub fn new(target: u32) -> Self {
        Self {
            target: target.clamp(MIN_TARGET_SECONDS, MAX_TARGET_SECONDS),
            elapsed: 0,
            active: false,
        }
    }

    pub fn target(&self) -> u32 {
        self.target
    }

    pub fn elapsed(&self) -> u32 {
        self.elapsed
    }

    pub fn remaining(&self) -> u32 {
        self.target.saturating_sub(self.elapsed)
    }

    pub fn active(&self) -> bool {
        self.active
    }

    pub fn set_target(&mut self, target: u32) {
        self.target = target.clamp(MIN_TARGET_SECONDS, MAX_TARGET_SECONDS);
        self.elapsed = self.elapsed.min(self.target);
    }

    /// Starts a new session from zero.
    pub fn start(&mut self) {
        self.elapsed = 0;
        self.active = true;
    }

    /// Continues a paused session. A finished session stays finished.
    pub fn resume(&mut self) {
        self.active = self.elapsed < self.target;
    }

    pub fn pause(&mut self) {
        self.active = false;
    }

    pub fn reset(&mut self) {
        self.pause();
        self.elapsed = 0;
    }

    pub fn tick(&mut self) {
        if !self.active {
            return;
        }
        self.elapsed = (self.elapsed + 1).min(self.target);
        if self.elapsed == self.target {
            log::info!("Meditation of {}s complete", self.target);
            self.active = false;
        }
    }

    pub fn progress(&self) -> f64 {
        if self.target == 0 {
            return 1.0;
        }
        (f64::from(self.elapsed) / f64::from(self.target)).min(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stops_at_target_and_stays_there() {
        let mut timer = MeditationTimer::default();
        timer.start();
        for _ in 0..300 {
            timer.tick();
        }
        assert!(!timer.active());
        assert_eq!(timer.elapsed(), 300);
        assert_eq!(timer.remaining(), 0);

        for _ in 0..10 {
            timer.tick();
        }
        assert_eq!(timer.elapsed(), 300);

        timer.resume();
        assert!(!timer.active());
    }

    #[test]
    fn pause_keeps_elapsed_and_reset_clears_it() {
        let mut timer = MeditationTimer::new(60);
        timer.start();
        timer.tick();
        timer.tick();
        timer.pause();
        timer.tick();
        assert_eq!(timer.elapsed(), 2);

        timer.resume();
        timer.tick();
        assert_eq!(timer.elapsed(), 3);

        timer.reset();
        assert_eq!(timer.elapsed(), 0);
        assert!(!timer.active());
    }

    #[test]
    fn start_begins_from_zero() {
        let mut timer = MeditationTimer::new(60);
        timer.start();
        timer.tick();
        timer.start();
        assert_eq!(timer.elapsed(), 0);
        assert!(timer.active());
    }

    #[test]
    fn target_is_clamped() {
        assert_eq!(MeditationTimer::new(5).target(), 60);
        assert_eq!(MeditationTimer::new(5_000).target(), 1800);

        let mut timer = MeditationTimer::new(600);
        timer.start();
        for _ in 0..100 {
            timer.tick();
        }
        timer.set_target(60);
        assert_eq!(timer.elapsed(), 60);
        assert_eq!(timer.remaining(), 0);
    }

    #[test]
    fn inconsistent_state_does_not_underflow() {
        let timer: MeditationTimer =
            serde_json::from_str(r#"{"target": 60, "elapsed": 90, "active": false}"#).unwrap();
        assert_eq!(timer.remaining(), 0);
        assert_eq!(timer.progress(), 1.0);

        let empty: MeditationTimer =
            serde_json::from_str(r#"{"target": 0, "elapsed": 0, "active": true}"#).unwrap();
        assert_eq!(empty.remaining(), 0);
        assert_eq!(empty.progress(), 1.0);
    }
}
