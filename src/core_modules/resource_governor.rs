// THEORY:
// The `ResourceGovernor` is a frame counter with a cadence. Every
// `cleanup_interval` processed frames it fires once, and the pipeline answers by
// nudging the background model with a blank frame and trimming scratch buffers
// back to their baseline. The model arena is already fixed-size, so this is a
// coarse bound on the scratch vectors that grow with the number of contours.

use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct GovernorConfig {
    /// Frames between two cleanup passes. Zero disables the governor.
    pub cleanup_interval: u64,
    /// Feed one all-zero frame to the background model on every pass.
    pub inject_blank_frame: bool,
}

impl Default for GovernorConfig {
    fn default() -> Self {
        Self {
            cleanup_interval: 30,
            inject_blank_frame: true,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ResourceGovernor {
    interval: u64,
    frames: u64,
    passes: u64,
}

impl ResourceGovernor {
    pub fn new(interval: u64) -> Self {
        Self {
            interval,
            frames: 0,
            passes: 0,
        }
    }

    /// Counts one processed frame; `true` when a cleanup pass is due.
    pub fn tick(&mut self) -> bool {
        self.frames += 1;
        let due = self.interval > 0 && self.frames % self.interval == 0;
        if due {
            self.passes += 1;
        }
        due
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn passes(&self) -> u64 {
        self.passes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_once_per_interval() {
        let mut governor = ResourceGovernor::new(30);
        let fired: Vec<u64> = (1..=100).filter(|_| governor.tick()).collect();
        assert_eq!(fired, vec![30, 60, 90]);
        assert_eq!(governor.passes(), 3);
        assert_eq!(governor.frames(), 100);
    }

    #[test]
    fn zero_interval_never_fires() {
        let mut governor = ResourceGovernor::new(0);
        assert!((0..500).all(|_| !governor.tick()));
    }

    #[test]
    fn unit_interval_fires_every_frame() {
        let mut governor = ResourceGovernor::new(1);
        assert!((0..10).all(|_| governor.tick()));
    }
}
