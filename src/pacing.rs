//! Fixed-step pacing for hosts that drive the simulation from a frame loop.

use wasm_bindgen::prelude::*;

pub const DEFAULT_STEP_SECONDS: f32 = 1.0 / 120.0;
pub const DEFAULT_MAX_STEPS_PER_FRAME: u32 = 4;

/// Accumulates wall-clock time and converts it into whole fixed steps.
///
/// At most `max_steps_per_frame` steps are released per call; any time left
/// over beyond that is dropped so a stalled tab does not build up debt.
#[wasm_bindgen]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FixedStepClock {
    step: f32,
    max_steps_per_frame: u32,
    accumulator: f32,
}

impl Default for FixedStepClock {
    fn default() -> Self {
        Self::new(DEFAULT_STEP_SECONDS, DEFAULT_MAX_STEPS_PER_FRAME)
    }
}

#[wasm_bindgen]
impl FixedStepClock {
    #[wasm_bindgen(constructor)]
    pub fn new(step: f32, max_steps_per_frame: u32) -> FixedStepClock {
        let step = if step.is_finite() && step > 0.0 {
            step
        } else {
            DEFAULT_STEP_SECONDS
        };

        Self {
            step,
            max_steps_per_frame: max_steps_per_frame.max(1),
            accumulator: 0.0,
        }
    }

    pub fn step(&self) -> f32 {
        self.step
    }

    pub fn max_steps_per_frame(&self) -> u32 {
        self.max_steps_per_frame
    }

    /// Adds `elapsed` seconds and returns how many fixed steps are due.
    pub fn advance(&mut self, elapsed: f32) -> u32 {
        if elapsed.is_finite() && elapsed > 0.0 {
            self.accumulator += elapsed;
        }

        let mut steps = 0;
        while self.accumulator >= self.step && steps < self.max_steps_per_frame {
            self.accumulator -= self.step;
            steps += 1;
        }

        if self.accumulator >= self.step {
            self.accumulator = 0.0;
        }
        steps
    }

    /// Fraction of a step already accumulated, in `[0, 1)`.
    pub fn alpha(&self) -> f32 {
        (self.accumulator / self.step).clamp(0.0, 1.0)
    }

    pub fn reset(&mut self) {
        self.accumulator = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::FixedStepClock;
    use approx::assert_relative_eq;

    #[test]
    fn whole_steps_are_released_and_remainder_kept() {
        let mut clock = FixedStepClock::new(0.01, 4);
        assert_eq!(clock.advance(0.025), 2);
        assert_relative_eq!(clock.alpha(), 0.5, epsilon = 1.0e-3);
        assert_eq!(clock.advance(0.006), 1);
    }

    #[test]
    fn short_frames_accumulate() {
        let mut clock = FixedStepClock::new(0.01, 4);
        assert_eq!(clock.advance(0.004), 0);
        assert_eq!(clock.advance(0.004), 0);
        assert_eq!(clock.advance(0.004), 1);
    }

    #[test]
    fn stall_is_capped_and_debt_discarded() {
        let mut clock = FixedStepClock::new(0.01, 4);
        assert_eq!(clock.advance(5.0), 4);
        assert_relative_eq!(clock.alpha(), 0.0);
        assert_eq!(clock.advance(0.0), 0);
    }

    #[test]
    fn invalid_inputs_are_ignored() {
        let mut clock = FixedStepClock::new(f32::NAN, 0);
        assert_relative_eq!(clock.step(), 1.0 / 120.0);
        assert_eq!(clock.max_steps_per_frame(), 1);
        assert_eq!(clock.advance(f32::INFINITY), 0);
        assert_eq!(clock.advance(-1.0), 0);
    }
}
