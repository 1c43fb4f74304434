//! Step clock for simulation runs.
//!
//! The clock owns the step counter. It starts at zero, advances exactly
//! once per executed step, and reports when the configured horizon is
//! reached so the world loop knows to stop.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur during clock operations.
#[derive(Debug, Error)]
pub enum ClockError {
    /// The step counter would overflow.
    #[error("step counter overflow: cannot advance beyond u64::MAX")]
    StepOverflow,

    /// The clock configuration is invalid.
    #[error("invalid clock configuration: {reason}")]
    InvalidConfig {
        /// Description of what was invalid.
        reason: String,
    },
}

/// The simulation step clock.
///
/// Tracks the current step and the horizon at which the run ends. The
/// counter only moves through [`StepClock::advance`], so every observer
/// of the clock sees the same step for the duration of a step cycle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StepClock {
    /// The current step number, starting from 0.
    current_step: u64,
    /// The step count after which the run terminates.
    n_steps: u64,
}

impl StepClock {
    /// Create a new clock at step 0 for a run of `n_steps` steps.
    ///
    /// # Errors
    ///
    /// Returns `ClockError::InvalidConfig` if `n_steps` is zero.
    pub fn new(n_steps: u64) -> Result<Self, ClockError> {
        if n_steps == 0 {
            return Err(ClockError::InvalidConfig {
                reason: "n_steps must be at least 1".to_owned(),
            });
        }
        Ok(Self {
            current_step: 0,
            n_steps,
        })
    }

    /// Create a clock from a specific step (useful for testing and
    /// state restoration).
    #[must_use]
    pub const fn from_parts(current_step: u64, n_steps: u64) -> Self {
        Self {
            current_step,
            n_steps,
        }
    }

    /// The current step number.
    #[must_use]
    pub const fn current_step(&self) -> u64 {
        self.current_step
    }

    /// The total number of steps in the run.
    #[must_use]
    pub const fn n_steps(&self) -> u64 {
        self.n_steps
    }

    /// Whether the clock has reached the end of the run.
    #[must_use]
    pub const fn is_finished(&self) -> bool {
        self.current_step >= self.n_steps
    }

    /// Steps left before the horizon, zero once finished.
    #[must_use]
    pub const fn remaining(&self) -> u64 {
        self.n_steps.saturating_sub(self.current_step)
    }

    /// Advance the clock by one step and return the new step number.
    ///
    /// # Errors
    ///
    /// Returns `ClockError::StepOverflow` if the counter would exceed
    /// `u64::MAX`.
    pub fn advance(&mut self) -> Result<u64, ClockError> {
        self.current_step = self
            .current_step
            .checked_add(1)
            .ok_or(ClockError::StepOverflow)?;
        Ok(self.current_step)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    fn make_clock(n_steps: u64) -> StepClock {
        StepClock::new(n_steps).unwrap()
    }

    #[test]
    fn new_clock_starts_at_zero() {
        let clock = make_clock(50);
        assert_eq!(clock.current_step(), 0);
        assert_eq!(clock.n_steps(), 50);
        assert!(!clock.is_finished());
        assert_eq!(clock.remaining(), 50);
    }

    #[test]
    fn zero_steps_is_rejected() {
        let result = StepClock::new(0);
        assert!(matches!(result, Err(ClockError::InvalidConfig { .. })));
    }

    #[test]
    fn advance_increments_step() {
        let mut clock = make_clock(10);
        let step = clock.advance().unwrap();
        assert_eq!(step, 1);
        assert_eq!(clock.current_step(), 1);
        assert_eq!(clock.remaining(), 9);
    }

    #[test]
    fn clock_finishes_at_horizon() {
        let mut clock = make_clock(3);
        for _ in 0..3 {
            assert!(!clock.is_finished());
            clock.advance().unwrap();
        }
        assert!(clock.is_finished());
        assert_eq!(clock.remaining(), 0);
    }

    #[test]
    fn advance_at_max_overflows() {
        let mut clock = StepClock::from_parts(u64::MAX, u64::MAX);
        let result = clock.advance();
        assert!(matches!(result, Err(ClockError::StepOverflow)));
    }

    #[test]
    fn from_parts_restores_position() {
        let clock = StepClock::from_parts(7, 20);
        assert_eq!(clock.current_step(), 7);
        assert_eq!(clock.remaining(), 13);
    }
}
