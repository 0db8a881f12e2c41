//! Model clock and time tracking.
//!
//! The clock is the single source of truth for simulated time. It counts
//! ticks from 0 up to the configured run length and maps the current tick
//! to a calendar date using the start date and the tick length in days.
//!
//! All temporal derivations use checked arithmetic (no silent overflow).

use chrono::{Days, NaiveDate};

/// Errors that can occur during clock operations.
#[derive(Debug, thiserror::Error)]
pub enum ClockError {
    /// Tick counter would overflow.
    #[error("tick counter overflow: cannot advance beyond u64::MAX")]
    TickOverflow,

    /// Invalid time configuration (e.g. zero days per tick).
    #[error("invalid time configuration: {reason}")]
    InvalidConfig {
        /// Explanation of what is wrong with the configuration.
        reason: String,
    },

    /// The current tick maps past the last representable calendar date.
    #[error("tick {tick} is beyond the calendar range")]
    DateOutOfRange {
        /// The tick whose date was requested.
        tick: u64,
    },
}

/// Simulated-time tracker for one model run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelClock {
    /// Current tick number (0-indexed).
    tick: u64,

    /// Number of ticks in the run.
    num_ticks: u64,

    /// Simulated days per tick.
    time_step_days: u32,

    /// Calendar date of tick 0.
    start_date: NaiveDate,
}

impl ModelClock {
    /// Create a clock at tick 0.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::InvalidConfig`] if `time_step_days` is 0.
    pub fn new(
        start_date: NaiveDate,
        time_step_days: u32,
        num_ticks: u64,
    ) -> Result<Self, ClockError> {
        if time_step_days == 0 {
            return Err(ClockError::InvalidConfig {
                reason: "time_step_days must be at least 1".to_owned(),
            });
        }
        Ok(Self {
            tick: 0,
            num_ticks,
            time_step_days,
            start_date,
        })
    }

    /// Advance the clock by one tick. Returns the new tick number.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::TickOverflow`] if the tick counter would exceed
    /// `u64::MAX`.
    pub fn advance(&mut self) -> Result<u64, ClockError> {
        self.tick = self.tick.checked_add(1).ok_or(ClockError::TickOverflow)?;
        Ok(self.tick)
    }

    /// Return the current tick number.
    pub const fn tick(&self) -> u64 {
        self.tick
    }

    /// Return the configured run length.
    pub const fn num_ticks(&self) -> u64 {
        self.num_ticks
    }

    /// Return the configured tick length in days.
    pub const fn time_step_days(&self) -> u32 {
        self.time_step_days
    }

    /// Whether every configured tick has run.
    pub const fn is_finished(&self) -> bool {
        self.tick >= self.num_ticks
    }

    /// Simulated days since tick 0.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::DateOutOfRange`] if the product overflows.
    pub fn elapsed_days(&self) -> Result<u64, ClockError> {
        self.tick
            .checked_mul(u64::from(self.time_step_days))
            .ok_or(ClockError::DateOutOfRange { tick: self.tick })
    }

    /// Calendar date of the current tick.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::DateOutOfRange`] if the date cannot be
    /// represented.
    pub fn current_date(&self) -> Result<NaiveDate, ClockError> {
        let days = self.elapsed_days()?;
        self.start_date
            .checked_add_days(Days::new(days))
            .ok_or(ClockError::DateOutOfRange { tick: self.tick })
    }
}
