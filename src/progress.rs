//! Progress reporting.
//!
//! The pipeline is a plain blocking call; hosts that want a progress bar pass
//! an observer that is invoked at fixed row boundaries.

/// Receives `(percent, message)` updates while an image is processed.
///
/// Implemented for any `FnMut(u8, &str)` closure.
pub trait Progress {
    /// Report completion in `0..=100` with a short status message.
    fn report(&mut self, percent: u8, message: &str);
}

impl<F> Progress for F
where
    F: FnMut(u8, &str),
{
    fn report(&mut self, percent: u8, message: &str) {
        self(percent, message);
    }
}

/// Discards every update.
#[derive(Debug, Clone, Copy, Default)]
pub struct Silent;

impl Progress for Silent {
    fn report(&mut self, _percent: u8, _message: &str) {}
}

/// Forwards updates to the `log` facade at debug level.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogProgress;

impl Progress for LogProgress {
    fn report(&mut self, percent: u8, message: &str) {
        log::debug!("[{percent:>3}%] {message}");
    }
}

/// Percentage reported once detection has finished.
pub const ANALYZED: u8 = 20;
/// Percentage at which the repair loop starts.
pub const REPAIR_START: u8 = 60;
/// Share of the bar covered by the repair loop.
pub const REPAIR_SPAN: u8 = 30;
/// Percentage reported before smoothing.
pub const SMOOTHING: u8 = 90;
/// Percentage reported when the run is complete.
pub const DONE: u8 = 100;

/// Decides which rows of a row-major loop emit a progress update.
///
/// Updates fire every `height / 10` rows (at least every row for short images).
#[derive(Debug, Clone, Copy)]
pub(crate) struct RowCadence {
    height: u32,
    every: u32,
}

impl RowCadence {
    pub(crate) fn new(height: u32) -> Self {
        Self {
            height,
            every: (height / 10).max(1),
        }
    }

    /// Position within the loop as `(bar percent, loop percent)`, or `None`
    /// if row `y` is not a reporting row.
    pub(crate) fn at(&self, y: u32, start: u8, span: u8) -> Option<(u8, u8)> {
        if self.height == 0 || y % self.every != 0 {
            return None;
        }
        let done = u64::from(y) * 100 / u64::from(self.height);
        let bar = u64::from(start) + u64::from(y) * u64::from(span) / u64::from(self.height);
        Some((clamp_percent(bar), clamp_percent(done)))
    }
}

fn clamp_percent(value: u64) -> u8 {
    u8::try_from(value.min(100)).unwrap_or(100)
}
