use std::time::Duration;

/// Default rate ceiling, in bytes per elapsed millisecond (roughly KB/s).
pub const DEFAULT_RATE_CEILING: u64 = 10_000;

/// Default wait between rate checks while a transfer is over the ceiling.
pub const DEFAULT_RECHECK_INTERVAL: Duration = Duration::from_millis(100);

/// Throttling configuration for a [`ThrottledFileRegion`].
///
/// The ceiling bounds the *cumulative average* rate since the region was
/// created, not an instantaneous or windowed rate: an early burst pulls
/// the average up and stalls the transfer until enough wall-clock time
/// has passed to absorb it.
///
/// [`ThrottledFileRegion`]: crate::region::ThrottledFileRegion
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ThrottleOptions {
    /// Maximum allowed cumulative average transfer rate, in bytes per
    /// millisecond elapsed since the region was created.
    pub rate_ceiling: u64,

    /// How long to wait between rate checks while over the ceiling.
    pub recheck_interval: Duration,
}

impl Default for ThrottleOptions {
    fn default() -> Self {
        Self {
            rate_ceiling: DEFAULT_RATE_CEILING,
            recheck_interval: DEFAULT_RECHECK_INTERVAL,
        }
    }
}
