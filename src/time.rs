use std::time::{Duration, UNIX_EPOCH};

/// Time since the unix epoch.
pub fn epoch() -> Duration {
    UNIX_EPOCH
        .elapsed()
        .expect("current time is before unix epoch")
}

/// Milliseconds since the unix epoch, clamped to u64.
pub fn now_ms() -> u64 {
    u64::try_from(epoch().as_millis()).unwrap_or(u64::MAX)
}

/// Whole minutes since the unix epoch, truncated to 24 bits to fit the
/// packed LFU clock.
pub fn now_minutes() -> u32 {
    let minutes = epoch().as_secs() / 60;
    u32::try_from(minutes & 0x00ff_ffff).unwrap_or(0)
}

/// Seconds since the unix epoch, truncated to u32. Used by the LRU clock.
pub fn now_secs32() -> u32 {
    u32::try_from(epoch().as_secs() & 0xffff_ffff).unwrap_or(u32::MAX)
}
