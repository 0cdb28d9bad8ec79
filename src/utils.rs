//! Small shared utilities: the wall-clock source used by timestamped
//! messages, with an override for deterministic tests.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

// Negative means "no override"; seconds-since-epoch otherwise.
static MOCK_TIME: AtomicI64 = AtomicI64::new(-1);

/// Current wall-clock time in whole seconds since the Unix epoch.
///
/// Serialization paths that stamp "now" onto the wire (for example the
/// `time` field of a peer address) must obtain it through this function so
/// tests can freeze the clock with [`set_mock_time`].
pub fn current_time_seconds() -> u64 {
    let mock = MOCK_TIME.load(Ordering::Relaxed);
    if mock >= 0 {
        return mock as u64;
    }
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system time before Unix epoch")
        .as_secs()
}

/// Pin [`current_time_seconds`] to a fixed value until [`clear_mock_time`].
pub fn set_mock_time(secs: u64) {
    MOCK_TIME.store(secs as i64, Ordering::Relaxed);
}

/// Return [`current_time_seconds`] to the real clock.
pub fn clear_mock_time() {
    MOCK_TIME.store(-1, Ordering::Relaxed);
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_time_overrides_and_restores() {
        let _clock = testing::FrozenClock::at(1_700_000_000);
        assert_eq!(current_time_seconds(), 1_700_000_000);
    }

    #[test]
    fn real_clock_is_after_2020() {
        let _clock = testing::FrozenClock::at(0);
        clear_mock_time();
        assert!(current_time_seconds() > 1_577_836_800);
        set_mock_time(0);
        assert_eq!(current_time_seconds(), 0);
    }
}
