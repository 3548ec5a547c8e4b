use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall-clock time as whole seconds since the UNIX epoch.
///
/// Returns `0` if the system clock reports a time before the epoch.
pub fn current_time_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0)
}
