use std::time::SystemTime;
use std::time::UNIX_EPOCH;

/// Current wall-clock time as unix seconds.
pub fn now_unix_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("Time went backwards")
        .as_secs() as i64
}
