//! Time-of-day prefixes for outbound frames and log lines.
//!
//! Every frame the relay sends and every line it logs starts with the local
//! wall-clock time in a fixed-width `[HH:MM:SS] ` form, so clients can render
//! frames verbatim.

use chrono::{Local, NaiveTime};

/// Length of the `[HH:MM:SS] ` prefix in bytes.
pub const STAMP_LEN: usize = 11;

/// Prefixes `message` with the current local time of day.
pub fn stamp(message: &str) -> String {
    stamp_at(Local::now().time(), message)
}

/// Prefixes `message` with the given time of day.
pub fn stamp_at(time: NaiveTime, message: &str) -> String {
    format!("[{}] {message}", time.format("%H:%M:%S"))
}

/// Returns `frame` without its time-of-day prefix.
///
/// Frames that do not carry a prefix are returned unchanged.
pub fn strip_stamp(frame: &str) -> &str {
    let bytes = frame.as_bytes();
    let stamped = bytes.len() >= STAMP_LEN
        && bytes[0] == b'['
        && bytes[9] == b']'
        && bytes[10] == b' ';
    if stamped {
        &frame[STAMP_LEN..]
    } else {
        frame
    }
}
