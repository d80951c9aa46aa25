//! Time utilities

use std::time::Instant;

/// Server start time for uptime tracking
static SERVER_START: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();

/// Initialize server start time (call once at startup)
pub fn init_server_time() {
    SERVER_START.get_or_init(Instant::now);
}

/// Get server uptime in seconds
pub fn uptime_secs() -> u64 {
    SERVER_START
        .get()
        .map(|start| start.elapsed().as_secs())
        .unwrap_or(0)
}

/// Format seconds as `m:ss` for the round timer
pub fn format_clock(seconds: f32) -> String {
    let total = if seconds.is_finite() { seconds.max(0.0) } else { 0.0 };
    let minutes = (total / 60.0).floor() as u32;
    let secs = (total % 60.0).floor() as u32;
    format!("{}:{:02}", minutes, secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_uses_two_digit_seconds() {
        assert_eq!(format_clock(240.0), "4:00");
        assert_eq!(format_clock(119.0), "1:59");
        assert_eq!(format_clock(5.0), "0:05");
        assert_eq!(format_clock(0.0), "0:00");
    }

    #[test]
    fn clock_floors_fractions_and_clamps_negatives() {
        assert_eq!(format_clock(61.9), "1:01");
        assert_eq!(format_clock(-3.0), "0:00");
        assert_eq!(format_clock(f32::NAN), "0:00");
    }
}
