//! Human-readable rendering of byte counts and durations for the CLI.

use std::time::Duration;

const UNITS: [&str; 6] = ["B", "KiB", "MiB", "GiB", "TiB", "PiB"];

/// IEC-prefixed byte count (`1536` → `"1.5 KiB"`).
pub fn format_bytes(bytes: i64) -> String {
    if bytes < 0 {
        return "0 B".to_string();
    }
    let mut value = bytes as f64;
    let mut unit_index = 0;
    while value >= 1024.0 && unit_index < UNITS.len() - 1 {
        value /= 1024.0;
        unit_index += 1;
    }
    if unit_index == 0 {
        format!("{bytes} {}", UNITS[0])
    } else {
        format!("{value:.1} {}", UNITS[unit_index])
    }
}

/// `HH:MM:SS` rendering, dropping the hours field under an hour.
pub fn format_duration(d: Duration) -> String {
    let total_secs = d.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    if hours > 0 {
        format!("{hours:02}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes:02}:{seconds:02}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_under_1024_have_no_fraction() {
        assert_eq!(format_bytes(512), "512 B");
    }

    #[test]
    fn kib_and_mib_rendering() {
        assert_eq!(format_bytes(1536), "1.5 KiB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MiB");
    }

    #[test]
    fn negative_bytes_clamp_to_zero_display() {
        assert_eq!(format_bytes(-10), "0 B");
    }

    #[test]
    fn duration_under_an_hour_omits_hours_field() {
        assert_eq!(format_duration(Duration::from_secs(65)), "01:05");
    }

    #[test]
    fn duration_over_an_hour_includes_hours_field() {
        assert_eq!(format_duration(Duration::from_secs(3 * 3600 + 61)), "03:01:01");
    }
}
