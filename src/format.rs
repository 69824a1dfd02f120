use std::time::Duration;

const GREEN: &str = "\x1b[32m";
const RED: &str = "\x1b[31m";
const RESET: &str = "\x1b[0m";

/// Compact human readable duration: `1.5s`, `2.0m`, `3.2h`, `1d2.0h`.
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs_f64();
    if secs < 60.0 {
        format!("{secs:.1}s")
    } else if secs < 3600.0 {
        format!("{:.1}m", secs / 60.0)
    } else if secs < 86400.0 {
        format!("{:.1}h", secs / 3600.0)
    } else {
        let days = (secs / 86400.0).floor();
        format!("{}d{:.1}h", days as u64, (secs - days * 86400.0) / 3600.0)
    }
}

pub fn format_success(msg: &str, color: bool) -> String {
    if color {
        format!("{GREEN}✓ {msg}{RESET}")
    } else {
        format!("✓ {msg}")
    }
}

pub fn format_error(msg: &str, color: bool) -> String {
    if color {
        format!("{RED}✗ {msg}{RESET}")
    } else {
        format!("✗ {msg}")
    }
}
