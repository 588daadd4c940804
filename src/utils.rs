/// Extracts the first embedded integer from a target-reps string.
///
/// Rep targets are free-form: "12", "8-12", "AMRAP", "45" (seconds when the
/// set is time-based). Range strings resolve to their lower bound; a string
/// with no digits resolves to 0 rather than an error.
pub fn parse_first_int(s: &str) -> u32 {
    let mut digits = String::new();
    for c in s.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
        } else if !digits.is_empty() {
            break;
        }
    }

    digits.parse().unwrap_or(0)
}

pub fn format_duration(duration: chrono::Duration) -> String {
    let hours = duration.num_hours();
    let minutes = duration.num_minutes() % 60;
    let seconds = duration.num_seconds() % 60;
    format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
}

/// Short "1:32" style rendering for countdowns under an hour.
pub fn format_countdown(secs: u32) -> String {
    format!("{}:{:02}", secs / 60, secs % 60)
}
