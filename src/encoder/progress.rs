//! Textual-stderr progress parsing for the encoder's status stream
//! (spec.md §4.C). The encoder writes a `Duration: HH:MM:SS.ff` line once up
//! front and repeated `time=HH:MM:SS.ff` lines as it works.

/// Parses the first `Duration: HH:MM:SS.ff` occurrence in a stderr line.
/// Returns `None` if the line doesn't carry one, or the timestamp doesn't
/// parse — duration is sometimes absent for odd inputs (spec.md §9).
pub fn parse_duration_line(line: &str) -> Option<f64> {
    let idx = line.find("Duration:")?;
    let rest = &line[idx + "Duration:".len()..];
    let time_str = rest.trim().split(',').next().unwrap_or("").trim();
    parse_timestamp(time_str)
}

/// Parses the current-time marker out of a `time=HH:MM:SS.ff` progress line.
pub fn parse_time_line(line: &str) -> Option<f64> {
    for token in line.split_whitespace() {
        if let Some(rest) = token.strip_prefix("time=") {
            return parse_timestamp(rest);
        }
    }
    None
}

fn parse_timestamp(s: &str) -> Option<f64> {
    if s.is_empty() {
        return None;
    }
    let parts: Vec<&str> = s.split(':').collect();
    if parts.len() != 3 {
        return None;
    }
    let hours: f64 = parts[0].parse().ok()?;
    let minutes: f64 = parts[1].parse().ok()?;
    let seconds: f64 = parts[2].parse().ok()?;
    Some(hours * 3600.0 + minutes * 60.0 + seconds)
}

/// `pct = min(100, current/total * 100)` (spec.md §4.C).
pub fn compute_percent(total_seconds: f64, current_seconds: f64) -> f64 {
    if total_seconds <= 0.0 {
        return 0.0;
    }
    (current_seconds / total_seconds * 100.0).min(100.0).max(0.0)
}
