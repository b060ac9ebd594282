use regex::Regex;

/// Input duration from the stderr banner, e.g. `Duration: 00:01:30.55`.
pub fn parse_duration_secs(text: &str) -> Option<f64> {
    let re = Regex::new(r"Duration:\s*(\d+):(\d{2}):(\d{2})\.(\d{2})").unwrap();
    let caps = re.captures(text)?;
    let hours: f64 = caps[1].parse().ok()?;
    let minutes: f64 = caps[2].parse().ok()?;
    let seconds: f64 = caps[3].parse().ok()?;
    let centis: f64 = caps[4].parse().ok()?;
    Some(hours * 3600.0 + minutes * 60.0 + seconds + centis / 100.0)
}

/// Running position from a stdout progress line. Despite the key name,
/// ffmpeg reports microseconds here.
pub fn parse_out_time_us(line: &str) -> Option<u64> {
    line.trim().strip_prefix("out_time_ms=")?.trim().parse().ok()
}

/// Percent while the encoder is still running; capped at 99 so only a clean
/// exit reports 100.
pub fn running_percent(current_secs: f64, duration_secs: f64) -> f64 {
    if duration_secs <= 0.0 {
        return 0.0;
    }
    (current_secs / duration_secs * 100.0).min(99.0)
}
