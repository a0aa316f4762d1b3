use esframe::utils::timing::ticks_to_seconds;

pub fn time_str(sec: f64) -> String {
    let ms = sec * 1000f64;
    let hours = (ms / 3600000f64) as u64;
    let minutes = ((ms % 3600000f64) / 60000f64) as u64;
    let seconds = ((ms % 60000f64) / 1000f64) as u64;
    let milliseconds = (ms % 1000f64) as u64;

    format!(
        "{hours:0width$}:{minutes:02}:{seconds:02}.{milliseconds:03}",
        width = if hours >= 100 { 0 } else { 2 }
    )
}

/// A 90 kHz timestamp as wall clock time, `-` when unknown.
pub fn pts_str(pts: Option<u64>) -> String {
    match pts {
        Some(pts) => time_str(ticks_to_seconds(pts)),
        None => "-".to_string(),
    }
}

#[test]
fn formats_pts() {
    assert_eq!(pts_str(None), "-");
    assert_eq!(pts_str(Some(0)), "00:00:00.000");
    // 1 h 1 min 1.5 s
    assert_eq!(pts_str(Some(3661 * 90_000 + 45_000)), "01:01:01.500");
}
