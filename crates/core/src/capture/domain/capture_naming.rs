use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone};

use crate::shared::constants::CAPTURE_PREFIX;

/// `smile_YYYYmmdd_HHMMSS` for the given local time.
pub fn capture_stem<Tz: TimeZone>(timestamp: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    format!("{}_{}", CAPTURE_PREFIX, timestamp.format("%Y%m%d_%H%M%S"))
}

/// First `<stem>[_n].<ext>` under `dir` that does not exist yet.
///
/// Returns the chosen stem alongside the path.
pub fn unique_capture_path(dir: &Path, stem: &str, extension: &str) -> (String, PathBuf) {
    let candidate = dir.join(format!("{stem}.{extension}"));
    if !candidate.exists() {
        return (stem.to_string(), candidate);
    }
    let mut n: u32 = 1;
    loop {
        let name = format!("{stem}_{n}");
        let candidate = dir.join(format!("{name}.{extension}"));
        if !candidate.exists() {
            return (name, candidate);
        }
        n += 1;
    }
}
