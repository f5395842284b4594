//! Small shared helpers.

/// Human-readable byte count, e.g. `1.4 MB`.
pub fn fmt_size(bytes: u64) -> String {
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut n = bytes as f64;
    for unit in ["KB", "MB", "GB"] {
        n /= 1024.0;
        if n < 1024.0 {
            return format!("{n:.1} {unit}");
        }
    }
    format!("{:.1} TB", n / 1024.0)
}
