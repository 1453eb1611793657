use anyhow::Result;
use std::path::Path;

/// Create a directory (and parents) if it does not exist yet.
pub fn ensure_dir(path: &Path) -> Result<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}

/// Current time as an RFC 3339 string. All timestamps are stored in this
/// format, which orders lexicographically.
pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Current time plus an offset, as an RFC 3339 string.
pub fn rfc3339_after(duration: chrono::Duration) -> String {
    (chrono::Utc::now() + duration).to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rfc3339_ordering() {
        let now = now_rfc3339();
        let later = rfc3339_after(chrono::Duration::hours(1));
        assert!(later > now);
    }
}
