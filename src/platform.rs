//! Per-user locations for the profile and crash reports, plus terminal size.

use std::path::PathBuf;

pub fn home_dir() -> Option<PathBuf> {
    dirs_next::home_dir()
}

/// `~/.codecompanion`, or `./.codecompanion` when there is no home directory
pub fn config_dir() -> PathBuf {
    home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".codecompanion")
}

/// Where crash reports may be written, most visible first.
///
/// Downloads folder, then the config directory, then the system temp dir.
pub fn crash_log_dirs() -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    if let Some(downloads) = dirs_next::download_dir() {
        dirs.push(downloads);
    }
    dirs.push(config_dir());
    dirs.push(std::env::temp_dir());
    dirs
}

/// Terminal width in columns, 80 when unknown
pub fn terminal_width() -> usize {
    term_size::dimensions().map(|(w, _)| w).unwrap_or(80)
}
