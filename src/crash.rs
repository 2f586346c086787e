//! Crash reports
//!
//! A panic hook that saves a plain-text diagnostic report to the first
//! writable candidate directory, then hands over to the previous hook.

use crate::platform;
use chrono::{DateTime, Local};
use std::any::Any;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

const RULE_WIDTH: usize = 80;

#[derive(Debug, Clone)]
pub struct CrashReport {
    pub time: DateTime<Local>,
    pub thread: String,
    pub message: String,
    pub location: String,
    pub backtrace: String,
}

impl CrashReport {
    pub fn file_name(&self) -> String {
        format!(
            "codecompanion_crash_{}.log",
            self.time.format("%Y-%m-%d_%H-%M-%S")
        )
    }

    /// Report body; `saved_to` is echoed at the end
    pub fn render(&self, saved_to: &Path) -> String {
        let heavy = "=".repeat(RULE_WIDTH);
        let light = "-".repeat(RULE_WIDTH);
        let mut out = String::new();

        // Writing to a String cannot fail
        let _ = writeln!(out, "{}", heavy);
        let _ = writeln!(out, "CODE COMPANION - CRASH REPORT");
        let _ = writeln!(out, "{}", heavy);
        let _ = writeln!(out);
        let _ = writeln!(out, "Crash Time: {}", self.time.format("%Y-%m-%d %H:%M:%S"));
        let _ = writeln!(out, "Thread: {}", self.thread);
        let _ = writeln!(out);
        let _ = writeln!(out, "App Version: {}", env!("CARGO_PKG_VERSION"));
        let _ = writeln!(out, "Package: {}", env!("CARGO_PKG_NAME"));
        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "Platform: {} {}",
            std::env::consts::OS,
            std::env::consts::ARCH
        );
        let _ = writeln!(out, "Host: {}", hostname_or_unknown());
        let _ = writeln!(out);
        let _ = writeln!(out, "{}", heavy);
        let _ = writeln!(out, "PANIC");
        let _ = writeln!(out, "{}", heavy);
        let _ = writeln!(out);
        let _ = writeln!(out, "Message: {}", self.message);
        let _ = writeln!(out, "Location: {}", self.location);
        let _ = writeln!(out);
        let _ = writeln!(out, "Backtrace:");
        let _ = writeln!(out, "{}", light);
        let _ = writeln!(out, "{}", self.backtrace);
        let _ = writeln!(out);
        let _ = writeln!(out, "{}", heavy);
        let _ = writeln!(out, "Log file saved to: {}", saved_to.display());
        let _ = writeln!(out, "{}", heavy);
        out
    }
}

fn hostname_or_unknown() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "Unknown".to_string())
}

/// Best-effort text of a panic payload
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}

/// Write the report into the first directory that accepts it
pub fn write_report(dirs: &[PathBuf], report: &CrashReport) -> Option<PathBuf> {
    for dir in dirs {
        let path = dir.join(report.file_name());
        let result = std::fs::create_dir_all(dir)
            .and_then(|_| std::fs::write(&path, report.render(&path)));
        match result {
            Ok(()) => {
                tracing::error!("Crash log saved to: {}", path.display());
                return Some(path);
            }
            Err(e) => {
                tracing::warn!("Failed to write crash log to {}: {}", path.display(), e);
            }
        }
    }
    None
}

/// Install the crash-report hook in front of the current panic hook
pub fn install() {
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let report = CrashReport {
            time: Local::now(),
            thread: std::thread::current()
                .name()
                .unwrap_or("<unnamed>")
                .to_string(),
            message: panic_message(panic_info.payload()),
            location: panic_info
                .location()
                .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
                .unwrap_or_else(|| "unknown".to_string()),
            backtrace: std::backtrace::Backtrace::force_capture().to_string(),
        };

        tracing::error!("PANIC at {}: {}", report.location, report.message);
        if write_report(&platform::crash_log_dirs(), &report).is_none() {
            tracing::error!("Failed to write crash log to any location");
        }

        previous(panic_info);
    }));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_report() -> CrashReport {
        CrashReport {
            time: Local::now(),
            thread: "main".to_string(),
            message: "index out of bounds".to_string(),
            location: "src/store.rs:10:5".to_string(),
            backtrace: "<backtrace>".to_string(),
        }
    }

    #[test]
    fn test_first_writable_dir_wins() {
        let root = tempfile::tempdir().unwrap();
        // A regular file cannot hold a directory
        let blocker = root.path().join("blocker");
        std::fs::write(&blocker, "x").unwrap();
        let unwritable = blocker.join("logs");
        let first_ok = root.path().join("first");
        let second_ok = root.path().join("second");

        let report = sample_report();
        let saved = write_report(
            &[unwritable, first_ok.clone(), second_ok.clone()],
            &report,
        )
        .unwrap();

        assert_eq!(saved, first_ok.join(report.file_name()));
        assert!(!second_ok.exists());

        let content = std::fs::read_to_string(&saved).unwrap();
        assert!(content.contains("CRASH REPORT"));
        assert!(content.contains("Message: index out of bounds"));
        assert!(content.contains(&format!("Log file saved to: {}", saved.display())));
    }

    #[test]
    fn test_no_writable_dir() {
        let root = tempfile::tempdir().unwrap();
        let blocker = root.path().join("blocker");
        std::fs::write(&blocker, "x").unwrap();

        assert!(write_report(&[blocker.join("a")], &sample_report()).is_none());
        assert!(write_report(&[], &sample_report()).is_none());
    }

    #[test]
    fn test_file_name_format() {
        let name = sample_report().file_name();
        assert!(name.starts_with("codecompanion_crash_"));
        assert!(name.ends_with(".log"));
        assert!(!name.contains(':'));
    }

    #[test]
    fn test_panic_message_payloads() {
        let s: Box<dyn Any + Send> = Box::new("static");
        assert_eq!(panic_message(s.as_ref()), "static");
        let owned: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(owned.as_ref()), "owned");
        let other: Box<dyn Any + Send> = Box::new(42u8);
        assert_eq!(panic_message(other.as_ref()), "Unknown panic");
    }
}
