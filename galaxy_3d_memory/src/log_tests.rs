//! Unit tests for log.rs
//!
//! Tests Logger trait, LogEntry, LogSeverity, DefaultLogger formatting.
//! Registry tests that swap the global logger live in tests/logging_integration_tests.rs.

use crate::log::{Logger, LogEntry, LogSeverity, DefaultLogger};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

fn entry(severity: LogSeverity, file: Option<&'static str>, line: Option<u32>) -> LogEntry {
    LogEntry {
        severity,
        timestamp: SystemTime::now(),
        source: "galaxy3d::memory::Buffer".to_string(),
        message: "resized to 512 bytes".to_string(),
        file,
        line,
    }
}

// ============================================================================
// LOG SEVERITY TESTS
// ============================================================================

#[test]
fn test_log_severity_ordering() {
    assert!(LogSeverity::Trace < LogSeverity::Debug);
    assert!(LogSeverity::Debug < LogSeverity::Info);
    assert!(LogSeverity::Info < LogSeverity::Warn);
    assert!(LogSeverity::Warn < LogSeverity::Error);
}

#[test]
fn test_log_severity_from_u8_roundtrip() {
    for severity in [
        LogSeverity::Trace,
        LogSeverity::Debug,
        LogSeverity::Info,
        LogSeverity::Warn,
        LogSeverity::Error,
    ] {
        assert_eq!(LogSeverity::from_u8(severity as u8), severity);
    }
    // Out of range clamps to Error
    assert_eq!(LogSeverity::from_u8(200), LogSeverity::Error);
}

// ============================================================================
// LOG ENTRY / FORMAT TESTS
// ============================================================================

#[test]
fn test_format_plain_without_file_line() {
    let text = DefaultLogger::format_plain(&entry(LogSeverity::Info, None, None));
    assert!(text.contains("[INFO ]"));
    assert!(text.contains("[galaxy3d::memory::Buffer]"));
    assert!(text.ends_with("resized to 512 bytes"));
}

#[test]
fn test_format_plain_with_file_line() {
    let text = DefaultLogger::format_plain(&entry(LogSeverity::Error, Some("buffer.rs"), Some(42)));
    assert!(text.contains("[ERROR]"));
    assert!(text.ends_with("(buffer.rs:42)"));
}

#[test]
fn test_format_plain_ignores_partial_location() {
    let text = DefaultLogger::format_plain(&entry(LogSeverity::Warn, Some("buffer.rs"), None));
    assert!(!text.contains("buffer.rs"));
}

#[test]
fn test_default_logger_all_severities() {
    let logger = DefaultLogger;
    for severity in [
        LogSeverity::Trace,
        LogSeverity::Debug,
        LogSeverity::Info,
        LogSeverity::Warn,
        LogSeverity::Error,
    ] {
        // Just verify it doesn't panic
        logger.log(&entry(severity, None, None));
        logger.log(&entry(severity, Some("transfer_manager.rs"), Some(7)));
    }
}

// ============================================================================
// CUSTOM LOGGER TESTS
// ============================================================================

struct CapturingLogger {
    entries: Arc<Mutex<Vec<LogEntry>>>,
}

impl Logger for CapturingLogger {
    fn log(&self, entry: &LogEntry) {
        self.entries.lock().unwrap().push(entry.clone());
    }
}

#[test]
fn test_custom_logger_implementation() {
    let entries = Arc::new(Mutex::new(Vec::new()));
    let logger = CapturingLogger { entries: entries.clone() };

    logger.log(&entry(LogSeverity::Debug, None, None));
    logger.log(&entry(LogSeverity::Error, Some("a.rs"), Some(1)));

    let captured = entries.lock().unwrap();
    assert_eq!(captured.len(), 2);
    assert_eq!(captured[1].line, Some(1));
}

#[test]
fn test_logger_trait_is_send_sync() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<DefaultLogger>();
    assert_send_sync::<CapturingLogger>();
}
