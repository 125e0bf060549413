/// Vulkan Debug Messenger - Routes validation layer messages into the engine log
///
/// Compiled only with the `vulkan-validation` feature. Messages are filtered
/// by severity, counted, grouped by text, and forwarded to the engine logger
/// under the `galaxy3d::vulkan::validation` source.

use ash::vk;
use colored::*;
use galaxy_3d_memory::{engine_debug, engine_error, engine_info, engine_warn};
use rustc_hash::FxHashMap;
use std::ffi::CStr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use crate::vulkan::DebugSeverity;

const LOG_SOURCE: &str = "galaxy3d::vulkan::validation";

/// Global debug configuration (shared across callbacks)
static DEBUG_CONFIG: Mutex<Option<Config>> = Mutex::new(None);

/// Global validation statistics (thread-safe atomic counters)
static VALIDATION_STATS: ValidationStatsTracker = ValidationStatsTracker::new();

/// Global message tracker for grouping identical messages
static MESSAGE_TRACKER: Mutex<Option<MessageTracker>> = Mutex::new(None);

/// Debug configuration for the callback
#[derive(Debug, Clone, Copy)]
pub struct Config {
    pub severity: DebugSeverity,
    pub break_on_error: bool,
}

/// Validation message counts since the device was created
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ValidationStats {
    pub errors: u32,
    pub warnings: u32,
    pub info: u32,
    pub verbose: u32,
}

impl ValidationStats {
    pub fn total(&self) -> u32 {
        self.errors + self.warnings + self.info + self.verbose
    }
}

struct ValidationStatsTracker {
    errors: AtomicU32,
    warnings: AtomicU32,
    info: AtomicU32,
    verbose: AtomicU32,
}

impl ValidationStatsTracker {
    const fn new() -> Self {
        Self {
            errors: AtomicU32::new(0),
            warnings: AtomicU32::new(0),
            info: AtomicU32::new(0),
            verbose: AtomicU32::new(0),
        }
    }

    fn get_stats(&self) -> ValidationStats {
        ValidationStats {
            errors: self.errors.load(Ordering::Relaxed),
            warnings: self.warnings.load(Ordering::Relaxed),
            info: self.info.load(Ordering::Relaxed),
            verbose: self.verbose.load(Ordering::Relaxed),
        }
    }

    fn reset(&self) {
        self.errors.store(0, Ordering::Relaxed);
        self.warnings.store(0, Ordering::Relaxed);
        self.info.store(0, Ordering::Relaxed);
        self.verbose.store(0, Ordering::Relaxed);
    }
}

#[derive(Default)]
struct MessageTracker {
    messages: FxHashMap<String, u32>,
}

impl MessageTracker {
    fn track_message(&mut self, message: &str) -> u32 {
        let count = self.messages.entry(message.to_string()).or_insert(0);
        *count += 1;
        *count
    }
}

/// Install the callback configuration and reset statistics
pub fn init_debug_config(config: Config) {
    VALIDATION_STATS.reset();

    if let Ok(mut tracker) = MESSAGE_TRACKER.lock() {
        *tracker = Some(MessageTracker::default());
    }
    if let Ok(mut debug_config) = DEBUG_CONFIG.lock() {
        *debug_config = Some(config);
    }
}

/// Remove the configuration so late callbacks during teardown are ignored
pub fn cleanup_debug_config() {
    if let Ok(mut debug_config) = DEBUG_CONFIG.lock() {
        *debug_config = None;
    }
}

/// Get current validation statistics
pub fn get_validation_stats() -> ValidationStats {
    VALIDATION_STATS.get_stats()
}

/// Print validation statistics report
pub fn print_validation_stats_report() {
    let stats = get_validation_stats();

    if stats.total() == 0 {
        println!("\n{}", "✓ No validation messages".green().bold());
        return;
    }

    println!("\n{}", "=== Validation Statistics Report ===".bright_blue().bold());

    if stats.errors > 0 {
        println!("  {} {}", "Errors:".red().bold(), stats.errors);
    }
    if stats.warnings > 0 {
        println!("  {} {}", "Warnings:".yellow().bold(), stats.warnings);
    }
    if stats.info > 0 {
        println!("  {} {}", "Info:".cyan(), stats.info);
    }
    if stats.verbose > 0 {
        println!("  {} {}", "Verbose:".bright_black(), stats.verbose);
    }
    println!("  {} {}", "Total:".white().bold(), stats.total());

    if let Ok(tracker_guard) = MESSAGE_TRACKER.lock() {
        if let Some(tracker) = tracker_guard.as_ref() {
            let duplicate_count = tracker.messages.values().filter(|&&count| count > 1).count();
            if duplicate_count > 0 {
                println!("\n  {} {} message(s) appeared multiple times", "ℹ".cyan(), duplicate_count);
            }
        }
    }

    println!("{}\n", "====================================".bright_blue().bold());
}

/// Severity flags the messenger should subscribe to
pub fn severity_flags(severity: DebugSeverity) -> vk::DebugUtilsMessageSeverityFlagsEXT {
    match severity {
        DebugSeverity::ErrorsOnly => vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        DebugSeverity::ErrorsAndWarnings => {
            vk::DebugUtilsMessageSeverityFlagsEXT::ERROR
                | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
        }
        DebugSeverity::All => {
            vk::DebugUtilsMessageSeverityFlagsEXT::ERROR
                | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                | vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
        }
    }
}

/// Vulkan debug messenger callback
///
/// # Safety
///
/// Called by the validation layers with a valid callback data pointer.
pub unsafe extern "system" fn vulkan_debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut std::os::raw::c_void,
) -> vk::Bool32 {
    if p_callback_data.is_null() {
        return vk::FALSE;
    }
    let callback_data = *p_callback_data;
    let message_id_name = if callback_data.p_message_id_name.is_null() {
        "Unknown"
    } else {
        CStr::from_ptr(callback_data.p_message_id_name)
            .to_str()
            .unwrap_or("Invalid UTF-8")
    };
    let message = if callback_data.p_message.is_null() {
        "No message"
    } else {
        CStr::from_ptr(callback_data.p_message)
            .to_str()
            .unwrap_or("Invalid UTF-8")
    };

    let config = match DEBUG_CONFIG.lock() {
        Ok(guard) => match *guard {
            Some(config) => config,
            None => return vk::FALSE,
        },
        Err(_) => return vk::FALSE,
    };

    if !severity_flags(config.severity).intersects(message_severity) {
        return vk::FALSE;
    }

    let type_str = if message_type.contains(vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION) {
        "Validation"
    } else if message_type.contains(vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE) {
        "Performance"
    } else {
        "General"
    };

    let occurrence_count = match MESSAGE_TRACKER.lock() {
        Ok(mut guard) => guard.get_or_insert_with(MessageTracker::default).track_message(message),
        Err(_) => 1,
    };
    let repeat_indicator = if occurrence_count > 1 {
        format!(" [x{}]", occurrence_count)
    } else {
        String::new()
    };

    let is_error = message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR);
    if is_error {
        VALIDATION_STATS.errors.fetch_add(1, Ordering::Relaxed);
        engine_error!(LOG_SOURCE, "[{}]{} {}: {}", type_str, repeat_indicator, message_id_name, message);
    } else if message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        VALIDATION_STATS.warnings.fetch_add(1, Ordering::Relaxed);
        engine_warn!(LOG_SOURCE, "[{}]{} {}: {}", type_str, repeat_indicator, message_id_name, message);
    } else if message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
        VALIDATION_STATS.info.fetch_add(1, Ordering::Relaxed);
        engine_info!(LOG_SOURCE, "[{}]{} {}: {}", type_str, repeat_indicator, message_id_name, message);
    } else {
        VALIDATION_STATS.verbose.fetch_add(1, Ordering::Relaxed);
        engine_debug!(LOG_SOURCE, "[{}]{} {}: {}", type_str, repeat_indicator, message_id_name, message);
    }

    // Break on error if configured (for debugger attachment)
    if config.break_on_error && is_error {
        eprintln!(
            "\n{}\n  Context: {} [{}]\n  Message: {}\n",
            "BREAK ON VALIDATION ERROR - Aborting execution".red().bold(),
            message_id_name.yellow(),
            type_str.cyan(),
            message.white()
        );
        std::process::abort();
    }

    vk::FALSE
}

#[cfg(test)]
#[path = "debug_tests.rs"]
mod tests;
