//! Unit tests for error.rs
//!
//! Tests all Error variants and their implementations (Display, Debug, Clone, std::error::Error).

use crate::error::{Error, Result};

// ============================================================================
// ERROR DISPLAY TESTS
// ============================================================================

#[test]
fn test_backend_error_display() {
    let err = Error::BackendError("vkQueueSubmit failed".to_string());
    let display = format!("{}", err);
    assert!(display.contains("Backend error"));
    assert!(display.contains("vkQueueSubmit failed"));
}

#[test]
fn test_out_of_memory_display() {
    let err = Error::OutOfMemory;
    assert_eq!(format!("{}", err), "Out of GPU memory");
}

#[test]
fn test_invalid_resource_display() {
    let err = Error::InvalidResource("zero-sized allocation".to_string());
    let display = format!("{}", err);
    assert!(display.contains("Invalid resource"));
    assert!(display.contains("zero-sized allocation"));
}

#[test]
fn test_initialization_failed_display() {
    let err = Error::InitializationFailed("no transfer queue".to_string());
    let display = format!("{}", err);
    assert!(display.contains("Initialization failed"));
    assert!(display.contains("no transfer queue"));
}

#[test]
fn test_invariant_violation_display() {
    let err = Error::InvariantViolation("free + allocated != size".to_string());
    let display = format!("{}", err);
    assert!(display.contains("Invariant violation"));
    assert!(display.contains("free + allocated != size"));
}

// ============================================================================
// ERROR TRAIT IMPLEMENTATIONS
// ============================================================================

#[test]
fn test_error_is_std_error() {
    let err = Error::OutOfMemory;
    let _: &dyn std::error::Error = &err;
}

#[test]
fn test_error_debug() {
    assert!(format!("{:?}", Error::BackendError("x".to_string())).contains("BackendError"));
    assert!(format!("{:?}", Error::OutOfMemory).contains("OutOfMemory"));
    assert!(format!("{:?}", Error::InvalidResource("x".to_string())).contains("InvalidResource"));
    assert!(format!("{:?}", Error::InitializationFailed("x".to_string())).contains("InitializationFailed"));
    assert!(format!("{:?}", Error::InvariantViolation("x".to_string())).contains("InvariantViolation"));
}

#[test]
fn test_error_clone() {
    let err1 = Error::InvariantViolation("overlap".to_string());
    let err2 = err1.clone();
    assert_eq!(format!("{}", err1), format!("{}", err2));
}

#[test]
fn test_is_invariant_violation() {
    assert!(Error::InvariantViolation("x".to_string()).is_invariant_violation());
    assert!(!Error::OutOfMemory.is_invariant_violation());
    assert!(!Error::InvalidResource("x".to_string()).is_invariant_violation());
}

// ============================================================================
// RESULT TYPE TESTS
// ============================================================================

#[test]
fn test_result_type_ok() {
    fn returns_ok() -> Result<u64> {
        Ok(256)
    }

    assert_eq!(returns_ok().unwrap(), 256);
}

#[test]
fn test_error_propagation_with_question_mark() {
    fn inner() -> Result<u64> {
        Err(Error::OutOfMemory)
    }

    fn outer() -> Result<u64> {
        inner()?;
        Ok(42)
    }

    match outer() {
        Err(Error::OutOfMemory) => {}
        other => panic!("expected OutOfMemory, got {:?}", other),
    }
}
