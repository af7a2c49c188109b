//! FFI bindings for Glucose Flux
//!
//! This module provides C-compatible functions for calling Flux from host
//! apps. All functions use C strings (null-terminated) and return allocated
//! memory that must be freed by the caller using `glucose_flux_free_string`.
//!
//! Instants are passed as milliseconds since the Unix epoch. A negative range
//! bound means "unbounded".

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;

use chrono::{DateTime, Utc};

use crate::pipeline::{
    load_config, readings_to_daily_trend, readings_to_statistics, readings_to_trend,
    GlucoseProcessor,
};

// Thread-local storage for the last error message
thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

/// Set the last error message
fn set_last_error(msg: &str) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
}

/// Clear the last error message
fn clear_last_error() {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = None;
    });
}

/// Helper to convert C string to Rust string
unsafe fn cstr_to_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok().map(|s| s.to_string())
}

/// Config strings may be NULL, meaning defaults
unsafe fn optional_cstr(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        Some(String::new())
    } else {
        cstr_to_string(ptr)
    }
}

/// Helper to convert Rust string to C string (caller must free)
fn string_to_cstr(s: &str) -> *mut c_char {
    match CString::new(s) {
        Ok(cstr) => cstr.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

fn instant_from_ms(ms: i64) -> Option<DateTime<Utc>> {
    if ms < 0 {
        None
    } else {
        DateTime::<Utc>::from_timestamp_millis(ms)
    }
}

fn now_or(ms: i64) -> DateTime<Utc> {
    instant_from_ms(ms).unwrap_or_else(Utc::now)
}

fn report_to_cstr(result: Result<String, crate::AnalysisError>) -> *mut c_char {
    match result {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

// ============================================================================
// Stateless API
// ============================================================================

/// Trend report for the newest reading.
///
/// # Safety
/// - `readings` must be a valid null-terminated C string (JSON array or NDJSON).
/// - `config` must be a valid null-terminated C string or NULL for defaults.
/// - Returns a newly allocated string that must be freed with `glucose_flux_free_string`.
/// - Returns NULL on error; call `glucose_flux_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn glucose_flux_trend(
    readings: *const c_char,
    config: *const c_char,
) -> *mut c_char {
    clear_last_error();

    let readings_str = match cstr_to_string(readings) {
        Some(s) => s,
        None => {
            set_last_error("Invalid readings string pointer");
            return ptr::null_mut();
        }
    };

    let config_str = match optional_cstr(config) {
        Some(s) => s,
        None => {
            set_last_error("Invalid config string pointer");
            return ptr::null_mut();
        }
    };

    report_to_cstr(readings_to_trend(readings_str, config_str))
}

/// Daily percentile pattern report.
///
/// # Safety
/// - `readings` must be a valid null-terminated C string (JSON array or NDJSON).
/// - `config` must be a valid null-terminated C string or NULL for defaults.
/// - `now_ms` < 0 uses the current time.
/// - Returns a newly allocated string that must be freed with `glucose_flux_free_string`.
/// - Returns NULL on error; call `glucose_flux_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn glucose_flux_daily_trend(
    readings: *const c_char,
    config: *const c_char,
    now_ms: i64,
) -> *mut c_char {
    clear_last_error();

    let readings_str = match cstr_to_string(readings) {
        Some(s) => s,
        None => {
            set_last_error("Invalid readings string pointer");
            return ptr::null_mut();
        }
    };

    let config_str = match optional_cstr(config) {
        Some(s) => s,
        None => {
            set_last_error("Invalid config string pointer");
            return ptr::null_mut();
        }
    };

    report_to_cstr(readings_to_daily_trend(readings_str, config_str, now_or(now_ms)))
}

/// Statistics report for `[from_ms, to_ms]`.
///
/// # Safety
/// - `readings` must be a valid null-terminated C string (JSON array or NDJSON).
/// - `config` must be a valid null-terminated C string or NULL for defaults.
/// - Negative `from_ms`/`to_ms` leave that side unbounded; negative `now_ms`
///   uses the current time.
/// - Returns a newly allocated string that must be freed with `glucose_flux_free_string`.
/// - Returns NULL on error; call `glucose_flux_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn glucose_flux_statistics(
    readings: *const c_char,
    config: *const c_char,
    from_ms: i64,
    to_ms: i64,
    now_ms: i64,
) -> *mut c_char {
    clear_last_error();

    let readings_str = match cstr_to_string(readings) {
        Some(s) => s,
        None => {
            set_last_error("Invalid readings string pointer");
            return ptr::null_mut();
        }
    };

    let config_str = match optional_cstr(config) {
        Some(s) => s,
        None => {
            set_last_error("Invalid config string pointer");
            return ptr::null_mut();
        }
    };

    report_to_cstr(readings_to_statistics(
        readings_str,
        config_str,
        instant_from_ms(from_ms),
        instant_from_ms(to_ms),
        now_or(now_ms),
    ))
}

// ============================================================================
// Stateful Processor API
// ============================================================================

/// Opaque handle to a GlucoseProcessor
pub struct GlucoseProcessorHandle {
    processor: GlucoseProcessor,
}

/// Create a new GlucoseProcessor.
///
/// # Safety
/// - `config` must be a valid null-terminated C string or NULL for defaults.
/// - Returns a pointer to a newly allocated processor.
/// - Must be freed with `glucose_flux_processor_free`.
/// - Returns NULL on error.
#[no_mangle]
pub unsafe extern "C" fn glucose_flux_processor_new(
    config: *const c_char,
) -> *mut GlucoseProcessorHandle {
    clear_last_error();

    let config_str = match optional_cstr(config) {
        Some(s) => s,
        None => {
            set_last_error("Invalid config string pointer");
            return ptr::null_mut();
        }
    };

    let processor = match load_config(&config_str).and_then(GlucoseProcessor::new) {
        Ok(p) => p,
        Err(e) => {
            set_last_error(&e.to_string());
            return ptr::null_mut();
        }
    };

    Box::into_raw(Box::new(GlucoseProcessorHandle { processor }))
}

/// Free a GlucoseProcessor.
///
/// # Safety
/// - `processor` must be a valid pointer returned by `glucose_flux_processor_new`.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn glucose_flux_processor_free(processor: *mut GlucoseProcessorHandle) {
    if !processor.is_null() {
        drop(Box::from_raw(processor));
    }
}

/// Ingest readings (JSON array or NDJSON).
///
/// # Safety
/// - `processor` must be a valid pointer returned by `glucose_flux_processor_new`.
/// - `readings` must be a valid null-terminated C string.
/// - Returns the number of readings added, or -1 on error.
#[no_mangle]
pub unsafe extern "C" fn glucose_flux_processor_ingest(
    processor: *mut GlucoseProcessorHandle,
    readings: *const c_char,
) -> i64 {
    clear_last_error();

    if processor.is_null() {
        set_last_error("Null processor pointer");
        return -1;
    }

    let handle = &mut *processor;

    let readings_str = match cstr_to_string(readings) {
        Some(s) => s,
        None => {
            set_last_error("Invalid readings string pointer");
            return -1;
        }
    };

    match handle.processor.ingest_json(&readings_str) {
        Ok(count) => count as i64,
        Err(e) => {
            set_last_error(&e.to_string());
            -1
        }
    }
}

/// Trend report for the processor's newest reading.
///
/// # Safety
/// - `processor` must be a valid pointer returned by `glucose_flux_processor_new`.
/// - Returns a newly allocated string that must be freed with `glucose_flux_free_string`.
/// - Returns NULL on error; call `glucose_flux_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn glucose_flux_processor_trend(
    processor: *mut GlucoseProcessorHandle,
) -> *mut c_char {
    clear_last_error();

    if processor.is_null() {
        set_last_error("Null processor pointer");
        return ptr::null_mut();
    }

    let handle = &*processor;
    report_to_cstr(handle.processor.current_trend_json())
}

/// Statistics report over the processor's readings.
///
/// # Safety
/// - `processor` must be a valid pointer returned by `glucose_flux_processor_new`.
/// - Negative `from_ms`/`to_ms` leave that side unbounded; negative `now_ms`
///   uses the current time.
/// - Returns a newly allocated string that must be freed with `glucose_flux_free_string`.
/// - Returns NULL on error; call `glucose_flux_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn glucose_flux_processor_statistics(
    processor: *mut GlucoseProcessorHandle,
    from_ms: i64,
    to_ms: i64,
    now_ms: i64,
) -> *mut c_char {
    clear_last_error();

    if processor.is_null() {
        set_last_error("Null processor pointer");
        return ptr::null_mut();
    }

    let handle = &*processor;
    report_to_cstr(handle.processor.statistics_json(
        instant_from_ms(from_ms),
        instant_from_ms(to_ms),
        now_or(now_ms),
    ))
}

/// Save processor configuration to JSON.
///
/// # Safety
/// - `processor` must be a valid pointer returned by `glucose_flux_processor_new`.
/// - Returns a newly allocated string that must be freed with `glucose_flux_free_string`.
/// - Returns NULL on error; call `glucose_flux_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn glucose_flux_processor_save_config(
    processor: *mut GlucoseProcessorHandle,
) -> *mut c_char {
    clear_last_error();

    if processor.is_null() {
        set_last_error("Null processor pointer");
        return ptr::null_mut();
    }

    let handle = &*processor;
    report_to_cstr(handle.processor.save_config())
}

/// Load processor configuration from JSON.
///
/// # Safety
/// - `processor` must be a valid pointer returned by `glucose_flux_processor_new`.
/// - `json` must be a valid null-terminated C string.
/// - Returns 0 on success, non-zero on error.
/// - On error, call `glucose_flux_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn glucose_flux_processor_load_config(
    processor: *mut GlucoseProcessorHandle,
    json: *const c_char,
) -> i32 {
    clear_last_error();

    if processor.is_null() {
        set_last_error("Null processor pointer");
        return -1;
    }

    let handle = &mut *processor;

    let json_str = match cstr_to_string(json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid JSON string pointer");
            return -1;
        }
    };

    match handle.processor.load_config(&json_str) {
        Ok(()) => 0,
        Err(e) => {
            set_last_error(&e.to_string());
            -1
        }
    }
}

// ============================================================================
// Memory Management
// ============================================================================

/// Free a string returned by Flux functions.
///
/// # Safety
/// - `ptr` must be a valid pointer returned by a Flux function, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn glucose_flux_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(CString::from_raw(ptr));
    }
}

// ============================================================================
// Error Handling
// ============================================================================

/// Get the last error message.
///
/// # Safety
/// - Returns a pointer to a thread-local error string.
/// - The returned pointer is valid until the next Flux function call on this thread.
/// - Do NOT free the returned pointer.
/// - Returns NULL if no error occurred.
#[no_mangle]
pub unsafe extern "C" fn glucose_flux_last_error() -> *const c_char {
    LAST_ERROR.with(|e| match &*e.borrow() {
        Some(cstr) => cstr.as_ptr(),
        None => ptr::null(),
    })
}

// ============================================================================
// Version Information
// ============================================================================

/// Get the Flux library version.
///
/// # Safety
/// - Returns a pointer to a static string. Do NOT free.
#[no_mangle]
pub unsafe extern "C" fn glucose_flux_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CString;

    fn sample_readings() -> CString {
        CString::new(
            r#"[
            {"timestamp": "2024-01-15T08:00:00Z", "value_mgdl": 180.0},
            {"timestamp": "2024-01-15T08:05:00Z", "value_mgdl": 160.0},
            {"timestamp": "2024-01-15T08:10:00Z", "value_mgdl": 150.0}
        ]"#,
        )
        .unwrap()
    }

    #[test]
    fn test_ffi_trend() {
        let readings = sample_readings();

        unsafe {
            let result = glucose_flux_trend(readings.as_ptr(), ptr::null());
            assert!(!result.is_null());

            let result_str = CStr::from_ptr(result).to_str().unwrap();
            assert!(result_str.contains("\"kind\": \"trend\""));

            glucose_flux_free_string(result);
        }
    }

    #[test]
    fn test_ffi_statistics_unbounded() {
        let readings = sample_readings();
        // 2024-01-15T09:00:00Z
        let now_ms = 1_705_309_200_000;

        unsafe {
            let result = glucose_flux_statistics(readings.as_ptr(), ptr::null(), -1, -1, now_ms);
            assert!(!result.is_null());

            let value: serde_json::Value =
                serde_json::from_str(CStr::from_ptr(result).to_str().unwrap()).unwrap();
            assert_eq!(value["report"]["data"]["reading_count"], 3);

            glucose_flux_free_string(result);
        }
    }

    #[test]
    fn test_ffi_processor_lifecycle() {
        unsafe {
            let processor = glucose_flux_processor_new(ptr::null());
            assert!(!processor.is_null());

            let readings = sample_readings();
            assert_eq!(glucose_flux_processor_ingest(processor, readings.as_ptr()), 3);

            let trend = glucose_flux_processor_trend(processor);
            assert!(!trend.is_null());
            glucose_flux_free_string(trend);

            let config = glucose_flux_processor_save_config(processor);
            assert!(!config.is_null());

            let processor2 = glucose_flux_processor_new(config);
            assert!(!processor2.is_null());
            assert_eq!(glucose_flux_processor_load_config(processor2, config), 0);

            glucose_flux_free_string(config);
            glucose_flux_processor_free(processor);
            glucose_flux_processor_free(processor2);
        }
    }

    #[test]
    fn test_ffi_error_handling() {
        unsafe {
            let invalid = CString::new("not json").unwrap();
            let result = glucose_flux_trend(invalid.as_ptr(), ptr::null());
            assert!(result.is_null());

            let error = glucose_flux_last_error();
            assert!(!error.is_null());

            let error_str = CStr::from_ptr(error).to_str().unwrap();
            assert!(!error_str.is_empty());
        }
    }

    #[test]
    fn test_ffi_invalid_config_rejected() {
        unsafe {
            let config = CString::new(r#"{"bucket_width_minutes": 0}"#).unwrap();
            let processor = glucose_flux_processor_new(config.as_ptr());
            assert!(processor.is_null());
            assert!(!glucose_flux_last_error().is_null());
        }
    }

    #[test]
    fn test_ffi_version() {
        unsafe {
            let version = glucose_flux_version();
            assert!(!version.is_null());

            let version_str = CStr::from_ptr(version).to_str().unwrap();
            assert!(!version_str.is_empty());
        }
    }
}
