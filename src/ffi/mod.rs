/// FFI bindings for the lockdep C API
///
/// This module lets C programs use the detector as a drop-in replacement for
/// `pthread_mutex_lock` / `pthread_mutex_unlock`. The lock handle is the
/// address of the caller's `pthread_mutex_t`; lockdep never initializes or
/// destroys the mutex itself.
///
/// Every entry point returns the status of the underlying pthread call, so a
/// correct C program behaves exactly as it would without the detector.
mod mutex;

pub use mutex::{
    PthreadMutex, lockdep_mutex_lock, lockdep_mutex_trylock, lockdep_mutex_unlock,
};

use crate::core::{Lockdep, global_detector};
use std::ffi::{CStr, CString, c_char, c_int};
use std::sync::atomic::{AtomicBool, Ordering};

// Globals to track initialization state
static INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Initialize lockdep.
///
/// Optional: without it the detector runs with default settings and prints
/// its report to stdout.
///
/// # Arguments
/// * `log_path` - Path to a log file as a null-terminated C string, or NULL to disable logging.
/// * `capture_call_stacks` - Non-zero to attach a call stack to every dependency edge.
/// * `callback` - Function to call with the deadlock as a JSON string, or NULL for no callback.
///
/// # Returns
/// * `0` on success
/// * `1` if lockdep is already initialized
/// * `-1` if the log path contains invalid UTF-8
/// * `-2` if the logger failed to initialize
///
/// # Safety
/// The caller must ensure `log_path` is either `NULL` or a valid null-terminated string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lockdep_init(
    log_path: *const c_char,
    capture_call_stacks: c_int,
    callback: Option<extern "C" fn(*const c_char)>,
) -> c_int {
    let log_path = if log_path.is_null() {
        None
    } else {
        match unsafe { CStr::from_ptr(log_path) }.to_str() {
            Ok(s) => Some(s),
            Err(_) => return -1,
        }
    };

    if INITIALIZED.swap(true, Ordering::SeqCst) {
        return 1;
    }

    let mut builder = Lockdep::new().capture_call_stacks(capture_call_stacks != 0);
    if let Some(path) = log_path {
        builder = builder.with_log(path);
    }
    if let Some(cb) = callback {
        builder = builder.callback(move |info| {
            // Format deadlock info as JSON, then pass the pointer to the callback
            if let Ok(json) = serde_json::to_string(&info)
                && let Ok(c_str) = CString::new(json)
            {
                cb(c_str.as_ptr());
            }
        });
    }

    match builder.start() {
        Ok(()) => 0,
        Err(_) => {
            // Nothing was applied, so a later call may try again
            INITIALIZED.store(false, Ordering::SeqCst);
            -2
        }
    }
}

/// Check whether a lock-order cycle has been detected.
///
/// # Returns
/// * `1` if a cycle has been detected
/// * `0` otherwise
#[unsafe(no_mangle)]
pub extern "C" fn lockdep_is_deadlock_detected() -> c_int {
    global_detector().is_deadlock_detected() as c_int
}

/// Print the current held locks and recorded dependencies to stdout.
#[unsafe(no_mangle)]
pub extern "C" fn lockdep_dump() {
    println!("{}", global_detector().report());
}

/// Flush the event log to disk.
///
/// # Returns
/// * `0` on success or if logging is disabled
/// * `-1` if the flush failed
#[unsafe(no_mangle)]
pub extern "C" fn lockdep_flush_logs() -> c_int {
    match global_detector().flush_logs() {
        Ok(()) => 0,
        Err(_) => -1,
    }
}
