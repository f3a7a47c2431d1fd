#![cfg(unix)]

use lockdep::ffi::{
    lockdep_init, lockdep_is_deadlock_detected, lockdep_mutex_lock, lockdep_mutex_unlock,
};
use serde_json::Value;
use std::ffi::{CStr, c_char};
use std::ptr;
use std::sync::Mutex as StdMutex;
use std::thread;

static REPORTS: StdMutex<Vec<String>> = StdMutex::new(Vec::new());

extern "C" fn on_deadlock(json: *const c_char) {
    let json = unsafe { CStr::from_ptr(json) }.to_string_lossy().into_owned();
    REPORTS.lock().unwrap().push(json);
}

fn new_pthread_mutex() -> usize {
    let mutex: &'static mut libc::pthread_mutex_t =
        Box::leak(Box::new(libc::PTHREAD_MUTEX_INITIALIZER));
    mutex as *mut libc::pthread_mutex_t as usize
}

fn lock_in_order(first: usize, second: usize) {
    let (first, second) = (
        first as *mut libc::pthread_mutex_t,
        second as *mut libc::pthread_mutex_t,
    );
    unsafe {
        assert_eq!(lockdep_mutex_lock(first), 0);
        assert_eq!(lockdep_mutex_lock(second), 0);
        assert_eq!(lockdep_mutex_unlock(second), 0);
        assert_eq!(lockdep_mutex_unlock(first), 0);
    }
}

#[test]
fn test_pthread_inversion_across_threads() {
    assert_eq!(unsafe { lockdep_init(ptr::null(), 0, Some(on_deadlock)) }, 0);
    assert_eq!(unsafe { lockdep_init(ptr::null(), 0, None) }, 1);

    let a = new_pthread_mutex();
    let b = new_pthread_mutex();

    // Run the two orders one after the other: nothing ever blocks, yet the
    // inversion is still found
    thread::spawn(move || lock_in_order(a, b)).join().unwrap();
    assert_eq!(lockdep_is_deadlock_detected(), 0);
    thread::spawn(move || lock_in_order(b, a)).join().unwrap();
    assert_eq!(lockdep_is_deadlock_detected(), 1);

    // Repeating either order is never reported again
    thread::spawn(move || lock_in_order(a, b)).join().unwrap();
    thread::spawn(move || lock_in_order(b, a)).join().unwrap();

    let reports = REPORTS.lock().unwrap();
    assert_eq!(reports.len(), 1);
    let info: Value = serde_json::from_str(&reports[0]).expect("Invalid JSON report");
    assert_eq!(info["before_handle"], b);
    assert_eq!(info["after_handle"], a);
    assert_eq!(info["lock_cycle"].as_array().unwrap().len(), 3);
}
