use crate::core::RawLock;
use crate::core::global_detector;
use libc::pthread_mutex_t;
use std::cell::UnsafeCell;
use std::os::raw::c_int;

/// A caller-owned `pthread_mutex_t` seen through the [`RawLock`] seam
#[repr(transparent)]
pub struct PthreadMutex(UnsafeCell<pthread_mutex_t>);

impl PthreadMutex {
    /// View a C mutex as a `PthreadMutex`
    ///
    /// # Safety
    /// `ptr` must point to an initialized `pthread_mutex_t` that outlives `'a`
    /// and does not move.
    pub unsafe fn from_ptr<'a>(ptr: *mut pthread_mutex_t) -> &'a PthreadMutex {
        unsafe { &*(ptr as *const PthreadMutex) }
    }
}

fn status(rc: c_int) -> Result<(), c_int> {
    if rc == 0 { Ok(()) } else { Err(rc) }
}

fn code(result: Result<(), c_int>) -> c_int {
    match result {
        Ok(()) => 0,
        Err(rc) => rc,
    }
}

impl RawLock for PthreadMutex {
    type Error = c_int;

    fn raw_lock(&self) -> Result<(), c_int> {
        status(unsafe { libc::pthread_mutex_lock(self.0.get()) })
    }

    fn raw_try_lock(&self) -> Result<bool, c_int> {
        match unsafe { libc::pthread_mutex_trylock(self.0.get()) } {
            0 => Ok(true),
            libc::EBUSY => Ok(false),
            rc => Err(rc),
        }
    }

    unsafe fn raw_unlock(&self) -> Result<(), c_int> {
        status(unsafe { libc::pthread_mutex_unlock(self.0.get()) })
    }
}

/// Lock a pthread mutex.
///
/// Checks the acquisition against the lock order seen so far, then calls
/// `pthread_mutex_lock`.
///
/// # Arguments
/// * `mutex` - Pointer to an initialized `pthread_mutex_t`.
///
/// # Returns
/// * The return value of `pthread_mutex_lock`
/// * `EINVAL` if the mutex pointer is NULL
///
/// # Safety
/// The caller must pass a valid pointer to an initialized `pthread_mutex_t`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lockdep_mutex_lock(mutex: *mut pthread_mutex_t) -> c_int {
    if mutex.is_null() {
        return libc::EINVAL;
    }
    let mutex = unsafe { PthreadMutex::from_ptr(mutex) };
    code(global_detector().acquire(mutex))
}

/// Try to lock a pthread mutex without blocking.
///
/// # Returns
/// * `0` if the lock was taken
/// * `EBUSY` if it is held elsewhere
/// * Any other error from `pthread_mutex_trylock`
/// * `EINVAL` if the mutex pointer is NULL
///
/// # Safety
/// The caller must pass a valid pointer to an initialized `pthread_mutex_t`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lockdep_mutex_trylock(mutex: *mut pthread_mutex_t) -> c_int {
    if mutex.is_null() {
        return libc::EINVAL;
    }
    let mutex = unsafe { PthreadMutex::from_ptr(mutex) };
    match global_detector().try_acquire(mutex) {
        Ok(true) => 0,
        Ok(false) => libc::EBUSY,
        Err(rc) => rc,
    }
}

/// Unlock a pthread mutex.
///
/// # Returns
/// * The return value of `pthread_mutex_unlock`
/// * `EINVAL` if the mutex pointer is NULL
///
/// # Safety
/// - The pointer must be valid (i.e., an initialized `pthread_mutex_t`).
/// - The mutex must have been locked by the current thread.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lockdep_mutex_unlock(mutex: *mut pthread_mutex_t) -> c_int {
    if mutex.is_null() {
        return libc::EINVAL;
    }
    let mutex = unsafe { PthreadMutex::from_ptr(mutex) };
    code(unsafe { global_detector().release(mutex) })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Detector, DetectorConfig};
    use std::ptr;

    #[test]
    fn test_null_mutex_is_rejected() {
        unsafe {
            assert_eq!(lockdep_mutex_lock(ptr::null_mut()), libc::EINVAL);
            assert_eq!(lockdep_mutex_trylock(ptr::null_mut()), libc::EINVAL);
            assert_eq!(lockdep_mutex_unlock(ptr::null_mut()), libc::EINVAL);
        }
    }

    #[test]
    fn test_lock_unlock_round_trip() {
        let mut raw = libc::PTHREAD_MUTEX_INITIALIZER;
        let ptr = &mut raw as *mut pthread_mutex_t;

        unsafe {
            assert_eq!(lockdep_mutex_lock(ptr), 0);
            assert_eq!(lockdep_mutex_unlock(ptr), 0);
            assert_eq!(lockdep_mutex_trylock(ptr), 0);
            assert_eq!(lockdep_mutex_unlock(ptr), 0);
        }
    }

    #[test]
    fn test_pthread_inversion_detected() {
        let detector = Detector::new(DetectorConfig {
            print_reports: false,
            ..DetectorConfig::default()
        });
        let mut raw_a = libc::PTHREAD_MUTEX_INITIALIZER;
        let mut raw_b = libc::PTHREAD_MUTEX_INITIALIZER;
        let ptr_a = &mut raw_a as *mut pthread_mutex_t;
        let a = unsafe { PthreadMutex::from_ptr(ptr_a) };
        let b = unsafe { PthreadMutex::from_ptr(&mut raw_b) };

        for (first, second) in [(a, b), (b, a)] {
            detector.acquire(first).unwrap();
            detector.acquire(second).unwrap();
            assert!(detector.is_held(second.handle()));
            unsafe {
                detector.release(second).unwrap();
                detector.release(first).unwrap();
            }
        }

        assert!(detector.is_deadlock_detected());
        assert_eq!(a.handle(), ptr_a as usize);
    }
}
