pub mod mutex;

use crate::core::types::{LockHandle, lock_handle_of};
use parking_lot::lock_api::RawMutex as _;
use std::convert::Infallible;

/// The real mutual-exclusion primitive behind the instrumented facade
///
/// The detector never interprets a primitive's status; it only needs to know
/// whether an operation succeeded so it can keep the held-lock table honest.
pub trait RawLock {
    /// Failure reported by the primitive itself
    type Error;

    /// Acquire the lock, blocking if necessary
    fn raw_lock(&self) -> Result<(), Self::Error>;

    /// Acquire the lock if it is free
    ///
    /// # Returns
    /// `Ok(true)` if the lock was taken, `Ok(false)` if it is busy
    fn raw_try_lock(&self) -> Result<bool, Self::Error>;

    /// Release the lock
    ///
    /// # Safety
    /// The lock must be held by the calling thread.
    unsafe fn raw_unlock(&self) -> Result<(), Self::Error>;

    /// Identity of this primitive as seen by the detector
    ///
    /// Defaults to the primitive's address, so a primitive must not move while
    /// it is in use.
    fn handle(&self) -> LockHandle {
        lock_handle_of(self)
    }
}

impl RawLock for parking_lot::RawMutex {
    type Error = Infallible;

    fn raw_lock(&self) -> Result<(), Infallible> {
        self.lock();
        Ok(())
    }

    fn raw_try_lock(&self) -> Result<bool, Infallible> {
        Ok(self.try_lock())
    }

    unsafe fn raw_unlock(&self) -> Result<(), Infallible> {
        unsafe { self.unlock() };
        Ok(())
    }
}
