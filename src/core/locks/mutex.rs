use crate::core::detector::{Detector, global_detector};
use crate::core::locks::RawLock;
use crate::core::types::LockHandle;
use parking_lot::Mutex as ParkingLotMutex;
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

/// A mutex whose acquisitions are checked for lock-order cycles
///
/// Every `lock` goes through a [`Detector`] before it blocks, so taking two
/// of these mutexes in opposite orders on different threads is reported the
/// first time the second order is seen, whether or not the program actually
/// hangs.
///
/// The mutex's identity is its address: keep it in place (an `Arc`, a
/// `static`, a field that does not move) while it is being used.
///
/// # Example
///
/// ```rust
/// use lockdep::Mutex;
/// use std::sync::Arc;
/// use std::thread;
///
/// let mutex = Arc::new(Mutex::new(0));
/// let mutex_clone = Arc::clone(&mutex);
///
/// thread::spawn(move || {
///     *mutex_clone.lock() += 1;
/// })
/// .join()
/// .unwrap();
///
/// assert_eq!(*mutex.lock(), 1);
/// ```
pub struct Mutex<T> {
    /// Detector this mutex reports to
    detector: Arc<Detector>,
    /// The wrapped mutex
    inner: ParkingLotMutex<T>,
}

/// Guard for a [`Mutex`], releases the lock and its held mark when dropped
///
/// The guard is not `Send`: the detector's held-lock table is per thread, so a
/// lock must be released by the thread that took it.
pub struct MutexGuard<'a, T> {
    mutex: &'a Mutex<T>,
    _not_send: PhantomData<*const ()>,
}

// SAFETY: sharing a guard only hands out `&T`
unsafe impl<T: Sync> Sync for MutexGuard<'_, T> {}

impl<T> Mutex<T> {
    /// Create a mutex tracked by the process-wide detector
    pub fn new(value: T) -> Self {
        Self::with_detector(value, global_detector())
    }

    /// Create a mutex tracked by `detector`
    pub fn with_detector(value: T, detector: Arc<Detector>) -> Self {
        Mutex {
            detector,
            inner: ParkingLotMutex::new(value),
        }
    }

    /// Handle under which the detector knows this mutex
    pub fn handle(&self) -> LockHandle {
        self.raw().handle()
    }

    /// Acquire the lock, blocking until it is available
    ///
    /// The acquisition is checked against the lock order observed so far
    /// before blocking.
    pub fn lock(&self) -> MutexGuard<'_, T> {
        let Ok(()) = self.detector.acquire(self.raw());
        MutexGuard {
            mutex: self,
            _not_send: PhantomData,
        }
    }

    /// Try to acquire the lock without blocking
    pub fn try_lock(&self) -> Option<MutexGuard<'_, T>> {
        let Ok(acquired) = self.detector.try_acquire(self.raw());
        if !acquired {
            return None;
        }
        Some(MutexGuard {
            mutex: self,
            _not_send: PhantomData,
        })
    }

    /// Mutable access without locking, the borrow checker proves exclusivity
    pub fn get_mut(&mut self) -> &mut T {
        self.inner.get_mut()
    }

    pub fn into_inner(self) -> T {
        self.inner.into_inner()
    }

    fn raw(&self) -> &parking_lot::RawMutex {
        // SAFETY: the raw mutex is only locked through the detector and only
        // unlocked by a guard created by this type
        unsafe { self.inner.raw() }
    }
}

impl<T: Default> Default for Mutex<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T> Deref for MutexGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: the guard proves the lock is held
        unsafe { &*self.mutex.inner.data_ptr() }
    }
}

impl<T> DerefMut for MutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: the guard proves the lock is held
        unsafe { &mut *self.mutex.inner.data_ptr() }
    }
}

impl<T> Drop for MutexGuard<'_, T> {
    fn drop(&mut self) {
        // SAFETY: this guard was created by a successful acquisition on this thread
        let Ok(()) = unsafe { self.mutex.detector.release(self.mutex.raw()) };
    }
}
