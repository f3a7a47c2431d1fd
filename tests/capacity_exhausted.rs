use lockdep::{Lockdep, Mutex};
use std::sync::Arc;
use std::thread;

#[test]
fn test_untracked_locks_still_lock() {
    let detector = Lockdep::new()
        .max_locks(2)
        .print_reports(false)
        .build()
        .expect("Failed to initialize detector");

    let a = Mutex::with_detector(1, detector.clone());
    let b = Mutex::with_detector(2, detector.clone());
    let c = Mutex::with_detector(3, detector.clone());

    {
        let _a = a.lock();
        let _b = b.lock();
        // Third identity does not fit: passed straight through
        let mut guard = c.lock();
        *guard += 1;
        assert!(!detector.is_held(c.handle()));
        assert!(detector.is_held(b.handle()));
    }
    assert_eq!(*c.lock(), 4);

    assert!(detector.lock_index(a.handle()).is_some());
    assert!(detector.lock_index(b.handle()).is_some());
    assert!(detector.lock_index(c.handle()).is_none());
    assert_eq!(detector.edge_count(), 1);

    // Inverting an untracked lock goes unnoticed
    {
        let _c = c.lock();
        let _a = a.lock();
    }
    assert!(!detector.is_deadlock_detected());
}

#[test]
fn test_untracked_threads_still_lock() {
    let detector = Lockdep::new()
        .max_threads(1)
        .print_reports(false)
        .build()
        .expect("Failed to initialize detector");

    let a = Arc::new(Mutex::with_detector(0, detector.clone()));
    let b = Arc::new(Mutex::with_detector(0, detector.clone()));

    {
        let _a = a.lock();
        let _b = b.lock();
    }
    assert_eq!(detector.current_thread_index(), Some(0));

    let (a2, b2, d2) = (a.clone(), b.clone(), detector.clone());
    thread::spawn(move || {
        let _b = b2.lock();
        let _a = a2.lock();
        assert_eq!(d2.current_thread_index(), None);
    })
    .join()
    .expect("Untracked thread panicked");

    assert!(!detector.is_deadlock_detected());
    assert_eq!(detector.edge_count(), 1);
}
