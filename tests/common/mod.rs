use lockdep::{DeadlockInfo, Detector, Lockdep, ReportPolicy};
use std::sync::{Arc, Mutex as StdMutex, mpsc};
use std::time::Duration;

#[allow(dead_code)]
pub const DEADLOCK_TIMEOUT: Duration = Duration::from_secs(3);
#[allow(dead_code)]
pub const NO_DEADLOCK_TIMEOUT: Duration = Duration::from_millis(300);

pub struct DetectorHarness {
    pub detector: Arc<Detector>,
    pub rx: mpsc::Receiver<DeadlockInfo>,
    pub detected: Arc<StdMutex<bool>>,
}

fn harness_with(builder: Lockdep) -> DetectorHarness {
    let (tx, rx) = mpsc::channel::<DeadlockInfo>();
    let tx = StdMutex::new(tx);
    let detected = Arc::new(StdMutex::new(false));
    let flag = Arc::clone(&detected);

    let detector = builder
        .callback(move |info| {
            *flag.lock().unwrap() = true;
            let _ = tx.lock().unwrap().send(info);
        })
        .build()
        .expect("Failed to initialize detector");

    DetectorHarness {
        detector,
        rx,
        detected,
    }
}

/// Fresh detector with default settings, reporting through a channel
#[allow(dead_code)]
pub fn start_detector() -> DetectorHarness {
    harness_with(Lockdep::new())
}

/// Fresh detector that reports every new cycle
#[allow(dead_code)]
pub fn start_detector_every_cycle() -> DetectorHarness {
    harness_with(Lockdep::new().report_policy(ReportPolicy::EveryCycle))
}

#[allow(dead_code)]
pub fn expect_deadlock(h: &DetectorHarness, timeout: Duration) -> DeadlockInfo {
    match h.rx.recv_timeout(timeout) {
        Ok(info) => {
            assert!(*h.detected.lock().unwrap(), "Deadlock flag should be set");
            assert!(h.detector.is_deadlock_detected());
            info
        }
        Err(_) => panic!("No deadlock detected within {timeout:?}"),
    }
}

#[allow(dead_code)]
pub fn assert_no_deadlock(h: &DetectorHarness, timeout: Duration) {
    assert!(
        h.rx.recv_timeout(timeout).is_err(),
        "Unexpected deadlock detected"
    );
    assert!(
        !*h.detected.lock().unwrap(),
        "Deadlock flag should not be set"
    );
}
