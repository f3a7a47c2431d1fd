use anyhow::Result;
use clap::Parser;
use lockdep::{Lockdep, Mutex};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Two threads taking two locks in opposite orders, watched by lockdep"
)]
struct Cli {
    /// Iterations per thread
    #[arg(long, default_value_t = 5)]
    loops: usize,

    /// Pause between lock operations, in milliseconds
    #[arg(long, default_value_t = 100)]
    delay_ms: u64,

    /// Give up waiting for the threads after this many seconds
    #[arg(long, default_value_t = 10)]
    timeout_secs: u64,

    /// Attach a call stack to every recorded dependency
    #[arg(long)]
    capture_call_stacks: bool,

    /// Write a JSON-lines event log to this path
    #[arg(long)]
    log: Option<PathBuf>,
}

fn task(
    name: &'static str,
    first: Arc<Mutex<()>>,
    second: Arc<Mutex<()>>,
    cli: &Cli,
) -> thread::JoinHandle<()> {
    let loops = cli.loops;
    let delay = Duration::from_millis(cli.delay_ms);
    thread::spawn(move || {
        println!("task {name} started");
        for i in 0..loops {
            let outer = first.lock();
            thread::sleep(delay);
            let inner = second.lock();
            println!("task {name} in loop {i}");
            thread::sleep(delay);
            drop(inner);
            thread::sleep(delay);
            drop(outer);
            thread::sleep(delay);
        }
    })
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut builder = Lockdep::new().capture_call_stacks(cli.capture_call_stacks);
    if let Some(path) = &cli.log {
        builder = builder.with_log(path);
    }
    builder.start()?;

    let mutex1 = Arc::new(Mutex::new(()));
    let mutex2 = Arc::new(Mutex::new(()));

    let handles = [
        task("A", Arc::clone(&mutex1), Arc::clone(&mutex2), &cli),
        task("B", Arc::clone(&mutex2), Arc::clone(&mutex1), &cli),
    ];

    let deadline = Instant::now() + Duration::from_secs(cli.timeout_secs);
    while !handles.iter().all(|h| h.is_finished()) && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(50));
    }

    let detector = lockdep::global_detector();
    detector.flush_logs()?;

    if !handles.iter().all(|h| h.is_finished()) {
        println!("threads still blocked after {}s", cli.timeout_secs);
        println!("{}", detector.report());
    }
    if detector.is_deadlock_detected() {
        std::process::exit(1);
    }
    Ok(())
}
