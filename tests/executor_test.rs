/*!
 * Cancellable Executor Tests
 * Interrupt-or-complete execution of blocking calls on disposable workers
 */

use posix_compat::{
    CancelStrategy, CancellableExecutor, CompatConfig, CompatError, CompatResult, CompatStats,
    InterruptSignal,
};
use pretty_assertions::assert_eq;
use serial_test::serial;
use std::os::fd::AsRawFd;
use std::sync::Arc;
use std::time::{Duration, Instant};

fn executor(config: CompatConfig) -> CancellableExecutor {
    CancellableExecutor::new(config, Arc::new(CompatStats::new())).unwrap()
}

fn blocking_pipe_read() -> impl FnOnce() -> CompatResult<usize> + Send + 'static {
    let (reader, writer) = nix::unistd::pipe().unwrap();
    move || {
        // keep the write end alive so the read blocks
        let _writer = writer;
        let mut buf = [0u8; 16];
        Ok(nix::unistd::read(reader.as_raw_fd(), &mut buf)?)
    }
}

#[test]
fn test_completed_operation_result_unmodified() {
    let executor = executor(CompatConfig::new());
    let interrupt = InterruptSignal::new();

    let value = executor
        .run_cancellable(|| Ok(String::from("done")), &interrupt, CancelStrategy::forced())
        .unwrap();
    assert_eq!(value, "done");

    let err = executor
        .run_cancellable::<(), _>(|| Err(CompatError::WouldBlock), &interrupt, CancelStrategy::forced())
        .unwrap_err();
    assert_eq!(err, CompatError::WouldBlock);
}

#[test]
#[serial]
fn test_interrupted_read_then_executor_reused() {
    let executor = executor(CompatConfig::new());

    let interrupt = InterruptSignal::new();
    let raiser = {
        let interrupt = interrupt.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(30));
            interrupt.raise();
        })
    };
    let err = executor
        .run_cancellable(blocking_pipe_read(), &interrupt, CancelStrategy::forced())
        .unwrap_err();
    raiser.join().unwrap();
    assert_eq!(err, CompatError::Interrupted);

    // a fresh operation still runs to completion
    interrupt.clear();
    let value = executor
        .run_cancellable(|| Ok(5u8), &interrupt, CancelStrategy::forced())
        .unwrap();
    assert_eq!(value, 5);

    let stats = executor.stats().snapshot();
    assert_eq!(stats.workers_spawned, 2);
    assert_eq!(stats.forced_terminations, 1);
    assert_eq!(stats.interrupts, 1);
}

#[test]
#[serial]
fn test_unresponsive_worker_is_abandoned() {
    let config = CompatConfig {
        termination_grace: Duration::from_millis(20),
        ..CompatConfig::new()
    };
    let executor = executor(config);
    let interrupt = InterruptSignal::with_timeout(Duration::from_millis(20));

    // std's sleep resumes after EINTR, so the signal cannot stop it
    let started = Instant::now();
    let err = executor
        .run_cancellable(
            || {
                std::thread::sleep(Duration::from_secs(2));
                Ok(())
            },
            &interrupt,
            CancelStrategy::forced(),
        )
        .unwrap_err();

    assert_eq!(err, CompatError::Interrupted);
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(executor.stats().snapshot().leaked_stacks, 1);
}

#[test]
#[serial]
fn test_graceful_cancel_escalates() {
    let config = CompatConfig {
        cancel_grace: Duration::from_millis(20),
        ..CompatConfig::new()
    };
    let executor = executor(config);
    let interrupt = InterruptSignal::with_timeout(Duration::from_millis(20));

    let err = executor
        .run_cancellable(
            blocking_pipe_read(),
            &interrupt,
            CancelStrategy::graceful(|| -> CompatResult<()> { Ok(()) }),
        )
        .unwrap_err();
    assert_eq!(err, CompatError::Interrupted);

    let stats = executor.stats().snapshot();
    assert_eq!(stats.graceful_cancels, 1);
    assert_eq!(stats.forced_terminations, 1);
    assert_eq!(stats.leaked_stacks, 0);
}

#[test]
#[should_panic(expected = "worker exploded")]
fn test_worker_panic_resumes_on_caller() {
    let executor = executor(CompatConfig::new());
    let _ = executor.run_cancellable::<(), _>(
        || panic!("worker exploded"),
        &InterruptSignal::new(),
        CancelStrategy::forced(),
    );
}

#[test]
fn test_invalid_signal_rejected() {
    let config = CompatConfig {
        termination_signal: "SIGNOPE".to_string(),
        ..CompatConfig::new()
    };
    let result = CancellableExecutor::new(config, Arc::new(CompatStats::new()));
    assert!(matches!(result, Err(CompatError::InvalidArgument(_))));
}
