//! Reactor tests
//!
//! Tests for the descriptor reactor including:
//! - Interval-driven liveness without descriptors
//! - Readiness delivery for managed descriptors
//! - Level-triggered readiness for partially read descriptors
//! - Process dispatch rules
//! - Descriptor release and the shutdown flag

use patchbay_core::{Engine, EngineState, Error, ManagedFd};
use patchbay_test_utils::{
    instance, map, register_mock, run_for, run_iterations, run_until, value, MockBackend,
    DEFAULT_TIMEOUT,
};
use std::io::{ErrorKind, Read, Write};
use std::os::fd::AsRawFd;
use std::os::unix::net::UnixStream;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Read everything available on `stream`, returning the bytes read
fn drain_stream(mut stream: &UnixStream) -> std::io::Result<Vec<u8>> {
    let mut data = Vec::new();
    let mut buf = [0u8; 64];
    loop {
        match stream.read(&mut buf) {
            Ok(0) => return Ok(data),
            Ok(n) => data.extend_from_slice(&buf[..n]),
            Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(data),
            Err(e) => return Err(e),
        }
    }
}

#[tokio::test]
async fn test_interval_keeps_backend_alive_without_descriptors() {
    let mut engine = Engine::new();
    let (backend, _) = MockBackend::new("ticker");
    let ticker = register_mock(&mut engine, backend.with_interval(Duration::from_millis(20)));
    instance(&mut engine, "ticker", "t");
    engine.start().unwrap();

    let started = Instant::now();
    run_iterations(&mut engine, 3).await.unwrap();
    let elapsed = started.elapsed();

    assert_eq!(ticker.process_calls(), 3);
    assert!(elapsed >= Duration::from_millis(60), "iterations returned early: {:?}", elapsed);
    assert!(elapsed < Duration::from_secs(1), "interval ignored: {:?}", elapsed);
    assert!(engine.core().timestamp() >= 60);
}

#[tokio::test]
async fn test_process_called_every_interval() {
    let mut engine = Engine::new();
    let (backend, _) = MockBackend::new("ticker");
    let ticker = register_mock(&mut engine, backend.with_interval(Duration::from_millis(20)));
    instance(&mut engine, "ticker", "t");
    engine.start().unwrap();

    run_for(&mut engine, Duration::from_millis(200)).await.unwrap();

    let times = ticker.process_times();
    assert!(times.len() >= 5, "only {} process calls", times.len());
    for pair in times.windows(2) {
        assert!(pair[1] - pair[0] < Duration::from_millis(500));
    }
}

#[tokio::test]
async fn test_signaled_descriptor_reaches_its_backend() {
    let (reader, mut writer) = UnixStream::pair().unwrap();
    reader.set_nonblocking(true).unwrap();
    let fd = reader.as_raw_fd();

    let received = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let sink = received.clone();

    let (backend, _) = MockBackend::new("io");
    let backend = backend
        .on_start(move |core, _| core.manage_fd(fd, "io", true, 7))
        .on_process(move |_, signaled| {
            if !signaled.is_empty() {
                sink.lock().extend(drain_stream(&reader)?);
            }
            Ok(())
        });

    let mut engine = Engine::new();
    let io = register_mock(&mut engine, backend);
    instance(&mut engine, "io", "port");
    engine.start().unwrap();
    assert_eq!(engine.core().fds().len(), 1);

    writer.write_all(b"ping").unwrap();

    let started = Instant::now();
    run_iterations(&mut engine, 1).await.unwrap();
    assert!(started.elapsed() < Duration::from_millis(500));
    assert_eq!(engine.registered_descriptors(), 1);

    let signaled = io.signaled();
    assert_eq!(signaled.len(), 1);
    assert_eq!(
        signaled[0],
        ManagedFd {
            fd,
            backend: engine.backend_id("io").unwrap(),
            context: 7,
        }
    );
    assert_eq!(received.lock().as_slice(), b"ping");
}

#[tokio::test]
async fn test_partially_read_descriptor_is_signaled_again() {
    let (reader, mut writer) = UnixStream::pair().unwrap();
    reader.set_nonblocking(true).unwrap();
    let fd = reader.as_raw_fd();

    let received = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let sink = received.clone();

    let (backend, _) = MockBackend::new("io");
    let backend = backend
        .with_interval(Duration::from_millis(200))
        .on_start(move |core, _| core.manage_fd(fd, "io", true, 0))
        .on_process(move |_, signaled| {
            if signaled.is_empty() {
                return Ok(());
            }
            let mut byte = [0u8; 1];
            match (&reader).read(&mut byte) {
                Ok(n) => sink.lock().extend_from_slice(&byte[..n]),
                Err(e) if e.kind() == ErrorKind::WouldBlock => {}
                Err(e) => return Err(e.into()),
            }
            Ok(())
        });

    let mut engine = Engine::new();
    let io = register_mock(&mut engine, backend);
    instance(&mut engine, "io", "port");
    engine.start().unwrap();

    writer.write_all(b"ab").unwrap();

    let started = Instant::now();
    run_iterations(&mut engine, 2).await.unwrap();
    assert!(started.elapsed() < Duration::from_millis(150), "waited with input pending");
    assert_eq!(received.lock().as_slice(), b"ab");
    assert_eq!(io.signaled().len(), 2);

    // drained: the next iteration waits out the interval unsignaled
    run_iterations(&mut engine, 1).await.unwrap();
    assert_eq!(io.signaled().len(), 2);
    assert_eq!(io.process_calls(), 3);
}

#[tokio::test]
async fn test_wakeup_from_worker_thread() {
    let (reader, writer) = UnixStream::pair().unwrap();
    reader.set_nonblocking(true).unwrap();
    let fd = reader.as_raw_fd();

    let (backend, _) = MockBackend::new("io");
    let backend = backend
        .on_start(move |core, _| core.manage_fd(fd, "io", true, 0))
        .on_process(move |_, _| {
            drain_stream(&reader)?;
            Ok(())
        });

    let mut engine = Engine::new();
    let io = register_mock(&mut engine, backend);
    instance(&mut engine, "io", "port");
    engine.start().unwrap();

    let worker = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(30));
        (&writer).write_all(b"x").unwrap();
        writer
    });

    let woke = run_until(&mut engine, |_| !io.signaled().is_empty(), DEFAULT_TIMEOUT)
        .await
        .unwrap();
    assert!(woke, "descriptor never signaled");
    drop(worker.join().unwrap());
}

#[tokio::test]
async fn test_input_is_routed_in_same_iteration() {
    let (reader, mut writer) = UnixStream::pair().unwrap();
    reader.set_nonblocking(true).unwrap();
    let fd = reader.as_raw_fd();

    let (source, _) = MockBackend::new("io");
    let source = source
        .on_start(move |core, _| core.manage_fd(fd, "io", true, 0))
        .on_process(move |core, signaled| {
            if signaled.is_empty() {
                return Ok(());
            }
            let instance = core.backend_instances("io")?[0];
            let channel = core.channel(instance, 1, false)?;
            for byte in drain_stream(&reader)? {
                core.emit(channel, patchbay_core::ChannelValue::from_u64(byte as u64, 255))?;
            }
            Ok(())
        });
    let (sink, _) = MockBackend::new("sink");

    let mut engine = Engine::new();
    register_mock(&mut engine, source);
    let sink = register_mock(&mut engine, sink.with_interval(Duration::from_millis(50)));
    let port = instance(&mut engine, "io", "port");
    let out = instance(&mut engine, "sink", "out");
    map(&mut engine, (port, "1"), (out, "9"));
    engine.start().unwrap();

    writer.write_all(&[255, 0]).unwrap();
    let reports = run_iterations(&mut engine, 1).await.unwrap();
    assert_eq!(reports[0].delivered, 2);

    let handled = sink.handled();
    assert_eq!(handled.len(), 1);
    let values: Vec<_> = handled[0].1.iter().map(|e| e.value.normalised).collect();
    assert_eq!(values, vec![1.0, 0.0]);
}

#[tokio::test]
async fn test_backend_without_instances_not_processed() {
    let mut engine = Engine::new();
    let (busy, _) = MockBackend::new("busy");
    let (idle, _) = MockBackend::new("idle");
    let busy = register_mock(&mut engine, busy.with_interval(Duration::from_millis(10)));
    let idle = register_mock(&mut engine, idle);
    instance(&mut engine, "busy", "b");
    engine.start().unwrap();

    run_iterations(&mut engine, 2).await.unwrap();
    assert_eq!(busy.process_calls(), 2);
    assert_eq!(idle.process_calls(), 0);
}

#[tokio::test]
async fn test_process_error_is_fatal() {
    let mut engine = Engine::new();
    let (backend, _) = MockBackend::new("broken");
    let backend = backend
        .with_interval(Duration::from_millis(10))
        .on_process(|_, _| Err(Error::Backend("device unplugged".to_string())));
    register_mock(&mut engine, backend);
    instance(&mut engine, "broken", "b");
    engine.start().unwrap();

    let result = engine.iteration().await;
    assert!(matches!(result, Err(Error::Backend(reason)) if reason == "device unplugged"));
}

#[tokio::test]
async fn test_released_descriptor_leaves_readiness_set() {
    let (reader, _writer) = UnixStream::pair().unwrap();
    reader.set_nonblocking(true).unwrap();
    let fd = reader.as_raw_fd();

    let (backend, _) = MockBackend::new("io");
    let backend = backend
        .with_interval(Duration::from_millis(10))
        .on_start(move |core, _| core.manage_fd(fd, "io", true, 0));

    let mut engine = Engine::new();
    register_mock(&mut engine, backend);
    instance(&mut engine, "io", "port");
    engine.start().unwrap();

    run_iterations(&mut engine, 1).await.unwrap();
    assert_eq!(engine.registered_descriptors(), 1);

    engine.core_mut().manage_fd(fd, "io", false, 0).unwrap();
    assert!(engine.core().fds().is_empty());

    run_iterations(&mut engine, 1).await.unwrap();
    assert_eq!(engine.registered_descriptors(), 0);
    drop(reader);
}

#[tokio::test]
async fn test_manage_fd_unknown_backend() {
    let mut engine = Engine::new();
    let result = engine.core_mut().manage_fd(0, "ghost", true, 0);
    assert!(matches!(result, Err(Error::UnknownBackend(_))));
}

#[tokio::test]
async fn test_run_until_shutdown_flag() {
    let shutdown = Arc::new(AtomicBool::new(false));
    let calls = Arc::new(AtomicUsize::new(0));

    let flag = shutdown.clone();
    let counter = calls.clone();
    let (backend, _) = MockBackend::new("ticker");
    let backend = backend
        .with_interval(Duration::from_millis(5))
        .on_process(move |core, _| {
            if counter.fetch_add(1, Ordering::SeqCst) == 2 {
                flag.store(true, Ordering::SeqCst);
            }
            let instance = core.backend_instances("ticker")?[0];
            let channel = core.channel(instance, 1, false)?;
            core.emit(channel, value(0.5))
        });

    let mut engine = Engine::new();
    register_mock(&mut engine, backend);
    let (sink, _) = MockBackend::new("sink");
    let sink = register_mock(&mut engine, sink);
    let t = instance(&mut engine, "ticker", "t");
    let s = instance(&mut engine, "sink", "s");
    map(&mut engine, (t, "1"), (s, "1"));

    engine.run(&shutdown).await.unwrap();

    assert_eq!(engine.state(), EngineState::Running);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(sink.handle_calls(), 3);

    engine.shutdown();
    assert_eq!(sink.shutdown_calls(), 1);
}
