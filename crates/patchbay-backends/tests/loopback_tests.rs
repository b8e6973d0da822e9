//! Loopback backend tests
//!
//! Loopback instances loaded from configuration text, chained mappings and
//! routing loops through a loopback.

use patchbay_backends::register_builtin;
use patchbay_config::ConfigLoader;
use patchbay_core::{ChannelValue, Engine, SWAP_LIMIT};
use patchbay_test_utils::{register_mock, run_iterations, MockBackend, MockHandle};
use std::time::Duration;

fn engine_with(config: &str) -> (Engine, MockHandle) {
    let mut engine = Engine::new();
    assert_eq!(register_builtin(&mut engine).unwrap(), 1);
    let (mock, _) = MockBackend::new("mock");
    let handle = register_mock(&mut engine, mock.with_interval(Duration::from_millis(5)));
    ConfigLoader::new(&mut engine).load_str(config).unwrap();
    (engine, handle)
}

#[test]
fn test_builtin_registration() {
    let mut engine = Engine::new();
    register_builtin(&mut engine).unwrap();
    assert!(engine.backend_id("loopback").is_some());
    assert!(register_builtin(&mut engine).is_err());
}

#[test]
fn test_chain_through_loopback() {
    let (mut engine, sink) = engine_with(
        "
[loopback lo]
[mock src]
[mock dst]

[map]
src.1 > lo.fader
lo.fader > dst.{1..3}
",
    );
    let src = engine.core().instance_by_name("src").unwrap();
    let dst = engine.core().instance_by_name("dst").unwrap();

    let channel = engine.core_mut().channel(src, 1, false).unwrap();
    engine
        .core_mut()
        .emit(channel, ChannelValue::from_u64(64, 128))
        .unwrap();
    let report = engine.drain().unwrap();

    assert_eq!(report.swaps, 2);
    assert_eq!(report.delivered, 4);

    let handled = sink.handled();
    assert_eq!(handled.len(), 1);
    assert_eq!(handled[0].0, dst);
    assert_eq!(handled[0].1.len(), 3);
    for event in &handled[0].1 {
        assert_eq!(event.value.normalised, 0.5);
    }
}

#[test]
fn test_loopback_cycle_is_cut_by_swap_limit() {
    let (mut engine, _) = engine_with(
        "
[loopback a]
[loopback b]
[mock src]

[map]
src.1 > a.x
a.x <> b.x
",
    );
    let src = engine.core().instance_by_name("src").unwrap();
    let channel = engine.core_mut().channel(src, 1, false).unwrap();

    engine
        .core_mut()
        .emit(channel, ChannelValue::new(1.0))
        .unwrap();
    let report = engine.drain().unwrap();

    assert_eq!(report.swaps, SWAP_LIMIT);
    assert!(report.limit_hit());
    assert_eq!(engine.core().pending_events(), 0);
}

#[tokio::test]
async fn test_loopback_in_reactor() {
    let (mut engine, sink) = engine_with(
        "
[loopback lo]
[mock src]
[mock dst]

[map]
src.7 > lo.a
lo.a > dst.9
",
    );
    engine.start().unwrap();

    let src = engine.core().instance_by_name("src").unwrap();
    let channel = engine.core_mut().channel(src, 7, false).unwrap();
    engine
        .core_mut()
        .emit(channel, ChannelValue::new(0.25))
        .unwrap();

    let reports = run_iterations(&mut engine, 1).await.unwrap();
    assert_eq!(reports[0].delivered, 2);
    assert_eq!(sink.handle_calls(), 1);

    engine.shutdown();
    assert_eq!(sink.shutdown_calls(), 1);
}
