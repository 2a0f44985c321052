use std::panic;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Mutex};
use std::thread;

use errly_core::scope::{run_in_capture_scope, CaptureSlot};
use errly_core::{ExceptionParsed, Integration, LifecycleState, SetupContext};
use errly_panic::PanicHookIntegration;
use serial_test::serial;

static HOST_HOOK_CALLS: AtomicUsize = AtomicUsize::new(0);

/// Installs a counting hook standing in for the application's own hook.
fn install_host_hook() {
    HOST_HOOK_CALLS.store(0, Ordering::SeqCst);
    panic::set_hook(Box::new(|_| {
        HOST_HOOK_CALLS.fetch_add(1, Ordering::SeqCst);
    }));
}

fn reset_hook() {
    drop(panic::take_hook());
}

fn recording_context() -> (SetupContext, Arc<Mutex<Vec<ExceptionParsed>>>) {
    let received = Arc::new(Mutex::new(Vec::new()));
    let sink = received.clone();
    let context = SetupContext::new("https://errly.test", "key").with_subscriber(Arc::new(
        move |event: &ExceptionParsed| -> anyhow::Result<()> {
            sink.lock().unwrap().push(event.clone());
            Ok(())
        },
    ));
    (context, received)
}

#[inline(never)]
fn divide(a: i32, b: i32) -> i32 {
    if b == 0 {
        panic!("division by zero");
    }
    a / b
}

#[test]
#[serial]
fn test_setup_twice_installs_hook_once() {
    install_host_hook();
    let integration = PanicHookIntegration::new();
    let (context, received) = recording_context();

    assert_eq!(integration.setup(&context), LifecycleState::Initialized);
    assert_eq!(integration.setup(&context), LifecycleState::Initialized);

    let _ = panic::catch_unwind(|| divide(1, 0));

    assert_eq!(received.lock().unwrap().len(), 1);
    assert_eq!(HOST_HOOK_CALLS.load(Ordering::SeqCst), 1);

    integration.revert();
    reset_hook();
}

#[test]
#[serial]
fn test_revert_restores_previous_hook() {
    install_host_hook();
    let integration = PanicHookIntegration::new();
    let (context, received) = recording_context();
    integration.setup(&context);

    assert_eq!(integration.revert(), LifecycleState::Uninitialized);
    let _ = panic::catch_unwind(|| divide(1, 0));

    assert!(received.lock().unwrap().is_empty());
    assert_eq!(HOST_HOOK_CALLS.load(Ordering::SeqCst), 1);
    assert!(integration.parsed_events().is_empty());

    reset_hook();
}

#[test]
#[serial]
fn test_revert_is_idempotent() {
    let integration = PanicHookIntegration::new();
    let (context, _) = recording_context();
    integration.setup(&context);

    assert_eq!(integration.revert(), LifecycleState::Uninitialized);
    assert_eq!(integration.revert(), LifecycleState::Uninitialized);

    let never_set_up = PanicHookIntegration::new();
    assert_eq!(never_set_up.revert(), LifecycleState::Uninitialized);

    reset_hook();
}

#[test]
#[serial]
fn test_only_one_instance_owns_the_hook() {
    let first = PanicHookIntegration::new();
    let second = PanicHookIntegration::new();
    let (context, _) = recording_context();

    assert_eq!(first.setup(&context), LifecycleState::Initialized);
    assert_eq!(second.setup(&context), LifecycleState::Uninitialized);

    first.revert();
    assert_eq!(second.setup(&context), LifecycleState::Initialized);
    second.revert();

    reset_hook();
}

#[test]
#[serial]
fn test_panic_is_parsed_with_location() {
    install_host_hook();
    let integration = PanicHookIntegration::new();
    let (context, received) = recording_context();
    integration.setup(&context);

    let _ = panic::catch_unwind(|| divide(10, 0));
    integration.revert();
    reset_hook();

    let received = received.lock().unwrap();
    let data = &received[0].data;
    assert_eq!(data.message(), "division by zero");
    assert_eq!(data.exception_type(), Some("panic"));

    let innermost = data.innermost_frame().expect("panic location frame");
    assert!(innermost.filename().ends_with("panic_hook_tests.rs"));
    assert!(innermost.line_number() > 0);
    assert!(data
        .frames()
        .iter()
        .all(|frame| !frame.filename().starts_with("/rustc/")));
}

#[test]
#[serial]
fn test_formatted_panic_message_is_captured() {
    install_host_hook();
    let integration = PanicHookIntegration::new();
    let (context, received) = recording_context();
    integration.setup(&context);

    let order_id = 42;
    let _ = panic::catch_unwind(|| panic!("order {} not found", order_id));
    integration.revert();
    reset_hook();

    assert_eq!(received.lock().unwrap()[0].data.message(), "order 42 not found");
}

#[tokio::test]
#[serial]
async fn test_panic_inside_capture_scope_is_parked() {
    install_host_hook();
    let integration = PanicHookIntegration::new();
    let (context, received) = recording_context();
    integration.setup(&context);

    let slot = CaptureSlot::default();
    run_in_capture_scope(slot.clone(), async {
        let _ = panic::catch_unwind(|| divide(3, 0));
    })
    .await;

    integration.revert();
    reset_hook();

    assert!(received.lock().unwrap().is_empty());
    assert_eq!(HOST_HOOK_CALLS.load(Ordering::SeqCst), 1);
    let parked = slot.lock().unwrap().take().expect("parked exception");
    assert_eq!(parked.value(), "division by zero");
}

#[test]
#[serial]
fn test_concurrent_setup_installs_hook_once() {
    install_host_hook();
    let integration = Arc::new(PanicHookIntegration::new());
    let (context, received) = recording_context();
    let barrier = Arc::new(Barrier::new(8));

    let workers: Vec<_> = (0..8)
        .map(|_| {
            let integration = integration.clone();
            let context = context.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                integration.setup(&context)
            })
        })
        .collect();
    for worker in workers {
        assert_eq!(worker.join().unwrap(), LifecycleState::Initialized);
    }
    assert_eq!(integration.parsed_events().len(), 1);

    let _ = panic::catch_unwind(|| divide(1, 0));
    assert_eq!(received.lock().unwrap().len(), 1);
    assert_eq!(HOST_HOOK_CALLS.load(Ordering::SeqCst), 1);

    integration.revert();
    let _ = panic::catch_unwind(|| divide(1, 0));
    assert_eq!(received.lock().unwrap().len(), 1);
    assert_eq!(HOST_HOOK_CALLS.load(Ordering::SeqCst), 2);

    reset_hook();
}

#[test]
#[serial]
fn test_concurrent_instances_elect_a_single_owner() {
    install_host_hook();
    let (context, received) = recording_context();
    let instances: Vec<Arc<PanicHookIntegration>> =
        (0..8).map(|_| Arc::new(PanicHookIntegration::new())).collect();
    let barrier = Arc::new(Barrier::new(instances.len()));

    let workers: Vec<_> = instances
        .iter()
        .cloned()
        .map(|integration| {
            let context = context.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                integration.setup(&context)
            })
        })
        .collect();
    let states: Vec<LifecycleState> = workers
        .into_iter()
        .map(|worker| worker.join().unwrap())
        .collect();

    let owners = states
        .iter()
        .filter(|state| **state == LifecycleState::Initialized)
        .count();
    assert_eq!(owners, 1);

    let _ = panic::catch_unwind(|| divide(1, 0));
    assert_eq!(received.lock().unwrap().len(), 1);
    assert_eq!(HOST_HOOK_CALLS.load(Ordering::SeqCst), 1);

    for integration in &instances {
        integration.revert();
    }
    let _ = panic::catch_unwind(|| divide(1, 0));
    assert_eq!(received.lock().unwrap().len(), 1);
    assert_eq!(HOST_HOOK_CALLS.load(Ordering::SeqCst), 2);

    let next = PanicHookIntegration::new();
    assert_eq!(next.setup(&context), LifecycleState::Initialized);
    next.revert();

    reset_hook();
}

#[test]
#[serial]
fn test_panicking_subscriber_does_not_abort_the_host() {
    install_host_hook();
    let integration = PanicHookIntegration::new();
    let (context, received) = recording_context();
    let context = SetupContext::new("https://errly.test", "key")
        .with_subscriber(Arc::new(
            |_: &ExceptionParsed| -> anyhow::Result<()> { panic!("subscriber failed") },
        ))
        .with_subscriber(context.subscribers[0].clone());
    integration.setup(&context);

    let outcome = panic::catch_unwind(|| divide(5, 0));
    integration.revert();
    reset_hook();

    assert!(outcome.is_err());
    let received = received.lock().unwrap();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].data.message(), "division by zero");
}
