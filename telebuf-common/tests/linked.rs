use std::sync::Arc;
use std::thread;

use telebuf_common::{
    BufferError, LinkedVariableFactory, Registry, SampleData, SharedBuffer, UserId, Value,
    ValueType, Variable, VariableKind, WindowRequest,
};

struct Fixture {
    root: Registry,
    x: Arc<Variable>,
    buffer: SharedBuffer,
}

fn fixture() -> Fixture {
    let root = Registry::new("root").unwrap();
    let robot = root.add_child("robot").unwrap();
    let x = robot.add_variable("x", VariableKind::Double).unwrap();
    robot.add_variable("mode", VariableKind::enumeration(["IDLE", "RUN"], false).unwrap())
        .unwrap();
    let buffer = SharedBuffer::new(root.clone(), 16);
    Fixture { root, x, buffer }
}

fn consumer_variable(name: &str, kind: VariableKind) -> Arc<Variable> {
    let root = Registry::new("root").unwrap();
    let robot = root.add_child("robot").unwrap();
    robot.add_variable(name, kind).unwrap()
}

#[test]
fn test_push_is_applied_once_at_next_cycle() {
    let mut f = fixture();
    let local = consumer_variable("x", VariableKind::Double);
    let linked = f.buffer.factory().new_linked_variable(&local, None).unwrap().unwrap();

    // 1. Consumer stages a value
    local.set_value(Value::Double(1.5)).unwrap();
    linked.push();
    linked.push();

    // 2. Manager commits it and records it at the current index
    assert!(f.buffer.process_linked_push_requests(true));
    assert_eq!(f.x.value(), Value::Double(1.5));
    let columns = f.buffer.active_window_columns();
    let x_column = columns.iter().find(|c| c.name == "root.robot.x").unwrap();
    assert_eq!(x_column.data, SampleData::Double(vec![1.5]));

    // 3. Nothing left for the following cycle
    assert!(!f.buffer.process_linked_push_requests(true));
}

#[test]
fn test_push_without_write_leaves_buffer_untouched() {
    let mut f = fixture();
    let local = consumer_variable("x", VariableKind::Double);
    let linked = f.buffer.factory().new_linked_variable(&local, None).unwrap().unwrap();

    local.set_value(Value::Double(2.0)).unwrap();
    linked.push();
    assert!(f.buffer.process_linked_push_requests(false));
    assert_eq!(f.x.value(), Value::Double(2.0));

    let columns = f.buffer.active_window_columns();
    let x_column = columns.iter().find(|c| c.name == "root.robot.x").unwrap();
    assert_eq!(x_column.data, SampleData::Double(vec![0.0]));
}

#[test]
fn test_push_of_unchanged_value_reports_nothing() {
    let mut f = fixture();
    let local = consumer_variable("x", VariableKind::Double);
    let linked = f.buffer.factory().new_linked_variable(&local, None).unwrap().unwrap();

    linked.push();
    assert!(!f.buffer.process_linked_push_requests(true));
}

#[test]
fn test_flush_discards_staged_pushes() {
    let mut f = fixture();
    let local = consumer_variable("x", VariableKind::Double);
    let linked = f.buffer.factory().new_linked_variable(&local, None).unwrap().unwrap();

    local.set_value(Value::Double(9.0)).unwrap();
    linked.push();
    f.buffer.flush_linked_push_requests();
    assert!(!f.buffer.process_linked_push_requests(true));
    assert_eq!(f.x.value(), Value::Double(0.0));

    // A later push is still delivered
    linked.push();
    assert!(f.buffer.process_linked_push_requests(true));
}

#[test]
fn test_pull_is_consumed_once() {
    let mut f = fixture();
    let local = consumer_variable("x", VariableKind::Double);
    let linked = f.buffer.factory().new_linked_variable(&local, None).unwrap().unwrap();

    // 1. Nothing staged yet
    assert!(!linked.pull());

    // 2. Manager publishes the live value
    f.x.set_value(Value::Double(3.25)).unwrap();
    f.buffer.prepare_linked_buffers_for_pull();
    assert!(linked.pull());
    assert_eq!(local.value(), Value::Double(3.25));

    // 3. A second pull without a new cycle applies nothing
    assert!(!linked.pull());
}

#[test]
fn test_last_window_request_wins() {
    let mut f = fixture();
    for value in 0..6 {
        if value > 0 {
            f.buffer.increment_index(true, 1);
        }
        f.x.set_value(Value::Double(value as f64)).unwrap();
        f.buffer.write_buffer();
    }

    let local = consumer_variable("x", VariableKind::Double);
    let linked = f.buffer.factory().new_linked_variable(&local, None).unwrap().unwrap();

    linked.request_entire_buffer();
    linked.request_buffer_window(1, 2);
    f.buffer.prepare_linked_buffers_for_pull();

    let sample = linked.poll_sample().unwrap();
    assert_eq!(sample.data(), &SampleData::Double(vec![1.0, 2.0]));
    assert!(!linked.is_sample_available());
    assert!(linked.poll_sample().is_none());
}

#[test]
fn test_window_from_index_to_out_point() {
    let mut f = fixture();
    for value in 0..6 {
        if value > 0 {
            f.buffer.increment_index(true, 1);
        }
        f.x.set_value(Value::Double(value as f64)).unwrap();
        f.buffer.write_buffer();
    }
    let local = consumer_variable("x", VariableKind::Double);
    let linked = f.buffer.factory().new_linked_variable(&local, None).unwrap().unwrap();

    linked.request_buffer_starting_from(3);
    f.buffer.prepare_linked_buffers_for_pull();
    let sample = linked.poll_sample().unwrap();
    assert_eq!(sample.data(), &SampleData::Double(vec![3.0, 4.0, 5.0]));
    assert_eq!(sample.to(), 5);
}

#[test]
fn test_stale_window_requests_are_dropped() {
    let mut f = fixture();
    let local = consumer_variable("x", VariableKind::Double);
    let linked = f.buffer.factory().new_linked_variable(&local, None).unwrap().unwrap();

    for request in [
        WindowRequest::Explicit { from: 0, length: 17 },
        WindowRequest::Explicit { from: 16, length: 1 },
        WindowRequest::Explicit { from: 3, length: 0 },
        WindowRequest::FromIndexToOut(20),
    ] {
        linked.request_window(request);
        f.buffer.prepare_linked_buffers_for_pull();
        assert!(linked.poll_sample().is_none(), "{request:?} should be dropped");
        assert!(!linked.has_request_pending());
    }
}

#[test]
fn test_type_mismatch_is_rejected_at_link_time() {
    let f = fixture();
    let local = consumer_variable("x", VariableKind::Int);
    let error = f.buffer.factory().new_linked_variable(&local, None).err().unwrap();
    assert_eq!(
        error,
        BufferError::TypeMismatch {
            name: "root.robot.x".to_string(),
            expected: ValueType::Int,
            actual: ValueType::Double,
        }
    );

    let other_enum = consumer_variable("mode", VariableKind::enumeration(["OFF"], false).unwrap());
    assert!(matches!(
        f.buffer.factory().new_linked_variable(&other_enum, None),
        Err(BufferError::EnumMismatch { .. })
    ));

    let missing = consumer_variable("nope", VariableKind::Double);
    assert!(matches!(
        f.buffer.factory().new_linked_variable(&missing, None),
        Err(BufferError::UnknownVariable(_))
    ));
}

#[test]
fn test_inactive_handles_are_swept() {
    let mut f = fixture();
    let local = consumer_variable("x", VariableKind::Double);
    let user = UserId::new();
    let factory = f.buffer.factory();

    let kept = factory.new_linked_variable(&local, None).unwrap().unwrap();
    let shared = factory.new_linked_variable(&local, Some(user)).unwrap().unwrap();
    let disposed = factory.new_linked_variable(&local, None).unwrap().unwrap();
    assert_eq!(f.buffer.linked_variable_count(), 3);

    // 1. Dropping the last user and disposing make handles inactive
    assert!(shared.remove_user(user));
    assert!(!shared.is_active());
    disposed.dispose();

    f.buffer.prepare_linked_buffers_for_pull();
    assert_eq!(f.buffer.linked_variable_count(), 1);
    assert!(kept.is_active());

    // 2. A swept handle never receives values again
    assert!(!shared.pull());
    shared.add_user(user);
    assert!(!shared.is_active());
    assert!(kept.pull());
}

#[test]
fn test_linked_properties_follow_each_cycle() {
    let mut f = fixture();
    let properties = f.buffer.factory().new_linked_properties().unwrap();
    assert_eq!(properties.properties().size(), 16);
    assert!(!properties.pull());

    f.buffer.increment_index(true, 3);
    f.buffer.prepare_linked_buffers_for_pull();
    assert!(properties.is_update_available());
    assert!(properties.pull());
    assert_eq!(properties.properties().current_index(), 3);
    assert_eq!(properties.properties().out_point(), 3);
}

#[test]
fn test_linked_registry_mirrors_both_ways() {
    let mut f = fixture();
    let factory = f.buffer.factory();

    // 1. A fresh consumer registry gets a copy of the buffer tree
    let linked_registry = factory.new_linked_registry(None).unwrap().unwrap();
    let local_x = linked_registry.root().find_variable("root.robot.x").unwrap();
    assert!(linked_registry.root().find_variable("root.robot.mode").is_some());

    // 2. Variables the simulation adds show up on the consumer's next pull
    f.root.child("robot").unwrap().add_variable("y", VariableKind::Long).unwrap();
    linked_registry.pull();
    assert!(linked_registry.root().find_variable("root.robot.y").is_some());

    // 3. Variables the consumer adds reach the buffer on the manager's next cycle
    linked_registry
        .root()
        .ensure_path_exists(&telebuf_common::Namespace::parse("root.ui"))
        .unwrap()
        .add_variable("slider", VariableKind::Double)
        .unwrap();
    f.buffer.prepare_linked_buffers_for_pull();
    assert!(f.root.find_variable("root.ui.slider").is_some());
    assert!(f.buffer.registry_buffer().find_buffer("root.ui.slider").is_some());

    // 4. Linking is idempotent and values flow through pull
    let a = linked_registry.link_variable(&local_x).unwrap().unwrap();
    let b = linked_registry.link_variable(&local_x).unwrap().unwrap();
    f.x.set_value(Value::Double(7.0)).unwrap();
    f.buffer.prepare_linked_buffers_for_pull();
    assert!(linked_registry.pull());
    assert_eq!(local_x.value(), Value::Double(7.0));
    assert!(!b.pull());
    assert_eq!(a.full_name(), "root.robot.x");

    // 5. Disposing the registry releases its variables
    linked_registry.dispose();
    f.buffer.prepare_linked_buffers_for_pull();
    assert_eq!(f.buffer.linked_variable_count(), 0);
    assert!(!linked_registry.pull());
}

#[test]
fn test_linked_registry_for_unknown_namespace() {
    let f = fixture();
    let elsewhere = Registry::new("elsewhere").unwrap();
    assert!(matches!(
        f.buffer.factory().new_linked_registry(Some(elsewhere)),
        Err(BufferError::UnknownRegistry(_))
    ));
}

#[test]
fn test_consumers_on_other_threads() {
    let mut f = fixture();
    let factory = f.buffer.factory();

    // 1. Each consumer links from its own thread and pushes a distinct value
    let handles: Vec<_> = (0..4)
        .map(|i| {
            let factory = factory.clone();
            thread::spawn(move || {
                let local = consumer_variable("x", VariableKind::Double);
                let linked = factory.new_linked_variable(&local, None).unwrap().unwrap();
                local.set_value(Value::Double(i as f64 + 1.0)).unwrap();
                linked.push();
                linked.request_active_buffer_only();
                linked
            })
        })
        .collect();
    let linked: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    // 2. One of the pushes wins; every consumer gets its window
    assert!(f.buffer.process_linked_push_requests(true));
    let x = f.x.value().as_f64();
    assert!((1.0..=4.0).contains(&x));

    f.buffer.prepare_linked_buffers_for_pull();
    for handle in &linked {
        let sample = handle.poll_sample().unwrap();
        assert_eq!(sample.data(), &SampleData::Double(vec![x]));
        assert!(handle.pull());
        assert_eq!(handle.variable().value(), Value::Double(x));
    }
}

#[test]
fn test_dropped_handles_are_swept() {
    let mut f = fixture();
    let factory = f.buffer.factory();
    let local = consumer_variable("x", VariableKind::Double);

    // 1. A handle stays linked while any clone is alive, then goes with the last one
    for _ in 0..100 {
        let linked = factory.new_linked_variable(&local, None).unwrap().unwrap();
        let clone = linked.clone();
        drop(linked);
        assert!(clone.is_active());
    }
    drop(factory.new_linked_variable(&local, Some(UserId::new())).unwrap().unwrap());

    // 2. Dropping a linked registry releases what it linked
    let held = {
        let registry = factory.new_linked_registry(None).unwrap().unwrap();
        let x = registry.root().find_variable("root.robot.x").unwrap();
        let held = registry.link_variable(&x).unwrap().unwrap();
        assert_eq!(registry.linked_variables().len(), 1);
        held
    };
    assert!(!held.is_active());

    // 3. The next cycle sweeps every released handle
    assert_eq!(f.buffer.linked_variable_count(), 102);

    f.buffer.prepare_linked_buffers_for_pull();
    assert_eq!(f.buffer.linked_variable_count(), 0);
    assert!(held.is_disposed());
    assert!(!held.pull());
}

#[test]
fn test_push_racing_with_manager_is_applied_within_one_cycle() {
    const LAST: u32 = 10_000;
    let mut f = fixture();
    let local = consumer_variable("x", VariableKind::Double);
    let linked = f.buffer.factory().new_linked_variable(&local, None).unwrap().unwrap();

    // 1. A consumer thread pushes an increasing counter
    let pusher = thread::spawn(move || {
        for i in 1..=LAST {
            linked.variable().set_value(Value::Double(i as f64)).unwrap();
            linked.push();
        }
        linked
    });

    // 2. The manager commits concurrently; values only move forward
    let mut seen = 0.0;
    while !pusher.is_finished() {
        f.buffer.process_linked_push_requests(false);
        let x = f.x.value().as_f64();
        assert!(x >= seen, "{x} applied after {seen}");
        seen = x;
    }
    let linked = pusher.join().unwrap();

    // 3. One more cycle delivers the final value, after which nothing is queued
    f.buffer.process_linked_push_requests(false);
    assert_eq!(f.x.value(), Value::Double(LAST as f64));
    assert!(!f.buffer.process_linked_push_requests(false));
    assert!(linked.is_active());
}
