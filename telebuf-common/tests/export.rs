use std::sync::Arc;

use telebuf_common::export::{export_buffer, exported_properties, in_namespace};
use telebuf_common::{
    buffer_from_record_batch, read_arrow_ipc, record_batch_from_buffer, ArrowExporter,
    ArrowImporter, BufferImporter, BufferProperties, Namespace, Registry, SampleData, SharedBuffer, Value,
    Variable, VariableKind,
};

struct Recording {
    buffer: SharedBuffer,
    q: Arc<Variable>,
}

/// Size 6, ten ticks recorded: the active window wraps and starts at slot 4.
fn recording() -> Recording {
    let root = Registry::new("root").unwrap();
    let robot = root.add_child("robot").unwrap();
    let q = robot.add_variable("q", VariableKind::Double).unwrap();
    let tick = robot.add_variable("tick", VariableKind::Int).unwrap();
    let contact = root.add_variable("contact", VariableKind::Bool).unwrap();
    let mode = robot
        .add_variable("mode", VariableKind::enumeration(["STAND", "WALK"], true).unwrap())
        .unwrap();

    let mut buffer = SharedBuffer::new(root, 6);
    for t in 0..10 {
        if t > 0 {
            buffer.increment_index(true, 1);
        }
        q.set_value(Value::Double(t as f64 * 0.5)).unwrap();
        tick.set_value(Value::Int(t)).unwrap();
        contact.set_value(Value::Bool(t % 2 == 0)).unwrap();
        mode.set_value(Value::Enum(if t < 7 { None } else { Some(1) })).unwrap();
        buffer.write_buffer();
    }
    Recording { buffer, q }
}

#[test]
fn test_exported_properties_rebase_active_window() {
    let properties = BufferProperties::from_parts(6, 2, 4, 3);
    let exported = exported_properties(&properties);
    assert_eq!(exported.size(), 6);
    assert_eq!(exported.in_point(), 0);
    assert_eq!(exported.out_point(), 5);
    assert_eq!(exported.current_index(), 4);
}

#[test]
fn test_record_batch_round_trip() {
    let recording = recording();

    // 1. Batch columns hold the active window, oldest first
    let batch = record_batch_from_buffer(&recording.buffer).unwrap();
    assert_eq!(batch.num_rows(), 6);
    assert_eq!(batch.num_columns(), 4);
    let metadata = batch.schema().metadata().clone();
    assert_eq!(metadata.get("telebuf.size").map(String::as_str), Some("6"));
    assert_eq!(metadata.get("telebuf.root").map(String::as_str), Some("root"));

    // 2. Rebuilding yields the same tree and samples
    let restored = buffer_from_record_batch(&batch).unwrap();
    let properties = restored.properties();
    assert_eq!(properties.size(), 6);
    assert_eq!(properties.in_point(), 0);
    assert_eq!(properties.out_point(), 5);
    assert_eq!(properties.current_index(), 5);

    let columns = restored.active_window_columns();
    let find = |name: &str| columns.iter().find(|c| c.name == name).unwrap().data.clone();
    assert_eq!(find("root.robot.tick"), SampleData::Int(vec![4, 5, 6, 7, 8, 9]));
    assert_eq!(
        find("root.robot.q"),
        SampleData::Double(vec![2.0, 2.5, 3.0, 3.5, 4.0, 4.5])
    );
    assert_eq!(
        find("root.contact"),
        SampleData::Bool(vec![true, false, true, false, true, false])
    );
    assert_eq!(find("root.robot.mode"), SampleData::Enum(vec![-1, -1, -1, 1, 1, 1]));

    // 3. Enum constants survive and variables hold the current sample
    let mode = restored.root_registry().find_variable("root.robot.mode").unwrap();
    assert_eq!(
        mode.kind(),
        &VariableKind::enumeration(["STAND", "WALK"], true).unwrap()
    );
    assert_eq!(mode.value(), Value::Enum(Some(1)));
    let q = restored.root_registry().find_variable("root.robot.q").unwrap();
    assert_eq!(q.value(), recording.q.value());
}

#[test]
fn test_arrow_ipc_file_round_trip() {
    let mut recording = recording();
    recording.buffer.set_current_index(0);
    let path = std::env::temp_dir().join(format!("telebuf-export-{}.arrow", std::process::id()));

    // 1. Export through the exporter interface
    export_buffer(&recording.buffer, &mut ArrowExporter::new(&path), None).unwrap();

    // 2. Import and compare
    let restored = ArrowImporter::new(&path).import().unwrap();
    assert_eq!(restored.properties().current_index(), 2);
    let mut expected = recording.buffer.active_window_columns();
    expected.sort_by(|a, b| a.name.cmp(&b.name));
    let mut actual = restored.active_window_columns();
    actual.sort_by(|a, b| a.name.cmp(&b.name));
    assert_eq!(actual, expected);

    // 3. Cropping the imported buffer and reading it again
    let mut cropped = read_arrow_ipc(&path).unwrap();
    cropped.crop(telebuf_common::CropRequest::new(1, 3));
    let batch = record_batch_from_buffer(&cropped).unwrap();
    let again = buffer_from_record_batch(&batch).unwrap();
    let columns = again.active_window_columns();
    let tick = columns.iter().find(|c| c.name == "root.robot.tick").unwrap();
    assert_eq!(tick.data, SampleData::Int(vec![5, 6, 7]));

    std::fs::remove_file(&path).ok();
}

#[test]
fn test_export_only_selected_variables() {
    let recording = recording();
    let path = std::env::temp_dir().join(format!("telebuf-filter-{}.arrow", std::process::id()));

    // 1. Only the robot registry
    let robot = Namespace::parse("root.robot");
    export_buffer(
        &recording.buffer,
        &mut ArrowExporter::new(&path),
        Some(&in_namespace(&robot)),
    )
    .unwrap();
    let restored = read_arrow_ipc(&path).unwrap();
    let mut names: Vec<_> = restored.active_window_columns().into_iter().map(|c| c.name).collect();
    names.sort();
    assert_eq!(names, ["root.robot.mode", "root.robot.q", "root.robot.tick"]);
    assert!(restored.root_registry().find_variable("root.contact").is_none());

    // 2. An arbitrary predicate over the variables
    let doubles = |variable: &Variable| variable.kind() == &VariableKind::Double;
    let columns = recording.buffer.active_window_columns_where(doubles);
    assert_eq!(columns.len(), 1);
    assert_eq!(columns[0].name, "root.robot.q");
    assert_eq!(columns[0].data.len(), 6);

    std::fs::remove_file(&path).ok();
}
