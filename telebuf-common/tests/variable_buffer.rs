use telebuf_common::{
    BufferProperties, CropRequest, FillRequest, SampleData, Value, Variable, VariableBuffer,
    VariableKind, WindowRequest,
};

fn enum_kind() -> VariableKind {
    VariableKind::enumeration(["LOW", "HIGH"], true).unwrap()
}

#[test]
fn test_buffer_type_follows_variable_kind() {
    let cases = [
        (VariableKind::Bool, 1),
        (VariableKind::Int, 4),
        (VariableKind::Long, 8),
        (VariableKind::Double, 8),
        (enum_kind(), 1),
    ];
    for (kind, bytes) in cases {
        let buffer = VariableBuffer::new(Variable::new("v", kind.clone()).unwrap(), 5);
        assert_eq!(buffer.value_type(), kind.value_type());
        assert_eq!(buffer.frame_memory_size(), bytes);
        assert_eq!(buffer.len(), 5);
    }
}

#[test]
fn test_write_read_and_copy() {
    let variable = Variable::new("v", VariableKind::Long).unwrap();
    let mut buffer = VariableBuffer::new(variable.clone(), 4);

    // 1. Record three values
    for (index, value) in [10i64, 20, 30].into_iter().enumerate() {
        variable.set_value(Value::Long(value)).unwrap();
        buffer.write_at(index);
    }

    // 2. Reading a slot back updates the variable
    assert!(buffer.read_at(0));
    assert_eq!(variable.value(), Value::Long(10));
    assert!(!buffer.read_at(0));

    // 3. Copies wrap around the end
    let sample = buffer.copy(2, 3, BufferProperties::new(4));
    assert_eq!(sample.data(), &SampleData::Long(vec![30, 0, 10]));
    assert_eq!(sample.from(), 2);
    assert_eq!(sample.to(), 0);
}

#[test]
fn test_resize_rebuilds_from_copy_start() {
    let variable = Variable::new("v", VariableKind::Int).unwrap();
    let mut buffer = VariableBuffer::new(variable.clone(), 5);
    for index in 0..5 {
        variable.set_value(Value::Int(index as i32 + 1)).unwrap();
        buffer.write_at(index);
    }

    // 1. Same length from zero keeps everything
    buffer.resize(0, 5);
    assert_eq!(buffer.copy(0, 5, BufferProperties::new(5)).into_data(), SampleData::Int(vec![1, 2, 3, 4, 5]));

    // 2. Rotating copy, padded with zeros
    buffer.resize(3, 7);
    assert_eq!(
        buffer.copy(0, 7, BufferProperties::new(7)).into_data(),
        SampleData::Int(vec![4, 5, 1, 2, 3, 0, 0])
    );
}

#[test]
fn test_enum_buffer_keeps_null() {
    let variable = Variable::new("mode", enum_kind()).unwrap();
    let mut buffer = VariableBuffer::new(variable.clone(), 3);

    buffer.write_at(0);
    variable.set_value(Value::Enum(Some(1))).unwrap();
    buffer.write_at(1);

    let data = buffer.copy(0, 3, BufferProperties::new(3)).into_data();
    assert_eq!(data, SampleData::Enum(vec![-1, 1, 0]));
    assert_eq!(data.value(0), Some(Value::Enum(None)));
    assert_eq!(data.value(2), Some(Value::Enum(Some(0))));

    buffer.read_at(0);
    assert_eq!(variable.value(), Value::Enum(None));
}

#[test]
fn test_fill_with_zero_or_current_value() {
    let variable = Variable::new("v", VariableKind::Double).unwrap();
    let mut buffer = VariableBuffer::new(variable.clone(), 4);

    variable.set_value(Value::Double(2.5)).unwrap();
    buffer.fill(false, 3, 3);
    assert_eq!(
        buffer.copy(0, 4, BufferProperties::new(4)).into_data(),
        SampleData::Double(vec![2.5, 2.5, 0.0, 2.5])
    );

    buffer.fill(true, 0, 1);
    assert_eq!(
        buffer.copy(0, 4, BufferProperties::new(4)).into_data(),
        SampleData::Double(vec![0.0, 2.5, 0.0, 2.5])
    );
}

#[test]
fn test_load_checks_type_and_length() {
    let variable = Variable::new("v", VariableKind::Int).unwrap();
    let mut buffer = VariableBuffer::new(variable, 3);

    assert!(buffer.load(&SampleData::Int(vec![1, 2, 3])).is_ok());
    assert!(buffer.load(&SampleData::Int(vec![1, 2])).is_err());
    assert!(buffer.load(&SampleData::Double(vec![1.0, 2.0, 3.0])).is_err());
}

#[test]
fn test_window_resolution() {
    // size 10, active window [7, 2] wrapping
    let properties = BufferProperties::from_parts(10, 9, 7, 2);
    assert_eq!(properties.active_buffer_length(), 6);

    assert_eq!(WindowRequest::EntireBuffer.resolve(&properties), Some((0, 10)));
    assert_eq!(WindowRequest::ActiveWindowOnly.resolve(&properties), Some((7, 6)));
    assert_eq!(WindowRequest::FromIndexToOut(0).resolve(&properties), Some((0, 3)));
    assert_eq!(WindowRequest::FromIndexToOut(5).resolve(&properties), Some((5, 8)));
    assert_eq!(
        WindowRequest::Explicit { from: 9, length: 10 }.resolve(&properties),
        Some((9, 10))
    );
    assert_eq!(WindowRequest::Explicit { from: 9, length: 11 }.resolve(&properties), None);
    assert_eq!(WindowRequest::Explicit { from: 10, length: 1 }.resolve(&properties), None);
    assert_eq!(WindowRequest::FromIndexToOut(10).resolve(&properties), None);
    assert_eq!(WindowRequest::Explicit { from: 4, length: 0 }.resolve(&properties), None);
}

#[test]
fn test_bulk_requests_compute_sizes_and_compare_by_value() {
    assert_eq!(CropRequest::new(2, 5).cropped_size(8), 4);
    assert_eq!(CropRequest::new(6, 1).cropped_size(8), 4);
    assert_eq!(FillRequest::new(true, 7, 0).filled_size(8), 2);
    assert_eq!(CropRequest::new(1, 2), CropRequest { from: 1, to: 2 });
    assert_ne!(FillRequest::new(true, 1, 2), FillRequest::new(false, 1, 2));
}
