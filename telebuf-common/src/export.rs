//! Moving recordings in and out of a shared buffer.
//!
//! The Arrow format stores one column per variable holding the active window, oldest
//! sample first. Buffer geometry goes into the schema metadata and enum constants into
//! the field metadata, so a file read back yields an equivalent buffer.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use arrow::array::{
    Array, ArrayRef, BooleanArray, Float64Array, Int32Array, Int64Array, Int8Array,
};
use arrow::compute::concat_batches;
use arrow::datatypes::{DataType, Field, Schema};
use arrow::ipc::reader::FileReader;
use arrow::ipc::writer::FileWriter;
use arrow::record_batch::{RecordBatch, RecordBatchOptions};
use log::{debug, info};

use crate::properties::BufferProperties;
use crate::registry::Registry;
use crate::ring_math;
use crate::sample::SampleData;
use crate::shared_buffer::SharedBuffer;
use crate::variable::{split_full_name, Namespace, Variable, VariableKind};

pub const META_SIZE: &str = "telebuf.size";
pub const META_CURRENT_INDEX: &str = "telebuf.current_index";
pub const META_IN_POINT: &str = "telebuf.in_point";
pub const META_OUT_POINT: &str = "telebuf.out_point";
pub const META_ROOT: &str = "telebuf.root";
pub const META_ENUM_CONSTANTS: &str = "telebuf.enum_constants";
pub const META_ALLOW_NULL: &str = "telebuf.allow_null";

const DEFAULT_ROOT: &str = "root";

/// One variable's active window, as handed to exporters.
#[derive(Debug, Clone, PartialEq)]
pub struct BufferColumn {
    pub name: String,
    pub kind: VariableKind,
    pub data: SampleData,
}

pub trait BufferExporter {
    /// `properties` describe the exported columns: `size` equals their length and the
    /// active window spans all of them.
    fn export(&mut self, properties: &BufferProperties, columns: &[BufferColumn]) -> Result<()>;
}

pub trait BufferImporter {
    fn import(&mut self) -> Result<SharedBuffer>;
}

/// Geometry of the active window once it is laid out from index 0.
pub fn exported_properties(properties: &BufferProperties) -> BufferProperties {
    let length = properties.active_buffer_length();
    if length == 0 {
        return BufferProperties::new(0);
    }
    let current = if properties.is_inside_active_window(properties.current_index()) {
        ring_math::sub_length(properties.in_point(), properties.current_index(), properties.size()) - 1
    } else {
        length - 1
    };
    BufferProperties::from_parts(length, current, 0, length - 1)
}

/// Hands the active window to `exporter`. With a `filter` only the variables it accepts
/// are exported; [`in_namespace`] selects whole registries.
pub fn export_buffer(
    buffer: &SharedBuffer,
    exporter: &mut dyn BufferExporter,
    filter: Option<&dyn Fn(&Variable) -> bool>,
) -> Result<()> {
    let properties = exported_properties(&buffer.properties());
    let columns = match filter {
        Some(keep) => buffer.active_window_columns_where(keep),
        None => buffer.active_window_columns(),
    };
    debug!("exporting {} columns", columns.len());
    exporter.export(&properties, &columns)
}

/// Accepts the variables of the registry at `namespace` and of every registry below it.
pub fn in_namespace(namespace: &Namespace) -> impl Fn(&Variable) -> bool + '_ {
    move |variable| variable.namespace().starts_with(namespace)
}

fn column_array(data: &SampleData) -> ArrayRef {
    match data {
        SampleData::Bool(v) => Arc::new(BooleanArray::from(v.clone())),
        SampleData::Int(v) => Arc::new(Int32Array::from(v.clone())),
        SampleData::Long(v) => Arc::new(Int64Array::from(v.clone())),
        SampleData::Double(v) => Arc::new(Float64Array::from(v.clone())),
        SampleData::Enum(v) => Arc::new(Int8Array::from(v.clone())),
    }
}

fn column_field(column: &BufferColumn) -> Field {
    let data_type = match column.data {
        SampleData::Bool(_) => DataType::Boolean,
        SampleData::Int(_) => DataType::Int32,
        SampleData::Long(_) => DataType::Int64,
        SampleData::Double(_) => DataType::Float64,
        SampleData::Enum(_) => DataType::Int8,
    };
    let field = Field::new(&column.name, data_type, false);

    match &column.kind {
        VariableKind::Enum {
            constants,
            allow_null,
        } => {
            let mut metadata = HashMap::new();
            metadata.insert(META_ENUM_CONSTANTS.to_string(), constants.join("\n"));
            metadata.insert(META_ALLOW_NULL.to_string(), allow_null.to_string());
            field.with_metadata(metadata)
        }
        _ => field,
    }
}

pub fn record_batch_from_columns(
    properties: &BufferProperties,
    columns: &[BufferColumn],
) -> Result<RecordBatch> {
    let root = columns
        .first()
        .and_then(|c| c.name.split('.').next())
        .unwrap_or(DEFAULT_ROOT);

    let mut metadata = HashMap::new();
    metadata.insert(META_SIZE.to_string(), properties.size().to_string());
    metadata.insert(META_CURRENT_INDEX.to_string(), properties.current_index().to_string());
    metadata.insert(META_IN_POINT.to_string(), properties.in_point().to_string());
    metadata.insert(META_OUT_POINT.to_string(), properties.out_point().to_string());
    metadata.insert(META_ROOT.to_string(), root.to_string());

    let fields: Vec<Field> = columns.iter().map(column_field).collect();
    let arrays: Vec<ArrayRef> = columns.iter().map(|c| column_array(&c.data)).collect();
    let schema = Arc::new(Schema::new_with_metadata(fields, metadata));

    let options = RecordBatchOptions::new().with_row_count(Some(properties.size()));
    RecordBatch::try_new_with_options(schema, arrays, &options)
        .context("building record batch from buffer columns")
}

pub fn record_batch_from_buffer(buffer: &SharedBuffer) -> Result<RecordBatch> {
    let properties = exported_properties(&buffer.properties());
    record_batch_from_columns(&properties, &buffer.active_window_columns())
}

fn parse_meta(metadata: &HashMap<String, String>, key: &str) -> Result<usize> {
    metadata
        .get(key)
        .ok_or_else(|| anyhow!("Missing '{key}' in metadata"))?
        .parse()
        .with_context(|| format!("parsing '{key}' from metadata"))
}

fn field_kind(field: &Field) -> Result<VariableKind> {
    let kind = match field.data_type() {
        DataType::Boolean => VariableKind::Bool,
        DataType::Int32 => VariableKind::Int,
        DataType::Int64 => VariableKind::Long,
        DataType::Float64 => VariableKind::Double,
        DataType::Int8 => {
            let metadata = field.metadata();
            let constants: Vec<String> = match metadata.get(META_ENUM_CONSTANTS) {
                Some(joined) if !joined.is_empty() => joined.split('\n').map(str::to_owned).collect(),
                _ => Vec::new(),
            };
            let allow_null = metadata
                .get(META_ALLOW_NULL)
                .map(|v| v == "true")
                .unwrap_or(true);
            VariableKind::enumeration(constants, allow_null)?
        }
        other => bail!("column `{}` has unsupported type {other}", field.name()),
    };
    Ok(kind)
}

fn column_data(column: &ArrayRef, field: &Field) -> Result<SampleData> {
    let any = column.as_any();
    let mismatch = || anyhow!("column `{}` does not match its declared type", field.name());
    let data = match field.data_type() {
        DataType::Boolean => {
            let array = any.downcast_ref::<BooleanArray>().ok_or_else(mismatch)?;
            SampleData::Bool((0..array.len()).map(|i| array.value(i)).collect())
        }
        DataType::Int32 => {
            let array = any.downcast_ref::<Int32Array>().ok_or_else(mismatch)?;
            SampleData::Int(array.values().to_vec())
        }
        DataType::Int64 => {
            let array = any.downcast_ref::<Int64Array>().ok_or_else(mismatch)?;
            SampleData::Long(array.values().to_vec())
        }
        DataType::Float64 => {
            let array = any.downcast_ref::<Float64Array>().ok_or_else(mismatch)?;
            SampleData::Double(array.values().to_vec())
        }
        DataType::Int8 => {
            let array = any.downcast_ref::<Int8Array>().ok_or_else(mismatch)?;
            SampleData::Enum(array.values().to_vec())
        }
        other => bail!("column `{}` has unsupported type {other}", field.name()),
    };
    Ok(data)
}

/// Rebuilds a shared buffer, its registry tree included, from a batch written by
/// [`record_batch_from_columns`].
pub fn buffer_from_record_batch(batch: &RecordBatch) -> Result<SharedBuffer> {
    let schema = batch.schema();
    let metadata = schema.metadata();
    let size = parse_meta(metadata, META_SIZE)?;
    if size == 0 {
        bail!("recording is empty");
    }
    if size != batch.num_rows() {
        bail!("metadata declares {size} samples but the batch has {}", batch.num_rows());
    }

    let root_name = metadata.get(META_ROOT).map(String::as_str).unwrap_or(DEFAULT_ROOT);
    let root = Registry::new(root_name)?;
    for field in schema.fields() {
        let (namespace, name) = split_full_name(field.name());
        let registry = root.ensure_path_exists(&namespace)?;
        registry
            .add_variable(name, field_kind(field)?)
            .with_context(|| format!("declaring `{}`", field.name()))?;
    }

    let mut buffer = SharedBuffer::new(root, size);
    for (field, column) in schema.fields().iter().zip(batch.columns()) {
        let data = column_data(column, field)?;
        buffer.load_column(field.name(), &data)?;
    }

    buffer.restore_indices(
        parse_meta(metadata, META_CURRENT_INDEX)?,
        parse_meta(metadata, META_IN_POINT)?,
        parse_meta(metadata, META_OUT_POINT)?,
    );
    buffer.read_buffer();
    debug!(
        "rebuilt buffer of {} variables and {size} samples",
        schema.fields().len()
    );
    Ok(buffer)
}

pub fn write_arrow_ipc(path: &Path, batch: &RecordBatch) -> Result<()> {
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut writer = FileWriter::try_new(BufWriter::new(file), &batch.schema())?;
    writer.write(batch)?;
    writer.finish()?;
    info!(
        "wrote {} variables x {} samples to {}",
        batch.num_columns(),
        batch.num_rows(),
        path.display()
    );
    Ok(())
}

pub fn read_arrow_ipc(path: &Path) -> Result<SharedBuffer> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let reader = FileReader::try_new(BufReader::new(file), None)?;
    let schema = reader.schema();
    let batches = reader.collect::<std::result::Result<Vec<_>, _>>()?;
    let batch = concat_batches(&schema, &batches)?;
    buffer_from_record_batch(&batch)
}

/// Writes exports to an Arrow IPC file.
pub struct ArrowExporter {
    path: PathBuf,
}

impl ArrowExporter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        ArrowExporter { path: path.into() }
    }
}

impl BufferExporter for ArrowExporter {
    fn export(&mut self, properties: &BufferProperties, columns: &[BufferColumn]) -> Result<()> {
        let batch = record_batch_from_columns(properties, columns)?;
        write_arrow_ipc(&self.path, &batch)
    }
}

pub struct ArrowImporter {
    path: PathBuf,
}

impl ArrowImporter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        ArrowImporter { path: path.into() }
    }
}

impl BufferImporter for ArrowImporter {
    fn import(&mut self) -> Result<SharedBuffer> {
        read_arrow_ipc(&self.path)
    }
}
