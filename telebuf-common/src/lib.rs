pub mod common_config;
pub mod error;
pub mod ring_math;

pub mod variable;
pub use variable::{split_full_name, Namespace, Value, ValueType, Variable, VariableKind, MAX_ENUM_CONSTANTS, NULL_ORDINAL};

pub mod registry;
pub use registry::{Registry, RegistryChange};

mod mailbox;

pub mod properties;
pub mod requests;
pub mod sample;
pub use properties::BufferProperties;
pub use requests::{CropRequest, FillRequest, PullRequest, PushRequest, WindowRequest};
pub use sample::{BufferSample, SampleData};

pub mod variable_buffer;
pub mod registry_buffer;
pub use variable_buffer::{BufferElement, VariableBuffer};
pub use registry_buffer::{BufferId, VariableRegistryBuffer};

pub mod linked;
pub use linked::{LinkedBufferFactory, LinkedProperties, LinkedRegistry, LinkedVariable, LinkedVariableFactory, UserId};

pub mod processor;
pub use processor::BufferProcessor;

pub mod shared_buffer;
pub use shared_buffer::SharedBuffer;

pub mod export;
pub use export::{read_arrow_ipc, write_arrow_ipc, record_batch_from_buffer, buffer_from_record_batch, ArrowExporter, ArrowImporter, BufferColumn, BufferExporter, BufferImporter};

pub use error::{BufferError, Result};
