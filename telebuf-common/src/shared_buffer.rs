//! The buffer manager's entry point.
//!
//! A `SharedBuffer` is owned by one manager thread which drives a tick like:
//!
//! ```text
//! process_linked_push_requests(..)   commit consumer writes
//! write_buffer() / read_buffer()     record or play back
//! increment_index(..)
//! prepare_linked_buffers_for_pull()  publish to consumers
//! ```
//!
//! Consumers never touch it directly; they go through the handles made by [`SharedBuffer::factory`].

use std::sync::Arc;

use log::{debug, info};

use crate::common_config::CONFIG;
use crate::error::{BufferError, Result};
use crate::export::BufferColumn;
use crate::linked::hub::LinkedHub;
use crate::linked::LinkedBufferFactory;
use crate::processor::BufferProcessor;
use crate::properties::BufferProperties;
use crate::registry::Registry;
use crate::registry_buffer::VariableRegistryBuffer;
use crate::requests::{CropRequest, FillRequest};
use crate::ring_math;
use crate::sample::SampleData;
use crate::variable::Variable;

pub struct SharedBuffer {
    registry_buffer: VariableRegistryBuffer,
    properties: BufferProperties,
    hub: Arc<LinkedHub>,
    disposed: bool,
}

impl SharedBuffer {
    /// Records every variable under `root` in rings of `size` slots.
    pub fn new(root: Registry, size: usize) -> Self {
        assert!(size > 0, "buffer size must be greater than zero");
        let properties = BufferProperties::new(size);
        let hub = Arc::new(LinkedHub::new(root.clone(), properties));
        SharedBuffer {
            registry_buffer: VariableRegistryBuffer::new(root, size),
            properties,
            hub,
            disposed: false,
        }
    }

    /// Same as [`SharedBuffer::new`] with the configured initial size.
    pub fn with_default_size(root: Registry) -> Self {
        SharedBuffer::new(root, CONFIG.initial_buffer_size)
    }

    pub fn root_registry(&self) -> &Registry {
        self.registry_buffer.root()
    }

    pub fn registry_buffer(&self) -> &VariableRegistryBuffer {
        &self.registry_buffer
    }

    pub fn properties(&self) -> BufferProperties {
        self.properties
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    pub fn factory(&self) -> LinkedBufferFactory {
        LinkedBufferFactory::new(self.hub.clone())
    }

    /// Keeps only `[from, to]`, which becomes the whole buffer.
    pub fn crop(&mut self, request: CropRequest) {
        if self.disposed {
            return;
        }
        let new_size = request.cropped_size(self.properties.size());
        self.registry_buffer.resize(request.from, new_size);
        self.properties.set_size(new_size);
        self.properties.set_indices(0, 0, new_size - 1);
        info!("cropped buffer to [{}, {}], new size {new_size}", request.from, request.to);
    }

    pub fn fill(&mut self, request: FillRequest) {
        if self.disposed {
            return;
        }
        let length = request.filled_size(self.properties.size());
        self.registry_buffer.fill(request.zero_fill, request.from, length);
    }

    /// Changes the capacity, keeping the active window left-aligned.
    ///
    /// When `new_size` is smaller than the active window only its most recent samples
    /// survive. Variables are not updated; call [`SharedBuffer::read_buffer`] afterwards.
    pub fn resize(&mut self, new_size: usize) -> bool {
        if self.disposed {
            return false;
        }
        let old = self.properties;
        let old_size = old.size();
        if new_size == old_size || new_size == 0 {
            return false;
        }

        let active_length = old.active_buffer_length();
        let (copy_from, new_out, new_current) = if new_size < active_length {
            let copy_from = ring_math::from_index(old.out_point(), new_size, old_size);
            let new_out = new_size - 1;
            let current = if ring_math::is_inside_bounds(
                old.current_index(),
                copy_from,
                old.out_point(),
                old_size,
            ) {
                new_out + 1 - ring_math::sub_length(old.current_index(), old.out_point(), old_size)
            } else {
                new_out
            };
            (copy_from, new_out, current)
        } else {
            let new_out = active_length - 1;
            let current = if old.is_inside_active_window(old.current_index()) {
                ring_math::sub_length(old.in_point(), old.current_index(), old_size) - 1
            } else {
                new_out
            };
            (old.in_point(), new_out, current)
        };

        self.registry_buffer.resize(copy_from, new_size);
        self.properties.set_size(new_size);
        self.properties.set_indices(new_current, 0, new_out);
        info!("resized buffer from {old_size} to {new_size}");
        true
    }

    pub fn set_current_index(&mut self, index: usize) -> bool {
        !self.disposed && self.properties.set_current_index(index)
    }

    pub fn set_in_point(&mut self, index: usize) -> bool {
        !self.disposed && self.properties.set_in_point(index)
    }

    pub fn set_out_point(&mut self, index: usize) -> bool {
        !self.disposed && self.properties.set_out_point(index)
    }

    /// Moves the current index forward by `step` slots, backward if `step` is negative.
    ///
    /// Recording (`extend_bounds`) drags the out-point along; playback loops over the
    /// active window. Returns the new current index.
    pub fn increment_index(&mut self, extend_bounds: bool, step: isize) -> usize {
        if self.disposed {
            return self.properties.current_index();
        }
        if step < 0 {
            self.properties.step_backward_by(step.unsigned_abs());
        } else {
            self.properties.step_forward_by(extend_bounds, step.unsigned_abs());
        }
        self.properties.current_index()
    }

    /// Moves the current index backward over the active window; forward if `step` is negative.
    pub fn decrement_index(&mut self, step: isize) -> usize {
        if self.disposed {
            return self.properties.current_index();
        }
        if step < 0 {
            self.properties.step_forward_by(false, step.unsigned_abs());
        } else {
            self.properties.step_backward_by(step.unsigned_abs());
        }
        self.properties.current_index()
    }

    /// Records every variable at the current index.
    pub fn write_buffer(&mut self) {
        if self.disposed {
            return;
        }
        self.registry_buffer.sync();
        self.registry_buffer.write_at(self.properties.current_index());
    }

    /// Loads every variable from the current index; returns whether any changed.
    pub fn read_buffer(&mut self) -> bool {
        if self.disposed {
            return false;
        }
        self.registry_buffer.sync();
        self.registry_buffer.read_at(self.properties.current_index())
    }

    /// Commits values pushed by consumers since the last call.
    ///
    /// With `write_buffer` each changed value is also recorded at the current index.
    pub fn process_linked_push_requests(&mut self, write_buffer: bool) -> bool {
        if self.disposed {
            return false;
        }
        let write_index = write_buffer.then(|| self.properties.current_index());
        self.hub.process_push_requests(&mut self.registry_buffer, write_index)
    }

    pub fn flush_linked_push_requests(&mut self) {
        if self.disposed {
            return;
        }
        self.hub.flush_push_requests();
    }

    /// Publishes current values, resolved windows and properties to every handle.
    pub fn prepare_linked_buffers_for_pull(&mut self) {
        if self.disposed {
            return;
        }
        self.hub.prepare_for_pull(&mut self.registry_buffer, self.properties);
    }

    /// Whether a consumer is waiting for a window that the next
    /// [`SharedBuffer::prepare_linked_buffers_for_pull`] would resolve.
    pub fn has_request_pending(&self) -> bool {
        !self.disposed && self.hub.has_request_pending()
    }

    pub fn linked_variable_count(&self) -> usize {
        self.hub.linked_variable_count()
    }

    /// Runs `processor` over every slot of the active window, then restores the current index.
    pub fn apply_processor(&mut self, processor: &mut dyn BufferProcessor) {
        if self.disposed {
            return;
        }
        let initial_index = self.properties.current_index();
        let length = self.properties.active_buffer_length();
        processor.initialize(self.registry_buffer.root());

        let forward = processor.go_forward();
        let (start, end) = if forward {
            (self.properties.in_point(), self.properties.out_point())
        } else {
            (self.properties.out_point(), self.properties.in_point())
        };
        self.properties.set_current_index(start);

        for _ in 0..length {
            self.read_buffer();
            processor.process(start, end, self.properties.current_index());
            self.write_buffer();
            if forward {
                self.increment_index(false, 1);
            } else {
                self.decrement_index(1);
            }
        }

        self.properties.set_current_index(initial_index);
        self.read_buffer();
        debug!("applied processor over {length} samples");
    }

    /// Bytes one tick of the whole buffer occupies.
    pub fn frame_memory_size(&self) -> usize {
        self.registry_buffer.frame_memory_size()
    }

    /// Linear copy of the active window of every buffered variable.
    pub fn active_window_columns(&self) -> Vec<BufferColumn> {
        self.active_window_columns_where(|_| true)
    }

    /// Same as [`SharedBuffer::active_window_columns`], restricted to the variables `keep`
    /// accepts.
    pub fn active_window_columns_where(&self, keep: impl Fn(&Variable) -> bool) -> Vec<BufferColumn> {
        if self.disposed {
            return Vec::new();
        }
        let from = self.properties.in_point();
        let length = self.properties.active_buffer_length();
        self.registry_buffer
            .buffers()
            .iter()
            .filter(|buffer| keep(buffer.variable()))
            .map(|buffer| BufferColumn {
                name: buffer.variable().full_name(),
                kind: buffer.variable().kind().clone(),
                data: buffer.copy(from, length, self.properties).into_data(),
            })
            .collect()
    }

    /// Replaces the whole ring of `full_name` with `data`.
    pub fn load_column(&mut self, full_name: &str, data: &SampleData) -> Result<()> {
        if self.disposed {
            return Ok(());
        }
        let id = self
            .registry_buffer
            .find_or_create_buffer(full_name)
            .ok_or_else(|| BufferError::UnknownVariable(full_name.to_owned()))?;
        self.registry_buffer.buffer_mut(id).load(data)
    }

    /// Overrides the geometry, e.g. after importing a recording. Indices are clamped into the ring.
    pub fn restore_indices(&mut self, current_index: usize, in_point: usize, out_point: usize) {
        if self.disposed {
            return;
        }
        let restored = BufferProperties::from_parts(
            self.properties.size(),
            current_index,
            in_point,
            out_point,
        );
        self.properties = restored;
    }

    /// Tears down the registry buffer, then every linked handle, then linked properties.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.registry_buffer.dispose();
        self.hub.dispose_linked();
        self.hub.dispose_properties();
        info!("shared buffer disposed");
    }
}

impl Drop for SharedBuffer {
    fn drop(&mut self) {
        self.dispose();
    }
}
