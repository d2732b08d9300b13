//! Value objects exchanged between consumers and the buffer manager.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::properties::BufferProperties;
use crate::ring_math;
use crate::variable::{Value, Variable};

/// Keep only `[from, to]` of the ring (wrapping if `to < from`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CropRequest {
    pub from: usize,
    pub to: usize,
}

impl CropRequest {
    pub fn new(from: usize, to: usize) -> Self {
        CropRequest { from, to }
    }

    pub fn cropped_size(&self, buffer_size: usize) -> usize {
        ring_math::sub_length(self.from, self.to, buffer_size)
    }
}

/// Overwrite `[from, to]` with zero or with each variable's current value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FillRequest {
    pub zero_fill: bool,
    pub from: usize,
    pub to: usize,
}

impl FillRequest {
    pub fn new(zero_fill: bool, from: usize, to: usize) -> Self {
        FillRequest { zero_fill, from, to }
    }

    pub fn filled_size(&self, buffer_size: usize) -> usize {
        ring_math::sub_length(self.from, self.to, buffer_size)
    }
}

/// Which part of a variable's history a consumer wants to receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WindowRequest {
    EntireBuffer,
    ActiveWindowOnly,
    FromIndexToOut(usize),
    Explicit { from: usize, length: usize },
}

impl WindowRequest {
    /// Resolves the request against the current geometry into `(from, length)`.
    ///
    /// Returns `None` for requests that no longer fit the buffer; those are dropped.
    pub fn resolve(&self, properties: &BufferProperties) -> Option<(usize, usize)> {
        let size = properties.size();

        let (from, length) = match *self {
            WindowRequest::Explicit { from, length } if from >= size || length > size => {
                debug!("dropping window request {self:?} against buffer of size {size}");
                return None;
            }
            WindowRequest::FromIndexToOut(from) if from >= size => {
                debug!("dropping window request {self:?} against buffer of size {size}");
                return None;
            }
            WindowRequest::EntireBuffer => (0, size),
            WindowRequest::ActiveWindowOnly => {
                (properties.in_point(), properties.active_buffer_length())
            }
            WindowRequest::FromIndexToOut(from) => {
                (from, ring_math::sub_length(from, properties.out_point(), size))
            }
            WindowRequest::Explicit { from, length } => (from, length),
        };

        if length == 0 {
            return None;
        }

        assert!(from < size, "window start {from} out of bounds for buffer of size {size}");
        assert!(length <= size, "window length {length} exceeds buffer size {size}");
        Some((from, length))
    }
}

/// A value staged by a consumer, applied to the live variable by the manager.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PushRequest {
    pub value: Value,
}

/// A value staged by the manager, applied to the consumer's variable on pull.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PullRequest {
    pub value: Value,
}

impl PushRequest {
    pub fn capture(variable: &Variable) -> Self {
        PushRequest {
            value: variable.value(),
        }
    }

    /// Writes the staged value into `target`; returns whether it changed.
    pub fn apply(&self, target: &Variable) -> bool {
        apply_value(self.value, target)
    }
}

impl PullRequest {
    pub fn capture(variable: &Variable) -> Self {
        PullRequest {
            value: variable.value(),
        }
    }

    pub fn apply(&self, target: &Variable) -> bool {
        apply_value(self.value, target)
    }
}

fn apply_value(value: Value, target: &Variable) -> bool {
    value.value_type() == target.value_type() && target.store_bits(value.to_bits())
}
