//! Per-variable ring storage, one closed enum over the supported value types.

use std::mem::size_of;
use std::sync::Arc;

use crate::error::{BufferError, Result};
use crate::properties::BufferProperties;
use crate::ring_math;
use crate::sample::{BufferSample, SampleData};
use crate::variable::{ValueType, Variable, VariableKind};

/// A scalar that can live in a ring slot and round-trip through a variable's bit cell.
pub trait BufferElement: Copy + Default + PartialEq + Send + Sync + 'static {
    const VALUE_TYPE: ValueType;

    fn from_bits(bits: u64) -> Self;
    fn to_bits(self) -> u64;
    fn into_sample(data: Vec<Self>) -> SampleData;
}

impl BufferElement for bool {
    const VALUE_TYPE: ValueType = ValueType::Bool;

    fn from_bits(bits: u64) -> Self {
        bits != 0
    }
    fn to_bits(self) -> u64 {
        self as u64
    }
    fn into_sample(data: Vec<Self>) -> SampleData {
        SampleData::Bool(data)
    }
}

impl BufferElement for i32 {
    const VALUE_TYPE: ValueType = ValueType::Int;

    fn from_bits(bits: u64) -> Self {
        bits as u32 as i32
    }
    fn to_bits(self) -> u64 {
        self as u32 as u64
    }
    fn into_sample(data: Vec<Self>) -> SampleData {
        SampleData::Int(data)
    }
}

impl BufferElement for i64 {
    const VALUE_TYPE: ValueType = ValueType::Long;

    fn from_bits(bits: u64) -> Self {
        bits as i64
    }
    fn to_bits(self) -> u64 {
        self as u64
    }
    fn into_sample(data: Vec<Self>) -> SampleData {
        SampleData::Long(data)
    }
}

impl BufferElement for f64 {
    const VALUE_TYPE: ValueType = ValueType::Double;

    fn from_bits(bits: u64) -> Self {
        f64::from_bits(bits)
    }
    fn to_bits(self) -> u64 {
        f64::to_bits(self)
    }
    fn into_sample(data: Vec<Self>) -> SampleData {
        SampleData::Double(data)
    }
}

/// Enum ordinals; the null value is stored as `NULL_ORDINAL`.
impl BufferElement for i8 {
    const VALUE_TYPE: ValueType = ValueType::Enum;

    fn from_bits(bits: u64) -> Self {
        bits as u8 as i8
    }
    fn to_bits(self) -> u64 {
        self as u8 as u64
    }
    fn into_sample(data: Vec<Self>) -> SampleData {
        SampleData::Enum(data)
    }
}

pub struct TypedBuffer<T: BufferElement> {
    variable: Arc<Variable>,
    ring: Vec<T>,
}

impl<T: BufferElement> TypedBuffer<T> {
    fn new(variable: Arc<Variable>, size: usize) -> Self {
        TypedBuffer {
            variable,
            ring: vec![T::default(); size],
        }
    }

    fn resize(&mut self, copy_from: usize, new_length: usize) {
        if copy_from == 0 && new_length == self.ring.len() {
            return;
        }
        self.ring = ring_math::ring_array_copy(&self.ring, copy_from, new_length);
    }

    fn write_at(&mut self, index: usize) {
        self.ring[index] = T::from_bits(self.variable.load_bits());
    }

    fn read_at(&self, index: usize) -> bool {
        self.variable.store_bits(self.ring[index].to_bits())
    }

    fn fill(&mut self, zero: bool, from: usize, length: usize) {
        let value = if zero {
            T::default()
        } else {
            T::from_bits(self.variable.load_bits())
        };
        ring_math::ring_array_fill(&mut self.ring, value, from, length);
    }

    fn copy(&self, from: usize, length: usize, properties: BufferProperties) -> BufferSample {
        let data = ring_math::ring_array_copy(&self.ring, from, length);
        BufferSample::new(from, T::into_sample(data), properties)
    }

    fn load(&mut self, data: &[T]) -> Result<()> {
        if data.len() != self.ring.len() {
            return Err(BufferError::LengthMismatch {
                name: self.variable.full_name(),
                expected: self.ring.len(),
                actual: data.len(),
            });
        }
        self.ring.copy_from_slice(data);
        Ok(())
    }
}

pub enum VariableBuffer {
    Bool(TypedBuffer<bool>),
    Int(TypedBuffer<i32>),
    Long(TypedBuffer<i64>),
    Double(TypedBuffer<f64>),
    Enum(TypedBuffer<i8>),
}

macro_rules! dispatch {
    ($self:expr, $buffer:ident => $body:expr) => {
        match $self {
            VariableBuffer::Bool($buffer) => $body,
            VariableBuffer::Int($buffer) => $body,
            VariableBuffer::Long($buffer) => $body,
            VariableBuffer::Double($buffer) => $body,
            VariableBuffer::Enum($buffer) => $body,
        }
    };
}

impl VariableBuffer {
    pub fn new(variable: Arc<Variable>, size: usize) -> Self {
        match variable.kind() {
            VariableKind::Bool => VariableBuffer::Bool(TypedBuffer::new(variable, size)),
            VariableKind::Int => VariableBuffer::Int(TypedBuffer::new(variable, size)),
            VariableKind::Long => VariableBuffer::Long(TypedBuffer::new(variable, size)),
            VariableKind::Double => VariableBuffer::Double(TypedBuffer::new(variable, size)),
            VariableKind::Enum { .. } => VariableBuffer::Enum(TypedBuffer::new(variable, size)),
        }
    }

    pub fn variable(&self) -> &Arc<Variable> {
        dispatch!(self, b => &b.variable)
    }

    pub fn value_type(&self) -> ValueType {
        self.variable().value_type()
    }

    pub fn len(&self) -> usize {
        dispatch!(self, b => b.ring.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Rebuilds the ring as `new_length` slots read forward from `copy_from`.
    pub fn resize(&mut self, copy_from: usize, new_length: usize) {
        dispatch!(self, b => b.resize(copy_from, new_length))
    }

    /// Copies the live variable into slot `index`.
    pub fn write_at(&mut self, index: usize) {
        dispatch!(self, b => b.write_at(index))
    }

    /// Copies slot `index` into the live variable; returns whether the variable changed.
    pub fn read_at(&self, index: usize) -> bool {
        dispatch!(self, b => b.read_at(index))
    }

    pub fn fill(&mut self, zero: bool, from: usize, length: usize) {
        dispatch!(self, b => b.fill(zero, from, length))
    }

    pub fn copy(&self, from: usize, length: usize, properties: BufferProperties) -> BufferSample {
        dispatch!(self, b => b.copy(from, length, properties))
    }

    /// Bytes one sample of this variable occupies.
    pub fn frame_memory_size(&self) -> usize {
        match self {
            VariableBuffer::Bool(_) => size_of::<bool>(),
            VariableBuffer::Int(_) => size_of::<i32>(),
            VariableBuffer::Long(_) => size_of::<i64>(),
            VariableBuffer::Double(_) => size_of::<f64>(),
            VariableBuffer::Enum(_) => size_of::<i8>(),
        }
    }

    /// Replaces the whole ring with `data`, which must match in type and length.
    pub fn load(&mut self, data: &SampleData) -> Result<()> {
        match (self, data) {
            (VariableBuffer::Bool(b), SampleData::Bool(v)) => b.load(v),
            (VariableBuffer::Int(b), SampleData::Int(v)) => b.load(v),
            (VariableBuffer::Long(b), SampleData::Long(v)) => b.load(v),
            (VariableBuffer::Double(b), SampleData::Double(v)) => b.load(v),
            (VariableBuffer::Enum(b), SampleData::Enum(v)) => b.load(v),
            (buffer, data) => Err(BufferError::TypeMismatch {
                name: buffer.variable().full_name(),
                expected: data.value_type(),
                actual: buffer.value_type(),
            }),
        }
    }
}
