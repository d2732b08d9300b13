use serde::{Deserialize, Serialize};

use crate::properties::BufferProperties;
use crate::ring_math;
use crate::variable::{Value, ValueType};

/// Linear, typed copy of ring slots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SampleData {
    Bool(Vec<bool>),
    Int(Vec<i32>),
    Long(Vec<i64>),
    Double(Vec<f64>),
    /// Ordinals; negative means null.
    Enum(Vec<i8>),
}

impl SampleData {
    pub fn len(&self) -> usize {
        match self {
            SampleData::Bool(v) => v.len(),
            SampleData::Int(v) => v.len(),
            SampleData::Long(v) => v.len(),
            SampleData::Double(v) => v.len(),
            SampleData::Enum(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn value_type(&self) -> ValueType {
        match self {
            SampleData::Bool(_) => ValueType::Bool,
            SampleData::Int(_) => ValueType::Int,
            SampleData::Long(_) => ValueType::Long,
            SampleData::Double(_) => ValueType::Double,
            SampleData::Enum(_) => ValueType::Enum,
        }
    }

    pub fn value(&self, index: usize) -> Option<Value> {
        let value = match self {
            SampleData::Bool(v) => Value::Bool(*v.get(index)?),
            SampleData::Int(v) => Value::Int(*v.get(index)?),
            SampleData::Long(v) => Value::Long(*v.get(index)?),
            SampleData::Double(v) => Value::Double(*v.get(index)?),
            SampleData::Enum(v) => match *v.get(index)? {
                o if o < 0 => Value::Enum(None),
                o => Value::Enum(Some(o as u8)),
            },
        };
        Some(value)
    }

    pub fn to_f64_vec(&self) -> Vec<f64> {
        (0..self.len())
            .filter_map(|i| self.value(i))
            .map(|v| v.as_f64())
            .collect()
    }
}

/// An immutable window of one variable's history, captured by the buffer manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BufferSample {
    from: usize,
    data: SampleData,
    properties: BufferProperties,
}

impl BufferSample {
    pub fn new(from: usize, data: SampleData, properties: BufferProperties) -> Self {
        BufferSample {
            from,
            data,
            properties,
        }
    }

    /// Ring index of the first sampled slot.
    pub fn from(&self) -> usize {
        self.from
    }

    pub fn length(&self) -> usize {
        self.data.len()
    }

    /// Ring index of the last sampled slot, inclusive.
    pub fn to(&self) -> usize {
        ring_math::to_index(self.from, self.length(), self.properties.size())
    }

    pub fn buffer_size(&self) -> usize {
        self.properties.size()
    }

    /// Buffer geometry at the moment the sample was taken.
    pub fn properties(&self) -> &BufferProperties {
        &self.properties
    }

    pub fn data(&self) -> &SampleData {
        &self.data
    }

    pub fn into_data(self) -> SampleData {
        self.data
    }
}
