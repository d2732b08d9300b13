//! Tracked scalar variables and their value types.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{BufferError, Result};

/// Ordinal stored for an enum variable holding no value.
pub const NULL_ORDINAL: i8 = -1;

/// Largest number of constants an enum variable may declare; ordinals must fit in an `i8`.
pub const MAX_ENUM_CONSTANTS: usize = i8::MAX as usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueType {
    Bool,
    Int,
    Long,
    Double,
    Enum,
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueType::Bool => "bool",
            ValueType::Int => "int32",
            ValueType::Long => "int64",
            ValueType::Double => "float64",
            ValueType::Enum => "enum",
        };
        f.pad(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum VariableKind {
    Bool,
    Int,
    Long,
    Double,
    Enum {
        constants: Arc<[String]>,
        allow_null: bool,
    },
}

impl VariableKind {
    pub fn enumeration<S: Into<String>>(
        constants: impl IntoIterator<Item = S>,
        allow_null: bool,
    ) -> Result<Self> {
        let constants: Vec<String> = constants.into_iter().map(Into::into).collect();
        if constants.len() > MAX_ENUM_CONSTANTS {
            return Err(BufferError::TooManyEnumConstants {
                count: constants.len(),
                max: MAX_ENUM_CONSTANTS,
            });
        }
        Ok(VariableKind::Enum {
            constants: constants.into(),
            allow_null,
        })
    }

    pub fn value_type(&self) -> ValueType {
        match self {
            VariableKind::Bool => ValueType::Bool,
            VariableKind::Int => ValueType::Int,
            VariableKind::Long => ValueType::Long,
            VariableKind::Double => ValueType::Double,
            VariableKind::Enum { .. } => ValueType::Enum,
        }
    }

    pub fn enum_constants(&self) -> Option<&[String]> {
        match self {
            VariableKind::Enum { constants, .. } => Some(constants),
            _ => None,
        }
    }

    fn default_value(&self) -> Value {
        match self {
            VariableKind::Bool => Value::Bool(false),
            VariableKind::Int => Value::Int(0),
            VariableKind::Long => Value::Long(0),
            VariableKind::Double => Value::Double(0.0),
            VariableKind::Enum { allow_null: true, .. } => Value::Enum(None),
            VariableKind::Enum { .. } => Value::Enum(Some(0)),
        }
    }
}

/// A snapshot of one variable's value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Bool(bool),
    Int(i32),
    Long(i64),
    Double(f64),
    Enum(Option<u8>),
}

impl Value {
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Bool(_) => ValueType::Bool,
            Value::Int(_) => ValueType::Int,
            Value::Long(_) => ValueType::Long,
            Value::Double(_) => ValueType::Double,
            Value::Enum(_) => ValueType::Enum,
        }
    }

    /// Numeric view used by plotting and statistics; null enums map to `-1.0`.
    pub fn as_f64(&self) -> f64 {
        match *self {
            Value::Bool(b) => {
                if b {
                    1.0
                } else {
                    0.0
                }
            }
            Value::Int(v) => v as f64,
            Value::Long(v) => v as f64,
            Value::Double(v) => v,
            Value::Enum(Some(o)) => o as f64,
            Value::Enum(None) => NULL_ORDINAL as f64,
        }
    }

    pub(crate) fn to_bits(self) -> u64 {
        match self {
            Value::Bool(b) => b as u64,
            Value::Int(v) => v as u32 as u64,
            Value::Long(v) => v as u64,
            Value::Double(v) => v.to_bits(),
            Value::Enum(Some(o)) => o as i8 as u8 as u64,
            Value::Enum(None) => NULL_ORDINAL as u8 as u64,
        }
    }

    pub(crate) fn from_bits(bits: u64, value_type: ValueType) -> Value {
        match value_type {
            ValueType::Bool => Value::Bool(bits != 0),
            ValueType::Int => Value::Int(bits as u32 as i32),
            ValueType::Long => Value::Long(bits as i64),
            ValueType::Double => Value::Double(f64::from_bits(bits)),
            ValueType::Enum => match bits as u8 as i8 {
                o if o < 0 => Value::Enum(None),
                o => Value::Enum(Some(o as u8)),
            },
        }
    }
}

/// Dot-separated path of registry names, e.g. `root.robot.leg`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Namespace(Vec<String>);

impl Namespace {
    pub fn new<S: Into<String>>(segments: impl IntoIterator<Item = S>) -> Self {
        Namespace(segments.into_iter().map(Into::into).collect())
    }

    pub fn parse(path: &str) -> Self {
        if path.is_empty() {
            return Namespace::default();
        }
        Namespace(path.split('.').map(str::to_owned).collect())
    }

    pub fn child(&self, name: &str) -> Namespace {
        let mut segments = self.0.clone();
        segments.push(name.to_owned());
        Namespace(segments)
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn starts_with(&self, prefix: &Namespace) -> bool {
        self.0.starts_with(&prefix.0)
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("."))
    }
}

/// Splits `root.robot.q` into (`root.robot`, `q`).
pub fn split_full_name(full_name: &str) -> (Namespace, &str) {
    match full_name.rsplit_once('.') {
        Some((namespace, name)) => (Namespace::parse(namespace), name),
        None => (Namespace::default(), full_name),
    }
}

pub(crate) fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name.contains('.') {
        return Err(BufferError::InvalidName(name.to_owned()));
    }
    Ok(())
}

/// A named scalar owned by the simulation or by a consumer.
///
/// The value lives in one atomic cell so a reader on another thread never observes half a write.
#[derive(Debug)]
pub struct Variable {
    name: String,
    namespace: Namespace,
    kind: VariableKind,
    bits: AtomicU64,
}

impl Variable {
    /// A variable outside any registry.
    pub fn new(name: &str, kind: VariableKind) -> Result<Arc<Variable>> {
        Variable::with_namespace(name, Namespace::default(), kind)
    }

    pub(crate) fn with_namespace(
        name: &str,
        namespace: Namespace,
        kind: VariableKind,
    ) -> Result<Arc<Variable>> {
        validate_name(name)?;
        let bits = kind.default_value().to_bits();
        Ok(Arc::new(Variable {
            name: name.to_owned(),
            namespace,
            kind,
            bits: AtomicU64::new(bits),
        }))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    pub fn full_name(&self) -> String {
        if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.namespace, self.name)
        }
    }

    pub fn kind(&self) -> &VariableKind {
        &self.kind
    }

    pub fn value_type(&self) -> ValueType {
        self.kind.value_type()
    }

    pub fn value(&self) -> Value {
        Value::from_bits(self.load_bits(), self.value_type())
    }

    /// Stores `value`, returning whether the variable changed.
    pub fn set_value(&self, value: Value) -> Result<bool> {
        self.check(&value)?;
        Ok(self.store_bits(value.to_bits()))
    }

    fn check(&self, value: &Value) -> Result<()> {
        if value.value_type() != self.value_type() {
            return Err(BufferError::TypeMismatch {
                name: self.full_name(),
                expected: value.value_type(),
                actual: self.value_type(),
            });
        }

        if let (VariableKind::Enum { constants, allow_null }, Value::Enum(ordinal)) =
            (&self.kind, value)
        {
            match ordinal {
                None if !allow_null => return Err(BufferError::NullNotAllowed(self.full_name())),
                Some(o) if *o as usize >= constants.len() => {
                    return Err(BufferError::InvalidOrdinal {
                        name: self.full_name(),
                        ordinal: *o,
                        count: constants.len(),
                    })
                }
                _ => {}
            }
        }
        Ok(())
    }

    pub(crate) fn load_bits(&self) -> u64 {
        self.bits.load(Ordering::Acquire)
    }

    pub(crate) fn store_bits(&self, bits: u64) -> bool {
        self.bits.swap(bits, Ordering::AcqRel) != bits
    }
}
