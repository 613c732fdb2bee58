//! Property values shared by processes and model components.
//!
//! The set of shapes a property can take is small and closed: fixed width
//! numerics, strings, up to three levels of nested string lists, and two
//! enumerations. `PropertyValue` models exactly that set; the XML codec in
//! `serialiser::codec` matches on it directly.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Rule mapping an iteration step to a position in a per-iteration parameter list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AdvanceParameter {
    /// Consume entries sequentially, then keep reusing the last one.
    UseUp,
    /// Consume entries sequentially, wrapping to the first after the last.
    Cycle,
    /// Index by the host's current iteration step.
    #[default]
    SyncWithHost,
}

impl AdvanceParameter {
    /// Symbolic name used in model files.
    pub fn symbol(&self) -> &'static str {
        match self {
            AdvanceParameter::UseUp => "NM_USE_UP",
            AdvanceParameter::Cycle => "NM_CYCLE",
            AdvanceParameter::SyncWithHost => "NM_SYNC_WITH_HOST",
        }
    }

    pub fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol {
            "NM_USE_UP" => Some(AdvanceParameter::UseUp),
            "NM_CYCLE" => Some(AdvanceParameter::Cycle),
            "NM_SYNC_WITH_HOST" => Some(AdvanceParameter::SyncWithHost),
            _ => None,
        }
    }

    /// Map a step onto an index into a list of `len` entries.
    ///
    /// `step` is the process's own consumption counter, `host_step` the
    /// enclosing aggregate's current (0-based) iteration. Returns `None` for
    /// an empty list.
    pub fn index(self, step: usize, host_step: usize, len: usize) -> Option<usize> {
        if len == 0 {
            return None;
        }
        let idx = match self {
            AdvanceParameter::UseUp => step.min(len - 1),
            AdvanceParameter::Cycle => step % len,
            AdvanceParameter::SyncWithHost => host_step % len,
        };
        Some(idx)
    }

    pub fn all() -> &'static [AdvanceParameter] {
        &[
            AdvanceParameter::UseUp,
            AdvanceParameter::Cycle,
            AdvanceParameter::SyncWithHost,
        ]
    }
}

impl fmt::Display for AdvanceParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

/// Pixel component type of a data object handled by a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ComponentType {
    #[default]
    Unknown,
    UChar,
    Char,
    UShort,
    Short,
    UInt,
    Int,
    ULong,
    Long,
    ULongLong,
    LongLong,
    Float,
    Double,
}

impl ComponentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComponentType::Unknown => "unknown",
            ComponentType::UChar => "uchar",
            ComponentType::Char => "char",
            ComponentType::UShort => "ushort",
            ComponentType::Short => "short",
            ComponentType::UInt => "uint",
            ComponentType::Int => "int",
            ComponentType::ULong => "ulong",
            ComponentType::Long => "long",
            ComponentType::ULongLong => "ulonglong",
            ComponentType::LongLong => "longlong",
            ComponentType::Float => "float",
            ComponentType::Double => "double",
        }
    }

    /// Case-insensitive lookup; anything unrecognised maps to `Unknown`.
    pub fn from_name(name: &str) -> Self {
        let name = name.trim();
        Self::all()
            .iter()
            .copied()
            .find(|t| t.as_str().eq_ignore_ascii_case(name))
            .unwrap_or(ComponentType::Unknown)
    }

    pub fn all() -> &'static [ComponentType] {
        &[
            ComponentType::Unknown,
            ComponentType::UChar,
            ComponentType::Char,
            ComponentType::UShort,
            ComponentType::Short,
            ComponentType::UInt,
            ComponentType::Int,
            ComponentType::ULong,
            ComponentType::Long,
            ComponentType::ULongLong,
            ComponentType::LongLong,
            ComponentType::Float,
            ComponentType::Double,
        ]
    }
}

impl fmt::Display for ComponentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A dynamically typed property value.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    String(String),
    StringList(Vec<String>),
    ListStringList(Vec<Vec<String>>),
    ListListStringList(Vec<Vec<Vec<String>>>),
    ComponentType(ComponentType),
    AdvanceParameter(AdvanceParameter),
    UChar(u8),
    Char(i8),
    UShort(u16),
    Short(i16),
    UInt(u32),
    Int(i32),
    ULong(u64),
    Long(i64),
    Float(f32),
    Double(f64),
    Bool(bool),
}

impl PropertyValue {
    /// Type tag naming this value's shape in model files.
    pub fn type_tag(&self) -> &'static str {
        match self {
            PropertyValue::String(_) => "string",
            PropertyValue::StringList(_) => "stringlist",
            PropertyValue::ListStringList(_) => "list_stringlist",
            PropertyValue::ListListStringList(_) => "list_list_stringlist",
            PropertyValue::ComponentType(_) => "component_type",
            PropertyValue::AdvanceParameter(_) => "advance_parameter",
            PropertyValue::UChar(_) => "uchar",
            PropertyValue::Char(_) => "char",
            PropertyValue::UShort(_) => "ushort",
            PropertyValue::Short(_) => "short",
            PropertyValue::UInt(_) => "uint",
            PropertyValue::Int(_) => "int",
            PropertyValue::ULong(_) => "ulong",
            PropertyValue::Long(_) => "long",
            PropertyValue::Float(_) => "float",
            PropertyValue::Double(_) => "double",
            PropertyValue::Bool(_) => "bool",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::String(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_string_list(&self) -> Option<&[String]> {
        match self {
            PropertyValue::StringList(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_list_string_list(&self) -> Option<&[Vec<String>]> {
        match self {
            PropertyValue::ListStringList(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropertyValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_advance_parameter(&self) -> Option<AdvanceParameter> {
        match self {
            PropertyValue::AdvanceParameter(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_component_type(&self) -> Option<ComponentType> {
        match self {
            PropertyValue::ComponentType(v) => Some(*v),
            _ => None,
        }
    }

    /// Any integer variant widened to `i64`.
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            PropertyValue::UChar(v) => Some(v as i64),
            PropertyValue::Char(v) => Some(v as i64),
            PropertyValue::UShort(v) => Some(v as i64),
            PropertyValue::Short(v) => Some(v as i64),
            PropertyValue::UInt(v) => Some(v as i64),
            PropertyValue::Int(v) => Some(v as i64),
            PropertyValue::ULong(v) => i64::try_from(v).ok(),
            PropertyValue::Long(v) => Some(v),
            _ => None,
        }
    }

    /// Any numeric variant widened to `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            PropertyValue::Float(v) => Some(v as f64),
            PropertyValue::Double(v) => Some(v),
            PropertyValue::ULong(v) => Some(v as f64),
            _ => self.as_i64().map(|v| v as f64),
        }
    }

    /// True when both values have the same variant.
    pub fn same_shape(&self, other: &PropertyValue) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}

impl From<&str> for PropertyValue {
    fn from(v: &str) -> Self {
        PropertyValue::String(v.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(v: String) -> Self {
        PropertyValue::String(v)
    }
}

impl From<Vec<String>> for PropertyValue {
    fn from(v: Vec<String>) -> Self {
        PropertyValue::StringList(v)
    }
}

impl From<Vec<Vec<String>>> for PropertyValue {
    fn from(v: Vec<Vec<String>>) -> Self {
        PropertyValue::ListStringList(v)
    }
}

impl From<bool> for PropertyValue {
    fn from(v: bool) -> Self {
        PropertyValue::Bool(v)
    }
}

impl From<u32> for PropertyValue {
    fn from(v: u32) -> Self {
        PropertyValue::UInt(v)
    }
}

impl From<f64> for PropertyValue {
    fn from(v: f64) -> Self {
        PropertyValue::Double(v)
    }
}

impl From<AdvanceParameter> for PropertyValue {
    fn from(v: AdvanceParameter) -> Self {
        PropertyValue::AdvanceParameter(v)
    }
}

impl From<ComponentType> for PropertyValue {
    fn from(v: ComponentType) -> Self {
        PropertyValue::ComponentType(v)
    }
}

/// Ordered collection of named properties.
///
/// Declaration order is preserved so model files list properties the same
/// way every time they are written.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropertyBag {
    entries: Vec<(String, PropertyValue)>,
}

impl PropertyBag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, used by process constructors to declare parameters.
    pub fn with(mut self, name: &str, value: impl Into<PropertyValue>) -> Self {
        self.set(name, value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&PropertyValue> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|(n, _)| n == name)
    }

    /// Insert or replace; returns the previous value.
    pub fn set(&mut self, name: &str, value: PropertyValue) -> Option<PropertyValue> {
        match self.entries.iter_mut().find(|(n, _)| n == name) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.entries.push((name.to_string(), value));
                None
            }
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<PropertyValue> {
        let pos = self.entries.iter().position(|(n, _)| n == name)?;
        Some(self.entries.remove(pos).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PropertyValue)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
