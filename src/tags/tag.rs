use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::observer::Notification;
use crate::engine::{EngineError, EngineResult};

/// Declared type of a tag's value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Bool,
    Integer,
    Float,
    String,
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool => write!(f, "bool"),
            Self::Integer => write!(f, "integer"),
            Self::Float => write!(f, "float"),
            Self::String => write!(f, "string"),
        }
    }
}

impl std::str::FromStr for DataType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bool" | "boolean" => Ok(Self::Bool),
            "integer" | "int" => Ok(Self::Integer),
            "float" => Ok(Self::Float),
            "string" | "str" => Ok(Self::String),
            _ => Err(format!("Invalid data type: {s}")),
        }
    }
}

/// Live value of a tag
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TagValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

impl TagValue {
    pub fn data_type(&self) -> DataType {
        match self {
            Self::Bool(_) => DataType::Bool,
            Self::Integer(_) => DataType::Integer,
            Self::Float(_) => DataType::Float,
            Self::String(_) => DataType::String,
        }
    }

    /// Zero value for a data type, used for tags created without an initial value
    pub fn default_for(data_type: DataType) -> Self {
        match data_type {
            DataType::Bool => Self::Bool(false),
            DataType::Integer => Self::Integer(0),
            DataType::Float => Self::Float(0.0),
            DataType::String => Self::String(String::new()),
        }
    }

    /// Convert to `data_type` when that is lossless; integers widen to floats
    pub fn coerce_to(self, data_type: DataType) -> Option<Self> {
        match (self, data_type) {
            (value, target) if value.data_type() == target => Some(value),
            (Self::Integer(i), DataType::Float) => Some(Self::Float(i as f64)),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl fmt::Display for TagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::String(s) => write!(f, "{s}"),
        }
    }
}

impl From<bool> for TagValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i32> for TagValue {
    fn from(value: i32) -> Self {
        Self::Integer(value.into())
    }
}

impl From<i64> for TagValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for TagValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for TagValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for TagValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

/// Everything needed to register a new tag in the current value table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagDefinition {
    pub name: String,
    pub data_type: DataType,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub initial: Option<TagValue>,
}

impl TagDefinition {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            unit: None,
            description: None,
            initial: None,
        }
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_initial(mut self, value: impl Into<TagValue>) -> Self {
        self.initial = Some(value.into());
        self
    }
}

/// Named, typed live data point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    pub id: Uuid,
    pub name: String,
    pub data_type: DataType,
    pub value: TagValue,
    pub unit: Option<String>,
    pub description: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl Tag {
    pub fn from_definition(definition: TagDefinition) -> EngineResult<Self> {
        if definition.name.trim().is_empty() {
            return Err(EngineError::validation("tag name must not be empty"));
        }

        let value = match definition.initial {
            Some(initial) => coerce(&definition.name, initial, definition.data_type)?,
            None => TagValue::default_for(definition.data_type),
        };

        Ok(Self {
            id: Uuid::new_v4(),
            name: definition.name,
            data_type: definition.data_type,
            value,
            unit: definition.unit,
            description: definition.description,
            timestamp: Utc::now(),
        })
    }

    /// Replace the current value, refusing values of another type
    pub fn assign(&mut self, value: TagValue) -> EngineResult<()> {
        self.value = coerce(&self.name, value, self.data_type)?;
        self.timestamp = Utc::now();
        Ok(())
    }

    pub fn notification(&self) -> Notification {
        Notification {
            tag_name: self.name.clone(),
            value: self.value.clone(),
            data_type: self.data_type,
            timestamp: self.timestamp,
        }
    }
}

fn coerce(name: &str, value: TagValue, data_type: DataType) -> EngineResult<TagValue> {
    let supplied = value.data_type();
    value.coerce_to(data_type).ok_or_else(|| {
        EngineError::validation(format!(
            "tag '{name}' expects {data_type} values, got {supplied}"
        ))
    })
}
