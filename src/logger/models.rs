use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Persisted machine entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct MachineRecord {
    pub id: i64,
    pub identifier: String,
    pub name: String,
    pub interval: i64,
    pub description: String,
    pub classification: String,
    pub buffer_size: i64,
    pub buffer_roll_type: String,
    pub criticity: i64,
    pub priority: i64,
}

/// Fields required to create a machine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMachine {
    pub identifier: String,
    pub name: String,
    pub interval: i64,
    pub description: String,
    pub classification: String,
    pub buffer_size: i64,
    pub buffer_roll_type: String,
    pub criticity: i64,
    pub priority: i64,
}

/// Partial update of a machine located by name.
///
/// `None` leaves the stored field untouched; `Some` overwrites it, zero and
/// empty values included.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineUpdate {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classification: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buffer_size: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buffer_roll_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub criticity: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i64>,
}

impl MachineUpdate {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn interval(mut self, interval: i64) -> Self {
        self.interval = Some(interval);
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn classification(mut self, classification: impl Into<String>) -> Self {
        self.classification = Some(classification.into());
        self
    }

    pub fn buffer_size(mut self, buffer_size: i64) -> Self {
        self.buffer_size = Some(buffer_size);
        self
    }

    pub fn buffer_roll_type(mut self, buffer_roll_type: impl Into<String>) -> Self {
        self.buffer_roll_type = Some(buffer_roll_type.into());
        self
    }

    pub fn criticity(mut self, criticity: i64) -> Self {
        self.criticity = Some(criticity);
        self
    }

    pub fn priority(mut self, priority: i64) -> Self {
        self.priority = Some(priority);
        self
    }

    /// True when no field besides the lookup name was supplied
    pub fn is_empty(&self) -> bool {
        self.field_count() == 0
    }

    pub fn field_count(&self) -> usize {
        [
            self.interval.is_some(),
            self.description.is_some(),
            self.classification.is_some(),
            self.buffer_size.is_some(),
            self.buffer_roll_type.is_some(),
            self.criticity.is_some(),
            self.priority.is_some(),
        ]
        .into_iter()
        .filter(|supplied| *supplied)
        .count()
    }
}

/// Runtime-relevant subset of a machine, keyed by name in `read_config`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct MachineConfig {
    pub name: String,
    pub interval: i64,
    pub buffer_size: i64,
    pub buffer_roll_type: String,
    pub criticity: i64,
    pub priority: i64,
}

/// Association between a tag and a machine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct TagBinding {
    pub id: i64,
    pub tag_name: String,
    pub machine_id: i64,
    pub default_tag_name: Option<String>,
}
