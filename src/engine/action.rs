use std::collections::HashMap;

use super::errors::{EngineError, EngineResult};

/// A named operation with its parameters, queued for serialized execution.
///
/// The value type `V` is chosen by the handler: loggers take plain JSON,
/// the current value table takes values that may carry observer handles.
#[derive(Debug, Clone)]
pub struct Action<V = serde_json::Value> {
    operation: String,
    parameters: HashMap<String, V>,
}

impl<V> Action<V> {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            parameters: HashMap::new(),
        }
    }

    /// Add one parameter, replacing any previous value under the same key
    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<V>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    pub fn with_parameters<I, K>(mut self, parameters: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
    {
        self.parameters
            .extend(parameters.into_iter().map(|(k, v)| (k.into(), v)));
        self
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    pub fn parameters(&self) -> &HashMap<String, V> {
        &self.parameters
    }

    pub fn parameter(&self, key: &str) -> Option<&V> {
        self.parameters.get(key)
    }

    /// Look up a parameter that the operation cannot run without
    pub fn require(&self, key: &str) -> EngineResult<&V> {
        self.parameters
            .get(key)
            .ok_or_else(|| EngineError::missing_parameter(key))
    }

    /// Move a parameter out of the action, used by handlers that own it
    pub fn take_parameter(&mut self, key: &str) -> Option<V> {
        self.parameters.remove(key)
    }

    pub fn into_parts(self) -> (String, HashMap<String, V>) {
        (self.operation, self.parameters)
    }
}
