use super::error::ExecutorError;
use rwp_common::store::Store;
use std::collections::HashMap;

/// Per-execution view over the task input plus the mutable cross-execution
/// store. The input is read-only; store writes are echoed back to the
/// control plane in the response.
#[derive(Debug)]
pub struct ExecutionContext {
    input: HashMap<String, String>,
    store: Store,
}

impl ExecutionContext {
    pub fn new(input: HashMap<String, String>, store: HashMap<String, String>) -> Self {
        Self {
            input,
            store: Store::from_map(store),
        }
    }

    /// Derives a context over different input while sharing the store, so
    /// entries written by a delegated execution survive into the response.
    pub fn derived(input: HashMap<String, String>, store: Store) -> Self {
        Self { input, store }
    }

    pub fn input(&self) -> &HashMap<String, String> {
        &self.input
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Empty string when the key is missing.
    pub fn get_string(&self, key: &str) -> String {
        self.input.get(key).cloned().unwrap_or_default()
    }

    pub fn get_required_string(&self, key: &str) -> Result<String, ExecutorError> {
        self.input
            .get(key)
            .cloned()
            .ok_or_else(|| ExecutorError::RequiredKey(key.to_string()))
    }

    /// Base-10 unsigned integer; a missing key reads as 0.
    pub fn get_number(&self, key: &str) -> Result<u64, ExecutorError> {
        match self.input.get(key) {
            None => Ok(0),
            Some(value) => value.parse().map_err(|_| {
                ExecutorError::NonRetryable(format!(
                    "input value '{value}' for key '{key}' is not a valid number"
                ))
            }),
        }
    }

    /// JSON-object input; a missing key reads as an empty map.
    pub fn get_map(&self, key: &str) -> Result<HashMap<String, String>, ExecutorError> {
        match self.input.get(key) {
            None => Ok(HashMap::new()),
            Some(value) => serde_json::from_str(value).map_err(|err| {
                ExecutorError::NonRetryable(format!(
                    "input value for key '{key}' is not a valid JSON object: {err}"
                ))
            }),
        }
    }

    /// JSON-array input; a missing key reads as an empty list.
    pub fn get_list(&self, key: &str) -> Result<Vec<String>, ExecutorError> {
        match self.input.get(key) {
            None => Ok(Vec::new()),
            Some(value) => serde_json::from_str(value).map_err(|err| {
                ExecutorError::NonRetryable(format!(
                    "input value for key '{key}' is not a valid JSON array: {err}"
                ))
            }),
        }
    }

    /// Strict boolean: only the literals "true" and "false" are accepted.
    pub fn get_boolean(&self, key: &str) -> Result<bool, ExecutorError> {
        match self.input.get(key).map(String::as_str) {
            None => Ok(false),
            Some("true") => Ok(true),
            Some("false") => Ok(false),
            Some(other) => Err(ExecutorError::NonRetryable(format!(
                "input value '{other}' for key '{key}' is not a valid boolean"
            ))),
        }
    }
}
