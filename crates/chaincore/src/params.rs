use crate::{NodeError, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Per-node option maps keyed by node identifier, as supplied by the caller.
pub type NodeParamsMap = BTreeMap<String, NodeParams>;

/// Named options bound to a single node.
///
/// Getters treat an explicit `null` the same as an absent key, and fail with
/// [`NodeError::InvalidParam`] when a key is present with the wrong type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeParams(BTreeMap<String, Value>);

impl NodeParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Raw access; `null` is reported as absent.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name).filter(|v| !v.is_null())
    }

    pub fn get_str(&self, name: &str) -> Result<Option<&str>, NodeError> {
        self.typed(name, "string", Value::as_str)
    }

    /// Like [`get_str`](Self::get_str) but an empty string counts as absent.
    pub fn get_non_empty_str(&self, name: &str) -> Result<Option<&str>, NodeError> {
        Ok(self.get_str(name)?.filter(|s| !s.trim().is_empty()))
    }

    pub fn get_f64(&self, name: &str) -> Result<Option<f64>, NodeError> {
        self.typed(name, "number", Value::as_f64)
    }

    pub fn get_u64(&self, name: &str) -> Result<Option<u64>, NodeError> {
        self.typed(name, "non-negative integer", Value::as_u64)
    }

    pub fn get_bool(&self, name: &str) -> Result<Option<bool>, NodeError> {
        self.typed(name, "boolean", Value::as_bool)
    }

    pub fn get_array(&self, name: &str) -> Result<Option<&[Value]>, NodeError> {
        self.typed(name, "array", Value::as_array)
    }

    pub fn require_str(&self, name: &str) -> Result<&str, NodeError> {
        self.get_non_empty_str(name)?
            .ok_or_else(|| NodeError::MissingParam(name.to_string()))
    }

    fn typed<'a, T>(
        &'a self,
        name: &str,
        expected: &str,
        extract: impl FnOnce(&'a Value) -> Option<T>,
    ) -> Result<Option<T>, NodeError> {
        match self.get(name) {
            None => Ok(None),
            Some(value) => extract(value).map(Some).ok_or_else(|| NodeError::InvalidParam {
                param: name.to_string(),
                reason: format!("expected {}", expected),
            }),
        }
    }
}

impl FromIterator<(String, Value)> for NodeParams {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Provider credentials for one run.
///
/// Values are opaque to the engine: a string token, or an object for
/// providers that need several fields (SMTP, database connections).
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApiKeys(BTreeMap<String, Value>);

impl ApiKeys {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, provider: impl Into<String>, credential: impl Into<Value>) -> Self {
        self.0.insert(provider.into(), credential.into());
        self
    }

    pub fn get(&self, provider: &str) -> Option<&Value> {
        self.0.get(provider).filter(|v| !v.is_null())
    }

    /// Non-empty string credential, if present.
    pub fn get_str(&self, provider: &str) -> Option<&str> {
        self.get(provider)
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
    }

    pub fn require_str(&self, provider: &str) -> Result<&str, NodeError> {
        self.get_str(provider)
            .ok_or_else(|| NodeError::MissingCredential(provider.to_string()))
    }

    pub fn require_object(&self, provider: &str) -> Result<&BTreeMap<String, Value>, NodeError> {
        self.get(provider)
            .and_then(Value::as_object)
            .ok_or_else(|| NodeError::MissingCredential(provider.to_string()))
    }

    pub fn providers(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

// Credentials never show up in logs.
impl fmt::Debug for ApiKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.0.keys()).finish()
    }
}
