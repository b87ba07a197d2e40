// ============================================================================
// Entity Capabilities
// ============================================================================
//
// The engine never inspects entity values directly. It needs two things,
// supplied by composition: how to name an entity and how to compare two.
//
// ============================================================================

use super::error::{DeltaError, Result};
use serde_json::Value as JsonValue;
use std::collections::HashSet;

/// Extracts the dataset-unique identifier of an entity.
pub trait EntityIdentity<E>: Send + Sync {
    fn identifier(&self, entity: &E) -> Result<String>;
}

impl<E, F> EntityIdentity<E> for F
where
    F: Fn(&E) -> String + Send + Sync,
{
    fn identifier(&self, entity: &E) -> Result<String> {
        Ok(self(entity))
    }
}

/// Semantic equality between two entity values.
///
/// Must be reflexive, symmetric and deterministic for classification to be
/// stable across runs.
pub trait EqualityPredicate<E>: Send + Sync {
    fn is_equal(&self, left: &E, right: &E) -> Result<bool>;
}

impl<E, F> EqualityPredicate<E> for F
where
    F: Fn(&E, &E) -> bool + Send + Sync,
{
    fn is_equal(&self, left: &E, right: &E) -> Result<bool> {
        Ok(self(left, right))
    }
}

/// Compare possibly-absent values; an absent side is never equal.
pub fn values_equal<E, P>(predicate: &P, left: Option<&E>, right: Option<&E>) -> Result<bool>
where
    P: EqualityPredicate<E> + ?Sized,
{
    match (left, right) {
        (Some(l), Some(r)) => predicate.is_equal(l, r),
        _ => Ok(false),
    }
}

/// Identity taken from a top-level field of a JSON object.
#[derive(Debug, Clone)]
pub struct JsonField {
    field: String,
}

impl JsonField {
    pub fn new(field: impl Into<String>) -> Self {
        Self { field: field.into() }
    }
}

impl EntityIdentity<JsonValue> for JsonField {
    fn identifier(&self, entity: &JsonValue) -> Result<String> {
        match entity.get(&self.field) {
            Some(JsonValue::String(s)) if !s.is_empty() => Ok(s.clone()),
            Some(JsonValue::Number(n)) => Ok(n.to_string()),
            Some(other) => Err(DeltaError::Identity(format!(
                "field '{}' must be a non-empty string or a number, got {}",
                self.field, other
            ))),
            None => Err(DeltaError::Identity(format!(
                "field '{}' missing from entity",
                self.field
            ))),
        }
    }
}

/// Structural JSON equality, optionally blind to volatile top-level fields.
#[derive(Debug, Clone, Default)]
pub struct JsonEquality {
    ignored: HashSet<String>,
}

impl JsonEquality {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ignore_field(mut self, field: impl Into<String>) -> Self {
        self.ignored.insert(field.into());
        self
    }
}

impl EqualityPredicate<JsonValue> for JsonEquality {
    fn is_equal(&self, left: &JsonValue, right: &JsonValue) -> Result<bool> {
        if self.ignored.is_empty() {
            return Ok(left == right);
        }
        match (left, right) {
            (JsonValue::Object(l), JsonValue::Object(r)) => {
                let visible = |k: &String| !self.ignored.contains(k);
                let l_keys = l.keys().filter(|k| visible(k)).count();
                let r_keys = r.keys().filter(|k| visible(k)).count();
                if l_keys != r_keys {
                    return Ok(false);
                }
                Ok(l
                    .iter()
                    .filter(|(k, _)| visible(k))
                    .all(|(k, v)| r.get(k) == Some(v)))
            }
            _ => Ok(left == right),
        }
    }
}
