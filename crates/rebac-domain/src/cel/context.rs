//! CEL execution context for variable bindings

use std::collections::HashMap;

use cel_interpreter::objects::Key;
use cel_interpreter::{Context, Value};
use chrono::{DateTime, FixedOffset};

use super::{CelError, CelResult};
use crate::model::ConditionParamType;

/// A context for CEL expression evaluation containing variable bindings.
///
/// Condition parameters are bound as top-level identifiers, so a condition
/// declared with parameter `ip` is written as `ip == "10.0.0.1"`.
#[derive(Debug, Default, Clone)]
pub struct CelContext {
    variables: HashMap<String, CelValue>,
}

/// A value that can be stored in a CEL context
#[derive(Debug, Clone, PartialEq)]
pub enum CelValue {
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    String(String),
    List(Vec<CelValue>),
    Map(HashMap<String, CelValue>),
    Timestamp(DateTime<FixedOffset>),
    Null,
}

impl CelValue {
    /// Converts a JSON value, letting the JSON shape pick the CEL type.
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => CelValue::Null,
            serde_json::Value::Bool(b) => CelValue::Bool(*b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    CelValue::Int(i)
                } else if let Some(u) = n.as_u64() {
                    CelValue::UInt(u)
                } else {
                    n.as_f64().map_or(CelValue::Null, CelValue::Float)
                }
            }
            serde_json::Value::String(s) => CelValue::String(s.clone()),
            serde_json::Value::Array(items) => {
                CelValue::List(items.iter().map(CelValue::from_json).collect())
            }
            serde_json::Value::Object(entries) => CelValue::Map(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), CelValue::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Converts a JSON value to the declared parameter type.
    pub fn from_typed_json(
        value: &serde_json::Value,
        param_type: ConditionParamType,
    ) -> CelResult<Self> {
        let mismatch = |expected: &str| CelError::TypeError {
            expected: expected.to_string(),
            actual: value.to_string(),
        };
        match param_type {
            ConditionParamType::Any => Ok(CelValue::from_json(value)),
            ConditionParamType::Bool => value.as_bool().map(CelValue::Bool).ok_or_else(|| mismatch("bool")),
            ConditionParamType::Int => value.as_i64().map(CelValue::Int).ok_or_else(|| mismatch("int")),
            ConditionParamType::Uint => value.as_u64().map(CelValue::UInt).ok_or_else(|| mismatch("uint")),
            ConditionParamType::Double => value.as_f64().map(CelValue::Float).ok_or_else(|| mismatch("double")),
            ConditionParamType::String => value
                .as_str()
                .map(|s| CelValue::String(s.to_string()))
                .ok_or_else(|| mismatch("string")),
            ConditionParamType::Timestamp => value
                .as_str()
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(CelValue::Timestamp)
                .ok_or_else(|| mismatch("RFC 3339 timestamp")),
            ConditionParamType::List => match value {
                serde_json::Value::Array(_) => Ok(CelValue::from_json(value)),
                _ => Err(mismatch("list")),
            },
            ConditionParamType::Map => match value {
                serde_json::Value::Object(_) => Ok(CelValue::from_json(value)),
                _ => Err(mismatch("map")),
            },
        }
    }
}

impl CelContext {
    /// Create a new empty context
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a variable, replacing any previous binding
    pub fn set(&mut self, name: impl Into<String>, value: CelValue) {
        self.variables.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&CelValue> {
        self.variables.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    /// Convert to cel_interpreter Context
    pub(crate) fn to_cel_context(&self) -> Context<'_> {
        let mut ctx = Context::default();
        for (name, value) in &self.variables {
            ctx.add_variable_from_value(name.as_str(), cel_value_to_value(value));
        }
        ctx
    }
}

fn cel_value_to_value(v: &CelValue) -> Value {
    match v {
        CelValue::Bool(b) => Value::Bool(*b),
        CelValue::Int(i) => Value::Int(*i),
        CelValue::UInt(u) => Value::UInt(*u),
        CelValue::Float(f) => Value::Float(*f),
        CelValue::String(s) => Value::String(s.clone().into()),
        CelValue::List(list) => Value::List(
            list.iter()
                .map(cel_value_to_value)
                .collect::<Vec<_>>()
                .into(),
        ),
        CelValue::Map(map) => {
            let converted: HashMap<Key, Value> = map
                .iter()
                .map(|(k, v)| (Key::String(k.clone().into()), cel_value_to_value(v)))
                .collect();
            Value::Map(converted.into())
        }
        CelValue::Timestamp(ts) => Value::Timestamp(*ts),
        CelValue::Null => Value::Null,
    }
}
