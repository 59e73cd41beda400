//! `_Parameters` attribute decoding.
//!
//! The attribute holds a JSON list of `{name, type, value}` objects. Each
//! value is coerced to the declared type; an element that does not coerce is
//! dropped with a diagnostic, never replaced by a default.

use crate::model::{ParamType, Parameter};
use serde::Deserialize;
use serde_json::{Number, Value};
use tracing::warn;

#[derive(Debug, Deserialize)]
struct RawParameter {
    #[serde(default)]
    name: String,
    #[serde(default, rename = "type")]
    param_type: String,
    #[serde(default)]
    value: Value,
}

/// Decode the `_Parameters` JSON of node `node_id`.
///
/// Malformed JSON (or JSON that is not a list) yields an empty list for this
/// node only.
pub fn decode_parameters(node_id: &str, raw: &str, diagnostics: &mut Vec<String>) -> Vec<Parameter> {
    let decoded: Value = match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(e) => {
            report(diagnostics, format!("{}: malformed _Parameters JSON: {}", node_id, e));
            return Vec::new();
        }
    };
    let Value::Array(items) = decoded else {
        report(diagnostics, format!("{}: decoded _Parameters JSON is not a list", node_id));
        return Vec::new();
    };

    let mut parameters = Vec::new();
    for item in items {
        let raw_param: RawParameter = match serde_json::from_value(item) {
            Ok(p) => p,
            Err(e) => {
                report(diagnostics, format!("{}: skipping malformed parameter entry: {}", node_id, e));
                continue;
            }
        };
        parameters.push(coerce_parameter(node_id, raw_param, diagnostics));
    }
    parameters
}

fn coerce_parameter(node_id: &str, raw: RawParameter, diagnostics: &mut Vec<String>) -> Parameter {
    let param_type = ParamType::from_declared(&raw.param_type);
    let items = match raw.value {
        Value::Array(items) => items,
        Value::Null => Vec::new(),
        single => vec![single],
    };

    let mut values = Vec::with_capacity(items.len());
    for item in items {
        match coerce_value(param_type, &item) {
            Some(v) => values.push(v),
            None => report(
                diagnostics,
                format!(
                    "{}: parameter '{}' value {} is not a valid {}, skipped",
                    node_id, raw.name, item, raw.param_type
                ),
            ),
        }
    }

    Parameter {
        name: raw.name,
        param_type,
        values,
    }
}

/// Coerce one value; `None` means the value does not fit the type.
fn coerce_value(param_type: ParamType, value: &Value) -> Option<Value> {
    match param_type {
        ParamType::Bool => match value {
            Value::Bool(b) => Some(Value::Bool(*b)),
            Value::String(s) if s.trim().eq_ignore_ascii_case("true") => Some(Value::Bool(true)),
            Value::String(s) if s.trim().eq_ignore_ascii_case("false") => Some(Value::Bool(false)),
            _ => None,
        },
        ParamType::Int => match value {
            Value::Number(n) if n.is_i64() || n.is_u64() => Some(value.clone()),
            Value::String(s) => s.trim().parse::<i64>().ok().map(Value::from),
            _ => None,
        },
        ParamType::Float => {
            let f = match value {
                Value::Number(n) => n.as_f64(),
                Value::String(s) => s.trim().parse::<f64>().ok(),
                _ => None,
            }?;
            Number::from_f64(f).map(Value::Number)
        }
        ParamType::Array => match value {
            Value::Array(_) => Some(value.clone()),
            Value::String(s) => match serde_json::from_str::<Value>(s) {
                Ok(decoded @ Value::Array(_)) => Some(decoded),
                _ => None,
            },
            _ => None,
        },
        ParamType::String => match value {
            Value::String(_) => Some(value.clone()),
            Value::Null => None,
            other => Some(Value::String(other.to_string())),
        },
    }
}

fn report(diagnostics: &mut Vec<String>, message: String) {
    warn!("{}", message);
    diagnostics.push(message);
}
