//! Planning: from configuration (plus prior state) to the planned state
//!
//! For every attribute the planned value is, in order:
//! 1. the configured value;
//! 2. the attribute default;
//! 3. the prior state, when the attribute keeps state for unknown values;
//! 4. null, meaning unknown until the array answers.

use super::schema::{AttrType, Attribute, Schema};
use serde_json::{Map, Value};

/// Compute the planned state for a resource
pub fn plan(schema: &Schema, config: &Value, prior: Option<&Value>) -> Value {
    let empty = Map::new();
    let config = config.as_object().unwrap_or(&empty);
    let prior = prior.and_then(Value::as_object);
    Value::Object(plan_object(&schema.attributes, config, prior))
}

fn plan_object(
    attributes: &[Attribute],
    config: &Map<String, Value>,
    prior: Option<&Map<String, Value>>,
) -> Map<String, Value> {
    let mut planned = Map::new();
    for attr in attributes {
        let prior_value = prior
            .and_then(|p| p.get(attr.name))
            .filter(|v| !v.is_null());
        let value = match config.get(attr.name).filter(|v| !v.is_null()) {
            Some(Value::Object(nested_config)) => match &attr.ty {
                AttrType::Object(nested) => Value::Object(plan_object(
                    nested,
                    nested_config,
                    prior_value.and_then(Value::as_object),
                )),
                _ => Value::Object(nested_config.clone()),
            },
            Some(value) => value.clone(),
            None => unconfigured(attr, prior_value),
        };
        planned.insert(attr.name.to_string(), value);
    }
    planned
}

fn unconfigured(attr: &Attribute, prior: Option<&Value>) -> Value {
    if let Some(default) = &attr.default {
        return default.clone();
    }
    if attr.use_state_for_unknown {
        if let Some(prior) = prior {
            return prior.clone();
        }
    }
    // Nested defaults still apply to an omitted block
    if let AttrType::Object(nested) = &attr.ty {
        if nested.iter().any(|a| a.default.is_some()) {
            return Value::Object(plan_object(nested, &Map::new(), None));
        }
    }
    Value::Null
}
