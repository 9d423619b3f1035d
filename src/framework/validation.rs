//! Config validation against a [`Schema`]
//!
//! Runs before any remote call. Null values count as not configured.

use super::diagnostics::Diagnostics;
use super::schema::{AttrType, Attribute, ConfigRule, Schema, Validator};
use serde_json::{Map, Value};

/// Validate a configuration object
pub fn validate_config(schema: &Schema, config: &Value) -> Diagnostics {
    let mut diags = Diagnostics::new();
    let empty = Map::new();
    let object = match config {
        Value::Object(map) => map,
        Value::Null => &empty,
        other => {
            diags.attribute_error(
                "",
                "Invalid Configuration",
                format!("Configuration must be a JSON object, got: {}", other),
            );
            return diags;
        }
    };

    validate_object(&schema.attributes, object, "", &mut diags);
    for rule in &schema.rules {
        check_rule(rule, object, &mut diags);
    }
    diags
}

fn configured<'a>(object: &'a Map<String, Value>, name: &str) -> Option<&'a Value> {
    object.get(name).filter(|v| !v.is_null())
}

fn join_path(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", parent, name)
    }
}

fn validate_object(
    attributes: &[Attribute],
    object: &Map<String, Value>,
    parent: &str,
    diags: &mut Diagnostics,
) {
    for key in object.keys() {
        if !attributes.iter().any(|a| a.name == key) {
            diags.attribute_error(
                &join_path(parent, key),
                "Unsupported argument",
                format!("An argument named \"{}\" is not expected here.", key),
            );
        }
    }

    for attr in attributes {
        let path = join_path(parent, attr.name);
        match configured(object, attr.name) {
            None if attr.required => diags.attribute_error(
                &path,
                "Missing Configuration for Required Attribute",
                format!(
                    "Must set a configuration value for the {} attribute as the provider has marked it as required.",
                    path
                ),
            ),
            None => {}
            Some(_) if attr.is_read_only() => diags.attribute_error(
                &path,
                "Invalid Configuration for Read-Only Attribute",
                format!(
                    "Cannot set value for {}, the provider has marked it as read-only. Remove the configuration line setting the value.",
                    path
                ),
            ),
            Some(value) => {
                if check_type(&attr.ty, value, &path, diags) {
                    for validator in &attr.validators {
                        check_validator(validator, value, &path, object, parent, diags);
                    }
                }
            }
        }
    }
}

/// Returns false when the value has the wrong shape
fn check_type(ty: &AttrType, value: &Value, path: &str, diags: &mut Diagnostics) -> bool {
    let ok = match (ty, value) {
        (AttrType::String, Value::String(_)) => true,
        (AttrType::Bool, Value::Bool(_)) => true,
        (AttrType::Int64, Value::Number(n)) => n.is_i64(),
        (AttrType::Float64, Value::Number(_)) => true,
        (AttrType::Dynamic, _) => true,
        (AttrType::Set(inner), Value::Array(items)) | (AttrType::List(inner), Value::Array(items)) => {
            let mut ok = true;
            for item in items {
                let element = format!("{}[{}]", path, item);
                ok &= check_type(inner, item, &element, diags);
            }
            return ok;
        }
        (AttrType::Object(nested), Value::Object(map)) => {
            let before = diags.len();
            validate_object(nested, map, path, diags);
            return diags.len() == before;
        }
        _ => false,
    };

    if !ok {
        diags.attribute_error(
            path,
            "Incorrect attribute value type",
            format!("Attribute {} must be a {}, got: {}", path, ty.name(), value),
        );
    }
    ok
}

fn quoted(values: &[&str]) -> String {
    let inner: Vec<String> = values.iter().map(|v| format!("\"{}\"", v)).collect();
    format!("[{}]", inner.join(" "))
}

fn check_validator(
    validator: &Validator,
    value: &Value,
    path: &str,
    siblings: &Map<String, Value>,
    parent: &str,
    diags: &mut Diagnostics,
) {
    match validator {
        Validator::OneOf(allowed) => {
            if let Some(s) = value.as_str() {
                one_of(allowed, s, path, diags);
            }
        }
        Validator::LengthAtLeast(min) => {
            if let Some(s) = value.as_str() {
                let len = s.chars().count();
                if len < *min {
                    diags.attribute_error(
                        path,
                        "Invalid Attribute Value Length",
                        format!(
                            "Attribute {} string length must be at least {}, got: {}",
                            path, min, len
                        ),
                    );
                }
            }
        }
        Validator::LengthBetween(min, max) => {
            if let Some(s) = value.as_str() {
                length_between(*min, *max, s, path, diags);
            }
        }
        Validator::Regex { pattern, message } => {
            if let Some(s) = value.as_str() {
                match regex::Regex::new(pattern) {
                    Ok(re) if re.is_match(s) => {}
                    Ok(_) => diags.attribute_error(
                        path,
                        "Invalid Attribute Value Match",
                        format!("Attribute {} {}, got: {}", path, message, s),
                    ),
                    Err(e) => diags.attribute_error(
                        path,
                        "Invalid Validator",
                        format!("Pattern {} does not compile: {}", pattern, e),
                    ),
                }
            }
        }
        Validator::IntBetween(min, max) => {
            if let Some(n) = value.as_i64() {
                if n < *min || n > *max {
                    diags.attribute_error(
                        path,
                        "Invalid Attribute Value",
                        format!(
                            "Attribute {} value must be between {} and {}, got: {}",
                            path, min, max, n
                        ),
                    );
                }
            }
        }
        Validator::SizeAtLeast(min) => {
            if let Some(items) = value.as_array() {
                if items.len() < *min {
                    diags.attribute_error(
                        path,
                        "Invalid Attribute Value",
                        format!(
                            "Attribute {} set must contain at least {} elements, got: {}",
                            path,
                            min,
                            items.len()
                        ),
                    );
                }
            }
        }
        Validator::ValuesOneOf(allowed) => {
            for item in value.as_array().into_iter().flatten() {
                if let Some(s) = item.as_str() {
                    one_of(allowed, s, &format!("{}[Value(\"{}\")]", path, s), diags);
                }
            }
        }
        Validator::ValuesLengthBetween(min, max) => {
            for item in value.as_array().into_iter().flatten() {
                if let Some(s) = item.as_str() {
                    length_between(*min, *max, s, &format!("{}[Value(\"{}\")]", path, s), diags);
                }
            }
        }
        Validator::ConflictsWith(others) => {
            for other in others.iter() {
                if configured(siblings, other).is_some() {
                    diags.attribute_error(
                        path,
                        "Invalid Attribute Combination",
                        format!(
                            "Attribute \"{}\" cannot be specified when \"{}\" is specified",
                            join_path(parent, other),
                            path
                        ),
                    );
                }
            }
        }
        Validator::AlsoRequires(others) => {
            for other in others.iter() {
                if configured(siblings, other).is_none() {
                    diags.attribute_error(
                        path,
                        "Invalid Attribute Combination",
                        format!(
                            "Attribute \"{}\" must be specified when \"{}\" is specified",
                            join_path(parent, other),
                            path
                        ),
                    );
                }
            }
        }
    }
}

fn one_of(allowed: &[&str], value: &str, path: &str, diags: &mut Diagnostics) {
    if !allowed.contains(&value) {
        diags.attribute_error(
            path,
            "Invalid Attribute Value Match",
            format!(
                "Attribute {} value must be one of: {}, got: \"{}\"",
                path,
                quoted(allowed),
                value
            ),
        );
    }
}

fn length_between(min: usize, max: usize, value: &str, path: &str, diags: &mut Diagnostics) {
    let len = value.chars().count();
    if len < min || len > max {
        diags.attribute_error(
            path,
            "Invalid Attribute Value Length",
            format!(
                "Attribute {} string length must be between {} and {}, got: {}",
                path, min, max, len
            ),
        );
    }
}

fn check_rule(rule: &ConfigRule, object: &Map<String, Value>, diags: &mut Diagnostics) {
    match rule {
        ConfigRule::ExactlyOneOf(names) => {
            let set = names.iter().filter(|n| configured(object, n).is_some()).count();
            if set != 1 {
                let listed = names.join(",");
                let detail = if set == 0 {
                    format!(
                        "No attribute specified when one (and only one) of [{}] is required",
                        listed
                    )
                } else {
                    format!(
                        "{} attributes specified when one (and only one) of [{}] is required",
                        set, listed
                    )
                };
                diags.attribute_error(names.first().copied().unwrap_or_default(), "Invalid Attribute Combination", detail);
            }
        }
        ConfigRule::AtLeastOneOf(names) => {
            if !names.iter().any(|n| configured(object, n).is_some()) {
                diags.attribute_error(
                    names.first().copied().unwrap_or_default(),
                    "Invalid Attribute Combination",
                    format!(
                        "At least one attribute out of [{}] must be specified",
                        names.join(",")
                    ),
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> Schema {
        Schema::new("test")
            .attribute(Attribute::id("id"))
            .attribute(Attribute::string("name").required().validate(Validator::LengthAtLeast(1)))
            .attribute(
                Attribute::string("capacity_unit")
                    .default_value(json!("GB"))
                    .validate(Validator::OneOf(&["MB", "GB", "TB"])),
            )
            .attribute(
                Attribute::string("interval")
                    .optional()
                    .validate(Validator::ConflictsWith(&["time_of_day"])),
            )
            .attribute(
                Attribute::string("time_of_day")
                    .optional()
                    .validate(Validator::Regex {
                        pattern: r"^[0-9]{2}:[0-9]{2}$",
                        message: "format is hh:mm",
                    })
                    .validate(Validator::AlsoRequires(&["timezone"])),
            )
            .attribute(Attribute::string("timezone").optional())
            .attribute(
                Attribute::string_list("days_of_week")
                    .optional()
                    .validate(Validator::ValuesOneOf(&["Monday", "Tuesday"])),
            )
            .attribute(Attribute::int("depth").optional().validate(Validator::IntBetween(1, 512)))
            .attribute(Attribute::object(
                "flr_attributes",
                vec![Attribute::string("mode").optional().validate(Validator::OneOf(&["None", "Enterprise"]))],
            ).optional_computed())
            .attribute(Attribute::string("volume_id").optional())
            .attribute(Attribute::string("volume_name").optional())
            .rule(ConfigRule::ExactlyOneOf(&["volume_id", "volume_name"]))
    }

    fn summaries(diags: &Diagnostics) -> Vec<String> {
        diags.iter().map(|d| d.summary.clone()).collect()
    }

    #[test]
    fn test_valid_config() {
        let diags = validate_config(
            &schema(),
            &json!({"name": "fs", "capacity_unit": "TB", "volume_id": "v1",
                    "time_of_day": "10:30", "timezone": "UTC", "days_of_week": ["Monday"],
                    "flr_attributes": {"mode": "None"}}),
        );
        assert!(diags.is_empty(), "{:?}", diags);
    }

    #[test]
    fn test_missing_and_read_only() {
        let diags = validate_config(&schema(), &json!({"id": "x", "volume_id": "v1"}));
        let summaries = summaries(&diags);
        assert!(summaries.contains(&"Missing Configuration for Required Attribute".to_string()));
        assert!(summaries.contains(&"Invalid Configuration for Read-Only Attribute".to_string()));
    }

    #[test]
    fn test_value_validators() {
        let diags = validate_config(
            &schema(),
            &json!({"name": "", "capacity_unit": "KB", "volume_id": "v1", "depth": 600,
                    "days_of_week": ["Funday"], "flr_attributes": {"mode": "Bogus"}}),
        );
        let details: Vec<&str> = diags.iter().map(|d| d.detail.as_str()).collect();
        assert!(details.iter().any(|d| d.contains("string length must be at least 1")));
        assert!(details
            .iter()
            .any(|d| d.contains(r#"value must be one of: ["MB" "GB" "TB"], got: "KB""#)));
        assert!(details.iter().any(|d| d.contains("between 1 and 512, got: 600")));
        assert!(details.iter().any(|d| d.contains(r#"days_of_week[Value("Funday")]"#)));
        assert!(details.iter().any(|d| d.starts_with("Attribute flr_attributes.mode")));
    }

    #[test]
    fn test_combinations() {
        let diags = validate_config(
            &schema(),
            &json!({"name": "r", "interval": "One_Day", "time_of_day": "1:00",
                    "volume_id": "v1", "volume_name": "vol"}),
        );
        let details: Vec<&str> = diags.iter().map(|d| d.detail.as_str()).collect();
        assert!(details
            .iter()
            .any(|d| d.contains("\"time_of_day\" cannot be specified when \"interval\" is specified")));
        assert!(details.iter().any(|d| d.contains("format is hh:mm")));
        assert!(details
            .iter()
            .any(|d| d.contains("\"timezone\" must be specified when \"time_of_day\" is specified")));
        assert!(details
            .iter()
            .any(|d| d.contains("2 attributes specified when one (and only one) of [volume_id,volume_name]")));
    }

    #[test]
    fn test_unknown_and_mistyped() {
        let diags = validate_config(&schema(), &json!({"name": 5, "volume_id": "v", "bogus": 1}));
        let summaries = summaries(&diags);
        assert!(summaries.contains(&"Unsupported argument".to_string()));
        assert!(summaries.contains(&"Incorrect attribute value type".to_string()));
    }
}
