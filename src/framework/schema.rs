//! Attribute schemas
//!
//! Every resource and data source declares its attributes once. The same
//! declaration drives config validation, planning and the `/v1/schema`
//! document served to callers.

use serde::Serialize;
use serde_json::Value;

// =============================================================================
// Attribute Types
// =============================================================================

/// Value type of an attribute
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "element", rename_all = "snake_case")]
pub enum AttrType {
    String,
    Bool,
    Int64,
    Float64,
    /// Unordered collection, compared without regard to order
    Set(Box<AttrType>),
    List(Box<AttrType>),
    /// Nested block with its own attributes
    Object(Vec<Attribute>),
    /// Any JSON value, only used for computed outputs
    Dynamic,
}

impl AttrType {
    pub fn name(&self) -> &'static str {
        match self {
            AttrType::String => "string",
            AttrType::Bool => "bool",
            AttrType::Int64 => "number",
            AttrType::Float64 => "number",
            AttrType::Set(_) => "set",
            AttrType::List(_) => "list",
            AttrType::Object(_) => "object",
            AttrType::Dynamic => "dynamic",
        }
    }
}

// =============================================================================
// Validators
// =============================================================================

/// Checks applied to a configured value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "validator", content = "args", rename_all = "snake_case")]
pub enum Validator {
    OneOf(&'static [&'static str]),
    LengthAtLeast(usize),
    LengthBetween(usize, usize),
    Regex {
        pattern: &'static str,
        message: &'static str,
    },
    IntBetween(i64, i64),
    /// Minimum number of elements of a set or list
    SizeAtLeast(usize),
    /// Every element of a string collection must be one of the values
    ValuesOneOf(&'static [&'static str]),
    /// Every element of a string collection must have a bounded length
    ValuesLengthBetween(usize, usize),
    /// Sibling attributes that must not be set together with this one
    ConflictsWith(&'static [&'static str]),
    /// Sibling attributes that must be set together with this one
    AlsoRequires(&'static [&'static str]),
}

/// Checks that span several top-level attributes
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "rule", content = "attributes", rename_all = "snake_case")]
pub enum ConfigRule {
    ExactlyOneOf(&'static [&'static str]),
    AtLeastOneOf(&'static [&'static str]),
}

// =============================================================================
// Attributes
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Attribute {
    pub name: &'static str,
    #[serde(rename = "type")]
    pub ty: AttrType,
    pub description: &'static str,
    pub required: bool,
    pub optional: bool,
    pub computed: bool,
    pub sensitive: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    /// Unconfigured values keep the prior state instead of becoming unknown
    pub use_state_for_unknown: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub validators: Vec<Validator>,
}

impl Attribute {
    fn new(name: &'static str, ty: AttrType) -> Self {
        Self {
            name,
            ty,
            description: "",
            required: false,
            optional: false,
            computed: false,
            sensitive: false,
            default: None,
            use_state_for_unknown: false,
            validators: Vec::new(),
        }
    }

    pub fn string(name: &'static str) -> Self {
        Self::new(name, AttrType::String)
    }

    pub fn bool(name: &'static str) -> Self {
        Self::new(name, AttrType::Bool)
    }

    pub fn int(name: &'static str) -> Self {
        Self::new(name, AttrType::Int64)
    }

    pub fn float(name: &'static str) -> Self {
        Self::new(name, AttrType::Float64)
    }

    pub fn string_set(name: &'static str) -> Self {
        Self::new(name, AttrType::Set(Box::new(AttrType::String)))
    }

    pub fn string_list(name: &'static str) -> Self {
        Self::new(name, AttrType::List(Box::new(AttrType::String)))
    }

    pub fn object(name: &'static str, attributes: Vec<Attribute>) -> Self {
        Self::new(name, AttrType::Object(attributes))
    }

    pub fn object_set(name: &'static str, attributes: Vec<Attribute>) -> Self {
        Self::new(name, AttrType::Set(Box::new(AttrType::Object(attributes))))
    }

    /// Computed list of arbitrary objects, used by data sources
    pub fn output_list(name: &'static str) -> Self {
        Self::new(name, AttrType::List(Box::new(AttrType::Dynamic))).computed()
    }

    /// The computed `id` every resource carries
    pub fn id(description: &'static str) -> Self {
        Self::string("id").computed().keep_state().describe(description)
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn computed(mut self) -> Self {
        self.computed = true;
        self
    }

    pub fn optional_computed(self) -> Self {
        self.optional().computed()
    }

    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }

    /// Value planned when the attribute is not configured
    pub fn default_value(mut self, value: Value) -> Self {
        self.default = Some(value);
        self.optional_computed()
    }

    pub fn keep_state(mut self) -> Self {
        self.use_state_for_unknown = true;
        self
    }

    pub fn describe(mut self, description: &'static str) -> Self {
        self.description = description;
        self
    }

    pub fn validate(mut self, validator: Validator) -> Self {
        self.validators.push(validator);
        self
    }

    /// Attributes of a nested object, or of the elements of a set of objects
    pub fn nested(&self) -> Option<&[Attribute]> {
        match &self.ty {
            AttrType::Object(attrs) => Some(attrs),
            AttrType::Set(inner) | AttrType::List(inner) => match inner.as_ref() {
                AttrType::Object(attrs) => Some(attrs),
                _ => None,
            },
            _ => None,
        }
    }

    /// Only the provider sets this attribute
    pub fn is_read_only(&self) -> bool {
        self.computed && !self.optional && !self.required
    }
}

// =============================================================================
// Schema
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Schema {
    pub description: &'static str,
    pub attributes: Vec<Attribute>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<ConfigRule>,
}

impl Schema {
    pub fn new(description: &'static str) -> Self {
        Self {
            description,
            attributes: Vec::new(),
            rules: Vec::new(),
        }
    }

    pub fn attribute(mut self, attribute: Attribute) -> Self {
        self.attributes.push(attribute);
        self
    }

    pub fn attributes(mut self, attributes: impl IntoIterator<Item = Attribute>) -> Self {
        self.attributes.extend(attributes);
        self
    }

    pub fn rule(mut self, rule: ConfigRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    /// Names of sensitive top-level attributes
    pub fn sensitive_attributes(&self) -> Vec<&'static str> {
        self.attributes
            .iter()
            .filter(|a| a.sensitive)
            .map(|a| a.name)
            .collect()
    }

    /// Copy of a document with every sensitive value masked, nested blocks included
    pub fn redact(&self, document: &Value) -> Value {
        let mut masked = document.clone();
        redact_object(&self.attributes, &mut masked);
        masked
    }
}

fn redact_object(attributes: &[Attribute], value: &mut Value) {
    let Some(map) = value.as_object_mut() else {
        return;
    };
    for attr in attributes {
        let Some(field) = map.get_mut(attr.name).filter(|v| !v.is_null()) else {
            continue;
        };
        if attr.sensitive {
            *field = Value::String("<sensitive>".into());
        } else if let Some(nested) = attr.nested() {
            match field {
                Value::Array(items) => items.iter_mut().for_each(|item| redact_object(nested, item)),
                other => redact_object(nested, other),
            }
        }
    }
}
