//! Typed input/output contracts for tools.

use chrono::NaiveDate;
use serde_json::{Map, Value, json};

pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// A value the user can name in more than one way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChoiceOption {
    pub value: &'static str,
    pub aliases: &'static [&'static str],
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldKind {
    /// ISO date string (`YYYY-MM-DD`)
    Date,
    Integer { min: i64, max: i64 },
    Number { min: f64, max: f64 },
    /// Non-empty list drawn from a fixed vocabulary
    Keywords(&'static [&'static str]),
    Choice(&'static [ChoiceOption]),
}

impl FieldKind {
    fn json_type(&self) -> Value {
        match self {
            FieldKind::Date => json!({ "type": "string", "format": "date" }),
            FieldKind::Integer { min, max } => {
                json!({ "type": "integer", "minimum": min, "maximum": max })
            }
            FieldKind::Number { min, max } => {
                json!({ "type": "number", "minimum": min, "maximum": max })
            }
            FieldKind::Keywords(vocabulary) => json!({
                "type": "array",
                "items": { "type": "string", "enum": vocabulary },
                "minItems": 1
            }),
            FieldKind::Choice(options) => {
                let values: Vec<&str> = options.iter().map(|o| o.value).collect();
                json!({ "type": "string", "enum": values })
            }
        }
    }
}

/// One named input field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub required: bool,
    /// Shown to the user when the field has to be asked for.
    pub description: &'static str,
    /// Words that label a numeric value in free text ("creatinine", "bmi").
    pub cues: &'static [&'static str],
    /// Whether a value here satisfies the schema's `min_fields`. Context
    /// such as sex refines a panel but is not a measurement.
    pub counts_toward_min: bool,
}

impl FieldSpec {
    pub const fn required(name: &'static str, kind: FieldKind, description: &'static str) -> Self {
        Self {
            name,
            kind,
            required: true,
            description,
            cues: &[],
            counts_toward_min: true,
        }
    }

    pub const fn optional(name: &'static str, kind: FieldKind, description: &'static str) -> Self {
        Self {
            name,
            kind,
            required: false,
            description,
            cues: &[],
            counts_toward_min: true,
        }
    }

    pub const fn with_cues(mut self, cues: &'static [&'static str]) -> Self {
        self.cues = cues;
        self
    }

    pub const fn context_only(mut self) -> Self {
        self.counts_toward_min = false;
        self
    }

    fn validate(&self, value: &Value) -> Result<(), String> {
        let name = self.name;
        match self.kind {
            FieldKind::Date => {
                let raw = value
                    .as_str()
                    .ok_or_else(|| format!("'{name}' must be a date string"))?;
                NaiveDate::parse_from_str(raw, DATE_FORMAT)
                    .map_err(|_| format!("'{name}' must use YYYY-MM-DD, got '{raw}'"))?;
            }
            FieldKind::Integer { min, max } => {
                let v = value
                    .as_i64()
                    .ok_or_else(|| format!("'{name}' must be an integer"))?;
                if v < min || v > max {
                    return Err(format!("'{name}' must be between {min} and {max}, got {v}"));
                }
            }
            FieldKind::Number { min, max } => {
                let v = value
                    .as_f64()
                    .ok_or_else(|| format!("'{name}' must be a number"))?;
                if !(min..=max).contains(&v) {
                    return Err(format!("'{name}' must be between {min} and {max}, got {v}"));
                }
            }
            FieldKind::Keywords(vocabulary) => {
                let items = value
                    .as_array()
                    .ok_or_else(|| format!("'{name}' must be a list"))?;
                if items.is_empty() {
                    return Err(format!("'{name}' must not be empty"));
                }
                for item in items {
                    let word = item
                        .as_str()
                        .ok_or_else(|| format!("'{name}' entries must be strings"))?;
                    if !vocabulary.contains(&word) {
                        return Err(format!("'{name}' does not recognise '{word}'"));
                    }
                }
            }
            FieldKind::Choice(options) => {
                let raw = value
                    .as_str()
                    .ok_or_else(|| format!("'{name}' must be a string"))?;
                if !options.iter().any(|o| o.value == raw) {
                    return Err(format!("'{name}' has unsupported value '{raw}'"));
                }
            }
        }
        Ok(())
    }
}

/// Input contract of a tool.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolSchema {
    pub fields: Vec<FieldSpec>,
    /// Minimum number of counted fields that must be present, on top of the
    /// individually required ones. Panels where any subset of markers is
    /// useful set this to 1.
    pub min_fields: usize,
}

impl ToolSchema {
    pub fn new(fields: Vec<FieldSpec>) -> Self {
        Self {
            fields,
            min_fields: 0,
        }
    }

    pub fn with_min_fields(mut self, min_fields: usize) -> Self {
        self.min_fields = min_fields;
        self
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn required_fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields.iter().filter(|f| f.required)
    }

    /// Fields whose presence counts toward `min_fields`.
    pub fn counted_fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields.iter().filter(|f| f.counts_toward_min)
    }

    /// Reject inputs that are not objects, carry unknown fields, miss a
    /// required field or hold a value of the wrong type or range.
    pub fn validate(&self, input: &Value) -> Result<(), String> {
        let object = input
            .as_object()
            .ok_or_else(|| "input must be a JSON object".to_string())?;

        if let Some(unknown) = object.keys().find(|k| self.field(k).is_none()) {
            return Err(format!("unexpected field '{unknown}'"));
        }

        let mut present = 0;
        for field in &self.fields {
            match object.get(field.name) {
                None | Some(Value::Null) => {
                    if field.required {
                        return Err(format!("missing required field '{}'", field.name));
                    }
                }
                Some(value) => {
                    field.validate(value)?;
                    if field.counts_toward_min {
                        present += 1;
                    }
                }
            }
        }

        if present < self.min_fields {
            let counted: Vec<&str> = self.counted_fields().map(|f| f.name).collect();
            return Err(format!(
                "expected at least {} of: {}",
                self.min_fields,
                counted.join(", ")
            ));
        }
        Ok(())
    }

    pub fn field_names(&self) -> Vec<&'static str> {
        self.fields.iter().map(|f| f.name).collect()
    }

    /// JSON Schema rendering for clients listing tools.
    pub fn to_json_schema(&self) -> Value {
        let mut properties = Map::new();
        for field in &self.fields {
            let mut property = field.kind.json_type();
            if let Value::Object(map) = &mut property {
                map.insert("description".into(), Value::from(field.description));
            }
            properties.insert(field.name.to_string(), property);
        }
        let required: Vec<&str> = self.required_fields().map(|f| f.name).collect();
        let mut schema = json!({
            "type": "object",
            "properties": properties,
            "required": required,
            "additionalProperties": false
        });
        if self.min_fields > 0
            && let Value::Object(map) = &mut schema
        {
            map.insert("minProperties".into(), Value::from(self.min_fields));
        }
        schema
    }
}

/// Output contract: keys every successful result must carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputSchema {
    pub required: &'static [&'static str],
}

impl OutputSchema {
    pub const fn new(required: &'static [&'static str]) -> Self {
        Self { required }
    }

    /// Every output is an object with a string `summary` plus the declared keys.
    pub fn validate(&self, output: &Value) -> Result<(), String> {
        let object = output
            .as_object()
            .ok_or_else(|| "output must be a JSON object".to_string())?;
        if !object.get("summary").is_some_and(Value::is_string) {
            return Err("output is missing a 'summary' string".to_string());
        }
        if let Some(missing) = self.required.iter().find(|k| !object.contains_key(**k)) {
            return Err(format!("output is missing '{missing}'"));
        }
        Ok(())
    }

    pub fn to_json_schema(&self) -> Value {
        let mut required = vec!["summary"];
        required.extend(self.required.iter().copied());
        json!({ "type": "object", "required": required })
    }
}
