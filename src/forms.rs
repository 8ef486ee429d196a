//! Typed form fields.
//!
//! Every field kind is a closed enum variant, so parsing and rendering are exhaustive
//! matches instead of string dispatch.

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Text,
    Number,
    Select,
    Radio,
    Checkbox,
    Date,
    Time,
}

impl FieldKind {
    /// Render strategy: the input control used for this kind
    pub fn input_type(self) -> &'static str {
        match self {
            FieldKind::Text => "text",
            FieldKind::Number => "number",
            FieldKind::Select => "select",
            FieldKind::Radio => "radio",
            FieldKind::Checkbox => "checkbox",
            FieldKind::Date => "date",
            FieldKind::Time => "time",
        }
    }

    /// Whether the kind picks from a fixed option list
    pub fn has_options(self) -> bool {
        matches!(self, FieldKind::Select | FieldKind::Radio)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Empty,
    Text(String),
    Number(f64),
    Choice(String),
    Flag(bool),
    Date(NaiveDate),
    Time(NaiveTime),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldError {
    #[error("{0} is required")]
    Required(String),

    #[error("{label}: '{value}' is not a valid {kind}")]
    Invalid {
        label: String,
        kind: &'static str,
        value: String,
    },

    #[error("{label}: '{value}' is not one of the available options")]
    UnknownOption {
        label: String,
        value: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldOption {
    pub value: String,
    pub label: String,
}

/// Declarative description of one form field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub label: String,
    pub kind: FieldKind,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub options: Vec<FieldOption>,
}

impl FieldSpec {
    pub fn new(name: &str, label: &str, kind: FieldKind) -> Self {
        Self {
            name: name.to_string(),
            label: label.to_string(),
            kind,
            required: false,
            options: Vec::new(),
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_option(mut self, value: &str, label: &str) -> Self {
        self.options.push(FieldOption {
            value: value.to_string(),
            label: label.to_string(),
        });
        self
    }

    /// Parse raw input into a typed value
    pub fn parse(&self, raw: &str) -> Result<FieldValue, FieldError> {
        let raw = raw.trim();

        // An unticked checkbox is a value, not a missing one
        if raw.is_empty() && self.kind != FieldKind::Checkbox {
            return if self.required {
                Err(FieldError::Required(self.label.clone()))
            } else {
                Ok(FieldValue::Empty)
            };
        }

        match self.kind {
            FieldKind::Text => Ok(FieldValue::Text(raw.to_string())),
            FieldKind::Number => raw
                .parse::<f64>()
                .ok()
                .filter(|n| n.is_finite())
                .map(FieldValue::Number)
                .ok_or_else(|| self.invalid("number", raw)),
            FieldKind::Select | FieldKind::Radio => {
                if self.options.iter().any(|o| o.value == raw) {
                    Ok(FieldValue::Choice(raw.to_string()))
                } else {
                    Err(FieldError::UnknownOption {
                        label: self.label.clone(),
                        value: raw.to_string(),
                    })
                }
            },
            FieldKind::Checkbox => match raw.to_ascii_lowercase().as_str() {
                "" | "false" | "off" | "0" => {
                    if self.required {
                        Err(FieldError::Required(self.label.clone()))
                    } else {
                        Ok(FieldValue::Flag(false))
                    }
                },
                "true" | "on" | "1" => Ok(FieldValue::Flag(true)),
                _ => Err(self.invalid("checkbox value", raw)),
            },
            FieldKind::Date => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .map(FieldValue::Date)
                .map_err(|_| self.invalid("date (YYYY-MM-DD)", raw)),
            FieldKind::Time => NaiveTime::parse_from_str(raw, "%H:%M")
                .map(FieldValue::Time)
                .map_err(|_| self.invalid("time (HH:MM)", raw)),
        }
    }

    fn invalid(&self, kind: &'static str, raw: &str) -> FieldError {
        FieldError::Invalid {
            label: self.label.clone(),
            kind,
            value: raw.to_string(),
        }
    }
}
