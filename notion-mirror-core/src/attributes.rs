//! Attribute extraction: raw typed properties -> scalar or list strings.
//!
//! Each supported property type has one fixed rule. Unsupported types and
//! empty values are dropped without error, so a property that is missing
//! from [`NormalizedAttributes`] can mean "absent" or "empty" alike.

use std::collections::BTreeMap;

use crate::contract::{FormulaValue, PropertyValue, RawProperty, RollupValue};

/// Label for a ticked checkbox.
pub const CHECKBOX_CHECKED: &str = "已完成";
/// Label for an unticked checkbox.
pub const CHECKBOX_UNCHECKED: &str = "未完成";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeValue {
    Scalar(String),
    List(Vec<String>),
}

impl AttributeValue {
    /// Single token for path building: lists are joined, never fanned out.
    pub fn to_token(&self) -> String {
        match self {
            AttributeValue::Scalar(s) => s.clone(),
            AttributeValue::List(items) => items.join(", "),
        }
    }
}

pub type NormalizedAttributes = BTreeMap<String, AttributeValue>;

pub fn extract(properties: &[RawProperty]) -> NormalizedAttributes {
    properties
        .iter()
        .filter_map(|p| normalize(&p.value).map(|v| (p.name.clone(), v)))
        .collect()
}

/// Normalize one value; `None` when unsupported or empty.
pub fn normalize(value: &PropertyValue) -> Option<AttributeValue> {
    match value {
        PropertyValue::Select(name) | PropertyValue::Status(name) | PropertyValue::Date(name) => {
            scalar(name.as_deref())
        }
        PropertyValue::MultiSelect(names) => list(names.clone()),
        PropertyValue::RichText(runs) => scalar(runs.first().map(String::as_str)),
        PropertyValue::Number(n) => n.map(format_number).and_then(|s| scalar(Some(&s))),
        PropertyValue::Checkbox(checked) => Some(AttributeValue::Scalar(checkbox_label(*checked))),
        PropertyValue::CreatedTime(t) | PropertyValue::LastEditedTime(t) => scalar(Some(t)),
        PropertyValue::Formula(result) => match result {
            FormulaValue::String(s) | FormulaValue::Date(s) => scalar(s.as_deref()),
            FormulaValue::Number(n) => n.map(format_number).and_then(|s| scalar(Some(&s))),
            FormulaValue::Boolean(b) => Some(AttributeValue::Scalar(checkbox_label(*b))),
        },
        PropertyValue::Rollup(result) => match result {
            RollupValue::Number(n) => n.map(format_number).and_then(|s| scalar(Some(&s))),
            RollupValue::Date(d) => scalar(d.as_deref()),
            RollupValue::Array(items) => {
                let mut values = Vec::new();
                for item in items {
                    match normalize(item) {
                        Some(AttributeValue::Scalar(s)) => values.push(s),
                        Some(AttributeValue::List(l)) => values.extend(l),
                        None => {}
                    }
                }
                list(values)
            }
        },
        PropertyValue::Title(_) | PropertyValue::Unsupported(_) => None,
    }
}

fn scalar(value: Option<&str>) -> Option<AttributeValue> {
    match value {
        Some(s) if !s.is_empty() => Some(AttributeValue::Scalar(s.to_string())),
        _ => None,
    }
}

fn list(values: Vec<String>) -> Option<AttributeValue> {
    let values: Vec<String> = values.into_iter().filter(|s| !s.is_empty()).collect();
    if values.is_empty() {
        None
    } else {
        Some(AttributeValue::List(values))
    }
}

fn checkbox_label(checked: bool) -> String {
    if checked {
        CHECKBOX_CHECKED.to_string()
    } else {
        CHECKBOX_UNCHECKED.to_string()
    }
}

/// Integral values print without a fractional part (`3`, not `3.0`).
fn format_number(n: f64) -> String {
    format!("{n}")
}
