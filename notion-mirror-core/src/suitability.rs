//! Categorization suitability: is a property a good sub-folder key?
//!
//! Used by the `analyze` command to suggest `categorization.properties`.
//! A property qualifies when it is a choice-like type and its sampled value
//! distribution is neither degenerate nor dominated by one value.

use std::collections::BTreeMap;
use std::fmt;

use crate::attributes::{CHECKBOX_CHECKED, CHECKBOX_UNCHECKED};
use crate::contract::{Document, PropertyValue};

/// Property types that make sensible folders.
pub const CATEGORY_KINDS: &[&str] = &["select", "multi_select", "status", "checkbox"];
pub const MIN_DISTINCT_VALUES: usize = 2;
pub const MAX_DISTINCT_VALUES: usize = 15;
pub const MIN_TOTAL: usize = 2;
/// Largest share one value may hold.
pub const MAX_DOMINANT_SHARE: f64 = 0.9;

/// Value -> occurrence count.
pub type Distribution = BTreeMap<String, usize>;

#[derive(Debug, Clone, PartialEq)]
pub enum Rejection {
    UnsuitableKind(String),
    NoData,
    TooFewValues(usize),
    TooManyValues(usize),
    TooLittleData(usize),
    TooSkewed { dominant: usize, total: usize },
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::UnsuitableKind(kind) => write!(f, "property type '{kind}' is not a category type"),
            Rejection::NoData => write!(f, "no values found in sampled documents"),
            Rejection::TooFewValues(n) => write!(f, "only {n} distinct value(s)"),
            Rejection::TooManyValues(n) => write!(f, "{n} distinct values, too many for folders"),
            Rejection::TooLittleData(n) => write!(f, "only {n} sampled value(s)"),
            Rejection::TooSkewed { dominant, total } => {
                write!(f, "distribution too concentrated ({dominant}/{total})")
            }
        }
    }
}

pub fn assess(kind: &str, distribution: &Distribution) -> Result<(), Rejection> {
    if !CATEGORY_KINDS.contains(&kind) {
        return Err(Rejection::UnsuitableKind(kind.to_string()));
    }
    if distribution.is_empty() {
        return Err(Rejection::NoData);
    }
    let distinct = distribution.len();
    if distinct < MIN_DISTINCT_VALUES {
        return Err(Rejection::TooFewValues(distinct));
    }
    if distinct > MAX_DISTINCT_VALUES {
        return Err(Rejection::TooManyValues(distinct));
    }
    let total: usize = distribution.values().sum();
    if total < MIN_TOTAL {
        return Err(Rejection::TooLittleData(total));
    }
    let dominant = distribution.values().copied().max().unwrap_or(0);
    if dominant as f64 / total as f64 > MAX_DOMINANT_SHARE {
        return Err(Rejection::TooSkewed { dominant, total });
    }
    Ok(())
}

/// Count the values of `property` across `documents`. Multi-select
/// contributes each option.
pub fn value_distribution(documents: &[Document], property: &str) -> Distribution {
    let mut counts = Distribution::new();
    for doc in documents {
        for prop in doc.properties.iter().filter(|p| p.name == property) {
            for value in sample_values(&prop.value) {
                *counts.entry(value).or_insert(0) += 1;
            }
        }
    }
    counts
}

fn sample_values(value: &PropertyValue) -> Vec<String> {
    match value {
        PropertyValue::Select(Some(s)) | PropertyValue::Status(Some(s)) => vec![s.clone()],
        PropertyValue::MultiSelect(items) => items.clone(),
        PropertyValue::Checkbox(b) => vec![if *b {
            CHECKBOX_CHECKED.to_string()
        } else {
            CHECKBOX_UNCHECKED.to_string()
        }],
        PropertyValue::RichText(runs) => runs
            .first()
            .filter(|s| !s.is_empty())
            .map(|s| s.chars().take(50).collect())
            .into_iter()
            .collect(),
        PropertyValue::Number(Some(n)) => vec![format!("{n}")],
        _ => Vec::new(),
    }
}

/// Per-property verdict for one container sample.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyAssessment {
    pub name: String,
    pub kind: String,
    pub distribution: Distribution,
    pub verdict: Result<(), Rejection>,
}

impl PropertyAssessment {
    /// Values sorted by count, most common first.
    pub fn top_values(&self, limit: usize) -> Vec<(&str, usize)> {
        let mut values: Vec<(&str, usize)> = self
            .distribution
            .iter()
            .map(|(v, c)| (v.as_str(), *c))
            .collect();
        values.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        values.truncate(limit);
        values
    }
}

/// Assess every property that appears in the sample, in first-seen order.
pub fn assess_sample(documents: &[Document]) -> Vec<PropertyAssessment> {
    let mut seen: Vec<(String, String)> = Vec::new();
    for doc in documents {
        for prop in &doc.properties {
            if !seen.iter().any(|(name, _)| *name == prop.name) {
                seen.push((prop.name.clone(), prop.value.kind().to_string()));
            }
        }
    }
    seen.into_iter()
        .map(|(name, kind)| {
            let distribution = value_distribution(documents, &name);
            let verdict = assess(&kind, &distribution);
            PropertyAssessment {
                name,
                kind,
                distribution,
                verdict,
            }
        })
        .collect()
}

/// Accepted property names across containers, de-duplicated, order kept.
pub fn suggest_properties<'a, I>(assessments: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a PropertyAssessment>,
{
    let mut names: Vec<String> = Vec::new();
    for a in assessments {
        if a.verdict.is_ok() && !names.contains(&a.name) {
            names.push(a.name.clone());
        }
    }
    names
}
