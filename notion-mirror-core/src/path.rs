//! Destination path resolution.
//!
//! A document's folder is derived from its container (and the container's
//! parent, when there is one) plus at most one category segment picked from
//! its normalized attributes. Date-like categories are bucketed by week so a
//! folder collects a Sunday-to-Saturday span instead of a single day.
//!
//! Every segment that leaves this module is sanitized: non-empty, free of
//! `< > : " / \ | ? *`, and without leading or trailing spaces or dots.

use std::fmt;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime};

use crate::attributes::NormalizedAttributes;
use crate::config::Categorization;

/// Characters that may not appear in a path segment.
pub const RESERVED_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Replacement for a folder segment that sanitizes to nothing.
pub const UNTITLED_FOLDER: &str = "未命名";
/// Replacement for a filename that sanitizes to nothing.
pub const UNTITLED_FILE: &str = "未命名页面";

/// Substrings (matched case-insensitively) that mark a property as a date.
const DATE_KEYWORDS: &[&str] = &["date", "time", "日期", "时间", "full date"];

/// Tried in order after the ISO forms.
const FALLBACK_DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%Y年%m月%d日", "%m/%d/%Y", "%d/%m/%Y"];

const NAIVE_ISO_DATETIME_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"];

/// Ordered, sanitized folder segments.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DestinationPath {
    segments: Vec<String>,
}

impl DestinationPath {
    /// Build from raw names; each one is sanitized.
    pub fn from_raw<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            segments: names
                .into_iter()
                .map(|n| sanitize_segment(n.as_ref()))
                .collect(),
        }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Folder relative to the destination root, `/`-joined.
    pub fn folder(&self) -> String {
        self.segments.join("/")
    }

    /// Full file path: `<root>/<segments...>/<filename>.md`.
    pub fn file_path(&self, root: &str, filename: &str) -> String {
        let root = root.trim_matches('/');
        let mut parts: Vec<&str> = Vec::with_capacity(self.segments.len() + 2);
        if !root.is_empty() {
            parts.push(root);
        }
        parts.extend(self.segments.iter().map(String::as_str));
        let file = format!("{filename}.md");
        parts.push(&file);
        parts.join("/")
    }
}

impl fmt::Display for DestinationPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.folder())
    }
}

/// Resolve the folder for one document.
///
/// The first configured category property present in `attributes` wins;
/// configuration order is the only tie-breaker.
pub fn resolve(
    container: &str,
    parent: Option<&str>,
    attributes: &NormalizedAttributes,
    categorization: &Categorization,
) -> DestinationPath {
    let mut names: Vec<String> = Vec::with_capacity(3);
    if let Some(parent) = parent {
        names.push(parent.to_string());
    }
    names.push(container.to_string());

    if categorization.enabled {
        let winner = categorization
            .properties
            .iter()
            .map(|name| name.trim())
            .find_map(|name| attributes.get(name).map(|value| (name, value)));

        if let Some((name, value)) = winner {
            let raw = value.to_token();
            let token = if is_date_property(name) {
                week_bucket(&raw).unwrap_or(raw)
            } else {
                raw
            };
            names.push(token);
        }
    }

    DestinationPath::from_raw(names)
}

pub fn is_date_property(name: &str) -> bool {
    let lower = name.to_lowercase();
    DATE_KEYWORDS.iter().any(|k| lower.contains(k))
}

/// Sanitize one folder segment.
pub fn sanitize_segment(name: &str) -> String {
    let cleaned = replace_reserved(name);
    let trimmed = cleaned.trim_matches(|c| c == ' ' || c == '.');
    if trimmed.is_empty() {
        UNTITLED_FOLDER.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Sanitize a filename stem: like a segment, but spaces become `_`.
pub fn sanitize_filename(name: &str) -> String {
    let cleaned = replace_reserved(name);
    let trimmed = cleaned.trim_matches(|c| c == ' ' || c == '.');
    let underscored = trimmed.replace(' ', "_");
    if underscored.is_empty() {
        UNTITLED_FILE.to_string()
    } else {
        underscored
    }
}

fn replace_reserved(name: &str) -> String {
    name.chars()
        .map(|c| if RESERVED_CHARS.contains(&c) { '_' } else { c })
        .collect()
}

/// Parse a date in ISO form first, then the fallback formats.
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if value.contains('T') {
        if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
            // Keep the calendar day in the value's own offset.
            return Some(dt.date_naive());
        }
        for fmt in NAIVE_ISO_DATETIME_FORMATS {
            if let Ok(dt) = NaiveDateTime::parse_from_str(value, fmt) {
                return Some(dt.date());
            }
        }
    }
    FALLBACK_DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
}

/// Sunday-to-Saturday week containing `date`.
pub fn week_range(date: NaiveDate) -> (NaiveDate, NaiveDate) {
    let since_sunday = i64::from(date.weekday().num_days_from_sunday());
    let sunday = date - Duration::days(since_sunday);
    (sunday, sunday + Duration::days(6))
}

/// Label for a week span, merging shared year and month.
pub fn format_week_range(start: NaiveDate, end: NaiveDate) -> String {
    if start.year() == end.year() && start.month() == end.month() {
        format!(
            "{}年{}月{}日-{}日",
            start.year(),
            start.month(),
            start.day(),
            end.day()
        )
    } else if start.year() == end.year() {
        format!(
            "{}年{}月{}日-{}月{}日",
            start.year(),
            start.month(),
            start.day(),
            end.month(),
            end.day()
        )
    } else {
        format!(
            "{}年{}月{}日-{}年{}月{}日",
            start.year(),
            start.month(),
            start.day(),
            end.year(),
            end.month(),
            end.day()
        )
    }
}

/// Week label for a date-like value, or `None` when it does not parse.
pub fn week_bucket(value: &str) -> Option<String> {
    let date = parse_date(value)?;
    let (start, end) = week_range(date);
    Some(format_week_range(start, end))
}
